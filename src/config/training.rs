// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Training goal, current progress and program schedule

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

/// A race or training time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub seconds: u32,
}

/// Formats as `1h 5min 30s`, leaving out zero parts
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [(self.hours, "h"), (self.minutes, "min"), (self.seconds, "s")]
            .iter()
            .filter(|(value, _)| *value > 0)
            .map(|(value, suffix)| format!("{value}{suffix}"))
            .collect();

        if parts.is_empty() {
            write!(f, "0s")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Distance run in a given time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningParams {
    pub time: Time,
    pub distance_m: f64,
}

/// Objective of a block of program weeks, `start..=end`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekObjective {
    pub start: u32,
    pub end: u32,
    pub title: String,
    pub objective: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Race day, `YYYY-MM-DD`
    pub deadline: NaiveDate,
    /// First day of week 1
    #[serde(default)]
    pub program_start: Option<NaiveDate>,
    /// Athlete's threshold speed in m/s
    #[serde(default)]
    pub threshold_speed: Option<f64>,
    /// Minutes available for today's session
    #[serde(default)]
    pub available_minutes: Option<u32>,
    pub goal: RunningParams,
    pub current_progress: RunningParams,
    #[serde(default)]
    pub weeks: Vec<WeekObjective>,
}

impl TrainingConfig {
    /// Load a standalone training file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read training file: {path}"))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse training file: {path}"))
    }

    pub fn validate(&self) -> Result<()> {
        for (label, params) in [("goal", &self.goal), ("current_progress", &self.current_progress)] {
            if params.time.minutes >= 60 || params.time.seconds >= 60 {
                anyhow::bail!("{label}.time minutes and seconds must be below 60");
            }
            if !params.distance_m.is_finite() || params.distance_m <= 0.0 {
                anyhow::bail!("{label}.distance_m must be positive");
            }
        }

        if let Some(speed) = self.threshold_speed {
            if !speed.is_finite() || speed <= 0.0 {
                anyhow::bail!("threshold_speed must be positive");
            }
        }

        for week in &self.weeks {
            if week.start == 0 || week.start > week.end {
                anyhow::bail!("Week range {}..={} of '{}' is invalid", week.start, week.end, week.title);
            }
        }

        let mut ranges: Vec<&WeekObjective> = self.weeks.iter().collect();
        ranges.sort_by_key(|week| week.start);
        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                anyhow::bail!("Week ranges of '{}' and '{}' overlap", pair[0].title, pair[1].title);
            }
        }
        Ok(())
    }

    /// 1-based program week containing `today`; zero or negative before the start
    pub fn week_number(&self, today: NaiveDate) -> Option<i64> {
        self.program_start
            .map(|start| (today - start).num_days().div_euclid(7) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrainingConfig {
        toml::from_str(
            r#"
deadline = "2025-04-06"
program_start = "2025-01-06"
threshold_speed = 3.6

[goal]
distance_m = 10000
time = { minutes = 50 }

[current_progress]
distance_m = 8000
time = { minutes = 45, seconds = 30 }

[[weeks]]
start = 1
end = 4
title = "the base phase"
objective = "Build aerobic volume."

[[weeks]]
start = 5
end = 10
title = "the build phase"
objective = "Add threshold work."
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_time_display() {
        let time = Time { hours: 1, minutes: 5, seconds: 30 };
        assert_eq!(time.to_string(), "1h 5min 30s");
        assert_eq!(Time { hours: 0, minutes: 50, seconds: 0 }.to_string(), "50min");
        assert_eq!(Time::default().to_string(), "0s");
    }

    #[test]
    fn test_parse_and_validate() {
        let config = sample();
        assert_eq!(config.goal.time.minutes, 50);
        assert_eq!(config.current_progress.time.seconds, 30);
        assert_eq!(config.weeks.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_overlapping_weeks_rejected() {
        let mut config = sample();
        config.weeks[1].start = 4;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("overlap"));
    }

    #[test]
    fn test_week_number() {
        let config = sample();
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(config.week_number(start), Some(1));
        assert_eq!(config.week_number(start + chrono::Duration::days(13)), Some(2));
        assert_eq!(config.week_number(start - chrono::Duration::days(1)), Some(0));
    }
}
