// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Parameter Parsing
//!
//! Reads the free-text parameter clause of a workout component, e.g.
//! `"Time: 10 minutes, Pace: 5:30-5:45 min/km, Effort: 75%"`, into
//! [`ParsedParameters`].
//!
//! The text is split on its `Time:`, `Distance:`, `Pace:` and `Effort:`
//! markers; each figure is read from its own segment only.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::plan::{IntensityType, Target};
use crate::units::{minutes_seconds_to_seconds, pace_to_speed, ConversionError};

const METRES_PER_KM: f64 = 1000.0;
const METRES_PER_MILE: f64 = 1609.344;

static MARKER_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(time|duration|distance|pace|effort|intensity)\s*:").ok()
});

static CLOCK_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 10:00, 1:05:30
    Regex::new(r"^\s*(\d{1,3}):(\d{2})(?::(\d{2}))?\b").ok()
});

static DURATION_PART_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 10 minutes, 1h, 90 sec, 1.5 hours; a bare "m" is metres, not minutes
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(hours?|hrs?|h|minutes?|mins?|seconds?|secs?|s)\b").ok()
});

static DURATION_CONTINUATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches the next part of "1 hour 5 minutes" or "1h and 30s"
    Regex::new(r"(?i)^\s*(?:and\s+)?(\d+(?:\.\d+)?)\s*(hours?|hrs?|h|minutes?|mins?|seconds?|secs?|s)\b").ok()
});

static DISTANCE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 400m, 5 km, 1.5 kilometres, 1 mile
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(kilometers?|kilometres?|km|k|miles?|mi|meters?|metres?|m)\b").ok()
});

static PACE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: 6:00, 5:30-5:45, 5:30 to 5:45
    Regex::new(r"(?i)(\d{1,2}):(\d{2})(?:\s*(?:-|–|to)\s*(\d{1,2}):(\d{2}))?").ok()
});

static PERCENT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*%").ok()
});

/// What ends the interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    /// Duration in seconds
    Time(f64),
    /// Distance in metres
    Distance(f64),
}

/// Pace band in min/km; `slow` and `fast` are equal for a single pace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaceRange {
    pub slow: (u32, u32),
    pub fast: (u32, u32),
}

impl PaceRange {
    pub fn single(minutes: u32, seconds: u32) -> Self {
        Self {
            slow: (minutes, seconds),
            fast: (minutes, seconds),
        }
    }

    /// Order two paces so that `slow` is the longer time per km
    pub fn between(a: (u32, u32), b: (u32, u32)) -> Self {
        let (slow, fast) = if minutes_seconds_to_seconds(a.0, a.1) >= minutes_seconds_to_seconds(b.0, b.1) {
            (a, b)
        } else {
            (b, a)
        };
        Self { slow, fast }
    }

    /// Speed target: low from the slower pace, high from the faster one
    pub fn to_target(&self) -> Result<Target, ConversionError> {
        let low = pace_to_speed(self.slow.0, self.slow.1)?;
        let high = pace_to_speed(self.fast.0, self.fast.1)?;
        Ok(Target::speed_range(low, high))
    }
}

/// Effort figure as written by the coach
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effort {
    Percent(f64),
    Label(IntensityType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParameters {
    pub measure: Measure,
    pub pace: PaceRange,
    pub effort: Option<Effort>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("no Time or Distance figure in \"{0}\"")]
    MissingMeasure(String),
    #[error("no Pace figure in \"{0}\"")]
    MissingPace(String),
    #[error("cannot read {field} from \"{text}\"")]
    MalformedFigure { field: &'static str, text: String },
    #[error("parameter patterns failed to compile")]
    PatternUnavailable,
}

fn pattern(cell: &'static LazyLock<Option<Regex>>) -> Result<&'static Regex, ParameterError> {
    cell.as_ref().ok_or(ParameterError::PatternUnavailable)
}

#[derive(Debug, Default)]
struct Segments<'a> {
    time: Option<&'a str>,
    distance: Option<&'a str>,
    pace: Option<&'a str>,
    effort: Option<&'a str>,
}

fn split_segments(text: &str) -> Result<Segments<'_>, ParameterError> {
    let markers: Vec<_> = pattern(&MARKER_PATTERN)?.captures_iter(text).collect();
    let mut segments = Segments::default();

    for (index, captures) in markers.iter().enumerate() {
        let (Some(whole), Some(keyword)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let end = markers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |next| next.start());
        let segment = &text[whole.end()..end];

        // First occurrence wins
        let slot = match keyword.as_str().to_lowercase().as_str() {
            "time" | "duration" => &mut segments.time,
            "distance" => &mut segments.distance,
            "pace" => &mut segments.pace,
            _ => &mut segments.effort,
        };
        slot.get_or_insert(segment);
    }
    Ok(segments)
}

fn parse_number(text: &str, field: &'static str) -> Result<f64, ParameterError> {
    text.parse().map_err(|_| ParameterError::MalformedFigure {
        field,
        text: text.to_string(),
    })
}

/// Read a duration such as `10 minutes`, `1h 5min` or `10:00` into seconds
///
/// Only one run of adjacent figures is read; any other time or distance
/// figure in the segment makes it malformed.
pub fn parse_duration(segment: &str) -> Result<f64, ParameterError> {
    let malformed = || ParameterError::MalformedFigure {
        field: "time",
        text: segment.trim().to_string(),
    };

    if let Some(captures) = pattern(&CLOCK_PATTERN)?.captures(segment) {
        let parts: Vec<f64> = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| parse_number(m.as_str(), "time"))
            .collect::<Result<_, _>>()?;
        let end = captures.get(0).map_or(0, |m| m.end());
        if has_stray_figure(&segment[end..])? {
            return Err(malformed());
        }
        return match parts.as_slice() {
            [minutes, seconds] if *seconds < 60.0 => Ok(minutes * 60.0 + seconds),
            [hours, minutes, seconds] if *minutes < 60.0 && *seconds < 60.0 => {
                Ok(hours * 3600.0 + minutes * 60.0 + seconds)
            }
            _ => Err(malformed()),
        };
    }

    let first = pattern(&DURATION_PART_PATTERN)?.find(segment).ok_or_else(malformed)?;
    if has_stray_figure(&segment[..first.start()])? {
        return Err(malformed());
    }

    let continuation = pattern(&DURATION_CONTINUATION)?;
    let mut total = 0.0;
    let mut end = first.start();
    while let Some(captures) = continuation.captures(&segment[end..]) {
        let (Some(whole), Some(value), Some(unit)) = (captures.get(0), captures.get(1), captures.get(2)) else {
            break;
        };
        let value = parse_number(value.as_str(), "time")?;
        let factor = match unit.as_str().to_lowercase().chars().next() {
            Some('h') => 3600.0,
            Some('m') => 60.0,
            _ => 1.0,
        };
        total += value * factor;
        end += whole.end();
    }

    if has_stray_figure(&segment[end..])? {
        return Err(malformed());
    }
    Ok(total)
}

/// Whether `text` holds a time or distance figure
fn has_stray_figure(text: &str) -> Result<bool, ParameterError> {
    Ok(pattern(&DURATION_PART_PATTERN)?.is_match(text) || pattern(&DISTANCE_PATTERN)?.is_match(text))
}

/// Read a distance such as `400m`, `5 km` or `1 mile` into metres
pub fn parse_distance(segment: &str) -> Result<f64, ParameterError> {
    let captures = pattern(&DISTANCE_PATTERN)?
        .captures(segment)
        .ok_or_else(|| ParameterError::MalformedFigure {
            field: "distance",
            text: segment.trim().to_string(),
        })?;
    let value = parse_number(&captures[1], "distance")?;
    let unit = captures[2].to_lowercase();

    let factor = if unit.starts_with('k') {
        METRES_PER_KM
    } else if unit.starts_with("mi") {
        METRES_PER_MILE
    } else {
        1.0
    };
    Ok(value * factor)
}

fn pace_part(minutes: &str, seconds: &str, segment: &str) -> Result<(u32, u32), ParameterError> {
    let malformed = || ParameterError::MalformedFigure {
        field: "pace",
        text: segment.trim().to_string(),
    };
    let minutes: u32 = minutes.parse().map_err(|_| malformed())?;
    let seconds: u32 = seconds.parse().map_err(|_| malformed())?;
    if seconds >= 60 {
        return Err(malformed());
    }
    Ok((minutes, seconds))
}

/// Read a pace such as `6:00 min/km` or `5:30-5:45 min/km`
pub fn parse_pace(segment: &str) -> Result<PaceRange, ParameterError> {
    let captures = pattern(&PACE_PATTERN)?
        .captures(segment)
        .ok_or_else(|| ParameterError::MalformedFigure {
            field: "pace",
            text: segment.trim().to_string(),
        })?;

    let first = pace_part(&captures[1], &captures[2], segment)?;
    match (captures.get(3), captures.get(4)) {
        (Some(minutes), Some(seconds)) => {
            let second = pace_part(minutes.as_str(), seconds.as_str(), segment)?;
            Ok(PaceRange::between(first, second))
        }
        _ => Ok(PaceRange::single(first.0, first.1)),
    }
}

/// Read an effort such as `60%` or `tempo`; unknown labels are ignored
pub fn parse_effort(segment: &str) -> Result<Option<Effort>, ParameterError> {
    if let Some(captures) = pattern(&PERCENT_PATTERN)?.captures(segment) {
        return Ok(Some(Effort::Percent(parse_number(&captures[1], "effort")?)));
    }
    let label = segment.trim().trim_end_matches(['.', ',', ';']);
    Ok(IntensityType::from_label(label).map(Effort::Label))
}

/// Parse a whole parameter clause
///
/// A `Time:` figure takes precedence over a `Distance:` one.
///
/// ```rust
/// use wahoo_coach::normalize::parameters::{parse_parameters, Measure, Effort};
///
/// let parsed = parse_parameters("Time: 10 minutes, Pace: 6:00 min/km, Effort: 60%").unwrap();
/// assert_eq!(parsed.measure, Measure::Time(600.0));
/// assert_eq!(parsed.effort, Some(Effort::Percent(60.0)));
/// ```
pub fn parse_parameters(text: &str) -> Result<ParsedParameters, ParameterError> {
    let segments = split_segments(text)?;

    let measure = match (segments.time, segments.distance) {
        (Some(time), _) => Measure::Time(parse_duration(time)?),
        (None, Some(distance)) => Measure::Distance(parse_distance(distance)?),
        (None, None) => return Err(ParameterError::MissingMeasure(text.trim().to_string())),
    };

    let pace = segments
        .pace
        .ok_or_else(|| ParameterError::MissingPace(text.trim().to_string()))
        .and_then(parse_pace)?;

    let effort = match segments.effort {
        Some(segment) => parse_effort(segment)?,
        None => None,
    };

    Ok(ParsedParameters { measure, pace, effort })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_with_point_pace_and_percent() {
        let parsed = parse_parameters("Time: 2 minutes, Pace: 4:15 min/km, Effort: 95%").unwrap();
        assert_eq!(parsed.measure, Measure::Time(120.0));
        assert_eq!(parsed.pace, PaceRange::single(4, 15));
        assert_eq!(parsed.effort, Some(Effort::Percent(95.0)));
    }

    #[test]
    fn test_time_wins_over_distance() {
        let parsed = parse_parameters("Distance: 5 km, Time: 25 min, Pace: 5:00 min/km").unwrap();
        assert_eq!(parsed.measure, Measure::Time(1500.0));
    }

    #[test]
    fn test_distance_units() {
        assert_eq!(parse_distance(" 400m").unwrap(), 400.0);
        assert_eq!(parse_distance(" 1.5 km").unwrap(), 1500.0);
        assert_eq!(parse_distance(" 800 meters").unwrap(), 800.0);
        assert!((parse_distance(" 1 mile").unwrap() - 1609.344).abs() < 1e-9);
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_duration(" 1 hour 5 minutes").unwrap(), 3900.0);
        assert_eq!(parse_duration(" 90 seconds").unwrap(), 90.0);
        assert_eq!(parse_duration(" 10:30").unwrap(), 630.0);
        assert_eq!(parse_duration(" 1:05:00").unwrap(), 3900.0);
        assert_eq!(parse_duration(" about 1h and 30s").unwrap(), 3630.0);
        assert!(parse_duration(" a while").is_err());
    }

    #[test]
    fn test_duration_with_stray_figures_is_malformed() {
        assert!(matches!(
            parse_parameters("Time: 2 minutes (about 400 m), Pace: 5:00 min/km"),
            Err(ParameterError::MalformedFigure { field: "time", .. })
        ));
        assert!(matches!(
            parse_duration(" 5 km in 25 minutes"),
            Err(ParameterError::MalformedFigure { field: "time", .. })
        ));
        assert!(matches!(
            parse_duration(" 10:00 then 2 minutes"),
            Err(ParameterError::MalformedFigure { field: "time", .. })
        ));
        // A bare "m" is not read as minutes
        assert!(parse_duration(" 2 m").is_err());
    }

    #[test]
    fn test_pace_range_orders_slow_and_fast() {
        let range = parse_pace(" 5:30-5:45 min/km").unwrap();
        assert_eq!(range.slow, (5, 45));
        assert_eq!(range.fast, (5, 30));

        let target = range.to_target().unwrap();
        assert!(target.low < target.high);
        assert_eq!(target.low, 2.899);
        assert_eq!(target.high, 3.030);
    }

    #[test]
    fn test_pace_with_bad_seconds_is_malformed() {
        assert!(matches!(
            parse_pace(" 5:75 min/km"),
            Err(ParameterError::MalformedFigure { field: "pace", .. })
        ));
    }

    #[test]
    fn test_effort_label() {
        assert_eq!(parse_effort(" tempo.").unwrap(), Some(Effort::Label(IntensityType::Tempo)));
        assert_eq!(parse_effort(" whatever").unwrap(), None);
    }

    #[test]
    fn test_missing_figures() {
        assert!(matches!(
            parse_parameters("Pace: 6:00 min/km"),
            Err(ParameterError::MissingMeasure(_))
        ));
        assert!(matches!(
            parse_parameters("Time: 10 minutes, Effort: 60%"),
            Err(ParameterError::MissingPace(_))
        ));
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let parsed = parse_parameters("time: 10 min; pace: 6:00 min/km").unwrap();
        assert_eq!(parsed.measure, Measure::Time(600.0));
        assert_eq!(parsed.effort, None);
    }
}
