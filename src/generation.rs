// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Plan Generation
//!
//! Turns a coach prompt into a validated [`Plan`]:
//!
//! 1. the coach writes today's session as markdown,
//! 2. the extractor turns the markdown into [`WorkoutComponent`] JSON,
//! 3. the components are normalized into intervals; a rejected extraction is
//!    sent back to the extractor with the reason, a bounded number of times,
//! 4. the summarizer writes the plan description.

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::limits::{MAX_NORMALIZATION_ATTEMPTS, MAX_PLAN_DESCRIPTION_CHARS};
use crate::constants::plan_format::DEFAULT_PLAN_NAME;
use crate::llm::{extract_json, LlmError, TextGenerator};
use crate::models::WorkoutComponent;
use crate::normalize::{normalize_components, NormalizeError};
use crate::plan::{Header, Interval, Plan};

pub const COACH_PROMPT: &str = "You are a running coach. You have to provide the user with a running \
workout session for today. Take into account their current level (use their previous workouts as a \
guideline), their running goals, the feedback they have given on previous workouts and other factors \
such as how long it has been since the last workout, what kind of workout it was, how difficult it was \
and how much time is available today. Do not include stretching in the workout, only a warm up and a \
cool down.
Vary the type of session across days:
- Steady Runs: Moderate effort to build aerobic capacity.
- Intervals: Short bursts at race pace or faster for speed development.
- Tempo Runs: Sustainable high-effort pace to improve lactate threshold.
- Hill Repeats: Develops strength and running form.
- Recovery Runs: Easy pace to support regeneration.
- Long Runs: Gradually increased distance to build endurance.
Present each interval as follows.
If there are no subsets:
## x Name
- Description: ...
- Parameters: Time: ..., Pace: ...
If there are subsets:
## x Name
- Repetitions: ... (how many times to repeat the subsets)
- Subsets:
    ## x.1 Name
    - Description: ...
    - Parameters: Time: ..., Pace: ...
The warm up is the first interval. Give every pace in min/km as a range, for example 5:30-5:45 min/km.";

pub const EXTRACTOR_PROMPT: &str = r#"You convert a running workout written in markdown into a JSON array of workout components. Answer with the JSON array only.

Each component has the fields "name", "description", "parameters", "repetitions" and "subsets".
A component that repeats a block sets "repetitions" and lists each block step in "subsets" as one line holding its name, description and parameters.

Input:
## 1 Warm-Up
- Description: Gradually increase your heart rate and prepare your muscles for the workout.
- Parameters: Time: 10 minutes, Pace: 6:00 min/km, Effort: 60%
## 2 Intervals
- Repetitions: 5
- Subsets:
    ## 2.1 Hard Interval
    - Description: Short, intense segment at race pace.
    - Parameters: Time: 2 minutes, Pace: 4:15 min/km, Effort: 95%
    ## 2.2 Recovery Interval
    - Description: Easy jogging to recover.
    - Parameters: Time: 2 minutes, Pace: 6:00 min/km, Effort: 60%
## 3 Cool Down
- Description: Gradually lower your heart rate and help your body recover.
- Parameters: Time: 10 minutes, Pace: 6:30 min/km, Effort: 50%

Output:
[
  {"name": "1 Warm-Up", "description": "Gradually increase your heart rate and prepare your muscles for the workout.", "parameters": "Time: 10 minutes, Pace: 6:00 min/km, Effort: 60%", "repetitions": null, "subsets": []},
  {"name": "2 Intervals", "description": "", "parameters": "", "repetitions": 5, "subsets": ["2.1 Hard Interval: Short, intense segment at race pace. Time: 2 minutes, Pace: 4:15 min/km, Effort: 95%", "2.2 Recovery Interval: Easy jogging to recover. Time: 2 minutes, Pace: 6:00 min/km, Effort: 60%"]},
  {"name": "3 Cool Down", "description": "Gradually lower your heart rate and help your body recover.", "parameters": "Time: 10 minutes, Pace: 6:30 min/km, Effort: 50%", "repetitions": null, "subsets": []}
]"#;

pub const SUMMARIZER_PROMPT: &str = "Summarize the following training session in less than 50 words: \
describe it and say how it will help achieve the running goals.";

/// Reasons an extraction answer is sent back
#[derive(Debug, Error)]
enum ExtractionError {
    #[error("the answer did not contain JSON: {0}")]
    NoJson(#[source] LlmError),

    #[error("the JSON is not a list of workout components: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// A generated plan with the text it was built from
#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub narrative: String,
    pub components: Vec<WorkoutComponent>,
    pub plan: Plan,
    /// Extraction attempts used, at least 1
    pub attempts: usize,
}

pub struct PlanGenerator<G: TextGenerator> {
    generator: G,
    max_attempts: usize,
}

impl<G: TextGenerator> PlanGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            max_attempts: MAX_NORMALIZATION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Generate, normalize and validate today's plan
    pub async fn generate(&self, user_prompt: &str, threshold_speed: Option<f64>) -> Result<GeneratedPlan> {
        let narrative = self
            .generator
            .complete(COACH_PROMPT, user_prompt)
            .await
            .context("Failed to generate the workout")?;
        info!(chars = narrative.len(), "Workout narrative generated");

        let (components, intervals, attempts) = self.extract_intervals(&narrative).await?;

        let summary = self
            .generator
            .complete(SUMMARIZER_PROMPT, &narrative)
            .await
            .context("Failed to summarize the workout")?;
        let description = truncate_chars(summary.trim(), MAX_PLAN_DESCRIPTION_CHARS);

        let header = Header::running(DEFAULT_PLAN_NAME, Some(description), threshold_speed);
        let plan = Plan::new(header, intervals).with_estimates();
        plan.validate().context("Generated plan is invalid")?;

        info!(
            intervals = plan.intervals.len(),
            duration_s = ?plan.header.duration_s,
            attempts,
            "Plan generated"
        );
        Ok(GeneratedPlan {
            narrative,
            components,
            plan,
            attempts,
        })
    }

    async fn extract_intervals(&self, narrative: &str) -> Result<(Vec<WorkoutComponent>, Vec<Interval>, usize)> {
        let mut message = narrative.to_string();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let answer = self
                .generator
                .complete(EXTRACTOR_PROMPT, &message)
                .await
                .context("Failed to extract workout components")?;

            match parse_and_normalize(&answer) {
                Ok((components, intervals)) => return Ok((components, intervals, attempt)),
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, reason = %e, "Workout extraction rejected");
                    message = format!(
                        "{narrative}\n\nYour previous answer was:\n{answer}\n\nIt was rejected: {e}. Answer again with the corrected JSON array."
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e).with_context(|| format!("Workout extraction failed after {} attempts", self.max_attempts)),
            None => anyhow::bail!("Workout extraction was not attempted"),
        }
    }
}

fn parse_and_normalize(answer: &str) -> Result<(Vec<WorkoutComponent>, Vec<Interval>), ExtractionError> {
    let json = extract_json(answer).map_err(ExtractionError::NoJson)?;
    let components: Vec<WorkoutComponent> = serde_json::from_str(&json)?;
    let intervals = normalize_components(&components)?;
    Ok((components, intervals))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
