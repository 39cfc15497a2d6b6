// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Coach Prompt Context
//!
//! Builds the user prompt handed to the coach from the training goal, the
//! current program week and the most recent cached workouts with their
//! feedback.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

use crate::config::{TrainingConfig, WeekObjective};
use crate::constants::limits::RECENT_WORKOUTS_IN_PROMPT;
use crate::database::Database;
use crate::models::{WorkoutData, WorkoutFeedback};
use crate::units::speed_to_pace;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Week number {0} out of range")]
    WeekOutOfRange(i64),
}

/// Goal, progress and days left until the race
pub fn goal_context(training: &TrainingConfig, today: NaiveDate) -> String {
    let days_left = (training.deadline - today).num_days().max(0);
    let goal = &training.goal;
    let progress = &training.current_progress;

    format!(
        "The goal is to run {:.0}m under {}. The current progress is {:.0}m in {}. Our race is in {days_left} days.",
        goal.distance_m, goal.time, progress.distance_m, progress.time
    )
}

/// Objective of the program block containing `week_number`
pub fn week_context(week_number: i64, weeks: &[WeekObjective]) -> Result<String, ContextError> {
    weeks
        .iter()
        .find(|week| i64::from(week.start) <= week_number && week_number <= i64::from(week.end))
        .map(|week| format!("We are in {}. {}", week.title, week.objective))
        .ok_or(ContextError::WeekOutOfRange(week_number))
}

/// One line per workout, newest first
pub fn recent_workouts_context(workouts: &[WorkoutData], feedback: &HashMap<i64, WorkoutFeedback>) -> String {
    if workouts.is_empty() {
        return "No previous workouts are recorded.".to_string();
    }

    let mut output = String::from("Previous workouts:\n");
    for workout in workouts {
        let _ = write!(
            output,
            "- {} on {}: {} min",
            workout.name,
            workout.starts.format("%Y-%m-%d"),
            workout.minutes
        );
        if let Some(distance) = workout.distance_m() {
            let _ = write!(output, ", {distance:.0}m");
        }
        if let Some(pace) = workout.average_speed().and_then(|speed| speed_to_pace(speed).ok()) {
            let _ = write!(output, ", average pace {pace}");
        }
        if let Some(entry) = feedback.get(&workout.id) {
            if let Some(rpe) = entry.rpe {
                let _ = write!(output, ", RPE {rpe}/10");
            }
            if let Some(note) = &entry.feedback {
                let _ = write!(output, ", feedback: \"{note}\"");
            }
        }
        output.push('\n');
    }
    output
}

/// Assemble the full coach prompt from the cache and the training config
pub async fn build_user_prompt(
    db: &Database,
    training: &TrainingConfig,
    today: NaiveDate,
) -> anyhow::Result<String> {
    let mut sections = vec![goal_context(training, today)];

    if let Some(week) = training.week_number(today) {
        sections.push(week_context(week, &training.weeks)?);
    }

    let workouts = db.recent_workouts(RECENT_WORKOUTS_IN_PROMPT).await?;
    let ids: Vec<i64> = workouts.iter().map(|w| w.id).collect();
    let feedback = db.get_feedback_for_workouts(&ids).await?;
    sections.push(recent_workouts_context(&workouts, &feedback));

    if let Some(minutes) = training.available_minutes {
        sections.push(format!("I have {minutes} minutes available today."));
    }
    sections.push(format!("Today is {}.", today.format("%A %Y-%m-%d")));

    Ok(sections.join("\n\n"))
}
