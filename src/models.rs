// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Data Models
//!
//! Records exchanged with the Wahoo API and the local cache, plus the
//! intermediate [`WorkoutComponent`] produced by the text generator.
//!
//! ## Core Models
//!
//! - [`WorkoutData`]: a workout as listed by the remote collection
//! - [`WorkoutPage`]: one page of the workouts endpoint
//! - [`WorkoutComponent`]: a loosely structured workout block awaiting normalization
//! - [`WorkoutFeedback`]: the athlete's rating of a past workout
//! - [`StoredPlan`]: a plan payload kept in the cache
//! - [`StoredTokens`]: the persisted OAuth token pair

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A workout from the remote collection
///
/// # Examples
///
/// ```rust
/// use wahoo_coach::models::WorkoutData;
///
/// let workout: WorkoutData = serde_json::from_str(r#"{
///     "id": 101,
///     "starts": "2024-01-15T08:00:00.000Z",
///     "minutes": 45,
///     "name": "Morning Run",
///     "plan_id": null,
///     "route_id": null,
///     "workout_token": "abc",
///     "workout_type_id": 1,
///     "day_code": null,
///     "workout_summary": {"distance_accum": "8200.5", "file": {"url": "https://cdn.example.com/101.fit"}},
///     "created_at": "2024-01-15T09:00:00.000Z",
///     "updated_at": "2024-01-15T09:00:00.000Z"
/// }"#).unwrap();
///
/// assert_eq!(workout.distance_m(), Some(8200.5));
/// assert_eq!(workout.samples_file_url(), Some("https://cdn.example.com/101.fit"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutData {
    /// Remote-assigned unique id
    pub id: i64,
    /// Start of the workout (UTC)
    pub starts: DateTime<Utc>,
    pub minutes: i64,
    pub name: String,
    pub plan_id: Option<i64>,
    pub route_id: Option<i64>,
    pub workout_token: String,
    pub workout_type_id: i64,
    pub day_code: Option<i64>,
    /// Opaque summary; may reference the detailed-sample file under `file.url`
    pub workout_summary: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkoutData {
    /// Numeric summary field; the API reports some of them as strings
    pub fn summary_number(&self, key: &str) -> Option<f64> {
        match self.workout_summary.as_ref()?.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Distance covered in metres
    pub fn distance_m(&self) -> Option<f64> {
        self.summary_number("distance_accum")
    }

    /// Average speed in m/s
    pub fn average_speed(&self) -> Option<f64> {
        self.summary_number("speed_avg")
    }

    /// URL of the downloadable detailed-sample (FIT) file
    pub fn samples_file_url(&self) -> Option<&str> {
        self.workout_summary.as_ref()?.get("file")?.get("url")?.as_str()
    }
}

/// One page of the workouts endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPage {
    pub workouts: Vec<WorkoutData>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub order: String,
    pub sort: String,
}

impl WorkoutPage {
    /// `starts` of the last (oldest, for descending order) record on the page
    pub fn last_starts(&self) -> Option<DateTime<Utc>> {
        self.workouts.last().map(|w| w.starts)
    }
}

/// Fields sent when creating a workout on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkout {
    pub name: String,
    pub starts: DateTime<Utc>,
    pub minutes: i64,
    pub workout_token: String,
    pub workout_type_id: i64,
    pub plan_id: Option<i64>,
}

/// A workout block extracted from the coach narrative
///
/// `parameters` is free text such as
/// `"Time: 10 minutes, Pace: 6:00 min/km, Effort: 60%"`. When `repetitions`
/// is set, `subsets` holds one free-text line per repeated block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutComponent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub repetitions: Option<u32>,
    #[serde(default)]
    pub subsets: Vec<String>,
}

/// Athlete feedback for a workout
///
/// Both fields are `None` when the workout has not been rated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutFeedback {
    /// Rate of perceived exertion, 1-10
    pub rpe: Option<u8>,
    pub feedback: Option<String>,
}

/// Plan row of the local cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
    pub id: i64,
    /// Base64 plan payload
    pub payload: String,
    /// Correlation id sent to the platform as `external_id`
    pub external_id: String,
    pub remote_plan_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// OAuth token pair persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
}

impl StoredTokens {
    /// Whether the access token is expired, or will be within `margin_secs`
    pub fn is_expired(&self, margin_secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(margin_secs) >= self.access_token_expires_at
    }
}

/// Plan as acknowledged by the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePlan {
    pub id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_workout_json() -> Value {
        json!({
            "id": 7,
            "starts": "2024-03-02T07:30:00.000Z",
            "minutes": 50,
            "name": "Tempo",
            "plan_id": 12,
            "route_id": null,
            "workout_token": "tok",
            "workout_type_id": 1,
            "day_code": 3,
            "workout_summary": {"speed_avg": 3.1, "distance_accum": "9300.0"},
            "created_at": "2024-03-02T08:30:00.000Z",
            "updated_at": "2024-03-02T08:31:00.000Z"
        })
    }

    #[test]
    fn test_workout_deserializes_millisecond_timestamps() {
        let workout: WorkoutData = serde_json::from_value(sample_workout_json()).unwrap();
        assert_eq!(workout.starts.to_rfc3339(), "2024-03-02T07:30:00+00:00");
        assert_eq!(workout.plan_id, Some(12));
        assert_eq!(workout.average_speed(), Some(3.1));
        assert_eq!(workout.distance_m(), Some(9300.0));
        assert_eq!(workout.samples_file_url(), None);
    }

    #[test]
    fn test_page_last_starts() {
        let page: WorkoutPage = serde_json::from_value(json!({
            "workouts": [sample_workout_json()],
            "total": 1,
            "page": 1,
            "per_page": 50,
            "order": "descending",
            "sort": "starts"
        }))
        .unwrap();
        assert_eq!(page.last_starts(), Some(page.workouts[0].starts));

        let empty = WorkoutPage { workouts: vec![], ..page };
        assert_eq!(empty.last_starts(), None);
    }

    #[test]
    fn test_component_defaults() {
        let component: WorkoutComponent = serde_json::from_value(json!({
            "name": "1 Warm-Up",
            "parameters": "Time: 10 minutes, Pace: 6:00 min/km"
        }))
        .unwrap();
        assert_eq!(component.repetitions, None);
        assert!(component.subsets.is_empty());
        assert!(component.description.is_empty());
    }

    #[test]
    fn test_token_expiry_margin() {
        let tokens = StoredTokens {
            access_token: "a".into(),
            access_token_expires_at: Utc::now() + chrono::Duration::seconds(30),
            refresh_token: "r".into(),
        };
        assert!(!tokens.is_expired(0));
        assert!(tokens.is_expired(60));
    }

    #[test]
    fn test_feedback_default_is_empty() {
        let feedback = WorkoutFeedback::default();
        assert_eq!(serde_json::to_value(&feedback).unwrap(), json!({"rpe": null, "feedback": null}));
    }
}
