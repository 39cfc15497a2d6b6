// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Workout Plan Model
//!
//! The structured plan uploaded to Wahoo: a [`Header`] followed by an ordered
//! list of top-level [`Interval`]s. Intervals form a tree: a leaf carries
//! pacing [`Target`]s and ends on time or distance, a `repeat` node carries
//! nested intervals and ends after a number of repetitions.
//!
//! ## Wire format
//!
//! The platform takes the plan as an opaque file. The payload is the UTF-8
//! JSON encoding of [`Plan`], base64 encoded with the standard padded
//! alphabet (see [`Plan::to_payload`]).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::constants::limits::{MAX_PLAN_DESCRIPTION_CHARS, MAX_PLAN_PAYLOAD_BYTES};
use crate::constants::plan_format::{PLAN_VERSION, WORKOUT_TYPE_FAMILY_RUNNING, WORKOUT_TYPE_LOCATION_OUTDOOR};

/// Kind of pacing target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Speed in metres per second
    Speed,
    /// Percentage of the athlete's threshold speed
    ThresholdSpeed,
}

/// Acceptable range for a metric while the interval runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub low: f64,
    pub high: f64,
}

impl Target {
    /// Point speed target where low and high are equal
    pub fn speed(speed_mps: f64) -> Self {
        Self::speed_range(speed_mps, speed_mps)
    }

    pub fn speed_range(low: f64, high: f64) -> Self {
        Self {
            target_type: TargetType::Speed,
            low,
            high,
        }
    }

    /// Middle of the range
    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    fn check(&self) -> Result<(), Violation> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low < 0.0 {
            return Err(Violation::InvalidTarget {
                low: self.low,
                high: self.high,
            });
        }
        if self.low > self.high {
            return Err(Violation::InvertedTarget {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// What ends an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Value is a duration in seconds
    Time,
    /// Value is a distance in metres
    Distance,
    /// Value is the number of repetitions of the nested intervals
    Repeat,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Time => write!(f, "time"),
            TriggerType::Distance => write!(f, "distance"),
            TriggerType::Repeat => write!(f, "repeat"),
        }
    }
}

/// Intensity label shown on the device for an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntensityType {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "warm up")]
    WarmUp,
    #[serde(rename = "tempo")]
    Tempo,
    #[serde(rename = "lactate threshold")]
    LactateThreshold,
    #[serde(rename = "maximal aerobic power")]
    MaximalAerobicPower,
    #[serde(rename = "anaerobic capacity")]
    AnaerobicCapacity,
    #[serde(rename = "cool down")]
    CoolDown,
    #[serde(rename = "recovery")]
    Recovery,
    #[serde(rename = "rest")]
    Rest,
}

impl IntensityType {
    pub const ALL: [IntensityType; 9] = [
        IntensityType::Active,
        IntensityType::WarmUp,
        IntensityType::Tempo,
        IntensityType::LactateThreshold,
        IntensityType::MaximalAerobicPower,
        IntensityType::AnaerobicCapacity,
        IntensityType::CoolDown,
        IntensityType::Recovery,
        IntensityType::Rest,
    ];

    /// Wire label
    pub fn label(&self) -> &'static str {
        match self {
            IntensityType::Active => "active",
            IntensityType::WarmUp => "warm up",
            IntensityType::Tempo => "tempo",
            IntensityType::LactateThreshold => "lactate threshold",
            IntensityType::MaximalAerobicPower => "maximal aerobic power",
            IntensityType::AnaerobicCapacity => "anaerobic capacity",
            IntensityType::CoolDown => "cool down",
            IntensityType::Recovery => "recovery",
            IntensityType::Rest => "rest",
        }
    }

    /// Parse a free-text label, tolerating case, hyphens and common shorthands
    pub fn from_label(text: &str) -> Option<Self> {
        let normalized: String = text
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "active" | "easy" | "steady" | "endurance" => Some(IntensityType::Active),
            "warm up" | "warmup" => Some(IntensityType::WarmUp),
            "tempo" => Some(IntensityType::Tempo),
            "lactate threshold" | "threshold" | "lt" => Some(IntensityType::LactateThreshold),
            "maximal aerobic power" | "map" | "vo2max" | "vo2 max" => {
                Some(IntensityType::MaximalAerobicPower)
            }
            "anaerobic capacity" | "anaerobic" | "sprint" => Some(IntensityType::AnaerobicCapacity),
            "cool down" | "cooldown" => Some(IntensityType::CoolDown),
            "recovery" | "recover" => Some(IntensityType::Recovery),
            "rest" => Some(IntensityType::Rest),
            _ => None,
        }
    }

    /// Classify an effort percentage
    ///
    /// | effort      | label                 |
    /// |-------------|-----------------------|
    /// | < 60 %      | recovery              |
    /// | 60 – 74 %   | active                |
    /// | 75 – 84 %   | tempo                 |
    /// | 85 – 89 %   | lactate threshold     |
    /// | 90 – 94 %   | maximal aerobic power |
    /// | ≥ 95 %      | anaerobic capacity    |
    pub fn from_effort_percent(percent: f64) -> Self {
        match percent {
            p if p < 60.0 => IntensityType::Recovery,
            p if p < 75.0 => IntensityType::Active,
            p if p < 85.0 => IntensityType::Tempo,
            p if p < 90.0 => IntensityType::LactateThreshold,
            p if p < 95.0 => IntensityType::MaximalAerobicPower,
            _ => IntensityType::AnaerobicCapacity,
        }
    }
}

impl fmt::Display for IntensityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A node of the interval tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exit_trigger_type: TriggerType,
    pub exit_trigger_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity_type: Option<IntensityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<Target>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<Interval>>,
}

/// A broken interval invariant
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("targets must be empty for a repeat interval")]
    RepeatWithTargets,
    #[error("intensity_type must be empty for a repeat interval")]
    RepeatWithIntensity,
    #[error("a repeat interval must contain nested intervals")]
    RepeatWithoutIntervals,
    #[error("repeat count must be a positive integer, got {0}")]
    InvalidRepeatCount(f64),
    #[error("a {0} interval must have targets")]
    MissingTargets(TriggerType),
    #[error("a {0} interval cannot contain nested intervals")]
    UnexpectedIntervals(TriggerType),
    #[error("{trigger} value must be a positive number, got {value}")]
    NonPositiveValue { trigger: TriggerType, value: f64 },
    #[error("target range {low}..{high} is not a valid non-negative range")]
    InvalidTarget { low: f64, high: f64 },
    #[error("target low {low} is greater than high {high}")]
    InvertedTarget { low: f64, high: f64 },
}

/// Validation failure located in the tree
///
/// `path` is the 1-based position of the offending node, e.g. `2.1`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("interval {path} ({name}): {violation}")]
pub struct IntervalError {
    pub path: String,
    pub name: String,
    pub violation: Violation,
}

impl Interval {
    /// Leaf interval ending on a time or distance trigger
    pub fn leaf(
        name: impl Into<String>,
        exit_trigger_type: TriggerType,
        exit_trigger_value: f64,
        targets: Vec<Target>,
        intensity_type: Option<IntensityType>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            exit_trigger_type,
            exit_trigger_value,
            intensity_type,
            targets: Some(targets),
            intervals: None,
        }
    }

    /// Composite interval repeating `intervals` `count` times
    pub fn repeat(name: impl Into<String>, count: u32, intervals: Vec<Interval>) -> Self {
        Self {
            name: Some(name.into()),
            exit_trigger_type: TriggerType::Repeat,
            exit_trigger_value: f64::from(count),
            intensity_type: None,
            targets: None,
            intervals: Some(intervals),
        }
    }

    pub fn is_repeat(&self) -> bool {
        self.exit_trigger_type == TriggerType::Repeat
    }

    fn has_targets(&self) -> bool {
        self.targets.as_ref().is_some_and(|t| !t.is_empty())
    }

    fn has_intervals(&self) -> bool {
        self.intervals.as_ref().is_some_and(|i| !i.is_empty())
    }

    /// Check this node and every nested node
    ///
    /// `path` locates the node in error messages.
    pub fn validate(&self, path: &str) -> Result<(), IntervalError> {
        self.check_node().map_err(|violation| IntervalError {
            path: path.to_string(),
            name: self.name.clone().unwrap_or_default(),
            violation,
        })?;

        if let Some(children) = &self.intervals {
            for (index, child) in children.iter().enumerate() {
                child.validate(&format!("{path}.{}", index + 1))?;
            }
        }
        Ok(())
    }

    fn check_node(&self) -> Result<(), Violation> {
        let value = self.exit_trigger_value;
        match self.exit_trigger_type {
            TriggerType::Repeat => {
                if self.has_targets() {
                    return Err(Violation::RepeatWithTargets);
                }
                if self.intensity_type.is_some() {
                    return Err(Violation::RepeatWithIntensity);
                }
                if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
                    return Err(Violation::InvalidRepeatCount(value));
                }
                if !self.has_intervals() {
                    return Err(Violation::RepeatWithoutIntervals);
                }
            }
            trigger @ (TriggerType::Time | TriggerType::Distance) => {
                if !value.is_finite() || value <= 0.0 {
                    return Err(Violation::NonPositiveValue { trigger, value });
                }
                if self.has_intervals() {
                    return Err(Violation::UnexpectedIntervals(trigger));
                }
                if !self.has_targets() {
                    return Err(Violation::MissingTargets(trigger));
                }
                for target in self.targets.iter().flatten() {
                    target.check()?;
                }
            }
        }
        Ok(())
    }

    fn speed_target(&self) -> Option<f64> {
        self.targets
            .iter()
            .flatten()
            .find(|t| t.target_type == TargetType::Speed)
            .map(Target::mid)
            .filter(|speed| *speed > 0.0)
    }

    /// Expected duration in seconds, going through the speed target for
    /// distance intervals
    pub fn estimated_duration_s(&self) -> Option<f64> {
        match self.exit_trigger_type {
            TriggerType::Time => Some(self.exit_trigger_value),
            TriggerType::Distance => self.speed_target().map(|speed| self.exit_trigger_value / speed),
            TriggerType::Repeat => {
                let per_round = sum_estimates(self.intervals.iter().flatten(), Interval::estimated_duration_s)?;
                Some(per_round * self.exit_trigger_value)
            }
        }
    }

    /// Expected distance in metres, going through the speed target for
    /// timed intervals
    pub fn estimated_distance_m(&self) -> Option<f64> {
        match self.exit_trigger_type {
            TriggerType::Distance => Some(self.exit_trigger_value),
            TriggerType::Time => self.speed_target().map(|speed| self.exit_trigger_value * speed),
            TriggerType::Repeat => {
                let per_round = sum_estimates(self.intervals.iter().flatten(), Interval::estimated_distance_m)?;
                Some(per_round * self.exit_trigger_value)
            }
        }
    }
}

fn sum_estimates<'a>(
    intervals: impl Iterator<Item = &'a Interval>,
    estimate: fn(&Interval) -> Option<f64>,
) -> Option<f64> {
    intervals.map(estimate).sum()
}

/// Plan metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<u64>,
    pub workout_type_family: u32,
    pub workout_type_location: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_speed: Option<f64>,
}

impl Header {
    /// Header for an outdoor running plan
    pub fn running(name: impl Into<String>, description: Option<String>, threshold_speed: Option<f64>) -> Self {
        Self {
            name: name.into(),
            version: PLAN_VERSION.to_string(),
            description,
            duration_s: None,
            distance_m: None,
            workout_type_family: WORKOUT_TYPE_FAMILY_RUNNING,
            workout_type_location: WORKOUT_TYPE_LOCATION_OUTDOOR,
            threshold_speed,
        }
    }
}

/// Plan-level validation and encoding failures
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan version must be {expected}, got {found}")]
    UnsupportedVersion { expected: &'static str, found: String },

    #[error("plan name cannot be empty")]
    EmptyName,

    #[error("plan description is {chars} characters, limit is {limit}")]
    DescriptionTooLong { chars: usize, limit: usize },

    #[error("plan has no intervals")]
    NoIntervals,

    #[error("threshold_speed targets require header.threshold_speed")]
    MissingThresholdSpeed,

    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error("encoded plan is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("plan JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A complete workout plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub header: Header,
    pub intervals: Vec<Interval>,
}

impl Plan {
    pub fn new(header: Header, intervals: Vec<Interval>) -> Self {
        Self { header, intervals }
    }

    /// Fill the header duration and distance from the interval estimates
    /// when every interval can be estimated
    pub fn with_estimates(mut self) -> Self {
        self.header.duration_s =
            sum_estimates(self.intervals.iter(), Interval::estimated_duration_s).map(|s| s.round() as u64);
        self.header.distance_m =
            sum_estimates(self.intervals.iter(), Interval::estimated_distance_m).map(|m| m.round() as u64);
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let header = &self.header;
        if header.version != PLAN_VERSION {
            return Err(PlanError::UnsupportedVersion {
                expected: PLAN_VERSION,
                found: header.version.clone(),
            });
        }
        if header.name.trim().is_empty() {
            return Err(PlanError::EmptyName);
        }
        if let Some(description) = &header.description {
            let chars = description.chars().count();
            if chars > MAX_PLAN_DESCRIPTION_CHARS {
                return Err(PlanError::DescriptionTooLong {
                    chars,
                    limit: MAX_PLAN_DESCRIPTION_CHARS,
                });
            }
        }
        if self.intervals.is_empty() {
            return Err(PlanError::NoIntervals);
        }

        for (index, interval) in self.intervals.iter().enumerate() {
            interval.validate(&(index + 1).to_string())?;
        }

        if header.threshold_speed.is_none() && uses_threshold_speed(&self.intervals) {
            return Err(PlanError::MissingThresholdSpeed);
        }
        Ok(())
    }

    /// Validate and encode as base64 of the JSON document
    pub fn to_payload(&self) -> Result<String, PlanError> {
        self.validate()?;
        let json = serde_json::to_vec(self)?;
        let payload = STANDARD.encode(json);
        if payload.len() > MAX_PLAN_PAYLOAD_BYTES {
            return Err(PlanError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_PLAN_PAYLOAD_BYTES,
            });
        }
        Ok(payload)
    }

    /// Decode a payload produced by [`Plan::to_payload`]
    pub fn from_payload(payload: &str) -> Result<Self, PlanError> {
        let json = STANDARD.decode(payload.trim())?;
        let plan: Plan = serde_json::from_slice(&json)?;
        plan.validate()?;
        Ok(plan)
    }
}

fn uses_threshold_speed(intervals: &[Interval]) -> bool {
    intervals.iter().any(|interval| {
        interval
            .targets
            .iter()
            .flatten()
            .any(|t| t.target_type == TargetType::ThresholdSpeed)
            || interval.intervals.as_deref().is_some_and(uses_threshold_speed)
    })
}
