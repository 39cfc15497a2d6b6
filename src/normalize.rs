// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Interval Normalization
//!
//! Turns the flat [`WorkoutComponent`] list extracted from the coach
//! narrative into a validated [`Interval`] tree.
//!
//! - A component with `repetitions > 0` becomes a `repeat` node whose
//!   children are its subset lines, each parsed as a leaf.
//! - Any other component becomes a `time` or `distance` leaf with one
//!   speed target derived from its pace.
//!
//! Names are re-prefixed with their 1-based position (`"2"`, `"2.1"`).
//! Failures are returned as [`NormalizeError`] so that the caller can feed
//! the message back to the text generator.

pub mod parameters;

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::WorkoutComponent;
use crate::plan::{IntensityType, Interval, IntervalError, TriggerType};
use crate::units::ConversionError;
use parameters::{parse_parameters, Effort, Measure, ParameterError};

const DEFAULT_LEAF_NAME: &str = "Interval";

static POSITION_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: "2 ", "2.1 ", "3. "
    Regex::new(r"^\s*\d+(?:\.\d+)*\.?\s+").ok()
});

static NAME_KEYWORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(warm|cool|recover|rest)").ok()
});

/// Marker after which a subset line carries its figures
static PARAMETERS_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bparameters\s*:").ok());

static FIGURE_HEAD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(time|duration|distance|pace|effort|intensity|parameters)\s*$").ok()
});

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no workout components to normalize")]
    NoComponents,

    #[error("component '{component}': {source}")]
    Parameters {
        component: String,
        #[source]
        source: ParameterError,
    },

    #[error("component '{component}': {source}")]
    Conversion {
        component: String,
        #[source]
        source: ConversionError,
    },

    #[error("component '{component}' repeats {repetitions} times but lists no subsets")]
    EmptyRepeat { component: String, repetitions: u32 },

    #[error(transparent)]
    Invalid(#[from] IntervalError),
}

/// Normalize every component, in order, into a validated interval list
pub fn normalize_components(components: &[WorkoutComponent]) -> Result<Vec<Interval>, NormalizeError> {
    if components.is_empty() {
        return Err(NormalizeError::NoComponents);
    }

    components
        .iter()
        .enumerate()
        .map(|(index, component)| -> Result<Interval, NormalizeError> {
            let position = (index + 1).to_string();
            let interval = normalize_component(component, &position)?;
            interval.validate(&position)?;
            Ok(interval)
        })
        .collect()
}

fn normalize_component(component: &WorkoutComponent, position: &str) -> Result<Interval, NormalizeError> {
    let name = positional_name(position, &component.name);

    match component.repetitions {
        Some(repetitions) if repetitions > 0 => {
            if component.subsets.is_empty() {
                return Err(NormalizeError::EmptyRepeat {
                    component: name,
                    repetitions,
                });
            }
            let children = component
                .subsets
                .iter()
                .enumerate()
                .map(|(index, line)| subset_leaf(line, &format!("{position}.{}", index + 1)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Interval::repeat(name, repetitions, children))
        }
        _ => {
            let text = if component.parameters.trim().is_empty() {
                component.description.as_str()
            } else {
                component.parameters.as_str()
            };
            leaf(name, text)
        }
    }
}

/// Parse a subset line of the form `"<name>: <description>. Time: …, Pace: …"`
fn subset_leaf(line: &str, position: &str) -> Result<Interval, NormalizeError> {
    // Figures are only read after the name, so "Race Pace" cannot claim the pace slot
    let (head, body) = match line.split_once(':') {
        Some((head, _)) if is_figure_head(head) => (DEFAULT_LEAF_NAME, line),
        Some((head, rest)) => (head, rest),
        None => (DEFAULT_LEAF_NAME, line),
    };
    let name = positional_name(position, head);
    leaf(name, figures_text(body))
}

fn leaf(name: String, text: &str) -> Result<Interval, NormalizeError> {
    let parsed = parse_parameters(text).map_err(|source| NormalizeError::Parameters {
        component: name.clone(),
        source,
    })?;

    let target = parsed.pace.to_target().map_err(|source| NormalizeError::Conversion {
        component: name.clone(),
        source,
    })?;

    let (trigger, value) = match parsed.measure {
        Measure::Time(seconds) => (TriggerType::Time, seconds),
        Measure::Distance(metres) => (TriggerType::Distance, metres),
    };
    let intensity = classify_intensity(&name, parsed.effort);

    Ok(Interval::leaf(name, trigger, value, vec![target], Some(intensity)))
}

/// Text after an embedded `Parameters:` marker, or the whole line
fn figures_text(line: &str) -> &str {
    match PARAMETERS_MARKER.as_ref().and_then(|re| re.find(line)) {
        Some(marker) => &line[marker.end()..],
        None => line,
    }
}

fn is_figure_head(head: &str) -> bool {
    FIGURE_HEAD.as_ref().is_some_and(|re| re.is_match(head))
}

/// Replace any numeric prefix on `name` with `position`
pub fn positional_name(position: &str, name: &str) -> String {
    let name = name.trim().trim_start_matches(['#', '*', '-']);
    let bare = match POSITION_PREFIX.as_ref() {
        Some(re) => re.replace(name, ""),
        None => name.into(),
    };
    let bare = bare.trim();
    if bare.is_empty() {
        position.to_string()
    } else {
        format!("{position} {bare}")
    }
}

/// Intensity of a leaf
///
/// A warm-up, cool-down, recovery or rest keyword in the name wins, then an
/// effort label, then the effort percentage table. Defaults to `active`.
pub fn classify_intensity(name: &str, effort: Option<Effort>) -> IntensityType {
    let keyword = NAME_KEYWORDS
        .as_ref()
        .and_then(|re| re.captures(name))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_lowercase());

    match (keyword.as_deref(), effort) {
        (Some("warm"), _) => IntensityType::WarmUp,
        (Some("cool"), _) => IntensityType::CoolDown,
        (Some("recover"), _) => IntensityType::Recovery,
        (Some("rest"), _) => IntensityType::Rest,
        (_, Some(Effort::Label(label))) => label,
        (_, Some(Effort::Percent(percent))) => IntensityType::from_effort_percent(percent),
        _ => IntensityType::Active,
    }
}
