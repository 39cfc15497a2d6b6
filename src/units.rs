// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Unit Conversions
//!
//! Pace, speed and duration helpers shared by the normalization pipeline and
//! the prompt context. Paces are always expressed per kilometre and speeds in
//! metres per second.

use thiserror::Error;

/// Errors raised by the conversion helpers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Pace of 0:00 or a speed that is zero, negative or not finite
    #[error("Division by zero: {0}")]
    DivideByZero(String),
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Convert a `minutes:seconds` split to a total number of seconds
pub fn minutes_seconds_to_seconds(minutes: u32, seconds: u32) -> u32 {
    minutes * 60 + seconds
}

/// Split a number of seconds into whole minutes and the remaining seconds
pub fn seconds_to_minutes_seconds(total_seconds: u32) -> (u32, u32) {
    (total_seconds / 60, total_seconds % 60)
}

/// Convert a pace in min/km to a speed in m/s, rounded to 3 decimals
///
/// ```rust
/// use wahoo_coach::units::pace_to_speed;
///
/// assert_eq!(pace_to_speed(6, 0).unwrap(), 2.778);
/// assert_eq!(pace_to_speed(4, 15).unwrap(), 3.922);
/// ```
pub fn pace_to_speed(minutes: u32, seconds: u32) -> Result<f64, ConversionError> {
    let seconds_per_km = minutes_seconds_to_seconds(minutes, seconds);
    if seconds_per_km == 0 {
        return Err(ConversionError::DivideByZero(format!(
            "pace {minutes}:{seconds:02} min/km has no duration"
        )));
    }
    Ok(round_to(1000.0 / f64::from(seconds_per_km), 3))
}

/// Convert a speed in m/s to a pace split into `(minutes, seconds)` per km
///
/// Seconds are rounded to the nearest whole second.
pub fn speed_to_pace_parts(speed_mps: f64) -> Result<(u32, u32), ConversionError> {
    if !speed_mps.is_finite() || speed_mps <= 0.0 {
        return Err(ConversionError::DivideByZero(format!(
            "speed {speed_mps} m/s cannot be expressed as a pace"
        )));
    }

    let pace_minutes = (1000.0 / 60.0) / speed_mps;
    let mut minutes = pace_minutes.trunc() as u32;
    let mut seconds = ((pace_minutes - pace_minutes.trunc()) * 60.0).round() as u32;
    if seconds == 60 {
        minutes += 1;
        seconds = 0;
    }
    Ok((minutes, seconds))
}

/// Format a speed in m/s as a pace string such as `5:30min/km`
pub fn speed_to_pace(speed_mps: f64) -> Result<String, ConversionError> {
    let (minutes, seconds) = speed_to_pace_parts(speed_mps)?;
    Ok(format!("{minutes}:{seconds:02}min/km"))
}
