// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lap rows from a workout's detailed-sample FIT file

use fitparser::profile::MesgNum;
use fitparser::Value;
use serde::Serialize;
use thiserror::Error;

use crate::units::speed_to_pace;

#[derive(Debug, Error)]
pub enum SamplesError {
    #[error("FIT parse error: {0}")]
    Parse(String),

    #[error("no lap messages in FIT file")]
    NoLaps,
}

/// One lap of a recorded workout
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LapRecord {
    /// m/s
    pub avg_speed: Option<f64>,
    /// m
    pub distance: Option<f64>,
    /// s
    pub elapsed_time: Option<f64>,
    /// m
    pub ascent: Option<f64>,
    /// m
    pub descent: Option<f64>,
    /// %
    pub grade: Option<f64>,
}

impl LapRecord {
    pub fn pace(&self) -> Option<String> {
        self.avg_speed.and_then(|speed| speed_to_pace(speed).ok())
    }
}

/// Parse every lap message, in file order
pub fn parse_laps(content: &[u8]) -> Result<Vec<LapRecord>, SamplesError> {
    let fit_data = fitparser::from_bytes(content).map_err(|e| SamplesError::Parse(e.to_string()))?;

    let laps: Vec<LapRecord> = fit_data
        .iter()
        .filter(|record| record.kind() == MesgNum::Lap)
        .map(|record| {
            lap_from_fields(
                record
                    .fields()
                    .iter()
                    .map(|field| (field.name(), numeric(field.value()))),
            )
        })
        .collect();

    if laps.is_empty() {
        return Err(SamplesError::NoLaps);
    }
    Ok(laps)
}

fn lap_from_fields<'a>(fields: impl Iterator<Item = (&'a str, Option<f64>)>) -> LapRecord {
    let mut lap = LapRecord::default();
    let mut enhanced_speed = None;
    for (name, value) in fields {
        match name {
            // Enhanced fields carry the same measure at a wider range
            "enhanced_avg_speed" => enhanced_speed = value.or(enhanced_speed),
            "avg_speed" => lap.avg_speed = lap.avg_speed.or(value),
            "total_distance" => lap.distance = value,
            "total_elapsed_time" => lap.elapsed_time = value,
            "total_ascent" => lap.ascent = value,
            "total_descent" => lap.descent = value,
            "avg_grade" => lap.grade = value,
            _ => {}
        }
    }
    lap.avg_speed = enhanced_speed.or(lap.avg_speed);
    lap
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Float64(v) => Some(*v),
        Value::Float32(v) => Some(f64::from(*v)),
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) => Some(f64::from(*v)),
        Value::UInt16(v) | Value::UInt16z(v) => Some(f64::from(*v)),
        Value::UInt32(v) | Value::UInt32z(v) => Some(f64::from(*v)),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt64(v) | Value::UInt64z(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fit_returns_error() {
        assert!(matches!(parse_laps(&[]), Err(SamplesError::Parse(_))));
    }

    #[test]
    fn test_garbage_fit_returns_error() {
        assert!(parse_laps(b"not a fit file at all").is_err());
    }

    /// FIT CRC-16 as used for the trailing file checksum
    fn fit_crc(data: &[u8]) -> u16 {
        const TABLE: [u16; 16] = [
            0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800, 0xB401,
            0x5000, 0x9C01, 0x8801, 0x4400,
        ];
        data.iter().fold(0u16, |crc, byte| {
            let tmp = TABLE[(crc & 0xF) as usize];
            let crc = ((crc >> 4) & 0x0FFF) ^ tmp ^ TABLE[(byte & 0xF) as usize];
            let tmp = TABLE[(crc & 0xF) as usize];
            ((crc >> 4) & 0x0FFF) ^ tmp ^ TABLE[((byte >> 4) & 0xF) as usize]
        })
    }

    /// 14-byte header without header CRC, the given records, then the file CRC
    fn fit_file(records: &[u8]) -> Vec<u8> {
        let mut file = vec![14u8, 0x20, 0x54, 0x08];
        file.extend_from_slice(&(records.len() as u32).to_le_bytes());
        file.extend_from_slice(b".FIT");
        file.extend_from_slice(&[0, 0]);
        file.extend_from_slice(records);
        let crc = fit_crc(&file);
        file.extend_from_slice(&crc.to_le_bytes());
        file
    }

    /// Lap definition (local type 0) followed by one data message per lap
    fn lap_records(laps: &[(u32, u32, u16, u16, u16, i16)]) -> Vec<u8> {
        // total_elapsed_time, total_distance, avg_speed, total_ascent, total_descent, avg_grade
        let mut records = vec![0x40, 0, 0, 19, 0, 6];
        records.extend_from_slice(&[7, 4, 0x86, 9, 4, 0x86, 13, 2, 0x84, 21, 2, 0x84, 22, 2, 0x84, 45, 2, 0x83]);
        for (elapsed, distance, speed, ascent, descent, grade) in laps {
            records.push(0x00);
            records.extend_from_slice(&elapsed.to_le_bytes());
            records.extend_from_slice(&distance.to_le_bytes());
            records.extend_from_slice(&speed.to_le_bytes());
            records.extend_from_slice(&ascent.to_le_bytes());
            records.extend_from_slice(&descent.to_le_bytes());
            records.extend_from_slice(&grade.to_le_bytes());
        }
        records
    }

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|value| (value - expected).abs() < 1e-9)
    }

    #[test]
    fn test_laps_from_fit_file() {
        let content = fit_file(&lap_records(&[
            (360_000, 100_000, 2778, 12, 8, -150),
            (300_000, 100_000, 3333, 0, 4, 250),
        ]));

        let laps = parse_laps(&content).unwrap();

        assert_eq!(laps.len(), 2);
        assert!(close(laps[0].elapsed_time, 360.0));
        assert!(close(laps[0].distance, 1000.0));
        assert!(close(laps[0].avg_speed, 2.778));
        assert!(close(laps[0].ascent, 12.0));
        assert!(close(laps[0].descent, 8.0));
        assert!(close(laps[0].grade, -1.5));
        assert_eq!(laps[0].pace().as_deref(), Some("6:00min/km"));
        assert!(close(laps[1].avg_speed, 3.333));
        assert!(close(laps[1].grade, 2.5));
    }

    #[test]
    fn test_fit_file_without_laps() {
        // A lone file_id definition with no data
        let content = fit_file(&[0x40, 0, 0, 0, 0, 1, 0, 1, 0x00]);
        assert!(matches!(parse_laps(&content), Err(SamplesError::NoLaps)));
    }

    #[test]
    fn test_corrupted_crc_is_a_parse_error() {
        let mut content = fit_file(&lap_records(&[(360_000, 100_000, 2778, 12, 8, -150)]));
        let last = content.len() - 1;
        content[last] ^= 0xFF;
        assert!(matches!(parse_laps(&content), Err(SamplesError::Parse(_))));
    }

    #[test]
    fn test_enhanced_speed_wins_in_any_order() {
        let enhanced_last = lap_from_fields(
            [("avg_speed", Some(3.0)), ("enhanced_avg_speed", Some(3.5))].into_iter(),
        );
        let enhanced_first = lap_from_fields(
            [("enhanced_avg_speed", Some(3.5)), ("avg_speed", Some(3.0))].into_iter(),
        );
        assert_eq!(enhanced_last.avg_speed, Some(3.5));
        assert_eq!(enhanced_first.avg_speed, Some(3.5));

        let plain = lap_from_fields([("avg_speed", Some(3.0)), ("enhanced_avg_speed", None)].into_iter());
        assert_eq!(plain.avg_speed, Some(3.0));
    }

    #[test]
    fn test_numeric_values() {
        assert_eq!(numeric(&Value::Float64(2.5)), Some(2.5));
        assert_eq!(numeric(&Value::UInt16(42)), Some(42.0));
        assert_eq!(numeric(&Value::SInt16(-3)), Some(-3.0));
        assert_eq!(numeric(&Value::String("x".to_string())), None);
    }

    #[test]
    fn test_lap_pace() {
        let lap = LapRecord {
            avg_speed: Some(2.778),
            ..LapRecord::default()
        };
        assert_eq!(lap.pace().as_deref(), Some("6:00min/km"));
        assert_eq!(LapRecord::default().pace(), None);
    }
}
