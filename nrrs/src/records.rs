use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decode::{FieldValue, RawRecord};
use crate::NrrsError;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const ENHANCED_ALTITUDE_FIELD: &str = "enhanced_altitude";
pub const ALTITUDE_FIELD: &str = "altitude";
pub const POWER_FIELD: &str = "power";
pub const DISTANCE_FIELD: &str = "distance";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub altitude: f64,
    /// Raw power as decoded; coerced to watts during normalization.
    pub power: FieldValue,
    pub distance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub samples: Vec<Sample>,
    pub dropped: usize,
    pub altitude_field: &'static str,
}

/// Validate the record set and turn every complete record into a `Sample`.
///
/// A required field missing from every record is fatal; a record with a null or
/// unreadable required value is skipped and counted in `dropped`.
pub fn extract_samples(
    records: &[RawRecord],
    sort_by_timestamp: bool,
) -> Result<Extraction, NrrsError> {
    let present = |name: &str| records.iter().any(|r| r.contains_key(name));
    let has_numeric = |name: &str| {
        records
            .iter()
            .any(|r| r.get(name).and_then(FieldValue::as_f64).is_some())
    };
    // An all-empty enhanced column does not shadow the standard one.
    let altitude_field = if has_numeric(ENHANCED_ALTITUDE_FIELD) {
        ENHANCED_ALTITUDE_FIELD
    } else {
        ALTITUDE_FIELD
    };

    if records.is_empty() {
        return Ok(Extraction {
            samples: Vec::new(),
            dropped: 0,
            altitude_field,
        });
    }

    let missing: Vec<String> = [
        (TIMESTAMP_FIELD, TIMESTAMP_FIELD),
        (altitude_field, ALTITUDE_FIELD),
        (POWER_FIELD, POWER_FIELD),
        (DISTANCE_FIELD, DISTANCE_FIELD),
    ]
    .into_iter()
    .filter(|(key, _)| !present(*key))
    .map(|(_, label)| label.to_string())
    .collect();
    if !missing.is_empty() {
        return Err(NrrsError::Schema { missing });
    }

    let mut samples: Vec<Sample> = records
        .iter()
        .filter_map(|record| sample_from_record(record, altitude_field))
        .collect();
    let dropped = records.len() - samples.len();
    if sort_by_timestamp {
        samples.sort_by_key(|s| s.timestamp);
    }
    debug!(
        "extracted {} samples ({} dropped, altitude from `{}`)",
        samples.len(),
        dropped,
        altitude_field
    );

    Ok(Extraction {
        samples,
        dropped,
        altitude_field,
    })
}

fn sample_from_record(record: &RawRecord, altitude_field: &str) -> Option<Sample> {
    let timestamp = record.get(TIMESTAMP_FIELD)?.as_timestamp()?;
    let altitude = record
        .get(altitude_field)
        .and_then(FieldValue::as_f64)
        .or_else(|| record.get(ALTITUDE_FIELD).and_then(FieldValue::as_f64))?;
    let distance = record.get(DISTANCE_FIELD)?.as_f64()?;
    let power = record.get(POWER_FIELD).filter(|v| !v.is_null())?.clone();
    Some(Sample {
        timestamp,
        altitude,
        power,
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, FieldValue)]) -> RawRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn full(ts: i64, alt: f64, power: i64, dist: f64) -> RawRecord {
        record(&[
            (TIMESTAMP_FIELD, FieldValue::Int(ts)),
            (ALTITUDE_FIELD, FieldValue::Float(alt)),
            (POWER_FIELD, FieldValue::Int(power)),
            (DISTANCE_FIELD, FieldValue::Float(dist)),
        ])
    }

    #[test]
    fn complete_records_become_samples_in_order() {
        let records = vec![full(10, 100.0, 150, 0.0), full(11, 101.0, 160, 5.0)];
        let out = extract_samples(&records, false).unwrap();
        assert_eq!(out.samples.len(), 2);
        assert_eq!(out.dropped, 0);
        assert_eq!(out.altitude_field, ALTITUDE_FIELD);
        assert_eq!(out.samples[1].altitude, 101.0);
        assert_eq!(out.samples[1].power, FieldValue::Int(160));
    }

    #[test]
    fn missing_fields_are_named() {
        let records = vec![record(&[
            (TIMESTAMP_FIELD, FieldValue::Int(0)),
            (ALTITUDE_FIELD, FieldValue::Float(5.0)),
        ])];
        match extract_samples(&records, false) {
            Err(NrrsError::Schema { missing }) => {
                assert_eq!(missing, vec!["power".to_string(), "distance".to_string()])
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn field_present_in_any_record_satisfies_schema() {
        let mut partial = full(0, 1.0, 100, 0.0);
        partial.remove(POWER_FIELD);
        let records = vec![partial, full(1, 1.0, 100, 1.0)];
        let out = extract_samples(&records, false).unwrap();
        assert_eq!(out.samples.len(), 1);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn null_and_unreadable_values_drop_the_record() {
        let mut null_alt = full(1, 1.0, 100, 1.0);
        null_alt.insert(ALTITUDE_FIELD.into(), FieldValue::Null);
        let mut bad_dist = full(2, 1.0, 100, 1.0);
        bad_dist.insert(DISTANCE_FIELD.into(), FieldValue::Text("far".into()));
        let mut text_power = full(3, 1.0, 100, 1.0);
        text_power.insert(POWER_FIELD.into(), FieldValue::Text("n/a".into()));
        let records = vec![full(0, 1.0, 100, 0.0), null_alt, bad_dist, text_power];

        let out = extract_samples(&records, false).unwrap();
        // power is only null-checked here; coercion happens during normalization
        assert_eq!(out.samples.len(), 2);
        assert_eq!(out.dropped, 2);
        assert_eq!(out.samples[1].power, FieldValue::Text("n/a".into()));
    }

    #[test]
    fn enhanced_altitude_is_preferred() {
        let mut first = full(0, 100.0, 100, 0.0);
        first.insert(ENHANCED_ALTITUDE_FIELD.into(), FieldValue::Float(100.4));
        let out = extract_samples(&[first], false).unwrap();
        assert_eq!(out.altitude_field, ENHANCED_ALTITUDE_FIELD);
        assert_eq!(out.samples[0].altitude, 100.4);
    }

    #[test]
    fn empty_enhanced_column_falls_back_to_altitude() {
        let records: Vec<RawRecord> = (0..3)
            .map(|i| {
                let mut r = full(i, 100.0 + i as f64, 100, i as f64 * 10.0);
                r.insert(ENHANCED_ALTITUDE_FIELD.into(), FieldValue::Null);
                r
            })
            .collect();
        let out = extract_samples(&records, false).unwrap();
        assert_eq!(out.altitude_field, ALTITUDE_FIELD);
        assert_eq!(out.samples.len(), 3);
        assert_eq!(out.samples[2].altitude, 102.0);
    }

    #[test]
    fn gaps_in_enhanced_altitude_use_the_standard_value() {
        let mut first = full(0, 100.0, 100, 0.0);
        first.insert(ENHANCED_ALTITUDE_FIELD.into(), FieldValue::Float(100.4));
        let mut second = full(1, 101.0, 100, 5.0);
        second.insert(ENHANCED_ALTITUDE_FIELD.into(), FieldValue::Null);
        let out = extract_samples(&[first, second], false).unwrap();
        assert_eq!(out.altitude_field, ENHANCED_ALTITUDE_FIELD);
        assert_eq!(out.samples.len(), 2);
        assert_eq!(out.samples[1].altitude, 101.0);
    }

    #[test]
    fn empty_enhanced_column_without_altitude_is_a_schema_error() {
        let mut r = full(0, 1.0, 100, 0.0);
        r.remove(ALTITUDE_FIELD);
        r.insert(ENHANCED_ALTITUDE_FIELD.into(), FieldValue::Null);
        match extract_samples(&[r], false) {
            Err(NrrsError::Schema { missing }) => assert_eq!(missing, vec!["altitude".to_string()]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn sorting_is_opt_in() {
        let records = vec![full(20, 2.0, 100, 10.0), full(10, 1.0, 100, 0.0)];
        let kept = extract_samples(&records, false).unwrap();
        assert_eq!(kept.samples[0].altitude, 2.0);
        let sorted = extract_samples(&records, true).unwrap();
        assert_eq!(sorted.samples[0].altitude, 1.0);
    }

    #[test]
    fn empty_input_is_not_a_schema_error() {
        let out = extract_samples(&[], false).unwrap();
        assert!(out.samples.is_empty());
    }
}
