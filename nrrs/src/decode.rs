// Adapters from external decoders to flat field-name -> value records.
// FIT decoding itself is done by `fitparser`; delimited tables by `csv`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NrrsError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

pub type RawRecord = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of the value; text is parsed, non-finite results are rejected.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Int(v) => *v as f64,
            FieldValue::Float(v) => *v,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
            FieldValue::Null | FieldValue::Timestamp(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Integers and floats are read as Unix seconds.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::Int(secs) => DateTime::from_timestamp(*secs, 0),
            FieldValue::Float(secs) if secs.is_finite() => {
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
            }
            FieldValue::Text(s) => parse_timestamp_text(s.trim()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Timestamp(ts) => f.write_str(&crate::export::format_timestamp(ts)),
        }
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode FIT or CSV bytes into flat records using the provided format hint (extension).
pub fn parse_records(input: &[u8], format: &str) -> Result<Vec<RawRecord>, NrrsError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".fit") || format_lc == "fit" {
        parse_fit_records(input)
    } else if format_lc.ends_with(".csv") || format_lc == "csv" {
        parse_csv_records(input)
    } else {
        Err(NrrsError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_fit_records(input: &[u8]) -> Result<Vec<RawRecord>, NrrsError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let messages = from_bytes(input).map_err(|e| NrrsError::FitParse(e.to_string()))?;
    let records: Vec<RawRecord> = messages
        .into_iter()
        .filter(|message| message.kind() == MesgNum::Record)
        .map(|message| {
            message
                .fields()
                .iter()
                .map(|field| (field.name().to_string(), fit_value_to_field(field.value())))
                .collect()
        })
        .collect();
    tracing::debug!("decoded {} FIT record messages", records.len());
    Ok(records)
}

fn fit_value_to_field(value: &fitparser::Value) -> FieldValue {
    use fitparser::Value;

    match value {
        Value::Timestamp(ts) => FieldValue::Timestamp(ts.with_timezone(&Utc)),
        Value::Float32(v) => FieldValue::Float(*v as f64),
        Value::Float64(v) => FieldValue::Float(*v),
        Value::SInt8(v) => FieldValue::Int(*v as i64),
        Value::SInt16(v) => FieldValue::Int(*v as i64),
        Value::SInt32(v) => FieldValue::Int(*v as i64),
        Value::SInt64(v) => FieldValue::Int(*v),
        Value::Byte(v) | Value::Enum(v) | Value::UInt8(v) | Value::UInt8z(v) => {
            FieldValue::Int(*v as i64)
        }
        Value::UInt16(v) | Value::UInt16z(v) => FieldValue::Int(*v as i64),
        Value::UInt32(v) | Value::UInt32z(v) => FieldValue::Int(*v as i64),
        Value::UInt64(v) | Value::UInt64z(v) => match i64::try_from(*v) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => FieldValue::Float(*v as f64),
        },
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Array(values) => values
            .iter()
            .map(fit_value_to_field)
            .find(|v| v.as_f64().is_some())
            .unwrap_or(FieldValue::Null),
        _ => FieldValue::Null,
    }
}

// Header row names the fields; empty cells become nulls and everything else
// stays text until the extractor coerces it.
fn parse_csv_records(input: &[u8]) -> Result<Vec<RawRecord>, NrrsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| NrrsError::CsvParse(e.to_string()))?
        .clone();

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| NrrsError::CsvParse(e.to_string()))?;
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Text(cell.to_string())
                };
                (name.to_string(), value)
            })
            .collect();
        out.push(record);
    }
    Ok(out)
}
