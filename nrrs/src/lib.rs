//! Terrain-segmented power-to-mass (NRRS-P) analysis for recorded activities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod decode;
pub mod export;
pub mod pipeline;
pub mod power;
pub mod records;
pub mod smoothing;
pub mod terrain;

pub use aggregate::{aggregate, AggregateReport, SegmentStat};
pub use decode::{parse_records, FieldValue, RawRecord};
pub use pipeline::{run, Analysis, EmptyReport, Outcome, RowCounts, Stage};
pub use power::{normalize, Normalized};
pub use records::{extract_samples, Extraction, Sample};
pub use smoothing::{moving_average, smooth, Centering, PowerSeries, SmoothedSample};
pub use terrain::{classify, EnrichedSample, Segment};

#[derive(Error, Debug)]
pub enum NrrsError {
    #[error("missing required fields: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("failed to parse CSV records: {0}")]
    CsvParse(String),
    #[error("failed to write export: {0}")]
    Export(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub body_mass_kg: f64,
    pub grade_threshold: f64,
    pub window: usize,
    pub segment_window: Option<usize>,
    pub full_centering: Centering,
    pub segment_centering: Centering,
    pub sort_by_timestamp: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            body_mass_kg: 70.0,
            grade_threshold: terrain::DEFAULT_GRADE_THRESHOLD,
            window: smoothing::DEFAULT_WINDOW,
            segment_window: None,
            full_centering: Centering::Centered,
            segment_centering: Centering::Centered,
            sort_by_timestamp: false,
        }
    }
}

impl Params {
    /// Window used for the segment-local pass; falls back to `window`.
    pub fn segment_window(&self) -> usize {
        self.segment_window.unwrap_or(self.window)
    }

    pub fn validate(&self) -> Result<(), NrrsError> {
        power::validate_body_mass(self.body_mass_kg)?;
        if self.window == 0 {
            return Err(NrrsError::InvalidConfiguration(
                "smoothing window must be at least 1 sample".into(),
            ));
        }
        if self.segment_window == Some(0) {
            return Err(NrrsError::InvalidConfiguration(
                "segment smoothing window must be at least 1 sample".into(),
            ));
        }
        if !self.grade_threshold.is_finite() || self.grade_threshold < 0.0 {
            return Err(NrrsError::InvalidConfiguration(format!(
                "grade threshold must be a non-negative number, got {}",
                self.grade_threshold
            )));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, NrrsError> {
        let params: Params = serde_json::from_str(text)
            .map_err(|e| NrrsError::InvalidConfiguration(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }
}
