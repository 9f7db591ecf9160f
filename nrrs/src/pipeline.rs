// Linear run: extract -> classify -> normalize -> smooth -> aggregate.
// Parameters are checked before any record is looked at; an empty sample set
// after extraction or normalization ends the run with `Outcome::Empty`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{aggregate, AggregateReport};
use crate::decode::RawRecord;
use crate::power::normalize;
use crate::records::extract_samples;
use crate::smoothing::{build_series, smooth, PowerSeries, SmoothedSample, SmoothingConfig};
use crate::terrain::classify;
use crate::{NrrsError, Params};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Extract,
    Classify,
    Normalize,
    Smooth,
    Aggregate,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowCounts {
    /// Records handed over by the decoder.
    pub input: usize,
    /// Samples left after required-field validation.
    pub extracted: usize,
    /// Samples whose power coerced to a number.
    pub retained: usize,
    /// Retained samples with positive power.
    pub active: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub params: Params,
    pub altitude_field: String,
    pub counts: RowCounts,
    pub samples: Vec<SmoothedSample>,
    pub report: AggregateReport,
}

impl Analysis {
    pub fn series(&self) -> Vec<PowerSeries> {
        build_series(&self.samples)
    }

    pub fn active_samples(&self) -> impl Iterator<Item = &SmoothedSample> + '_ {
        self.samples.iter().filter(|s| s.active)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmptyReport {
    /// Stage after which no samples were left.
    pub stage: Stage,
    pub counts: RowCounts,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success(Analysis),
    Empty(EmptyReport),
}

impl Outcome {
    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            Outcome::Success(analysis) => Some(analysis),
            Outcome::Empty(_) => None,
        }
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    debug!("pipeline {:?} -> {:?}", stage, next);
    *stage = next;
}

pub fn run(records: &[RawRecord], params: &Params) -> Result<Outcome, NrrsError> {
    params.validate()?;
    let mut stage = Stage::Start;
    let mut counts = RowCounts {
        input: records.len(),
        ..RowCounts::default()
    };

    enter(&mut stage, Stage::Extract);
    let extraction = extract_samples(records, params.sort_by_timestamp)?;
    counts.extracted = extraction.samples.len();
    if extraction.samples.is_empty() {
        info!("no usable samples in {} records", counts.input);
        return Ok(Outcome::Empty(EmptyReport { stage, counts }));
    }

    enter(&mut stage, Stage::Classify);
    let classified = classify(&extraction.samples, params.grade_threshold);

    enter(&mut stage, Stage::Normalize);
    let normalized = normalize(&classified, params.body_mass_kg)?;
    counts.retained = normalized.samples.len();
    counts.active = normalized.active.len();
    if normalized.active.is_empty() {
        info!(
            "no samples with positive power ({} retained of {} records)",
            counts.retained, counts.input
        );
        return Ok(Outcome::Empty(EmptyReport { stage, counts }));
    }

    enter(&mut stage, Stage::Smooth);
    let config = SmoothingConfig {
        window: params.window,
        centering: params.full_centering,
        segment_window: params.segment_window(),
        segment_centering: params.segment_centering,
    };
    let samples = smooth(&normalized.samples, &config);

    enter(&mut stage, Stage::Aggregate);
    let report = aggregate(normalized.active_samples());
    info!(
        "analyzed {} samples ({} active): uphill {}, flat {}, downhill {}, overall {}",
        counts.retained,
        counts.active,
        report.uphill,
        report.flat,
        report.downhill,
        report.overall
    );

    Ok(Outcome::Success(Analysis {
        params: params.clone(),
        altitude_field: extraction.altitude_field.to_string(),
        counts,
        samples,
        report,
    }))
}
