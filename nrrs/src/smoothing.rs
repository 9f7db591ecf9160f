use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::terrain::{EnrichedSample, Segment};

pub const DEFAULT_WINDOW: usize = 15;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Centering {
    /// Window `[i - w/2, i + w - w/2 - 1]`, the pandas `center=True` placement.
    Centered,
    /// Window `[i - w + 1, i]`.
    Trailing,
}

impl Centering {
    fn reach(&self, window: usize) -> (usize, usize) {
        match self {
            Centering::Centered => (window / 2, window - window / 2 - 1),
            Centering::Trailing => (window - 1, 0),
        }
    }
}

/// Simple moving average with a minimum period of one: the window shrinks at
/// the sequence edges instead of producing an undefined value.
pub fn moving_average(values: &[f64], window: usize, centering: Centering) -> Array1<f64> {
    let window = window.max(1);
    let (before, after) = centering.reach(window);
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let start = i.saturating_sub(before);
        let end = (i + after + 1).min(n);
        out.push(running_mean(&values[start..end]));
    }
    Array1::from_vec(out)
}

// Incremental mean keeps constant windows bit-exact.
fn running_mean(values: &[f64]) -> f64 {
    let mut mean = 0.0;
    for (k, v) in values.iter().enumerate() {
        mean += (v - mean) / (k + 1) as f64;
    }
    mean
}

/// Smooth `(position, value)` pairs in the given order, returning the same
/// positions with smoothed values.
pub fn smooth_series(
    points: &[(usize, f64)],
    window: usize,
    centering: Centering,
) -> Vec<(usize, f64)> {
    let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
    let smoothed = moving_average(&values, window, centering);
    points
        .iter()
        .zip(smoothed.iter())
        .map(|(&(pos, _), &s)| (pos, s))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSample {
    #[serde(flatten)]
    pub enriched: EnrichedSample,
    pub active: bool,
    /// Seconds since the first sample of the dataset.
    pub elapsed_s: f64,
    /// Seconds since the first active sample of the same segment.
    pub segment_elapsed_s: Option<f64>,
    pub smoothed: Option<f64>,
    pub segment_smoothed: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingConfig {
    pub window: usize,
    pub centering: Centering,
    pub segment_window: usize,
    pub segment_centering: Centering,
}

/// Run the full-sequence pass and the per-segment passes over the active
/// samples and derive the elapsed-time axes once.
pub fn smooth(samples: &[EnrichedSample], config: &SmoothingConfig) -> Vec<SmoothedSample> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let t0 = first.sample.timestamp;
    let mut rows: Vec<SmoothedSample> = samples
        .iter()
        .map(|s| SmoothedSample {
            enriched: s.clone(),
            active: s.is_active(),
            elapsed_s: seconds_between(t0, s.sample.timestamp),
            segment_elapsed_s: None,
            smoothed: None,
            segment_smoothed: None,
        })
        .collect();

    let active: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.active)
        .filter_map(|(i, r)| Some((i, r.enriched.power_per_mass?)))
        .collect();
    for (pos, value) in smooth_series(&active, config.window, config.centering) {
        rows[pos].smoothed = Some(value);
    }

    for segment in Segment::ALL {
        let members: Vec<(usize, f64)> = active
            .iter()
            .copied()
            .filter(|&(pos, _)| rows[pos].enriched.segment == segment)
            .collect();
        let Some(&(first_pos, _)) = members.first() else {
            continue;
        };
        let seg_t0 = rows[first_pos].enriched.sample.timestamp;
        for (pos, value) in smooth_series(&members, config.segment_window, config.segment_centering)
        {
            let row = &mut rows[pos];
            row.segment_smoothed = Some(value);
            row.segment_elapsed_s = Some(seconds_between(seg_t0, row.enriched.sample.timestamp));
        }
    }
    rows
}

fn seconds_between(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Raw and smoothed W/kg along one presentation axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerSeries {
    pub label: String,
    /// Row ordinal in the enriched dataset.
    pub index: Vec<usize>,
    pub elapsed_s: Vec<f64>,
    pub raw: Vec<f64>,
    pub smoothed: Vec<f64>,
}

/// Read the full-sequence series and one series per segment straight from the
/// smoothed rows; nothing is recomputed.
pub fn build_series(rows: &[SmoothedSample]) -> Vec<PowerSeries> {
    let mut out = Vec::with_capacity(Segment::ALL.len() + 1);
    let mut overall = PowerSeries::empty("overall");
    for (i, row) in rows.iter().enumerate() {
        if let (Some(raw), Some(smoothed)) = (row.enriched.power_per_mass, row.smoothed) {
            overall.push(i, row.elapsed_s, raw, smoothed);
        }
    }
    out.push(overall);

    for segment in Segment::ALL {
        let mut series = PowerSeries::empty(segment.as_str());
        for (i, row) in rows.iter().enumerate() {
            if row.enriched.segment != segment {
                continue;
            }
            if let (Some(raw), Some(smoothed), Some(elapsed)) = (
                row.enriched.power_per_mass,
                row.segment_smoothed,
                row.segment_elapsed_s,
            ) {
                series.push(i, elapsed, raw, smoothed);
            }
        }
        out.push(series);
    }
    out
}

impl PowerSeries {
    fn empty(label: &str) -> Self {
        Self {
            label: label.to_string(),
            index: Vec::new(),
            elapsed_s: Vec::new(),
            raw: Vec::new(),
            smoothed: Vec::new(),
        }
    }

    fn push(&mut self, index: usize, elapsed_s: f64, raw: f64, smoothed: f64) {
        self.index.push(index);
        self.elapsed_s.push(elapsed_s);
        self.raw.push(raw);
        self.smoothed.push(smoothed);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
