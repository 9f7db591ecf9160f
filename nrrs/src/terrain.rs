use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::Sample;

pub const DEFAULT_GRADE_THRESHOLD: f64 = 0.03;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Uphill,
    Flat,
    Downhill,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Uphill, Segment::Flat, Segment::Downhill];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Uphill => "uphill",
            Segment::Flat => "flat",
            Segment::Downhill => "downhill",
        }
    }

    /// Ties and undefined gradients resolve to `Flat`.
    pub fn from_gradient(gradient: Option<f64>, threshold: f64) -> Self {
        match gradient {
            Some(g) if g > threshold => Segment::Uphill,
            Some(g) if g < -threshold => Segment::Downhill,
            _ => Segment::Flat,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSample {
    pub sample: Sample,
    pub delta_altitude: Option<f64>,
    pub delta_distance: Option<f64>,
    pub gradient: Option<f64>,
    pub segment: Segment,
    pub power_per_mass: Option<f64>,
}

impl EnrichedSample {
    /// Positive power output; idle and coasting samples are inactive.
    pub fn is_active(&self) -> bool {
        self.power_per_mass.is_some_and(|p| p > 0.0)
    }
}

/// Single pass over the samples in sequence order; each label depends only on
/// the sample and its predecessor.
pub fn classify(samples: &[Sample], threshold: f64) -> Vec<EnrichedSample> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev: Option<&Sample> = None;
    for sample in samples {
        let (delta_altitude, delta_distance) = match prev {
            Some(p) => (
                Some(sample.altitude - p.altitude),
                Some(sample.distance - p.distance),
            ),
            None => (None, None),
        };
        let gradient = match (delta_altitude, delta_distance) {
            (Some(da), Some(dd)) if dd != 0.0 => Some(da / dd),
            _ => None,
        };
        out.push(EnrichedSample {
            sample: sample.clone(),
            delta_altitude,
            delta_distance,
            gradient,
            segment: Segment::from_gradient(gradient, threshold),
            power_per_mass: None,
        });
        prev = Some(sample);
    }
    out
}
