use std::fmt;

use serde::{Deserialize, Serialize};

use crate::terrain::{EnrichedSample, Segment};

pub const DISPLAY_DECIMALS: i32 = 2;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStat {
    Mean { value: f64, samples: usize },
    NoData,
}

impl SegmentStat {
    pub fn value(&self) -> Option<f64> {
        match self {
            SegmentStat::Mean { value, .. } => Some(*value),
            SegmentStat::NoData => None,
        }
    }

    pub fn samples(&self) -> usize {
        match self {
            SegmentStat::Mean { samples, .. } => *samples,
            SegmentStat::NoData => 0,
        }
    }
}

impl fmt::Display for SegmentStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentStat::Mean { value, .. } => write!(f, "{value:.2}"),
            SegmentStat::NoData => f.write_str("no data"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateReport {
    pub uphill: SegmentStat,
    pub flat: SegmentStat,
    pub downhill: SegmentStat,
    pub overall: SegmentStat,
}

impl AggregateReport {
    pub fn get(&self, segment: Segment) -> &SegmentStat {
        match segment {
            Segment::Uphill => &self.uphill,
            Segment::Flat => &self.flat,
            Segment::Downhill => &self.downhill,
        }
    }

    /// All four entries in display order, `overall` last.
    pub fn entries(&self) -> [(&'static str, &SegmentStat); 4] {
        [
            (Segment::Uphill.as_str(), &self.uphill),
            (Segment::Flat.as_str(), &self.flat),
            (Segment::Downhill.as_str(), &self.downhill),
            ("overall", &self.overall),
        ]
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn finish(self) -> SegmentStat {
        if self.count == 0 {
            SegmentStat::NoData
        } else {
            SegmentStat::Mean {
                value: round_to(self.sum / self.count as f64, DISPLAY_DECIMALS),
                samples: self.count,
            }
        }
    }
}

/// Mean W/kg per terrain label and overall. Samples without a normalized value
/// are ignored; labels with no members report `NoData`.
pub fn aggregate<'a, I>(samples: I) -> AggregateReport
where
    I: IntoIterator<Item = &'a EnrichedSample>,
{
    let mut per_segment = [Accumulator::default(); 3];
    let mut overall = Accumulator::default();
    for sample in samples {
        let Some(value) = sample.power_per_mass else {
            continue;
        };
        let slot = match sample.segment {
            Segment::Uphill => 0,
            Segment::Flat => 1,
            Segment::Downhill => 2,
        };
        per_segment[slot].add(value);
        overall.add(value);
    }
    AggregateReport {
        uphill: per_segment[0].finish(),
        flat: per_segment[1].finish(),
        downhill: per_segment[2].finish(),
        overall: overall.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::FieldValue;
    use crate::records::Sample;
    use chrono::{DateTime, Utc};

    fn sample(segment: Segment, power_per_mass: Option<f64>) -> EnrichedSample {
        EnrichedSample {
            sample: Sample {
                timestamp: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
                altitude: 0.0,
                power: FieldValue::Int(1),
                distance: 0.0,
            },
            delta_altitude: None,
            delta_distance: None,
            gradient: None,
            segment,
            power_per_mass,
        }
    }

    #[test]
    fn mean_per_segment() {
        let samples = vec![
            sample(Segment::Uphill, Some(2.0)),
            sample(Segment::Uphill, Some(4.0)),
            sample(Segment::Flat, Some(1.0)),
        ];
        let report = aggregate(&samples);
        assert_eq!(
            report.uphill,
            SegmentStat::Mean {
                value: 3.0,
                samples: 2
            }
        );
        assert_eq!(report.flat.value(), Some(1.0));
        assert_eq!(report.overall.value(), Some(2.33));
        assert_eq!(report.overall.samples(), 3);
    }

    #[test]
    fn empty_segments_report_no_data() {
        let samples = vec![sample(Segment::Flat, Some(0.0))];
        let report = aggregate(&samples);
        assert_eq!(report.downhill, SegmentStat::NoData);
        assert_eq!(report.uphill, SegmentStat::NoData);
        // a real zero mean is distinct from no data
        assert_eq!(report.flat.value(), Some(0.0));
        assert_eq!(report.get(Segment::Downhill).to_string(), "no data");
        assert_eq!(report.entries().len(), 4);
    }

    #[test]
    fn nothing_at_all_is_no_data_everywhere() {
        let report = aggregate(std::iter::empty());
        assert!(report.entries().iter().all(|(_, s)| **s == SegmentStat::NoData));
    }

    #[test]
    fn order_does_not_matter() {
        let mut samples = vec![
            sample(Segment::Downhill, Some(1.25)),
            sample(Segment::Uphill, Some(3.5)),
            sample(Segment::Downhill, Some(0.75)),
            sample(Segment::Uphill, None),
        ];
        let forward = aggregate(&samples);
        samples.reverse();
        assert_eq!(aggregate(&samples), forward);
        assert_eq!(forward.downhill.value(), Some(1.0));
        assert_eq!(forward.uphill.samples(), 1);
    }

    #[test]
    fn rounding_to_two_places() {
        assert_eq!(round_to(2.345678, 2), 2.35);
        assert_eq!(round_to(2.0, 2), 2.0);
        assert_eq!(SegmentStat::Mean { value: 3.0, samples: 1 }.to_string(), "3.00");
    }
}
