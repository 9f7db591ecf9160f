use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::aggregate::AggregateReport;
use crate::pipeline::{Analysis, RowCounts};
use crate::smoothing::{PowerSeries, SmoothedSample};
use crate::{NrrsError, Params};

pub const CSV_COLUMNS: [&str; 14] = [
    "timestamp",
    "altitude",
    "power",
    "distance",
    "delta_altitude",
    "delta_distance",
    "gradient",
    "segment",
    "power_per_mass",
    "active",
    "elapsed_s",
    "segment_elapsed_s",
    "power_per_mass_smooth",
    "power_per_mass_segment_smooth",
];

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Whole seconds print without a fraction; sub-second input keeps it.
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One header row, then one row per sample in processing order.
pub fn write_dataset_csv<W: Write>(rows: &[SmoothedSample], out: W) -> Result<(), NrrsError> {
    let mut writer = csv::Writer::from_writer(out);
    write_rows(rows, &mut writer).map_err(|e| NrrsError::Export(e.to_string()))
}

fn write_rows<W: Write>(rows: &[SmoothedSample], writer: &mut csv::Writer<W>) -> csv::Result<()> {
    writer.write_record(CSV_COLUMNS)?;
    for row in rows {
        let e = &row.enriched;
        writer.write_record([
            format_timestamp(&e.sample.timestamp),
            e.sample.altitude.to_string(),
            e.sample.power.to_string(),
            e.sample.distance.to_string(),
            opt(e.delta_altitude),
            opt(e.delta_distance),
            opt(e.gradient),
            e.segment.to_string(),
            opt(e.power_per_mass),
            row.active.to_string(),
            row.elapsed_s.to_string(),
            opt(row.segment_elapsed_s),
            opt(row.smoothed),
            opt(row.segment_smoothed),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    params: &'a Params,
    altitude_field: &'a str,
    counts: &'a RowCounts,
    report: &'a AggregateReport,
    series: Vec<PowerSeries>,
}

pub fn write_report_json<W: Write>(analysis: &Analysis, out: W) -> Result<(), NrrsError> {
    let doc = ReportDocument {
        params: &analysis.params,
        altitude_field: &analysis.altitude_field,
        counts: &analysis.counts,
        report: &analysis.report,
        series: analysis.series(),
    };
    serde_json::to_writer_pretty(out, &doc).map_err(|e| NrrsError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::FieldValue;
    use crate::records::Sample;
    use crate::terrain::{EnrichedSample, Segment};

    fn row() -> SmoothedSample {
        SmoothedSample {
            enriched: EnrichedSample {
                sample: Sample {
                    timestamp: DateTime::parse_from_rfc3339("2024-05-01T07:00:01Z")
                        .unwrap()
                        .with_timezone(&Utc),
                    altitude: 103.0,
                    power: FieldValue::Int(150),
                    distance: 50.0,
                },
                delta_altitude: Some(3.0),
                delta_distance: Some(50.0),
                gradient: Some(0.06),
                segment: Segment::Uphill,
                power_per_mass: Some(2.0),
            },
            active: true,
            elapsed_s: 1.0,
            segment_elapsed_s: Some(0.0),
            smoothed: Some(2.0),
            segment_smoothed: None,
        }
    }

    #[test]
    fn csv_has_header_and_natural_numbers() {
        let mut buf = Vec::new();
        write_dataset_csv(&[row()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "2024-05-01T07:00:01Z,103,150,50,3,50,0.06,uphill,2,true,1,0,2,"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let ts = DateTime::<Utc>::from_timestamp(1_714_546_800, 500_000_000).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-01T07:00:00.500Z");
        let whole = DateTime::<Utc>::from_timestamp(1_714_546_800, 0).unwrap();
        assert_eq!(format_timestamp(&whole), "2024-05-01T07:00:00Z");
    }

    #[test]
    fn empty_dataset_still_writes_header() {
        let mut buf = Vec::new();
        write_dataset_csv(&[], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().trim_end(), CSV_COLUMNS.join(","));
    }
}
