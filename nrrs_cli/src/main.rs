use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use nrrs::export::{write_dataset_csv, write_report_json};
use nrrs::records::{
    ALTITUDE_FIELD, DISTANCE_FIELD, ENHANCED_ALTITUDE_FIELD, POWER_FIELD, TIMESTAMP_FIELD,
};
use nrrs::{parse_records, run, Centering, Outcome, Params, RawRecord};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terrain-segmented W/kg (NRRS-P) analysis CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify terrain and compute W/kg statistics for one or more FIT/CSV files
    Analyze(AnalyzeArgs),
    /// Inspect activity files for available record keys and required-field coverage
    Diagnose(DiagnoseArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// FIT/CSV files to analyze
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory for `<name>_nrrs.csv` / `<name>_nrrs.json` outputs
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// JSON parameters file; flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Body mass in kilograms
    #[arg(short, long)]
    mass: Option<f64>,

    /// Moving-average window in samples
    #[arg(long)]
    window: Option<usize>,

    /// Window for the per-segment pass (defaults to --window)
    #[arg(long)]
    segment_window: Option<usize>,

    /// Window placement for the full-sequence pass
    #[arg(long, value_enum)]
    centering: Option<CenteringOpt>,

    /// Window placement for the per-segment pass
    #[arg(long, value_enum)]
    segment_centering: Option<CenteringOpt>,

    /// Gradient beyond which a sample counts as uphill/downhill
    #[arg(long)]
    grade_threshold: Option<f64>,

    /// Sort samples by timestamp before deriving deltas
    #[arg(long, action = ArgAction::SetTrue)]
    sort_timestamps: bool,

    /// Skip the CSV dataset export
    #[arg(long, action = ArgAction::SetTrue)]
    no_csv: bool,

    /// Skip the JSON report
    #[arg(long, action = ArgAction::SetTrue)]
    no_report: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct DiagnoseArgs {
    /// FIT/CSV files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "nrrs_diagnostics.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CenteringOpt {
    Centered,
    Trailing,
}

impl From<CenteringOpt> for Centering {
    fn from(value: CenteringOpt) -> Self {
        match value {
            CenteringOpt::Centered => Centering::Centered,
            CenteringOpt::Trailing => Centering::Trailing,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Diagnose(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Diagnose(args) => handle_diagnose(args),
    }
}

fn build_params(args: &AnalyzeArgs) -> Result<Params> {
    let mut params = match args.params.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read parameters {}", path.display()))?;
            Params::from_json(&text)
                .with_context(|| format!("invalid parameters in {}", path.display()))?
        }
        None => Params::default(),
    };
    if let Some(mass) = args.mass {
        params.body_mass_kg = mass;
    }
    if let Some(window) = args.window {
        params.window = window;
    }
    if let Some(window) = args.segment_window {
        params.segment_window = Some(window);
    }
    if let Some(centering) = args.centering {
        params.full_centering = centering.into();
    }
    if let Some(centering) = args.segment_centering {
        params.segment_centering = centering.into();
    }
    if let Some(threshold) = args.grade_threshold {
        params.grade_threshold = threshold;
    }
    if args.sort_timestamps {
        params.sort_by_timestamp = true;
    }
    params.validate()?;
    Ok(params)
}

fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("fit");
    parse_records(&data, hint).with_context(|| format!("failed to parse {}", path.display()))
}

fn output_paths(dir: &Path, input: &Path) -> (PathBuf, PathBuf) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "activity".to_string());
    (
        dir.join(format!("{stem}_nrrs.csv")),
        dir.join(format!("{stem}_nrrs.json")),
    )
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let params = build_params(&args)?;
    info!(
        "body mass {:.1} kg, window {} ({:?}), segment window {} ({:?})",
        params.body_mass_kg,
        params.window,
        params.full_centering,
        params.segment_window(),
        params.segment_centering
    );
    if !args.no_csv || !args.no_report {
        fs::create_dir_all(&args.output_dir)
            .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    }

    // One independent run per file; a failing file does not stop the others
    let t_run = Instant::now();
    let results: Vec<(&PathBuf, Result<Outcome>)> = args
        .inputs
        .par_iter()
        .map(|path| (path, analyze_file(path, &params)))
        .collect();
    if args.verbose {
        info!(
            "Analysis stage: {:.1} ms ({} files)",
            t_run.elapsed().as_secs_f64() * 1000.0,
            results.len()
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0usize;
    for (path, result) in results {
        if let Err(err) = result.and_then(|outcome| write_outputs(&args, path, &outcome, &mut out)) {
            error!("{}: {:#}", path.display(), err);
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} files failed", failed, args.inputs.len());
    }
    Ok(())
}

fn analyze_file(path: &Path, params: &Params) -> Result<Outcome> {
    let records = read_records(path)?;
    run(&records, params).with_context(|| format!("analysis of {} failed", path.display()))
}

fn write_outputs<W: Write>(
    args: &AnalyzeArgs,
    path: &Path,
    outcome: &Outcome,
    out: &mut W,
) -> Result<()> {
    let analysis = match outcome {
        Outcome::Empty(report) => {
            warn!(
                "{}: nothing to analyze after {:?} ({} records, {} retained)",
                path.display(),
                report.stage,
                report.counts.input,
                report.counts.retained
            );
            return Ok(());
        }
        Outcome::Success(analysis) => analysis,
    };
    let (csv_path, json_path) = output_paths(&args.output_dir, path);
    if !args.no_csv {
        let file = File::create(&csv_path)
            .with_context(|| format!("failed to create {}", csv_path.display()))?;
        write_dataset_csv(&analysis.samples, BufWriter::new(file))?;
        info!("Wrote dataset CSV: {}", csv_path.display());
    }
    if !args.no_report {
        let file = File::create(&json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        write_report_json(analysis, BufWriter::new(file))?;
        info!("Wrote report: {}", json_path.display());
    }
    write_summary(out, path, analysis)
}

fn write_summary<W: Write>(out: &mut W, path: &Path, analysis: &nrrs::Analysis) -> Result<()> {
    writeln!(
        out,
        "{}: {} samples ({} active, {} records read)",
        path.display(),
        analysis.counts.retained,
        analysis.counts.active,
        analysis.counts.input
    )?;
    for (label, stat) in analysis.report.entries() {
        let unit = if stat.value().is_some() { " W/kg" } else { "" };
        writeln!(out, "  {label:<9}{stat}{unit} (n={})", stat.samples())?;
    }
    Ok(())
}

fn handle_diagnose(args: DiagnoseArgs) -> Result<()> {
    let mut report = String::new();

    for path in &args.inputs {
        let records = read_records(path)?;
        report.push_str(&diagnose_records(path, &records));
        report.push('\n');
    }

    if args.output.as_os_str() == "-" {
        io::stdout().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Diagnostic report written: {}", args.output.display());
    }
    Ok(())
}

#[derive(Default, Clone)]
struct KeyStats {
    count: usize,
    non_null: usize,
    numeric: usize,
    min: Option<f64>,
    max: Option<f64>,
}

fn diagnose_records(path: &Path, records: &[RawRecord]) -> String {
    let mut stats: BTreeMap<&str, KeyStats> = BTreeMap::new();
    for record in records {
        for (name, value) in record {
            let entry = stats.entry(name.as_str()).or_default();
            entry.count += 1;
            if !value.is_null() {
                entry.non_null += 1;
            }
            if let Some(val) = value.as_f64() {
                entry.numeric += 1;
                entry.min = Some(entry.min.map_or(val, |m| m.min(val)));
                entry.max = Some(entry.max.map_or(val, |m| m.max(val)));
            }
        }
    }

    let timestamps: Vec<_> = records
        .iter()
        .filter_map(|r| r.get(TIMESTAMP_FIELD)?.as_timestamp())
        .collect();

    let mut report = String::new();
    report.push_str(&format!("FILE: {}\n", path.display()));
    report.push_str(&format!("  records: {}\n", records.len()));
    if let (Some(start), Some(end)) = (timestamps.iter().min(), timestamps.iter().max()) {
        report.push_str(&format!(
            "  timespan_s: {:.1}\n",
            (*end - *start).num_milliseconds() as f64 / 1000.0
        ));
    }

    report.push_str("  required_fields:\n");
    for name in [
        TIMESTAMP_FIELD,
        ENHANCED_ALTITUDE_FIELD,
        ALTITUDE_FIELD,
        POWER_FIELD,
        DISTANCE_FIELD,
    ] {
        match stats.get(name) {
            Some(summary) => report.push_str(&format!(
                "    - {}: present={}, non_null={}, numeric={}\n",
                name, summary.count, summary.non_null, summary.numeric
            )),
            None => report.push_str(&format!("    - {}: absent\n", name)),
        }
    }

    if !stats.is_empty() {
        report.push_str("  keys:\n");
        let mut entries: Vec<_> = stats.into_iter().collect();
        entries.sort_by(|a, b| b.1.count.cmp(&a.1.count));
        for (name, summary) in entries.into_iter().take(25) {
            report.push_str(&format!(
                "    - {}: count={}, numeric={}, min={}, max={}\n",
                name,
                summary.count,
                summary.numeric,
                summary.min.map_or("n/a".into(), |v| format!("{:.3}", v)),
                summary.max.map_or("n/a".into(), |v| format!("{:.3}", v))
            ));
        }
    }
    report
}
