//! fedframe CLI - Command-line interface for FED3 session logs
//!
//! Commands:
//! - inspect: Summarize one or more session files
//! - metric: Compute a named metric, optionally binned
//! - metrics: List the metric registry
//! - concat: Join sessions into one file
//! - split: Cut a session at date boundaries
//! - doctor: Diagnose environment and input files

use chrono::{Duration, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fedframe::reader::write_series_csv;
use fedframe::{
    concat, list_metrics, load, split, ConcatOptions, DedupPolicy, LightCycle, LoadOptions,
    Metric, SessionError, SessionSummary, SessionTable, Series, SplitOptions, FEDFRAME_VERSION,
};

/// fedframe - Session tables for FED3 pellet-dispenser logs
#[derive(Parser)]
#[command(name = "fedframe")]
#[command(version = FEDFRAME_VERSION)]
#[command(about = "Inspect, combine and measure FED3 session logs", long_about = None)]
struct Cli {
    /// Load options as JSON (timestamp column, deduplication, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repair duplicate timestamps on load
    #[arg(long, global = true, value_enum)]
    dedup: Option<DedupArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize session files
    Inspect {
        /// Session files (.csv, .json, .ndjson)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Lights-on time (HH:MM) used to report dark periods
        #[arg(long, default_value = "07:00")]
        lights_on: String,

        /// Lights-off time (HH:MM)
        #[arg(long, default_value = "19:00")]
        lights_off: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute a named metric for one session
    Metric {
        /// Session file
        #[arg(short, long)]
        input: PathBuf,

        /// Metric key (see `fedframe metrics`)
        #[arg(short, long)]
        metric: String,

        /// Bin width in minutes
        #[arg(long)]
        bins: Option<f64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        format: OutputFormat,
    },

    /// List available metrics
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Concatenate sessions in time
    Concat {
        /// Session files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output CSV path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Name of the combined session
        #[arg(long)]
        name: Option<String>,

        /// Do not tag rows with their source session
        #[arg(long)]
        no_concat_index: bool,
    },

    /// Split a session at date boundaries
    Split {
        /// Session file
        #[arg(short, long)]
        input: PathBuf,

        /// Boundary timestamps (repeatable)
        #[arg(long = "at", required = true)]
        boundaries: Vec<String>,

        /// Directory for the segment CSVs
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Also write segments without rows
        #[arg(long)]
        return_empty: bool,
    },

    /// Diagnose environment and input files
    Doctor {
        /// Files to check
        inputs: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DedupArg {
    KeepFirst,
    KeepLast,
    Remove,
    Offset,
    Interpolate,
}

impl From<DedupArg> for DedupPolicy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::KeepFirst => DedupPolicy::KeepFirst,
            DedupArg::KeepLast => DedupPolicy::KeepLast,
            DedupArg::Remove => DedupPolicy::Remove,
            DedupArg::Offset => DedupPolicy::Offset,
            DedupArg::Interpolate => DedupPolicy::Interpolate,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one point per line)
    Ndjson,
    /// JSON array of points
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Two-column CSV
    Csv,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FedCliError> {
    let mut options = match &cli.config {
        Some(path) => fedframe::config::from_json::<LoadOptions>(&fs::read_to_string(path)?)?,
        None => LoadOptions::default(),
    };
    if let Some(dedup) = cli.dedup {
        options.deduplicate = Some(dedup.into());
    }

    match cli.command {
        Commands::Inspect {
            inputs,
            lights_on,
            lights_off,
            json,
        } => {
            let cycle = LightCycle::new(parse_clock(&lights_on)?, parse_clock(&lights_off)?);
            cmd_inspect(&inputs, &options, cycle, json)
        }
        Commands::Metric {
            input,
            metric,
            bins,
            output,
            format,
        } => cmd_metric(&input, &options, &metric, bins, &output, format),
        Commands::Metrics { json } => cmd_metrics(json),
        Commands::Concat {
            inputs,
            output,
            name,
            no_concat_index,
        } => {
            let concat_options = ConcatOptions {
                name,
                add_concat_index: !no_concat_index,
                ..ConcatOptions::default()
            };
            cmd_concat(&inputs, &options, &concat_options, &output)
        }
        Commands::Split {
            input,
            boundaries,
            output_dir,
            return_empty,
        } => {
            let split_options = SplitOptions {
                return_empty,
                ..SplitOptions::default()
            };
            cmd_split(&input, &options, &boundaries, &split_options, &output_dir)
        }
        Commands::Doctor { inputs, json } => cmd_doctor(&inputs, &options, json),
    }
}

fn cmd_inspect(
    inputs: &[PathBuf],
    options: &LoadOptions,
    cycle: LightCycle,
    json: bool,
) -> Result<(), FedCliError> {
    let mut reports = Vec::with_capacity(inputs.len());
    for path in inputs {
        let table = load(path, options)?;
        let dark_periods = match (table.start_time(), table.end_time()) {
            (Some(start), Some(end)) => cycle.night_intervals(start, end),
            _ => Vec::new(),
        };
        reports.push(InspectReport {
            summary: table.summary(),
            dark_periods,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        let s = &report.summary;
        println!("Session: {}", s.name.as_deref().unwrap_or("<unnamed>"));
        println!("  Rows:       {}", s.rows);
        if let (Some(start), Some(end)) = (s.start_time, s.end_time) {
            println!("  Span:       {} → {}", start, end);
        }
        println!("  Mode:       {}", s.mode);
        println!("  Alignment:  {}", s.alignment);
        println!("  Duplicates: {}", if s.has_duplicates { "yes" } else { "no" });
        if !s.foreign_columns.is_empty() {
            println!("  Foreign:    {}", s.foreign_columns.join(", "));
        }
        if !s.missing_columns.is_empty() {
            let missing: Vec<String> = s.missing_columns.iter().map(|f| f.to_string()).collect();
            println!("  Missing:    {}", missing.join(", "));
        }
        println!("  Dark periods: {}", report.dark_periods.len());
    }
    Ok(())
}

fn cmd_metric(
    input: &Path,
    options: &LoadOptions,
    metric: &str,
    bins: Option<f64>,
    output: &Path,
    format: OutputFormat,
) -> Result<(), FedCliError> {
    let metric: Metric = metric.parse()?;
    let table = load(input, options)?;
    let bins = bins.map(|minutes| Duration::milliseconds((minutes * 60_000.0).round() as i64));
    let series = metric.compute(&table, bins)?;

    let output_data = format_series(&series, metric, &format)?;
    if output.to_string_lossy() == "-" {
        io::stdout().write_all(&output_data)?;
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_metrics(json: bool) -> Result<(), FedCliError> {
    if json {
        let entries: Vec<MetricEntry> = Metric::ALL
            .iter()
            .map(|m| MetricEntry {
                key: m.key(),
                name: m.nice_name(),
                aggregator: m.aggregator(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for key in list_metrics() {
            println!("{}", key);
        }
    }
    Ok(())
}

fn cmd_concat(
    inputs: &[PathBuf],
    options: &LoadOptions,
    concat_options: &ConcatOptions,
    output: &Path,
) -> Result<(), FedCliError> {
    let sessions = load_all(inputs, options)?;
    let joined = concat(&sessions, concat_options)?;
    write_session(&joined, output)
}

fn cmd_split(
    input: &Path,
    options: &LoadOptions,
    boundaries: &[String],
    split_options: &SplitOptions,
    output_dir: &Path,
) -> Result<(), FedCliError> {
    let table = load(input, options)?;
    let segments = split(&table, boundaries, split_options)?;
    if segments.is_empty() {
        return Err(FedCliError::NoRows);
    }
    fs::create_dir_all(output_dir)?;
    for (i, segment) in segments.iter().enumerate() {
        let stem = segment
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| i.to_string());
        let path = output_dir.join(format!("{}.csv", stem));
        write_session(segment, &path)?;
        eprintln!("wrote {} ({} rows)", path.display(), segment.len());
    }
    Ok(())
}

fn cmd_doctor(inputs: &[PathBuf], options: &LoadOptions, json: bool) -> Result<(), FedCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "fedframe_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("fedframe version {}", FEDFRAME_VERSION),
    });

    checks.push(DoctorCheck {
        name: "metrics".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} metrics registered", list_metrics().len()),
    });

    for path in inputs {
        let name = format!("file:{}", path.display());
        let check = if !path.exists() {
            DoctorCheck {
                name,
                status: CheckStatus::Error,
                message: "File does not exist".to_string(),
            }
        } else {
            match load(path, options) {
                Ok(table) if !table.missing_columns().is_empty() => DoctorCheck {
                    name,
                    status: CheckStatus::Warning,
                    message: format!(
                        "{} rows; missing columns: {:?}",
                        table.len(),
                        table.missing_columns()
                    ),
                },
                Ok(table) if table.has_duplicates() => DoctorCheck {
                    name,
                    status: CheckStatus::Warning,
                    message: format!(
                        "{} rows; duplicate timestamps (use --dedup)",
                        table.len()
                    ),
                },
                Ok(table) => DoctorCheck {
                    name,
                    status: CheckStatus::Ok,
                    message: format!("{} rows, mode {}", table.len(), table.mode()),
                },
                Err(e) => DoctorCheck {
                    name,
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            }
        };
        checks.push(check);
    }

    let tty_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY (text reports)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a pipe (prefer --json)".to_string(),
        }
    };
    checks.push(tty_check);

    let report = DoctorReport {
        version: FEDFRAME_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("fedframe Doctor Report");
        println!("======================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FedCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_all(inputs: &[PathBuf], options: &LoadOptions) -> Result<Vec<SessionTable>, FedCliError> {
    inputs
        .iter()
        .map(|path| load(path, options).map_err(FedCliError::from))
        .collect()
}

fn write_session(table: &SessionTable, output: &Path) -> Result<(), FedCliError> {
    if output.to_string_lossy() == "-" {
        fedframe::write_csv(table, io::stdout().lock())?;
    } else {
        fedframe::write_csv(table, fs::File::create(output)?)?;
    }
    Ok(())
}

fn parse_clock(s: &str) -> Result<NaiveTime, FedCliError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| FedCliError::InvalidArgument(format!("\"{}\" is not an HH:MM time", s)))
}

fn format_series(
    series: &Series<Option<f64>>,
    metric: Metric,
    format: &OutputFormat,
) -> Result<Vec<u8>, FedCliError> {
    let points: Vec<MetricPoint> = series
        .iter()
        .map(|(timestamp, value)| MetricPoint {
            timestamp: *timestamp,
            value: *value,
        })
        .collect();

    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for point in &points {
                lines.push(serde_json::to_string(point)?);
            }
            Ok((lines.join("\n") + "\n").into_bytes())
        }
        OutputFormat::Json => Ok(serde_json::to_vec(&points)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_vec_pretty(&points)?),
        OutputFormat::Csv => {
            let mut buffer = Vec::new();
            write_series_csv(series, metric.key(), &mut buffer)?;
            Ok(buffer)
        }
    }
}

// Error types

#[derive(Debug)]
enum FedCliError {
    Io(io::Error),
    Session(SessionError),
    Json(serde_json::Error),
    InvalidArgument(String),
    NoRows,
    DoctorFailed,
}

impl From<io::Error> for FedCliError {
    fn from(e: io::Error) -> Self {
        FedCliError::Io(e)
    }
}

impl From<SessionError> for FedCliError {
    fn from(e: SessionError) -> Self {
        FedCliError::Session(e)
    }
}

impl From<serde_json::Error> for FedCliError {
    fn from(e: serde_json::Error) -> Self {
        FedCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FedCliError> for CliError {
    fn from(e: FedCliError) -> Self {
        match e {
            FedCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FedCliError::Session(e) => {
                let (code, hint) = session_error_hint(&e);
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
            FedCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FedCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
            FedCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No segment contains any rows".to_string(),
                hint: Some("Check the boundaries against the session span".to_string()),
            },
            FedCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn session_error_hint(e: &SessionError) -> (&'static str, Option<&'static str>) {
    match e {
        SessionError::Overlap { .. } => (
            "OVERLAP",
            Some("Sessions must not overlap in time; crop them first"),
        ),
        SessionError::UninterpolatableDuplicate => (
            "UNINTERPOLATABLE_DUPLICATE",
            Some("Use --dedup offset or --dedup keep-first"),
        ),
        SessionError::InvalidMetric(_) => ("INVALID_METRIC", Some("Run 'fedframe metrics'")),
        SessionError::MissingColumn(_) => (
            "MISSING_COLUMN",
            Some("Run 'fedframe inspect' to see which columns were found"),
        ),
        SessionError::AmbiguousEvent { .. } => ("AMBIGUOUS_EVENT", None),
        SessionError::UnsupportedFormat(_) => (
            "UNSUPPORTED_FORMAT",
            Some("Supported formats: .csv, .json, .ndjson"),
        ),
        SessionError::DateParse(_) | SessionError::ParseError(_) | SessionError::CsvError(_) => {
            ("PARSE_ERROR", Some("Check input format"))
        }
        SessionError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
        SessionError::JsonError(_) => ("JSON_ERROR", Some("Check JSON syntax")),
        _ => ("SESSION_ERROR", None),
    }
}

// Report types

#[derive(serde::Serialize)]
struct InspectReport {
    #[serde(flatten)]
    summary: SessionSummary,
    dark_periods: Vec<(NaiveDateTime, NaiveDateTime)>,
}

#[derive(serde::Serialize)]
struct MetricPoint {
    timestamp: NaiveDateTime,
    value: Option<f64>,
}

#[derive(serde::Serialize)]
struct MetricEntry {
    key: &'static str,
    name: &'static str,
    aggregator: fedframe::Aggregator,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
