//! Vigil CLI - Command-line interface for Synheart Vigil
//!
//! Commands:
//! - replay: Push recorded raw samples through the monitoring pipeline
//! - validate: Normalize raw samples and report the ones that would be rejected
//! - protocols: List emergency response protocols
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use synheart_vigil::clock::SystemClock;
use synheart_vigil::collaborators::{
    InMemoryPatientRepository, LoggingEmergencyServices, LoggingNotifier,
};
use synheart_vigil::emergency::Protocol;
use synheart_vigil::normalizer::Normalizer;
use synheart_vigil::thresholds::PatientContext;
use synheart_vigil::{
    MonitorConfig, MonitorCoordinator, MonitorError, RawSample, PRODUCER_NAME, VIGIL_VERSION,
};

/// Vigil - Real-time vital-sign monitoring and emergency response engine
#[derive(Parser)]
#[command(name = "vigil")]
#[command(author = "Synheart AI Inc")]
#[command(version = VIGIL_VERSION)]
#[command(about = "Monitor device vital signs, detect anomalies and orchestrate emergency response", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay raw samples (NDJSON) through the monitoring pipeline
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Monitor configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Patient contexts file: JSON object keyed by patient id
        #[arg(long)]
        contexts: Option<PathBuf>,

        /// Override samples kept per device
        #[arg(long)]
        buffer_capacity: Option<usize>,

        /// Override the anomaly confidence threshold
        #[arg(long)]
        confidence_threshold: Option<f64>,

        /// Run an aggregation cycle after every N accepted samples (0 = only at the end)
        #[arg(long, default_value = "0")]
        aggregate_every: usize,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Print monitoring statistics at the end
        #[arg(long)]
        stats: bool,
    },

    /// Validate raw samples (NDJSON) without running detection
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List emergency response protocols
    Protocols {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Monitor configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check baselines file
        #[arg(long)]
        baselines: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// Pretty-printed JSON
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), VigilCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            contexts,
            buffer_capacity,
            confidence_threshold,
            aggregate_every,
            output_format,
            stats,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(capacity) = buffer_capacity {
                config.buffer_capacity = capacity;
            }
            if let Some(threshold) = confidence_threshold {
                config.detector.confidence_threshold = threshold;
            }
            config.validate()?;

            cmd_replay(
                &input,
                config,
                contexts.as_deref(),
                aggregate_every,
                output_format,
                stats,
            )
            .await
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Protocols { json } => cmd_protocols(json),

        Commands::Doctor {
            config,
            baselines,
            json,
        } => cmd_doctor(config.as_deref(), baselines.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, VigilCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig, VigilCliError> {
    match path {
        Some(path) => Ok(MonitorConfig::from_file(path)?),
        None => Ok(MonitorConfig::default()),
    }
}

/// Non-empty NDJSON lines with their 1-based line numbers
fn ndjson_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    input
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn emit<T: serde::Serialize>(
    out: &mut impl Write,
    value: &T,
    format: &OutputFormat,
) -> Result<(), VigilCliError> {
    let json = match format {
        OutputFormat::Ndjson => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    writeln!(out, "{json}")?;
    Ok(())
}

async fn cmd_replay(
    input: &Path,
    config: MonitorConfig,
    contexts: Option<&Path>,
    aggregate_every: usize,
    output_format: OutputFormat,
    print_stats: bool,
) -> Result<(), VigilCliError> {
    let input_data = read_input(input)?;

    let repository = Arc::new(InMemoryPatientRepository::new());
    if let Some(path) = contexts {
        let contexts: HashMap<String, PatientContext> = serde_json::from_str(&fs::read_to_string(path)?)?;
        for (patient_id, context) in contexts {
            repository.set_context(&patient_id, context);
        }
    }

    let coordinator = MonitorCoordinator::new(
        config,
        repository,
        Arc::new(LoggingNotifier::new()),
        Arc::new(LoggingEmergencyServices::new()),
        Arc::new(SystemClock),
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut connected: BTreeSet<(String, String)> = BTreeSet::new();
    let mut total = 0usize;
    let mut accepted_since_cycle = 0usize;

    for (line_no, line) in ndjson_lines(&input_data) {
        total += 1;
        let raw: RawSample = serde_json::from_str(line).map_err(|e| {
            VigilCliError::ParseError(format!("Failed to parse sample on line {line_no}: {e}"))
        })?;

        let key = (raw.patient_id.clone(), raw.device_id.clone());
        if !connected.contains(&key) && !raw.patient_id.is_empty() && !raw.device_id.is_empty() {
            coordinator
                .connect_device(&raw.patient_id, &raw.device_id, raw.device_type.clone())
                .await?;
            connected.insert(key);
        }

        let outcome = coordinator.on_sample(&raw).await;
        if outcome.accepted {
            accepted_since_cycle += 1;
        }
        emit(&mut out, &outcome, &output_format)?;

        if aggregate_every > 0 && accepted_since_cycle >= aggregate_every {
            for report in coordinator.run_aggregation_cycle().await {
                emit(&mut out, &report, &output_format)?;
            }
            accepted_since_cycle = 0;
        }
    }

    if total == 0 {
        return Err(VigilCliError::NoSamples);
    }

    for report in coordinator.run_aggregation_cycle().await {
        emit(&mut out, &report, &output_format)?;
    }

    if print_stats {
        emit(&mut out, &coordinator.stats(), &output_format)?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), VigilCliError> {
    let input_data = read_input(input)?;

    let mut report = ValidationReport {
        total_samples: 0,
        valid_samples: 0,
        invalid_samples: 0,
        errors: Vec::new(),
    };

    for (line_no, line) in ndjson_lines(&input_data) {
        report.total_samples += 1;
        let result = serde_json::from_str::<RawSample>(line)
            .map_err(MonitorError::from)
            .and_then(|raw| Normalizer::normalize(&raw))
            .and_then(|sample| {
                if sample.metrics.is_empty() {
                    Err(MonitorError::InvalidSample(
                        "sample has no recognizable metrics".into(),
                    ))
                } else {
                    Ok(sample)
                }
            });

        match result {
            Ok(_) => report.valid_samples += 1,
            Err(e) => {
                report.invalid_samples += 1;
                report.errors.push(ValidationErrorDetail {
                    line: line_no,
                    code: e.code().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Line {} [{}]: {}", err.line, err.code, err.error);
            }
        }
    }

    if report.total_samples == 0 {
        Err(VigilCliError::NoSamples)
    } else if report.invalid_samples > 0 {
        Err(VigilCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

fn cmd_protocols(json: bool) -> Result<(), VigilCliError> {
    let protocols = Protocol::all();

    if json {
        println!("{}", serde_json::to_string_pretty(&protocols)?);
        return Ok(());
    }

    println!("Emergency Protocols");
    println!("===================");
    for protocol in &protocols {
        println!(
            "\n{} (response budget {}s)",
            protocol.emergency_type.as_str(),
            protocol.response_budget_secs
        );
        for (i, action) in protocol.actions.iter().enumerate() {
            println!("  {}. {}", i + 1, action.as_str());
        }
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, baselines: Option<&Path>, json: bool) -> Result<(), VigilCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "vigil_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Vigil version {}", VIGIL_VERSION),
    });

    checks.push(match config {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file given, using defaults".to_string(),
        },
        Some(path) if !path.exists() => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: "Config file does not exist".to_string(),
        },
        Some(path) => match MonitorConfig::from_file(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (buffer {} samples, aggregation every {}s)",
                    config.buffer_capacity, config.aggregation_interval_secs
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        },
    });

    if let Some(baselines_path) = baselines {
        if baselines_path.exists() {
            match fs::read_to_string(baselines_path) {
                Ok(content) => match synheart_vigil::baseline::BaselineStore::from_json(&content) {
                    Ok(store) => checks.push(DoctorCheck {
                        name: "baselines".to_string(),
                        status: CheckStatus::Ok,
                        message: format!("Baselines file valid ({} metrics)", store.len()),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "baselines".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid baselines JSON: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "baselines".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read baselines file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "baselines".to_string(),
                status: CheckStatus::Warning,
                message: "Baselines file does not exist".to_string(),
            });
        }
    }

    checks.push(DoctorCheck {
        name: "protocols".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} emergency protocols registered", Protocol::all().len()),
    });

    // Replay reads stdin when given -
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VIGIL_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Vigil Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
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
        Err(VigilCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum VigilCliError {
    Io(io::Error),
    Monitor(MonitorError),
    Json(serde_json::Error),
    NoSamples,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for VigilCliError {
    fn from(e: io::Error) -> Self {
        VigilCliError::Io(e)
    }
}

impl From<MonitorError> for VigilCliError {
    fn from(e: MonitorError) -> Self {
        VigilCliError::Monitor(e)
    }
}

impl From<serde_json::Error> for VigilCliError {
    fn from(e: serde_json::Error) -> Self {
        VigilCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VigilCliError> for CliError {
    fn from(e: VigilCliError) -> Self {
        match e {
            VigilCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VigilCliError::Monitor(e) => {
                let hint = match &e {
                    MonitorError::Config(_) | MonitorError::Json(_) => {
                        "Run 'vigil doctor --config <file>' for details"
                    }
                    _ => "Check the input samples",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            VigilCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VigilCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VigilCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            VigilCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            VigilCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one raw sample JSON object".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    line: usize,
    code: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
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
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
