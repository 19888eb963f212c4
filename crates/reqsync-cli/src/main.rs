//! `reqsync` command-line driver
//!
//! Exit codes: 0 clean, 2 validation errors, 3 write-back or read failure
//! during sync, 1 anything unexpected.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reqsync_engine::{
    EngineConfig, EngineError, ReportFormat, ReportOptions, SyncEngine, SyncInput, CONFIG_FILE,
    REQUIREMENTS_DIR,
};
use reqsync_io::{read_to_string, OsFs};
use reqsync_model::{PhaseResult, ValidationResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reqsync", version, about = "Reconcile requirement manifests with test evidence")]
struct Cli {
    /// Engine config file (default: <dir>/requirements/reqsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Derive live statuses and write them back
    Sync(SyncArgs),
    /// Check manifests without writing
    Validate {
        /// Scenario directory
        dir: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render the derived state
    Report {
        /// Scenario directory
        dir: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Print summary totals
    Summary {
        /// Scenario directory
        dir: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List validations attributed to a phase
    Phase {
        /// Scenario directory
        dir: PathBuf,
        /// Phase name (`e2e` is accepted for `integration`)
        phase: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Scenario directory
    dir: PathBuf,
    /// Scenario name (default: directory name)
    #[arg(long)]
    scenario: Option<String>,
    /// JSON array of phase results from the test driver
    #[arg(long)]
    phase_results: Option<PathBuf>,
    /// Command run by the driver, repeatable
    #[arg(long = "command")]
    commands: Vec<String>,
    /// Never rewrite declared statuses
    #[arg(long)]
    no_update_statuses: bool,
    /// Never demote complete requirements
    #[arg(long)]
    sticky_complete: bool,
    /// Rewrite every module in canonical form
    #[arg(long)]
    canonicalize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for ReportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => Self::Text,
            Format::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let fs = Arc::new(OsFs::new());
    match cli.command {
        Command::Sync(args) => {
            let dir = absolute(&args.dir)?;
            let mut config = load_config(&fs, cli.config.as_deref(), &dir).await?;
            if args.no_update_statuses {
                config = config.with_update_statuses(false);
            }
            if args.sticky_complete {
                config = config.with_sticky_complete(true);
            }
            if args.canonicalize {
                config = config.with_canonicalize(true);
            }
            let name = args.scenario.clone().unwrap_or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let phase_results = match &args.phase_results {
                Some(path) => read_phase_results(path)?,
                None => Vec::new(),
            };
            let input = SyncInput::new(name, &dir)
                .with_phase_results(phase_results)
                .with_commands(args.commands);

            let engine = SyncEngine::new(fs, config);
            let outcome = match engine.sync(&input).await {
                Ok(outcome) => outcome,
                Err(err @ EngineError::Io { .. }) => {
                    tracing::error!(error = %err, "sync aborted");
                    eprintln!("sync error: {err}");
                    return Ok(3);
                }
                Err(err) => return Err(err.into()),
            };
            if outcome.skipped {
                println!("no {REQUIREMENTS_DIR}/ directory, nothing to sync");
                return Ok(0);
            }
            println!(
                "{} file(s) updated, {} status change(s), pass rate {:.1}%",
                outcome.files_updated.len(),
                outcome.transitions.len(),
                outcome.summary.pass_rate_percent()
            );
            for t in &outcome.transitions {
                println!(
                    "  {}: {} -> {}",
                    t.requirement_id,
                    t.from.as_deref().unwrap_or("-"),
                    t.to
                );
            }
            print_issues(&outcome.diagnostics);
            for err in &outcome.sync_errors {
                eprintln!("sync error: {err}");
            }
            Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
        }
        Command::Validate { dir, json } => {
            let dir = absolute(&dir)?;
            let engine = engine_for(fs, cli.config.as_deref(), &dir).await?;
            let result = engine.validate(&dir).await?;
            if json {
                print_json(&result)?;
            } else {
                print_issues(&result);
                println!(
                    "{} error(s), {} warning(s)",
                    result.errors().count(),
                    result.warnings().count()
                );
            }
            Ok(if result.has_errors() { 2 } else { 0 })
        }
        Command::Report { dir, format } => {
            let dir = absolute(&dir)?;
            let engine = engine_for(fs, cli.config.as_deref(), &dir).await?;
            let name = dir.file_name().map(|n| n.to_string_lossy().into_owned());
            let mut options = ReportOptions::new(format.into());
            options.scenario_name = name;
            let mut out = std::io::stdout().lock();
            engine.report(&dir, &options, &mut out).await?;
            out.flush()?;
            Ok(0)
        }
        Command::Summary { dir, json } => {
            let dir = absolute(&dir)?;
            let engine = engine_for(fs, cli.config.as_deref(), &dir).await?;
            let summary = engine.summary(&dir).await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "requirements {} (grouping {}), passed {}, failed {}, pass rate {:.1}%",
                    summary.total,
                    summary.grouping,
                    summary.passed,
                    summary.failed,
                    summary.pass_rate_percent()
                );
                println!(
                    "targets {}/{} passing",
                    summary.targets.passing, summary.targets.total
                );
            }
            Ok(0)
        }
        Command::Phase { dir, phase, json } => {
            let dir = absolute(&dir)?;
            let engine = engine_for(fs, cli.config.as_deref(), &dir).await?;
            let result = engine.phase_inspect(&dir, &phase).await?;
            if json {
                print_json(&result)?;
            } else {
                println!("phase {}: {} validation(s)", result.phase, result.validations.len());
                for v in &result.validations {
                    let exists = match v.exists {
                        Some(true) => "present",
                        Some(false) => "missing",
                        None => "-",
                    };
                    println!(
                        "  {}#{}  {}  {}  {}  {}",
                        v.requirement_id,
                        v.index,
                        v.kind,
                        v.reference.as_deref().unwrap_or("-"),
                        v.live_status.as_str(),
                        exists
                    );
                }
            }
            Ok(0)
        }
    }
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    Ok(reqsync_io::normalize_path(&cwd.join(dir)))
}

async fn load_config(fs: &OsFs, explicit: Option<&Path>, dir: &Path) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        let text = read_to_string(fs, path)
            .await
            .with_context(|| format!("cannot read config {}", path.display()))?;
        return Ok(EngineConfig::from_toml_str(&text)?);
    }
    let default = dir.join(REQUIREMENTS_DIR).join(CONFIG_FILE);
    Ok(EngineConfig::load(fs, &default).await?.unwrap_or_default())
}

async fn engine_for(fs: Arc<OsFs>, explicit: Option<&Path>, dir: &Path) -> Result<SyncEngine> {
    let config = load_config(&fs, explicit, dir).await?;
    Ok(SyncEngine::new(fs, config))
}

fn read_phase_results(path: &Path) -> Result<Vec<PhaseResult>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read phase results {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid phase results in {}", path.display()))
}

fn print_issues(result: &ValidationResult) {
    for issue in &result.issues {
        println!("{issue}");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
