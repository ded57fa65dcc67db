//! Crucible CLI - command-line interface for the Crucible training pipeline
//!
//! Provides a `crucible-cli` command that trains a classifier on a built-in
//! dataset, inspects recorded runs, and rebuilds the dashboard snapshot.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use commands::{dashboard, runs, train};
use crucible_orchestrator::{ConfigError, PipelineConfig};
use crucible_training::TrainingError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when the request is rejected before any run is created.
const EXIT_CONFIGURATION: u8 = 2;

/// Crucible CLI - reproducible training runs for tabular classifiers
#[derive(Parser, Debug)]
#[command(
    name = "crucible-cli",
    author,
    version,
    about = "Crucible - reproducible training runs for tabular classifiers",
    long_about = "Crucible trains a classifier on a built-in dataset, records every stage of \
                  the run,\npersists a fingerprinted model artifact, and aggregates finished runs \
                  into a dashboard snapshot."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG applies when unset.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Configuration file, layered over ~/.crucible/config.toml and ./crucible.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training pipeline once
    ///
    /// Fetches the dataset, validates it, trains and evaluates the model, and
    /// persists the artifact under a fresh run directory.
    Train(train::TrainArgs),

    /// Inspect recorded runs
    #[command(subcommand)]
    Runs(runs::RunsCommand),

    /// Rebuild the dashboard snapshot from recorded runs
    Dashboard(dashboard::DashboardArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = PipelineConfig::discover_and_load(args.config.as_deref());

    let configured_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    init_tracing(args.log_level.as_deref(), configured_level.as_deref(), args.log_format);

    let result = match config {
        Ok(config) => dispatch(args.command, &config).await,
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            exit_code_for(&err)
        }
    }
}

async fn dispatch(command: Command, config: &PipelineConfig) -> anyhow::Result<ExitCode> {
    match command {
        Command::Train(args) => train::execute(args, config).await,
        Command::Runs(cmd) => runs::execute(cmd, config),
        Command::Dashboard(args) => dashboard::execute(args, config),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
///
/// Level precedence: `--log-level`, then `RUST_LOG`, then the configured
/// `log_level`, then `info`.
fn init_tracing(flag: Option<&str>, configured: Option<&str>, format: LogFormat) {
    let filter = match flag {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info"))),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.without_time().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(err) = installed {
        eprintln!("Failed to install logger: {err}");
    }
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let configuration = err.downcast_ref::<ConfigError>().is_some()
        || matches!(err.downcast_ref::<TrainingError>(), Some(TrainingError::Configuration(_)));
    if configuration {
        ExitCode::from(EXIT_CONFIGURATION)
    } else {
        ExitCode::FAILURE
    }
}
