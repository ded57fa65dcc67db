//! Training command implementation.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use crucible_orchestrator::{PipelineConfig, RunRequest, RunTracker, TrainingOrchestrator};
use crucible_training::{
    BuiltinDatasets, DataValidator, MetricsReporter, ProgressEvent, ProgressSink, RunResult,
    StageOutcome, TracingProgressSink,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset to train on (classification, iris, wine)
    #[arg(long, default_value = "classification")]
    pub dataset: String,

    /// Model family (random_forest, gradient_boosting, logistic_regression, svm)
    #[arg(long, default_value = "random_forest")]
    pub model: String,

    /// Artifact root directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the data validation stage
    #[arg(long)]
    pub skip_validation: bool,

    /// Rebuild the dashboard snapshot after the run
    #[arg(long)]
    pub update_dashboard: bool,

    /// Dashboard snapshot location
    #[arg(long)]
    pub dashboard_path: Option<PathBuf>,

    /// Hyperparameter override (e.g. --param max_depth=5), repeatable
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, f64)>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub(crate) fn parse_param(raw: &str) -> Result<(String, f64), String> {
    let (name, value) =
        raw.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing hyperparameter name in '{raw}'"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.to_string(), value))
}

pub async fn execute(args: TrainArgs, config: &PipelineConfig) -> Result<ExitCode> {
    let output_dir = super::output_dir(args.output_dir, config);

    // Configured defaults first, command-line overrides on top.
    let mut hyperparameters = config.hyperparameters_for(&args.model);
    hyperparameters.extend(args.params);

    let progress: Arc<dyn ProgressSink> =
        if args.json { Arc::new(TracingProgressSink) } else { Arc::new(ConsoleProgress) };
    let orchestrator = TrainingOrchestrator::new(Arc::new(RunTracker::new()))
        .with_provider(Arc::new(BuiltinDatasets::new(config.builtin_options())))
        .with_validator(Arc::new(DataValidator::new(config.validation_rules())))
        .with_progress(progress)
        .with_settings(config.settings());

    let request = RunRequest::new(args.dataset, args.model, &output_dir)
        .with_validation(!args.skip_validation)
        .with_hyperparameters(hyperparameters);
    let result = orchestrator.run(request).await?;

    // The run outcome alone decides the exit status; the dashboard is best effort.
    if args.update_dashboard {
        let path = super::dashboard_path(args.dashboard_path, config);
        match MetricsReporter::new(&output_dir).refresh(&path) {
            Ok(snapshot) => info!(
                path = %path.display(),
                runs = snapshot.pipeline.total_runs,
                "Dashboard updated"
            ),
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to update dashboard"),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, &output_dir);
    }

    Ok(if result.is_completed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_result(result: &RunResult, output_dir: &Path) {
    println!();
    if result.is_completed() {
        println!("{}", "Training run completed".bold().green());
    } else {
        println!("{}", "Training run failed".bold().red());
    }
    println!("  Run: {}", result.run_id.to_string().cyan());

    if let Some(metrics) = &result.metrics {
        for (name, value) in metrics {
            println!("  {:<10} {:.4}", name, value);
        }
    }
    if let Some(reference) = &result.artifact_reference {
        println!("  Artifact: {}", output_dir.join(&reference.path).display().to_string().dimmed());
    }
    if let Some(error) = &result.error {
        let stage = error.stage.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!("  Stage: {}", stage.yellow());
        println!("  Error: {} {}", error.message, format!("({})", error.kind).dimmed());
        if let Some(report) = &error.validation_report {
            for issue in report.errors() {
                println!("    - {}: {}", issue.field, issue.message);
            }
        }
    }
    println!();
}

/// Stage-by-stage progress on stderr.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { run_id, dataset_type, model_type } => {
                eprintln!(
                    "{} {} on {} {}",
                    "Training".bold().cyan(),
                    model_type.bold(),
                    dataset_type.bold(),
                    format!("({run_id})").dimmed()
                );
            }
            ProgressEvent::StageFinished { stage, outcome, duration_ms, .. } => {
                let marker = match outcome {
                    StageOutcome::Ok => "✓".green(),
                    StageOutcome::Skipped => "-".dimmed(),
                    StageOutcome::Failed => "✗".red(),
                };
                eprintln!(
                    "  {} {:<14} {}",
                    marker,
                    stage.as_str(),
                    format!("{duration_ms} ms").dimmed()
                );
            }
            ProgressEvent::StageStarted { .. } | ProgressEvent::RunFinished { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("max_depth=5").unwrap(), ("max_depth".to_string(), 5.0));
        assert_eq!(
            parse_param(" learning_rate = 0.05 ").unwrap(),
            ("learning_rate".to_string(), 0.05)
        );
        assert!(parse_param("max_depth").is_err());
        assert!(parse_param("=5").is_err());
        assert!(parse_param("max_depth=deep").is_err());
    }
}
