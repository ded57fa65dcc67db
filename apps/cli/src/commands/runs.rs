//! Run inspection commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use crucible_orchestrator::PipelineConfig;
use crucible_training::{
    discover_run_dirs, load_run, verify_artifact, ArtifactStore, RunEntry, RunId, RunResult,
    RunStatus, StageOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

#[derive(Subcommand, Debug)]
pub enum RunsCommand {
    /// List recorded runs
    List {
        /// Artifact root directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one run with its stage log
    Show {
        /// Run identifier
        run_id: String,

        /// Artifact root directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output the full run record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-hash a run's model artifact and compare it with the manifest
    Verify {
        /// Run identifier
        run_id: String,

        /// Artifact root directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

pub fn execute(command: RunsCommand, config: &PipelineConfig) -> Result<ExitCode> {
    match command {
        RunsCommand::List { output_dir, json } => {
            list(&super::output_dir(output_dir, config), json)
        }
        RunsCommand::Show { run_id, output_dir, json } => {
            show(&super::output_dir(output_dir, config), &RunId(run_id), json)
        }
        RunsCommand::Verify { run_id, output_dir } => {
            verify(&super::output_dir(output_dir, config), &RunId(run_id))
        }
    }
}

fn status_cell(status: RunStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        RunStatus::Completed => cell.fg(Color::Green),
        RunStatus::Failed => cell.fg(Color::Red),
        RunStatus::Pending | RunStatus::Running => cell.fg(Color::Yellow),
    }
}

fn accuracy(entry: &RunEntry) -> String {
    entry
        .run
        .result
        .as_ref()
        .and_then(|r| r.metrics.as_ref())
        .and_then(|m| m.get("accuracy"))
        .map_or_else(|| "-".to_string(), |a| format!("{a:.4}"))
}

fn list(output_dir: &Path, json: bool) -> Result<ExitCode> {
    let store = ArtifactStore::new(output_dir);
    let run_ids = discover_run_dirs(output_dir)
        .with_context(|| format!("Failed to scan {}", output_dir.display()))?;

    let mut entries = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        match load_run(&store, &run_id) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(run_id = %run_id, error = %err, "Skipping unreadable run directory"),
        }
    }

    if json {
        let results: Vec<RunResult> = entries.iter().map(|e| e.run.to_result()).collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("{}", format!("Runs ({})", entries.len()).bold().cyan());
    println!();

    if entries.is_empty() {
        println!("  {}", format!("No runs found under {}.", output_dir.display()).dimmed());
        println!();
        let tip = "Tip: start one with \
                   `crucible-cli train --dataset iris --model logistic_regression`.";
        println!("  {}", tip.dimmed());
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.set_header(vec!["Run", "Status", "Dataset", "Model", "Accuracy", "Started"]);
    for entry in &entries {
        let run = &entry.run;
        table.add_row(vec![
            Cell::new(&run.run_id),
            status_cell(run.status),
            Cell::new(&run.spec.dataset_type),
            Cell::new(&run.spec.model_type),
            Cell::new(accuracy(entry)),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{table}");
    println!();
    Ok(ExitCode::SUCCESS)
}

fn show(output_dir: &Path, run_id: &RunId, json: bool) -> Result<ExitCode> {
    let store = ArtifactStore::new(output_dir);
    let entry = load_run(&store, run_id).with_context(|| format!("Failed to load run {run_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry.run)?);
        return Ok(ExitCode::SUCCESS);
    }

    let run = &entry.run;
    println!();
    println!("{}", format!("Run {}", run.run_id).bold().cyan());
    println!("  Status:  {}", run.status);
    println!("  Dataset: {}", run.spec.dataset_type);
    println!("  Model:   {}", run.spec.model_type);
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(ended_at) = run.ended_at {
        println!("  Ended:   {}", ended_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    let mut table = Table::new();
    table.set_header(vec!["Stage", "Outcome", "Duration (ms)", "Error"]);
    for stage in &run.stages {
        let outcome = match stage.outcome {
            StageOutcome::Ok => Cell::new("ok").fg(Color::Green),
            StageOutcome::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
            StageOutcome::Failed => Cell::new("failed").fg(Color::Red),
        };
        let error = stage.error.as_ref().map_or_else(String::new, |e| e.message.clone());
        table.add_row(vec![
            Cell::new(stage.stage),
            outcome,
            Cell::new(stage.duration_ms),
            Cell::new(error),
        ]);
    }
    println!("{table}");

    if let Some(metrics) = run.result.as_ref().and_then(|r| r.metrics.as_ref()) {
        println!();
        for (name, value) in metrics {
            println!("  {:<10} {:.4}", name, value);
        }
    }
    if let Some(manifest) = &entry.manifest {
        println!();
        let artifact = output_dir.join(&manifest.artifact.path);
        println!("  Artifact: {}", artifact.display().to_string().dimmed());
        println!("  SHA-256:  {}", manifest.artifact.sha256.dimmed());
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

fn verify(output_dir: &Path, run_id: &RunId) -> Result<ExitCode> {
    let store = ArtifactStore::new(output_dir);
    let reference = verify_artifact(&store, run_id)
        .with_context(|| format!("Artifact verification failed for run {run_id}"))?;

    println!(
        "{} {} {}",
        "✓".green(),
        reference.path.display(),
        format!("sha256:{} ({} bytes)", reference.sha256, reference.bytes).dimmed()
    );
    Ok(ExitCode::SUCCESS)
}
