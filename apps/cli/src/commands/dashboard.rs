//! Dashboard command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{Cell, Table};
use crucible_orchestrator::PipelineConfig;
use crucible_training::MetricsReporter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct DashboardArgs {
    /// Artifact root directory to aggregate
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Where to write the snapshot
    #[arg(long)]
    pub dashboard_path: Option<PathBuf>,

    /// Print the snapshot as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: DashboardArgs, config: &PipelineConfig) -> Result<ExitCode> {
    let output_dir = super::output_dir(args.output_dir, config);
    let path = super::dashboard_path(args.dashboard_path, config);

    let snapshot = MetricsReporter::new(&output_dir)
        .refresh(&path)
        .with_context(|| format!("Failed to write dashboard snapshot to {}", path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = &snapshot.pipeline;
    println!();
    println!("{}", "Dashboard updated".bold().green());
    println!("  Snapshot: {}", path.display().to_string().dimmed());
    println!(
        "  Runs: {} total, {} completed, {} failed",
        pipeline.total_runs,
        pipeline.completed_runs.to_string().green(),
        pipeline.failed_runs.to_string().red()
    );
    if let Some(latest) = &pipeline.latest_run {
        println!(
            "  Latest: {} {} on {} ({})",
            latest.run_id.to_string().cyan(),
            latest.model_type,
            latest.dataset_type,
            latest.status
        );
    }

    if !snapshot.metrics.is_empty() {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["Metric", "Min", "Mean", "Max", "Runs"]);
        for (name, summary) in &snapshot.metrics {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(format!("{:.4}", summary.min)),
                Cell::new(format!("{:.4}", summary.mean)),
                Cell::new(format!("{:.4}", summary.max)),
                Cell::new(summary.count),
            ]);
        }
        println!("{table}");
    }
    println!();
    Ok(ExitCode::SUCCESS)
}
