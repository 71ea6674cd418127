use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use uref_orchestrator::CancellationToken;
use uref_orchestrator::Orchestrator;
use uref_orchestrator::OrchestratorError;
use uref_orchestrator::ScanMode;
use uref_orchestrator::ScanReport;

use crate::config::Configuration;
use crate::error::Error;
use crate::utils::progress::ProgressBarSink;

const IO_FAILURE: u8 = 1;
const PARSE_FATAL: u8 = 3;

#[derive(Parser, Debug)]
pub struct ScanCommand {
    /// Reparse every file, ignoring the signature cache.
    #[arg(long, conflicts_with = "incremental")]
    pub full: bool,

    /// Only reparse changed files (the default).
    #[arg(long)]
    pub incremental: bool,

    /// Restrict the scan to these roots (repeatable).
    #[arg(long = "path")]
    pub paths: Vec<PathBuf>,

    /// Print the full report as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl ScanCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let mut orchestrator_configuration = configuration.to_orchestrator(&workspace);
        if !self.paths.is_empty() {
            orchestrator_configuration.set_scan_roots(&self.paths);
        }

        let mode = if self.full { ScanMode::Full } else { ScanMode::Incremental };

        let mut orchestrator = match Orchestrator::open(orchestrator_configuration) {
            Ok(orchestrator) => orchestrator,
            Err(error) => {
                tracing::error!("Could not open the persistent stores: {}.", error);

                return Ok(ExitCode::from(IO_FAILURE));
            }
        };

        let progress = ProgressBarSink::new();
        let result = orchestrator.scan(mode, &CancellationToken::new(), &progress);
        progress.finish();

        match result {
            Ok(report) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_summary(&report);
                }

                Ok(ExitCode::SUCCESS)
            }
            Err(OrchestratorError::Database(error)) => {
                tracing::error!("Scan aborted by an i/o failure: {}.", error);

                Ok(ExitCode::from(IO_FAILURE))
            }
            Err(error) => {
                tracing::error!("Scan aborted: {}.", error);

                Ok(ExitCode::from(PARSE_FATAL))
            }
        }
    }
}

fn print_summary(report: &ScanReport) {
    let headline = format!(
        "{} scan #{} finished in {} ms{}",
        report.mode,
        report.scan_id,
        report.duration_ms,
        if report.cancelled { " (cancelled)" } else { "" },
    );
    println!("{}", headline.bold());

    println!(
        "  files: {} walked, {} parsed, {} skipped (too large)",
        report.files_walked, report.files_parsed, report.files_skipped_large,
    );

    let changes: Vec<String> =
        report.changes.iter().map(|(kind, count)| format!("{} {}", count, kind)).collect();
    if !changes.is_empty() {
        println!("  changes: {}", changes.join(", "));
    }

    println!(
        "  graph: {} node(s) upserted, {} deactivated, {} edge(s) added, {} removed, {} updated",
        report.nodes_upserted,
        report.nodes_deactivated,
        report.edges.added,
        report.edges.removed,
        report.edges.updated,
    );

    let error_counts = report.error_counts();
    if error_counts.is_empty() {
        println!("  {}", "no errors".green());
    } else {
        let summary: Vec<String> =
            error_counts.iter().map(|(kind, count)| format!("{} {}", count, kind)).collect();
        println!("  {}: {}", "errors".red().bold(), summary.join(", "));
    }

    for warning in report.resolve_warnings.iter().take(10) {
        println!(
            "  {} `{}` references unknown guid {}",
            "warning:".yellow(),
            warning.source_path,
            warning.target,
        );
    }
    if report.resolve_warnings.len() > 10 {
        println!("  ... and {} more unresolved references", report.resolve_warnings.len() - 10);
    }
}
