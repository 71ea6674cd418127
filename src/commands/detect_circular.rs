use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use uref_cycles::CycleReport;
use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::error::Error;

const CYCLES_FOUND: u8 = 5;

#[derive(Parser, Debug)]
pub struct DetectCircularCommand {
    /// Write the full JSON report to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit nonzero when any cycle is found.
    #[arg(long, default_value_t = false)]
    pub fail_on_cycle: bool,
}

impl DetectCircularCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let mut orchestrator = Orchestrator::open(configuration.to_orchestrator(&workspace))?;

        let report = orchestrator.detect_cycles();

        if let Some(path) = &self.report {
            let rendered = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, rendered).map_err(|error| Error::Io(path.clone(), error))?;
            println!("report written to `{}`", path.display());
        }

        print_summary(&report);

        if self.fail_on_cycle && !report.cycles.is_empty() {
            return Ok(ExitCode::from(CYCLES_FOUND));
        }

        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(report: &CycleReport) {
    if report.cycles.is_empty() {
        println!("{}", "no circular references".green().bold());

        return;
    }

    println!(
        "{} cycle(s) across {} component(s), {} ms ({})",
        report.cycles.len(),
        report.scc_count,
        report.analysis_time_ms,
        report.algorithm,
    );

    for (cycle_type, count) in &report.counts_by_type {
        println!("  {:>4} {}", count, cycle_type);
    }
    for (severity, count) in &report.counts_by_severity {
        println!("  {:>4} {}", count, severity);
    }

    if !report.hotspot_nodes.is_empty() {
        println!("{}", "hotspots:".bold());
        for hotspot in report.hotspot_nodes.iter().take(5) {
            println!("  {} appears in {} cycle(s)", hotspot.guid, hotspot.cycle_count);
        }
    }

    for cycle in report.cycles.iter().take(10) {
        let chain: Vec<String> = cycle.nodes.iter().map(ToString::to_string).collect();
        println!("  [{}/{}] {}", cycle.cycle_type, cycle.severity, chain.join(" -> "));

        for candidate in cycle.break_candidates.iter().take(3) {
            println!(
                "      {} {} -> {} ({}, {})",
                "break:".yellow(),
                candidate.source,
                candidate.target,
                candidate.dep_kind,
                candidate.strength,
            );
        }
    }

    if report.cycles.len() > 10 {
        println!("  ... and {} more (use --report for the full list)", report.cycles.len() - 10);
    }

    if report.truncated_sccs > 0 {
        println!(
            "{} {} component(s) exceeded the cycle-length cap; their cycles are not enumerated",
            "note:".yellow(),
            report.truncated_sccs,
        );
    }
}
