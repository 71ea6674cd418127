use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::error::Error;

#[derive(Parser, Debug)]
pub struct StatsCommand {
    /// Emit JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let orchestrator = Orchestrator::open(configuration.to_orchestrator(&workspace))?;
        let statistics = orchestrator.statistics();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&statistics)?);

            return Ok(ExitCode::SUCCESS);
        }

        println!("{}", "graph".bold());
        println!("  nodes: {} ({} active)", statistics.total_nodes, statistics.active_nodes);
        println!("  edges: {} ({} active)", statistics.total_edges, statistics.active_edges);

        println!("{}", "updater".bold());
        println!("  operations: {} total", statistics.updater.total_operations);
        println!(
            "  transactions: {} committed, {} failed, {} rolled back",
            statistics.updater.successful_operations,
            statistics.updater.failed_operations,
            statistics.updater.rollbacks,
        );
        println!("  conflicts detected: {}", statistics.updater.conflicts_detected);
        println!("  cache invalidations: {}", statistics.updater.cache_invalidations);

        Ok(ExitCode::SUCCESS)
    }
}
