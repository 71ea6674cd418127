use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use uref_graph::DependencyEdge;
use uref_graph::QueryOptions;
use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::error::Error;

const NOT_FOUND: u8 = 4;

#[derive(Parser, Debug)]
pub struct FindDepsCommand {
    /// The asset to inspect: a project-relative path or a 32-hex GUID.
    pub asset: String,

    /// Show what references the asset instead of what it depends on.
    #[arg(long, default_value_t = false)]
    pub reverse: bool,

    /// Follow dependencies transitively.
    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    /// Depth cap for recursive traversal.
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Emit JSON instead of a listing.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl FindDepsCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let orchestrator = Orchestrator::open(configuration.to_orchestrator(&workspace))?;

        let Some(guid) = orchestrator.resolve_asset(&self.asset) else {
            tracing::error!("No asset matches `{}`.", self.asset);

            return Ok(ExitCode::from(NOT_FOUND));
        };

        let options = QueryOptions { max_depth: self.max_depth, ..QueryOptions::default() };
        let engine = orchestrator.query_engine();

        if self.recursive {
            let result =
                if self.reverse { engine.all_refs(guid, &options) } else { engine.all_deps(guid, &options) };
            let closure = match result {
                Ok(closure) => closure,
                Err(error) => {
                    tracing::error!("{}.", error);

                    return Ok(ExitCode::from(NOT_FOUND));
                }
            };

            if self.json {
                println!("{}", serde_json::to_string_pretty(&closure)?);

                return Ok(ExitCode::SUCCESS);
            }

            let store = orchestrator.store();
            let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            println!(
                "{} {} asset(s) in the {} closure of {}:",
                "found".bold(),
                closure.nodes.len(),
                if self.reverse { "reverse" } else { "forward" },
                guid,
            );
            for node in &closure.nodes {
                let depth = closure.depths.get(node).copied().unwrap_or_default();
                let path = store.node(*node).map_or_else(|| "<unknown>".to_string(), |node| node.path.clone());
                println!("  {:>2}  {}  {}", depth, node, path);
            }

            return Ok(ExitCode::SUCCESS);
        }

        let result =
            if self.reverse { engine.direct_refs(guid, &options) } else { engine.direct_deps(guid, &options) };
        let edges = match result {
            Ok(edges) => edges,
            Err(error) => {
                tracing::error!("{}.", error);

                return Ok(ExitCode::from(NOT_FOUND));
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&edges)?);

            return Ok(ExitCode::SUCCESS);
        }

        print_edges(&orchestrator, guid, &edges, self.reverse);

        Ok(ExitCode::SUCCESS)
    }
}

fn print_edges(orchestrator: &Orchestrator, guid: uref_guid::Guid, edges: &[DependencyEdge], reverse: bool) {
    let store = orchestrator.store();
    let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

    let direction = if reverse { "referenced by" } else { "depends on" };
    println!("{} {} {} asset(s):", guid, direction.bold(), edges.len());

    for edge in edges {
        let other = if reverse { edge.source } else { edge.target };
        let path = store.node(other).map_or_else(|| "<unknown>".to_string(), |node| node.path.clone());
        let context = edge.context_path.as_deref().unwrap_or("-");

        println!("  {}  {}  [{} / {}]  {}", other, path, edge.dep_kind, edge.strength, context.dimmed());
    }
}
