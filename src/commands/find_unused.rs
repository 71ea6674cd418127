use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use colored::Colorize;

use uref_graph::UnusedFilter;
use uref_guid::AssetKind;
use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::error::Error;

#[derive(Parser, Debug)]
pub struct FindUnusedCommand {
    /// Restrict the listing to these asset kinds (repeatable),
    /// e.g. `--kind texture --kind material`.
    #[arg(long = "kind", value_parser = AssetKind::from_str)]
    pub kinds: Vec<AssetKind>,

    /// Treat these assets as roots that count as used (path or GUID),
    /// e.g. the scenes in the build settings.
    #[arg(long = "root")]
    pub roots: Vec<String>,

    /// Emit JSON instead of a listing.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl FindUnusedCommand {
    pub fn execute(self, configuration: Configuration, workspace: PathBuf) -> Result<ExitCode, Error> {
        let orchestrator = Orchestrator::open(configuration.to_orchestrator(&workspace))?;

        let exclude = self.roots.iter().filter_map(|root| orchestrator.resolve_asset(root)).collect();
        let filter = UnusedFilter {
            kinds: if self.kinds.is_empty() { None } else { Some(self.kinds.clone()) },
            exclude,
        };

        let unused = match orchestrator.query_engine().unused(&filter) {
            Ok(unused) => unused,
            Err(error) => {
                tracing::error!("{}.", error);

                return Ok(ExitCode::FAILURE);
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&unused)?);

            return Ok(ExitCode::SUCCESS);
        }

        if unused.is_empty() {
            println!("{}", "no unused assets".green());

            return Ok(ExitCode::SUCCESS);
        }

        let store = orchestrator.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        println!("{} unused asset(s):", unused.len());
        for guid in &unused {
            match store.node(*guid) {
                Some(node) => println!("  {}  {}  [{}]", guid, node.path, node.kind),
                None => println!("  {}", guid),
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}
