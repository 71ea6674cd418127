//! uref — a fast Unity asset reference analyzer.
//!
//! The CLI is a thin shell over the `uref-orchestrator` crate:
//!
//! - **Command layer** ([`commands`]): argument parsing and exit codes
//! - **Configuration layer** ([`config`]): `uref.toml` plus
//!   `UNITY_SCANNER_*` environment overrides
//! - **Rendering**: progress bars, colors, and export formats
//!
//! Everything with algorithmic weight — scanning, parsing, the graph, cycle
//! analysis — lives in the workspace crates.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::ColorChoice;
use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::commands::CliArguments;
use crate::commands::UrefCommand;
use crate::config::Configuration;
use crate::consts::LOG_FILTER_VARIABLE;
use crate::error::Error;
use crate::utils::logger::initialize_logger;

mod commands;
mod config;
mod consts;
mod error;
mod utils;

pub fn main() -> ExitCode {
    run().unwrap_or_else(|error| {
        tracing::error!("{}", error);
        tracing::trace!("Exiting with a failure code due to: {:#?}", error);

        ExitCode::FAILURE
    })
}

fn run() -> Result<ExitCode, Error> {
    let arguments = CliArguments::parse();

    if arguments.colors == ColorChoice::Never {
        colored::control::set_override(false);
    } else if arguments.colors == ColorChoice::Always {
        colored::control::set_override(true);
    }

    initialize_logger(
        if cfg!(debug_assertions) { LevelFilter::DEBUG } else { LevelFilter::INFO },
        LOG_FILTER_VARIABLE,
        arguments.colors,
    );

    let workspace = match arguments.workspace {
        Some(workspace) => workspace,
        None => std::env::current_dir().map_err(|error| Error::Io(PathBuf::from("."), error))?,
    };

    let configuration = Configuration::load(&workspace, arguments.config.as_deref())?;

    match arguments.command {
        UrefCommand::Init(command) => command.execute(workspace),
        UrefCommand::Scan(command) => command.execute(configuration, workspace),
        UrefCommand::FindDeps(command) => command.execute(configuration, workspace),
        UrefCommand::FindUnused(command) => command.execute(configuration, workspace),
        UrefCommand::DetectCircular(command) => command.execute(configuration, workspace),
        UrefCommand::Export(command) => command.execute(configuration, workspace),
        UrefCommand::Stats(command) => command.execute(configuration, workspace),
    }
}
