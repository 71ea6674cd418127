use std::path::PathBuf;

use clap::ColorChoice;
use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::builder::styling::Effects;

use crate::commands::detect_circular::DetectCircularCommand;
use crate::commands::export::ExportCommand;
use crate::commands::find_deps::FindDepsCommand;
use crate::commands::find_unused::FindUnusedCommand;
use crate::commands::init::InitCommand;
use crate::commands::scan::ScanCommand;
use crate::commands::stats::StatsCommand;

pub mod detect_circular;
pub mod export;
pub mod find_deps;
pub mod find_unused;
pub mod init;
pub mod scan;
pub mod stats;

/// Styling for the uref CLI.
pub const CLAP_STYLING: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
    .valid(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD));

/// The uref subcommands.
#[derive(Parser, Debug)]
pub enum UrefCommand {
    /// Write a default configuration file and create empty persistent stores.
    #[command(name = "init")]
    Init(InitCommand),
    /// Scan the project and update the dependency graph.
    #[command(name = "scan")]
    Scan(ScanCommand),
    /// Show what an asset depends on, or what depends on it.
    #[command(name = "find-deps")]
    FindDeps(FindDepsCommand),
    /// List assets nothing references.
    #[command(name = "find-unused")]
    FindUnused(FindUnusedCommand),
    /// Detect circular references and score their severity.
    #[command(name = "detect-circular")]
    DetectCircular(DetectCircularCommand),
    /// Dump the graph in a machine-readable format.
    #[command(name = "export")]
    Export(ExportCommand),
    /// Show graph and updater statistics.
    #[command(name = "stats")]
    Stats(StatsCommand),
}

#[derive(Parser, Debug)]
#[command(
    version,
    author,
    styles = CLAP_STYLING,
    about = "uref: a fast Unity asset reference analyzer.",
    long_about = r#"
uref scans a Unity project's asset tree, extracts GUID references from meta
files and Unity YAML documents, and maintains a persisted dependency graph.

On top of that graph it answers the questions Unity itself will not: which
assets depend on which, which assets are referenced by which, which assets are
unused, and which assets participate in circular references.
"#
)]
pub struct CliArguments {
    /// The project root. Defaults to the current working directory.
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// The configuration file to use instead of `uref.toml` in the workspace.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// When to use colored output.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub colors: ColorChoice,

    /// The subcommand to execute.
    #[clap(subcommand)]
    pub command: UrefCommand,
}
