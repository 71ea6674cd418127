use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use uref_orchestrator::Orchestrator;

use crate::config::Configuration;
use crate::consts::CONFIGURATION_FILE;
use crate::error::Error;

/// Exit code when initialization fails.
const INIT_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
pub struct InitCommand {
    /// The project root to initialize. Defaults to the workspace.
    pub project_root: Option<PathBuf>,

    /// Overwrite an existing configuration file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

impl InitCommand {
    pub fn execute(self, workspace: PathBuf) -> Result<ExitCode, Error> {
        let root = self.project_root.unwrap_or(workspace);

        match initialize(&root, self.force) {
            Ok(()) => {
                println!("{} initialized uref in `{}`", "✓".green().bold(), root.display());

                Ok(ExitCode::SUCCESS)
            }
            Err(error) => {
                tracing::error!("Initialization failed: {}.", error);

                Ok(ExitCode::from(INIT_FAILURE))
            }
        }
    }
}

fn initialize(root: &std::path::Path, force: bool) -> Result<(), Error> {
    std::fs::create_dir_all(root).map_err(|error| Error::Io(root.to_path_buf(), error))?;

    let configuration_path = root.join(CONFIGURATION_FILE);
    if configuration_path.exists() && !force {
        return Err(Error::Io(
            configuration_path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "configuration file already exists (use --force)"),
        ));
    }

    let configuration = Configuration::default();
    let rendered = toml::to_string_pretty(&configuration)?;
    std::fs::write(&configuration_path, rendered).map_err(|error| Error::Io(configuration_path, error))?;

    // Empty persistent stores, so a later `scan` cold-starts cleanly.
    let orchestrator = Orchestrator::open(configuration.to_orchestrator(root))?;
    orchestrator.persist()?;

    Ok(())
}
