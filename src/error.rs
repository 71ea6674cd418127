use std::path::PathBuf;

use uref_orchestrator::OrchestratorError;

#[derive(Debug)]
pub enum Error {
    BuildingConfiguration(config::ConfigError),
    SerializingToml(toml::ser::Error),
    Io(PathBuf, std::io::Error),
    Orchestrator(OrchestratorError),
    Json(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildingConfiguration(error) => write!(f, "{}", error),
            Self::SerializingToml(error) => write!(f, "{}", error),
            Self::Io(path, error) => write!(f, "i/o failure on `{}`: {}", path.display(), error),
            Self::Orchestrator(error) => write!(f, "{}", error),
            Self::Json(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BuildingConfiguration(error) => Some(error),
            Self::SerializingToml(error) => Some(error),
            Self::Io(_, error) => Some(error),
            Self::Orchestrator(error) => Some(error),
            Self::Json(error) => Some(error),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::BuildingConfiguration(error)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(error: toml::ser::Error) -> Self {
        Self::SerializingToml(error)
    }
}

impl From<OrchestratorError> for Error {
    fn from(error: OrchestratorError) -> Self {
        Self::Orchestrator(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error)
    }
}
