use std::path::PathBuf;

use serde::Serialize;

/// Why a transaction was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// An operation addressed a node the graph does not have.
    MissingNode,
    /// An `AddNode` collided with an existing node it cannot merge into.
    DuplicateNode,
    /// An edge endpoint is absent or inactive.
    EdgeValidity,
    /// The batch alone would create a new cycle and the store is configured
    /// to reject that.
    CycleIntroduction,
    /// Two active nodes would share a path.
    PathCollision,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MissingNode => "missing_node",
            Self::DuplicateNode => "duplicate_node",
            Self::EdgeValidity => "edge_validity",
            Self::CycleIntroduction => "cycle_introduction",
            Self::PathCollision => "path_collision",
        };

        write!(f, "{}", name)
    }
}

/// One detected conflict, pointing at the operation that caused it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub operation_index: usize,
    pub detail: String,
}

/// A rejected transaction. Nothing was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictError {
    pub conflicts: Vec<Conflict>,
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transaction rejected with {} conflict(s)", self.conflicts.len())?;
        for conflict in &self.conflicts {
            write!(f, "; {} at operation {}: {}", conflict.kind, conflict.operation_index, conflict.detail)?;
        }

        Ok(())
    }
}

impl std::error::Error for ConflictError {}

/// An internal invariant violation. These indicate a bug, not bad input, and
/// are fatal to the process after logs are flushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateError {
    pub detail: String,
}

impl StateError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "graph invariant violated: {}", self.detail)
    }
}

impl std::error::Error for StateError {}

/// Errors of the graph engine as a whole.
#[derive(Debug)]
pub enum GraphError {
    Conflict(ConflictError),
    State(StateError),
    Io(PathBuf, std::io::Error),
    SnapshotDecode(PathBuf, bincode::error::DecodeError),
    SnapshotEncode(bincode::error::EncodeError),
    UnsupportedSnapshotVersion { path: PathBuf, found: u32, supported: (u32, u32) },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict(error) => write!(f, "{}", error),
            Self::State(error) => write!(f, "{}", error),
            Self::Io(path, error) => write!(f, "i/o failure on `{}`: {}", path.display(), error),
            Self::SnapshotDecode(path, error) => {
                write!(f, "graph snapshot `{}` is unreadable: {}", path.display(), error)
            }
            Self::SnapshotEncode(error) => write!(f, "graph snapshot could not be encoded: {}", error),
            Self::UnsupportedSnapshotVersion { path, found, supported } => write!(
                f,
                "graph snapshot `{}` has schema version {} (supported: {} through {})",
                path.display(),
                found,
                supported.0,
                supported.1,
            ),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conflict(error) => Some(error),
            Self::State(error) => Some(error),
            Self::Io(_, error) => Some(error),
            Self::SnapshotDecode(_, error) => Some(error),
            Self::SnapshotEncode(error) => Some(error),
            Self::UnsupportedSnapshotVersion { .. } => None,
        }
    }
}

impl From<ConflictError> for GraphError {
    fn from(error: ConflictError) -> Self {
        Self::Conflict(error)
    }
}

impl From<StateError> for GraphError {
    fn from(error: StateError) -> Self {
        Self::State(error)
    }
}
