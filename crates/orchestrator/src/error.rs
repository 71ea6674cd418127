use uref_database::DatabaseError;
use uref_graph::GraphError;

/// Failures that abort a pipeline run outright. Per-file problems never
/// surface here; they accumulate in the scan report instead.
#[derive(Debug)]
pub enum OrchestratorError {
    Database(DatabaseError),
    Graph(GraphError),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(error) => write!(f, "{}", error),
            Self::Graph(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(error) => Some(error),
            Self::Graph(error) => Some(error),
        }
    }
}

impl From<DatabaseError> for OrchestratorError {
    fn from(error: DatabaseError) -> Self {
        Self::Database(error)
    }
}

impl From<GraphError> for OrchestratorError {
    fn from(error: GraphError) -> Self {
        Self::Graph(error)
    }
}
