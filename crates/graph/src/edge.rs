use serde::Deserialize;
use serde::Serialize;

use uref_guid::DependencyKind;
use uref_guid::Guid;
use uref_guid::ReferenceStrength;

/// A directed, typed dependency between two assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: Guid,
    pub target: Guid,
    pub dep_kind: DependencyKind,
    pub strength: ReferenceStrength,
    /// Dotted property chain inside the source file, e.g.
    /// `MeshRenderer.m_Materials[0]`.
    pub context_path: Option<String>,
    pub component_type: Option<String>,
    pub property_name: Option<String>,
    /// Unity local FileID of the document holding the reference.
    pub source_file_id: Option<i64>,
    pub active: bool,
}

/// The identity of an edge. Two edges with the same key are the same edge;
/// everything else on [`DependencyEdge`] is an attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: Guid,
    pub target: Guid,
    pub dep_kind: DependencyKind,
    pub context_path: Option<String>,
}

impl DependencyEdge {
    #[must_use]
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source,
            target: self.target,
            dep_kind: self.dep_kind,
            context_path: self.context_path.clone(),
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({})", self.source, self.target, self.dep_kind)?;
        if let Some(context) = &self.context_path {
            write!(f, " at {}", context)?;
        }

        Ok(())
    }
}
