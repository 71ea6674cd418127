use serde::Serialize;

use uref_guid::DependencyKind;
use uref_guid::Guid;
use uref_guid::ReferenceStrength;

/// One outgoing cross-asset reference extracted from an asset file.
///
/// The source asset is implied by the file the reference was extracted from;
/// resolution against the graph happens later, so the target here is just the
/// GUID as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub target: Guid,
    pub dep_kind: DependencyKind,
    pub strength: ReferenceStrength,
    /// Dotted property chain from the document root, e.g.
    /// `MeshRenderer.m_Materials[0]`.
    pub context_path: Option<String>,
    /// The owning component/document type, e.g. `MeshRenderer`.
    pub component_type: Option<String>,
    /// The final property key holding the reference scalar.
    pub property_name: Option<String>,
    /// Local FileID of the document the reference appears in.
    pub source_file_id: Option<i64>,
    /// The `fileID` written inside the reference scalar itself.
    pub target_file_id: i64,
}

/// Sorts references into the canonical order and drops duplicates of the edge
/// identity tuple `(target, dep_kind, context_path)`.
///
/// This is what makes parsing idempotent: two parses of the same bytes produce
/// byte-identical reference lists regardless of collection-iteration order.
pub fn normalize_references(references: &mut Vec<Reference>) {
    references.sort_by(|a, b| {
        (a.target, a.dep_kind, &a.context_path).cmp(&(b.target, b.dep_kind, &b.context_path))
    });
    references.dedup_by(|a, b| {
        a.target == b.target && a.dep_kind == b.dep_kind && a.context_path == b.context_path
    });
}
