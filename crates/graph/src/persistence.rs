//! Durable graph snapshots for cold starts.
//!
//! The snapshot is a versioned bincode blob of the store's nodes and edges.
//! Reads accept the current schema version and the previous one, so an
//! upgraded tool can still load the store an older version wrote.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::edge::DependencyEdge;
use crate::error::GraphError;
use crate::node::AssetNode;
use crate::store::GraphStore;

pub const GRAPH_SCHEMA_VERSION: u32 = 3;
const OLDEST_READABLE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedGraph {
    version: u32,
    /// Unix seconds at save time.
    saved_at: i64,
    nodes: Vec<AssetNode>,
    edges: Vec<DependencyEdge>,
}

/// The version-2 layout, before `saved_at` existed.
#[derive(Debug, Deserialize)]
struct PersistedGraphV2 {
    #[allow(dead_code)]
    version: u32,
    nodes: Vec<AssetNode>,
    edges: Vec<DependencyEdge>,
}

/// Writes a snapshot of the store, optionally keeping the previous snapshot
/// as a `.bak` sibling.
pub fn save_graph(store: &GraphStore, path: &Path, backup: bool) -> Result<(), GraphError> {
    let (nodes, edges) = store.to_parts();
    let persisted = PersistedGraph {
        version: GRAPH_SCHEMA_VERSION,
        saved_at: chrono::Utc::now().timestamp(),
        nodes,
        edges,
    };

    let bytes = bincode::serde::encode_to_vec(&persisted, bincode::config::standard())
        .map_err(GraphError::SnapshotEncode)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| GraphError::Io(parent.to_path_buf(), error))?;
    }

    if backup && path.exists() {
        let backup_path = path.with_extension("bin.bak");
        fs::copy(path, &backup_path).map_err(|error| GraphError::Io(backup_path, error))?;
    }

    fs::write(path, bytes).map_err(|error| GraphError::Io(path.to_path_buf(), error))
}

/// Loads a snapshot, if one exists.
pub fn load_graph(path: &Path) -> Result<Option<GraphStore>, GraphError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(GraphError::Io(path.to_path_buf(), error)),
    };

    let version = peek_version(&bytes, path)?;

    let (nodes, edges) = match version {
        GRAPH_SCHEMA_VERSION => {
            let (persisted, _): (PersistedGraph, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|error| GraphError::SnapshotDecode(path.to_path_buf(), error))?;

            (persisted.nodes, persisted.edges)
        }
        OLDEST_READABLE_VERSION => {
            let (persisted, _): (PersistedGraphV2, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|error| GraphError::SnapshotDecode(path.to_path_buf(), error))?;

            tracing::info!("Loaded a version-{} graph snapshot; it will be rewritten as version {}.", version, GRAPH_SCHEMA_VERSION);

            (persisted.nodes, persisted.edges)
        }
        other => {
            return Err(GraphError::UnsupportedSnapshotVersion {
                path: path.to_path_buf(),
                found: other,
                supported: (OLDEST_READABLE_VERSION, GRAPH_SCHEMA_VERSION),
            });
        }
    };

    Ok(Some(GraphStore::from_parts(nodes, edges)))
}

/// Decodes just the leading version field.
fn peek_version(bytes: &[u8], path: &Path) -> Result<u32, GraphError> {
    #[derive(Deserialize)]
    struct VersionOnly {
        version: u32,
    }

    let (header, _): (VersionOnly, usize) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|error| GraphError::SnapshotDecode(path.to_path_buf(), error))?;

    Ok(header.version)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use uref_guid::AssetKind;
    use uref_guid::DependencyKind;
    use uref_guid::Guid;
    use uref_guid::ReferenceStrength;

    use super::*;

    fn populated_store() -> GraphStore {
        let mut store = GraphStore::new();
        store.upsert_node(AssetNode::new(Guid::from_u128(1), "Assets/a.prefab", AssetKind::Prefab));
        store.upsert_node(AssetNode::new(Guid::from_u128(2), "Assets/b.mat", AssetKind::Material));
        store.replace_edges_from(
            Guid::from_u128(1),
            vec![DependencyEdge {
                source: Guid::from_u128(1),
                target: Guid::from_u128(2),
                dep_kind: DependencyKind::Material,
                strength: ReferenceStrength::Strong,
                context_path: Some("MeshRenderer.m_Materials[0]".to_string()),
                component_type: Some("MeshRenderer".to_string()),
                property_name: Some("m_Materials".to_string()),
                source_file_id: Some(23),
                active: true,
            }],
        );

        store
    }

    #[test]
    fn test_snapshot_round_trip_is_isomorphic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/graph.bin");
        let store = populated_store();

        save_graph(&store, &path, false).unwrap();
        let loaded = load_graph(&path).unwrap().expect("snapshot should exist");

        assert_eq!(loaded.to_parts(), store.to_parts());
        assert_eq!(loaded.resolve_path("Assets/a.prefab"), Some(Guid::from_u128(1)));
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();

        assert!(load_graph(&dir.path().join("absent.bin")).unwrap().is_none());
    }

    #[test]
    fn test_backup_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");
        let store = populated_store();

        save_graph(&store, &path, true).unwrap();
        save_graph(&store, &path, true).unwrap();

        assert!(path.with_extension("bin.bak").exists());
    }

    #[test]
    fn test_future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");

        let persisted = PersistedGraph {
            version: GRAPH_SCHEMA_VERSION + 1,
            saved_at: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        let bytes = bincode::serde::encode_to_vec(&persisted, bincode::config::standard()).unwrap();
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            load_graph(&path),
            Err(GraphError::UnsupportedSnapshotVersion { found, .. }) if found == GRAPH_SCHEMA_VERSION + 1
        ));
    }
}
