use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use uref_guid::AssetKind;
use uref_guid::Guid;

/// One asset in the graph, keyed by its GUID.
///
/// Nodes are never hard-deleted by the pipeline: when a file vanishes the node
/// is kept with `active = false` so diagnostic queries can still explain where
/// an edge used to point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    pub guid: Guid,
    /// Project-relative, `/`-normalized path. Unique across active nodes.
    pub path: String,
    pub kind: AssetKind,
    pub size_bytes: u64,
    /// UTC timestamp of the file's last observed modification.
    pub last_modified: DateTime<Utc>,
    pub content_hash: Option<u64>,
    /// Whether the companion asset file has been parsed for references, as
    /// opposed to only its meta side-car.
    pub is_analyzed: bool,
    /// The importer subtree from the meta file, preserved opaquely. Never
    /// contains executable content; only data the YAML parser produced.
    pub importer_metadata: BTreeMap<String, serde_json::Value>,
    pub active: bool,
}

impl AssetNode {
    /// A minimal active node; callers fill in what they know.
    #[must_use]
    pub fn new(guid: Guid, path: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            guid,
            path: path.into(),
            kind,
            size_bytes: 0,
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            content_hash: None,
            is_analyzed: false,
            importer_metadata: BTreeMap::new(),
            active: true,
        }
    }
}
