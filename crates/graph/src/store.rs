//! The owning container for nodes, edges, and their indexes.

use foldhash::HashMap;
use foldhash::HashSet;
use indexmap::IndexMap;

use uref_guid::DependencyKind;
use uref_guid::Guid;

use crate::edge::DependencyEdge;
use crate::edge::EdgeKey;
use crate::node::AssetNode;

/// Outcome of [`GraphStore::replace_edges_from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EdgeDelta {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl EdgeDelta {
    /// True when the replacement changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

/// The directed graph of assets.
///
/// The store owns node data, per-source edge lists, a reverse adjacency index,
/// and the `path → guid` index. All mutation is supposed to flow through the
/// transactional updater; the mutating methods here are the primitives it
/// composes.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: IndexMap<Guid, AssetNode>,
    outgoing: HashMap<Guid, Vec<DependencyEdge>>,
    /// One entry per incoming edge, so a source appears once per edge it owns
    /// into the target.
    incoming: HashMap<Guid, Vec<Guid>>,
    paths: HashMap<String, Guid>,
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted parts.
    #[must_use]
    pub fn from_parts(nodes: Vec<AssetNode>, edges: Vec<DependencyEdge>) -> Self {
        let mut store = Self::new();
        for node in nodes {
            store.upsert_node(node);
        }

        let mut by_source: HashMap<Guid, Vec<DependencyEdge>> = HashMap::default();
        for edge in edges {
            by_source.entry(edge.source).or_default().push(edge);
        }

        for (source, edges) in by_source {
            store.replace_edges_from(source, edges);
        }

        store
    }

    /// Deterministically-ordered snapshot of every node and edge.
    #[must_use]
    pub fn to_parts(&self) -> (Vec<AssetNode>, Vec<DependencyEdge>) {
        let mut nodes: Vec<AssetNode> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.guid);

        let mut edges: Vec<DependencyEdge> = self.edges().cloned().collect();
        edges.sort_by(|a, b| a.key().cmp(&b.key()));

        (nodes, edges)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn active_node_count(&self) -> usize {
        self.nodes.values().filter(|node| node.active).count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn active_edge_count(&self) -> usize {
        self.edges().filter(|edge| edge.active).count()
    }

    #[must_use]
    pub fn node(&self, guid: Guid) -> Option<&AssetNode> {
        self.nodes.get(&guid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.outgoing.values().flatten()
    }

    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Guid> {
        self.paths.get(path).copied()
    }

    /// Inserts or updates a node, keeping the path index consistent.
    pub fn upsert_node(&mut self, node: AssetNode) -> &AssetNode {
        let guid = node.guid;

        if let Some(existing) = self.nodes.get(&guid)
            && existing.path != node.path
            && self.paths.get(&existing.path) == Some(&guid)
        {
            self.paths.remove(&existing.path);
        }

        if node.active {
            if let Some(previous) = self.paths.insert(node.path.clone(), guid)
                && previous != guid
            {
                tracing::warn!("Path `{}` moved from {} to {} in the path index.", node.path, previous, guid);
            }
        } else if self.paths.get(&node.path) == Some(&guid) {
            self.paths.remove(&node.path);
        }

        self.nodes.insert(guid, node);

        self.nodes.get(&guid).expect("node was just inserted")
    }

    /// Soft-deletes a node: marks it and every edge touching it inactive and
    /// drops it from the path index. Returns false when the node is unknown.
    pub fn deactivate_node(&mut self, guid: Guid) -> bool {
        let Some(node) = self.nodes.get_mut(&guid) else {
            return false;
        };

        node.active = false;
        if self.paths.get(&node.path) == Some(&guid) {
            self.paths.remove(&node.path);
        }

        if let Some(edges) = self.outgoing.get_mut(&guid) {
            for edge in edges {
                edge.active = false;
            }
        }

        let sources: HashSet<Guid> = self.incoming.get(&guid).map(|sources| sources.iter().copied().collect()).unwrap_or_default();
        for source in sources {
            if let Some(edges) = self.outgoing.get_mut(&source) {
                for edge in edges.iter_mut().filter(|edge| edge.target == guid) {
                    edge.active = false;
                }
            }
        }

        true
    }

    /// Atomically replaces the outgoing edge set of `source`.
    ///
    /// Equal edges are kept untouched, edges whose key matches but whose
    /// attributes changed are updated in place, and only the delta touches the
    /// reverse index.
    pub fn replace_edges_from(&mut self, source: Guid, new_edges: Vec<DependencyEdge>) -> EdgeDelta {
        let old_edges = self.outgoing.remove(&source).unwrap_or_default();

        let mut old_by_key: HashMap<EdgeKey, DependencyEdge> = HashMap::default();
        for edge in old_edges {
            old_by_key.insert(edge.key(), edge);
        }

        let mut delta = EdgeDelta::default();
        let mut result: Vec<DependencyEdge> = Vec::with_capacity(new_edges.len());

        for mut edge in new_edges {
            edge.source = source;

            match old_by_key.remove(&edge.key()) {
                Some(old) if old == edge => {
                    delta.unchanged += 1;
                    result.push(old);
                }
                Some(_) => {
                    delta.updated += 1;
                    result.push(edge);
                }
                None => {
                    delta.added += 1;
                    self.incoming.entry(edge.target).or_default().push(source);
                    result.push(edge);
                }
            }
        }

        for (_, removed) in old_by_key {
            delta.removed += 1;
            self.remove_incoming_entry(removed.target, source);
        }

        result.sort_by(|a, b| a.key().cmp(&b.key()));

        if result.is_empty() {
            self.outgoing.remove(&source);
        } else {
            self.outgoing.insert(source, result);
        }

        delta
    }

    pub fn neighbors_out(&self, guid: Guid) -> impl Iterator<Item = &DependencyEdge> {
        self.outgoing.get(&guid).into_iter().flatten()
    }

    /// Every edge whose target is `guid`.
    #[must_use]
    pub fn neighbors_in(&self, guid: Guid) -> Vec<&DependencyEdge> {
        let Some(sources) = self.incoming.get(&guid) else {
            return Vec::new();
        };

        let unique: HashSet<Guid> = sources.iter().copied().collect();
        let mut edges: Vec<&DependencyEdge> = unique
            .into_iter()
            .filter_map(|source| self.outgoing.get(&source))
            .flatten()
            .filter(|edge| edge.target == guid)
            .collect();
        edges.sort_by(|a, b| a.key().cmp(&b.key()));

        edges
    }

    #[must_use]
    pub fn edge(
        &self,
        source: Guid,
        target: Guid,
        dep_kind: DependencyKind,
        context_path: Option<&str>,
    ) -> Option<&DependencyEdge> {
        self.outgoing.get(&source)?.iter().find(|edge| {
            edge.target == target && edge.dep_kind == dep_kind && edge.context_path.as_deref() == context_path
        })
    }

    pub(crate) fn add_edge_raw(&mut self, edge: DependencyEdge) -> Result<(), crate::error::StateError> {
        let key = edge.key();
        if self.outgoing.get(&edge.source).is_some_and(|edges| edges.iter().any(|existing| existing.key() == key)) {
            return Err(crate::error::StateError::new(format!("duplicate edge {}", key)));
        }

        self.incoming.entry(edge.target).or_default().push(edge.source);
        let edges = self.outgoing.entry(edge.source).or_default();
        edges.push(edge);
        edges.sort_by(|a, b| a.key().cmp(&b.key()));

        Ok(())
    }

    pub(crate) fn remove_edge_raw(&mut self, key: &EdgeKey) -> Option<DependencyEdge> {
        let edges = self.outgoing.get_mut(&key.source)?;
        let position = edges.iter().position(|edge| edge.key() == *key)?;
        let removed = edges.remove(position);
        if edges.is_empty() {
            self.outgoing.remove(&key.source);
        }

        self.remove_incoming_entry(removed.target, removed.source);

        Some(removed)
    }

    fn remove_incoming_entry(&mut self, target: Guid, source: Guid) {
        if let Some(sources) = self.incoming.get_mut(&target) {
            if let Some(position) = sources.iter().position(|candidate| *candidate == source) {
                sources.swap_remove(position);
            }

            if sources.is_empty() {
                self.incoming.remove(&target);
            }
        }
    }

    // Rollback primitives. These bypass index maintenance; callers restore a
    // previously-journaled state and then rebuild the reverse index.

    pub(crate) fn restore_node(&mut self, guid: Guid, previous: Option<AssetNode>) {
        match previous {
            Some(node) => {
                self.upsert_node(node);
            }
            None => {
                if let Some(removed) = self.nodes.shift_remove(&guid)
                    && self.paths.get(&removed.path) == Some(&guid)
                {
                    self.paths.remove(&removed.path);
                }
            }
        }
    }

    pub(crate) fn restore_outgoing(&mut self, source: Guid, edges: Vec<DependencyEdge>) {
        if edges.is_empty() {
            self.outgoing.remove(&source);
        } else {
            self.outgoing.insert(source, edges);
        }
    }

    pub(crate) fn outgoing_snapshot(&self, source: Guid) -> Vec<DependencyEdge> {
        self.outgoing.get(&source).cloned().unwrap_or_default()
    }

    pub(crate) fn rebuild_incoming(&mut self) {
        self.incoming.clear();
        let entries: Vec<(Guid, Guid)> =
            self.outgoing.iter().flat_map(|(source, edges)| edges.iter().map(|edge| (edge.target, *source))).collect();

        for (target, source) in entries {
            self.incoming.entry(target).or_default().push(source);
        }
    }
}
