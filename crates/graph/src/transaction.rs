//! Transactional mutation of the graph.
//!
//! All writes flow through [`GraphUpdater::commit`], which validates a buffered
//! operation batch against the live store under the write lock, applies it
//! atomically, and journals inverse state so a mid-apply failure restores the
//! exact pre-transaction state. A rejected batch (`FAILED`) never applied
//! anything; a reversed batch (`ROLLED_BACK`) applied some operations and then
//! undid them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;
use foldhash::HashMap;
use foldhash::HashSet;
use serde::Serialize;

use uref_guid::Guid;

use crate::edge::DependencyEdge;
use crate::edge::EdgeKey;
use crate::error::Conflict;
use crate::error::ConflictError;
use crate::error::ConflictKind;
use crate::error::GraphError;
use crate::error::StateError;
use crate::node::AssetNode;
use crate::store::EdgeDelta;
use crate::store::GraphStore;

/// One buffered mutation.
#[derive(Debug, Clone)]
pub enum GraphOperation {
    AddNode(AssetNode),
    UpdateNode(AssetNode),
    /// Soft-delete: the node stays, marked inactive, edges cascading.
    RemoveNode(Guid),
    AddEdge(DependencyEdge),
    RemoveEdge(EdgeKey),
    /// Wholesale replacement of a source's outgoing edge set; the updater
    /// diffs it against the current set during validation.
    ReplaceEdges { source: Guid, edges: Vec<DependencyEdge> },
}

/// A buffered batch of operations, built up by the pipeline and handed to
/// [`GraphUpdater::commit`] as a unit.
#[derive(Debug, Default)]
pub struct Transaction {
    operations: Vec<GraphOperation>,
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: AssetNode) {
        self.operations.push(GraphOperation::AddNode(node));
    }

    pub fn update_node(&mut self, node: AssetNode) {
        self.operations.push(GraphOperation::UpdateNode(node));
    }

    pub fn remove_node(&mut self, guid: Guid) {
        self.operations.push(GraphOperation::RemoveNode(guid));
    }

    pub fn add_edge(&mut self, edge: DependencyEdge) {
        self.operations.push(GraphOperation::AddEdge(edge));
    }

    pub fn remove_edge(&mut self, key: EdgeKey) {
        self.operations.push(GraphOperation::RemoveEdge(key));
    }

    pub fn replace_edges_from(&mut self, source: Guid, edges: Vec<DependencyEdge>) {
        self.operations.push(GraphOperation::ReplaceEdges { source, edges });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Committed,
    /// Rejected during validation; nothing was applied.
    Failed,
    /// Applied partially, then reversed after an apply failure.
    RolledBack,
}

/// One entry of the updater's operation history.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub status: TransactionStatus,
    pub operations: usize,
    pub conflicts: Vec<Conflict>,
    pub completed_at: DateTime<Utc>,
}

/// Counters maintained across the updater's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdaterStats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub conflicts_detected: u64,
    pub rollbacks: u64,
    pub cache_invalidations: u64,
}

/// Summary of what a committed transaction changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOutcome {
    pub id: u64,
    pub nodes_upserted: usize,
    pub nodes_deactivated: usize,
    pub edges: EdgeDelta,
}

/// A cache that must be dropped wholesale whenever the graph changes.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_all(&self);
}

const HISTORY_LIMIT: usize = 256;

/// The single writer of the graph.
#[must_use]
pub struct GraphUpdater {
    store: Arc<RwLock<GraphStore>>,
    reject_new_cycles: bool,
    next_id: u64,
    stats: UpdaterStats,
    history: VecDeque<TransactionRecord>,
    invalidators: Vec<Arc<dyn CacheInvalidator>>,
}

impl std::fmt::Debug for GraphUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphUpdater")
            .field("reject_new_cycles", &self.reject_new_cycles)
            .field("next_id", &self.next_id)
            .field("stats", &self.stats)
            .field("history", &self.history.len())
            .field("invalidators", &self.invalidators.len())
            .finish()
    }
}

impl GraphUpdater {
    pub fn new(store: Arc<RwLock<GraphStore>>, reject_new_cycles: bool) -> Self {
        Self {
            store,
            reject_new_cycles,
            next_id: 0,
            stats: UpdaterStats::default(),
            history: VecDeque::new(),
            invalidators: Vec::new(),
        }
    }

    /// Registers a cache to invalidate on every successful commit.
    pub fn register_invalidator(&mut self, invalidator: Arc<dyn CacheInvalidator>) {
        self.invalidators.push(invalidator);
    }

    #[must_use]
    pub fn store(&self) -> Arc<RwLock<GraphStore>> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn stats(&self) -> UpdaterStats {
        self.stats
    }

    pub fn history(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.history.iter()
    }

    #[must_use]
    pub fn begin(&self) -> Transaction {
        Transaction::new()
    }

    /// Validates and applies a batch.
    ///
    /// Conflict passes run in a fixed order: existence, edge validity, cycle
    /// introduction (when configured), data consistency. Any conflict fails
    /// the whole batch before anything is applied.
    pub fn commit(&mut self, transaction: Transaction) -> Result<CommitOutcome, GraphError> {
        self.next_id += 1;
        let id = self.next_id;
        let operation_count = transaction.len();
        self.stats.total_operations += operation_count as u64;

        if transaction.is_empty() {
            self.stats.successful_operations += 1;
            self.push_history(id, TransactionStatus::Committed, 0, Vec::new());

            return Ok(CommitOutcome { id, ..CommitOutcome::default() });
        }

        let store = Arc::clone(&self.store);
        let mut store = store.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        let conflicts = self.validate(&store, &transaction.operations);
        if !conflicts.is_empty() {
            self.stats.failed_operations += 1;
            self.stats.conflicts_detected += conflicts.len() as u64;
            self.push_history(id, TransactionStatus::Failed, operation_count, conflicts.clone());

            return Err(GraphError::Conflict(ConflictError { conflicts }));
        }

        match Self::apply(&mut store, &transaction.operations) {
            Ok(outcome) => {
                drop(store);

                self.stats.successful_operations += 1;
                self.push_history(id, TransactionStatus::Committed, operation_count, Vec::new());

                for invalidator in &self.invalidators {
                    invalidator.invalidate_all();
                    self.stats.cache_invalidations += 1;
                }

                Ok(CommitOutcome { id, ..outcome })
            }
            Err(error) => {
                drop(store);

                self.stats.rollbacks += 1;
                self.push_history(id, TransactionStatus::RolledBack, operation_count, Vec::new());

                Err(GraphError::State(error))
            }
        }
    }

    fn push_history(&mut self, id: u64, status: TransactionStatus, operations: usize, conflicts: Vec<Conflict>) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }

        self.history.push_back(TransactionRecord { id, status, operations, conflicts, completed_at: Utc::now() });
    }

    fn validate(&self, store: &GraphStore, operations: &[GraphOperation]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        // Node states as they would be after the batch, filled in op order.
        #[derive(Clone)]
        struct OverlayNode {
            active: bool,
            path: String,
        }
        let mut overlay: HashMap<Guid, OverlayNode> = HashMap::default();
        let node_state = |overlay: &HashMap<Guid, OverlayNode>, store: &GraphStore, guid: Guid| {
            overlay
                .get(&guid)
                .map(|node| (true, node.active))
                .or_else(|| store.node(guid).map(|node| (true, node.active)))
                .unwrap_or((false, false))
        };

        let mut added_edges: Vec<(usize, Guid, Guid)> = Vec::new();
        let mut removed_edges: Vec<(Guid, Guid)> = Vec::new();

        // Pass 1: existence.
        for (index, operation) in operations.iter().enumerate() {
            match operation {
                GraphOperation::AddNode(node) => {
                    let existing_path =
                        overlay.get(&node.guid).map(|n| n.path.clone()).or_else(|| store.node(node.guid).map(|n| n.path.clone()));

                    if let Some(path) = existing_path
                        && path != node.path
                    {
                        conflicts.push(Conflict {
                            kind: ConflictKind::DuplicateNode,
                            operation_index: index,
                            detail: format!("{} already exists at `{}`, cannot add at `{}`", node.guid, path, node.path),
                        });
                        continue;
                    }

                    overlay.insert(node.guid, OverlayNode { active: node.active, path: node.path.clone() });
                }
                GraphOperation::UpdateNode(node) => {
                    let (exists, _) = node_state(&overlay, store, node.guid);
                    if !exists {
                        conflicts.push(Conflict {
                            kind: ConflictKind::MissingNode,
                            operation_index: index,
                            detail: format!("cannot update unknown node {}", node.guid),
                        });
                        continue;
                    }

                    overlay.insert(node.guid, OverlayNode { active: node.active, path: node.path.clone() });
                }
                GraphOperation::RemoveNode(guid) => {
                    let (exists, _) = node_state(&overlay, store, *guid);
                    if !exists {
                        conflicts.push(Conflict {
                            kind: ConflictKind::MissingNode,
                            operation_index: index,
                            detail: format!("cannot remove unknown node {}", guid),
                        });
                        continue;
                    }

                    let path = overlay
                        .get(guid)
                        .map(|n| n.path.clone())
                        .or_else(|| store.node(*guid).map(|n| n.path.clone()))
                        .unwrap_or_default();
                    overlay.insert(*guid, OverlayNode { active: false, path });
                }
                GraphOperation::AddEdge(edge) => {
                    let key = edge.key();
                    if store.edge(key.source, key.target, key.dep_kind, key.context_path.as_deref()).is_some() {
                        conflicts.push(Conflict {
                            kind: ConflictKind::EdgeValidity,
                            operation_index: index,
                            detail: format!("edge {} already exists", key),
                        });
                        continue;
                    }

                    added_edges.push((index, edge.source, edge.target));
                }
                GraphOperation::RemoveEdge(key) => {
                    if store.edge(key.source, key.target, key.dep_kind, key.context_path.as_deref()).is_none() {
                        conflicts.push(Conflict {
                            kind: ConflictKind::EdgeValidity,
                            operation_index: index,
                            detail: format!("cannot remove unknown edge {}", key),
                        });
                        continue;
                    }

                    removed_edges.push((key.source, key.target));
                }
                GraphOperation::ReplaceEdges { source, edges } => {
                    let old: HashSet<EdgeKey> = store.neighbors_out(*source).map(DependencyEdge::key).collect();
                    let new: HashSet<EdgeKey> = edges.iter().map(DependencyEdge::key).collect();

                    for edge in edges {
                        if !old.contains(&edge.key()) {
                            added_edges.push((index, *source, edge.target));
                        }
                    }

                    for key in old.difference(&new) {
                        removed_edges.push((key.source, key.target));
                    }
                }
            }
        }

        // Pass 2: edge validity.
        for (index, source, target) in &added_edges {
            for (role, guid) in [("source", *source), ("target", *target)] {
                let (exists, active) = node_state(&overlay, store, guid);
                if !exists {
                    conflicts.push(Conflict {
                        kind: ConflictKind::EdgeValidity,
                        operation_index: *index,
                        detail: format!("edge {} node {} does not exist", role, guid),
                    });
                } else if !active {
                    conflicts.push(Conflict {
                        kind: ConflictKind::EdgeValidity,
                        operation_index: *index,
                        detail: format!("edge {} node {} is inactive", role, guid),
                    });
                }
            }
        }

        // Pass 3: cycle introduction, only on an otherwise-clean batch.
        if self.reject_new_cycles && conflicts.is_empty() && !added_edges.is_empty() {
            conflicts.extend(Self::detect_new_cycles(store, &added_edges, &removed_edges));
        }

        // Pass 4: data consistency (path uniqueness).
        let mut claimed_paths: HashMap<String, (usize, Guid)> = HashMap::default();
        for (index, operation) in operations.iter().enumerate() {
            let node = match operation {
                GraphOperation::AddNode(node) | GraphOperation::UpdateNode(node) if node.active => node,
                _ => continue,
            };

            if let Some((_, previous)) = claimed_paths.get(&node.path)
                && *previous != node.guid
            {
                conflicts.push(Conflict {
                    kind: ConflictKind::PathCollision,
                    operation_index: index,
                    detail: format!("`{}` claimed by both {} and {}", node.path, previous, node.guid),
                });
                continue;
            }

            claimed_paths.insert(node.path.clone(), (index, node.guid));

            if let Some(holder) = store.resolve_path(&node.path)
                && holder != node.guid
            {
                // The existing holder survives unless the batch deactivates
                // or repaths it.
                let survives = match overlay.get(&holder) {
                    Some(state) => state.active && state.path == node.path,
                    None => true,
                };

                if survives {
                    conflicts.push(Conflict {
                        kind: ConflictKind::PathCollision,
                        operation_index: index,
                        detail: format!("`{}` is already the path of active node {}", node.path, holder),
                    });
                }
            }
        }

        conflicts
    }

    /// The strict `reject_new_cycles` rule: a batch conflicts when, applied
    /// alone, it would create a new SCC of size ≥ 2 or a new self-loop.
    fn detect_new_cycles(
        store: &GraphStore,
        added: &[(usize, Guid, Guid)],
        removed: &[(Guid, Guid)],
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let mut adjacency: HashMap<Guid, HashSet<Guid>> = HashMap::default();
        for edge in store.edges().filter(|edge| edge.active) {
            adjacency.entry(edge.source).or_default().insert(edge.target);
        }

        let pre = adjacency.clone();

        for (source, target) in removed {
            if let Some(targets) = adjacency.get_mut(source) {
                targets.remove(target);
            }
        }
        for (_, source, target) in added {
            adjacency.entry(*source).or_default().insert(*target);
        }

        for (index, source, target) in added {
            if source == target {
                conflicts.push(Conflict {
                    kind: ConflictKind::CycleIntroduction,
                    operation_index: *index,
                    detail: format!("self-loop on {}", source),
                });
                continue;
            }

            let closes_cycle = reaches(&adjacency, *target, *source);
            let already_cyclic = reaches(&pre, *target, *source) && reaches(&pre, *source, *target);

            if closes_cycle && !already_cyclic {
                conflicts.push(Conflict {
                    kind: ConflictKind::CycleIntroduction,
                    operation_index: *index,
                    detail: format!("edge {} -> {} closes a new cycle", source, target),
                });
            }
        }

        conflicts
    }

    fn apply(store: &mut GraphStore, operations: &[GraphOperation]) -> Result<CommitOutcome, StateError> {
        enum JournalEntry {
            Node(Guid, Option<AssetNode>),
            Edges(Guid, Vec<DependencyEdge>),
        }

        let mut journal: Vec<JournalEntry> = Vec::new();
        let mut journaled_nodes: HashSet<Guid> = HashSet::default();
        let mut journaled_edges: HashSet<Guid> = HashSet::default();
        let mut outcome = CommitOutcome::default();

        let snapshot_node = |journal: &mut Vec<JournalEntry>, journaled: &mut HashSet<Guid>, store: &GraphStore, guid: Guid| {
            if journaled.insert(guid) {
                journal.push(JournalEntry::Node(guid, store.node(guid).cloned()));
            }
        };
        let snapshot_edges = |journal: &mut Vec<JournalEntry>, journaled: &mut HashSet<Guid>, store: &GraphStore, source: Guid| {
            if journaled.insert(source) {
                journal.push(JournalEntry::Edges(source, store.outgoing_snapshot(source)));
            }
        };

        let result = (|| -> Result<(), StateError> {
            for operation in operations {
                match operation {
                    GraphOperation::AddNode(node) | GraphOperation::UpdateNode(node) => {
                        snapshot_node(&mut journal, &mut journaled_nodes, store, node.guid);
                        store.upsert_node(node.clone());
                        outcome.nodes_upserted += 1;
                    }
                    GraphOperation::RemoveNode(guid) => {
                        snapshot_node(&mut journal, &mut journaled_nodes, store, *guid);
                        snapshot_edges(&mut journal, &mut journaled_edges, store, *guid);
                        for edge in store.neighbors_in(*guid) {
                            let source = edge.source;
                            snapshot_edges(&mut journal, &mut journaled_edges, store, source);
                        }

                        if !store.deactivate_node(*guid) {
                            return Err(StateError::new(format!("validated node {} vanished before apply", guid)));
                        }
                        outcome.nodes_deactivated += 1;
                    }
                    GraphOperation::AddEdge(edge) => {
                        snapshot_edges(&mut journal, &mut journaled_edges, store, edge.source);
                        store.add_edge_raw(edge.clone())?;
                        outcome.edges.added += 1;
                    }
                    GraphOperation::RemoveEdge(key) => {
                        snapshot_edges(&mut journal, &mut journaled_edges, store, key.source);
                        if store.remove_edge_raw(key).is_none() {
                            return Err(StateError::new(format!("validated edge {} vanished before apply", key)));
                        }
                        outcome.edges.removed += 1;
                    }
                    GraphOperation::ReplaceEdges { source, edges } => {
                        snapshot_edges(&mut journal, &mut journaled_edges, store, *source);
                        let delta = store.replace_edges_from(*source, edges.clone());
                        outcome.edges.added += delta.added;
                        outcome.edges.removed += delta.removed;
                        outcome.edges.updated += delta.updated;
                        outcome.edges.unchanged += delta.unchanged;
                    }
                }
            }

            Ok(())
        })();

        match result {
            Ok(()) => Ok(outcome),
            Err(error) => {
                tracing::error!("Apply failed mid-transaction ({}); rolling back {} journal entries.", error, journal.len());

                for entry in journal.into_iter().rev() {
                    match entry {
                        JournalEntry::Node(guid, previous) => store.restore_node(guid, previous),
                        JournalEntry::Edges(source, edges) => store.restore_outgoing(source, edges),
                    }
                }
                store.rebuild_incoming();

                Err(error)
            }
        }
    }
}

/// BFS reachability over an adjacency map.
fn reaches(adjacency: &HashMap<Guid, HashSet<Guid>>, from: Guid, to: Guid) -> bool {
    let mut visited: HashSet<Guid> = HashSet::default();
    let mut queue: VecDeque<Guid> = VecDeque::new();
    queue.push_back(from);
    visited.insert(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }

        let Some(targets) = adjacency.get(&current) else { continue };
        for target in targets {
            if visited.insert(*target) {
                queue.push_back(*target);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use uref_guid::AssetKind;
    use uref_guid::DependencyKind;
    use uref_guid::ReferenceStrength;

    use super::*;

    fn guid(value: u128) -> Guid {
        Guid::from_u128(value)
    }

    fn node(value: u128, path: &str) -> AssetNode {
        AssetNode::new(guid(value), path, AssetKind::ScriptableObject)
    }

    fn edge(source: u128, target: u128) -> DependencyEdge {
        DependencyEdge {
            source: guid(source),
            target: guid(target),
            dep_kind: DependencyKind::ScriptableObject,
            strength: ReferenceStrength::Medium,
            context_path: None,
            component_type: None,
            property_name: None,
            source_file_id: None,
            active: true,
        }
    }

    fn updater(reject_new_cycles: bool) -> GraphUpdater {
        GraphUpdater::new(Arc::new(RwLock::new(GraphStore::new())), reject_new_cycles)
    }

    fn seed(updater: &mut GraphUpdater, nodes: &[(u128, &str)], edges: &[(u128, u128)]) {
        let mut transaction = updater.begin();
        for (value, path) in nodes {
            transaction.add_node(node(*value, path));
        }
        for (source, target) in edges {
            transaction.add_edge(edge(*source, *target));
        }

        updater.commit(transaction).expect("seed transaction should commit");
    }

    #[test]
    fn test_commit_applies_batch() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "a"), (2, "b")], &[(1, 2)]);

        let store = updater.store();
        let store = store.read().unwrap();

        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_batch_with_dangling_edge_is_rejected_whole() {
        let mut updater = updater(false);

        let mut transaction = updater.begin();
        transaction.add_node(node(1, "n1"));
        transaction.add_node(node(2, "n2"));
        transaction.add_node(node(3, "n3"));
        transaction.add_edge(edge(1, 2));
        transaction.add_edge(edge(2, 4));

        let error = updater.commit(transaction).unwrap_err();
        let GraphError::Conflict(conflict) = error else { panic!("expected a conflict") };
        assert_eq!(conflict.conflicts.len(), 1);
        assert_eq!(conflict.conflicts[0].kind, ConflictKind::EdgeValidity);

        // None of the three nodes became visible.
        let store = updater.store();
        let store = store.read().unwrap();
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.edge_count(), 0);
        assert_eq!(updater.stats().failed_operations, 1);
    }

    #[test]
    fn test_update_of_absent_node_is_missing_node() {
        let mut updater = updater(false);

        let mut transaction = updater.begin();
        transaction.update_node(node(9, "ghost"));

        let error = updater.commit(transaction).unwrap_err();
        let GraphError::Conflict(conflict) = error else { panic!("expected a conflict") };
        assert_eq!(conflict.conflicts[0].kind, ConflictKind::MissingNode);
    }

    #[test]
    fn test_add_node_with_conflicting_path_is_rejected() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "Assets/x.mat")], &[]);

        let mut transaction = updater.begin();
        transaction.add_node(node(2, "Assets/x.mat"));

        let error = updater.commit(transaction).unwrap_err();
        let GraphError::Conflict(conflict) = error else { panic!("expected a conflict") };
        assert_eq!(conflict.conflicts[0].kind, ConflictKind::PathCollision);
    }

    #[test]
    fn test_readding_same_guid_same_path_merges() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "Assets/x.mat")], &[]);

        let mut transaction = updater.begin();
        let mut refreshed = node(1, "Assets/x.mat");
        refreshed.size_bytes = 512;
        transaction.add_node(refreshed);

        updater.commit(transaction).expect("re-adding the same asset merges");

        let store = updater.store();
        let store = store.read().unwrap();
        assert_eq!(store.node(guid(1)).unwrap().size_bytes, 512);
    }

    #[test]
    fn test_reject_new_cycles_blocks_back_edge() {
        let mut updater = updater(true);
        seed(&mut updater, &[(1, "a"), (2, "b")], &[(1, 2)]);

        let mut transaction = updater.begin();
        transaction.add_edge(edge(2, 1));

        let error = updater.commit(transaction).unwrap_err();
        let GraphError::Conflict(conflict) = error else { panic!("expected a conflict") };
        assert_eq!(conflict.conflicts[0].kind, ConflictKind::CycleIntroduction);
    }

    #[test]
    fn test_reject_new_cycles_blocks_self_loop() {
        let mut updater = updater(true);
        seed(&mut updater, &[(1, "a")], &[]);

        let mut transaction = updater.begin();
        transaction.add_edge(edge(1, 1));

        let error = updater.commit(transaction).unwrap_err();
        let GraphError::Conflict(conflict) = error else { panic!("expected a conflict") };
        assert_eq!(conflict.conflicts[0].kind, ConflictKind::CycleIntroduction);
    }

    #[test]
    fn test_back_edge_allowed_when_not_rejecting_cycles() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "a"), (2, "b")], &[(1, 2)]);

        let mut transaction = updater.begin();
        transaction.add_edge(edge(2, 1));

        updater.commit(transaction).expect("cycles are allowed by default");
    }

    #[test]
    fn test_remove_node_cascades_and_commits() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "a"), (2, "b"), (3, "c")], &[(1, 2), (2, 3)]);

        let mut transaction = updater.begin();
        transaction.remove_node(guid(2));
        updater.commit(transaction).expect("removal should commit");

        let store = updater.store();
        let store = store.read().unwrap();
        assert!(!store.node(guid(2)).unwrap().active);
        assert_eq!(store.active_edge_count(), 0);
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn test_duplicate_add_edge_in_batch_rolls_back() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "a"), (2, "b")], &[]);

        // Validation only checks against the committed state, so the second
        // copy slips through and fails inside apply, exercising rollback.
        let mut transaction = updater.begin();
        transaction.add_node(node(3, "c"));
        transaction.add_edge(edge(1, 2));
        transaction.add_edge(edge(1, 2));

        let error = updater.commit(transaction).unwrap_err();
        assert!(matches!(error, GraphError::State(_)));
        assert_eq!(updater.stats().rollbacks, 1);

        // Post-state equals pre-state.
        let store = updater.store();
        let store = store.read().unwrap();
        assert_eq!(store.node_count(), 2);
        assert!(store.node(guid(3)).is_none());
        assert_eq!(store.edge_count(), 0);
        assert_eq!(store.neighbors_in(guid(2)).len(), 0);
    }

    #[test]
    fn test_invalidators_fire_on_commit_only() {
        struct Counter(AtomicUsize);
        impl CacheInvalidator for Counter {
            fn invalidate_all(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut updater = updater(false);
        updater.register_invalidator(Arc::clone(&counter) as Arc<dyn CacheInvalidator>);

        seed(&mut updater, &[(1, "a")], &[]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let mut transaction = updater.begin();
        transaction.update_node(node(9, "ghost"));
        let _ = updater.commit(transaction);

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_records_status() {
        let mut updater = updater(false);
        seed(&mut updater, &[(1, "a")], &[]);

        let mut transaction = updater.begin();
        transaction.update_node(node(9, "ghost"));
        let _ = updater.commit(transaction);

        let statuses: Vec<TransactionStatus> = updater.history().map(|record| record.status).collect();
        assert_eq!(statuses, vec![TransactionStatus::Committed, TransactionStatus::Failed]);
    }
}
