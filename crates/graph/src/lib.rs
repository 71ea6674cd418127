//! The uref dependency graph engine.
//!
//! The graph is arena-shaped: nodes live in an indexed table keyed by GUID and
//! edges are plain `(source, target, attrs)` records, so the inherently cyclic
//! asset graph involves no pointer cycles. Mutation goes through
//! [`GraphUpdater`] exclusively — it validates batches, applies them
//! atomically under the write lock, and rolls back on mid-apply failure.
//! Reads go through [`QueryEngine`], which may serve from a TTL cache that the
//! updater drops on every commit.

pub use crate::edge::DependencyEdge;
pub use crate::edge::EdgeKey;
pub use crate::error::Conflict;
pub use crate::error::ConflictError;
pub use crate::error::ConflictKind;
pub use crate::error::GraphError;
pub use crate::error::StateError;
pub use crate::node::AssetNode;
pub use crate::persistence::GRAPH_SCHEMA_VERSION;
pub use crate::persistence::load_graph;
pub use crate::persistence::save_graph;
pub use crate::query::ImpactOperation;
pub use crate::query::ImpactReport;
pub use crate::query::ImpactSeverity;
pub use crate::query::QueryCache;
pub use crate::query::QueryEngine;
pub use crate::query::QueryError;
pub use crate::query::QueryOptions;
pub use crate::query::TransitiveClosure;
pub use crate::query::TreeNode;
pub use crate::query::UnusedFilter;
pub use crate::query::ValidationIssue;
pub use crate::query::ValidationIssueKind;
pub use crate::query::ValidationReport;
pub use crate::store::EdgeDelta;
pub use crate::store::GraphStore;
pub use crate::transaction::CacheInvalidator;
pub use crate::transaction::CommitOutcome;
pub use crate::transaction::GraphOperation;
pub use crate::transaction::GraphUpdater;
pub use crate::transaction::Transaction;
pub use crate::transaction::TransactionRecord;
pub use crate::transaction::TransactionStatus;
pub use crate::transaction::UpdaterStats;

pub mod edge;
pub mod error;
pub mod node;
pub mod persistence;
pub mod query;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod property_tests {
    use std::sync::Arc;
    use std::sync::RwLock;
    use std::time::Duration;

    use proptest::prelude::*;

    use uref_guid::AssetKind;
    use uref_guid::DependencyKind;
    use uref_guid::Guid;
    use uref_guid::ReferenceStrength;

    use super::*;

    const NODE_COUNT: u128 = 8;

    fn arb_edges() -> impl Strategy<Value = Vec<(u128, u128)>> {
        proptest::collection::vec((1..=NODE_COUNT, 1..=NODE_COUNT), 0..24)
    }

    fn build(edges: &[(u128, u128)]) -> (GraphUpdater, QueryEngine) {
        let store = Arc::new(RwLock::new(GraphStore::new()));
        let mut updater = GraphUpdater::new(Arc::clone(&store), false);
        let engine = QueryEngine::new(store, Duration::from_secs(300));

        let mut transaction = updater.begin();
        for value in 1..=NODE_COUNT {
            transaction.add_node(AssetNode::new(
                Guid::from_u128(value),
                format!("Assets/{value}.asset"),
                AssetKind::ScriptableObject,
            ));
        }
        updater.commit(transaction).expect("node seeding commits");

        let unique: std::collections::BTreeSet<(u128, u128)> = edges.iter().copied().collect();
        let mut by_source: std::collections::BTreeMap<u128, Vec<DependencyEdge>> = std::collections::BTreeMap::new();
        for (source, target) in &unique {
            by_source.entry(*source).or_default().push(DependencyEdge {
                source: Guid::from_u128(*source),
                target: Guid::from_u128(*target),
                dep_kind: DependencyKind::ScriptableObject,
                strength: ReferenceStrength::Medium,
                context_path: Some(format!("ref.{source}.{target}")),
                component_type: None,
                property_name: None,
                source_file_id: None,
                active: true,
            });
        }

        let mut transaction = updater.begin();
        for (source, edges) in by_source {
            transaction.replace_edges_from(Guid::from_u128(source), edges);
        }
        updater.commit(transaction).expect("edge seeding commits");

        (updater, engine)
    }

    proptest! {
        #[test]
        fn prop_direct_deps_and_refs_are_duals(edges in arb_edges()) {
            let (_updater, engine) = build(&edges);
            let options = QueryOptions::default();

            for value in 1..=NODE_COUNT {
                let guid = Guid::from_u128(value);
                for edge in engine.direct_deps(guid, &options).unwrap() {
                    let back = engine.direct_refs(edge.target, &options).unwrap();
                    prop_assert!(back.iter().any(|candidate| candidate.source == guid));
                }

                for edge in engine.direct_refs(guid, &options).unwrap() {
                    let forward = engine.direct_deps(edge.source, &options).unwrap();
                    prop_assert!(forward.iter().any(|candidate| candidate.target == guid));
                }
            }
        }

        #[test]
        fn prop_no_dangling_edges_after_commit(edges in arb_edges()) {
            let (updater, _engine) = build(&edges);
            let store = updater.store();
            let store = store.read().unwrap();

            for edge in store.edges() {
                prop_assert!(store.node(edge.source).is_some());
                prop_assert!(store.node(edge.target).is_some());
            }
        }

        #[test]
        fn prop_path_index_is_bijective_over_active_nodes(edges in arb_edges()) {
            let (updater, _engine) = build(&edges);
            let store = updater.store();
            let store = store.read().unwrap();

            let mut seen_paths = std::collections::BTreeSet::new();
            for node in store.nodes().filter(|node| node.active) {
                prop_assert!(seen_paths.insert(node.path.clone()), "duplicate active path {}", node.path);
                prop_assert_eq!(store.resolve_path(&node.path), Some(node.guid));
            }
        }

        #[test]
        fn prop_all_deps_is_closed_under_reachability(edges in arb_edges()) {
            let (_updater, engine) = build(&edges);
            let options = QueryOptions::default();

            let origin = Guid::from_u128(1);
            let closure = engine.all_deps(origin, &options).unwrap();

            for member in &closure.nodes {
                for edge in engine.direct_deps(*member, &options).unwrap() {
                    prop_assert!(
                        edge.target == origin || closure.nodes.contains(&edge.target),
                        "{} reachable from {} but missing from the closure",
                        edge.target,
                        member,
                    );
                }
            }
        }

        #[test]
        fn prop_failed_commit_leaves_state_untouched(edges in arb_edges()) {
            let (mut updater, _engine) = build(&edges);
            let store = updater.store();
            let before = store.read().unwrap().to_parts();

            let mut transaction = updater.begin();
            transaction.add_node(AssetNode::new(Guid::from_u128(100), "Assets/new.asset", AssetKind::ScriptableObject));
            transaction.add_edge(DependencyEdge {
                source: Guid::from_u128(100),
                target: Guid::from_u128(999),
                dep_kind: DependencyKind::Indirect,
                strength: ReferenceStrength::Weak,
                context_path: None,
                component_type: None,
                property_name: None,
                source_file_id: None,
                active: true,
            });

            prop_assert!(updater.commit(transaction).is_err());
            prop_assert_eq!(store.read().unwrap().to_parts(), before);
        }
    }
}
