//! Circular-reference analysis over the uref dependency graph.
//!
//! Detection is two-staged: Tarjan finds the strongly connected components,
//! then Johnson's algorithm enumerates simple cycles inside each non-trivial
//! component, capped at a configurable length so pathological components stay
//! affordable. Cycles are deduplicated by canonical rotation, classified,
//! severity-scored, and aggregated into a [`CycleReport`] whose JSON form is
//! stable across runs.

use std::time::Instant;

use chrono::Utc;
use foldhash::HashMap;
use foldhash::HashSet;

use uref_graph::GraphStore;
use uref_guid::AssetKind;
use uref_guid::Guid;

pub use crate::report::Cycle;
pub use crate::report::CycleEdge;
pub use crate::report::CycleReport;
pub use crate::report::CycleSeverity;
pub use crate::report::CycleType;
pub use crate::report::HotspotNode;

mod johnson;
mod report;
mod tarjan;

/// Tuning for the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct CycleAnalyzerConfig {
    /// Simple cycles longer than this are not enumerated. Their SCC is still
    /// counted and reported as truncated.
    pub max_cycle_length: usize,
    /// Incremental analysis falls back to a full pass when the affected
    /// region exceeds this fraction of the graph's nodes.
    pub incremental_fallback_ratio: f64,
}

impl Default for CycleAnalyzerConfig {
    fn default() -> Self {
        Self { max_cycle_length: 20, incremental_fallback_ratio: 0.10 }
    }
}

/// Enumerates and classifies cycles against a graph snapshot. Holds only
/// read references into the graph while analyzing.
#[derive(Debug, Clone, Default)]
pub struct CycleAnalyzer {
    config: CycleAnalyzerConfig,
}

impl CycleAnalyzer {
    #[must_use]
    pub fn new(config: CycleAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Full analysis of the current graph.
    #[must_use]
    pub fn analyze(&self, store: &GraphStore) -> CycleReport {
        let started = Instant::now();
        let view = GraphView::build(store);

        let (cycles, scc_count, truncated_sccs) = self.enumerate(&view, None);

        Self::assemble(cycles, scc_count, truncated_sccs, started, "tarjan+johnson")
    }

    /// Re-analysis scoped to the components touched by `changed` nodes plus a
    /// one-hop expansion. Cycles of untouched components are carried over
    /// from `previous`.
    #[must_use]
    pub fn analyze_incremental(&self, store: &GraphStore, previous: &CycleReport, changed: &[Guid]) -> CycleReport {
        let started = Instant::now();
        let view = GraphView::build(store);

        let mut affected: HashSet<Guid> = changed.iter().copied().collect();
        for guid in changed {
            for edge in store.neighbors_out(*guid) {
                affected.insert(edge.target);
            }
            for edge in store.neighbors_in(*guid) {
                affected.insert(edge.source);
            }
        }

        let node_count = view.guids.len().max(1);
        let ratio = affected.len() as f64 / node_count as f64;
        if ratio > self.config.incremental_fallback_ratio {
            tracing::debug!(
                "Affected region covers {:.0}% of the graph; running a full cycle analysis instead.",
                ratio * 100.0,
            );

            let (cycles, scc_count, truncated_sccs) = self.enumerate(&view, None);

            return Self::assemble(cycles, scc_count, truncated_sccs, started, "tarjan+johnson");
        }

        let (mut cycles, scc_count, truncated_sccs) = self.enumerate(&view, Some(&affected));

        for cycle in &previous.cycles {
            let touches_affected = cycle.nodes.iter().any(|node| affected.contains(node));
            let still_present = cycle.nodes.iter().all(|node| view.indices.contains_key(node));

            if !touches_affected && still_present {
                cycles.push(cycle.clone());
            }
        }

        Self::assemble(cycles, scc_count, truncated_sccs, started, "tarjan+johnson/incremental")
    }

    /// Runs SCC detection and per-component cycle enumeration. With a scope,
    /// only components intersecting it are enumerated.
    fn enumerate(&self, view: &GraphView, scope: Option<&HashSet<Guid>>) -> (Vec<Cycle>, usize, usize) {
        let components = tarjan::strongly_connected_components(&view.adjacency);

        let mut cycles: Vec<Cycle> = Vec::new();
        let mut seen: HashSet<Vec<Guid>> = HashSet::default();
        let mut scc_count = 0;
        let mut truncated_sccs = 0;

        for component in components {
            let non_trivial = component.len() >= 2
                || component.iter().any(|&node| view.adjacency[node].contains(&node));
            if !non_trivial {
                continue;
            }

            scc_count += 1;

            if let Some(scope) = scope
                && !component.iter().any(|&node| scope.contains(&view.guids[node]))
            {
                continue;
            }

            let (raw, truncated) = johnson::simple_cycles(&view.adjacency, &component, self.config.max_cycle_length);
            if truncated {
                truncated_sccs += 1;
            }

            for indices in raw {
                let cycle = view.build_cycle(&indices);
                if seen.insert(cycle.nodes.clone()) {
                    cycles.push(cycle);
                }
            }
        }

        (cycles, scc_count, truncated_sccs)
    }

    fn assemble(
        mut cycles: Vec<Cycle>,
        scc_count: usize,
        truncated_sccs: usize,
        started: Instant,
        algorithm: &str,
    ) -> CycleReport {
        cycles.sort_by(|a, b| (a.nodes.len(), &a.nodes).cmp(&(b.nodes.len(), &b.nodes)));

        let mut counts_by_type = std::collections::BTreeMap::new();
        let mut counts_by_severity = std::collections::BTreeMap::new();
        let mut participation: HashMap<Guid, usize> = HashMap::default();

        for cycle in &cycles {
            *counts_by_type.entry(cycle.cycle_type).or_insert(0) += 1;
            *counts_by_severity.entry(cycle.severity).or_insert(0) += 1;
            for node in &cycle.nodes {
                *participation.entry(*node).or_insert(0) += 1;
            }
        }

        let mut affected_nodes: Vec<Guid> = participation.keys().copied().collect();
        affected_nodes.sort_unstable();

        let mut hotspot_nodes: Vec<HotspotNode> = participation
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(guid, cycle_count)| HotspotNode { guid, cycle_count })
            .collect();
        hotspot_nodes.sort_by(|a, b| b.cycle_count.cmp(&a.cycle_count).then(a.guid.cmp(&b.guid)));

        let largest_cycle = cycles.iter().max_by_key(|cycle| cycle.length()).map(|cycle| cycle.nodes.clone());
        let most_critical_cycle = cycles
            .iter()
            .max_by_key(|cycle| (cycle.severity, cycle.length()))
            .map(|cycle| cycle.nodes.clone());

        CycleReport {
            cycles,
            counts_by_type,
            counts_by_severity,
            affected_nodes,
            hotspot_nodes,
            largest_cycle,
            most_critical_cycle,
            scc_count,
            truncated_sccs,
            analysis_time_ms: started.elapsed().as_millis() as u64,
            algorithm: algorithm.to_string(),
            analyzed_at: Utc::now(),
        }
    }
}

/// A dense-index snapshot of the active subgraph, with one representative
/// edge per `(source, target)` pair (the strongest, since a cycle is only as
/// breakable as its strongest link allows).
struct GraphView {
    guids: Vec<Guid>,
    indices: HashMap<Guid, usize>,
    kinds: Vec<AssetKind>,
    adjacency: Vec<Vec<usize>>,
    edge_for: HashMap<(usize, usize), CycleEdge>,
}

impl GraphView {
    fn build(store: &GraphStore) -> Self {
        let mut guids: Vec<Guid> = store.nodes().filter(|node| node.active).map(|node| node.guid).collect();
        guids.sort_unstable();

        let indices: HashMap<Guid, usize> = guids.iter().enumerate().map(|(index, guid)| (*guid, index)).collect();
        let kinds: Vec<AssetKind> = guids
            .iter()
            .map(|guid| store.node(*guid).map_or(AssetKind::Unknown, |node| node.kind))
            .collect();

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); guids.len()];
        let mut edge_for: HashMap<(usize, usize), CycleEdge> = HashMap::default();

        for edge in store.edges().filter(|edge| edge.active) {
            let (Some(&source), Some(&target)) = (indices.get(&edge.source), indices.get(&edge.target)) else {
                continue;
            };

            let summary = CycleEdge {
                source: edge.source,
                target: edge.target,
                dep_kind: edge.dep_kind,
                strength: edge.strength,
                context_path: edge.context_path.clone(),
            };

            match edge_for.get_mut(&(source, target)) {
                Some(existing) => {
                    if summary.strength > existing.strength {
                        *existing = summary;
                    }
                }
                None => {
                    adjacency[source].push(target);
                    edge_for.insert((source, target), summary);
                }
            }
        }

        for targets in &mut adjacency {
            targets.sort_unstable();
        }

        Self { guids, indices, kinds, adjacency, edge_for }
    }

    fn build_cycle(&self, indices: &[usize]) -> Cycle {
        let nodes = report::canonicalize(indices.iter().map(|&index| self.guids[index]).collect());

        let mut edges = Vec::with_capacity(nodes.len());
        for position in 0..nodes.len() {
            let source = self.indices[&nodes[position]];
            let target = self.indices[&nodes[(position + 1) % nodes.len()]];

            if let Some(edge) = self.edge_for.get(&(source, target)) {
                edges.push(edge.clone());
            }
        }

        let kinds: Vec<AssetKind> = nodes.iter().map(|guid| self.kinds[self.indices[guid]]).collect();

        Cycle {
            cycle_type: CycleType::from_length(nodes.len()),
            severity: report::score(&kinds, &edges),
            break_candidates: report::break_candidates(&edges),
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use uref_graph::AssetNode;
    use uref_graph::DependencyEdge;
    use uref_guid::DependencyKind;
    use uref_guid::ReferenceStrength;

    use super::*;

    fn guid(value: u128) -> Guid {
        Guid::from_u128(value)
    }

    fn edge(source: u128, target: u128, strength: ReferenceStrength) -> DependencyEdge {
        DependencyEdge {
            source: guid(source),
            target: guid(target),
            dep_kind: DependencyKind::ScriptableObject,
            strength,
            context_path: None,
            component_type: None,
            property_name: None,
            source_file_id: None,
            active: true,
        }
    }

    fn store_with(nodes: &[u128], edges: &[(u128, u128)]) -> GraphStore {
        let mut store = GraphStore::new();
        for value in nodes {
            store.upsert_node(AssetNode::new(guid(*value), format!("Assets/{value}.asset"), AssetKind::ScriptableObject));
        }

        for (source, target) in edges {
            let mut existing: Vec<DependencyEdge> =
                store.neighbors_out(guid(*source)).cloned().collect();
            existing.push(edge(*source, *target, ReferenceStrength::Medium));
            store.replace_edges_from(guid(*source), existing);
        }

        store
    }

    #[test]
    fn test_three_asset_cycle() {
        let store = store_with(&[1, 2, 3], &[(1, 2), (2, 3), (3, 1)]);

        let report = CycleAnalyzer::default().analyze(&store);

        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.nodes, vec![guid(1), guid(2), guid(3)]);
        assert_eq!(cycle.cycle_type, CycleType::SimpleCycle);
        assert_eq!(cycle.severity, CycleSeverity::Medium);
        assert_eq!(cycle.edges.len(), 3);
        assert_eq!(report.scc_count, 1);
        assert_eq!(report.affected_nodes, vec![guid(1), guid(2), guid(3)]);
    }

    #[test]
    fn test_self_loop() {
        let store = store_with(&[7], &[(7, 7)]);

        let report = CycleAnalyzer::default().analyze(&store);

        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].cycle_type, CycleType::SelfLoop);
        assert_eq!(report.cycles[0].severity, CycleSeverity::Low);
        assert_eq!(report.cycles[0].nodes, vec![guid(7)]);
    }

    #[test]
    fn test_acyclic_graph_is_clean() {
        let store = store_with(&[1, 2, 3], &[(1, 2), (2, 3)]);

        let report = CycleAnalyzer::default().analyze(&store);

        assert!(report.cycles.is_empty());
        assert_eq!(report.scc_count, 0);
        assert!(report.largest_cycle.is_none());
    }

    #[test]
    fn test_cycle_at_length_cap_is_found() {
        let nodes: Vec<u128> = (1..=5).collect();
        let edges: Vec<(u128, u128)> = vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)];
        let store = store_with(&nodes, &edges);

        let analyzer = CycleAnalyzer::new(CycleAnalyzerConfig { max_cycle_length: 5, ..CycleAnalyzerConfig::default() });
        let report = analyzer.analyze(&store);

        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.truncated_sccs, 0);
    }

    #[test]
    fn test_cycle_past_length_cap_reports_scc_only() {
        let nodes: Vec<u128> = (1..=6).collect();
        let edges: Vec<(u128, u128)> = vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 1)];
        let store = store_with(&nodes, &edges);

        let analyzer = CycleAnalyzer::new(CycleAnalyzerConfig { max_cycle_length: 5, ..CycleAnalyzerConfig::default() });
        let report = analyzer.analyze(&store);

        assert!(report.cycles.is_empty());
        assert_eq!(report.scc_count, 1);
        assert_eq!(report.truncated_sccs, 1);
    }

    #[test]
    fn test_hotspots_count_shared_nodes() {
        // Two triangles sharing node 2: 1-2-3 and 2-4-5.
        let store = store_with(&[1, 2, 3, 4, 5], &[(1, 2), (2, 3), (3, 1), (2, 4), (4, 5), (5, 2)]);

        let report = CycleAnalyzer::default().analyze(&store);

        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.hotspot_nodes, vec![HotspotNode { guid: guid(2), cycle_count: 2 }]);
    }

    #[test]
    fn test_inactive_edges_are_ignored() {
        let mut store = store_with(&[1, 2], &[(1, 2)]);
        let mut back = edge(2, 1, ReferenceStrength::Medium);
        back.active = false;
        store.replace_edges_from(guid(2), vec![back]);

        let report = CycleAnalyzer::default().analyze(&store);

        assert!(report.cycles.is_empty());
    }

    #[test]
    fn test_incremental_matches_full_on_affected_region() {
        let store = store_with(&(1..=40).collect::<Vec<u128>>(), &[(1, 2), (2, 3), (3, 1)]);

        let full = CycleAnalyzer::default().analyze(&store);
        let empty_previous = CycleAnalyzer::default().analyze(&store_with(&[], &[]));
        let incremental = CycleAnalyzer::default().analyze_incremental(&store, &empty_previous, &[guid(2)]);

        assert_eq!(incremental.cycles, full.cycles);
        assert_eq!(incremental.algorithm, "tarjan+johnson/incremental");
    }

    #[test]
    fn test_incremental_carries_over_untouched_cycles() {
        let store = store_with(
            &(1..=60).collect::<Vec<u128>>(),
            &[(1, 2), (2, 1), (10, 11), (11, 10)],
        );

        let previous = CycleAnalyzer::default().analyze(&store);
        let incremental = CycleAnalyzer::default().analyze_incremental(&store, &previous, &[guid(1)]);

        assert_eq!(incremental.cycles.len(), 2);
        assert_eq!(previous.cycles, incremental.cycles);
    }

    #[test]
    fn test_incremental_falls_back_when_region_is_large() {
        let store = store_with(&[1, 2, 3], &[(1, 2), (2, 3), (3, 1)]);

        let previous = CycleAnalyzer::default().analyze(&store);
        let incremental = CycleAnalyzer::default().analyze_incremental(&store, &previous, &[guid(1)]);

        // Three changed-or-adjacent nodes out of three is far past 10%.
        assert_eq!(incremental.algorithm, "tarjan+johnson");
        assert_eq!(incremental.cycles, previous.cycles);
    }

    #[test]
    fn test_report_serialization_is_stable() {
        let store = store_with(&[1, 2], &[(1, 2), (2, 1)]);

        let report = CycleAnalyzer::default().analyze(&store);
        let first = serde_json::to_string(&report.cycles).unwrap();
        let second = serde_json::to_string(&CycleAnalyzer::default().analyze(&store).cycles).unwrap();

        assert_eq!(first, second);
    }
}
