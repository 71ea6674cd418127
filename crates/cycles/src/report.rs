//! Cycle classification, severity scoring, and the serializable report.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use uref_guid::AssetKind;
use uref_guid::DependencyKind;
use uref_guid::Guid;
use uref_guid::ReferenceStrength;

/// Routes `Display` through the serde rename, so report strings and log
/// strings agree.
macro_rules! fmt_via_serde {
    () => {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let text = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;

            write!(f, "{}", text.trim_matches('"'))
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleType {
    SelfLoop,
    SimpleCycle,
    ComplexCycle,
    NestedCycle,
}

impl CycleType {
    #[must_use]
    pub fn from_length(length: usize) -> Self {
        match length {
            0 | 1 => Self::SelfLoop,
            2 | 3 => Self::SimpleCycle,
            4..=8 => Self::ComplexCycle,
            _ => Self::NestedCycle,
        }
    }
}

impl std::fmt::Display for CycleType {
    fmt_via_serde!();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CycleSeverity {
    fn bump(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for CycleSeverity {
    fmt_via_serde!();
}

/// The edge summary carried in reports; a flattened view of the graph edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleEdge {
    pub source: Guid,
    pub target: Guid,
    pub dep_kind: DependencyKind,
    pub strength: ReferenceStrength,
    pub context_path: Option<String>,
}

/// One enumerated cycle in canonical rotation (starting at the
/// lexicographically smallest GUID).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    pub nodes: Vec<Guid>,
    pub cycle_type: CycleType,
    pub severity: CycleSeverity,
    pub edges: Vec<CycleEdge>,
    /// Edges whose removal is the cheapest way to break this cycle.
    pub break_candidates: Vec<CycleEdge>,
}

impl Cycle {
    #[must_use]
    pub fn length(&self) -> usize {
        self.nodes.len()
    }
}

/// Nodes participating in two or more cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotspotNode {
    pub guid: Guid,
    pub cycle_count: usize,
}

/// The full analysis result. Field order is the stable JSON key order, and
/// every collection inside is sorted, so two runs over the same graph diff
/// cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycles: Vec<Cycle>,
    pub counts_by_type: BTreeMap<CycleType, usize>,
    pub counts_by_severity: BTreeMap<CycleSeverity, usize>,
    pub affected_nodes: Vec<Guid>,
    pub hotspot_nodes: Vec<HotspotNode>,
    pub largest_cycle: Option<Vec<Guid>>,
    pub most_critical_cycle: Option<Vec<Guid>>,
    /// Non-trivial SCC count, including those whose enumeration was capped.
    pub scc_count: usize,
    /// SCCs where the length cap suppressed at least one cycle.
    pub truncated_sccs: usize,
    pub analysis_time_ms: u64,
    pub algorithm: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Rotates a cycle into canonical form: the rotation beginning at the
/// smallest GUID. Every rotation of the same cycle canonicalizes identically,
/// which is what deduplication relies on.
#[must_use]
pub fn canonicalize(mut nodes: Vec<Guid>) -> Vec<Guid> {
    if nodes.is_empty() {
        return nodes;
    }

    let smallest = nodes
        .iter()
        .enumerate()
        .min_by_key(|(_, guid)| **guid)
        .map(|(position, _)| position)
        .unwrap_or(0);
    nodes.rotate_left(smallest);

    nodes
}

/// Scores a cycle: base severity from its length, then one bump when a
/// critical-strength edge participates and one when a scene, prefab, or
/// script node does.
#[must_use]
pub fn score(nodes_kinds: &[AssetKind], edges: &[CycleEdge]) -> CycleSeverity {
    let mut severity = match nodes_kinds.len() {
        0 | 1 => CycleSeverity::Low,
        2 | 3 => CycleSeverity::Medium,
        4..=7 => CycleSeverity::High,
        _ => CycleSeverity::Critical,
    };

    if edges.iter().any(|edge| edge.strength >= ReferenceStrength::Critical) {
        severity = severity.bump();
    }

    if nodes_kinds.iter().any(|kind| matches!(kind, AssetKind::Scene | AssetKind::Prefab | AssetKind::Script)) {
        severity = severity.bump();
    }

    severity
}

/// Picks break-edge candidates: every weak or indirect edge, or failing that
/// the single lowest-strength edge.
#[must_use]
pub fn break_candidates(edges: &[CycleEdge]) -> Vec<CycleEdge> {
    let preferred: Vec<CycleEdge> = edges
        .iter()
        .filter(|edge| edge.strength <= ReferenceStrength::Weak || edge.dep_kind == DependencyKind::Indirect)
        .cloned()
        .collect();

    if !preferred.is_empty() {
        return preferred;
    }

    edges.iter().min_by_key(|edge| edge.strength).into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn guid(value: u128) -> Guid {
        Guid::from_u128(value)
    }

    fn edge(source: u128, target: u128, strength: ReferenceStrength) -> CycleEdge {
        CycleEdge {
            source: guid(source),
            target: guid(target),
            dep_kind: DependencyKind::ScriptableObject,
            strength,
            context_path: None,
        }
    }

    #[test]
    fn test_canonicalization_is_rotation_invariant() {
        let rotations =
            [vec![guid(2), guid(3), guid(1)], vec![guid(3), guid(1), guid(2)], vec![guid(1), guid(2), guid(3)]];

        for rotation in rotations {
            assert_eq!(canonicalize(rotation), vec![guid(1), guid(2), guid(3)]);
        }
    }

    #[test]
    fn test_classification_by_length() {
        assert_eq!(CycleType::from_length(1), CycleType::SelfLoop);
        assert_eq!(CycleType::from_length(2), CycleType::SimpleCycle);
        assert_eq!(CycleType::from_length(3), CycleType::SimpleCycle);
        assert_eq!(CycleType::from_length(4), CycleType::ComplexCycle);
        assert_eq!(CycleType::from_length(8), CycleType::ComplexCycle);
        assert_eq!(CycleType::from_length(9), CycleType::NestedCycle);
    }

    #[test]
    fn test_base_severity_by_length() {
        let kinds = vec![AssetKind::ScriptableObject; 3];
        let edges = vec![edge(1, 2, ReferenceStrength::Medium)];

        assert_eq!(score(&kinds, &edges), CycleSeverity::Medium);
        assert_eq!(score(&vec![AssetKind::ScriptableObject; 5], &edges), CycleSeverity::High);
        assert_eq!(score(&vec![AssetKind::ScriptableObject; 8], &edges), CycleSeverity::Critical);
        assert_eq!(score(&vec![AssetKind::ScriptableObject; 1], &edges), CycleSeverity::Low);
    }

    #[test]
    fn test_critical_edge_bumps_severity() {
        let kinds = vec![AssetKind::ScriptableObject; 2];

        assert_eq!(score(&kinds, &[edge(1, 2, ReferenceStrength::Critical)]), CycleSeverity::High);
    }

    #[test]
    fn test_risky_node_kind_bumps_severity() {
        let kinds = vec![AssetKind::Prefab, AssetKind::ScriptableObject];

        assert_eq!(score(&kinds, &[edge(1, 2, ReferenceStrength::Medium)]), CycleSeverity::High);
    }

    #[test]
    fn test_severity_caps_at_critical() {
        let kinds = vec![AssetKind::Prefab; 9];

        assert_eq!(score(&kinds, &[edge(1, 2, ReferenceStrength::Critical)]), CycleSeverity::Critical);
    }

    #[test]
    fn test_break_candidates_prefer_weak_and_indirect() {
        let mut indirect = edge(2, 3, ReferenceStrength::Strong);
        indirect.dep_kind = DependencyKind::Indirect;
        let edges = vec![edge(1, 2, ReferenceStrength::Weak), indirect.clone(), edge(3, 1, ReferenceStrength::Critical)];

        let candidates = break_candidates(&edges);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].strength, ReferenceStrength::Weak);
        assert_eq!(candidates[1], indirect);
    }

    #[test]
    fn test_break_candidates_fall_back_to_weakest() {
        let edges = vec![edge(1, 2, ReferenceStrength::Strong), edge(2, 1, ReferenceStrength::Medium)];

        let candidates = break_candidates(&edges);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strength, ReferenceStrength::Medium);
    }
}
