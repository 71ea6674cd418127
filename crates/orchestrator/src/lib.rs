//! Orchestrator for the uref scan pipeline and its services.
//!
//! The [`Orchestrator`] is the one object a front-end needs: it owns the
//! graph store, the transactional updater, the change detector, and the query
//! engine, loads persisted state on open, and coordinates scans. Queries go
//! through [`Orchestrator::query_engine`]; cycle analysis through
//! [`Orchestrator::detect_cycles`], which re-analyzes incrementally when only
//! a small region changed since the last analysis.

use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use uref_cycles::CycleAnalyzer;
use uref_cycles::CycleAnalyzerConfig;
use uref_cycles::CycleReport;
use uref_database::change::ChangeDetector;
use uref_database::signature::SignatureCache;
use uref_graph::GraphStore;
use uref_graph::GraphUpdater;
use uref_graph::QueryEngine;
use uref_graph::UpdaterStats;
use uref_guid::Guid;

pub use crate::cancel::CancellationToken;
pub use crate::config::OrchestratorConfiguration;
pub use crate::error::OrchestratorError;
pub use crate::progress::NullProgress;
pub use crate::progress::ProgressEvent;
pub use crate::progress::ProgressSink;
pub use crate::progress::ScanStage;
pub use crate::report::IoErrorRecord;
pub use crate::report::ResolveWarning;
pub use crate::report::ScanMode;
pub use crate::report::ScanReport;

pub mod cancel;
pub mod config;
pub mod error;
pub mod progress;
pub mod report;

mod pipeline;

/// Wall-clock budget for any single graph query.
const QUERY_BUDGET: Duration = Duration::from_secs(30);

/// Aggregate store counters, for the `stats` surface.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub total_edges: usize,
    pub active_edges: usize,
    pub updater: UpdaterStats,
}

/// The coordinator owning every pipeline component.
pub struct Orchestrator {
    configuration: OrchestratorConfiguration,
    store: Arc<RwLock<GraphStore>>,
    updater: GraphUpdater,
    detector: ChangeDetector,
    query: QueryEngine,
    cycle_analyzer: CycleAnalyzer,
    last_cycle_report: Option<CycleReport>,
    dirty_since_analysis: Vec<Guid>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workspace", &self.configuration.workspace)
            .field("store_path", &self.configuration.store_path)
            .field("dirty_since_analysis", &self.dirty_since_analysis.len())
            .finish()
    }
}

impl Orchestrator {
    /// Opens an orchestrator, cold-starting from the persisted graph
    /// snapshot and signature cache when they exist.
    pub fn open(configuration: OrchestratorConfiguration) -> Result<Self, OrchestratorError> {
        let store = match uref_graph::load_graph(&configuration.graph_snapshot_path())? {
            Some(store) => {
                tracing::debug!(
                    "Cold start from snapshot: {} nodes, {} edges.",
                    store.node_count(),
                    store.edge_count(),
                );

                store
            }
            None => GraphStore::new(),
        };
        let store = Arc::new(RwLock::new(store));

        let cache = SignatureCache::load(&configuration.signature_cache_path())?;
        let detector = ChangeDetector::new(cache, configuration.deep_check);

        let mut updater = GraphUpdater::new(Arc::clone(&store), configuration.reject_new_cycles);
        let query = QueryEngine::new(Arc::clone(&store), configuration.cache_ttl).with_query_budget(QUERY_BUDGET);
        updater.register_invalidator(query.cache());

        let cycle_analyzer = CycleAnalyzer::new(CycleAnalyzerConfig {
            max_cycle_length: configuration.max_cycle_length,
            ..CycleAnalyzerConfig::default()
        });

        Ok(Self {
            configuration,
            store,
            updater,
            detector,
            query,
            cycle_analyzer,
            last_cycle_report: None,
            dirty_since_analysis: Vec::new(),
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &OrchestratorConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn store(&self) -> Arc<RwLock<GraphStore>> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    /// Runs the scan pipeline.
    pub fn scan(
        &mut self,
        mode: ScanMode,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<ScanReport, OrchestratorError> {
        let report =
            pipeline::run(&self.configuration, mode, &mut self.updater, &mut self.detector, cancel, progress)?;

        self.dirty_since_analysis.extend(report.changed_guids.iter().copied());

        Ok(report)
    }

    /// Runs cycle analysis, incrementally when only a small region changed
    /// since the previous run.
    pub fn detect_cycles(&mut self) -> CycleReport {
        let store = self.store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        let report = match &self.last_cycle_report {
            Some(previous) if !self.dirty_since_analysis.is_empty() => {
                self.cycle_analyzer.analyze_incremental(&store, previous, &self.dirty_since_analysis)
            }
            Some(previous) => {
                let mut unchanged = previous.clone();
                unchanged.analyzed_at = chrono::Utc::now();

                unchanged
            }
            None => self.cycle_analyzer.analyze(&store),
        };
        drop(store);

        self.dirty_since_analysis.clear();
        self.last_cycle_report = Some(report.clone());

        report
    }

    /// Resolves a user-supplied asset designator: a 32-hex GUID or a
    /// project-relative path.
    #[must_use]
    pub fn resolve_asset(&self, designator: &str) -> Option<Guid> {
        if let Ok(guid) = Guid::parse(designator) {
            return Some(guid);
        }

        let store = self.store.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let normalized = designator.replace('\\', "/");

        store.resolve_path(&normalized).or_else(|| store.resolve_path(normalized.strip_prefix("./").unwrap_or(&normalized)))
    }

    #[must_use]
    pub fn statistics(&self) -> GraphStatistics {
        let store = self.store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        GraphStatistics {
            total_nodes: store.node_count(),
            active_nodes: store.active_node_count(),
            total_edges: store.edge_count(),
            active_edges: store.active_edge_count(),
            updater: self.updater.stats(),
        }
    }

    /// Writes both persistent stores in their current state. The scan does
    /// this itself; `init` uses it to create empty stores.
    pub fn persist(&self) -> Result<(), OrchestratorError> {
        self.detector.cache().save(&self.configuration.signature_cache_path())?;

        let store = self.store.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        uref_graph::save_graph(&store, &self.configuration.graph_snapshot_path(), self.configuration.backup_enabled)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use uref_graph::ImpactOperation;
    use uref_graph::QueryOptions;
    use uref_guid::DependencyKind;

    use super::*;

    const GUID_PLAYER: &str = "0000000000000000000000000000aaaa";
    const GUID_MATERIAL: &str = "0000000000000000000000000000bbbb";

    fn meta(guid: &str) -> String {
        format!("fileFormatVersion: 2\nguid: {}\nNativeFormatImporter:\n  mainObjectFileID: 100100000\n", guid)
    }

    fn player_prefab(material_guid: &str) -> String {
        format!(
            "%YAML 1.1\n%TAG !u! tag:unity3d.com,2011:\n--- !u!23 &2319923\nMeshRenderer:\n  m_Materials:\n  - {{fileID: 2100000, guid: {}, type: 2}}\n",
            material_guid,
        )
    }

    fn write_project(root: &Path) {
        let assets = root.join("Assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("Player.prefab"), player_prefab(GUID_MATERIAL)).unwrap();
        fs::write(assets.join("Player.prefab.meta"), meta(GUID_PLAYER)).unwrap();
        fs::write(assets.join("PlayerMat.mat"), "--- !u!21 &2100000\nMaterial:\n  m_Name: PlayerMat\n").unwrap();
        fs::write(assets.join("PlayerMat.mat.meta"), meta(GUID_MATERIAL)).unwrap();
    }

    fn open(root: &Path) -> Orchestrator {
        Orchestrator::open(OrchestratorConfiguration::for_workspace(root)).unwrap()
    }

    fn scan(orchestrator: &mut Orchestrator) -> ScanReport {
        orchestrator.scan(ScanMode::Incremental, &CancellationToken::new(), &NullProgress).unwrap()
    }

    #[test]
    fn test_scan_extracts_material_dependency() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        let report = scan(&mut orchestrator);

        assert_eq!(report.files_walked, 4);
        assert!(report.parse_errors.is_empty(), "unexpected parse errors: {:?}", report.parse_errors);
        assert!(report.resolve_warnings.is_empty(), "unexpected warnings: {:?}", report.resolve_warnings);

        let player = Guid::parse(GUID_PLAYER).unwrap();
        let material = Guid::parse(GUID_MATERIAL).unwrap();

        let deps = orchestrator.query_engine().direct_deps(player, &QueryOptions::default()).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target, material);
        assert_eq!(deps[0].dep_kind, DependencyKind::Material);
        assert_eq!(deps[0].context_path.as_deref(), Some("MeshRenderer.m_Materials[0]"));

        assert_eq!(orchestrator.resolve_asset("Assets/Player.prefab"), Some(player));
    }

    #[test]
    fn test_incremental_scan_on_unchanged_tree_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);

        let second = scan(&mut orchestrator);

        assert!(second.is_no_op(), "second scan mutated the graph: {:?}", second);
        assert_eq!(second.transactions_committed, 0);
        assert_eq!(second.changes.get("unchanged"), Some(&4));
    }

    #[test]
    fn test_reopen_cold_starts_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);
        drop(orchestrator);

        let reopened = open(dir.path());
        let statistics = reopened.statistics();

        assert_eq!(statistics.active_nodes, 2);
        assert_eq!(statistics.active_edges, 1);
    }

    #[test]
    fn test_unresolved_reference_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();
        // The prefab references a GUID that no meta file declares.
        fs::write(assets.join("Player.prefab"), player_prefab("00000000000000000000000000009999")).unwrap();
        fs::write(assets.join("Player.prefab.meta"), meta(GUID_PLAYER)).unwrap();

        let mut orchestrator = open(dir.path());
        let report = scan(&mut orchestrator);

        assert!(report.parse_errors.is_empty());
        assert_eq!(report.resolve_warnings.len(), 1);
        assert_eq!(report.resolve_warnings[0].target, Guid::parse("00000000000000000000000000009999").unwrap());

        let player = Guid::parse(GUID_PLAYER).unwrap();
        assert!(orchestrator.query_engine().direct_deps(player, &QueryOptions::default()).unwrap().is_empty());

        let validation = orchestrator.query_engine().validate_refs(player).unwrap();
        assert!(validation.is_valid());
    }

    #[test]
    fn test_mtime_bump_without_deep_check_reparses_but_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut configuration = OrchestratorConfiguration::for_workspace(dir.path());
        configuration.deep_check = false;

        let mut orchestrator = Orchestrator::open(configuration.clone()).unwrap();
        scan(&mut orchestrator);

        // Rewrite identical bytes: size unchanged, mtime bumped.
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("Assets/Player.prefab"), player_prefab(GUID_MATERIAL)).unwrap();

        let mut orchestrator = Orchestrator::open(configuration).unwrap();
        let report = scan(&mut orchestrator);

        assert_eq!(report.changes.get("modified"), Some(&1));
        assert_eq!(report.files_parsed, 1);
        assert!(report.is_no_op(), "semantically identical reparse mutated the graph: {:?}", report);
    }

    #[test]
    fn test_deleted_file_deactivates_node() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);

        fs::remove_file(dir.path().join("Assets/PlayerMat.mat")).unwrap();
        fs::remove_file(dir.path().join("Assets/PlayerMat.mat.meta")).unwrap();
        let report = scan(&mut orchestrator);

        assert_eq!(report.nodes_deactivated, 1);

        let material = Guid::parse(GUID_MATERIAL).unwrap();
        let store = orchestrator.store();
        let store = store.read().unwrap();
        let node = store.node(material).unwrap();
        assert!(!node.active);
        assert_eq!(store.resolve_path("Assets/PlayerMat.mat"), None);
    }

    #[test]
    fn test_modified_asset_replaces_edges() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);

        // Drop the material reference from the prefab.
        fs::write(dir.path().join("Assets/Player.prefab"), "--- !u!1 &1000\nGameObject:\n  m_Name: Player\n")
            .unwrap();
        let report = scan(&mut orchestrator);

        assert_eq!(report.edges.removed, 1);

        let player = Guid::parse(GUID_PLAYER).unwrap();
        assert!(orchestrator.query_engine().direct_deps(player, &QueryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_cycles_detected_and_incrementally_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();

        let guid_a = "00000000000000000000000000000001";
        let guid_b = "00000000000000000000000000000002";
        let reference = |guid: &str| format!("--- !u!114 &100\nMonoBehaviour:\n  m_Other: {{fileID: 11400000, guid: {}, type: 2}}\n", guid);

        fs::write(assets.join("A.asset"), reference(guid_b)).unwrap();
        fs::write(assets.join("A.asset.meta"), meta(guid_a)).unwrap();
        fs::write(assets.join("B.asset"), reference(guid_a)).unwrap();
        fs::write(assets.join("B.asset.meta"), meta(guid_b)).unwrap();

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);

        let report = orchestrator.detect_cycles();
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].nodes, vec![Guid::parse(guid_a).unwrap(), Guid::parse(guid_b).unwrap()]);

        // No changes since: the cached report is reused.
        let cached = orchestrator.detect_cycles();
        assert_eq!(cached.cycles, report.cycles);

        // Breaking the cycle and rescanning updates the analysis.
        fs::write(assets.join("B.asset"), "--- !u!114 &100\nMonoBehaviour:\n  m_Name: B\n").unwrap();
        scan(&mut orchestrator);
        let after = orchestrator.detect_cycles();
        assert!(after.cycles.is_empty());
    }

    #[test]
    fn test_impact_of_material_delete() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let mut orchestrator = open(dir.path());
        scan(&mut orchestrator);

        let material = Guid::parse(GUID_MATERIAL).unwrap();
        let report = orchestrator.query_engine().impact(material, ImpactOperation::Delete).unwrap();

        assert_eq!(report.affected, vec![Guid::parse(GUID_PLAYER).unwrap()]);
    }
}
