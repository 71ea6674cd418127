//! Configuration for the scan pipeline and its services.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// The complete configuration for an [`crate::Orchestrator`].
///
/// Field names and defaults mirror the user-facing configuration surface;
/// the CLI layer translates its parsed config file into this struct.
#[derive(Debug, Clone)]
pub struct OrchestratorConfiguration {
    /// Project root every path is made relative to.
    pub workspace: PathBuf,
    /// Root directories to scan; empty scans the workspace.
    pub paths: Vec<PathBuf>,
    /// Glob patterns excluded from scanning.
    pub exclude_paths: Vec<String>,
    /// File extensions considered scan candidates.
    pub file_extensions: Vec<String>,
    pub max_file_size: u64,
    pub ignore_hidden_files: bool,
    pub follow_symlinks: bool,
    /// Confirm size/mtime changes by content hash before reparsing.
    pub deep_check: bool,
    /// Upper bound on parser worker threads; the effective count is
    /// `min(cpu_count, max_workers)`.
    pub max_workers: usize,
    /// Parsed records per graph transaction.
    pub batch_size: usize,
    pub memory_limit_mb: u64,
    pub per_file_timeout: Duration,
    pub reject_new_cycles: bool,
    pub max_cycle_length: usize,
    pub cache_ttl: Duration,
    /// Directory holding the graph snapshot and the signature cache.
    pub store_path: PathBuf,
    pub backup_enabled: bool,
}

impl OrchestratorConfiguration {
    /// Defaults for a workspace, with stores under `.uref/` inside it.
    #[must_use]
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let store_path = workspace.join(".uref");

        Self {
            workspace,
            paths: Vec::new(),
            exclude_paths: vec!["Library/**".to_string(), "Temp/**".to_string(), "Logs/**".to_string()],
            file_extensions: uref_database::default_extensions(),
            max_file_size: 50 * 1024 * 1024,
            ignore_hidden_files: true,
            follow_symlinks: false,
            deep_check: true,
            max_workers: std::thread::available_parallelism().map_or(4, |count| count.get()),
            batch_size: 1000,
            memory_limit_mb: 512,
            per_file_timeout: Duration::from_secs(60),
            reject_new_cycles: false,
            max_cycle_length: 20,
            cache_ttl: Duration::from_secs(300),
            store_path,
            backup_enabled: true,
        }
    }

    /// Effective worker count: the configured bound capped by the machine.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism().map_or(1, |count| count.get());

        self.max_workers.clamp(1, cpus.max(1))
    }

    /// The document-size threshold above which the YAML parser abandons the
    /// structured path. Bounded by the memory limit so one worker cannot
    /// hold a budget-breaking document.
    #[must_use]
    pub fn max_structured_document_bytes(&self) -> usize {
        let memory_bound = (self.memory_limit_mb * 1024 * 1024 / 8) as usize;

        (16 * 1024 * 1024).min(memory_bound.max(64 * 1024))
    }

    #[must_use]
    pub fn graph_snapshot_path(&self) -> PathBuf {
        self.store_path.join("graph.bin")
    }

    #[must_use]
    pub fn signature_cache_path(&self) -> PathBuf {
        self.store_path.join("signatures.bin")
    }

    /// The walker view of this configuration.
    #[must_use]
    pub fn walker_configuration(&self) -> uref_database::WalkerConfiguration {
        uref_database::WalkerConfiguration {
            workspace: self.workspace.clone(),
            roots: self.paths.clone(),
            excludes: self.exclude_paths.clone(),
            extensions: self.file_extensions.clone(),
            follow_symlinks: self.follow_symlinks,
            ignore_hidden: self.ignore_hidden_files,
            max_file_size: self.max_file_size,
        }
    }

    /// Restricts scanning to the given roots (the `scan --path` flags).
    pub fn set_scan_roots(&mut self, roots: impl IntoIterator<Item = impl AsRef<Path>>) {
        self.paths = roots.into_iter().map(|root| root.as_ref().to_path_buf()).collect();
    }
}
