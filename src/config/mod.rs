//! Configuration loading and merging.
//!
//! Sources, in order of precedence: built-in defaults, the `uref.toml` file
//! in the workspace (or an explicit `--config` path), and environment
//! variables of the form `UNITY_SCANNER_<SECTION>_<KEY>`
//! (e.g. `UNITY_SCANNER_SCAN_DEEP_CHECK=false`).

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigBuilder;
use config::File;
use config::FileFormat;
use config::builder::DefaultState;
use serde::Deserialize;
use serde::Serialize;

use uref_orchestrator::OrchestratorConfiguration;

use crate::consts::CONFIGURATION_FILE;
use crate::consts::ENVIRONMENT_PREFIX;
use crate::error::Error;

/// Configuration options for uref.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub scan: ScanConfiguration,
    pub performance: PerformanceConfiguration,
    pub graph: GraphConfiguration,
    pub query: QueryConfiguration,
    pub persistence: PersistenceConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Root directories to scan, relative to the workspace. Empty scans the
    /// whole workspace.
    pub paths: Vec<String>,
    /// Glob patterns excluded from scanning.
    pub exclude_paths: Vec<String>,
    /// File extensions treated as scan candidates.
    pub file_extensions: Vec<String>,
    pub max_file_size_mb: u64,
    pub ignore_hidden_files: bool,
    pub follow_symlinks: bool,
    /// Confirm size/mtime changes by content hash before reparsing.
    pub deep_check: bool,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            exclude_paths: vec!["Library/**".to_string(), "Temp/**".to_string(), "Logs/**".to_string()],
            file_extensions: uref_database::default_extensions(),
            max_file_size_mb: 50,
            ignore_hidden_files: true,
            follow_symlinks: false,
            deep_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfiguration {
    /// Parser worker threads; 0 means one per logical CPU.
    pub max_workers: usize,
    pub batch_size: usize,
    pub memory_limit_mb: u64,
    pub per_file_timeout_s: u64,
}

impl Default for PerformanceConfiguration {
    fn default() -> Self {
        Self { max_workers: 0, batch_size: 1000, memory_limit_mb: 512, per_file_timeout_s: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfiguration {
    /// Reject transactions that would introduce a new cycle.
    pub reject_new_cycles: bool,
    pub max_cycle_length: usize,
}

impl Default for GraphConfiguration {
    fn default() -> Self {
        Self { reject_new_cycles: false, max_cycle_length: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfiguration {
    pub cache_ttl_s: u64,
}

impl Default for QueryConfiguration {
    fn default() -> Self {
        Self { cache_ttl_s: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfiguration {
    /// Directory for the graph snapshot and signature cache, relative to the
    /// workspace.
    pub store_path: String,
    pub backup_enabled: bool,
}

impl Default for PersistenceConfiguration {
    fn default() -> Self {
        Self { store_path: ".uref".to_string(), backup_enabled: true }
    }
}

/// Keys whose environment value is a comma-separated list.
const LIST_KEYS: [&str; 3] = ["paths", "exclude_paths", "file_extensions"];

const SECTIONS: [&str; 5] = ["scan", "performance", "graph", "query", "persistence"];

impl Configuration {
    /// Loads and merges configuration for a workspace.
    pub fn load(workspace: &Path, file: Option<&Path>) -> Result<Configuration, Error> {
        let file_path = file.map_or_else(|| workspace.join(CONFIGURATION_FILE), Path::to_path_buf);

        tracing::debug!("Loading configuration from `{}` and the environment.", file_path.display());

        let builder = Config::builder()
            .add_source(File::from(file_path).required(false).format(FileFormat::Toml));
        let builder = apply_environment_overrides(builder)?;

        let mut this: Configuration = builder.build()?.try_deserialize()?;
        this.normalize();

        Ok(this)
    }

    fn normalize(&mut self) {
        if self.performance.batch_size == 0 {
            tracing::warn!("`performance.batch_size` must be positive; using 1.");
            self.performance.batch_size = 1;
        }

        if self.graph.max_cycle_length == 0 {
            tracing::warn!("`graph.max_cycle_length` must be positive; using the default of 20.");
            self.graph.max_cycle_length = 20;
        }

        if self.scan.file_extensions.is_empty() {
            tracing::warn!("`scan.file_extensions` is empty; using the default extension set.");
            self.scan.file_extensions = uref_database::default_extensions();
        }

        for extension in &mut self.scan.file_extensions {
            if let Some(stripped) = extension.strip_prefix('.') {
                *extension = stripped.to_string();
            }
        }
    }

    /// Resolves this configuration against a workspace into the
    /// orchestrator's view.
    #[must_use]
    pub fn to_orchestrator(&self, workspace: &Path) -> OrchestratorConfiguration {
        let mut configuration = OrchestratorConfiguration::for_workspace(workspace);

        configuration.paths = self.scan.paths.iter().map(PathBuf::from).collect();
        configuration.exclude_paths = self.scan.exclude_paths.clone();
        configuration.file_extensions = self.scan.file_extensions.clone();
        configuration.max_file_size = self.scan.max_file_size_mb * 1024 * 1024;
        configuration.ignore_hidden_files = self.scan.ignore_hidden_files;
        configuration.follow_symlinks = self.scan.follow_symlinks;
        configuration.deep_check = self.scan.deep_check;

        if self.performance.max_workers > 0 {
            configuration.max_workers = self.performance.max_workers;
        }
        configuration.batch_size = self.performance.batch_size;
        configuration.memory_limit_mb = self.performance.memory_limit_mb;
        configuration.per_file_timeout = Duration::from_secs(self.performance.per_file_timeout_s);

        configuration.reject_new_cycles = self.graph.reject_new_cycles;
        configuration.max_cycle_length = self.graph.max_cycle_length;
        configuration.cache_ttl = Duration::from_secs(self.query.cache_ttl_s);

        let store_path = PathBuf::from(&self.persistence.store_path);
        configuration.store_path =
            if store_path.is_absolute() { store_path } else { workspace.join(store_path) };
        configuration.backup_enabled = self.persistence.backup_enabled;

        configuration
    }
}

/// Maps `UNITY_SCANNER_<SECTION>_<KEY>` variables onto config paths. The
/// section is matched against the known section names, so keys may themselves
/// contain underscores (`UNITY_SCANNER_SCAN_MAX_FILE_SIZE_MB`).
fn apply_environment_overrides(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, Error> {
    let prefix = format!("{}_", ENVIRONMENT_PREFIX);

    for (name, value) in std::env::vars() {
        let Some(rest) = name.strip_prefix(&prefix) else { continue };
        let rest = rest.to_ascii_lowercase();

        let Some((section, key)) = SECTIONS
            .iter()
            .find_map(|section| rest.strip_prefix(&format!("{}_", section)).map(|key| (*section, key)))
        else {
            tracing::warn!("Ignoring environment variable `{}`: unknown configuration section.", name);
            continue;
        };

        let path = format!("{}.{}", section, key);
        tracing::debug!("Applying environment override for `{}`.", path);

        if LIST_KEYS.contains(&key) {
            let items: Vec<String> =
                value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect();
            builder = builder.set_override(path, items)?;
        } else {
            builder = builder.set_override(path, value)?;
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();

        assert_eq!(configuration.scan.max_file_size_mb, 50);
        assert!(configuration.scan.deep_check);
        assert!(configuration.scan.ignore_hidden_files);
        assert!(!configuration.scan.follow_symlinks);
        assert_eq!(configuration.performance.batch_size, 1000);
        assert_eq!(configuration.performance.memory_limit_mb, 512);
        assert_eq!(configuration.performance.per_file_timeout_s, 60);
        assert!(!configuration.graph.reject_new_cycles);
        assert_eq!(configuration.graph.max_cycle_length, 20);
        assert_eq!(configuration.query.cache_ttl_s, 300);
        assert!(configuration.persistence.backup_enabled);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIGURATION_FILE),
            "[scan]\nmax_file_size_mb = 10\ndeep_check = false\n\n[graph]\nreject_new_cycles = true\n",
        )
        .unwrap();

        let configuration = Configuration::load(dir.path(), None).unwrap();

        assert_eq!(configuration.scan.max_file_size_mb, 10);
        assert!(!configuration.scan.deep_check);
        assert!(configuration.graph.reject_new_cycles);
        // Untouched sections keep their defaults.
        assert_eq!(configuration.performance.batch_size, 1000);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIGURATION_FILE), "[performance]\nmax_workers = 2\n").unwrap();

        unsafe {
            std::env::set_var("UNITY_SCANNER_PERFORMANCE_MAX_WORKERS", "7");
            std::env::set_var("UNITY_SCANNER_SCAN_FILE_EXTENSIONS", "meta, prefab");
        }

        let configuration = Configuration::load(dir.path(), None).unwrap();

        unsafe {
            std::env::remove_var("UNITY_SCANNER_PERFORMANCE_MAX_WORKERS");
            std::env::remove_var("UNITY_SCANNER_SCAN_FILE_EXTENSIONS");
        }

        assert_eq!(configuration.performance.max_workers, 7);
        assert_eq!(configuration.scan.file_extensions, vec!["meta".to_string(), "prefab".to_string()]);
    }

    #[test]
    fn test_normalize_strips_extension_dots() {
        let mut configuration = Configuration::default();
        configuration.scan.file_extensions = vec![".meta".to_string(), "prefab".to_string()];

        configuration.normalize();

        assert_eq!(configuration.scan.file_extensions, vec!["meta".to_string(), "prefab".to_string()]);
    }

    #[test]
    fn test_to_orchestrator_resolves_units_and_paths() {
        let configuration = Configuration::default();
        let orchestrator = configuration.to_orchestrator(Path::new("/project"));

        assert_eq!(orchestrator.max_file_size, 50 * 1024 * 1024);
        assert_eq!(orchestrator.per_file_timeout, Duration::from_secs(60));
        assert_eq!(orchestrator.cache_ttl, Duration::from_secs(300));
        assert_eq!(orchestrator.store_path, Path::new("/project/.uref"));
    }
}
