//! Filesystem layer for uref.
//!
//! This crate owns the first two stages of the scan pipeline: walking the
//! project tree under include/exclude rules ([`walker`]) and classifying the
//! result against a persistent signature cache ([`change`]). Everything
//! downstream (parsing, graph updates) consumes the records produced here.

use std::path::Path;
use std::path::PathBuf;

pub use crate::error::DatabaseError;

pub mod change;
pub mod error;
pub mod signature;
pub mod walker;

/// Configuration for project tree discovery.
///
/// Paths in `roots` may be absolute or relative to `workspace`. Exclude
/// patterns are glob expressions evaluated against the project-relative,
/// `/`-normalized path of each entry.
#[derive(Debug, Clone)]
pub struct WalkerConfiguration {
    /// The project root every reported path is made relative to.
    pub workspace: PathBuf,
    /// Root directories to scan. Empty means the whole workspace.
    pub roots: Vec<PathBuf>,
    /// Glob patterns excluding files and directory subtrees.
    pub excludes: Vec<String>,
    /// File extensions (without the dot) that are scan candidates.
    pub extensions: Vec<String>,
    /// Whether to traverse symbolic links.
    pub follow_symlinks: bool,
    /// Whether to skip dot-files and dot-directories.
    pub ignore_hidden: bool,
    /// Files strictly larger than this are reported, not yielded.
    pub max_file_size: u64,
}

impl WalkerConfiguration {
    /// A configuration scanning the whole workspace with uref's default
    /// Unity extension set.
    #[must_use]
    pub fn for_workspace(workspace: PathBuf) -> Self {
        Self {
            workspace,
            roots: Vec::new(),
            excludes: Vec::new(),
            extensions: default_extensions(),
            follow_symlinks: false,
            ignore_hidden: true,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

/// The extensions scanned by default: Unity asset formats, their side-car
/// meta files, and C# sources.
#[must_use]
pub fn default_extensions() -> Vec<String> {
    ["meta", "prefab", "unity", "scene", "asset", "mat", "controller", "anim", "cs"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Normalizes a path to the project-relative, forward-slash form used as the
/// canonical key everywhere in uref.
///
/// Paths outside the workspace are returned whole (normalized), not
/// truncated.
#[must_use]
pub fn project_relative(workspace: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(workspace).unwrap_or(path);

    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_project_relative_strips_workspace_prefix() {
        let workspace = Path::new("/project");

        assert_eq!(project_relative(workspace, Path::new("/project/Assets/Player.prefab")), "Assets/Player.prefab");
    }

    #[test]
    fn test_project_relative_keeps_foreign_paths() {
        let workspace = Path::new("/project");

        assert_eq!(project_relative(workspace, Path::new("/elsewhere/a.mat")), "/elsewhere/a.mat");
    }
}
