//! Lazy project tree discovery.

use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use foldhash::HashSet;
use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use walkdir::DirEntry;
use walkdir::WalkDir;

use crate::DatabaseError;
use crate::WalkerConfiguration;
use crate::project_relative;

/// A candidate file discovered by the walker, with the stat fields change
/// detection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Project-relative, `/`-normalized path.
    pub path: String,
    /// Absolute on-disk path for later opening.
    pub absolute: PathBuf,
    pub size: u64,
    pub mtime_ns: u128,
}

/// A per-entry walk failure. The walk continues past it.
#[derive(Debug)]
pub struct WalkError {
    pub path: PathBuf,
    pub cause: std::io::Error,
}

/// One item of the lazy walk sequence.
#[derive(Debug)]
pub enum WalkItem {
    /// A parse candidate.
    File(WalkedFile),
    /// A file over the configured size limit; reported, never parsed.
    SkippedLarge { path: String, size: u64 },
    /// An entry that could not be read.
    Error(WalkError),
}

/// Walks configured roots, yielding candidate files lazily.
///
/// The sequence is finite and non-restartable; calling [`Walker::walk`] again
/// starts a fresh traversal. Exclusions apply at two levels: directories whose
/// project-relative path matches an exclude glob are pruned without
/// descending, and surviving files are filtered individually.
#[derive(Debug)]
pub struct Walker {
    configuration: WalkerConfiguration,
    file_excludes: GlobSet,
    directory_excludes: GlobSet,
    extensions: HashSet<String>,
}

impl Walker {
    pub fn new(configuration: WalkerConfiguration) -> Result<Self, DatabaseError> {
        let mut file_excludes = GlobSetBuilder::new();
        let mut directory_excludes = GlobSetBuilder::new();

        for pattern in &configuration.excludes {
            file_excludes.add(Glob::new(pattern)?);
            directory_excludes.add(Glob::new(pattern)?);

            // `Library/**` excludes the directory's contents but never matches
            // `Library` itself, so the stripped prefix is added for pruning.
            if let Some(prefix) = pattern.strip_suffix("/**") {
                directory_excludes.add(Glob::new(prefix)?);
            }
        }

        let extensions = configuration.extensions.iter().map(|e| e.to_ascii_lowercase()).collect();

        Ok(Self {
            file_excludes: file_excludes.build()?,
            directory_excludes: directory_excludes.build()?,
            extensions,
            configuration,
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &WalkerConfiguration {
        &self.configuration
    }

    /// Lazily yields every candidate under the configured roots.
    pub fn walk(&self) -> impl Iterator<Item = WalkItem> + '_ {
        self.resolved_roots().into_iter().flat_map(move |root| {
            WalkDir::new(root)
                .follow_links(self.configuration.follow_symlinks)
                .into_iter()
                .filter_entry(move |entry| self.keep_entry(entry))
                .filter_map(move |result| self.emit(result))
        })
    }

    fn resolved_roots(&self) -> Vec<PathBuf> {
        if self.configuration.roots.is_empty() {
            return vec![self.configuration.workspace.clone()];
        }

        self.configuration
            .roots
            .iter()
            .map(|root| {
                if root.is_absolute() { root.clone() } else { self.configuration.workspace.join(root) }
            })
            .collect()
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }

        if self.configuration.ignore_hidden && is_hidden(entry.path()) {
            return false;
        }

        if entry.file_type().is_dir() {
            let relative = project_relative(&self.configuration.workspace, entry.path());

            return !self.directory_excludes.is_match(&relative);
        }

        true
    }

    fn emit(&self, result: Result<DirEntry, walkdir::Error>) -> Option<WalkItem> {
        let entry = match result {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().map(Path::to_path_buf).unwrap_or_default();
                let cause = error.into_io_error().unwrap_or_else(|| std::io::Error::other("filesystem loop"));

                return Some(WalkItem::Error(WalkError { path, cause }));
            }
        };

        if !entry.file_type().is_file() {
            return None;
        }

        let extension = entry.path().extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.contains(&extension) {
            return None;
        }

        let relative = project_relative(&self.configuration.workspace, entry.path());
        if self.file_excludes.is_match(&relative) {
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(error) => {
                let cause = error.into_io_error().unwrap_or_else(|| std::io::Error::other("metadata unavailable"));

                return Some(WalkItem::Error(WalkError { path: entry.path().to_path_buf(), cause }));
            }
        };

        let size = metadata.len();
        if size > self.configuration.max_file_size {
            tracing::debug!("Skipping `{}`: {} bytes exceeds the configured limit.", relative, size);

            return Some(WalkItem::SkippedLarge { path: relative, size });
        }

        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |duration| duration.as_nanos());

        Some(WalkItem::File(WalkedFile { path: relative, absolute: entry.path().to_path_buf(), size, mtime_ns }))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name.to_string_lossy().starts_with('.'))
}
