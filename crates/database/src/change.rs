//! Classification of walker output against the signature cache.

use std::path::PathBuf;

use foldhash::HashSet;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;

use crate::signature::FileSignature;
use crate::signature::SignatureCache;
use crate::signature::hash_file;
use crate::walker::WalkedFile;

/// How a path changed since the previous committed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    New,
    Modified,
    Unchanged,
    Deleted,
}

/// One classified path.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    pub old_signature: Option<FileSignature>,
    /// The signature to commit for this path; absent for deletions.
    pub new_signature: Option<FileSignature>,
    /// On-disk location; absent for deletions.
    pub absolute: Option<PathBuf>,
}

/// Classifies walked files against the persistent [`SignatureCache`], which it
/// exclusively owns for the duration of a scan.
///
/// With `deep_check` enabled, a size/mtime mismatch is confirmed by streaming
/// the file through xxh3 before the path is declared modified — an mtime bump
/// with identical bytes classifies as unchanged. Classification never mutates
/// the cache; [`ChangeDetector::commit`] applies a record set after the scan
/// has succeeded, so a cancelled scan leaves the cache as it was.
#[derive(Debug)]
pub struct ChangeDetector {
    cache: SignatureCache,
    deep_check: bool,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(cache: SignatureCache, deep_check: bool) -> Self {
        Self { cache, deep_check }
    }

    /// Allocates the id the produced signatures will carry.
    pub fn begin_scan(&mut self) -> u64 {
        self.cache.begin_scan()
    }

    /// Classifies every walked file, then appends a `Deleted` record for each
    /// cache entry the walk did not visit.
    pub fn classify(&self, files: &[WalkedFile]) -> Vec<ChangeRecord> {
        let mut records: Vec<ChangeRecord> =
            files.par_iter().map(|file| self.classify_file(file)).collect();

        let visited: HashSet<String> = files.iter().map(|file| file.path.clone()).collect();
        records.extend(self.detect_deleted(&visited));

        records
    }

    /// Classifies a single walked file. Safe to call from many threads at
    /// once; the cache is only read.
    #[must_use]
    pub fn classify_file(&self, file: &WalkedFile) -> ChangeRecord {
        self.classify_one(file, self.cache.current_scan_id())
    }

    /// A `Deleted` record for every cache entry outside the visited set.
    /// Only meaningful once a walk has run to completion.
    #[must_use]
    pub fn detect_deleted(&self, visited: &HashSet<String>) -> Vec<ChangeRecord> {
        self.cache
            .paths()
            .filter(|path| !visited.contains(*path))
            .map(|path| ChangeRecord {
                path: path.to_string(),
                kind: ChangeKind::Deleted,
                old_signature: self.cache.get(path).copied(),
                new_signature: None,
                absolute: None,
            })
            .collect()
    }

    fn classify_one(&self, file: &WalkedFile, scan_id: u64) -> ChangeRecord {
        let old = self.cache.get(&file.path).copied();

        let (kind, content_hash) = match old {
            None => (ChangeKind::New, self.hash_if_deep(file)),
            Some(previous) if previous.size == file.size && previous.mtime_ns == file.mtime_ns => {
                (ChangeKind::Unchanged, previous.content_hash)
            }
            Some(previous) => {
                if self.deep_check {
                    let hash = self.hash_if_deep(file);
                    match (hash, previous.content_hash) {
                        (Some(current), Some(cached)) if current == cached => (ChangeKind::Unchanged, hash),
                        _ => (ChangeKind::Modified, hash),
                    }
                } else {
                    (ChangeKind::Modified, None)
                }
            }
        };

        ChangeRecord {
            path: file.path.clone(),
            kind,
            old_signature: old,
            new_signature: Some(FileSignature {
                size: file.size,
                mtime_ns: file.mtime_ns,
                content_hash,
                last_seen_scan_id: scan_id,
            }),
            absolute: Some(file.absolute.clone()),
        }
    }

    fn hash_if_deep(&self, file: &WalkedFile) -> Option<u64> {
        if !self.deep_check {
            return None;
        }

        match hash_file(&file.absolute) {
            Ok(hash) => Some(hash),
            Err(error) => {
                tracing::warn!("Could not hash `{}`: {}.", file.path, error);

                None
            }
        }
    }

    /// Applies a classified record set to the in-memory cache. Call only once
    /// the scan these records belong to has committed.
    pub fn commit(&mut self, records: &[ChangeRecord]) {
        for record in records {
            match record.kind {
                ChangeKind::Deleted => {
                    self.cache.remove(&record.path);
                }
                _ => {
                    if let Some(signature) = record.new_signature {
                        self.cache.insert(record.path.clone(), signature);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    #[must_use]
    pub fn into_cache(self) -> SignatureCache {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn walked(dir: &std::path::Path, name: &str, contents: &str, mtime_ns: u128) -> WalkedFile {
        let absolute = dir.join(name);
        fs::write(&absolute, contents).unwrap();

        WalkedFile { path: name.to_string(), absolute, size: contents.len() as u64, mtime_ns }
    }

    fn kinds(records: &[ChangeRecord]) -> Vec<(String, ChangeKind)> {
        let mut pairs: Vec<_> = records.iter().map(|r| (r.path.clone(), r.kind)).collect();
        pairs.sort();

        pairs
    }

    #[test]
    fn test_first_scan_is_all_new() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![walked(dir.path(), "a.mat", "alpha", 1), walked(dir.path(), "b.mat", "beta", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();

        let records = detector.classify(&files);

        assert_eq!(
            kinds(&records),
            vec![("a.mat".to_string(), ChangeKind::New), ("b.mat".to_string(), ChangeKind::New)]
        );
    }

    #[test]
    fn test_second_scan_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![walked(dir.path(), "a.mat", "alpha", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let first = detector.classify(&files);
        detector.commit(&first);

        detector.begin_scan();
        let second = detector.classify(&files);

        assert_eq!(kinds(&second), vec![("a.mat".to_string(), ChangeKind::Unchanged)]);
    }

    #[test]
    fn test_mtime_bump_with_identical_bytes_is_unchanged_under_deep_check() {
        let dir = tempfile::tempdir().unwrap();
        let original = vec![walked(dir.path(), "a.mat", "alpha", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let first = detector.classify(&original);
        detector.commit(&first);

        let touched = vec![WalkedFile { mtime_ns: 2, ..original[0].clone() }];
        detector.begin_scan();
        let second = detector.classify(&touched);

        assert_eq!(kinds(&second), vec![("a.mat".to_string(), ChangeKind::Unchanged)]);
    }

    #[test]
    fn test_mtime_bump_is_modified_without_deep_check() {
        let dir = tempfile::tempdir().unwrap();
        let original = vec![walked(dir.path(), "a.mat", "alpha", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), false);
        detector.begin_scan();
        let first = detector.classify(&original);
        detector.commit(&first);

        let touched = vec![WalkedFile { mtime_ns: 2, ..original[0].clone() }];
        detector.begin_scan();
        let second = detector.classify(&touched);

        assert_eq!(kinds(&second), vec![("a.mat".to_string(), ChangeKind::Modified)]);
    }

    #[test]
    fn test_content_change_is_modified() {
        let dir = tempfile::tempdir().unwrap();
        let original = vec![walked(dir.path(), "a.mat", "alpha", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let first = detector.classify(&original);
        detector.commit(&first);

        let rewritten = vec![walked(dir.path(), "a.mat", "ALPHA!", 2)];
        detector.begin_scan();
        let second = detector.classify(&rewritten);

        assert_eq!(kinds(&second), vec![("a.mat".to_string(), ChangeKind::Modified)]);
    }

    #[test]
    fn test_vanished_path_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![walked(dir.path(), "a.mat", "alpha", 1), walked(dir.path(), "b.mat", "beta", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let first = detector.classify(&files);
        detector.commit(&first);

        detector.begin_scan();
        let second = detector.classify(&files[..1]);

        assert_eq!(
            kinds(&second),
            vec![("a.mat".to_string(), ChangeKind::Unchanged), ("b.mat".to_string(), ChangeKind::Deleted)]
        );
    }

    #[test]
    fn test_per_file_classification_matches_batch() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![walked(dir.path(), "a.mat", "alpha", 1), walked(dir.path(), "b.mat", "beta", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let batch = detector.classify(&files);
        detector.commit(&batch);

        detector.begin_scan();
        let single = detector.classify_file(&files[0]);
        assert_eq!(single.kind, ChangeKind::Unchanged);

        let visited: foldhash::HashSet<String> = std::iter::once(files[0].path.clone()).collect();
        let deleted = detector.detect_deleted(&visited);
        assert_eq!(kinds(&deleted), vec![("b.mat".to_string(), ChangeKind::Deleted)]);
    }

    #[test]
    fn test_classification_does_not_mutate_cache() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![walked(dir.path(), "a.mat", "alpha", 1)];

        let mut detector = ChangeDetector::new(SignatureCache::new(), true);
        detector.begin_scan();
        let _ = detector.classify(&files);

        assert!(detector.cache().is_empty());
    }
}
