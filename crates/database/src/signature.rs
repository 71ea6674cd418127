//! The persistent signature cache backing change detection.

use std::fs;
use std::io::Read;
use std::path::Path;

use foldhash::HashMap;
use serde::Deserialize;
use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use crate::DatabaseError;

/// Bumped whenever the persisted layout changes. A cache with a different
/// version is discarded; it only ever costs one full rescan.
const CACHE_SCHEMA_VERSION: u32 = 2;

/// Chunk size for streaming content hashing. Files are never read whole.
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// The change-detection signature of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub size: u64,
    pub mtime_ns: u128,
    /// xxh3 of the file contents; present when deep checking has seen the
    /// file at least once.
    pub content_hash: Option<u64>,
    /// The scan that last observed this path.
    pub last_seen_scan_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    scan_id: u64,
    entries: Vec<(String, FileSignature)>,
}

/// Mapping `path → signature`, owned exclusively by the change detector.
///
/// The cache is loaded once at scan start, mutated in memory, and flushed only
/// after a successful commit — a cancelled or failed scan leaves the on-disk
/// cache untouched.
#[derive(Debug, Default)]
pub struct SignatureCache {
    entries: HashMap<String, FileSignature>,
    scan_id: u64,
}

impl SignatureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache from disk. A missing file yields an empty cache; a
    /// version mismatch discards the stale cache with a warning.
    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(error) => return Err(DatabaseError::Io(path.to_path_buf(), error)),
        };

        let (persisted, _): (PersistedCache, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|error| DatabaseError::CacheDecode(path.to_path_buf(), error))?;

        if persisted.version != CACHE_SCHEMA_VERSION {
            tracing::warn!(
                "Signature cache at `{}` has schema version {} (expected {}); starting from an empty cache.",
                path.display(),
                persisted.version,
                CACHE_SCHEMA_VERSION,
            );

            return Ok(Self::new());
        }

        let mut entries = HashMap::default();
        entries.extend(persisted.entries);

        Ok(Self { entries, scan_id: persisted.scan_id })
    }

    /// Flushes the cache to disk, replacing whatever was there.
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let mut entries: Vec<(String, FileSignature)> =
            self.entries.iter().map(|(path, signature)| (path.clone(), *signature)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let persisted = PersistedCache { version: CACHE_SCHEMA_VERSION, scan_id: self.scan_id, entries };
        let bytes =
            bincode::serde::encode_to_vec(&persisted, bincode::config::standard()).map_err(DatabaseError::CacheEncode)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| DatabaseError::Io(parent.to_path_buf(), error))?;
        }

        fs::write(path, bytes).map_err(|error| DatabaseError::Io(path.to_path_buf(), error))
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileSignature> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, signature: FileSignature) {
        self.entries.insert(path, signature);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileSignature> {
        self.entries.remove(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn current_scan_id(&self) -> u64 {
        self.scan_id
    }

    /// Allocates the id for a new scan.
    pub fn begin_scan(&mut self) -> u64 {
        self.scan_id += 1;
        self.scan_id
    }
}

/// Streams a file through xxh3 in fixed-size chunks.
pub fn hash_file(path: &Path) -> std::io::Result<u64> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        hasher.update(&buffer[..read]);
    }

    Ok(hasher.digest())
}
