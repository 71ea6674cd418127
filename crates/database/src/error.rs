use std::path::PathBuf;

/// Errors produced by the filesystem layer.
///
/// Per-entry walk failures are *not* represented here; they travel as
/// [`crate::walker::WalkItem::Error`] records so a single unreadable entry
/// never aborts a scan. This type covers failures that make the layer itself
/// unusable: bad exclude patterns and signature-cache persistence problems.
#[derive(Debug)]
pub enum DatabaseError {
    /// An exclude pattern did not compile into a glob.
    Pattern(globset::Error),
    /// Reading or writing a persistent store failed.
    Io(PathBuf, std::io::Error),
    /// The signature cache on disk could not be decoded.
    CacheDecode(PathBuf, bincode::error::DecodeError),
    /// The signature cache could not be encoded for persistence.
    CacheEncode(bincode::error::EncodeError),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(error) => write!(f, "invalid exclude pattern: {}", error),
            Self::Io(path, error) => write!(f, "i/o failure on `{}`: {}", path.display(), error),
            Self::CacheDecode(path, error) => {
                write!(f, "signature cache `{}` is unreadable: {}", path.display(), error)
            }
            Self::CacheEncode(error) => write!(f, "signature cache could not be encoded: {}", error),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pattern(error) => Some(error),
            Self::Io(_, error) => Some(error),
            Self::CacheDecode(_, error) => Some(error),
            Self::CacheEncode(error) => Some(error),
        }
    }
}

impl From<globset::Error> for DatabaseError {
    fn from(error: globset::Error) -> Self {
        Self::Pattern(error)
    }
}
