use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias for local cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Error raised by local cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing file could not be read, written or removed.
    #[error("failed to access cache file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The game state could not be serialized for storage.
    #[error("failed to encode game state for the cache")]
    Encode(#[source] serde_json::Error),
}

impl CacheError {
    /// Wrap an I/O failure on `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
