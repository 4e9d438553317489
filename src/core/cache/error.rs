use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache storage failures.
///
/// Never fatal to a run: callers log the error and fall back to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry metadata could not be encoded or decoded
    #[error("Cache metadata error: {0}")]
    Metadata(String),

    /// Backend refused the operation
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
