//! Synthesis cache
//!
//! Content-addressed store mapping a [`CacheKey`] (chunk text + voice + engine
//! configuration) to an audio file produced earlier. The cache is an explicit
//! dependency of the executor (`Arc<dyn SynthesisCache>`), never a global, so
//! runs can share a disk cache or use an in-memory one.
//!
//! Storage failures are never fatal: the executor logs them and treats the
//! lookup as a miss or keeps the staging file when a store fails.

mod error;
mod filesystem;
mod inflight;
mod key;
mod memory;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{CacheError, CacheResult};
pub use filesystem::{CacheStats, FilesystemCache};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use key::CacheKey;
pub use memory::MemoryCache;

/// One stored cache record; appended, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub audio_path: PathBuf,
    /// Unix epoch milliseconds
    pub created_at: u64,
}

/// Backend-agnostic cache interface
#[async_trait]
pub trait SynthesisCache: Send + Sync {
    /// Path of the stored audio for `key`, if present and non-empty
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<PathBuf>>;

    /// Store the audio at `source` under `key` and return the path callers
    /// should use from now on. If the key is already present the existing
    /// entry wins and its path is returned.
    async fn store(&self, key: &CacheKey, source: &Path) -> CacheResult<PathBuf>;
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
