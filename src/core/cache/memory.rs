//! In-memory synthesis cache backed by moka
//!
//! Maps keys to audio paths owned by someone else (usually the run's staging
//! directory). Useful for tests and for runs with the disk cache disabled.
//! Entries whose file vanished or no longer parses as WAV are forgotten on
//! lookup; the file itself is left alone.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::{CacheEntry, CacheKey, CacheResult, SynthesisCache, now_millis};
use crate::utils::check_wav;

const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<CacheKey, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::new(max_entries),
        }
    }

    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).await
    }

    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<PathBuf>> {
        let Some(entry) = self.entries.get(key).await else {
            return Ok(None);
        };
        // The file may have been cleaned up since it was recorded.
        match check_wav(entry.audio_path.clone()).await {
            Ok(_) => Ok(Some(entry.audio_path)),
            Err(reason) => {
                debug!(key = %key, reason = %reason, "Forgetting unusable in-memory cache entry");
                self.entries.invalidate(key).await;
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &CacheKey, source: &Path) -> CacheResult<PathBuf> {
        let candidate = CacheEntry {
            key: key.clone(),
            audio_path: source.to_path_buf(),
            created_at: now_millis(),
        };
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(async move { candidate })
            .await
            .into_value();
        Ok(entry.audio_path)
    }
}
