//! Filesystem-backed synthesis cache
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<key[0..2]>/<key>.wav    audio
//! <root>/<key[0..2]>/<key>.json   CacheEntry metadata
//! ```
//!
//! Audio is copied into a temp file next to its final name and renamed into
//! place, so readers never observe a half-written entry. Entries are never
//! overwritten: the first writer for a key wins. An entry whose audio no
//! longer parses as WAV is evicted on lookup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheError, CacheKey, CacheResult, SynthesisCache, now_millis};
use crate::utils::check_wav;

/// Aggregate numbers for `narrator cache stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Content-addressed cache stored in a directory tree
#[derive(Debug, Clone)]
pub struct FilesystemCache {
    root: PathBuf,
}

impl FilesystemCache {
    /// Open (and create if needed) a cache rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;
        debug!(root = %root.display(), "Opened filesystem synthesis cache");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, key: &CacheKey) -> PathBuf {
        let shard = key.as_str().get(..2).unwrap_or("00");
        self.root.join(shard)
    }

    pub fn audio_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key).join(format!("{key}.wav"))
    }

    fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key).join(format!("{key}.json"))
    }

    /// Read the metadata record of an entry, if present
    pub async fn entry(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let path = self.metadata_path(key);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Metadata(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Count entries and bytes on disk
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = CacheStats::default();
        let mut shards = fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let shard_path = shard.path();
            let is_dir = shard.file_type().await.is_ok_and(|t| t.is_dir());
            if !is_dir {
                continue;
            }
            let mut files = fs::read_dir(&shard_path)
                .await
                .map_err(|e| CacheError::io(&shard_path, e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| CacheError::io(&shard_path, e))?
            {
                let path = file.path();
                if path.extension().is_some_and(|ext| ext == "wav") {
                    let meta = file.metadata().await.map_err(|e| CacheError::io(&path, e))?;
                    stats.entries += 1;
                    stats.total_bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }

    /// Drop one entry's audio and metadata
    async fn evict(&self, key: &CacheKey) {
        for path in [self.audio_path(key), self.metadata_path(key)] {
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to evict cache entry");
            }
        }
    }

    /// Remove every entry. Returns the number of audio files removed.
    pub async fn clear(&self) -> CacheResult<usize> {
        let removed = self.stats().await?.entries;
        fs::remove_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        info!(removed, root = %self.root.display(), "Cleared synthesis cache");
        Ok(removed)
    }
}

#[async_trait]
impl SynthesisCache for FilesystemCache {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<PathBuf>> {
        let path = self.audio_path(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        }
        if let Err(reason) = check_wav(path.clone()).await {
            warn!(key = %key, reason = %reason, "Evicting unreadable cache entry");
            self.evict(key).await;
            return Ok(None);
        }
        Ok(Some(path))
    }

    async fn store(&self, key: &CacheKey, source: &Path) -> CacheResult<PathBuf> {
        let dir = self.shard_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;

        let target = self.audio_path(key);
        if fs::try_exists(&target)
            .await
            .map_err(|e| CacheError::io(&target, e))?
        {
            debug!(key = %key, "Cache entry already present; keeping first writer");
            return Ok(target);
        }

        let tmp = dir.join(format!("{key}.wav.tmp-{}", uuid::Uuid::new_v4()));
        fs::copy(source, &tmp)
            .await
            .map_err(|e| CacheError::io(source, e))?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(&target, e));
        }

        let entry = CacheEntry {
            key: key.clone(),
            audio_path: target.clone(),
            created_at: now_millis(),
        };
        let metadata =
            serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Metadata(e.to_string()))?;
        let metadata_path = self.metadata_path(key);
        fs::write(&metadata_path, metadata)
            .await
            .map_err(|e| CacheError::io(&metadata_path, e))?;

        debug!(key = %key, path = %target.display(), "Stored synthesis cache entry");
        Ok(target)
    }
}
