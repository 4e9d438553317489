//! Run-scoped single-flight registry.
//!
//! Guarantees at most one engine call per cache key at a time within a run.
//! The first job to acquire a key's slot becomes the leader and synthesizes;
//! jobs acquiring the same key meanwhile wait on the slot and, once it is
//! released, find the leader's result recorded in it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::CacheKey;

#[derive(Default)]
pub struct InFlightRegistry {
    slots: DashMap<CacheKey, Arc<Mutex<Option<PathBuf>>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`.
    ///
    /// The map shard lock is released before awaiting the slot, so waiting on
    /// one key never blocks lookups of another.
    pub async fn acquire(&self, key: &CacheKey) -> InFlightGuard {
        let slot = self.slots.entry(key.clone()).or_default().value().clone();
        InFlightGuard {
            guard: slot.lock_owned().await,
        }
    }

    /// Number of distinct keys seen during the run
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive hold on one key's slot; released on drop
#[derive(Debug)]
pub struct InFlightGuard {
    guard: OwnedMutexGuard<Option<PathBuf>>,
}

impl InFlightGuard {
    /// Audio produced for this key earlier in the run, if any
    pub fn completed(&self) -> Option<&Path> {
        self.guard.as_deref()
    }

    /// Record the audio produced for this key
    pub fn complete(&mut self, path: PathBuf) {
        *self.guard = Some(path);
    }
}
