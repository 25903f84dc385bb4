//! Per-resource critical section map (spec §4.5 step 3, §9 "Per-resource
//! locks"). Keys are created lazily on first access and never removed for
//! the lifetime of the process — a small, bounded memory cost traded for
//! never having to reason about a lock's identity changing under a racing
//! lookup.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::record::ResourceKey;

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<ResourceKey, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &ResourceKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the critical section for `key`. At most one caller holds
    /// this guard for a given key at a time (spec §5 "at most one
    /// resource lock is held at a time; no nested locks" governs callers:
    /// this type itself only ever hands out one lock per call).
    pub async fn lock(&self, key: &ResourceKey) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
