//! Configuration surface (spec §6).
//!
//! A single [`Config`] struct threaded into the cache, version store and
//! streamer at construction time. Defaults match the recommended values;
//! per-namespace overrides let a caller e.g. give the `semantic` namespace
//! a larger L1 than `dictionary`.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CacheNamespace;

/// Per-namespace overrides for the two-tier cache.
#[derive(Debug, Clone, Default)]
pub struct NamespaceOverride {
    pub l1_max_size: Option<usize>,
    pub l1_ttl_seconds: Option<u64>,
    pub l2_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub l1_max_size_per_namespace: usize,
    pub l1_ttl_seconds: u64,
    pub l2_ttl_seconds: u64,
    pub inline_threshold_bytes: usize,
    pub compression_threshold_bytes: usize,
    pub compression_level: i32,
    pub blob_root_dir: std::path::PathBuf,
    pub heartbeat_interval_seconds: f64,
    pub stream_timeout_seconds: f64,
    pub strong_score_threshold: f32,
    pub namespace_overrides: HashMap<CacheNamespace, NamespaceOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            l1_max_size_per_namespace: 1024,
            l1_ttl_seconds: 300,
            l2_ttl_seconds: 86_400,
            inline_threshold_bytes: 64 * 1024,
            compression_threshold_bytes: 4 * 1024,
            compression_level: 3,
            blob_root_dir: std::path::PathBuf::from("./data/blobs"),
            heartbeat_interval_seconds: 15.0,
            stream_timeout_seconds: 120.0,
            strong_score_threshold: 0.85,
            namespace_overrides: HashMap::new(),
        }
    }
}

impl Config {
    pub fn l1_max_size(&self, ns: CacheNamespace) -> usize {
        self.namespace_overrides
            .get(&ns)
            .and_then(|o| o.l1_max_size)
            .unwrap_or(self.l1_max_size_per_namespace)
    }

    pub fn l1_ttl(&self, ns: CacheNamespace) -> Duration {
        let secs = self
            .namespace_overrides
            .get(&ns)
            .and_then(|o| o.l1_ttl_seconds)
            .unwrap_or(self.l1_ttl_seconds);
        Duration::from_secs(secs)
    }

    pub fn l2_ttl(&self, ns: CacheNamespace) -> Duration {
        let secs = self
            .namespace_overrides
            .get(&ns)
            .and_then(|o| o.l2_ttl_seconds)
            .unwrap_or(self.l2_ttl_seconds);
        Duration::from_secs(secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_seconds)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stream_timeout_seconds)
    }
}
