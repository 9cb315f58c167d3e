//! TTL cache of discovered tool lists, keyed by server name

use crate::core::session::ToolDescriptor;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ToolCacheEntry {
    pub tools: Vec<ToolDescriptor>,
    pub cached_at: Instant,
}

impl ToolCacheEntry {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug)]
pub struct ToolCache {
    entries: DashMap<String, ToolCacheEntry>,
    ttl: Duration,
    enabled: bool,
    metrics: CacheMetrics,
}

impl ToolCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            enabled,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached tools for a server; an expired entry is evicted.
    pub fn get(&self, server: &str) -> Option<Vec<ToolDescriptor>> {
        if !self.enabled {
            return None;
        }

        let fresh = self
            .entries
            .get(server)
            .map(|entry| entry.is_fresh(self.ttl).then(|| entry.tools.clone()));

        match fresh {
            Some(Some(tools)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(tools)
            }
            Some(None) => {
                self.entries
                    .remove_if(server, |_, entry| !entry.is_fresh(self.ttl));
                self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, server: &str, tools: Vec<ToolDescriptor>) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            server.to_string(),
            ToolCacheEntry {
                tools,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, server: &str) -> bool {
        self.entries.remove(server).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
        }
    }
}
