//! Time-bounded, size-bounded response cache.
//!
//! Eviction is strictly by insertion order (oldest-inserted first), not by
//! last access. Overwriting an existing key refreshes its timestamp but keeps
//! its original position in the eviction queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use libre_core::{CacheKey, Clock};
use serde_json::Value;

/// A cached response and the instant it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of fresh lookups.
    pub hits: u64,
    /// Number of lookups that found nothing fresh.
    pub misses: u64,
    /// Number of entries currently stored, fresh or not.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries removed by the expiry sweep.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL cache with insertion-order eviction.
#[derive(Debug)]
pub struct TtlCache {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Keys in insertion order; front is evicted first.
    order: VecDeque<CacheKey>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            max_entries,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Fresh value for `key`.
    ///
    /// Expired entries behave as absent but are left for the sweep.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.stored_at) < self.ttl => {
                self.stats.hits += 1;
                Some(entry.value.clone())
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store `value` under `key`, then evict down to capacity.
    pub fn put(&mut self, key: CacheKey, value: Value) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
        };
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.max_entries {
            if self.evict_one().is_none() {
                break;
            }
        }
    }

    /// Evict the oldest-inserted entry.
    pub fn evict_one(&mut self) -> Option<CacheKey> {
        while let Some(key) = self.order.pop_front() {
            if self.entries.remove(&key).is_some() {
                self.stats.evictions += 1;
                return Some(key);
            }
        }
        None
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) <= ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|key| entries.contains_key(key));
            self.stats.expirations += removed as u64;
        }
        removed
    }

    /// Raw entry, fresh or not.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Keys in eviction order (oldest-inserted first).
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len() as u64,
            ..self.stats
        }
    }
}
