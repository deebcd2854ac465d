// Copyright 2025 larder Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::{Duration, Instant};

use bytes::Bytes;
use hashbrown::HashMap;
use larder_common::{
    cache::{BackendKind, Cache},
    error::{Error, Result},
    statistics::{CacheStats, Statistics},
};
use parking_lot::Mutex;

use crate::lru::Lru;

/// Default entry bound of a memory cache.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Memory cache builder.
#[derive(Debug, Clone)]
pub struct MemoryCacheBuilder {
    name: String,
    max_size: usize,
    default_ttl: Option<Duration>,
}

impl Default for MemoryCacheBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl MemoryCacheBuilder {
    /// Create a memory cache builder holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            name: "larder".to_string(),
            max_size,
            default_ttl: None,
        }
    }

    /// Set the name of the instance.
    ///
    /// Default: `larder`.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the time-to-live applied when `set` is called without one.
    ///
    /// Default: entries never expire.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Build the memory cache.
    pub fn build(self) -> Result<MemoryCache> {
        if self.max_size == 0 {
            return Err(Error::config("memory cache max size must be positive").with_context("name", &self.name));
        }
        tracing::debug!(
            name = %self.name,
            max_size = self.max_size,
            "[memory]: cache created with default ttl {:?}",
            self.default_ttl
        );
        Ok(MemoryCache {
            name: self.name,
            max_size: self.max_size,
            default_ttl: self.default_ttl,
            inner: Mutex::new(MemoryCacheInner::default()),
            statistics: Statistics::default(),
        })
    }
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
    stamp: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Entry>,
    lru: Lru,
}

impl MemoryCacheInner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(entry.stamp);
        Some(entry)
    }

    fn remove_where(&mut self, pred: impl Fn(&str, &Entry) -> bool) -> usize {
        let keys = self
            .entries
            .iter()
            .filter(|(key, entry)| pred(key, entry))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in keys.iter() {
            self.remove(key);
        }
        keys.len()
    }
}

/// Bounded in-memory cache with strict least-recently-used eviction and lazy expiration.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    max_size: usize,
    default_ttl: Option<Duration>,
    inner: Mutex<MemoryCacheInner>,
    statistics: Statistics,
}

impl MemoryCache {
    /// Maximum number of entries.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Time-to-live applied when none is given.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }
}

impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let Some(entry) = inner.entries.get(key) else {
            self.statistics.miss();
            return Ok(None);
        };

        if entry.is_expired(now) {
            inner.remove(key);
            self.statistics.miss();
            tracing::trace!(name = %self.name, key, "[memory]: entry expired");
            return Ok(None);
        }

        let stamp = entry.stamp;
        let stamp = inner.lru.access(key, Some(stamp));
        // The entry is known to exist, re-borrow it mutably to refresh its stamp.
        let entry = inner.entries.get_mut(key).map(|entry| {
            entry.stamp = stamp;
            entry.value.clone()
        });
        self.statistics.hit();
        Ok(entry)
    }

    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock();
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);

        let previous = inner.entries.get(key).map(|entry| entry.stamp);
        if previous.is_none() {
            while inner.entries.len() >= self.max_size {
                let Some(victim) = inner.lru.pop() else {
                    break;
                };
                inner.entries.remove(&victim);
                self.statistics.evict();
                tracing::trace!(name = %self.name, key = %victim, "[memory]: entry evicted");
            }
        }

        let stamp = inner.lru.access(key, previous);
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                stamp,
            },
        );
        self.statistics.set();
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.inner.lock().remove(key).is_some();
        if existed {
            self.statistics.delete(1);
        }
        Ok(existed)
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru.clear();
        self.statistics.clear();
        Ok(())
    }

    fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let removed = self.inner.lock().remove_where(|key, _| key.contains(pattern));
        self.statistics.delete(removed as u64);
        tracing::debug!(name = %self.name, pattern, removed, "[memory]: pattern invalidated");
        Ok(removed)
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let removed = self.inner.lock().remove_where(|_, entry| entry.is_expired(now));
        self.statistics.delete(removed as u64);
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        let size = self.inner.lock().entries.len();
        self.statistics.snapshot(size)
    }

    fn reset_stats(&self) {
        self.statistics.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use itertools::Itertools;

    use super::*;

    fn memory(max_size: usize) -> MemoryCache {
        MemoryCacheBuilder::new(max_size).with_name("test").build().unwrap()
    }

    fn v(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(MemoryCacheBuilder::new(0).build().is_err());
    }

    #[test]
    fn test_set_get() {
        let cache = memory(4);
        cache.set("k", v("v"), None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(v("v")));
        assert_eq!(cache.get("missing").unwrap(), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets, stats.size), (1, 1, 1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test_log::test]
    fn test_lru_eviction() {
        let cache = memory(3);
        cache.set("a", v("1"), None).unwrap();
        cache.set("b", v("2"), None).unwrap();
        cache.set("c", v("3"), None).unwrap();

        // refresh `a`, `b` becomes the least recently used
        assert!(cache.get("a").unwrap().is_some());
        cache.set("d", v("4"), None).unwrap();

        assert_eq!(cache.get("b").unwrap(), None);
        for key in ["a", "c", "d"] {
            assert!(cache.get(key).unwrap().is_some(), "{key} should survive");
        }
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 3);
    }

    #[test]
    fn test_evicts_exactly_least_recent() {
        const MAX: usize = 16;
        let cache = memory(MAX);
        for i in 0..=MAX {
            cache.set(&format!("k{i}"), v("x"), None).unwrap();
        }

        assert_eq!(cache.stats().size, MAX);
        assert_eq!(cache.get("k0").unwrap(), None);
        for i in 1..=MAX {
            assert!(cache.get(&format!("k{i}")).unwrap().is_some());
        }
    }

    #[test]
    fn test_overwrite_never_evicts() {
        let cache = memory(2);
        cache.set("a", v("1"), None).unwrap();
        cache.set("b", v("2"), None).unwrap();
        cache.set("a", v("3"), None).unwrap();

        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a").unwrap(), Some(v("3")));
        assert_eq!(cache.get("b").unwrap(), Some(v("2")));
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = memory(4);
        cache.set("k", v("v"), Some(Duration::from_millis(100))).unwrap();
        assert!(cache.get("k").unwrap().is_some());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k").unwrap(), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 0));
    }

    #[test]
    fn test_default_ttl() {
        let cache = MemoryCacheBuilder::new(4)
            .with_default_ttl(Some(Duration::from_millis(50)))
            .build()
            .unwrap();
        cache.set("short", v("v"), None).unwrap();
        cache.set("long", v("v"), Some(Duration::from_secs(60))).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.get("long").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_pattern() {
        let cache = memory(16);
        for key in ["users.find_all", "users.count", "orders.find_all", "users.find_by_id:1"] {
            cache.set(key, v("x"), None).unwrap();
        }

        assert_eq!(cache.invalidate_pattern("find_all").unwrap(), 2);
        assert_eq!(cache.get("users.find_all").unwrap(), None);
        assert_eq!(cache.get("orders.find_all").unwrap(), None);
        assert!(cache.get("users.count").unwrap().is_some());
        assert!(cache.get("users.find_by_id:1").unwrap().is_some());

        // not a regex
        assert_eq!(cache.invalidate_pattern("users.*").unwrap(), 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let cache = memory(8);
        cache.set("a", v("1"), None).unwrap();
        cache.set("b", v("2"), None).unwrap();
        cache.get("a").unwrap();
        assert!(cache.delete("b").unwrap());
        assert!(!cache.delete("b").unwrap());

        cache.clear().unwrap();
        assert_eq!(cache.get("a").unwrap(), None);

        let stats = cache.stats();
        assert_eq!(
            (stats.hits, stats.misses, stats.sets, stats.deletes, stats.clears, stats.size),
            (1, 1, 2, 1, 1, 0)
        );

        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(memory(64));
        let handles = (0..4)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        cache.set(&key, v("x"), None).unwrap();
                        cache.get(&key).unwrap();
                    }
                })
            })
            .collect_vec();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.size, 64);
        assert_eq!(stats.sets, 400);
        assert_eq!(stats.evictions, 400 - 64);
    }
}
