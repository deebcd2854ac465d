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

//! Cumulative per-instance counters.
//!
//! [`Statistics`] is the live, shared counter set owned by one backend instance. [`CacheStats`] is the plain snapshot
//! handed out to callers. Counters are only reset by [`Statistics::reset`], never by clearing the cache itself.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters of one backend instance.
#[derive(Debug, Default)]
pub struct Statistics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    clears: AtomicU64,
}

impl Statistics {
    /// Record a lookup that returned a value.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that found nothing or an expired entry.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a store.
    pub fn set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` removals.
    pub fn delete(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one capacity eviction.
    pub fn evict(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a full clear.
    pub fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.evictions,
            &self.clears,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Take a snapshot of the counters together with the current entry count.
    pub fn snapshot(&self, size: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = match hits + misses {
            0 => 0.0,
            total => hits as f64 / total as f64,
        };
        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            size,
            hit_rate,
        }
    }
}

/// Point-in-time statistics of a cache backend instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that returned nothing.
    pub misses: u64,
    /// Stores.
    pub sets: u64,
    /// Removals by delete, pattern invalidation or purge.
    pub deletes: u64,
    /// Entries dropped to make room for new keys.
    pub evictions: u64,
    /// Full clears.
    pub clears: u64,
    /// Entries currently held.
    pub size: usize,
    /// `hits / (hits + misses)`, `0` before the first lookup.
    pub hit_rate: f64,
}
