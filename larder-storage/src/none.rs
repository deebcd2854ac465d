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

use std::time::Duration;

use bytes::Bytes;
use larder_common::{
    cache::{BackendKind, Cache},
    error::Result,
    statistics::{CacheStats, Statistics},
};

/// A cache that never holds anything.
///
/// Every lookup misses and every mutation is a no-op. Operations are still counted, so a disabled cache reports how
/// much traffic it absorbed.
#[derive(Debug)]
pub struct NoneCache {
    name: String,
    statistics: Statistics,
}

impl NoneCache {
    /// Create a none cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            statistics: Statistics::default(),
        }
    }
}

impl Default for NoneCache {
    fn default() -> Self {
        Self::new("larder")
    }
}

impl Cache for NoneCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn get(&self, _: &str) -> Result<Option<Bytes>> {
        self.statistics.miss();
        Ok(None)
    }

    fn set(&self, _: &str, _: Bytes, _: Option<Duration>) -> Result<()> {
        self.statistics.set();
        Ok(())
    }

    fn delete(&self, _: &str) -> Result<bool> {
        self.statistics.delete(1);
        Ok(false)
    }

    fn clear(&self) -> Result<()> {
        self.statistics.clear();
        Ok(())
    }

    fn invalidate_pattern(&self, _: &str) -> Result<usize> {
        Ok(0)
    }

    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn stats(&self) -> CacheStats {
        self.statistics.snapshot(0)
    }

    fn reset_stats(&self) {
        self.statistics.reset();
    }
}
