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

use std::collections::BTreeMap;

/// Access order bookkeeping for strict least-recently-used eviction.
///
/// Every access stamps the key with a fresh, strictly increasing tick. The key with the smallest tick is the least
/// recently used one.
#[derive(Debug, Default)]
pub struct Lru {
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl Lru {
    /// Record an access to `key`, previously stamped with `stamp` (if tracked). Returns the new stamp.
    pub fn access(&mut self, key: &str, stamp: Option<u64>) -> u64 {
        if let Some(stamp) = stamp {
            self.order.remove(&stamp);
        }
        self.tick += 1;
        self.order.insert(self.tick, key.to_string());
        self.tick
    }

    /// Stop tracking the key stamped with `stamp`.
    pub fn remove(&mut self, stamp: u64) {
        self.order.remove(&stamp);
    }

    /// Pop the least recently used key.
    pub fn pop(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.order.len()
    }
}
