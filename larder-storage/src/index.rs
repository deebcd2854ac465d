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

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use larder_common::{error::Result, hasher::hex_hash, time::is_expired};
use serde::{Deserialize, Serialize};

use crate::fs::write_atomic;

/// File name of the metadata index at the root of a disk cache directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Metadata of one on-disk entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The original cache key.
    pub key: String,
    /// Unix millis of the store.
    pub created_at: u64,
    /// Unix millis of the latest hit.
    pub last_accessed: u64,
    /// Unix millis after which the entry is logically absent.
    pub expires_at: Option<u64>,
    /// Value file path relative to the cache directory.
    pub path: String,
}

impl IndexEntry {
    /// Whether the entry is logically absent at `now` (unix millis).
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self.expires_at, now)
    }
}

/// The persisted metadata index, keyed by the hex hash of the original key.
///
/// The index is the source of truth for existence and expiration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Hash of `key` and the value file path (relative to the cache directory) derived from it.
    ///
    /// Files are sharded into sub-directories named by the first two hex digits of the hash.
    pub fn locate(key: &str) -> (String, String) {
        let hash = hex_hash(key.as_bytes());
        let path = format!("{}/{}.bin", &hash[..2], hash);
        (hash, path)
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE_NAME)
    }

    /// Load the index under `dir`.
    ///
    /// A missing index yields an empty one. A corrupted index is logged and replaced by an empty one. Entries whose
    /// value file is gone are dropped.
    pub fn load(dir: &Path) -> Self {
        let path = Self::path(dir);
        let mut index: Index = match std::fs::read(&path) {
            Ok(buf) => match serde_json::from_slice(&buf) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "[disk]: corrupted index, start with an empty one: {e}");
                    Index::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Index::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "[disk]: unreadable index, start with an empty one: {e}");
                Index::default()
            }
        };

        let before = index.entries.len();
        index.entries.retain(|_, entry| dir.join(&entry.path).is_file());
        let dropped = before - index.entries.len();
        if dropped > 0 {
            tracing::warn!(path = %path.display(), dropped, "[disk]: dropped index entries without value file");
        }

        index
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        let buf = serde_json::to_vec_pretty(self)?;
        write_atomic(&Self::path(dir), &buf)?;
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<&IndexEntry> {
        self.entries.get(hash)
    }

    pub fn get_mut(&mut self, hash: &str) -> Option<&mut IndexEntry> {
        self.entries.get_mut(hash)
    }

    pub fn insert(&mut self, hash: String, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(hash, entry)
    }

    pub fn remove(&mut self, hash: &str) -> Option<IndexEntry> {
        self.entries.remove(hash)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = IndexEntry> {
        std::mem::take(&mut self.entries).into_values()
    }

    /// Remove and return every entry matching `pred`.
    pub fn extract_if(&mut self, pred: impl Fn(&IndexEntry) -> bool) -> Vec<IndexEntry> {
        let hashes = self
            .entries
            .iter()
            .filter(|(_, entry)| pred(entry))
            .map(|(hash, _)| hash.clone())
            .collect::<Vec<_>>();
        hashes.iter().filter_map(|hash| self.entries.remove(hash)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
