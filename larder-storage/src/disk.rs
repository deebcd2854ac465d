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
    fs::create_dir_all,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use larder_common::{
    cache::{BackendKind, Cache},
    error::{Error, Result},
    statistics::{CacheStats, Statistics},
    time::{expires_at, unix_millis},
};
use parking_lot::Mutex;

use crate::{
    fs::{remove_if_exists, write_atomic},
    index::{Index, IndexEntry},
    serde::{RecordDeserializer, RecordSerializer},
};

/// Disk cache builder.
#[derive(Debug, Clone)]
pub struct DiskCacheBuilder {
    name: String,
    dir: PathBuf,
    default_ttl: Option<Duration>,
}

impl DiskCacheBuilder {
    /// Create a disk cache builder rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            name: "larder".to_string(),
            dir: dir.as_ref().into(),
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

    /// Open the disk cache, creating its directory if absent.
    ///
    /// Opening a directory used before picks up its metadata index.
    pub fn build(self) -> Result<DiskCache> {
        create_dir_all(&self.dir).map_err(|e| {
            Error::io_error(e)
                .with_context("name", &self.name)
                .with_context("dir", self.dir.display())
        })?;

        let index = Index::load(&self.dir);
        tracing::debug!(
            name = %self.name,
            dir = %self.dir.display(),
            entries = index.len(),
            "[disk]: cache opened"
        );

        Ok(DiskCache {
            name: self.name,
            dir: self.dir,
            default_ttl: self.default_ttl,
            index: Mutex::new(index),
            statistics: Statistics::default(),
        })
    }
}

/// Persistent cache on the local filesystem.
///
/// ```text
/// <dir>/
/// ├── index.json        metadata index, source of truth
/// ├── 3f/
/// │   └── 3fa1....bin   value file, named by the key hash
/// └── ...
/// ```
///
/// The instance lock is held across disk I/O. Read and decode failures degrade to misses, the broken entry is dropped.
#[derive(Debug)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
    default_ttl: Option<Duration>,
    index: Mutex<Index>,
    statistics: Statistics,
}

impl DiskCache {
    /// Root directory of the instance.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Time-to-live applied when none is given.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn persist(&self, index: &Index) -> Result<()> {
        index
            .persist(&self.dir)
            .map_err(|e| e.with_context("name", &self.name))
    }

    /// Persist without failing the caller, used where the operation itself already succeeded.
    fn persist_or_warn(&self, index: &Index) {
        if let Err(e) = self.persist(index) {
            tracing::warn!(name = %self.name, "[disk]: persist index failed: {e}");
        }
    }

    fn remove_files(&self, entries: &[IndexEntry]) {
        for entry in entries {
            if let Err(e) = remove_if_exists(&self.dir.join(&entry.path)) {
                tracing::warn!(name = %self.name, path = %entry.path, "[disk]: remove value file failed: {e}");
            }
        }
    }

    fn read(&self, entry: &IndexEntry) -> Result<Bytes> {
        let buf = std::fs::read(self.dir.join(&entry.path))?;
        RecordDeserializer::deserialize(&buf, &entry.key)
    }
}

impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut index = self.index.lock();
        let now = unix_millis();
        let (hash, _) = Index::locate(key);

        let Some(entry) = index.get(&hash).filter(|entry| entry.key == key) else {
            self.statistics.miss();
            return Ok(None);
        };

        if entry.is_expired(now) {
            if let Some(entry) = index.remove(&hash) {
                self.remove_files(&[entry]);
            }
            self.persist_or_warn(&index);
            self.statistics.miss();
            return Ok(None);
        }

        let value = match self.read(entry) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(name = %self.name, key, "[disk]: read entry failed, treated as miss: {e}");
                if let Some(entry) = index.remove(&hash) {
                    self.remove_files(&[entry]);
                }
                self.persist_or_warn(&index);
                self.statistics.miss();
                return Ok(None);
            }
        };

        if let Some(entry) = index.get_mut(&hash) {
            entry.last_accessed = now;
        }
        self.persist_or_warn(&index);
        self.statistics.hit();
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut index = self.index.lock();
        let now = unix_millis();
        let (hash, path) = Index::locate(key);

        let buf = RecordSerializer::serialize(key, &value)?;
        write_atomic(&self.dir.join(&path), &buf).map_err(|e| {
            Error::io_error(e)
                .with_context("name", &self.name)
                .with_context("path", &path)
        })?;

        index.insert(
            hash,
            IndexEntry {
                key: key.to_string(),
                created_at: now,
                last_accessed: now,
                expires_at: expires_at(ttl.or(self.default_ttl)),
                path,
            },
        );
        self.persist(&index)?;
        self.statistics.set();
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut index = self.index.lock();
        let (hash, _) = Index::locate(key);

        if index.get(&hash).is_none_or(|entry| entry.key != key) {
            return Ok(false);
        }
        if let Some(entry) = index.remove(&hash) {
            self.remove_files(&[entry]);
        }
        self.persist(&index)?;
        self.statistics.delete(1);
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        let mut index = self.index.lock();
        let entries = index.drain().collect::<Vec<_>>();
        self.remove_files(&entries);
        self.persist(&index)?;
        self.statistics.clear();
        tracing::debug!(name = %self.name, removed = entries.len(), "[disk]: cache cleared");
        Ok(())
    }

    fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let mut index = self.index.lock();
        let entries = index.extract_if(|entry| entry.key.contains(pattern));
        if entries.is_empty() {
            return Ok(0);
        }
        self.remove_files(&entries);
        self.persist(&index)?;
        self.statistics.delete(entries.len() as u64);
        tracing::debug!(name = %self.name, pattern, removed = entries.len(), "[disk]: pattern invalidated");
        Ok(entries.len())
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut index = self.index.lock();
        let now = unix_millis();
        let entries = index.extract_if(|entry| entry.is_expired(now));
        if entries.is_empty() {
            return Ok(0);
        }
        self.remove_files(&entries);
        self.persist(&index)?;
        self.statistics.delete(entries.len() as u64);
        Ok(entries.len())
    }

    fn stats(&self) -> CacheStats {
        let size = self.index.lock().len();
        self.statistics.snapshot(size)
    }

    fn reset_stats(&self) {
        self.statistics.reset();
    }
}
