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

use std::{fmt::Debug, str::FromStr, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    statistics::CacheStats,
};

/// The kind of a cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bounded in-memory LRU cache.
    #[default]
    Memory,
    /// Persistent cache on the local filesystem.
    Disk,
    /// Always-miss cache.
    Null,
}

impl BackendKind {
    /// Convert self into static str.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Disk => "disk",
            BackendKind::Null => "null",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "disk" => Ok(BackendKind::Disk),
            "null" | "none" => Ok(BackendKind::Null),
            _ => Err(Error::config("unknown cache backend kind").with_context("kind", s)),
        }
    }
}

/// The capability shared by every cache backend.
///
/// Keys are plain strings, values are opaque payloads the backend stores and returns verbatim. See
/// [`crate::code::CacheExt`] for the typed layer on top.
///
/// Every operation on one instance is serialized by the instance's own lock. Different instances never share a lock.
pub trait Cache: Send + Sync + Debug + 'static {
    /// Name of the instance.
    fn name(&self) -> &str;

    /// Kind of the instance.
    fn kind(&self) -> BackendKind;

    /// Look up a value.
    ///
    /// Expired entries are removed on the spot and reported as a miss. A hit refreshes the entry's access time.
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value.
    ///
    /// `ttl` overrides the backend's default time-to-live. `None` falls back to the default, which itself may be
    /// unset, meaning the entry never expires.
    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Remove one entry, returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;

    /// Remove every entry whose key contains `pattern` as a substring, returns how many were removed.
    fn invalidate_pattern(&self, pattern: &str) -> Result<usize>;

    /// Eagerly remove every expired entry, returns how many were removed.
    fn purge_expired(&self) -> Result<usize>;

    /// Snapshot of the cumulative statistics.
    fn stats(&self) -> CacheStats;

    /// Zero the cumulative statistics.
    fn reset_stats(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(" Disk ".parse::<BackendKind>().unwrap(), BackendKind::Disk);
        assert_eq!("NULL".parse::<BackendKind>().unwrap(), BackendKind::Null);

        let err = "redis".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_backend_kind_serde() {
        assert_eq!(serde_json::to_string(&BackendKind::Disk).unwrap(), "\"disk\"");
        let kind: BackendKind = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(kind, BackendKind::Null);
    }
}
