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

use std::{path::PathBuf, time::Duration};

use larder_common::{cache::BackendKind, error::Result};
use larder_memory::DEFAULT_MAX_SIZE;
use serde::{Deserialize, Deserializer};

/// Default time-to-live of instances created by the cache manager.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Effective, process-wide cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// When `false`, every requested cache is a none cache.
    pub enabled: bool,
    /// Backend kind used when a request names none.
    pub default_backend: BackendKind,
    /// Default time-to-live of new instances. `None` means entries never expire.
    pub default_ttl: Option<Duration>,
    /// Memory backend settings.
    pub memory: MemoryConfig,
    /// Disk backend settings.
    pub disk: DiskConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_backend: BackendKind::Memory,
            default_ttl: Some(DEFAULT_TTL),
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
        }
    }
}

/// Memory backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Entry bound of each memory instance.
    pub max_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Disk backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskConfig {
    /// Root under which each disk instance gets a directory named after it.
    ///
    /// Resolved with [`default_base_dir`] when unset.
    pub base_dir: Option<PathBuf>,
}

/// The platform cache directory for larder, or a temporary directory when the platform has none.
pub fn default_base_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("larder")
}

/// A partial configuration, merged field by field into a [`CacheConfig`].
///
/// ```rust
/// # use larder::config::CacheOptions;
/// let options = CacheOptions::from_json(r#"{ "default_backend": "disk", "default_ttl": "10m" }"#).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    /// Replaces [`CacheConfig::enabled`].
    pub enabled: Option<bool>,
    /// Replaces [`CacheConfig::default_backend`].
    pub default_backend: Option<BackendKind>,
    /// Replaces [`CacheConfig::default_ttl`].
    ///
    /// `Some(None)` (`null` in serialized form) disables expiration. Serialized durations are either humantime
    /// strings (`"5m"`, `"250ms"`) or seconds.
    #[serde(deserialize_with = "deserialize_ttl")]
    pub default_ttl: Option<Option<Duration>>,
    /// Merged into [`CacheConfig::memory`].
    pub memory: Option<MemoryOptions>,
    /// Merged into [`CacheConfig::disk`].
    pub disk: Option<DiskOptions>,
}

/// Partial memory backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryOptions {
    /// Replaces [`MemoryConfig::max_size`].
    pub max_size: Option<usize>,
}

/// Partial disk backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskOptions {
    /// Replaces [`DiskConfig::base_dir`].
    pub base_dir: Option<PathBuf>,
}

impl CacheOptions {
    /// Parse options from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Set `enabled`.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set `default_backend`.
    pub fn with_default_backend(mut self, backend: BackendKind) -> Self {
        self.default_backend = Some(backend);
        self
    }

    /// Set `default_ttl`.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set `memory.max_size`.
    pub fn with_memory_max_size(mut self, max_size: usize) -> Self {
        self.memory.get_or_insert_with(MemoryOptions::default).max_size = Some(max_size);
        self
    }

    /// Set `disk.base_dir`.
    pub fn with_disk_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.disk.get_or_insert_with(DiskOptions::default).base_dir = Some(base_dir.into());
        self
    }
}

impl CacheConfig {
    /// Merge partial options. Scalars replace, nested groups merge field by field.
    pub fn merge(&mut self, options: CacheOptions) {
        if let Some(enabled) = options.enabled {
            self.enabled = enabled;
        }
        if let Some(backend) = options.default_backend {
            self.default_backend = backend;
        }
        if let Some(ttl) = options.default_ttl {
            self.default_ttl = ttl;
        }
        if let Some(max_size) = options.memory.and_then(|memory| memory.max_size) {
            self.memory.max_size = max_size;
        }
        if let Some(base_dir) = options.disk.and_then(|disk| disk.base_dir) {
            self.disk.base_dir = Some(base_dir);
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TtlRepr {
    Text(String),
    Secs(f64),
}

fn deserialize_ttl<'de, D>(deserializer: D) -> std::result::Result<Option<Option<Duration>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let ttl = match Option::<TtlRepr>::deserialize(deserializer)? {
        None => None,
        Some(TtlRepr::Text(text)) => Some(humantime::parse_duration(&text).map_err(D::Error::custom)?),
        Some(TtlRepr::Secs(secs)) => Some(Duration::try_from_secs_f64(secs).map_err(D::Error::custom)?),
    };
    Ok(Some(ttl))
}
