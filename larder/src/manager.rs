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
    sync::Arc,
    time::Duration,
};

use hashbrown::HashMap;
use larder_common::{
    cache::{BackendKind, Cache},
    error::Result,
    hasher::hex_hash,
    statistics::CacheStats,
};
use larder_memory::MemoryCacheBuilder;
use larder_storage::{DiskCacheBuilder, NoneCache};
use parking_lot::{Mutex, RwLock};

use crate::config::{default_base_dir, CacheConfig, CacheOptions};

/// Creates, configures and reuses named cache instances.
///
/// One instance exists per `(name, kind)` pair for the lifetime of the manager. The manager is meant to be created
/// once at start-up and shared (usually behind an [`Arc`]) with everything that caches.
///
/// ```rust
/// # use larder::prelude::*;
/// let manager = CacheManager::new(CacheConfig::default());
/// let users = manager.get_cache("users", None, None);
/// users.set_value("greeting", "hello", None).unwrap();
/// assert_eq!(users.get_value::<String>("greeting").unwrap().as_deref(), Some("hello"));
/// ```
#[derive(Debug, Default)]
pub struct CacheManager {
    config: RwLock<CacheConfig>,
    caches: Mutex<HashMap<(String, BackendKind), Arc<dyn Cache>>>,
}

impl CacheManager {
    /// Create a cache manager.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: RwLock::new(config),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Merge partial options into the configuration.
    ///
    /// Instances created before keep their settings. The enable flag applies to every later request.
    pub fn configure(&self, options: CacheOptions) {
        let mut config = self.config.write();
        config.merge(options);
        tracing::info!("[manager]: configured: {:?}", *config);
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    /// Get or create the instance `name` of the given kind.
    ///
    /// `backend` falls back to the configured default kind, `ttl` to the configured default time-to-live; both only
    /// matter when the instance is created. When caching is disabled a none cache is returned whatever was asked.
    pub fn get_cache(&self, name: &str, backend: Option<BackendKind>, ttl: Option<Duration>) -> Arc<dyn Cache> {
        let config = self.config.read().clone();
        let kind = match config.enabled {
            true => backend.unwrap_or(config.default_backend),
            false => BackendKind::Null,
        };

        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&(name.to_string(), kind)) {
            return cache.clone();
        }

        let ttl = ttl.or(config.default_ttl);
        match Self::create(&config, name, kind, ttl) {
            Ok(cache) => {
                tracing::debug!(name, %kind, ?ttl, "[manager]: cache instance created");
                caches.insert((name.to_string(), kind), cache.clone());
                cache
            }
            Err(e) => {
                tracing::error!(name, %kind, "[manager]: create cache instance failed, caching disabled for it: {e}");
                Arc::new(NoneCache::new(name))
            }
        }
    }

    /// Like [`CacheManager::get_cache`], with the kind given by name.
    ///
    /// An unknown kind is logged and yields a none cache.
    pub fn get_cache_by_kind_name(&self, name: &str, kind: &str, ttl: Option<Duration>) -> Arc<dyn Cache> {
        match kind.parse::<BackendKind>() {
            Ok(kind) => self.get_cache(name, Some(kind), ttl),
            Err(e) => {
                tracing::warn!(name, kind, "[manager]: unknown cache backend, fall back to none: {e}");
                self.get_cache(name, Some(BackendKind::Null), ttl)
            }
        }
    }

    fn create(config: &CacheConfig, name: &str, kind: BackendKind, ttl: Option<Duration>) -> Result<Arc<dyn Cache>> {
        let cache: Arc<dyn Cache> = match kind {
            BackendKind::Memory => Arc::new(
                MemoryCacheBuilder::new(config.memory.max_size)
                    .with_name(name)
                    .with_default_ttl(ttl)
                    .build()?,
            ),
            BackendKind::Disk => {
                let base_dir = config.disk.base_dir.clone().unwrap_or_else(default_base_dir);
                Arc::new(
                    DiskCacheBuilder::new(instance_dir(&base_dir, name))
                        .with_name(name)
                        .with_default_ttl(ttl)
                        .build()?,
                )
            }
            BackendKind::Null => Arc::new(NoneCache::new(name)),
        };
        Ok(cache)
    }

    /// Clear every instance created by this manager.
    ///
    /// Failures are logged, the remaining instances are still cleared.
    pub fn clear_all_caches(&self) {
        let caches = self.caches.lock().values().cloned().collect::<Vec<_>>();
        for cache in caches {
            if let Err(e) = cache.clear() {
                tracing::warn!(name = cache.name(), kind = %cache.kind(), "[manager]: clear cache failed: {e}");
            }
        }
    }

    /// Statistics of every instance, keyed by `name:kind`.
    pub fn get_stats(&self) -> BTreeMap<String, CacheStats> {
        self.caches
            .lock()
            .iter()
            .map(|((name, kind), cache)| (format!("{name}:{kind}"), cache.stats()))
            .collect()
    }
}

/// Directory of the disk instance `name`, always a direct child of `base_dir`.
///
/// Names that are not a plain file name are replaced by their hash.
fn instance_dir(base_dir: &Path, name: &str) -> PathBuf {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    match plain {
        true => base_dir.join(name),
        false => base_dir.join(hex_hash(name.as_bytes())),
    }
}
