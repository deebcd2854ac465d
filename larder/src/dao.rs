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

//! Cache-aside for data access objects.
//!
//! [`CachedDao`] wraps any [`Dao`] and implements [`Dao`] itself. Reads go through the bound cache instance, writes
//! invalidate the reads they may have made stale. Keys live in the `dao:<table>.<operation>` namespace.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use larder_common::{
    cache::{BackendKind, Cache},
    code::CacheExt,
    key::{contains_none, derive_key, KeyArg},
    statistics::CacheStats,
};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::manager::CacheManager;

/// Field filters and field updates, by column name.
pub type Fields = BTreeMap<String, Value>;

/// The operations of a data access object over one table.
pub trait Dao: Send + Sync {
    /// A row.
    type Entity;
    /// A primary key.
    type Id;
    /// The error of the underlying store.
    type Error;

    /// Name of the table, also the cache namespace of a [`CachedDao`].
    fn table_name(&self) -> &str;

    /// The row with primary key `id`.
    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>, Self::Error>;

    /// Rows in primary key order, skipping `offset` and returning at most `limit`.
    fn find_all(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Self::Entity>, Self::Error>;

    /// Rows whose `field` equals `value`.
    fn find_by_field(&self, field: &str, value: &Value) -> Result<Vec<Self::Entity>, Self::Error>;

    /// Rows matching every filter.
    fn find_by_fields(&self, filters: &Fields) -> Result<Vec<Self::Entity>, Self::Error>;

    /// Number of rows matching the filters, or of all rows.
    fn count(&self, filters: Option<&Fields>) -> Result<u64, Self::Error>;

    /// Whether a row with primary key `id` exists.
    fn exists(&self, id: &Self::Id) -> Result<bool, Self::Error>;

    /// Insert a row.
    fn create(&self, fields: &Fields) -> Result<Self::Entity, Self::Error>;

    /// Update the row with primary key `id`. `None` if there is no such row.
    fn update(&self, id: &Self::Id, fields: &Fields) -> Result<Option<Self::Entity>, Self::Error>;

    /// Delete the row with primary key `id`. Returns whether there was one.
    fn delete(&self, id: &Self::Id) -> Result<bool, Self::Error>;
}

/// Operations whose results depend on more than one row.
const COLLECTION_OPS: [&str; 4] = ["find_all", "find_by_field", "find_by_fields", "count"];

#[derive(Debug)]
struct Binding {
    enabled: bool,
    cache: Arc<dyn Cache>,
    ttl: Option<Duration>,
}

/// A [`Dao`] whose reads are cached.
///
/// Cache failures are logged and never surface. Errors of the wrapped DAO are returned unchanged and never cached.
pub struct CachedDao<D> {
    inner: D,
    manager: Arc<CacheManager>,
    binding: RwLock<Binding>,
}

impl<D> Debug for CachedDao<D>
where
    D: Dao,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDao")
            .field("table", &self.inner.table_name())
            .field("binding", &*self.binding.read())
            .finish()
    }
}

impl<D> CachedDao<D>
where
    D: Dao,
    D::Entity: Serialize + DeserializeOwned,
    D::Id: Serialize + Debug,
{
    /// Wrap `inner`, caching in the instance named after its table with the manager's defaults.
    pub fn new(inner: D, manager: Arc<CacheManager>) -> Self {
        let cache = manager.get_cache(inner.table_name(), None, None);
        Self::with_cache(inner, manager, cache)
    }

    /// Wrap `inner`, caching in `cache`. The manager still serves [`CachedDao::configure_cache`].
    pub fn with_cache(inner: D, manager: Arc<CacheManager>, cache: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            manager,
            binding: RwLock::new(Binding {
                enabled: true,
                cache,
                ttl: None,
            }),
        }
    }

    /// Rebind the cache of this wrapper.
    ///
    /// `cache_name` defaults to the table name, `ttl` to the instance default. A disabled wrapper reads through a
    /// none cache.
    pub fn configure_cache(&self, enabled: bool, cache_name: Option<&str>, ttl: Option<Duration>) {
        let name = cache_name.unwrap_or(self.inner.table_name());
        let cache = match enabled {
            true => self.manager.get_cache(name, None, ttl),
            false => self.manager.get_cache(name, Some(BackendKind::Null), None),
        };
        tracing::debug!(table = self.inner.table_name(), enabled, name, ?ttl, "[dao]: cache configured");
        *self.binding.write() = Binding { enabled, cache, ttl };
    }

    /// The wrapped DAO.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Whether reads are cached.
    pub fn cache_enabled(&self) -> bool {
        self.binding.read().enabled
    }

    /// Statistics of the bound instance.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    /// Drop every cached read of this table.
    pub fn clear_cache(&self) {
        self.invalidate(&self.namespace());
    }

    fn cache(&self) -> Arc<dyn Cache> {
        self.binding.read().cache.clone()
    }

    fn namespace(&self) -> String {
        format!("dao:{}.", self.inner.table_name())
    }

    fn identity(&self, op: &str) -> String {
        format!("dao:{}.{op}", self.inner.table_name())
    }

    /// Key of a read, or `None` when a positional argument is the none sentinel and the read must not be cached.
    fn key(&self, op: &str, args: &[KeyArg], kwargs: &[(&str, KeyArg)]) -> Option<String> {
        if contains_none(args) {
            return None;
        }
        Some(derive_key(&self.identity(op), args, kwargs, None))
    }

    fn id_key(&self, op: &str, id: &D::Id) -> Option<String> {
        self.key(op, &[KeyArg::new(id)], &[])
    }

    /// Look `key` up, or compute and store the result. `store` decides whether a computed result is stored.
    ///
    /// Without a key the read goes straight to the wrapped DAO.
    fn read_through<T>(
        &self,
        key: Option<String>,
        load: impl FnOnce() -> Result<T, D::Error>,
        store: impl FnOnce(&T) -> bool,
    ) -> Result<T, D::Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(key) = key else {
            tracing::trace!(table = self.inner.table_name(), "[dao]: none argument, bypass cache");
            return load();
        };

        let (cache, ttl) = {
            let binding = self.binding.read();
            (binding.cache.clone(), binding.ttl)
        };

        match cache.get_value::<T>(&key) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, "[dao]: cache lookup failed, read through: {e}"),
        }

        let value = load()?;
        if store(&value) {
            if let Err(e) = cache.set_value(&key, &value, ttl) {
                tracing::warn!(key = %key, "[dao]: store result failed: {e}");
            }
        }
        Ok(value)
    }

    fn invalidate(&self, pattern: &str) {
        match self.cache().invalidate_pattern(pattern) {
            Ok(count) => tracing::trace!(pattern, count, "[dao]: entries invalidated"),
            Err(e) => tracing::warn!(pattern, "[dao]: invalidation failed: {e}"),
        }
    }

    fn invalidate_collections(&self) {
        for op in COLLECTION_OPS {
            let identity = self.identity(op);
            // trailing `:` keeps `find_by_field` from matching `find_by_fields`
            self.invalidate(&format!("{identity}:"));
            // calls without arguments, e.g. `count(None)`
            self.delete_key(&identity);
        }
    }

    fn delete_key(&self, key: &str) {
        if let Err(e) = self.cache().delete(key) {
            tracing::warn!(key, "[dao]: drop entry failed: {e}");
        }
    }

    fn invalidate_id(&self, id: &D::Id) {
        for op in ["find_by_id", "exists"] {
            if let Some(key) = self.id_key(op, id) {
                self.delete_key(&key);
            }
        }
        self.invalidate_collections();
    }
}

impl<D> Dao for CachedDao<D>
where
    D: Dao,
    D::Entity: Serialize + DeserializeOwned,
    D::Id: Serialize + Debug,
{
    type Entity = D::Entity;
    type Id = D::Id;
    type Error = D::Error;

    fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>, Self::Error> {
        let key = self.id_key("find_by_id", id);
        self.read_through(key, || self.inner.find_by_id(id), Option::is_some)
    }

    fn find_all(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Self::Entity>, Self::Error> {
        // keyword arguments, a `None` limit means unbounded and is still cached
        let key = self.key(
            "find_all",
            &[],
            &[("limit", KeyArg::new(&limit)), ("offset", KeyArg::new(&offset))],
        );
        self.read_through(key, || self.inner.find_all(limit, offset), |_| true)
    }

    fn find_by_field(&self, field: &str, value: &Value) -> Result<Vec<Self::Entity>, Self::Error> {
        let key = self.key("find_by_field", &[KeyArg::new(field), KeyArg::new(value)], &[]);
        self.read_through(key, || self.inner.find_by_field(field, value), |_| true)
    }

    fn find_by_fields(&self, filters: &Fields) -> Result<Vec<Self::Entity>, Self::Error> {
        let kwargs = filters
            .iter()
            .map(|(name, value)| (name.as_str(), KeyArg::new(value)))
            .collect::<Vec<_>>();
        let key = self.key("find_by_fields", &[], &kwargs);
        self.read_through(key, || self.inner.find_by_fields(filters), |_| true)
    }

    fn count(&self, filters: Option<&Fields>) -> Result<u64, Self::Error> {
        let kwargs = filters
            .into_iter()
            .flatten()
            .map(|(name, value)| (name.as_str(), KeyArg::new(value)))
            .collect::<Vec<_>>();
        let key = self.key("count", &[], &kwargs);
        self.read_through(key, || self.inner.count(filters), |_| true)
    }

    fn exists(&self, id: &Self::Id) -> Result<bool, Self::Error> {
        let key = self.id_key("exists", id);
        self.read_through(key, || self.inner.exists(id), |_| true)
    }

    fn create(&self, fields: &Fields) -> Result<Self::Entity, Self::Error> {
        let entity = self.inner.create(fields)?;
        self.invalidate_collections();
        // a cached `false` may now be wrong for the new id
        self.invalidate(&format!("{}:", self.identity("exists")));
        Ok(entity)
    }

    fn update(&self, id: &Self::Id, fields: &Fields) -> Result<Option<Self::Entity>, Self::Error> {
        let entity = self.inner.update(id, fields)?;
        self.invalidate_id(id);
        Ok(entity)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool, Self::Error> {
        let deleted = self.inner.delete(id)?;
        self.invalidate_id(id);
        Ok(deleted)
    }
}
