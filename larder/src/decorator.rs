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

//! Wrappers that put a cache in front of plain functions.
//!
//! * [`Cacheable`] caches the results of a read function, keyed by its arguments.
//! * [`Invalidate`] runs a write function, then removes the cached entries it may have made stale.
//! * [`MultiCache`] caches the results of a read function in several instances at once.
//!
//! Wrapped functions return `Result<T, E>`. Errors pass through unchanged and are never cached. Cache failures are
//! logged and otherwise ignored, so a broken cache only costs performance.

use std::{fmt::Debug, marker::PhantomData, sync::Arc, time::Duration};

use larder_common::{
    cache::{BackendKind, Cache},
    code::CacheExt,
    key::{contains_none, derive_key, KeyArgs},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::manager::CacheManager;

/// Instance name used by the wrappers when none is given.
pub const DEFAULT_CACHE_NAME: &str = "default";

fn identity_of<F>() -> String {
    std::any::type_name::<F>().to_string()
}

/// Type name of `F` plus the location of the caller.
///
/// Closures of one function share a type name, the location tells their wrappers apart. Wrappers built at the same
/// location share the identity.
#[track_caller]
fn call_site_identity<F>() -> String {
    let location = std::panic::Location::caller();
    format!(
        "{}@{}:{}:{}",
        std::any::type_name::<F>(),
        location.file(),
        location.line(),
        location.column()
    )
}

/// Key of one call, or `None` when the call must not be cached.
fn call_key<A>(identity: &str, prefix: Option<&str>, args: &A) -> Option<String>
where
    A: KeyArgs,
{
    let positional = args.key_args();
    if contains_none(&positional) {
        return None;
    }
    Some(derive_key(identity, &positional, &args.key_kwargs(), prefix))
}

/// Builder of [`Cacheable`].
#[derive(Debug, Clone, Default)]
pub struct CacheableBuilder {
    identity: Option<String>,
    cache_name: Option<String>,
    backend: Option<BackendKind>,
    ttl: Option<Duration>,
    prefix: Option<String>,
}

impl CacheableBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity keys are derived from.
    ///
    /// Defaults to the type name of the wrapped function followed by the location `build` is called at.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the name of the instance results are cached in. Defaults to [`DEFAULT_CACHE_NAME`].
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// Set the backend kind of the instance. Defaults to the manager's default backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the time-to-live of cached results. Defaults to the instance's default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set a prefix inserted after the identity in every key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Wrap `f` with an instance obtained from `manager`.
    #[track_caller]
    pub fn build<A, T, E, F>(self, manager: &CacheManager, f: F) -> Cacheable<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
    {
        let name = self.cache_name.as_deref().unwrap_or(DEFAULT_CACHE_NAME);
        let cache = manager.get_cache(name, self.backend, None);
        self.build_with_cache(cache, f)
    }

    /// Wrap `f` with the given instance.
    #[track_caller]
    pub fn build_with_cache<A, T, E, F>(self, cache: Arc<dyn Cache>, f: F) -> Cacheable<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
    {
        let identity = match self.identity {
            Some(identity) => identity,
            None => call_site_identity::<F>(),
        };
        Cacheable {
            identity,
            prefix: self.prefix,
            ttl: self.ttl,
            cache,
            f,
            _marker: PhantomData,
        }
    }
}

/// A read function whose results are cached.
///
/// ```rust
/// # use larder::prelude::*;
/// let manager = CacheManager::default();
/// let square = CacheableBuilder::new()
///     .with_identity("math::square")
///     .build(&manager, |(x,): (u64,)| Ok::<_, std::convert::Infallible>(x * x));
/// assert_eq!(square.call((12,)).unwrap(), 144);
/// assert_eq!(square.key(&(12,)).as_deref(), Some("math::square:12"));
/// ```
pub struct Cacheable<A, T, E, F> {
    identity: String,
    prefix: Option<String>,
    ttl: Option<Duration>,
    cache: Arc<dyn Cache>,
    f: F,
    _marker: PhantomData<fn(A) -> (T, E)>,
}

impl<A, T, E, F> Debug for Cacheable<A, T, E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cacheable")
            .field("identity", &self.identity)
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<A, T, E, F> Cacheable<A, T, E, F>
where
    A: KeyArgs,
    T: Serialize + DeserializeOwned,
    F: Fn(A) -> Result<T, E>,
{
    /// Call through the cache.
    ///
    /// A call with a none positional argument bypasses the cache entirely.
    pub fn call(&self, args: A) -> Result<T, E> {
        let Some(key) = self.key(&args) else {
            tracing::trace!(identity = %self.identity, "[cacheable]: none argument, bypass cache");
            return (self.f)(args);
        };

        match self.cache.get_value::<T>(&key) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, "[cacheable]: cache lookup failed, call through: {e}"),
        }

        let value = (self.f)(args)?;
        if let Err(e) = self.cache.set_value(&key, &value, self.ttl) {
            tracing::error!(key = %key, "[cacheable]: store result failed: {e}");
        }
        Ok(value)
    }

    /// Key a call with `args` is cached under, or `None` when such a call bypasses the cache.
    pub fn key(&self, args: &A) -> Option<String> {
        call_key(&self.identity, self.prefix.as_deref(), args)
    }

    /// Drop the cached result of a call with `args`. Returns whether there was one.
    pub fn invalidate(&self, args: &A) -> bool {
        let Some(key) = self.key(args) else {
            return false;
        };
        match self.cache.delete(&key) {
            Ok(existed) => existed,
            Err(e) => {
                tracing::error!(key = %key, "[cacheable]: drop result failed: {e}");
                false
            }
        }
    }

    /// Identity keys are derived from. Usable as an invalidation pattern covering every call.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The instance results are cached in.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }
}

/// Builder of [`Invalidate`].
#[derive(Debug, Clone, Default)]
pub struct InvalidateBuilder {
    identity: Option<String>,
    pattern: Option<String>,
    cache_name: Option<String>,
    backend: Option<BackendKind>,
}

impl InvalidateBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity of the wrapped function. Defaults to its type name.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the pattern invalidated after each successful call. Defaults to the identity.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the name of the instance to invalidate. Defaults to [`DEFAULT_CACHE_NAME`].
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// Set the backend kind of the instance. Defaults to the manager's default backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Wrap `f` with an instance obtained from `manager`.
    pub fn build<A, T, E, F>(self, manager: &CacheManager, f: F) -> Invalidate<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
    {
        let name = self.cache_name.as_deref().unwrap_or(DEFAULT_CACHE_NAME);
        let cache = manager.get_cache(name, self.backend, None);
        self.build_with_cache(cache, f)
    }

    /// Wrap `f` with the given instance.
    pub fn build_with_cache<A, T, E, F>(self, cache: Arc<dyn Cache>, f: F) -> Invalidate<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
    {
        let identity = self.identity.unwrap_or_else(identity_of::<F>);
        Invalidate {
            pattern: self.pattern.unwrap_or(identity),
            cache,
            f,
            _marker: PhantomData,
        }
    }
}

/// A write function followed by pattern invalidation.
pub struct Invalidate<A, T, E, F> {
    pattern: String,
    cache: Arc<dyn Cache>,
    f: F,
    _marker: PhantomData<fn(A) -> (T, E)>,
}

impl<A, T, E, F> Debug for Invalidate<A, T, E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidate")
            .field("pattern", &self.pattern)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<A, T, E, F> Invalidate<A, T, E, F>
where
    F: Fn(A) -> Result<T, E>,
{
    /// Run the write. Entries matching the pattern are invalidated only if it succeeds.
    pub fn call(&self, args: A) -> Result<T, E> {
        let res = (self.f)(args)?;
        match self.cache.invalidate_pattern(&self.pattern) {
            Ok(count) => tracing::debug!(pattern = %self.pattern, count, "[invalidate]: entries invalidated"),
            Err(e) => tracing::error!(pattern = %self.pattern, "[invalidate]: invalidation failed: {e}"),
        }
        Ok(res)
    }

    /// The invalidated pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug, Clone)]
enum LevelSource {
    Named { name: String, backend: Option<BackendKind> },
    Instance(Arc<dyn Cache>),
}

/// One level of a [`MultiCache`].
#[derive(Debug, Clone)]
pub struct CacheLevel {
    source: LevelSource,
    ttl: Option<Duration>,
    prefix: Option<String>,
}

impl CacheLevel {
    /// A level backed by the instance `name` of the manager.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            source: LevelSource::Named {
                name: name.into(),
                backend: None,
            },
            ttl: None,
            prefix: None,
        }
    }

    /// A level backed by the given instance.
    pub fn with_cache(cache: Arc<dyn Cache>) -> Self {
        Self {
            source: LevelSource::Instance(cache),
            ttl: None,
            prefix: None,
        }
    }

    /// Set the backend kind of a named level.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        if let LevelSource::Named { backend: b, .. } = &mut self.source {
            *b = Some(backend);
        }
        self
    }

    /// Set the time-to-live of results stored in this level.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the key prefix of this level.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug)]
struct Level {
    cache: Arc<dyn Cache>,
    ttl: Option<Duration>,
    prefix: Option<String>,
}

/// Builder of [`MultiCache`].
#[derive(Debug, Clone, Default)]
pub struct MultiCacheBuilder {
    identity: Option<String>,
    levels: Vec<CacheLevel>,
}

impl MultiCacheBuilder {
    /// Create a builder without levels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity keys are derived from.
    ///
    /// Defaults to the type name of the wrapped function followed by the location `build` is called at.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Append a level. Levels are probed in the order they are added.
    pub fn with_level(mut self, level: CacheLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Wrap `f`, resolving named levels with `manager`.
    #[track_caller]
    pub fn build<A, T, E, F>(self, manager: &CacheManager, f: F) -> MultiCache<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
    {
        let levels = self
            .levels
            .into_iter()
            .map(|level| {
                let cache = match level.source {
                    LevelSource::Named { name, backend } => manager.get_cache(&name, backend, level.ttl),
                    LevelSource::Instance(cache) => cache,
                };
                Level {
                    cache,
                    ttl: level.ttl,
                    prefix: level.prefix,
                }
            })
            .collect();
        let identity = match self.identity {
            Some(identity) => identity,
            None => call_site_identity::<F>(),
        };
        MultiCache {
            identity,
            levels,
            f,
            _marker: PhantomData,
        }
    }
}

/// A read function whose results are cached in several instances.
///
/// A call returns the result of the first level that has it. Levels that missed are not filled from a later hit;
/// only a full miss calls the function and stores its result in every level.
pub struct MultiCache<A, T, E, F> {
    identity: String,
    levels: Vec<Level>,
    f: F,
    _marker: PhantomData<fn(A) -> (T, E)>,
}

impl<A, T, E, F> Debug for MultiCache<A, T, E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCache")
            .field("identity", &self.identity)
            .field("levels", &self.levels)
            .finish()
    }
}

impl<A, T, E, F> MultiCache<A, T, E, F>
where
    A: KeyArgs,
    T: Serialize + DeserializeOwned,
    F: Fn(A) -> Result<T, E>,
{
    /// Call through every level.
    pub fn call(&self, args: A) -> Result<T, E> {
        let keys = self
            .levels
            .iter()
            .map(|level| call_key(&self.identity, level.prefix.as_deref(), &args))
            .collect::<Option<Vec<_>>>();
        let Some(keys) = keys else {
            return (self.f)(args);
        };

        for (level, key) in self.levels.iter().zip(keys.iter()) {
            match level.cache.get_value::<T>(key) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => tracing::warn!(cache = level.cache.name(), key = %key, "[multi-cache]: lookup failed: {e}"),
            }
        }

        let value = (self.f)(args)?;
        for (level, key) in self.levels.iter().zip(keys.iter()) {
            if let Err(e) = level.cache.set_value(key, &value, level.ttl) {
                tracing::error!(cache = level.cache.name(), key = %key, "[multi-cache]: store result failed: {e}");
            }
        }
        Ok(value)
    }

    /// Identity keys are derived from.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use larder_common::test_utils::FailingCache;
    use larder_memory::MemoryCacheBuilder;

    use super::*;

    fn memory(name: &str) -> Arc<dyn Cache> {
        Arc::new(MemoryCacheBuilder::new(16).with_name(name).build().unwrap())
    }

    #[test]
    fn test_cacheable_calls_once_per_args() {
        let calls = AtomicUsize::new(0);
        let double = CacheableBuilder::new()
            .with_identity("double")
            .build_with_cache(memory("calls"), |(x,): (u32,)| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Infallible>(x * 2)
            });

        assert_eq!(double.call((2,)).unwrap(), 4);
        assert_eq!(double.call((2,)).unwrap(), 4);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(double.call((3,)).unwrap(), 6);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_cacheable_none_bypasses() {
        let calls = AtomicUsize::new(0);
        let cache = memory("calls");
        let lookup = CacheableBuilder::new()
            .with_identity("lookup")
            .build_with_cache(cache.clone(), |(id,): (Option<u32>,)| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Infallible>(id.unwrap_or_default())
            });

        assert_eq!(lookup.key(&(None,)), None);
        lookup.call((None,)).unwrap();
        lookup.call((None,)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().sets, 0);
    }

    #[test]
    fn test_cacheable_error_not_cached() {
        let calls = AtomicUsize::new(0);
        let flaky = CacheableBuilder::new()
            .with_identity("flaky")
            .build_with_cache(memory("calls"), |(): ()| {
                match calls.fetch_add(1, Ordering::Relaxed) {
                    0 => Err("unavailable"),
                    _ => Ok(7u8),
                }
            });

        assert_eq!(flaky.call(()), Err("unavailable"));
        assert_eq!(flaky.call(()), Ok(7));
        assert_eq!(flaky.call(()), Ok(7));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_cacheable_prefix_and_invalidate() {
        let cacheable = CacheableBuilder::new()
            .with_identity("forms::load")
            .with_prefix("v2")
            .build_with_cache(memory("forms"), |(id, name): (u32, String)| {
                Ok::<_, Infallible>(format!("{id}-{name}"))
            });
        let args = (1, "intake".to_string());
        assert_eq!(cacheable.key(&args).as_deref(), Some(r#"forms::load:v2:1:"intake""#));

        cacheable.call(args.clone()).unwrap();
        assert!(cacheable.invalidate(&args));
        assert!(!cacheable.invalidate(&args));
    }

    #[test]
    fn test_default_identity() {
        fn answer((): ()) -> Result<u8, Infallible> {
            Ok(42)
        }
        let cacheable = CacheableBuilder::new().build_with_cache(memory("calls"), answer);
        assert!(cacheable.identity().contains("test_default_identity::answer@"));
        assert!(cacheable.identity().contains(file!()));
    }

    #[test]
    fn test_default_identity_distinct_per_closure() {
        let manager = CacheManager::default();
        let double = CacheableBuilder::new().build(&manager, |(x,): (u64,)| Ok::<_, Infallible>(x * 2));
        let triple = CacheableBuilder::new().build(&manager, |(x,): (u64,)| Ok::<_, Infallible>(x * 3));
        assert!(Arc::ptr_eq(double.cache(), triple.cache()));
        assert_ne!(double.identity(), triple.identity());

        assert_eq!(double.call((5,)).unwrap(), 10);
        assert_eq!(triple.call((5,)).unwrap(), 15);
        assert_eq!(double.call((5,)).unwrap(), 10);
    }

    #[test]
    fn test_multi_cache_default_identity_distinct() {
        let manager = CacheManager::default();
        let shared = memory("shared");
        let first = MultiCacheBuilder::new()
            .with_level(CacheLevel::with_cache(shared.clone()))
            .build(&manager, |(): ()| Ok::<_, Infallible>(1u8));
        let second = MultiCacheBuilder::new()
            .with_level(CacheLevel::with_cache(shared))
            .build(&manager, |(): ()| Ok::<_, Infallible>(2u8));
        assert_eq!(first.call(()).unwrap(), 1);
        assert_eq!(second.call(()).unwrap(), 2);
    }

    #[test_log::test]
    fn test_invalidate_after_success_only() {
        let cache = memory("forms");
        cache.set_value("forms::load:1", &1u8, None).unwrap();
        cache.set_value("forms::load:2", &2u8, None).unwrap();
        cache.set_value("versions::load:1", &1u8, None).unwrap();

        let save = InvalidateBuilder::new()
            .with_pattern("forms::load")
            .build_with_cache(cache.clone(), |(ok,): (bool,)| if ok { Ok(()) } else { Err("rejected") });

        assert_eq!(save.call((false,)), Err("rejected"));
        assert_eq!(cache.stats().size, 3);

        save.call((true,)).unwrap();
        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.get_value::<u8>("versions::load:1").unwrap(), Some(1));
    }

    #[test]
    fn test_multi_cache() {
        let l1 = memory("l1");
        let l2 = memory("l2");
        let calls = AtomicUsize::new(0);
        let manager = CacheManager::default();
        let multi = MultiCacheBuilder::new()
            .with_identity("reports::render")
            .with_level(CacheLevel::with_cache(l1.clone()).with_prefix("hot"))
            .with_level(CacheLevel::with_cache(l2.clone()).with_ttl(Duration::from_secs(60)))
            .build(&manager, |(id,): (u32,)| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Infallible>(format!("report-{id}"))
            });

        assert_eq!(multi.call((1,)).unwrap(), "report-1");
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(
            l1.get_value::<String>("reports::render:hot:1").unwrap().as_deref(),
            Some("report-1")
        );
        assert_eq!(
            l2.get_value::<String>("reports::render:1").unwrap().as_deref(),
            Some("report-1")
        );

        // served by the second level, the first is not refilled
        l1.clear().unwrap();
        assert_eq!(multi.call((1,)).unwrap(), "report-1");
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(l1.get_value::<String>("reports::render:hot:1").unwrap(), None);
    }

    #[test_log::test]
    fn test_cache_failures_are_swallowed() {
        let failing = Arc::new(FailingCache::default());
        let calls = AtomicUsize::new(0);
        let manager = CacheManager::default();

        let load = CacheableBuilder::new()
            .with_identity("forms::load")
            .build_with_cache(failing.clone(), |(id,): (u32,)| {
                calls.fetch_add(1, Ordering::Relaxed);
                match id {
                    0 => Err("no such form"),
                    id => Ok(format!("form-{id}")),
                }
            });
        assert_eq!(load.call((1,)).unwrap(), "form-1");
        assert_eq!(load.call((1,)).unwrap(), "form-1");
        assert_eq!(load.call((0,)), Err("no such form"));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(!load.invalidate(&(1,)));

        let save = InvalidateBuilder::new()
            .with_pattern("forms::load")
            .build_with_cache(failing.clone(), |(ok,): (bool,)| if ok { Ok(7u8) } else { Err("rejected") });
        assert_eq!(save.call((true,)), Ok(7));
        assert_eq!(save.call((false,)), Err("rejected"));

        let multi = MultiCacheBuilder::new()
            .with_identity("forms::render")
            .with_level(CacheLevel::with_cache(failing.clone()))
            .with_level(CacheLevel::with_cache(failing.clone()))
            .build(&manager, |(id,): (u32,)| match id {
                0 => Err("no such form"),
                id => Ok(id * 10),
            });
        assert_eq!(multi.call((2,)), Ok(20));
        assert_eq!(multi.call((0,)), Err("no such form"));

        // lookups, stores, the drop and the invalidation were all attempted
        assert_eq!(failing.attempts(), 13);
    }
}
