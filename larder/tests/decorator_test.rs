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
    convert::Infallible,
    result::Result,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use larder::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Versions {
    titles: Mutex<Vec<String>>,
    loads: AtomicUsize,
}

impl Versions {
    fn load(&self, form: u64) -> Result<Vec<String>, Infallible> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .titles
            .lock()
            .iter()
            .map(|title| format!("{form}:{title}"))
            .collect())
    }

    fn publish(&self, title: &str) -> Result<usize, Infallible> {
        let mut titles = self.titles.lock();
        titles.push(title.to_string());
        Ok(titles.len())
    }
}

#[test_log::test]
fn test_cacheable_with_invalidate() {
    let manager = CacheManager::default();
    let versions = Versions::default();

    let load = CacheableBuilder::new()
        .with_identity("versions::load")
        .with_cache_name("versions")
        .with_ttl(Duration::from_secs(60))
        .build(&manager, |(form,): (u64,)| versions.load(form));
    let publish = InvalidateBuilder::new()
        .with_pattern(load.identity())
        .with_cache_name("versions")
        .build(&manager, |(title,): (String,)| versions.publish(&title));

    assert!(load.call((1,)).unwrap().is_empty());
    assert!(load.call((1,)).unwrap().is_empty());
    assert_eq!(versions.loads.load(Ordering::Relaxed), 1);

    assert_eq!(publish.call(("v1".to_string(),)).unwrap(), 1);
    assert_eq!(load.call((1,)).unwrap(), vec!["1:v1".to_string()]);
    assert_eq!(versions.loads.load(Ordering::Relaxed), 2);

    // the same instance backs both wrappers
    assert!(Arc::ptr_eq(load.cache(), &manager.get_cache("versions", None, None)));
}

#[test_log::test]
fn test_cacheable_disabled_manager() {
    let manager = CacheManager::default();
    manager.configure(CacheOptions::default().with_enabled(false));
    let versions = Versions::default();

    let load = CacheableBuilder::new().build(&manager, |(form,): (u64,)| versions.load(form));
    load.call((1,)).unwrap();
    load.call((1,)).unwrap();
    assert_eq!(versions.loads.load(Ordering::Relaxed), 2);
    assert_eq!(load.cache().kind(), BackendKind::Null);
}

#[test_log::test]
fn test_multi_cache_memory_over_disk() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CacheManager::default();
    manager.configure(CacheOptions::default().with_disk_base_dir(dir.path()));
    let versions = Versions::default();
    versions.publish("v1").unwrap();

    let load = MultiCacheBuilder::new()
        .with_identity("versions::load")
        .with_level(CacheLevel::new("hot").with_ttl(Duration::from_secs(5)))
        .with_level(
            CacheLevel::new("cold")
                .with_backend(BackendKind::Disk)
                .with_ttl(Duration::from_secs(3600))
                .with_prefix("cold"),
        )
        .build(&manager, |(form,): (u64,)| versions.load(form));

    assert_eq!(load.call((7,)).unwrap(), vec!["7:v1".to_string()]);
    assert_eq!(versions.loads.load(Ordering::Relaxed), 1);

    let hot = manager.get_cache("hot", None, None);
    let cold = manager.get_cache("cold", Some(BackendKind::Disk), None);
    assert_eq!(hot.stats().sets, 1);
    assert_eq!(cold.stats().sets, 1);
    assert!(cold.get("versions::load:cold:7").unwrap().is_some());

    // a cold hit after the hot level lost the entry
    hot.clear().unwrap();
    assert_eq!(load.call((7,)).unwrap(), vec!["7:v1".to_string()]);
    assert_eq!(versions.loads.load(Ordering::Relaxed), 1);
}

#[test]
fn test_concurrent_callers() {
    let manager = CacheManager::default();
    let calls = AtomicUsize::new(0);
    let square = CacheableBuilder::new()
        .with_identity("square")
        .build(&manager, |(x,): (u64,)| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, Infallible>(x * x)
        });

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for x in 0..64u64 {
                    assert_eq!(square.call((x,)).unwrap(), x * x);
                }
            });
        }
    });

    // concurrent first calls may race, later calls are always served from the cache
    let first = calls.load(Ordering::Relaxed);
    assert!((64..=256).contains(&first));
    for x in 0..64u64 {
        square.call((x,)).unwrap();
    }
    assert_eq!(calls.load(Ordering::Relaxed), first);
}
