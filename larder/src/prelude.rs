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

//! Commonly used items.

pub use larder_common::{
    cache::{BackendKind, Cache},
    code::CacheExt,
    error::{Error, ErrorKind, Result},
    key::{derive_key, KeyArg, KeyArgs},
    statistics::CacheStats,
};
pub use larder_memory::{MemoryCache, MemoryCacheBuilder};
pub use larder_storage::{DiskCache, DiskCacheBuilder, NoneCache};

pub use crate::{
    config::{CacheConfig, CacheOptions},
    dao::{CachedDao, Dao, Fields},
    decorator::{
        CacheLevel, Cacheable, CacheableBuilder, Invalidate, InvalidateBuilder, MultiCache, MultiCacheBuilder,
    },
    manager::CacheManager,
};
