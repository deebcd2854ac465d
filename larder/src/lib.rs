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

//! larder: cache backends, call caching and cache-aside for data access layers.
//!
//! * [`larder_common`]: the [`Cache`](prelude::Cache) contract, key derivation, statistics and errors.
//! * [`larder_memory`]: the bounded LRU memory backend.
//! * [`larder_storage`]: the persistent disk backend and the none backend.
//!
//! [`CacheManager`](prelude::CacheManager) owns named instances of every backend. The [`decorator`] and [`dao`]
//! modules put those instances in front of application code.

pub use larder_common as common;
pub use larder_memory as memory;
pub use larder_storage as storage;

pub mod config;
pub mod dao;
pub mod decorator;
pub mod manager;
pub mod prelude;
