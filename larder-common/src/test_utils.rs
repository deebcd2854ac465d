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
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use bytes::Bytes;

use crate::{
    cache::{BackendKind, Cache},
    error::{Error, ErrorKind, Result},
    statistics::CacheStats,
};

/// A cache whose every fallible operation returns an error.
///
/// Reports itself as a memory backend. Counts the attempted operations so callers can assert the cache was tried.
#[derive(Debug, Default)]
pub struct FailingCache {
    attempts: AtomicUsize,
}

impl FailingCache {
    /// Number of fallible operations attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    fn fail<T>(&self, op: &'static str) -> Result<T> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(Error::new(ErrorKind::Io, "injected failure").with_context("op", op))
    }
}

impl Cache for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, _: &str) -> Result<Option<Bytes>> {
        self.fail("get")
    }

    fn set(&self, _: &str, _: Bytes, _: Option<Duration>) -> Result<()> {
        self.fail("set")
    }

    fn delete(&self, _: &str) -> Result<bool> {
        self.fail("delete")
    }

    fn clear(&self) -> Result<()> {
        self.fail("clear")
    }

    fn invalidate_pattern(&self, _: &str) -> Result<usize> {
        self.fail("invalidate_pattern")
    }

    fn purge_expired(&self) -> Result<usize> {
        self.fail("purge_expired")
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn reset_stats(&self) {}
}
