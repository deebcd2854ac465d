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

use std::time::Duration;

use bincode::Options;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::{cache::Cache, error::Result};

/// Encode a value into an opaque cache payload.
pub fn encode<T>(value: &T) -> Result<Bytes>
where
    T: Serialize + ?Sized,
{
    let buf = bincode::serialize(value)?;
    Ok(Bytes::from(buf))
}

/// Decode an opaque cache payload.
pub fn decode<T>(buf: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    // same layout as `bincode::serialize`, trailing bytes rejected
    let options = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes();
    Ok(options.deserialize(buf)?)
}

/// Typed access over any [`Cache`].
pub trait CacheExt: Cache {
    /// Look up and decode a value.
    ///
    /// A payload that cannot be decoded as `T` is logged and reported as a miss.
    fn get_value<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(buf) = self.get(key)? else {
            return Ok(None);
        };
        match decode(&buf) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(cache = self.name(), key, "[cache]: undecodable payload, treated as miss: {e}");
                Ok(None)
            }
        }
    }

    /// Encode and store a value.
    fn set_value<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let buf = encode(value)?;
        self.set(key, buf, ttl)
    }
}

impl<C> CacheExt for C where C: Cache + ?Sized {}
