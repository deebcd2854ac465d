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

use twox_hash::XxHash64;

/// Deterministic 64-bit hash, stable across processes and platforms.
pub fn hash64(buf: &[u8]) -> u64 {
    XxHash64::oneshot(0, buf)
}

/// [`hash64`] rendered as 16 lowercase hex digits.
pub fn hex_hash(buf: &[u8]) -> String {
    format!("{:016x}", hash64(buf))
}
