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

//! Shared components for larder.

/// The cache backend capability.
pub mod cache;
/// Typed payload coding.
pub mod code;
/// Error type and result alias.
pub mod error;
/// Stable hashing.
pub mod hasher;
/// Cache key derivation.
pub mod key;
/// Per-instance statistics.
pub mod statistics;
/// Test utilities.
pub mod test_utils;
/// Wall clock helpers.
pub mod time;
