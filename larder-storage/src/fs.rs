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
    fs::{create_dir_all, remove_file, rename, File},
    io::{ErrorKind, Write},
    path::Path,
};

/// Write `buf` to a sibling temporary file, then rename it over `path`.
///
/// Readers observe either the previous content or the new one, never a torn file.
pub fn write_atomic(path: &Path, buf: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    let mut file = File::create(&tmp)?;
    file.write_all(buf)?;
    file.sync_data()?;
    drop(file);

    rename(&tmp, path)
}

/// Remove a file, returns whether it existed.
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
