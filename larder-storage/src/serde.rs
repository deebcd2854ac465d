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

use bytes::Bytes;
use larder_common::{
    error::{Error, ErrorKind, Result},
    hasher::hash64,
};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct Checksummer;

impl Checksummer {
    pub fn checksum64(buf: &[u8]) -> u64 {
        hash64(buf)
    }
}

/// Layout of one value file.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    key: String,
    checksum: u64,
    value: Vec<u8>,
}

#[derive(Debug)]
pub struct RecordSerializer;

impl RecordSerializer {
    pub fn serialize(key: &str, value: &[u8]) -> Result<Vec<u8>> {
        let record = Record {
            key: key.to_string(),
            checksum: Checksummer::checksum64(value),
            value: value.to_vec(),
        };
        bincode::serialize(&record).map_err(Error::from)
    }
}

#[derive(Debug)]
pub struct RecordDeserializer;

impl RecordDeserializer {
    /// Decode a value file, verifying it belongs to `key` and is intact.
    pub fn deserialize(buf: &[u8], key: &str) -> Result<Bytes> {
        let record: Record = bincode::deserialize(buf).map_err(Error::from)?;

        if record.key != key {
            return Err(Error::new(ErrorKind::Codec, "value file belongs to another key")
                .with_context("expected", key)
                .with_context("get", record.key));
        }

        let get = Checksummer::checksum64(&record.value);
        if get != record.checksum {
            return Err(Error::checksum_mismatch(record.checksum, get));
        }

        Ok(Bytes::from(record.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let buf = RecordSerializer::serialize("forms.find_by_id:1", b"payload").unwrap();
        let value = RecordDeserializer::deserialize(&buf, "forms.find_by_id:1").unwrap();
        assert_eq!(&value[..], b"payload");

        let err = RecordDeserializer::deserialize(&buf, "forms.find_by_id:2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_corrupted_record() {
        let mut buf = RecordSerializer::serialize("k", b"payload").unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        let err = RecordDeserializer::deserialize(&buf, "k").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);

        assert!(RecordDeserializer::deserialize(&buf[..4], "k").is_err());
    }
}
