// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Pluggable per-item serialization for [`crate::varopt::VarOptSketch`],
//! mirroring the array-of-items serializers that generic reservoir and
//! VarOpt sketches take in the reference implementation: the sketch itself
//! only knows how many bytes an item's encoding consumed, not its layout.

use crate::error::Error;

/// Serializes and deserializes one item of type `T` to and from a flat
/// byte buffer. Implementors own their own framing (fixed-width, or
/// length-prefixed for variable-size items).
pub trait ArrayOfItemsSerDe<T> {
    /// Appends `item`'s encoding to `bytes`.
    fn serialize_into(&self, item: &T, bytes: &mut Vec<u8>);

    /// Decodes one item starting at `*offset`, advancing `*offset` past it.
    fn deserialize_from(&self, bytes: &[u8], offset: &mut usize) -> Result<T, Error>;
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], Error> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| Error::insufficient_data("item"))?;
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Fixed-width 8-byte little-endian `u64` items.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64SerDe;

impl ArrayOfItemsSerDe<u64> for U64SerDe {
    fn serialize_into(&self, item: &u64, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&item.to_le_bytes());
    }

    fn deserialize_from(&self, bytes: &[u8], offset: &mut usize) -> Result<u64, Error> {
        let slice = take(bytes, offset, 8)?;
        Ok(u64::from_le_bytes(slice.try_into().unwrap()))
    }
}

/// Fixed-width 8-byte little-endian `i64` items.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64SerDe;

impl ArrayOfItemsSerDe<i64> for I64SerDe {
    fn serialize_into(&self, item: &i64, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&item.to_le_bytes());
    }

    fn deserialize_from(&self, bytes: &[u8], offset: &mut usize) -> Result<i64, Error> {
        let slice = take(bytes, offset, 8)?;
        Ok(i64::from_le_bytes(slice.try_into().unwrap()))
    }
}

/// Fixed-width 8-byte little-endian `f64` items.
#[derive(Debug, Clone, Copy, Default)]
pub struct F64SerDe;

impl ArrayOfItemsSerDe<f64> for F64SerDe {
    fn serialize_into(&self, item: &f64, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&item.to_le_bytes());
    }

    fn deserialize_from(&self, bytes: &[u8], offset: &mut usize) -> Result<f64, Error> {
        let slice = take(bytes, offset, 8)?;
        Ok(f64::from_le_bytes(slice.try_into().unwrap()))
    }
}

/// Length-prefixed (4-byte little-endian length, then UTF-8 bytes) string
/// items.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerDe;

impl ArrayOfItemsSerDe<String> for StringSerDe {
    fn serialize_into(&self, item: &String, bytes: &mut Vec<u8>) {
        let utf8 = item.as_bytes();
        bytes.extend_from_slice(&(utf8.len() as u32).to_le_bytes());
        bytes.extend_from_slice(utf8);
    }

    fn deserialize_from(&self, bytes: &[u8], offset: &mut usize) -> Result<String, Error> {
        let len_bytes = take(bytes, offset, 4)?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let utf8 = take(bytes, offset, len)?;
        String::from_utf8(utf8.to_vec())
            .map_err(|e| Error::corrupt(format!("invalid UTF-8 string item: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trips() {
        let serde = U64SerDe;
        let mut bytes = Vec::new();
        serde.serialize_into(&42u64, &mut bytes);
        serde.serialize_into(&7u64, &mut bytes);
        let mut offset = 0;
        assert_eq!(serde.deserialize_from(&bytes, &mut offset).unwrap(), 42u64);
        assert_eq!(serde.deserialize_from(&bytes, &mut offset).unwrap(), 7u64);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn string_round_trips_with_varying_lengths() {
        let serde = StringSerDe;
        let mut bytes = Vec::new();
        serde.serialize_into(&"hello".to_string(), &mut bytes);
        serde.serialize_into(&"".to_string(), &mut bytes);
        serde.serialize_into(&"world!".to_string(), &mut bytes);
        let mut offset = 0;
        assert_eq!(serde.deserialize_from(&bytes, &mut offset).unwrap(), "hello");
        assert_eq!(serde.deserialize_from(&bytes, &mut offset).unwrap(), "");
        assert_eq!(serde.deserialize_from(&bytes, &mut offset).unwrap(), "world!");
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let serde = U64SerDe;
        let bytes = [0u8; 4];
        let mut offset = 0;
        assert!(serde.deserialize_from(&bytes, &mut offset).is_err());
    }
}
