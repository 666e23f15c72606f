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

//! Random-access, little-endian byte storage shared by the heap and direct
//! variants of the Theta and Doubles quantiles sketches.
//!
//! A sketch that wants to support both a heap-resident representation and
//! an in-place ("direct") representation over caller-owned memory is
//! written once against the [`ByteStore`] trait, with `HeapByteStore` and
//! `SliceByteStore` supplying the two backings.

use crate::error::Error;

/// A fixed- or growable-capacity region of bytes addressed little-endian.
///
/// All accesses are bounds-checked and return `BufferTooSmall` rather than
/// panicking, since direct-mode sketches read directly from bytes a caller
/// could have truncated or corrupted.
pub trait ByteStore {
    /// Total number of bytes currently available.
    fn capacity(&self) -> usize;

    fn read_u8(&self, offset: usize) -> Result<u8, Error>;
    fn read_u16(&self, offset: usize) -> Result<u16, Error>;
    fn read_u32(&self, offset: usize) -> Result<u32, Error>;
    fn read_u64(&self, offset: usize) -> Result<u64, Error>;
    fn read_f64(&self, offset: usize) -> Result<f64, Error>;

    fn write_u8(&mut self, offset: usize, value: u8) -> Result<(), Error>;
    fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), Error>;
    fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), Error>;
    fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), Error>;
    fn write_f64(&mut self, offset: usize, value: f64) -> Result<(), Error>;

    /// Reads `len` consecutive `f64` values starting at `offset`.
    fn read_f64_array(&self, offset: usize, len: usize) -> Result<Vec<f64>, Error> {
        (0..len)
            .map(|i| self.read_f64(offset + i * 8))
            .collect()
    }

    /// Writes `values` as consecutive `f64`s starting at `offset`.
    fn write_f64_array(&mut self, offset: usize, values: &[f64]) -> Result<(), Error> {
        for (i, v) in values.iter().enumerate() {
            self.write_f64(offset + i * 8, *v)?;
        }
        Ok(())
    }

    /// Grows this store in place to at least `new_capacity` bytes,
    /// optionally preserving the current contents as a prefix.
    ///
    /// This mutates `self` rather than returning a new value: a `ByteStore`
    /// that cannot grow in its own representation (a borrowed fixed slice)
    /// always fails with `BufferTooSmall` instead, so callers that expect
    /// growth own a [`HeapByteStore`].
    fn request_grow(&mut self, new_capacity: usize, copy_existing: bool) -> Result<(), Error>;
}

fn check_bounds(capacity: usize, offset: usize, width: usize) -> Result<(), Error> {
    if offset.checked_add(width).map_or(true, |end| end > capacity) {
        Err(Error::buffer_too_small(offset + width, capacity))
    } else {
        Ok(())
    }
}

/// A heap-allocated, freely growable [`ByteStore`].
#[derive(Debug, Clone, Default)]
pub struct HeapByteStore {
    bytes: Vec<u8>,
}

impl HeapByteStore {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl ByteStore for HeapByteStore {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_u8(&self, offset: usize) -> Result<u8, Error> {
        check_bounds(self.capacity(), offset, 1)?;
        Ok(self.bytes[offset])
    }

    fn read_u16(&self, offset: usize) -> Result<u16, Error> {
        check_bounds(self.capacity(), offset, 2)?;
        Ok(u16::from_le_bytes(self.bytes[offset..offset + 2].try_into().unwrap()))
    }

    fn read_u32(&self, offset: usize) -> Result<u32, Error> {
        check_bounds(self.capacity(), offset, 4)?;
        Ok(u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap()))
    }

    fn read_u64(&self, offset: usize) -> Result<u64, Error> {
        check_bounds(self.capacity(), offset, 8)?;
        Ok(u64::from_le_bytes(self.bytes[offset..offset + 8].try_into().unwrap()))
    }

    fn read_f64(&self, offset: usize) -> Result<f64, Error> {
        Ok(f64::from_bits(self.read_u64(offset)?))
    }

    fn write_u8(&mut self, offset: usize, value: u8) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 1)?;
        self.bytes[offset] = value;
        Ok(())
    }

    fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 2)?;
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 4)?;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 8)?;
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_f64(&mut self, offset: usize, value: f64) -> Result<(), Error> {
        self.write_u64(offset, value.to_bits())
    }

    fn request_grow(&mut self, new_capacity: usize, copy_existing: bool) -> Result<(), Error> {
        if !copy_existing {
            self.bytes.clear();
        }
        self.bytes.resize(new_capacity.max(self.bytes.len()), 0);
        Ok(())
    }
}

/// A [`ByteStore`] borrowing a caller-owned, fixed-size byte slice.
///
/// Used for true zero-copy direct-mode sketches. `request_grow` always
/// fails: a borrowed slice has no way to become larger in place, so callers
/// that expect to grow must own a [`HeapByteStore`] instead.
pub struct SliceByteStore<'a> {
    bytes: &'a mut [u8],
}

impl<'a> SliceByteStore<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }
}

impl ByteStore for SliceByteStore<'_> {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_u8(&self, offset: usize) -> Result<u8, Error> {
        check_bounds(self.capacity(), offset, 1)?;
        Ok(self.bytes[offset])
    }

    fn read_u16(&self, offset: usize) -> Result<u16, Error> {
        check_bounds(self.capacity(), offset, 2)?;
        Ok(u16::from_le_bytes(self.bytes[offset..offset + 2].try_into().unwrap()))
    }

    fn read_u32(&self, offset: usize) -> Result<u32, Error> {
        check_bounds(self.capacity(), offset, 4)?;
        Ok(u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap()))
    }

    fn read_u64(&self, offset: usize) -> Result<u64, Error> {
        check_bounds(self.capacity(), offset, 8)?;
        Ok(u64::from_le_bytes(self.bytes[offset..offset + 8].try_into().unwrap()))
    }

    fn read_f64(&self, offset: usize) -> Result<f64, Error> {
        Ok(f64::from_bits(self.read_u64(offset)?))
    }

    fn write_u8(&mut self, offset: usize, value: u8) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 1)?;
        self.bytes[offset] = value;
        Ok(())
    }

    fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 2)?;
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 4)?;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_u64(&mut self, offset: usize, value: u64) -> Result<(), Error> {
        check_bounds(self.capacity(), offset, 8)?;
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_f64(&mut self, offset: usize, value: f64) -> Result<(), Error> {
        self.write_u64(offset, value.to_bits())
    }

    fn request_grow(&mut self, new_capacity: usize, _copy_existing: bool) -> Result<(), Error> {
        Err(Error::buffer_too_small(new_capacity, self.capacity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_store_round_trips() {
        let mut store = HeapByteStore::with_capacity(32);
        store.write_u64(0, 0xdead_beef).unwrap();
        store.write_f64(8, 3.25).unwrap();
        assert_eq!(store.read_u64(0).unwrap(), 0xdead_beef);
        assert_eq!(store.read_f64(8).unwrap(), 3.25);
    }

    #[test]
    fn heap_store_rejects_out_of_bounds() {
        let store = HeapByteStore::with_capacity(4);
        assert!(store.read_u64(0).is_err());
    }

    #[test]
    fn heap_store_grow_preserves_contents() {
        let mut store = HeapByteStore::with_capacity(8);
        store.write_u64(0, 42).unwrap();
        store.request_grow(16, true).unwrap();
        assert_eq!(store.capacity(), 16);
        assert_eq!(store.read_u64(0).unwrap(), 42);
    }

    #[test]
    fn slice_store_cannot_grow() {
        let mut buf = [0u8; 8];
        let mut store = SliceByteStore::new(&mut buf);
        assert!(store.request_grow(16, true).is_err());
    }

    #[test]
    fn slice_store_round_trips_f64_array() {
        let mut buf = [0u8; 32];
        let mut store = SliceByteStore::new(&mut buf);
        store.write_f64_array(0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(store.read_f64_array(0, 3).unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
