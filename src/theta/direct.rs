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

//! The direct-mode Theta sketch: the same updatable layout as
//! [`crate::theta::sketch::ThetaSketch`], but read and written in place
//! over a caller-supplied [`ByteStore`] instead of an owned `Vec<u8>`.
//!
//! A [`DirectThetaSketch`]'s bytes are valid input to
//! [`crate::theta::sketch::ThetaSketch::deserialize`] and vice versa:
//! both lay the 3-long preamble at offset 0 followed immediately by the
//! full hash array.

use crate::codec::family::Family;
use crate::common::ResizeFactor;
use crate::common::byte_store::ByteStore;
use crate::common::canonical_double;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::MurmurHash3X64128;
use crate::hash::compute_seed_hash;
use crate::theta::compact::CompactThetaSketch;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::hash_table::REBUILD_THRESHOLD;
use crate::theta::hash_table::UpdateResult;
use crate::theta::hash_table::get_stride;
use crate::theta::hash_table::starting_sub_multiple;
use crate::theta::hash_table::starting_theta_from_sampling_probability;
use crate::theta::serialization::FLAG_BIG_ENDIAN;
use crate::theta::serialization::FLAG_EMPTY;
use crate::theta::serialization::PREAMBLE_LONGS_ESTIMATION;
use crate::theta::serialization::SERIAL_VERSION;
use std::hash::Hash;

const OFFSET_PRE_LONGS: usize = 0;
const OFFSET_SER_VER: usize = 1;
const OFFSET_FAMILY: usize = 2;
const OFFSET_LG_NOM: usize = 3;
const OFFSET_LG_ARR: usize = 4;
const OFFSET_FLAGS: usize = 5;
const OFFSET_SEED_HASH: usize = 6;
const OFFSET_COUNT: usize = 8;
const OFFSET_THETA: usize = 16;
const OFFSET_TABLE: usize = 24;

fn table_bytes(lg_arr: u8) -> usize {
    OFFSET_TABLE + (1usize << lg_arr) * 8
}

/// A Theta sketch whose hash table and header live in a caller-supplied
/// [`ByteStore`] rather than an owned `Vec<u8>`.
pub struct DirectThetaSketch<S: ByteStore> {
    store: S,
    resize_factor: ResizeFactor,
    hash_seed: u64,
}

impl<S: ByteStore> DirectThetaSketch<S> {
    /// Initializes a fresh sketch's header and zeroed table into `store`,
    /// which must already have at least enough capacity for the starting
    /// table (`request_grow` is only consulted later, on resize).
    pub fn new(
        mut store: S,
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Result<Self, Error> {
        let lg_arr = starting_sub_multiple(lg_nom_size + 1, DEFAULT_LG_K.min(lg_nom_size), resize_factor.lg_value());
        let needed = table_bytes(lg_arr);
        if store.capacity() < needed {
            return Err(Error::buffer_too_small(needed, store.capacity()));
        }

        store.write_u8(OFFSET_PRE_LONGS, PREAMBLE_LONGS_ESTIMATION)?;
        store.write_u8(OFFSET_SER_VER, SERIAL_VERSION)?;
        store.write_u8(OFFSET_FAMILY, Family::THETA.id)?;
        store.write_u8(OFFSET_LG_NOM, lg_nom_size)?;
        store.write_u8(OFFSET_LG_ARR, lg_arr)?;
        store.write_u8(OFFSET_FLAGS, FLAG_EMPTY)?;
        store.write_u16(OFFSET_SEED_HASH, compute_seed_hash(hash_seed))?;
        store.write_u32(OFFSET_COUNT, 0)?;
        store.write_u64(OFFSET_THETA, starting_theta_from_sampling_probability(sampling_probability))?;
        for i in 0..(1usize << lg_arr) {
            store.write_u64(OFFSET_TABLE + i * 8, 0)?;
        }

        Ok(Self {
            store,
            resize_factor,
            hash_seed,
        })
    }

    /// Wraps an already-initialized store, validating its preamble.
    pub fn wrap(store: S, hash_seed: u64) -> Result<Self, Error> {
        Self::wrap_with_resize_factor(store, hash_seed, ResizeFactor::X8)
    }

    pub fn wrap_with_resize_factor(
        store: S,
        hash_seed: u64,
        resize_factor: ResizeFactor,
    ) -> Result<Self, Error> {
        let pre_longs = store.read_u8(OFFSET_PRE_LONGS)?;
        let ser_ver = store.read_u8(OFFSET_SER_VER)?;
        let family_id = store.read_u8(OFFSET_FAMILY)?;
        Family::THETA.validate_id(family_id)?;
        if ser_ver != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, ser_ver));
        }
        if pre_longs != PREAMBLE_LONGS_ESTIMATION {
            return Err(Error::corrupt(format!(
                "updatable theta sketches always carry a {PREAMBLE_LONGS_ESTIMATION}-long preamble, got {pre_longs}"
            )));
        }
        let flags = store.read_u8(OFFSET_FLAGS)?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }
        let seed_hash = store.read_u16(OFFSET_SEED_HASH)?;
        let expected = compute_seed_hash(hash_seed);
        if seed_hash != expected {
            return Err(Error::seed_mismatch(expected, seed_hash));
        }

        Ok(Self {
            store,
            resize_factor,
            hash_seed,
        })
    }

    fn lg_nom_size(&self) -> u8 {
        self.store.read_u8(OFFSET_LG_NOM).unwrap_or(0)
    }

    fn lg_arr(&self) -> u8 {
        self.store.read_u8(OFFSET_LG_ARR).unwrap_or(0)
    }

    fn theta(&self) -> u64 {
        self.store.read_u64(OFFSET_THETA).unwrap_or(MAX_THETA)
    }

    fn set_theta(&mut self, theta: u64) -> Result<(), Error> {
        self.store.write_u64(OFFSET_THETA, theta)
    }

    pub fn num_retained(&self) -> usize {
        self.store.read_u32(OFFSET_COUNT).unwrap_or(0) as usize
    }

    fn set_num_retained(&mut self, count: usize) -> Result<(), Error> {
        self.store.write_u32(OFFSET_COUNT, count as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.store
            .read_u8(OFFSET_FLAGS)
            .map(|flags| flags & FLAG_EMPTY != 0)
            .unwrap_or(true)
    }

    fn set_empty(&mut self, is_empty: bool) -> Result<(), Error> {
        let flags = self.store.read_u8(OFFSET_FLAGS)?;
        let flags = if is_empty {
            flags | FLAG_EMPTY
        } else {
            flags & !FLAG_EMPTY
        };
        self.store.write_u8(OFFSET_FLAGS, flags)
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.theta() < MAX_THETA
    }

    pub fn estimate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else if self.is_estimation_mode() {
            self.num_retained() as f64 * MAX_THETA as f64 / self.theta() as f64
        } else {
            self.num_retained() as f64
        }
    }

    fn find(&self, hash: u64) -> Result<Result<usize, usize>, Error> {
        let lg_arr = self.lg_arr();
        let len = 1usize << lg_arr;
        let mask = (len as u64) - 1;
        let stride = get_stride(hash, lg_arr);
        let loop_index = (hash & mask) as usize;
        let mut i = loop_index;
        loop {
            let probed = self.store.read_u64(OFFSET_TABLE + i * 8)?;
            if probed == 0 {
                return Ok(Err(i));
            }
            if probed == hash {
                return Ok(Ok(i));
            }
            i = (i + stride) & (len - 1);
            if i == loop_index {
                return Ok(Err(i));
            }
        }
    }

    pub fn update<T: Hash>(&mut self, value: T) -> Result<UpdateResult, Error> {
        let hash = MurmurHash3X64128::with_seed(self.hash_seed).hash(value);
        self.update_hash(hash)
    }

    pub fn update_f64(&mut self, value: f64) -> Result<UpdateResult, Error> {
        self.update_hash(
            MurmurHash3X64128::with_seed(self.hash_seed).hash(canonical_double(value).to_bits()),
        )
    }

    pub fn update_hash(&mut self, hash: u64) -> Result<UpdateResult, Error> {
        self.set_empty(false)?;
        if hash == 0 {
            return Ok(UpdateResult::RejectedNull);
        }
        if hash >= self.theta() {
            return Ok(UpdateResult::RejectedOverTheta);
        }

        match self.find(hash)? {
            Ok(_) => Ok(UpdateResult::RejectedDuplicate),
            Err(slot) => {
                self.store.write_u64(OFFSET_TABLE + slot * 8, hash)?;
                let new_count = self.num_retained() + 1;
                self.set_num_retained(new_count)?;

                let lg_arr = self.lg_arr();
                let lg_nom = self.lg_nom_size();
                let threshold = if lg_arr <= lg_nom { 0.5 } else { REBUILD_THRESHOLD };
                if new_count as f64 > threshold * (1usize << lg_arr) as f64 {
                    if lg_arr <= lg_nom {
                        self.resize()?;
                    } else {
                        self.rebuild()?;
                    }
                }

                if hash >= self.theta() {
                    Ok(UpdateResult::InsertedCountNotIncremented)
                } else {
                    Ok(UpdateResult::InsertedCountIncremented)
                }
            }
        }
    }

    fn resize(&mut self) -> Result<(), Error> {
        let lg_arr = self.lg_arr();
        let lg_nom = self.lg_nom_size();
        let lg_growth = self.resize_factor.lg_value().max(1);
        let new_lg_arr = (lg_arr + lg_growth).min(lg_nom + 1);
        if new_lg_arr == lg_arr {
            return self.rebuild();
        }

        let old_entries = self.read_all_entries()?;
        self.store.request_grow(table_bytes(new_lg_arr), true)?;
        self.write_fresh_table(new_lg_arr, &old_entries)
    }

    fn rebuild(&mut self) -> Result<(), Error> {
        let nominal = 1usize << self.lg_nom_size();
        let mut retained = self.read_all_entries()?;

        if retained.len() > nominal {
            retained.select_nth_unstable(nominal);
            let new_theta = retained[nominal];
            retained.truncate(nominal);
            self.set_theta(new_theta)?;
        }

        let lg_arr = ((retained.len().max(1) as f64 / REBUILD_THRESHOLD).log2().ceil() as u8)
            .max(self.lg_nom_size().min(DEFAULT_LG_K));
        self.store.request_grow(table_bytes(lg_arr), true)?;
        self.write_fresh_table(lg_arr, &retained)
    }

    /// Rewrites the table region in place at the (possibly new) `lg_arr`
    /// size, re-inserting `entries` by the standard probing sequence.
    /// `request_grow` has already resized `self.store`; the header fields
    /// it preserved (everything before `OFFSET_TABLE`) are left untouched
    /// except `lgArrLongs` and `curCount`.
    fn write_fresh_table(&mut self, lg_arr: u8, entries: &[u64]) -> Result<(), Error> {
        self.store.write_u8(OFFSET_LG_ARR, lg_arr)?;

        for i in 0..(1usize << lg_arr) {
            self.store.write_u64(OFFSET_TABLE + i * 8, 0)?;
        }
        let mask = (1usize << lg_arr) - 1;
        let mut num_inserted = 0usize;
        for &hash in entries {
            let stride = get_stride(hash, lg_arr);
            let mut i = (hash as usize) & mask;
            loop {
                if self.store.read_u64(OFFSET_TABLE + i * 8)? == 0 {
                    self.store.write_u64(OFFSET_TABLE + i * 8, hash)?;
                    num_inserted += 1;
                    break;
                }
                i = (i + stride) & mask;
            }
        }
        self.store.write_u32(OFFSET_COUNT, num_inserted as u32)?;
        Ok(())
    }

    fn read_all_entries(&self) -> Result<Vec<u64>, Error> {
        let lg_arr = self.lg_arr();
        let mut out = Vec::new();
        for i in 0..(1usize << lg_arr) {
            let hash = self.store.read_u64(OFFSET_TABLE + i * 8)?;
            if hash != 0 {
                out.push(hash);
            }
        }
        Ok(out)
    }

    pub fn compact(&self, ordered: bool) -> Result<CompactThetaSketch, Error> {
        let mut entries = self.read_all_entries()?;
        if ordered {
            entries.sort_unstable();
        }
        let seed_hash = self.store.read_u16(OFFSET_SEED_HASH)?;
        Ok(CompactThetaSketch::new(
            self.theta(),
            entries,
            seed_hash,
            self.is_empty(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::byte_store::HeapByteStore;

    fn new_direct(lg_nom: u8) -> DirectThetaSketch<HeapByteStore> {
        let store = HeapByteStore::with_capacity(table_bytes(lg_nom + 4));
        DirectThetaSketch::new(store, lg_nom, ResizeFactor::X8, 1.0, DEFAULT_UPDATE_SEED).unwrap()
    }

    #[test]
    fn starts_empty() {
        let sketch = new_direct(8);
        assert!(sketch.is_empty());
        assert_eq!(sketch.estimate(), 0.0);
    }

    #[test]
    fn basic_update_and_estimate() {
        let mut sketch = new_direct(8);
        sketch.update(1u64).unwrap();
        sketch.update(2u64).unwrap();
        sketch.update(2u64).unwrap();
        assert_eq!(sketch.num_retained(), 2);
        assert_eq!(sketch.estimate(), 2.0);
    }

    #[test]
    fn matches_heap_sketch_for_identical_updates() {
        use crate::theta::sketch::ThetaSketch;

        let mut heap = ThetaSketch::builder().lg_k(8).seed(DEFAULT_UPDATE_SEED).build();
        let mut direct = new_direct(8);
        for i in 0..100u64 {
            heap.update(i);
            direct.update(i).unwrap();
        }
        assert_eq!(heap.num_retained(), direct.num_retained());
        assert_eq!(heap.estimate(), direct.estimate());
    }

    #[test]
    fn compact_round_trips_through_heap_deserialize() {
        let mut direct = new_direct(8);
        for i in 0..20u64 {
            direct.update(i).unwrap();
        }
        let compact = direct.compact(true).unwrap();
        let bytes = compact.serialize(true);
        let restored = CompactThetaSketch::deserialize(&bytes).unwrap();
        assert_eq!(restored.num_retained(), compact.num_retained());
    }
}
