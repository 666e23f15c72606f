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

//! The direct-mode Doubles quantiles sketch: the same algorithm as
//! [`crate::quantiles::sketch::DoublesSketch`], but with the base buffer,
//! min/max and every level stored at fixed offsets in a caller-supplied
//! [`ByteStore`] instead of owned `Vec`s.
//!
//! Unlike the heap sketch's compact wire form, the direct layout always
//! carries `N`, min and max at fixed offsets regardless of emptiness, and
//! reserves a full `2k`-item base buffer slot up front: this is the same
//! trade (fixed offsets over a minimal byte count) [`crate::theta::direct`]
//! makes for its own always-updatable layout.

use crate::codec::family::Family;
use crate::common::byte_store::ByteStore;
use crate::common::random::RandomSource;
use crate::error::Error;
use crate::quantiles::helper;
use crate::quantiles::serialization::FLAG_BIG_ENDIAN;
use crate::quantiles::serialization::FLAG_EMPTY;
use crate::quantiles::serialization::PREAMBLE_LONGS_NON_EMPTY;
use crate::quantiles::serialization::SERIAL_VERSION;
use crate::quantiles::sorted_view::SortedView;

const OFFSET_PRE_LONGS: usize = 0;
const OFFSET_SER_VER: usize = 1;
const OFFSET_FAMILY: usize = 2;
const OFFSET_FLAGS: usize = 3;
const OFFSET_K: usize = 4;
const OFFSET_N: usize = 8;
const OFFSET_MIN: usize = 16;
const OFFSET_MAX: usize = 24;
const OFFSET_DATA: usize = 32;

fn level_region_offset(k: usize) -> usize {
    OFFSET_DATA + 2 * k * 8
}

fn level_offset(k: usize, level: usize) -> usize {
    level_region_offset(k) + level * k * 8
}

fn num_levels_for_bit_pattern(bit_pattern: u64) -> usize {
    if bit_pattern == 0 {
        0
    } else {
        64 - bit_pattern.leading_zeros() as usize
    }
}

/// A Doubles quantiles sketch whose base buffer and levels live in a
/// caller-supplied [`ByteStore`] rather than owned `Vec`s.
pub struct DirectDoublesSketch<S: ByteStore> {
    store: S,
    rng: Box<dyn RandomSource>,
}

impl<S: ByteStore> DirectDoublesSketch<S> {
    /// Initializes a fresh, empty sketch's header into `store`, which must
    /// already have room for at least an empty base buffer.
    pub fn new(mut store: S, k: u16, rng: Box<dyn RandomSource>) -> Result<Self, Error> {
        let needed = level_offset(k as usize, 0);
        if store.capacity() < needed {
            return Err(Error::buffer_too_small(needed, store.capacity()));
        }

        store.write_u8(OFFSET_PRE_LONGS, PREAMBLE_LONGS_NON_EMPTY)?;
        store.write_u8(OFFSET_SER_VER, SERIAL_VERSION)?;
        store.write_u8(OFFSET_FAMILY, Family::QUANTILES.id)?;
        store.write_u8(OFFSET_FLAGS, FLAG_EMPTY)?;
        store.write_u16(OFFSET_K, k)?;
        store.write_u64(OFFSET_N, 0)?;
        store.write_f64(OFFSET_MIN, f64::INFINITY)?;
        store.write_f64(OFFSET_MAX, f64::NEG_INFINITY)?;

        Ok(Self { store, rng })
    }

    /// Wraps an already-initialized store, validating its header.
    pub fn wrap(store: S, rng: Box<dyn RandomSource>) -> Result<Self, Error> {
        let pre_longs = store.read_u8(OFFSET_PRE_LONGS)?;
        let ser_ver = store.read_u8(OFFSET_SER_VER)?;
        let family_id = store.read_u8(OFFSET_FAMILY)?;
        Family::QUANTILES.validate_id(family_id)?;
        if ser_ver != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, ser_ver));
        }
        if pre_longs != PREAMBLE_LONGS_NON_EMPTY {
            return Err(Error::corrupt(format!(
                "direct quantiles sketches always carry a {PREAMBLE_LONGS_NON_EMPTY}-long preamble, got {pre_longs}"
            )));
        }
        let flags = store.read_u8(OFFSET_FLAGS)?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }

        Ok(Self { store, rng })
    }

    pub fn k(&self) -> u16 {
        self.store.read_u16(OFFSET_K).unwrap_or(0)
    }

    pub fn n(&self) -> u64 {
        self.store.read_u64(OFFSET_N).unwrap_or(0)
    }

    fn set_n(&mut self, n: u64) -> Result<(), Error> {
        self.store.write_u64(OFFSET_N, n)
    }

    pub fn is_empty(&self) -> bool {
        self.n() == 0
    }

    fn set_non_empty(&mut self) -> Result<(), Error> {
        let flags = self.store.read_u8(OFFSET_FLAGS)?;
        self.store.write_u8(OFFSET_FLAGS, flags & !FLAG_EMPTY)
    }

    pub fn min_value(&self) -> f64 {
        self.store.read_f64(OFFSET_MIN).unwrap_or(f64::INFINITY)
    }

    pub fn max_value(&self) -> f64 {
        self.store.read_f64(OFFSET_MAX).unwrap_or(f64::NEG_INFINITY)
    }

    /// `N / (2k)`, whose set bits mark which levels are occupied.
    pub fn bit_pattern(&self) -> u64 {
        self.n() / (2 * self.k() as u64)
    }

    fn base_buffer_len(&self) -> usize {
        (self.n() % (2 * self.k() as u64)) as usize
    }

    pub fn num_retained(&self) -> usize {
        self.base_buffer_len() + self.bit_pattern().count_ones() as usize * self.k() as usize
    }

    /// Appends `value` to the sketch, carrying a full base buffer upward
    /// through the level hierarchy on overflow. NaN is silently dropped.
    pub fn update(&mut self, value: f64) -> Result<(), Error> {
        if value.is_nan() {
            return Ok(());
        }
        if value < self.min_value() {
            self.store.write_f64(OFFSET_MIN, value)?;
        }
        if value > self.max_value() {
            self.store.write_f64(OFFSET_MAX, value)?;
        }
        self.set_non_empty()?;

        let k = self.k() as usize;
        let bb_len = self.base_buffer_len();
        self.store.write_f64(OFFSET_DATA + bb_len * 8, value)?;
        let n = self.n() + 1;
        self.set_n(n)?;

        if (n % (2 * k as u64)) == 0 {
            let mut sorted = self.store.read_f64_array(OFFSET_DATA, 2 * k)?;
            sorted.sort_by(|a, b| a.partial_cmp(b).expect("quantiles items must not be NaN"));
            self.propagate_carry(&sorted)?;
        }
        Ok(())
    }

    fn propagate_carry(&mut self, sorted_base: &[f64]) -> Result<(), Error> {
        let k = self.k() as usize;
        let m = self.n() / (2 * k as u64);
        let prior_bit_pattern = m - 1;

        let mut carry = helper::downsample_by_parity(sorted_base, self.rng.as_mut());
        let mut level = 0usize;
        loop {
            let needed = level_offset(k, level + 1);
            if self.store.capacity() < needed {
                self.store.request_grow(needed, true)?;
            }
            let occupied = prior_bit_pattern & (1u64 << level) != 0;
            if !occupied {
                self.store.write_f64_array(level_offset(k, level), &carry)?;
                break;
            }
            let existing = self.store.read_f64_array(level_offset(k, level), k)?;
            let merged = helper::merge_sorted(&existing, &carry);
            carry = helper::downsample_by_parity(&merged, self.rng.as_mut());
            level += 1;
        }
        Ok(())
    }

    fn sorted_view(&self) -> Result<SortedView, Error> {
        let k = self.k() as usize;
        let base_buffer = self.store.read_f64_array(OFFSET_DATA, self.base_buffer_len())?;
        let bit_pattern = self.bit_pattern();
        let num_levels = num_levels_for_bit_pattern(bit_pattern);
        let mut levels = Vec::with_capacity(num_levels);
        for level in 0..num_levels {
            if bit_pattern & (1u64 << level) != 0 {
                levels.push(self.store.read_f64_array(level_offset(k, level), k)?);
            } else {
                levels.push(Vec::new());
            }
        }
        Ok(SortedView::build(&base_buffer, &levels))
    }

    /// # Panics
    ///
    /// Panics if `rank` is outside `[0.0, 1.0]`.
    pub fn get_quantile(&self, rank: f64) -> Result<f64, Error> {
        assert!(
            (0.0..=1.0).contains(&rank),
            "rank must be in [0.0, 1.0], got {rank}"
        );
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        if rank == 0.0 {
            return Ok(self.min_value());
        }
        if rank == 1.0 {
            return Ok(self.max_value());
        }
        Ok(self.sorted_view()?.quantile(rank, true))
    }

    pub fn get_rank(&self, value: f64) -> Result<f64, Error> {
        Ok(self.sorted_view()?.rank(value, true))
    }

    pub fn get_pmf(&self, split_points: &[f64]) -> Result<Vec<f64>, Error> {
        Ok(self.sorted_view()?.pmf(split_points, true))
    }

    pub fn get_cdf(&self, split_points: &[f64]) -> Result<Vec<f64>, Error> {
        Ok(self.sorted_view()?.cdf(split_points, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::byte_store::HeapByteStore;
    use crate::common::random::XorShift64;

    fn new_direct(k: u16) -> DirectDoublesSketch<HeapByteStore> {
        let store = HeapByteStore::with_capacity(level_offset(k as usize, 4));
        DirectDoublesSketch::new(store, k, Box::new(XorShift64::seeded(11))).unwrap()
    }

    #[test]
    fn starts_empty() {
        let sketch = new_direct(8);
        assert!(sketch.is_empty());
        assert_eq!(sketch.n(), 0);
    }

    #[test]
    fn matches_heap_sketch_for_identical_updates() {
        use crate::quantiles::sketch::DoublesSketch;

        let mut heap = DoublesSketch::builder().k(8).rng(XorShift64::seeded(11)).build();
        let mut direct = new_direct(8);
        for i in 1..=500u64 {
            heap.update(i as f64);
            direct.update(i as f64).unwrap();
        }
        assert_eq!(heap.n(), direct.n());
        assert_eq!(heap.min_value(), direct.min_value());
        assert_eq!(heap.max_value(), direct.max_value());
        assert_eq!(heap.bit_pattern(), direct.bit_pattern());
        assert_eq!(heap.num_retained(), direct.num_retained());
        assert_eq!(heap.get_quantile(0.5), direct.get_quantile(0.5).unwrap());
    }

    #[test]
    fn wrap_validates_family_id() {
        let mut store = HeapByteStore::with_capacity(level_offset(8, 4));
        store.write_u8(OFFSET_PRE_LONGS, PREAMBLE_LONGS_NON_EMPTY).unwrap();
        store.write_u8(OFFSET_SER_VER, SERIAL_VERSION).unwrap();
        store.write_u8(OFFSET_FAMILY, 99).unwrap();
        assert!(DirectDoublesSketch::wrap(store, Box::new(XorShift64::seeded(1))).is_err());
    }
}
