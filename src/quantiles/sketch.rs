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

//! The heap-resident, updatable Doubles quantiles sketch.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::common::random::RandomSource;
use crate::common::random::XorShift64;
use crate::error::Error;
use crate::quantiles::DEFAULT_K;
use crate::quantiles::MAX_K;
use crate::quantiles::MIN_K;
use crate::quantiles::helper;
use crate::quantiles::serialization::FLAG_BIG_ENDIAN;
use crate::quantiles::serialization::FLAG_EMPTY;
use crate::quantiles::serialization::PREAMBLE_LONGS_EMPTY;
use crate::quantiles::serialization::PREAMBLE_LONGS_NON_EMPTY;
use crate::quantiles::serialization::SERIAL_VERSION;
use crate::quantiles::sorted_view::SortedView;

/// Builder for [`DoublesSketch`], validated at construction time.
pub struct DoublesSketchBuilder {
    k: u16,
    rng: Box<dyn RandomSource>,
}

impl Default for DoublesSketchBuilder {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            rng: Box::new(XorShift64::default()),
        }
    }
}

impl DoublesSketchBuilder {
    /// Sets `k`, the number of items retained per level. Must be a power
    /// of two in `[2, 2^15]`: larger `k` trades memory for accuracy.
    pub fn k(mut self, k: u16) -> Self {
        assert!(
            k.is_power_of_two() && (MIN_K..=MAX_K).contains(&k),
            "k must be a power of two in [{MIN_K}, {MAX_K}], got {k}"
        );
        self.k = k;
        self
    }

    /// Supplies the random source driving the random-parity down-sample.
    /// Two builders seeded with identical RNGs produce byte-identical
    /// sketches for identical update sequences.
    pub fn rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Builds the sketch.
    pub fn build(self) -> DoublesSketch {
        DoublesSketch {
            k: self.k,
            n: 0,
            base_buffer: Vec::with_capacity(2 * self.k as usize),
            levels: Vec::new(),
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            rng: self.rng,
        }
    }
}

/// A heap-resident Doubles quantiles sketch.
///
/// Retains `N mod 2k` items in an unsorted base buffer plus, for every set
/// bit of `bitPattern = N / (2k)`, exactly `k` sorted items at that level.
/// A full base buffer is sorted and carried upward through the level
/// hierarchy exactly like incrementing a binary counter: a level that is
/// already occupied gets merged with the incoming run and down-sampled
/// back to `k`, with the result carried one level higher.
pub struct DoublesSketch {
    k: u16,
    n: u64,
    base_buffer: Vec<f64>,
    levels: Vec<Vec<f64>>,
    min_value: f64,
    max_value: f64,
    rng: Box<dyn RandomSource>,
}

impl DoublesSketch {
    /// Starts a [`DoublesSketchBuilder`] with default parameters.
    pub fn builder() -> DoublesSketchBuilder {
        DoublesSketchBuilder::default()
    }

    pub fn k(&self) -> u16 {
        self.k
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of items currently retained across the base buffer and all
    /// occupied levels: `(N mod 2k) + k * popcount(bitPattern)`.
    pub fn num_retained(&self) -> usize {
        self.base_buffer.len() + self.levels.iter().map(|l| l.len()).sum::<usize>()
    }

    /// `N / (2k)`, whose set bits mark which levels are occupied.
    pub fn bit_pattern(&self) -> u64 {
        self.n / (2 * self.k as u64)
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Heuristic relative-rank error bound at the given confidence
    /// `1 - delta`, `epsilon ~= 1.65 * sqrt(ln(1/delta)) / k`.
    pub fn normalized_rank_error(&self, delta: f64) -> f64 {
        helper::normalized_rank_error(self.k, delta)
    }

    /// Updates the sketch with a value. NaN is silently dropped, matching
    /// the documented policy for quantile inputs.
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        if value < self.min_value {
            self.min_value = value;
        }
        if value > self.max_value {
            self.max_value = value;
        }

        self.base_buffer.push(value);
        self.n += 1;

        if self.base_buffer.len() == 2 * self.k as usize {
            let mut sorted = std::mem::take(&mut self.base_buffer);
            sorted.sort_by(|a, b| a.partial_cmp(b).expect("quantiles items must not be NaN"));
            self.base_buffer = Vec::with_capacity(2 * self.k as usize);
            self.propagate_carry(sorted);
        }
    }

    /// Carries a freshly sorted, full `2k` base buffer up through the
    /// level hierarchy like a binary counter increment: the buffer is
    /// down-sampled to `k` first, and each occupied level it collides with
    /// is merged with the carry and re-down-sampled, continuing one level
    /// higher, until it lands on an empty level.
    fn propagate_carry(&mut self, sorted_base: Vec<f64>) {
        let mut carry = helper::downsample_by_parity(&sorted_base, self.rng.as_mut());
        let mut level = 0usize;
        loop {
            if level == self.levels.len() {
                self.levels.push(Vec::new());
            }
            if self.levels[level].is_empty() {
                self.levels[level] = carry;
                break;
            }
            let existing = std::mem::take(&mut self.levels[level]);
            let merged = helper::merge_sorted(&existing, &carry);
            carry = helper::downsample_by_parity(&merged, self.rng.as_mut());
            level += 1;
        }
    }

    fn sorted_view(&self) -> SortedView {
        SortedView::build(&self.base_buffer, &self.levels)
    }

    /// The item whose cumulative weight in the weighted empirical
    /// distribution crosses `rank * N`. Exact at the extremes: `rank ==
    /// 0.0` returns [`Self::min_value`], `rank == 1.0` returns
    /// [`Self::max_value`], regardless of sampling error elsewhere.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is outside `[0.0, 1.0]`.
    pub fn get_quantile(&self, rank: f64) -> f64 {
        assert!(
            (0.0..=1.0).contains(&rank),
            "rank must be in [0.0, 1.0], got {rank}"
        );
        if self.is_empty() {
            return f64::NAN;
        }
        if rank == 0.0 {
            return self.min_value;
        }
        if rank == 1.0 {
            return self.max_value;
        }
        self.sorted_view().quantile(rank, true)
    }

    /// Fraction of the weighted empirical distribution at or below `value`.
    pub fn get_rank(&self, value: f64) -> f64 {
        self.sorted_view().rank(value, true)
    }

    /// Probability mass in each bucket `(-inf, s0], (s0, s1], ..., (sn,
    /// inf)` for strictly increasing split points `s0 < s1 < ... < sn`.
    pub fn get_pmf(&self, split_points: &[f64]) -> Vec<f64> {
        self.sorted_view().pmf(split_points, true)
    }

    /// Cumulative mass at or below each split point.
    pub fn get_cdf(&self, split_points: &[f64]) -> Vec<f64> {
        self.sorted_view().cdf(split_points, true)
    }

    /// Serializes the sketch: a 1-long preamble when empty, else a 2-long
    /// preamble (header + `N`) followed by min, max, the base buffer
    /// as-is, then every occupied level's sorted contents in ascending
    /// level order.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.is_empty();
        let pre_longs = if is_empty {
            PREAMBLE_LONGS_EMPTY
        } else {
            PREAMBLE_LONGS_NON_EMPTY
        };
        let flags = if is_empty { FLAG_EMPTY } else { 0 };

        let mut bytes = SketchBytes::with_capacity(32 + self.num_retained() * 8);
        bytes.write_u8(pre_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::QUANTILES.id);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.k);
        bytes.write_u16_le(0); // reserved

        if is_empty {
            return bytes.into_bytes();
        }

        bytes.write_u64_le(self.n);
        bytes.write_f64_le(self.min_value);
        bytes.write_f64_le(self.max_value);

        for &v in &self.base_buffer {
            bytes.write_f64_le(v);
        }
        for level in &self.levels {
            for &v in level {
                bytes.write_f64_le(v);
            }
        }

        bytes.into_bytes()
    }

    /// Deserializes a sketch, using a freshly seeded default RNG for any
    /// subsequent updates.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_rng(bytes, Box::new(XorShift64::default()))
    }

    pub fn deserialize_with_rng(bytes: &[u8], rng: Box<dyn RandomSource>) -> Result<Self, Error> {
        let mut slice = SketchSlice::new(bytes);

        let pre_longs = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("preLongs"))?;
        let ser_ver = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("serVer"))?;
        let family_id = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("familyId"))?;
        Family::QUANTILES.validate_id(family_id)?;
        if ser_ver != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, ser_ver));
        }

        let flags = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("flags"))?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }
        let k = slice
            .read_u16_le()
            .map_err(|_| Error::insufficient_data("k"))?;
        let _reserved = slice.read_u16_le();

        if flags & FLAG_EMPTY != 0 {
            return Ok(DoublesSketch {
                k,
                n: 0,
                base_buffer: Vec::new(),
                levels: Vec::new(),
                min_value: f64::INFINITY,
                max_value: f64::NEG_INFINITY,
                rng,
            });
        }
        if pre_longs != PREAMBLE_LONGS_NON_EMPTY {
            return Err(Error::corrupt(format!(
                "non-empty quantiles sketches carry a {PREAMBLE_LONGS_NON_EMPTY}-long preamble, got {pre_longs}"
            )));
        }

        let n = slice
            .read_u64_le()
            .map_err(|_| Error::insufficient_data("N"))?;
        let min_value = slice
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("minValue"))?;
        let max_value = slice
            .read_f64_le()
            .map_err(|_| Error::insufficient_data("maxValue"))?;

        let two_k = 2 * k as u64;
        let bb_count = (n % two_k) as usize;
        let mut base_buffer = Vec::with_capacity(bb_count);
        for _ in 0..bb_count {
            base_buffer.push(
                slice
                    .read_f64_le()
                    .map_err(|_| Error::insufficient_data("base buffer item"))?,
            );
        }

        let bit_pattern = n / two_k;
        let num_levels = if bit_pattern == 0 {
            0
        } else {
            64 - bit_pattern.leading_zeros() as usize
        };
        let mut levels = Vec::with_capacity(num_levels);
        for level in 0..num_levels {
            if bit_pattern & (1u64 << level) != 0 {
                let mut items = Vec::with_capacity(k as usize);
                for _ in 0..k {
                    items.push(
                        slice
                            .read_f64_le()
                            .map_err(|_| Error::insufficient_data("level item"))?,
                    );
                }
                levels.push(items);
            } else {
                levels.push(Vec::new());
            }
        }

        Ok(DoublesSketch {
            k,
            n,
            base_buffer,
            levels,
            min_value,
            max_value,
            rng,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::random::XorShift64;

    #[test]
    fn default_builder_produces_empty_sketch() {
        let sketch = DoublesSketch::builder().build();
        assert!(sketch.is_empty());
        assert_eq!(sketch.n(), 0);
    }

    #[test]
    #[should_panic]
    fn builder_rejects_non_power_of_two_k() {
        DoublesSketch::builder().k(100);
    }

    #[test]
    fn nan_inputs_are_dropped() {
        let mut sketch = DoublesSketch::builder().k(8).build();
        sketch.update(f64::NAN);
        sketch.update(1.0);
        sketch.update(f64::NAN);
        sketch.update(2.0);
        assert_eq!(sketch.n(), 2);
        assert_eq!(sketch.min_value(), 1.0);
        assert_eq!(sketch.max_value(), 2.0);
    }

    #[test]
    fn sequential_inserts_track_min_max_and_bit_pattern() {
        let mut sketch = DoublesSketch::builder().k(8).rng(XorShift64::seeded(7)).build();
        for i in 1..=1024u64 {
            sketch.update(i as f64);
        }
        assert_eq!(sketch.n(), 1024);
        assert_eq!(sketch.min_value(), 1.0);
        assert_eq!(sketch.max_value(), 1024.0);
        // 1024 / 16 = 64 = 0b1000000: level 6 only.
        assert_eq!(sketch.bit_pattern(), 64);
        assert_eq!(sketch.num_retained(), (1024 % 16) + 8 * 1);
    }

    #[test]
    fn quantile_at_extremes_is_exact() {
        let mut sketch = DoublesSketch::builder().k(16).build();
        for i in 1..=500u64 {
            sketch.update(i as f64);
        }
        assert_eq!(sketch.get_quantile(0.0), 1.0);
        assert_eq!(sketch.get_quantile(1.0), 500.0);
    }

    #[test]
    fn quantile_is_non_decreasing_in_rank() {
        let mut sketch = DoublesSketch::builder().k(32).rng(XorShift64::seeded(99)).build();
        for i in 1..=2000u64 {
            sketch.update(i as f64);
        }
        let mut prev = sketch.get_quantile(0.0);
        let mut rank = 0.05;
        while rank <= 1.0 {
            let q = sketch.get_quantile(rank);
            assert!(q >= prev);
            prev = q;
            rank += 0.05;
        }
    }

    #[test]
    fn median_of_uniform_stream_is_near_center() {
        let mut sketch = DoublesSketch::builder().k(8).build();
        for i in 1..=1024u64 {
            sketch.update(i as f64);
        }
        let median = sketch.get_quantile(0.5);
        assert!((500.0..=525.0).contains(&median), "median was {median}");
    }

    #[test]
    fn pmf_and_cdf_sum_to_one() {
        let mut sketch = DoublesSketch::builder().k(16).build();
        for i in 0..100u64 {
            sketch.update(i as f64);
        }
        let pmf = sketch.get_pmf(&[25.0, 50.0, 75.0]);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut sketch = DoublesSketch::builder().k(16).rng(XorShift64::seeded(5)).build();
        for i in 1..=1000u64 {
            sketch.update(i as f64);
        }
        let bytes = sketch.serialize();
        let restored = DoublesSketch::deserialize(&bytes).unwrap();
        assert_eq!(restored.n(), sketch.n());
        assert_eq!(restored.k(), sketch.k());
        assert_eq!(restored.min_value(), sketch.min_value());
        assert_eq!(restored.max_value(), sketch.max_value());
        assert_eq!(restored.bit_pattern(), sketch.bit_pattern());
        assert_eq!(restored.num_retained(), sketch.num_retained());
        assert_eq!(restored.get_quantile(0.5), sketch.get_quantile(0.5));
    }

    #[test]
    fn empty_sketch_round_trips() {
        let sketch = DoublesSketch::builder().k(8).build();
        let bytes = sketch.serialize();
        let restored = DoublesSketch::deserialize(&bytes).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.k(), 8);
    }

    #[test]
    fn deserialize_rejects_wrong_family() {
        let sketch = DoublesSketch::builder().k(8).build();
        let mut bytes = sketch.serialize();
        bytes[2] = 99;
        assert!(DoublesSketch::deserialize(&bytes).is_err());
    }
}
