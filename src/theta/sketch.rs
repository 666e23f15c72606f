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

//! The heap-resident, updatable Theta sketch: the type most callers reach
//! for first.

use std::hash::Hash;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::common::NumStdDev;
use crate::common::ResizeFactor;
use crate::common::binomial_bounds;
use crate::common::canonical_double;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::compact::CompactThetaSketch;
use crate::theta::hash_table::DEFAULT_LG_K;
use crate::theta::hash_table::MAX_LG_K;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::hash_table::MIN_LG_K;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::hash_table::UpdateResult;
use crate::theta::serialization::FLAG_BIG_ENDIAN;
use crate::theta::serialization::FLAG_EMPTY;
use crate::theta::serialization::PREAMBLE_LONGS_ESTIMATION;
use crate::theta::serialization::SERIAL_VERSION;

/// Builder for [`ThetaSketch`], validated at construction time.
///
/// Out-of-range construction parameters panic rather than returning a
/// `Result`, matching the crate's convention that programmer errors panic
/// while data errors (malformed bytes, mismatched seeds) return `Result`.
pub struct ThetaSketchBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Sets log2 of the sketch's nominal entries. Must be in `[5, 26]`.
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        );
        self.lg_k = lg_k;
        self
    }

    /// Sets the table growth policy applied below nominal capacity.
    pub fn resize_factor(mut self, resize_factor: ResizeFactor) -> Self {
        self.resize_factor = resize_factor;
        self
    }

    /// Sets the sampling probability applied once at construction, via
    /// `theta <- p * 2^63`. Must be in `(0.0, 1.0]`.
    pub fn sampling_probability(mut self, p: f32) -> Self {
        assert!(
            p > 0.0 && p <= 1.0,
            "sampling_probability must be in (0.0, 1.0], got {p}"
        );
        self.sampling_probability = p;
        self
    }

    /// Sets the hash seed. Two sketches must share a seed to be unioned.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds the sketch.
    pub fn build(self) -> ThetaSketch {
        ThetaSketch {
            table: ThetaHashTable::new(
                self.lg_k,
                self.resize_factor,
                self.sampling_probability,
                self.seed,
            ),
        }
    }
}

/// A heap-resident, mutable Theta sketch for cardinality estimation.
pub struct ThetaSketch {
    table: ThetaHashTable,
}

impl ThetaSketch {
    /// Starts a [`ThetaSketchBuilder`] with default parameters.
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    /// Updates the sketch with an arbitrary hashable value.
    pub fn update<T: Hash>(&mut self, value: T) -> UpdateResult {
        self.table.try_insert(value)
    }

    /// Updates the sketch with a pre-canonicalized `f64`, matching Java's
    /// `Double.doubleToLongBits` semantics (`-0.0` and all NaN payloads
    /// collapse to one representative value).
    pub fn update_f64(&mut self, value: f64) -> UpdateResult {
        self.table.try_insert(canonical_double(value).to_bits())
    }

    /// Updates the sketch with a `f32`, widened and canonicalized as `f64`.
    pub fn update_f32(&mut self, value: f32) -> UpdateResult {
        self.update_f64(value as f64)
    }

    /// Admits a raw 64-bit hash directly, bypassing the convenience hasher.
    pub fn update_hash(&mut self, hash: u64) -> UpdateResult {
        self.table.try_insert_hash(hash)
    }

    /// Returns the cardinality estimate: `curCount` exactly if the sketch
    /// has never needed to rebuild, else `curCount * 2^63 / theta`.
    pub fn estimate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else if self.is_estimation_mode() {
            self.table.num_retained() as f64 * MAX_THETA as f64 / self.table.theta() as f64
        } else {
            self.table.num_retained() as f64
        }
    }

    /// Lower bound on the true cardinality at the given confidence.
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        binomial_bounds::lower_bound(
            self.table.num_retained() as u64,
            self.theta(),
            num_std_dev,
        )
    }

    /// Upper bound on the true cardinality at the given confidence.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        binomial_bounds::upper_bound(
            self.table.num_retained() as u64,
            self.theta(),
            num_std_dev,
            self.is_empty(),
        )
    }

    /// Current threshold as a fraction of `2^63`.
    pub fn theta(&self) -> f64 {
        self.table.theta() as f64 / MAX_THETA as f64
    }

    /// Current threshold as its raw unsigned 64-bit form.
    pub fn theta64(&self) -> u64 {
        self.table.theta()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// True once the sketch has rebuilt at least once, meaning the
    /// estimate is no longer an exact count.
    pub fn is_estimation_mode(&self) -> bool {
        self.table.theta() < MAX_THETA
    }

    pub fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    /// Shrinks the retained set down to nominal capacity if currently over.
    pub fn trim(&mut self) {
        self.table.trim();
    }

    /// Clears the sketch back to its freshly-built state.
    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Iterates the retained hashes in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.iter()
    }

    /// Produces an immutable compact sketch from the current state.
    /// `ordered` additionally sorts the retained hashes ascending.
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        CompactThetaSketch::new(
            self.table.theta(),
            entries,
            self.table.seed_hash(),
            self.is_empty(),
        )
    }

    /// Serializes the updatable layout: a 3-long preamble followed by the
    /// full hash table (including empty slots), so direct-mode bytes built
    /// over a [`crate::common::byte_store::ByteStore`] are byte-identical
    /// to this heap form.
    pub fn serialize(&self) -> Vec<u8> {
        let lg_arr = self.table.lg_cur_size();
        let mut bytes = SketchBytes::with_capacity(24 + (1usize << lg_arr) * 8);

        bytes.write_u8(PREAMBLE_LONGS_ESTIMATION);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::THETA.id);
        bytes.write_u8(self.table.lg_nom_size());
        bytes.write_u8(lg_arr);
        bytes.write_u8(if self.is_empty() { FLAG_EMPTY } else { 0 });
        bytes.write_u16_le(self.table.seed_hash());

        bytes.write_u32_le(self.table.num_retained() as u32);
        bytes.write_u32_le(0); // padding to keep the long aligned

        bytes.write_u64_le(self.table.theta());

        for hash in self.table.iter_all_slots() {
            bytes.write_u64_le(hash);
        }

        bytes.into_bytes()
    }

    /// Deserializes an updatable-layout sketch built with the default
    /// update seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes an updatable-layout sketch, checking it against an
    /// explicit expected seed rather than the default.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
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
        Family::THETA.validate_id(family_id)?;
        if ser_ver != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, ser_ver));
        }
        if pre_longs != PREAMBLE_LONGS_ESTIMATION {
            return Err(Error::corrupt(format!(
                "updatable theta sketches always carry a {PREAMBLE_LONGS_ESTIMATION}-long preamble, got {pre_longs}"
            )));
        }

        let lg_nom_size = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("lgNomLongs"))?;
        let lg_arr = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("lgArrLongs"))?;
        let flags = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("flags"))?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }
        let seed_hash = slice
            .read_u16_le()
            .map_err(|_| Error::insufficient_data("seedHash"))?;
        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, seed_hash));
        }

        let num_retained = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("curCount"))?;
        let _padding = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("padding"))?;
        let theta = slice
            .read_u64_le()
            .map_err(|_| Error::insufficient_data("theta"))?;

        let table_len = 1usize << lg_arr;
        let mut entries = vec![0u64; table_len];
        for slot in entries.iter_mut() {
            *slot = slice
                .read_u64_le()
                .map_err(|_| Error::insufficient_data("hash table entry"))?;
        }

        let table = ThetaHashTable::from_raw_parts(
            lg_arr,
            lg_nom_size,
            ResizeFactor::X8,
            1.0,
            seed,
            theta,
            entries,
        );
        debug_assert_eq!(table.num_retained(), num_retained as usize);

        Ok(ThetaSketch { table })
    }
}
