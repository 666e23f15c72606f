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

//! The immutable, compact Theta sketch: just the retained hashes and a
//! handful of header fields, with no empty slots in its serialized form.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::hash_table::MAX_THETA;
use crate::theta::serialization::FLAG_BIG_ENDIAN;
use crate::theta::serialization::FLAG_COMPACT;
use crate::theta::serialization::FLAG_EMPTY;
use crate::theta::serialization::FLAG_ORDERED;
use crate::theta::serialization::FLAG_READ_ONLY;
use crate::theta::serialization::FLAG_SINGLE_ITEM;
use crate::theta::serialization::PREAMBLE_LONGS_EMPTY;
use crate::theta::serialization::PREAMBLE_LONGS_ESTIMATION;
use crate::theta::serialization::PREAMBLE_LONGS_EXACT;
use crate::theta::serialization::SERIAL_VERSION;

/// An immutable Theta sketch holding only its retained hashes.
pub struct CompactThetaSketch {
    theta: u64,
    entries: Vec<u64>,
    seed_hash: u16,
    is_empty: bool,
}

impl CompactThetaSketch {
    pub(crate) fn new(theta: u64, entries: Vec<u64>, seed_hash: u16, is_empty: bool) -> Self {
        Self {
            theta,
            entries,
            seed_hash,
            is_empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.theta < MAX_THETA
    }

    pub fn num_retained(&self) -> usize {
        self.entries.len()
    }

    pub fn theta(&self) -> f64 {
        self.theta as f64 / MAX_THETA as f64
    }

    pub fn theta64(&self) -> u64 {
        self.theta
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    pub fn estimate(&self) -> f64 {
        if self.is_empty {
            0.0
        } else if self.is_estimation_mode() {
            self.entries.len() as f64 * MAX_THETA as f64 / self.theta as f64
        } else {
            self.entries.len() as f64
        }
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        binomial_bounds::lower_bound(self.entries.len() as u64, self.theta(), num_std_dev)
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        binomial_bounds::upper_bound(
            self.entries.len() as u64,
            self.theta(),
            num_std_dev,
            self.is_empty,
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }

    /// Serializes the compact layout: a 1-, 2-, or 3-long preamble
    /// depending on whether the sketch is empty, exact, or estimating,
    /// followed by exactly `num_retained()` hashes.
    pub fn serialize(&self, ordered: bool) -> Vec<u8> {
        let mut flags = FLAG_READ_ONLY | FLAG_COMPACT;
        if ordered {
            flags |= FLAG_ORDERED;
        }

        let mut entries = self.entries.clone();
        if ordered {
            entries.sort_unstable();
        }

        if self.is_empty {
            let mut bytes = SketchBytes::with_capacity(8);
            flags |= FLAG_EMPTY;
            write_header(&mut bytes, PREAMBLE_LONGS_EMPTY, flags, self.seed_hash);
            return bytes.into_bytes();
        }

        if entries.len() == 1 && !self.is_estimation_mode() {
            let mut bytes = SketchBytes::with_capacity(16);
            flags |= FLAG_SINGLE_ITEM;
            write_header(&mut bytes, PREAMBLE_LONGS_EMPTY, flags, self.seed_hash);
            bytes.write_u64_le(entries[0]);
            return bytes.into_bytes();
        }

        if !self.is_estimation_mode() {
            let mut bytes = SketchBytes::with_capacity(16 + entries.len() * 8);
            write_header(&mut bytes, PREAMBLE_LONGS_EXACT, flags, self.seed_hash);
            bytes.write_u32_le(entries.len() as u32);
            bytes.write_u32_le(0);
            for hash in &entries {
                bytes.write_u64_le(*hash);
            }
            return bytes.into_bytes();
        }

        let mut bytes = SketchBytes::with_capacity(24 + entries.len() * 8);
        write_header(&mut bytes, PREAMBLE_LONGS_ESTIMATION, flags, self.seed_hash);
        bytes.write_u32_le(entries.len() as u32);
        bytes.write_u32_le(0);
        bytes.write_u64_le(self.theta);
        for hash in &entries {
            bytes.write_u64_le(*hash);
        }
        bytes.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

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

        let flags = slice
            .read_u8()
            .map_err(|_| Error::insufficient_data("flags"))?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }
        let is_empty = flags & FLAG_EMPTY != 0;
        let is_single_item = flags & FLAG_SINGLE_ITEM != 0;

        let _unused = slice.read_u8(); // reserved byte, mirrors the updatable layout's column
        let seed_hash = slice
            .read_u16_le()
            .map_err(|_| Error::insufficient_data("seedHash"))?;

        // Legacy images may carry a seed hash of 0, meaning "not checked".
        if seed_hash != 0 {
            let expected = compute_seed_hash(seed);
            if seed_hash != expected {
                return Err(Error::seed_mismatch(expected, seed_hash));
            }
        }

        if is_empty {
            return Ok(CompactThetaSketch::new(MAX_THETA, Vec::new(), seed_hash, true));
        }

        if is_single_item {
            let hash = slice
                .read_u64_le()
                .map_err(|_| Error::insufficient_data("single item hash"))?;
            return Ok(CompactThetaSketch::new(MAX_THETA, vec![hash], seed_hash, false));
        }

        if pre_longs < PREAMBLE_LONGS_EXACT {
            return Err(Error::corrupt(format!(
                "non-empty compact sketch must carry at least a {PREAMBLE_LONGS_EXACT}-long preamble, got {pre_longs}"
            )));
        }

        let count = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("curCount"))?;
        let _padding = slice
            .read_u32_le()
            .map_err(|_| Error::insufficient_data("padding"))?;

        let theta = if pre_longs >= PREAMBLE_LONGS_ESTIMATION {
            slice
                .read_u64_le()
                .map_err(|_| Error::insufficient_data("theta"))?
        } else {
            MAX_THETA
        };

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(
                slice
                    .read_u64_le()
                    .map_err(|_| Error::insufficient_data("hash"))?,
            );
        }

        Ok(CompactThetaSketch::new(theta, entries, seed_hash, false))
    }
}

fn write_header(bytes: &mut SketchBytes, pre_longs: u8, flags: u8, seed_hash: u16) {
    bytes.write_u8(pre_longs);
    bytes.write_u8(SERIAL_VERSION);
    bytes.write_u8(Family::THETA.id);
    bytes.write_u8(flags);
    bytes.write_u8(0); // reserved
    bytes.write_u16_le(seed_hash);
}
