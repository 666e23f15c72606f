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

//! The open-addressing hash table backing the Theta sketch: resize,
//! rebuild-to-shrink-theta, and the probing sequence shared by heap and
//! direct sketch variants.

use std::hash::Hash;

use crate::common::ResizeFactor;
use crate::hash::MurmurHash3X64128;

/// Maximum representable threshold: `2^63 - 1`, stored as its unsigned
/// 64-bit equivalent. All retained hashes satisfy `hash < theta`.
pub(crate) const MAX_THETA: u64 = i64::MAX as u64;

pub(crate) const MIN_LG_K: u8 = 5;
pub(crate) const MAX_LG_K: u8 = 26;
pub(crate) const DEFAULT_LG_K: u8 = 12;

const RESIZE_THRESHOLD: f64 = 0.5;
pub(crate) const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

const STRIDE_HASH_BITS: u8 = 7;
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

/// Outcome of a single hash admitted to a Theta sketch's table.
///
/// `InsertedCountNotIncremented` covers the narrow case where an insertion
/// triggers a rebuild that lowers theta below the just-inserted hash: the
/// slot briefly held the value, but the sketch's retained count ends the
/// call no higher than when it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    RejectedNull,
    RejectedOverTheta,
    RejectedDuplicate,
    InsertedCountIncremented,
    InsertedCountNotIncremented,
}

impl UpdateResult {
    pub(crate) fn is_rejected(self) -> bool {
        matches!(
            self,
            UpdateResult::RejectedNull | UpdateResult::RejectedOverTheta | UpdateResult::RejectedDuplicate
        )
    }
}

/// The resizable open-addressing hash set a Theta sketch updates into.
pub(crate) struct ThetaHashTable {
    lg_cur_size: u8,
    lg_nom_size: u8,
    lg_max_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    hash_seed: u64,
    is_empty: bool,
    theta: u64,
    entries: Vec<u64>,
    num_retained: usize,
}

impl ThetaHashTable {
    pub fn new(
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Self {
        let lg_cur_size = starting_sub_multiple(lg_nom_size + 1, MIN_LG_K, resize_factor.lg_value());
        let theta = starting_theta_from_sampling_probability(sampling_probability);
        Self {
            lg_cur_size,
            lg_nom_size,
            lg_max_size: lg_nom_size + 1,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty: true,
            theta,
            entries: vec![0u64; 1usize << lg_cur_size],
            num_retained: 0,
        }
    }

    /// Reconstructs a table directly from deserialized wire fields.
    ///
    /// Used only by [`crate::theta::sketch::ThetaSketch::deserialize_with_seed`]
    /// and the direct-mode sketch, both of which already validated the
    /// preamble before handing `entries` over.
    pub fn from_raw_parts(
        lg_cur_size: u8,
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
        theta: u64,
        entries: Vec<u64>,
    ) -> Self {
        let num_retained = entries.iter().filter(|&&e| e != 0).count();
        Self {
            lg_cur_size,
            lg_nom_size,
            lg_max_size: lg_nom_size + 1,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty: num_retained == 0,
            theta,
            entries,
            num_retained,
        }
    }

    #[cfg(test)]
    pub fn new_with_state(
        lg_cur_size: u8,
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
        theta: u64,
        entries: Vec<u64>,
    ) -> Self {
        assert!(
            lg_cur_size <= lg_nom_size + 1,
            "lg_cur_size must not exceed lg_nom_size + 1"
        );
        let num_retained = entries.iter().filter(|&&e| e != 0).count();
        Self {
            lg_cur_size,
            lg_nom_size,
            lg_max_size: lg_nom_size + 1,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty: false,
            theta,
            entries,
            num_retained,
        }
    }

    pub fn hash<T: Hash>(&self, value: T) -> u64 {
        MurmurHash3X64128::with_seed(self.hash_seed).hash(value)
    }

    fn mask(&self) -> u64 {
        (self.entries.len() as u64) - 1
    }

    fn find_in_entries(entries: &[u64], hash: u64) -> Result<usize, usize> {
        let lg_size = entries.len().trailing_zeros() as u8;
        let mask = (entries.len() as u64) - 1;
        let stride = get_stride(hash, lg_size);
        let loop_index = (hash & mask) as usize;
        let mut i = loop_index;
        loop {
            let probed = entries[i];
            if probed == 0 {
                return Err(i);
            }
            if probed == hash {
                return Ok(i);
            }
            i = (i + stride) & mask as usize;
            if i == loop_index {
                // Should never happen while num_retained < capacity, but a
                // completely full table must not loop forever.
                return Err(i);
            }
        }
    }

    fn find_in_curr_entries(&self, hash: u64) -> Result<usize, usize> {
        Self::find_in_entries(&self.entries, hash)
    }

    /// Admits a single 64-bit hash, updating retention state as needed.
    pub fn try_insert_hash(&mut self, hash: u64) -> UpdateResult {
        self.is_empty = false;
        if hash == 0 {
            return UpdateResult::RejectedNull;
        }
        if hash >= self.theta {
            return UpdateResult::RejectedOverTheta;
        }

        match self.find_in_curr_entries(hash) {
            Ok(_) => UpdateResult::RejectedDuplicate,
            Err(slot) => {
                self.entries[slot] = hash;
                self.num_retained += 1;

                if self.num_retained as f64 > self.get_capacity() {
                    if self.lg_cur_size <= self.lg_nom_size {
                        self.resize();
                    } else {
                        self.rebuild();
                    }
                }

                if hash >= self.theta {
                    UpdateResult::InsertedCountNotIncremented
                } else {
                    UpdateResult::InsertedCountIncremented
                }
            }
        }
    }

    pub fn try_insert<T: Hash>(&mut self, value: T) -> UpdateResult {
        let hash = self.hash(value);
        self.try_insert_hash(hash)
    }

    fn get_capacity(&self) -> f64 {
        let threshold = if self.lg_cur_size <= self.lg_nom_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        threshold * self.entries.len() as f64
    }

    fn resize(&mut self) {
        let lg_growth = self.resize_factor.lg_value().max(1);
        let new_lg_size = (self.lg_cur_size + lg_growth).min(self.lg_max_size);
        if new_lg_size == self.lg_cur_size {
            self.rebuild();
            return;
        }
        let mut new_entries = vec![0u64; 1usize << new_lg_size];
        for &hash in self.entries.iter().filter(|&&h| h != 0) {
            if let Err(slot) = Self::find_in_entries(&new_entries, hash) {
                new_entries[slot] = hash;
            }
        }
        self.entries = new_entries;
        self.lg_cur_size = new_lg_size;
    }

    /// Shrinks theta to the nominal-th smallest retained hash, zeroing
    /// everything at or above the new threshold and rebuilding the table
    /// at its nominal size.
    fn rebuild(&mut self) {
        let nominal = 1usize << self.lg_nom_size;
        let mut retained: Vec<u64> = self.entries.iter().copied().filter(|&h| h != 0).collect();

        if retained.len() > nominal {
            retained.select_nth_unstable(nominal);
            let new_theta = retained[nominal];
            retained.truncate(nominal);
            self.theta = new_theta;
        }

        let lg_size = starting_sub_multiple(self.lg_nom_size + 1, MIN_LG_K, self.resize_factor.lg_value())
            .max(self.lg_nom_size.min(MIN_LG_K));
        let lg_size = lg_size.max((retained.len().max(1) as f64 / REBUILD_THRESHOLD).log2().ceil() as u8);
        let mut new_entries = vec![0u64; 1usize << lg_size];
        let mut num_inserted = 0usize;
        for &hash in &retained {
            if let Err(slot) = Self::find_in_entries(&new_entries, hash) {
                new_entries[slot] = hash;
                num_inserted += 1;
            }
        }

        self.entries = new_entries;
        self.lg_cur_size = lg_size;
        self.num_retained = num_inserted;
    }

    /// Forces retained count down to the nominal size if currently over,
    /// without changing theta unless a rebuild is actually needed.
    pub fn trim(&mut self) {
        if self.num_retained > 1usize << self.lg_nom_size {
            self.rebuild();
        }
    }

    pub fn reset(&mut self) {
        self.theta = starting_theta_from_sampling_probability(self.sampling_probability);
        self.lg_cur_size =
            starting_sub_multiple(self.lg_nom_size + 1, MIN_LG_K, self.resize_factor.lg_value());
        self.entries = vec![0u64; 1usize << self.lg_cur_size];
        self.num_retained = 0;
        self.is_empty = true;
    }

    pub fn num_retained(&self) -> usize {
        self.num_retained
    }

    pub fn theta(&self) -> u64 {
        self.theta
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    pub fn lg_cur_size(&self) -> u8 {
        self.lg_cur_size
    }

    pub fn seed_hash(&self) -> u16 {
        crate::hash::compute_seed_hash(self.hash_seed)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied().filter(|&h| h != 0)
    }

    /// Iterates every slot including zeros, in table order, for the
    /// updatable serialized layout which preserves physical slot position.
    pub fn iter_all_slots(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }
}

pub(crate) fn get_stride(key: u64, lg_size: u8) -> usize {
    (2 * ((key >> lg_size) & STRIDE_MASK) + 1) as usize
}

/// The smallest `lg_min + n * lg_resize_factor` (`n >= 0`) that is `>=
/// lg_target`, capped so the starting table is never larger than nominal.
pub(crate) fn starting_sub_multiple(lg_target: u8, lg_min: u8, lg_resize_factor: u8) -> u8 {
    if lg_target <= lg_min || lg_resize_factor == 0 {
        return lg_target.max(lg_min);
    }
    let mut lg = lg_min;
    while lg < lg_target {
        lg += lg_resize_factor;
    }
    lg
}

pub(crate) fn starting_theta_from_sampling_probability(p: f32) -> u64 {
    if p >= 1.0 {
        MAX_THETA
    } else {
        ((p as f64) * MAX_THETA as f64) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(lg_k: u8) -> ThetaHashTable {
        ThetaHashTable::new(lg_k, ResizeFactor::X8, 1.0, 9001)
    }

    #[test]
    fn new_table_is_empty() {
        let t = table(DEFAULT_LG_K);
        assert!(t.is_empty());
        assert_eq!(t.num_retained(), 0);
        assert_eq!(t.theta(), MAX_THETA);
    }

    #[test]
    fn rejects_zero_hash() {
        let mut t = table(DEFAULT_LG_K);
        assert_eq!(t.try_insert_hash(0), UpdateResult::RejectedNull);
        assert_eq!(t.num_retained(), 0);
    }

    #[test]
    fn rejects_hash_over_theta() {
        let mut t = ThetaHashTable::new(4, ResizeFactor::X8, 0.5, 1);
        let theta = t.theta();
        assert_eq!(t.try_insert_hash(theta), UpdateResult::RejectedOverTheta);
        assert_eq!(t.try_insert_hash(theta + 1), UpdateResult::RejectedOverTheta);
    }

    #[test]
    fn inserts_new_hash_and_increments_count() {
        let mut t = table(DEFAULT_LG_K);
        assert_eq!(t.try_insert_hash(42), UpdateResult::InsertedCountIncremented);
        assert_eq!(t.num_retained(), 1);
        assert!(!t.is_empty());
    }

    #[test]
    fn rejects_duplicate_hash() {
        let mut t = table(DEFAULT_LG_K);
        t.try_insert_hash(42);
        assert_eq!(t.try_insert_hash(42), UpdateResult::RejectedDuplicate);
        assert_eq!(t.num_retained(), 1);
    }

    #[test]
    fn resizes_as_entries_accumulate() {
        let mut t = ThetaHashTable::new(10, ResizeFactor::X2, 1.0, 9001);
        let start_size = t.lg_cur_size();
        for i in 0..300u64 {
            t.try_insert_hash((i + 1) * 0x9E37_79B9);
        }
        assert!(t.lg_cur_size() >= start_size);
        assert!(t.num_retained() <= 1usize << (t.lg_nom_size() + 1));
    }

    #[test]
    fn rebuild_shrinks_theta_and_caps_retained_at_nominal() {
        let mut t = ThetaHashTable::new(4, ResizeFactor::X2, 1.0, 9001);
        for i in 1..2000u64 {
            t.try_insert_hash(i * 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(i).wrapping_add(1) | 1);
        }
        assert!(t.num_retained() <= 1usize << t.lg_nom_size());
        assert!(t.theta() <= MAX_THETA);
        for h in t.iter() {
            assert!(h < t.theta());
        }
    }

    #[test]
    fn trim_is_noop_below_nominal() {
        let mut t = table(4);
        t.try_insert_hash(5);
        let theta_before = t.theta();
        t.trim();
        assert_eq!(t.theta(), theta_before);
        assert_eq!(t.num_retained(), 1);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut t = table(DEFAULT_LG_K);
        t.try_insert_hash(7);
        t.reset();
        assert!(t.is_empty());
        assert_eq!(t.num_retained(), 0);
        assert_eq!(t.theta(), MAX_THETA);
    }

    #[test]
    fn sampling_probability_lowers_initial_theta() {
        let t = ThetaHashTable::new(DEFAULT_LG_K, ResizeFactor::X8, 0.1, 9001);
        assert!(t.theta() < MAX_THETA);
    }

    #[test]
    fn iterator_yields_only_occupied_slots() {
        let mut t = table(DEFAULT_LG_K);
        t.try_insert_hash(1);
        t.try_insert_hash(2);
        t.try_insert_hash(3);
        let mut seen: Vec<u64> = t.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn update_via_hash_trait_is_deterministic() {
        let mut t = table(DEFAULT_LG_K);
        let r1 = t.try_insert("hello");
        let mut t2 = table(DEFAULT_LG_K);
        let r2 = t2.try_insert("hello");
        assert_eq!(r1, r2);
    }
}
