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

//! The VarOpt weighted-sampling sketch.

use crate::codec::family::Family;
use crate::common::random::RandomSource;
use crate::common::random::XorShift64;
use crate::error::Error;
use crate::varopt::MAX_ITEMS_SEEN;
use crate::varopt::MAX_K;
use crate::varopt::MIN_K;
use crate::varopt::serde::ArrayOfItemsSerDe;
use crate::varopt::serialization::FLAG_BIG_ENDIAN;
use crate::varopt::serialization::FLAG_EMPTY;
use crate::varopt::serialization::PREAMBLE_LONGS_EMPTY;
use crate::varopt::serialization::PREAMBLE_LONGS_NON_EMPTY;
use crate::varopt::serialization::SERIAL_VERSION;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One sampled item paired with its estimated weight: exact for items
/// retained in the heavy region, `tau` for items sharing the reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub item: T,
    pub weight: f64,
}

/// A min-heap entry ordered by ascending weight (smallest weight pops
/// first), so the heavy region can cheaply find and evict its lightest
/// member when it needs to shed one unit back into the reservoir.
struct HeapEntry<T> {
    item: T,
    weight: f64,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    /// Reversed: `BinaryHeap` is a max-heap, so the entry with the
    /// *smallest* weight compares as the greatest, and pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .partial_cmp(&self.weight)
            .expect("VarOpt weights must not be NaN")
    }
}

/// Builder for [`VarOptSketch`].
pub struct VarOptSketchBuilder {
    k: u32,
    rng: Box<dyn RandomSource>,
}

impl Default for VarOptSketchBuilder {
    fn default() -> Self {
        Self {
            k: 64,
            rng: Box::new(XorShift64::default()),
        }
    }
}

impl VarOptSketchBuilder {
    /// Sets `k`, the target sample size. Must be in `[1, 2^30]`.
    pub fn k(mut self, k: u32) -> Self {
        assert!(
            (MIN_K..=MAX_K).contains(&k),
            "k must be in [{MIN_K}, {MAX_K}], got {k}"
        );
        self.k = k;
        self
    }

    /// Supplies the random source driving acceptance/eviction draws.
    pub fn rng(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn build<T>(self) -> VarOptSketch<T> {
        VarOptSketch {
            k: self.k,
            n: 0,
            heavy: BinaryHeap::new(),
            heavy_weight: 0.0,
            light: Vec::new(),
            light_weight: 0.0,
            rng: self.rng,
        }
    }
}

/// A single-pass, variance-optimal weighted sample of up to `k` items.
///
/// Every update keeps `|H| + |R| == min(N, k)`: during warmup (`N <= k`)
/// all items are retained exactly in `H`. The first update that finds `H`
/// full and `R` still empty unconditionally demotes `H`'s lightest member
/// into `R`, so `tau = light_weight / |R|` becomes defined and every later
/// random draw has a real population to draw from. From then on, an
/// incoming item heavier than `tau` is pushed into `H` and `H`'s new
/// lightest member is demoted into `R`; one uniformly random `R` member
/// (possibly the one just demoted) is then evicted to bring `|H| + |R|`
/// back down to `k`, since all `R` members are exchangeable. An item no
/// heavier than `tau` is accepted into a uniformly random `R` slot with
/// probability proportional to its weight, and `light_weight` absorbs its
/// weight either way. This keeps the invariant `sum(H weights) +
/// light_weight == sum of all weights seen` exact at every step, and
/// guarantees `|R| >= 1` from that first transition onward.
pub struct VarOptSketch<T> {
    k: u32,
    n: u64,
    heavy: BinaryHeap<HeapEntry<T>>,
    heavy_weight: f64,
    light: Vec<T>,
    light_weight: f64,
    rng: Box<dyn RandomSource>,
}

impl<T> VarOptSketch<T> {
    pub fn builder() -> VarOptSketchBuilder {
        VarOptSketchBuilder::default()
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of items physically retained: `min(N, k)`.
    pub fn num_samples(&self) -> usize {
        self.heavy.len() + self.light.len()
    }

    /// The reservoir's shared per-item weight estimate, `light_weight /
    /// |R|`. Undefined (returns `0.0`) while `R` is empty.
    pub fn tau(&self) -> f64 {
        if self.light.is_empty() {
            0.0
        } else {
            self.light_weight / self.light.len() as f64
        }
    }

    /// Total true weight of every item ever passed to [`Self::update`].
    pub fn total_weight(&self) -> f64 {
        self.heavy_weight + self.light_weight
    }

    /// Processes one weighted item.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `weight` is not a positive, finite
    /// number, and `CapacityExceeded` once the sketch has already seen
    /// `2^48 - 1` items.
    pub fn update(&mut self, item: T, weight: f64) -> Result<(), Error> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(Error::invalid_parameter(format!(
                "VarOpt weights must be positive and finite, got {weight}"
            )));
        }
        if self.n >= MAX_ITEMS_SEEN {
            return Err(Error::capacity_exceeded(MAX_ITEMS_SEEN));
        }
        self.n += 1;

        if self.num_samples() < self.k as usize {
            self.heavy.push(HeapEntry { item, weight });
            self.heavy_weight += weight;
            return Ok(());
        }

        // First time the reservoir fills (R is still empty, tau undefined):
        // unconditionally demote H's lightest member into R so every later
        // update has a real R population to draw its random index from.
        // This does not change num_samples(): one H slot becomes one R slot.
        if self.light.is_empty() {
            let demoted = self.heavy.pop().expect("heavy region is non-empty");
            self.heavy_weight -= demoted.weight;
            self.light_weight += demoted.weight;
            self.light.push(demoted.item);
        }

        let tau = self.tau();
        if weight > tau {
            self.heavy.push(HeapEntry { item, weight });
            self.heavy_weight += weight;

            let demoted = self.heavy.pop().expect("heavy region is non-empty");
            self.heavy_weight -= demoted.weight;
            self.light_weight += demoted.weight;
            self.light.push(demoted.item);

            // The push above grew total retained count to k + 1 (heavy lost
            // one member but light gained one); restore it to k by evicting
            // a uniformly random light member, drawn from R as it stood
            // before this item arrived plus the one just demoted.
            let idx = self.rng.next_bounded_usize(self.light.len());
            self.light.swap_remove(idx);
        } else {
            let candidate_light_weight = self.light_weight + weight;
            let accept_probability = weight * self.light.len() as f64 / candidate_light_weight;
            if self.rng.next_f64() < accept_probability {
                let idx = self.rng.next_bounded_usize(self.light.len());
                self.light[idx] = item;
            }
            self.light_weight = candidate_light_weight;
        }
        Ok(())
    }

    /// Merges `other`'s processed items into `self` by replaying each of
    /// its samples through [`Self::update`] at its estimated weight. Items
    /// from a reservoir this size down-weights every light item identically
    /// to a fresh arrival, so the result remains an unbiased VarOpt sample
    /// of the combined stream.
    pub fn merge(&mut self, other: &Self) -> Result<(), Error>
    where
        T: Clone,
    {
        for sample in other.samples() {
            self.update(sample.item, sample.weight)?;
        }
        Ok(())
    }

    /// Returns every retained item with its estimated weight: exact for
    /// heavy items, `tau()` for light ones. Order is unspecified.
    pub fn samples(&self) -> Vec<Sample<T>>
    where
        T: Clone,
    {
        let tau = self.tau();
        let mut out = Vec::with_capacity(self.num_samples());
        out.extend(self.heavy.iter().map(|e| Sample {
            item: e.item.clone(),
            weight: e.weight,
        }));
        out.extend(self.light.iter().map(|item| Sample {
            item: item.clone(),
            weight: tau,
        }));
        out
    }

    /// Serializes the sketch using `serde` to encode each sampled item.
    pub fn serialize(&self, serde: &impl ArrayOfItemsSerDe<T>) -> Vec<u8> {
        let is_empty = self.is_empty();
        let pre_longs = if is_empty {
            PREAMBLE_LONGS_EMPTY
        } else {
            PREAMBLE_LONGS_NON_EMPTY
        };
        let flags = if is_empty { FLAG_EMPTY } else { 0 };

        let mut bytes = Vec::with_capacity(32);
        bytes.push(pre_longs);
        bytes.push(SERIAL_VERSION);
        bytes.push(Family::VAROPT.id);
        bytes.push(flags);
        bytes.extend_from_slice(&self.k.to_le_bytes());

        if is_empty {
            return bytes;
        }

        bytes.extend_from_slice(&self.n.to_le_bytes());
        bytes.extend_from_slice(&(self.heavy.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.light.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.light_weight.to_le_bytes());

        for entry in self.heavy.iter() {
            bytes.extend_from_slice(&entry.weight.to_le_bytes());
            serde.serialize_into(&entry.item, &mut bytes);
        }
        for item in &self.light {
            serde.serialize_into(item, &mut bytes);
        }

        bytes
    }

    /// Deserializes a sketch, using a freshly seeded default RNG for any
    /// subsequent updates.
    pub fn deserialize(bytes: &[u8], serde: &impl ArrayOfItemsSerDe<T>) -> Result<Self, Error> {
        Self::deserialize_with_rng(bytes, serde, Box::new(XorShift64::default()))
    }

    pub fn deserialize_with_rng(
        bytes: &[u8],
        serde: &impl ArrayOfItemsSerDe<T>,
        rng: Box<dyn RandomSource>,
    ) -> Result<Self, Error> {
        let mut offset = 0usize;
        let pre_longs = read_u8(bytes, &mut offset)?;
        let ser_ver = read_u8(bytes, &mut offset)?;
        let family_id = read_u8(bytes, &mut offset)?;
        Family::VAROPT.validate_id(family_id)?;
        if ser_ver != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, ser_ver));
        }
        let flags = read_u8(bytes, &mut offset)?;
        if flags & FLAG_BIG_ENDIAN != 0 {
            return Err(Error::corrupt("big-endian sketches are not supported"));
        }
        let k = read_u32(bytes, &mut offset)?;

        if flags & FLAG_EMPTY != 0 {
            return Ok(Self {
                k,
                n: 0,
                heavy: BinaryHeap::new(),
                heavy_weight: 0.0,
                light: Vec::new(),
                light_weight: 0.0,
                rng,
            });
        }
        if pre_longs != PREAMBLE_LONGS_NON_EMPTY {
            return Err(Error::corrupt(format!(
                "non-empty VarOpt sketches carry a {PREAMBLE_LONGS_NON_EMPTY}-long preamble, got {pre_longs}"
            )));
        }

        let n = read_u64(bytes, &mut offset)?;
        let h = read_u32(bytes, &mut offset)? as usize;
        let r = read_u32(bytes, &mut offset)? as usize;
        let light_weight = read_f64(bytes, &mut offset)?;

        let mut heavy = BinaryHeap::with_capacity(h);
        let mut heavy_weight = 0.0;
        for _ in 0..h {
            let weight = read_f64(bytes, &mut offset)?;
            let item = serde.deserialize_from(bytes, &mut offset)?;
            heavy_weight += weight;
            heavy.push(HeapEntry { item, weight });
        }
        let mut light = Vec::with_capacity(r);
        for _ in 0..r {
            light.push(serde.deserialize_from(bytes, &mut offset)?);
        }

        Ok(Self {
            k,
            n,
            heavy,
            heavy_weight,
            light,
            light_weight,
            rng,
        })
    }
}

fn read_u8(bytes: &[u8], offset: &mut usize) -> Result<u8, Error> {
    let v = *bytes
        .get(*offset)
        .ok_or_else(|| Error::insufficient_data("u8"))?;
    *offset += 1;
    Ok(v)
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, Error> {
    let end = *offset + 4;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| Error::insufficient_data("u32"))?;
    *offset = end;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, Error> {
    let end = *offset + 8;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| Error::insufficient_data("u64"))?;
    *offset = end;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_f64(bytes: &[u8], offset: &mut usize) -> Result<f64, Error> {
    Ok(f64::from_bits(read_u64(bytes, offset)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varopt::serde::U64SerDe;

    #[test]
    fn warmup_retains_every_item_exactly() {
        let mut sketch = VarOptSketch::builder().k(10).build();
        for i in 1..=10u64 {
            sketch.update(i, i as f64).unwrap();
        }
        assert_eq!(sketch.num_samples(), 10);
        assert_eq!(sketch.n(), 10);
        let total: f64 = (1..=10u64).map(|i| i as f64).sum();
        assert!((sketch.total_weight() - total).abs() < 1e-9);
    }

    #[test]
    fn sample_size_never_exceeds_k() {
        let mut sketch = VarOptSketch::builder().k(16).rng(XorShift64::seeded(3)).build();
        for i in 1..=10_000u64 {
            sketch.update(i, (i % 37 + 1) as f64).unwrap();
        }
        assert_eq!(sketch.num_samples(), 16);
    }

    #[test]
    fn reservoir_retains_items_past_warmup() {
        let mut sketch = VarOptSketch::builder().k(10).rng(XorShift64::seeded(7)).build();
        for i in 1..=10u64 {
            sketch.update(i, 1.0).unwrap();
        }
        assert_eq!(sketch.light.len(), 0, "R is still empty during warmup");

        // The very next item fills H past k and must trigger the H -> R
        // transition: R cannot be left empty (and thus re-degenerate to
        // always evicting whatever was just demoted into it).
        sketch.update(11, 1.0).unwrap();
        assert_eq!(
            sketch.light.len(),
            1,
            "first overflow must demote exactly one item into R"
        );

        for i in 12..=2_000u64 {
            sketch.update(i, 1.0).unwrap();
        }
        assert!(
            !sketch.light.is_empty(),
            "R must keep holding at least one item after warmup ends"
        );
        assert_eq!(sketch.num_samples(), 10);
    }

    #[test]
    fn weight_is_conserved_exactly() {
        let mut sketch = VarOptSketch::builder().k(20).rng(XorShift64::seeded(123)).build();
        let mut total = 0.0;
        for i in 1..=5_000u64 {
            let w = ((i * 2654435761) % 997 + 1) as f64;
            total += w;
            sketch.update(i, w).unwrap();
        }
        assert!((sketch.total_weight() - total).abs() < total * 1e-9);

        // tau * |R| must equal light_weight exactly, by construction.
        assert!((sketch.tau() * sketch.light.len() as f64 - sketch.light_weight).abs() < 1e-9);
    }

    #[test]
    fn heavy_items_never_get_demoted_below_lighter_ones() {
        let mut sketch = VarOptSketch::builder().k(5).rng(XorShift64::seeded(9)).build();
        for i in 1..=5u64 {
            sketch.update(i, 1.0).unwrap();
        }
        sketch.update(100, 1_000_000.0).unwrap();
        let samples = sketch.samples();
        assert!(samples.iter().any(|s| s.item == 100 && s.weight == 1_000_000.0));
    }

    #[test]
    fn rejects_non_positive_weight() {
        let mut sketch: VarOptSketch<u64> = VarOptSketch::builder().k(4).build();
        assert!(sketch.update(1, 0.0).is_err());
        assert!(sketch.update(1, -1.0).is_err());
        assert!(sketch.update(1, f64::NAN).is_err());
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut sketch = VarOptSketch::builder().k(8).rng(XorShift64::seeded(42)).build();
        for i in 1..=100u64 {
            sketch.update(i, (i % 13 + 1) as f64).unwrap();
        }
        let serde = U64SerDe;
        let bytes = sketch.serialize(&serde);
        let restored = VarOptSketch::deserialize(&bytes, &serde).unwrap();
        assert_eq!(restored.n(), sketch.n());
        assert_eq!(restored.k(), sketch.k());
        assert_eq!(restored.num_samples(), sketch.num_samples());
        assert!((restored.total_weight() - sketch.total_weight()).abs() < 1e-6);
    }

    #[test]
    fn empty_sketch_round_trips() {
        let sketch: VarOptSketch<u64> = VarOptSketch::builder().k(8).build();
        let serde = U64SerDe;
        let bytes = sketch.serialize(&serde);
        let restored = VarOptSketch::deserialize(&bytes, &serde).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.k(), 8);
    }
}
