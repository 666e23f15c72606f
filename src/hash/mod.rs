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

//! MurmurHash3 x64/128 wrapper used by the Theta family, and the seeded
//! convenience layer sketches expose to callers updating with arbitrary
//! `Hash` types.

use std::hash::Hash;
use std::hash::Hasher;

/// The default update seed, matching the value the rest of the family uses
/// unless a caller explicitly asks for a different one (e.g. to keep two
/// sketches from being unioned by accident).
pub(crate) const DEFAULT_UPDATE_SEED: u64 = 9001;

/// A seeded MurmurHash3 x64/128 instance over whole byte buffers.
pub(crate) struct MurmurHash3X64128 {
    seed: u64,
}

impl MurmurHash3X64128 {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Computes the 128-bit digest of `bytes`, returned as `(h1, h2)`.
    pub fn hash_bytes(&self, bytes: &[u8]) -> (u64, u64) {
        mur3::murmurhash3_x64_128(bytes, self.seed as u32)
    }

    /// Hashes `value` via its `Hash` impl, buffering the bytes it writes
    /// and running them through MurmurHash3 on completion. Returns `h1`
    /// with the top bit cleared, matching the Java implementation's use of
    /// a signed 63-bit hash space so theta comparisons stay well-defined.
    pub fn hash<T: Hash>(&self, value: T) -> u64 {
        let mut buffering = BufferingHasher::default();
        value.hash(&mut buffering);
        let (h1, _h2) = self.hash_bytes(&buffering.into_bytes());
        h1 >> 1
    }
}

/// A `Hasher` that records every byte written to it instead of folding
/// them into a running digest, so the buffered bytes can be handed to
/// MurmurHash3 as a single message.
#[derive(Default)]
struct BufferingHasher {
    bytes: Vec<u8>,
}

impl BufferingHasher {
    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Hasher for BufferingHasher {
    fn finish(&self) -> u64 {
        // Never consulted: callers read `into_bytes()` instead.
        0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

/// Derives the 16-bit seed hash stored in every Theta preamble, used to
/// detect a deserialized sketch built with a different update seed than
/// the one the caller expects.
pub(crate) fn compute_seed_hash(seed: u64) -> u16 {
    let (h0, _h1) = mur3::murmurhash3_x64_128(&seed.to_le_bytes(), 0);
    let seed_hash = (h0 >> 48) as u16;
    if seed_hash == 0 { 1 } else { seed_hash }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_digest_matches_known_vectors() {
        let key = "The quick brown fox jumps over the lazy dog";
        let (h1, h2) = mur3::murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0xe34bbc7bbc071b6c);
        assert_eq!(h2, 0x7a433ca9c49a9347);
    }

    #[test]
    fn hash_is_deterministic_for_a_fixed_seed() {
        let hasher = MurmurHash3X64128::with_seed(DEFAULT_UPDATE_SEED);
        assert_eq!(hasher.hash(42u64), hasher.hash(42u64));
    }

    #[test]
    fn hash_differs_across_seeds() {
        let a = MurmurHash3X64128::with_seed(1).hash(42u64);
        let b = MurmurHash3X64128::with_seed(2).hash(42u64);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_top_bit_is_always_clear() {
        let hasher = MurmurHash3X64128::with_seed(DEFAULT_UPDATE_SEED);
        for i in 0..1000u64 {
            assert_eq!(hasher.hash(i) & (1 << 63), 0);
        }
    }

    #[test]
    fn seed_hash_is_never_zero() {
        for seed in [0u64, 1, 9001, u64::MAX] {
            assert_ne!(compute_seed_hash(seed), 0);
        }
    }
}
