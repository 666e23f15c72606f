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

//! Free functions implementing the leveled-buffer merge algorithm: random
//! parity down-sampling and the sorted-merge it downsamples from.

use crate::common::random::RandomSource;

/// Halves a sorted buffer of even length by keeping every item at one
/// parity (even or odd index), chosen by a single coin flip. Preserves
/// sortedness and keeps the down-sampled buffer an unbiased estimator of
/// the full one, which is what keeps the level hierarchy's error bound
/// valid across repeated promotions.
pub(crate) fn downsample_by_parity(sorted: &[f64], rng: &mut dyn RandomSource) -> Vec<f64> {
    debug_assert!(sorted.len() % 2 == 0, "downsample input must have even length");
    let start = if rng.next_bool() { 1 } else { 0 };
    sorted.iter().copied().skip(start).step_by(2).collect()
}

/// Merges two already-sorted slices into one sorted `Vec`.
pub(crate) fn merge_sorted(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        if a[i] <= b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Heuristic relative-rank error bound for a sketch of parameter `k`,
/// `epsilon ~= 1.65 * sqrt(ln(1/delta)) / k`. This is the empirically
/// observed bound from the DataSketches paper, not a proven one.
pub(crate) fn normalized_rank_error(k: u16, delta: f64) -> f64 {
    1.65 * (1.0 / delta).ln().sqrt() / k as f64
}
