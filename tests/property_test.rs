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

use datasketches::quantiles::DoublesSketch;
use datasketches::theta::ThetaSketch;
use datasketches::varopt::VarOptSketch;
use proptest::prelude::*;

proptest! {
    /// Theta scenario from the spec: 16 pre-hashed values `1..=32` into a
    /// `lgNomLongs=4` sketch retain exactly the 16 smallest.
    #[test]
    fn theta_nominal_capacity_retains_the_smallest_hashes(seed in any::<u64>()) {
        let mut sketch = ThetaSketch::builder().lg_k(4).seed(seed).build();
        for h in 1u64..=32 {
            sketch.update_hash(h);
        }
        prop_assert_eq!(sketch.num_retained(), 16);
        prop_assert!((sketch.estimate() - 32.0).abs() <= 1.0);
    }

    /// Invariant 1: every update sequence keeps retained hashes strictly
    /// below theta, and `num_retained` tracks the non-zero slot count.
    #[test]
    fn theta_retained_hashes_stay_under_theta(values in prop::collection::vec(any::<u64>(), 0..500)) {
        let mut sketch = ThetaSketch::builder().lg_k(6).build();
        for v in values {
            sketch.update(v);
        }
        let theta = sketch.theta64();
        for hash in sketch.iter() {
            prop_assert!(hash < theta);
        }
    }

    /// Invariant 4: `get_quantile` is non-decreasing in rank, and exact at
    /// the extremes.
    #[test]
    fn quantiles_are_non_decreasing_in_rank(values in prop::collection::vec(-1e6f64..1e6f64, 1..300)) {
        let mut sketch = DoublesSketch::builder().k(16).build();
        for v in &values {
            sketch.update(*v);
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(sketch.get_quantile(0.0), min);
        prop_assert_eq!(sketch.get_quantile(1.0), max);

        let mut prev = sketch.get_quantile(0.0);
        let mut rank = 0.05;
        while rank < 1.0 {
            let q = sketch.get_quantile(rank);
            prop_assert!(q >= prev);
            prev = q;
            rank += 0.1;
        }
    }

    /// Invariant 6: serialize -> deserialize round trips for Theta.
    #[test]
    fn theta_round_trips_through_serialization(values in prop::collection::vec(any::<u64>(), 0..200)) {
        let mut sketch = ThetaSketch::builder().lg_k(5).build();
        for v in values {
            sketch.update(v);
        }
        let bytes = sketch.serialize();
        let restored = ThetaSketch::deserialize(&bytes).unwrap();
        prop_assert_eq!(restored.num_retained(), sketch.num_retained());
        prop_assert_eq!(restored.theta64(), sketch.theta64());
        prop_assert_eq!(restored.estimate(), sketch.estimate());
    }

    /// VarOpt: sample size never exceeds k and weight is always conserved,
    /// regardless of input order or magnitude.
    #[test]
    fn varopt_conserves_total_weight_and_bounds_sample_size(
        weights in prop::collection::vec(1u32..10_000u32, 0..400),
        k in 1u32..40,
    ) {
        let mut sketch = VarOptSketch::builder().k(k).build();
        let mut total = 0.0;
        for (i, w) in weights.iter().enumerate() {
            total += *w as f64;
            sketch.update(i as u64, *w as f64).unwrap();
        }
        prop_assert!(sketch.num_samples() as u32 <= k);
        prop_assert!((sketch.total_weight() - total).abs() <= total.max(1.0) * 1e-6);
        if weights.len() as u32 > k {
            // Once the stream overflows k items, the reservoir region must
            // hold at least one item: tau() is 0.0 only when it is empty.
            prop_assert!(sketch.tau() > 0.0);
        }
    }
}
