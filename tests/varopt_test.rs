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

use datasketches::varopt::StringSerDe;
use datasketches::varopt::VarOptSketch;

#[test]
fn sample_never_exceeds_k_across_a_long_stream() {
    let mut sketch = VarOptSketch::builder().k(25).build();
    for i in 0..50_000u64 {
        sketch.update(i, ((i * 1_103_515_245 + 12_345) % 5_000 + 1) as f64).unwrap();
    }
    assert!(sketch.num_samples() <= 25);
    assert_eq!(sketch.n(), 50_000);
}

#[test]
fn total_weight_matches_sum_of_inputs_exactly() {
    let mut sketch = VarOptSketch::builder().k(30).build();
    let mut total = 0.0;
    for i in 1..=2_000u64 {
        let w = (i % 101 + 1) as f64;
        total += w;
        sketch.update(i, w).unwrap();
    }
    assert!((sketch.total_weight() - total).abs() < total * 1e-9);
}

#[test]
fn a_massively_heavy_item_is_always_retained() {
    let mut sketch = VarOptSketch::builder().k(10).build();
    for i in 0..1_000u64 {
        sketch.update(i, 1.0).unwrap();
    }
    sketch.update(999_999, 1e12).unwrap();
    let samples = sketch.samples();
    let heavy = samples.iter().find(|s| s.item == 999_999);
    assert_eq!(heavy.map(|s| s.weight), Some(1e12));
}

#[test]
fn string_items_round_trip_through_serialization() {
    let mut sketch: VarOptSketch<String> = VarOptSketch::builder().k(5).build();
    for i in 0..20u64 {
        sketch.update(format!("item-{i}"), (i + 1) as f64).unwrap();
    }
    let serde = StringSerDe;
    let bytes = sketch.serialize(&serde);
    let restored = VarOptSketch::deserialize(&bytes, &serde).unwrap();
    assert_eq!(restored.n(), sketch.n());
    assert_eq!(restored.num_samples(), sketch.num_samples());
}

#[test]
fn spec_scenario_heavy_item_outweighs_three_light_ones() {
    let mut sketch: VarOptSketch<&str> = VarOptSketch::builder().k(3).build();
    sketch.update("A", 1.0).unwrap();
    sketch.update("B", 1.0).unwrap();
    sketch.update("C", 1.0).unwrap();
    sketch.update("D", 100.0).unwrap();

    assert_eq!(sketch.num_samples(), 3);
    let samples = sketch.samples();
    let d = samples.iter().find(|s| s.item == "D").expect("D must survive");
    assert_eq!(d.weight, 100.0);
    let ejected: Vec<&str> = ["A", "B", "C"]
        .into_iter()
        .filter(|name| !samples.iter().any(|s| s.item == *name))
        .collect();
    assert_eq!(ejected.len(), 1);
}

#[test]
fn reservoir_region_stays_populated_past_warmup() {
    let mut sketch: VarOptSketch<u64> = VarOptSketch::builder().k(10).build();
    for i in 0..5_000u64 {
        sketch.update(i, 1.0).unwrap();
    }
    // tau() returns 0.0 only when R holds no items; a long uniform-weight
    // stream must leave R non-empty, never collapsing back to an H-only
    // sketch.
    assert!(sketch.tau() > 0.0);
    assert_eq!(sketch.num_samples(), 10);
}

#[test]
fn rejects_non_positive_or_nan_weights() {
    let mut sketch: VarOptSketch<u64> = VarOptSketch::builder().k(4).build();
    assert!(sketch.update(1, 0.0).is_err());
    assert!(sketch.update(1, -5.0).is_err());
    assert!(sketch.update(1, f64::NAN).is_err());
    assert!(sketch.update(1, f64::INFINITY).is_err());
}
