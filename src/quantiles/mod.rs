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

//! Doubles quantiles sketches: the classic leveled-buffer algorithm for
//! rank, quantile, PMF and CDF estimation over a stream of `f64`s.
//!
//! A full base buffer of `2k` items is sorted and down-sampled to `k`,
//! then propagated upward through a binary-counter-indexed hierarchy of
//! level buffers, merging with and re-down-sampling any level it collides
//! with along the way. [`sketch::DoublesSketch`] is the heap-resident
//! entry point; [`direct::DirectDoublesSketch`] stores the same state in
//! a caller-supplied [`crate::common::byte_store::ByteStore`].

pub mod direct;
pub(crate) mod helper;
pub mod sketch;
pub(crate) mod sorted_view;
pub(crate) mod serialization;

pub use direct::DirectDoublesSketch;
pub use sketch::DoublesSketch;
pub use sketch::DoublesSketchBuilder;

pub(crate) const MIN_K: u16 = 2;
pub(crate) const MAX_K: u16 = 1 << 15;
pub(crate) const DEFAULT_K: u16 = 128;
