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

//! Theta sketches: hash-set based cardinality estimation with a
//! dynamically shrinking retention threshold.
//!
//! [`ThetaSketch`] is the heap-resident, mutable entry point most callers
//! want. [`CompactThetaSketch`] is its immutable, serialization-friendly
//! counterpart. [`direct::DirectThetaSketch`] stores the same updatable
//! layout over a caller-supplied [`crate::common::byte_store::ByteStore`].

pub(crate) mod compact;
pub mod direct;
pub(crate) mod hash_table;
pub(crate) mod serialization;
pub mod sketch;

pub use compact::CompactThetaSketch;
pub use direct::DirectThetaSketch;
pub use hash_table::UpdateResult;
pub use sketch::ThetaSketch;
pub use sketch::ThetaSketchBuilder;
