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

//! VarOpt weighted-sampling sketches: a single-pass, variance-optimal
//! sample of `k` items from a weighted stream.
//!
//! Items heavier than the current light-item threshold `tau` are kept
//! exactly in a min-heap (the "H" region); everything else shares one
//! reservoir (the "R" region) whose members all report the same estimated
//! weight `tau`. [`sketch::VarOptSketch`] is generic over the sampled item
//! type and is serialized via a caller-supplied [`serde::ArrayOfItemsSerDe`].

pub(crate) mod serde;
pub(crate) mod serialization;
pub mod sketch;

pub use serde::ArrayOfItemsSerDe;
pub use serde::F64SerDe;
pub use serde::I64SerDe;
pub use serde::StringSerDe;
pub use serde::U64SerDe;
pub use sketch::Sample;
pub use sketch::VarOptSketch;
pub use sketch::VarOptSketchBuilder;

pub(crate) const MIN_K: u32 = 1;
pub(crate) const MAX_K: u32 = 1 << 30;

/// A VarOpt sketch refuses to accept more than this many items: the
/// underlying `n` counter is a 48-bit quantity in the serialized form.
pub(crate) const MAX_ITEMS_SEEN: u64 = (1u64 << 48) - 1;
