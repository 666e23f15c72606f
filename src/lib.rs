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

//! Compact streaming sketches for massive data.
//!
//! This crate implements three independent sketch families, each usable
//! without the others:
//!
//! - [`theta`]: cardinality (distinct-count) estimation over a stream of
//!   hashable items, with set operations expressed through compact,
//!   serializable snapshots.
//! - [`quantiles`]: rank, quantile, PMF and CDF estimation over a stream
//!   of `f64`s using the classic leveled-buffer algorithm.
//! - [`varopt`]: single-pass, variance-optimal weighted sampling of a
//!   fixed-size subset from a weighted stream of arbitrary items.
//!
//! All three share the same ambient machinery: a single [`error::Error`]
//! type for malformed input and resource limits, a little-endian
//! [`codec`] for serialized forms, and a pluggable [`common::random`]
//! source so sketches that use randomness (quantiles' down-sampling,
//! VarOpt's acceptance draws) can be seeded for reproducible output.

pub(crate) mod codec;
pub mod common;
pub mod error;
pub(crate) mod hash;
pub mod quantiles;
pub mod theta;
pub mod varopt;

pub use error::Error;
pub use error::ErrorKind;
