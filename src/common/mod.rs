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

//! Utilities shared across sketch families: hash-table growth policy,
//! confidence-interval math, byte-addressable storage, and the canonical
//! `f64` form used as a hash key by the Theta family.

pub mod byte_store;
pub mod random;

/// Growth policy for a hash-table-backed sketch when it must resize before
/// hitting its nominal capacity.
///
/// The stored value is `lg(growth multiple)`: `X1` means "do not grow
/// automatically" (not itself a valid resize factor for a `ThetaHashTable`,
/// but used by direct/read-only wrappers that forbid growth), `X2` doubles
/// the table, and so on up to `X8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFactor {
    /// No automatic growth.
    X1,
    /// Double the table on each resize.
    X2,
    /// Quadruple the table on each resize.
    X4,
    /// Grow the table eightfold on each resize (the default).
    X8,
}

impl ResizeFactor {
    /// `lg` of the growth multiple this factor applies on each resize.
    pub fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }
}

impl Default for ResizeFactor {
    fn default() -> Self {
        ResizeFactor::X8
    }
}

/// Number of standard deviations used to express a confidence interval on a
/// Theta sketch's cardinality estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStdDev {
    /// ~68.3% confidence.
    One,
    /// ~95.4% confidence.
    Two,
    /// ~99.7% confidence.
    Three,
}

impl NumStdDev {
    fn as_f64(self) -> f64 {
        match self {
            NumStdDev::One => 1.0,
            NumStdDev::Two => 2.0,
            NumStdDev::Three => 3.0,
        }
    }
}

/// Binomial confidence bounds for Theta sketch cardinality estimates.
///
/// The retained-entries count, viewed as a binomial sample taken with
/// inclusion probability `theta`, has a relative standard deviation of
/// `sqrt((1 - theta) / (theta * retained))` once `retained` is large enough
/// for a normal approximation to hold. The bounds below apply that
/// approximation; they intentionally do not special-case small `retained`
/// beyond returning the raw estimate, matching the rest of the family's
/// estimation-mode behavior.
pub(crate) mod binomial_bounds {
    use super::NumStdDev;

    fn relative_std_dev(retained: u64, theta: f64) -> f64 {
        if retained == 0 || theta <= 0.0 {
            return 0.0;
        }
        ((1.0 - theta) / (theta * retained as f64)).max(0.0).sqrt()
    }

    /// Lower bound on the true cardinality at the requested confidence.
    pub(crate) fn lower_bound(retained: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
        if theta <= 0.0 {
            return retained as f64;
        }
        let estimate = retained as f64 / theta;
        let rsd = relative_std_dev(retained, theta);
        (estimate * (1.0 - num_std_dev.as_f64() * rsd)).max(retained as f64)
    }

    /// Upper bound on the true cardinality at the requested confidence.
    ///
    /// `is_empty` sketches report zero in both directions regardless of
    /// `theta`, matching `estimate()`.
    pub(crate) fn upper_bound(
        retained: u64,
        theta: f64,
        num_std_dev: NumStdDev,
        is_empty: bool,
    ) -> f64 {
        if is_empty || theta <= 0.0 {
            return 0.0;
        }
        let estimate = retained as f64 / theta;
        let rsd = relative_std_dev(retained, theta);
        estimate * (1.0 + num_std_dev.as_f64() * rsd)
    }
}

/// Canonicalizes an `f64` the way Java's `Double.doubleToLongBits` does,
/// so that `update_f64` hashes `-0.0` the same as `0.0` and all NaN bit
/// patterns the same as each other. Without this, two logically-equal
/// sketches built by platforms with different NaN payloads would hash
/// a not-a-number input to different entries.
pub(crate) fn canonical_double(value: f64) -> f64 {
    if value.is_nan() {
        f64::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_negative_zero() {
        assert_eq!(canonical_double(-0.0).to_bits(), canonical_double(0.0).to_bits());
    }

    #[test]
    fn canonicalizes_all_nan_payloads() {
        let a = f64::from_bits(0x7ff8_0000_0000_0001);
        let b = f64::from_bits(0xfff8_0000_0000_0002);
        assert_eq!(
            canonical_double(a).to_bits(),
            canonical_double(b).to_bits()
        );
    }

    #[test]
    fn resize_factor_lg_values() {
        assert_eq!(ResizeFactor::X1.lg_value(), 0);
        assert_eq!(ResizeFactor::X2.lg_value(), 1);
        assert_eq!(ResizeFactor::X4.lg_value(), 2);
        assert_eq!(ResizeFactor::X8.lg_value(), 3);
    }

    #[test]
    fn bounds_widen_with_confidence() {
        let theta = 0.25;
        let retained = 1000;
        let lo1 = binomial_bounds::lower_bound(retained, theta, NumStdDev::One);
        let lo3 = binomial_bounds::lower_bound(retained, theta, NumStdDev::Three);
        let hi1 = binomial_bounds::upper_bound(retained, theta, NumStdDev::One, false);
        let hi3 = binomial_bounds::upper_bound(retained, theta, NumStdDev::Three, false);
        assert!(lo3 <= lo1);
        assert!(hi3 >= hi1);
    }

    #[test]
    fn empty_sketch_upper_bound_is_zero() {
        assert_eq!(
            binomial_bounds::upper_bound(0, 1.0, NumStdDev::Two, true),
            0.0
        );
    }
}
