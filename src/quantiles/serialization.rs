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

//! Wire-format constants for the Doubles quantiles family.

pub(crate) const SERIAL_VERSION: u8 = 3;

pub(crate) const PREAMBLE_LONGS_EMPTY: u8 = 1;
pub(crate) const PREAMBLE_LONGS_NON_EMPTY: u8 = 2;

pub(crate) const FLAG_BIG_ENDIAN: u8 = 1 << 0;
pub(crate) const FLAG_READ_ONLY: u8 = 1 << 1;
pub(crate) const FLAG_EMPTY: u8 = 1 << 2;
pub(crate) const FLAG_COMPACT: u8 = 1 << 3;
pub(crate) const FLAG_ORDERED: u8 = 1 << 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_are_distinct() {
        let flags = [
            FLAG_BIG_ENDIAN,
            FLAG_READ_ONLY,
            FLAG_EMPTY,
            FLAG_COMPACT,
            FLAG_ORDERED,
        ];
        for (i, a) in flags.iter().enumerate() {
            for (j, b) in flags.iter().enumerate() {
                if i != j {
                    assert_eq!(a & b, 0);
                }
            }
        }
    }
}
