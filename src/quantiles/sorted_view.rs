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

//! The weighted empirical distribution a quantiles sketch answers queries
//! against: base-buffer items carry weight 1, level `l` items carry weight
//! `2^(l+1)`, merged into one ascending, cumulative-weight view.

struct Entry {
    item: f64,
    cumulative_weight: u64,
}

pub(crate) struct SortedView {
    entries: Vec<Entry>,
    total_weight: u64,
}

impl SortedView {
    pub fn build(base_buffer: &[f64], levels: &[Vec<f64>]) -> Self {
        let mut weighted: Vec<(f64, u64)> = base_buffer.iter().map(|&v| (v, 1u64)).collect();
        for (level_index, level) in levels.iter().enumerate() {
            if level.is_empty() {
                continue;
            }
            let weight = 1u64 << (level_index + 1);
            weighted.extend(level.iter().map(|&v| (v, weight)));
        }
        weighted.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("quantiles items must not be NaN"));

        let mut entries = Vec::with_capacity(weighted.len());
        let mut cumulative = 0u64;
        for (item, weight) in weighted {
            cumulative += weight;
            entries.push(Entry {
                item,
                cumulative_weight: cumulative,
            });
        }

        Self {
            entries,
            total_weight: cumulative,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fraction of total weight at or below (or strictly below, if
    /// `!inclusive`) `value`.
    pub fn rank(&self, value: f64, inclusive: bool) -> f64 {
        if self.entries.is_empty() {
            return f64::NAN;
        }
        let idx = if inclusive {
            self.entries.partition_point(|e| e.item <= value)
        } else {
            self.entries.partition_point(|e| e.item < value)
        };
        if idx == 0 {
            0.0
        } else {
            self.entries[idx - 1].cumulative_weight as f64 / self.total_weight as f64
        }
    }

    /// The smallest item whose cumulative weight reaches `rank` of the
    /// total, i.e. the inverse of [`Self::rank`].
    pub fn quantile(&self, rank: f64, inclusive: bool) -> f64 {
        if self.entries.is_empty() {
            return f64::NAN;
        }
        let target = ((rank * self.total_weight as f64).ceil() as u64)
            .clamp(1, self.total_weight);
        let idx = if inclusive {
            self.entries.partition_point(|e| e.cumulative_weight < target)
        } else {
            self.entries.partition_point(|e| e.cumulative_weight <= target - 1)
        };
        self.entries[idx.min(self.entries.len() - 1)].item
    }

    pub fn cdf(&self, split_points: &[f64], inclusive: bool) -> Vec<f64> {
        check_split_points(split_points);
        split_points.iter().map(|&sp| self.rank(sp, inclusive)).collect()
    }

    pub fn pmf(&self, split_points: &[f64], inclusive: bool) -> Vec<f64> {
        let cdf = self.cdf(split_points, inclusive);
        let mut pmf = Vec::with_capacity(cdf.len() + 1);
        let mut prev = 0.0;
        for c in &cdf {
            pmf.push(c - prev);
            prev = *c;
        }
        pmf.push(1.0 - prev);
        pmf
    }
}

fn check_split_points(split_points: &[f64]) {
    assert!(
        split_points.iter().all(|v| !v.is_nan()),
        "split points must not be NaN"
    );
    assert!(
        split_points.windows(2).all(|w| w[0] < w[1]),
        "split points must be strictly increasing"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_and_quantile_are_consistent_on_uniform_weights() {
        let base: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let view = SortedView::build(&base, &[]);
        assert_eq!(view.rank(3.5, true), 4.0 / 8.0);
        assert_eq!(view.quantile(0.5, true), 3.0);
    }

    #[test]
    fn level_items_carry_more_weight() {
        let base = vec![100.0];
        let levels = vec![vec![1.0, 2.0]];
        let view = SortedView::build(&base, &levels);
        // level 0 weight is 2 per item, base weight is 1: total = 1 + 2*2 = 5
        assert_eq!(view.rank(2.0, true), 4.0 / 5.0);
    }

    #[test]
    fn cdf_and_pmf_sum_to_one() {
        let base: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let view = SortedView::build(&base, &[]);
        let pmf = view.pmf(&[3.0, 6.0], true);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic]
    fn rejects_non_increasing_split_points() {
        let view = SortedView::build(&[1.0, 2.0], &[]);
        view.cdf(&[2.0, 1.0], true);
    }
}
