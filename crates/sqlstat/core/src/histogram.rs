// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Logarithmic histogram
//!
//! Values are grouped by order of magnitude instead of being stored, which
//! keeps the number of buckets small no matter how many samples arrive. A
//! value `v > 0` lands in bucket `round(log_base(v / mantissa))`; zero gets the
//! reserved bucket [`ZERO_BUCKET`]. With the default base of √2 adjacent
//! buckets are about 41% apart, which is fine-grained enough for latencies.

use dashmap::DashMap;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::HistogramConfig;
use crate::error::{StatsError, StatsResult};

/// Bucket index reserved for the value zero; below every computed index
pub const ZERO_BUCKET: i64 = i64::MIN;

/// How a fractional logarithm is mapped to a bucket index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingPolicy {
    /// Halves round upward, so -2.5 maps to -2
    #[default]
    Nearest,
    Floor,
    Ceiling,
}

impl RoundingPolicy {
    pub fn apply(self, exponent: f64) -> i64 {
        // `as` saturates, so infinite exponents pin to the extreme buckets
        match self {
            RoundingPolicy::Nearest => (exponent + 0.5).floor() as i64,
            RoundingPolicy::Floor => exponent.floor() as i64,
            RoundingPolicy::Ceiling => exponent.ceil() as i64,
        }
    }
}

/// Formatted bucket values with their counts, ascending by value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketCounts(Vec<(String, u64)>);

impl BucketCounts {
    pub fn get(&self, value: &str) -> Option<u64> {
        self.0.iter().find(|(label, _)| label == value).map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(label, count)| (label.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, count)| count).sum()
    }
}

impl Serialize for BucketCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(label, count)| (label, count)))
    }
}

/// Approximate distribution of non-negative values on a logarithmic scale
///
/// Bucket counters are atomics inside a concurrent map, so `add_value` only
/// needs a shared reference and never blocks on other buckets.
/// Shards per bucket map; histograms are cloned for every untracked statement
/// so they stay small regardless of core count
const BUCKET_SHARDS: usize = 4;

#[derive(Debug)]
pub struct LogHistogram {
    buckets: DashMap<i64, AtomicU64>,
    mantissa: f64,
    base: f64,
    log_base: f64,
    rounding: RoundingPolicy,
}

impl LogHistogram {
    pub fn new(config: HistogramConfig) -> StatsResult<Self> {
        config.validate()?;
        Ok(Self {
            buckets: DashMap::with_shard_amount(BUCKET_SHARDS),
            mantissa: config.mantissa,
            base: config.base,
            log_base: config.base.ln(),
            rounding: config.rounding,
        })
    }

    pub fn mantissa(&self) -> f64 {
        self.mantissa
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn rounding(&self) -> RoundingPolicy {
        self.rounding
    }

    /// Bucket index that `value` falls into
    pub fn bucket_index(&self, value: f64) -> StatsResult<i64> {
        if !(value >= 0.0) {
            return Err(StatsError::InvalidSample(value));
        }
        if value == 0.0 {
            return Ok(ZERO_BUCKET);
        }
        Ok(self.rounding.apply((value / self.mantissa).ln() / self.log_base))
    }

    /// Counts one occurrence of `value`
    pub fn add_value(&self, value: f64) -> StatsResult<()> {
        let index = self.bucket_index(value)?;
        if let Some(counter) = self.buckets.get(&index) {
            counter.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.buckets.entry(index).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Representative value of a bucket
    pub fn bucket_value(&self, index: i64) -> f64 {
        if index == ZERO_BUCKET { 0.0 } else { self.mantissa * self.base.powf(index as f64) }
    }

    /// Occurrence count of a single bucket, zero if never populated
    pub fn bucket_count(&self, index: i64) -> u64 {
        self.buckets.get(&index).map(|counter| counter.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|entry| entry.value().load(Ordering::Relaxed)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Reconstructed bucket values and their counts, ascending by value
    pub fn snapshot(&self) -> Vec<(f64, u64)> {
        let mut populated: Vec<(i64, u64)> = self.buckets.iter().map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed))).collect();
        // Reconstruction is monotonic in the index since base > 1
        populated.sort_unstable_by_key(|(index, _)| *index);
        populated.into_iter().map(|(index, count)| (self.bucket_value(index), count)).collect()
    }

    /// Bucket values formatted with `precision` fractional digits
    ///
    /// Distinct buckets that format to the same text are merged and their
    /// counts summed. Formatting preserves order, so colliding labels are
    /// always adjacent.
    pub fn report(&self, precision: usize) -> BucketCounts {
        let mut merged: Vec<(String, u64)> = Vec::new();
        for (value, count) in self.snapshot() {
            let label = format!("{value:.precision$}");
            match merged.last_mut() {
                Some((last, total)) if *last == label => *total += count,
                _ => merged.push((label, count)),
            }
        }
        BucketCounts(merged)
    }
}

impl Clone for LogHistogram {
    fn clone(&self) -> Self {
        let buckets = DashMap::with_shard_amount(BUCKET_SHARDS);
        for entry in self.buckets.iter() {
            buckets.insert(*entry.key(), AtomicU64::new(entry.value().load(Ordering::Relaxed)));
        }
        Self {
            buckets,
            mantissa: self.mantissa,
            base: self.base,
            log_base: self.log_base,
            rounding: self.rounding,
        }
    }
}
