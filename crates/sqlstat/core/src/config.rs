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

//! Configuration for the statistics registry.
//!
//! All values have defaults matching the reference tuning, so an empty TOML
//! document deserializes into a usable configuration:
//!
//! ```toml
//! smoothing_factor = 0.2
//! statement_capacity = 256
//!
//! [histogram]
//! base = 1.4142135623730951
//! rounding = "floor"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};
use crate::histogram::RoundingPolicy;

pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.2;
pub const DEFAULT_STATEMENT_CAPACITY: usize = 256;
pub const DEFAULT_BATCH_CAPACITY: usize = 16;
pub const DEFAULT_UPDATE_CAPACITY: usize = 16;
pub const DEFAULT_EXCEPTION_CAPACITY: usize = 5;
pub const DEFAULT_HISTOGRAM_MANTISSA: f64 = 1.0;

/// Bucketing parameters of a [`LogHistogram`](crate::histogram::LogHistogram)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Scale of bucket zero; a value equal to the mantissa lands in bucket 0
    pub mantissa: f64,
    /// Growth factor between adjacent buckets
    pub base: f64,
    pub rounding: RoundingPolicy,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            mantissa: DEFAULT_HISTOGRAM_MANTISSA,
            base: std::f64::consts::SQRT_2,
            rounding: RoundingPolicy::Nearest,
        }
    }
}

impl HistogramConfig {
    pub fn validate(&self) -> StatsResult<()> {
        // Non-finite parameters would push positive values into the zero bucket
        if !(self.mantissa > 0.0 && self.mantissa.is_finite()) {
            return Err(StatsError::InvalidMantissa(self.mantissa));
        }
        if !(self.base > 1.0 && self.base.is_finite()) {
            return Err(StatsError::InvalidBase(self.base));
        }
        Ok(())
    }
}

/// Registry-wide tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Weight of the newest sample in the running execute/fetch averages
    pub smoothing_factor: f64,
    /// Maximum number of distinct SQL texts retained
    pub statement_capacity: usize,
    /// Maximum number of distinct batch sizes counted per statement
    pub batch_capacity: usize,
    /// Maximum number of distinct update results counted per statement
    pub update_capacity: usize,
    /// Maximum number of distinct exception signatures kept per statement
    pub exception_capacity: usize,
    pub histogram: HistogramConfig,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            statement_capacity: DEFAULT_STATEMENT_CAPACITY,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            exception_capacity: DEFAULT_EXCEPTION_CAPACITY,
            histogram: HistogramConfig::default(),
        }
    }
}

impl StatisticsConfig {
    pub fn with_statement_capacity(mut self, capacity: usize) -> Self {
        self.statement_capacity = capacity;
        self
    }

    pub fn with_smoothing_factor(mut self, smoothing_factor: f64) -> Self {
        self.smoothing_factor = smoothing_factor;
        self
    }

    pub fn with_histogram(mut self, histogram: HistogramConfig) -> Self {
        self.histogram = histogram;
        self
    }

    /// Checks every range constraint, reporting the first violation found
    pub fn validate(&self) -> StatsResult<()> {
        crate::average::validate_smoothing_factor(self.smoothing_factor)?;
        self.histogram.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StatisticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.statement_capacity, 256);
        assert_eq!(config.batch_capacity, 16);
        assert_eq!(config.update_capacity, 16);
        assert_eq!(config.exception_capacity, 5);
        assert_eq!(config.histogram.rounding, RoundingPolicy::Nearest);
    }

    #[test]
    fn test_invalid_smoothing_factor() {
        let config = StatisticsConfig::default().with_smoothing_factor(0.0);
        assert_eq!(config.validate(), Err(StatsError::InvalidSmoothingFactor(0.0)));

        let config = StatisticsConfig::default().with_smoothing_factor(1.5);
        assert_eq!(config.validate(), Err(StatsError::InvalidSmoothingFactor(1.5)));
    }

    #[test]
    fn test_invalid_histogram_parameters() {
        let histogram = HistogramConfig { base: 1.0, ..HistogramConfig::default() };
        assert_eq!(histogram.validate(), Err(StatsError::InvalidBase(1.0)));

        let histogram = HistogramConfig { mantissa: -2.0, ..HistogramConfig::default() };
        assert_eq!(histogram.validate(), Err(StatsError::InvalidMantissa(-2.0)));

        let histogram = HistogramConfig { base: f64::NAN, ..HistogramConfig::default() };
        assert!(matches!(histogram.validate(), Err(StatsError::InvalidBase(_))));

        let histogram = HistogramConfig { base: f64::INFINITY, ..HistogramConfig::default() };
        assert_eq!(histogram.validate(), Err(StatsError::InvalidBase(f64::INFINITY)));

        let histogram = HistogramConfig { mantissa: f64::INFINITY, ..HistogramConfig::default() };
        assert_eq!(histogram.validate(), Err(StatsError::InvalidMantissa(f64::INFINITY)));

        let histogram = HistogramConfig { mantissa: f64::NAN, ..HistogramConfig::default() };
        assert!(matches!(histogram.validate(), Err(StatsError::InvalidMantissa(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StatisticsConfig = serde_json::from_str(r#"{"statement_capacity": 8, "histogram": {"rounding": "ceiling"}}"#).unwrap();
        assert_eq!(config.statement_capacity, 8);
        assert_eq!(config.smoothing_factor, DEFAULT_SMOOTHING_FACTOR);
        assert_eq!(config.histogram.rounding, RoundingPolicy::Ceiling);
        assert_eq!(config.histogram.base, std::f64::consts::SQRT_2);
    }
}
