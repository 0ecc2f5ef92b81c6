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

use parking_lot::Mutex;

use crate::error::{StatsError, StatsResult};

pub(crate) fn validate_smoothing_factor(alpha: f64) -> StatsResult<()> {
    if alpha > 0.0 && alpha <= 1.0 { Ok(()) } else { Err(StatsError::InvalidSmoothingFactor(alpha)) }
}

/// Exponential moving average of a scalar stream
///
/// Starts uninitialized; the first sample is taken verbatim and every later
/// one is blended in with weight `alpha`. The value lives behind its own lock
/// so readers and writers on different threads serialize on the instance.
#[derive(Debug)]
pub struct RunningAverage {
    alpha: f64,
    current: Mutex<Option<f64>>,
}

impl RunningAverage {
    /// Creates an uninitialized average
    ///
    /// # Arguments
    /// * `alpha` - Smoothing factor in (0, 1]; usually below 0.25
    pub fn new(alpha: f64) -> StatsResult<Self> {
        validate_smoothing_factor(alpha)?;
        Ok(Self {
            alpha,
            current: Mutex::new(None),
        })
    }

    /// Creates an average that is already initialized to `value`
    pub fn with_initial(alpha: f64, value: f64) -> StatsResult<Self> {
        validate_smoothing_factor(alpha)?;
        Ok(Self {
            alpha,
            current: Mutex::new(Some(value)),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn update(&self, value: f64) {
        let mut current = self.current.lock();
        *current = Some(match *current {
            Some(prior) => prior * (1.0 - self.alpha) + value * self.alpha,
            None => value,
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.current.lock().is_some()
    }

    pub fn current_or_none(&self) -> Option<f64> {
        *self.current.lock()
    }

    /// Renders the value with `precision` fractional digits, or `"null"`
    pub fn format(&self, precision: usize) -> String {
        match self.current_or_none() {
            Some(value) => format!("{value:.precision$}"),
            None => "null".to_string(),
        }
    }
}

impl Clone for RunningAverage {
    fn clone(&self) -> Self {
        Self {
            alpha: self.alpha,
            current: Mutex::new(self.current_or_none()),
        }
    }
}
