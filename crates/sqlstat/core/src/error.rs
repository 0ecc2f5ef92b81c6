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

use thiserror::Error;

/// Errors raised by the statistics core.
///
/// Every variant signals misuse by the caller: either a configuration value
/// outside its legal range or an illegal sample. Failures observed on the
/// monitored database are never reported through this type, they are
/// recorded as data instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("Invalid smoothing factor {0}: must be in (0, 1]")]
    InvalidSmoothingFactor(f64),
    #[error("Invalid histogram base {0}: must be greater than 1")]
    InvalidBase(f64),
    #[error("Invalid histogram mantissa {0}: must be greater than 0")]
    InvalidMantissa(f64),
    #[error("Invalid sample {0}: must be a non-negative number")]
    InvalidSample(f64),
}

pub type StatsResult<T> = Result<T, StatsError>;
