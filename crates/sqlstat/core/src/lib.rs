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

//! SQL Statement Statistics
//!
//! This crate aggregates live execution statistics per distinct SQL text for
//! a monitored data source. The embedding application intercepts its own
//! driver calls and registers what it observes; the registry turns that into
//! counts, latency distributions and failure samples.
//!
//! # Core Components
//!
//! ## Bounded Accumulation
//! - Statements, batch sizes, update results and failure signatures are all
//!   tracked in fixed-capacity caches that stop growing instead of evicting
//! - Unbounded dynamic SQL degrades to transient accumulators, never to
//!   unbounded memory
//!
//! ## Approximate Distributions
//! - Logarithmic histograms with configurable base, mantissa and rounding
//! - Exponential moving averages of execute and fetch times
//!
//! ## Reporting
//! - Snapshot reports sorted by query text, total time, average time or count
//! - Average active connections and executions per minute
//!
//! # Usage
//!
//! ```rust
//! use sqlstat_core::{ObservedFailure, SortKey, StatisticsConfig, StatisticsRegistry};
//!
//! let registry = StatisticsRegistry::new(StatisticsConfig::default()).unwrap();
//!
//! registry.register_prepare(Some("SELECT * FROM users WHERE id = ?"), None);
//! registry.register_execute(Some("SELECT * FROM users WHERE id = ?"), 2_000_000, None);
//!
//! let failure = ObservedFailure::new("deadlock detected");
//! registry.register_execute(Some("UPDATE users SET name = ?"), 500_000, Some(&failure));
//!
//! let report = registry.report(SortKey::TotalExecuteTime, false);
//! assert_eq!(report.summary.total_execute_count, 2);
//! assert_eq!(report.statements[0].total_execute_time, 2);
//! assert_eq!(report.statements[1].fail_execute_count, Some(1));
//! ```

pub mod average;
pub mod cache;
pub mod config;
pub mod error;
pub mod exceptions;
pub mod histogram;
pub mod monitor;
pub mod registry;
pub mod report;
pub mod statement;

// Re-export commonly used types
pub use average::RunningAverage;
pub use cache::{BoundedKeyedCache, Resolved};
pub use config::{HistogramConfig, StatisticsConfig};
pub use error::{StatsError, StatsResult};
pub use exceptions::{ExceptionSample, ObservedFailure};
pub use histogram::{BucketCounts, LogHistogram, RoundingPolicy, ZERO_BUCKET};
pub use monitor::StatementScope;
pub use registry::{NULL_SQL_KEY, StatisticsRegistry};
pub use report::{ExceptionReport, FetchReport, Report, SortKey, StatementReport, SummaryReport};
pub use statement::StatementStats;
