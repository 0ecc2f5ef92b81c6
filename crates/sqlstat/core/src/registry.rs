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
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::cache::{BoundedKeyedCache, Resolved};
use crate::config::StatisticsConfig;
use crate::error::StatsResult;
use crate::exceptions::ObservedFailure;
use crate::report::{NANOS_PER_MILLI, Report, SortKey, SummaryReport, format_avg};
use crate::statement::StatementStats;

/// Key under which registrations without SQL text are grouped
pub const NULL_SQL_KEY: &str = "[null]";

#[derive(Debug)]
struct RegistryState {
    total_prepare_count: u64,
    total_execute_count: u64,
    total_execute_time_nanos: u64,
    total_fetch_time_nanos: u64,
    statements: BoundedKeyedCache<String, StatementStats>,
}

impl RegistryState {
    fn new(capacity: usize) -> Self {
        Self {
            total_prepare_count: 0,
            total_execute_count: 0,
            total_execute_time_nanos: 0,
            total_fetch_time_nanos: 0,
            statements: BoundedKeyedCache::new(capacity),
        }
    }

    fn statement<'a>(&'a mut self, prototype: &StatementStats, sql: Option<&str>) -> Resolved<'a, StatementStats> {
        let key = sql.unwrap_or(NULL_SQL_KEY);
        let capacity = self.statements.capacity();
        let mut created = false;
        let resolved = self.statements.get_or_create(key, || {
            created = true;
            prototype.fork(key)
        });
        match (created, resolved.is_cached()) {
            (true, true) => debug!(sql = key, "Tracking new statement"),
            (true, false) => trace!(sql = key, capacity, "Statement cache full, statistics for this call are not retained"),
            _ => {}
        }
        resolved
    }
}

/// Per-statement execution statistics of one monitored data source
///
/// Every registration and report call serializes on a single lock. Database
/// round trips dwarf the bookkeeping done here, so contention on that lock
/// stays low and reports are always consistent across statements.
#[derive(Debug)]
pub struct StatisticsRegistry {
    config: StatisticsConfig,
    prototype: StatementStats,
    started_at: Instant,
    state: Mutex<RegistryState>,
}

impl StatisticsRegistry {
    pub fn new(config: StatisticsConfig) -> StatsResult<Self> {
        Self::new_started_at(config, Instant::now())
    }

    /// Creates a registry whose uptime is measured from `started_at`
    pub fn new_started_at(config: StatisticsConfig, started_at: Instant) -> StatsResult<Self> {
        config.validate()?;
        let prototype = StatementStats::new(NULL_SQL_KEY, &config)?;
        let state = Mutex::new(RegistryState::new(config.statement_capacity));
        Ok(Self {
            config,
            prototype,
            started_at,
            state,
        })
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Time since the registry was created; not restarted by [`reset`](Self::reset)
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn uptime_millis(&self) -> u64 {
        match self.uptime().as_millis() as u64 {
            0 => 1000,
            millis => millis,
        }
    }

    pub fn tracked_statements(&self) -> usize {
        self.state.lock().statements.len()
    }

    pub fn total_prepare_count(&self) -> u64 {
        self.state.lock().total_prepare_count
    }

    pub fn register_prepare(&self, sql: Option<&str>, failure: Option<&ObservedFailure>) {
        let mut state = self.state.lock();
        state.total_prepare_count += 1;
        state.statement(&self.prototype, sql).record_prepare(failure);
    }

    pub fn register_execute(&self, sql: Option<&str>, elapsed_nanos: u64, failure: Option<&ObservedFailure>) {
        let mut state = self.state.lock();
        state.total_execute_count += 1;
        state.total_execute_time_nanos = state.total_execute_time_nanos.saturating_add(elapsed_nanos);
        state.statement(&self.prototype, sql).record_execute(elapsed_nanos, failure);
    }

    pub fn register_fetch(&self, sql: Option<&str>, elapsed_nanos: u64) {
        let mut state = self.state.lock();
        state.total_fetch_time_nanos = state.total_fetch_time_nanos.saturating_add(elapsed_nanos);
        state.statement(&self.prototype, sql).record_fetch(elapsed_nanos);
    }

    pub fn register_batch(&self, sql: Option<&str>, size: i64) {
        self.state.lock().statement(&self.prototype, sql).record_batch(size);
    }

    pub fn register_update(&self, sql: Option<&str>, rows: i64) {
        self.state.lock().statement(&self.prototype, sql).record_update_result(rows);
    }

    pub fn register_result_set_size(&self, sql: Option<&str>, size: i64) {
        self.state.lock().statement(&self.prototype, sql).record_result_set_size(size);
    }

    pub fn short_report(&self) -> SummaryReport {
        let state = self.state.lock();
        self.summarize(&state)
    }

    fn summarize(&self, state: &RegistryState) -> SummaryReport {
        // Connection busy time over lifetime; concurrent work pushes this past 1.0
        let busy_millis = state.total_execute_time_nanos.saturating_add(state.total_fetch_time_nanos) / NANOS_PER_MILLI;
        SummaryReport {
            total_execute_count: state.total_execute_count,
            total_execute_time_ms: state.total_execute_time_nanos / NANOS_PER_MILLI,
            avg_active: format_avg(busy_millis, self.uptime_millis(), 1.0),
        }
    }

    /// Summary plus one record per tracked statement, ordered by `sort_key`
    pub fn report(&self, sort_key: SortKey, plain_text: bool) -> Report {
        let (summary, mut statements) = {
            let state = self.state.lock();
            (self.summarize(&state), state.statements.snapshot_values())
        };

        match sort_key {
            SortKey::Query => statements.sort_by_cached_key(|stats| stats.sql().to_lowercase()),
            SortKey::TotalExecuteTime => statements.sort_by(|a, b| b.total_execute_time_nanos().cmp(&a.total_execute_time_nanos())),
            SortKey::AverageExecuteTime => statements.sort_by(|a, b| b.average_execute_time_nanos().total_cmp(&a.average_execute_time_nanos())),
            SortKey::ExecuteCount => statements.sort_by(|a, b| b.execute_count().cmp(&a.execute_count())),
        }

        let uptime_seconds = self.uptime_millis() / 1000;
        Report {
            summary,
            statements: statements.iter().map(|stats| stats.render(uptime_seconds, plain_text)).collect(),
        }
    }

    /// Forgets every statement and zeroes the totals; uptime keeps running
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = RegistryState::new(self.config.statement_capacity);
        info!("Statistics registry reset");
    }
}

impl Default for StatisticsRegistry {
    fn default() -> Self {
        Self::new(StatisticsConfig::default()).expect("default statistics configuration is valid")
    }
}
