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

use std::collections::BTreeMap;
use tracing::warn;

use crate::average::RunningAverage;
use crate::cache::BoundedKeyedCache;
use crate::config::StatisticsConfig;
use crate::error::StatsResult;
use crate::exceptions::{ExceptionSample, ObservedFailure};
use crate::histogram::LogHistogram;
use crate::report::{ExceptionReport, FetchReport, NANOS_PER_MILLI, StatementReport, format_avg};

const NANOS_TO_MILLIS: f64 = 0.000_001;

/// Fractional digits used for rendered timings and histogram labels
pub const REPORT_PRECISION: usize = 2;

/// Accumulated statistics of one SQL text
///
/// A plain accumulator: mutation goes through `&mut self`, so whoever owns
/// the value serializes registrations for the statement.
#[derive(Debug, Clone)]
pub struct StatementStats {
    sql: String,
    prepare_count: u64,
    execute_count: u64,
    fail_execute_count: u64,
    total_execute_time_nanos: u64,
    total_fetch_time_nanos: u64,
    total_result_set_size: u64,
    total_empty_result_sets: u64,
    avg_execute_time_ms: RunningAverage,
    avg_fetch_time_ms: RunningAverage,
    execute_time_ms: LogHistogram,
    batch: BoundedKeyedCache<i64, u64>,
    update: BoundedKeyedCache<i64, u64>,
    exceptions: BoundedKeyedCache<String, ExceptionSample>,
}

impl StatementStats {
    pub fn new(sql: impl Into<String>, config: &StatisticsConfig) -> StatsResult<Self> {
        Ok(Self {
            sql: sql.into(),
            prepare_count: 0,
            execute_count: 0,
            fail_execute_count: 0,
            total_execute_time_nanos: 0,
            total_fetch_time_nanos: 0,
            total_result_set_size: 0,
            total_empty_result_sets: 0,
            avg_execute_time_ms: RunningAverage::new(config.smoothing_factor)?,
            avg_fetch_time_ms: RunningAverage::new(config.smoothing_factor)?,
            execute_time_ms: LogHistogram::new(config.histogram)?,
            batch: BoundedKeyedCache::new(config.batch_capacity),
            update: BoundedKeyedCache::new(config.update_capacity),
            exceptions: BoundedKeyedCache::new(config.exception_capacity),
        })
    }

    /// Copy of this accumulator under another SQL text
    ///
    /// Used with an empty prototype to mint fresh accumulators without
    /// revalidating the configuration.
    pub(crate) fn fork(&self, sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), ..self.clone() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn prepare_count(&self) -> u64 {
        self.prepare_count
    }

    pub fn execute_count(&self) -> u64 {
        self.execute_count
    }

    pub fn fail_execute_count(&self) -> u64 {
        self.fail_execute_count
    }

    pub fn total_execute_time_nanos(&self) -> u64 {
        self.total_execute_time_nanos
    }

    pub fn total_fetch_time_nanos(&self) -> u64 {
        self.total_fetch_time_nanos
    }

    pub fn total_result_set_size(&self) -> u64 {
        self.total_result_set_size
    }

    pub fn total_empty_result_sets(&self) -> u64 {
        self.total_empty_result_sets
    }

    /// Mean execute time in nanoseconds, zero before the first execution
    pub fn average_execute_time_nanos(&self) -> f64 {
        if self.execute_count == 0 { 0.0 } else { self.total_execute_time_nanos as f64 / self.execute_count as f64 }
    }

    pub fn execute_histogram(&self) -> &LogHistogram {
        &self.execute_time_ms
    }

    pub fn exception(&self, signature: &str) -> Option<&ExceptionSample> {
        self.exceptions.get(signature)
    }

    /// Prepare failures are accepted for symmetry but only counted
    pub fn record_prepare(&mut self, _failure: Option<&ObservedFailure>) {
        self.prepare_count += 1;
    }

    pub fn record_execute(&mut self, elapsed_nanos: u64, failure: Option<&ObservedFailure>) {
        self.execute_count += 1;
        self.total_execute_time_nanos = self.total_execute_time_nanos.saturating_add(elapsed_nanos);

        let elapsed_ms = elapsed_nanos as f64 * NANOS_TO_MILLIS;
        self.avg_execute_time_ms.update(elapsed_ms);
        if let Err(e) = self.execute_time_ms.add_value(elapsed_ms) {
            warn!(sql = %self.sql, "Skipping execute time sample: {}", e);
        }

        if let Some(failure) = failure {
            self.fail_execute_count += 1;
            self.record_exception(failure);
        }
    }

    pub fn record_fetch(&mut self, elapsed_nanos: u64) {
        self.total_fetch_time_nanos = self.total_fetch_time_nanos.saturating_add(elapsed_nanos);
        self.avg_fetch_time_ms.update(elapsed_nanos as f64 * NANOS_TO_MILLIS);
    }

    pub fn record_batch(&mut self, size: i64) {
        *self.batch.get_or_create(&size, || 0) += 1;
    }

    pub fn record_update_result(&mut self, rows: i64) {
        *self.update.get_or_create(&rows, || 0) += 1;
    }

    pub fn record_result_set_size(&mut self, size: i64) {
        if size > 0 {
            self.total_result_set_size = self.total_result_set_size.saturating_add(size as u64);
        } else {
            self.total_empty_result_sets += 1;
        }
    }

    fn record_exception(&mut self, failure: &ObservedFailure) {
        let mut sample = self.exceptions.get_or_create(failure.signature(), ExceptionSample::new);
        sample.record(failure.stack_trace());
    }

    /// Renders a detached report of this statement
    ///
    /// # Arguments
    /// * `uptime_seconds` - Time the owning registry has been running; values
    ///   below one second count as one
    /// * `plain_text` - Replace line breaks in the SQL text with spaces
    pub fn render(&self, uptime_seconds: u64, plain_text: bool) -> StatementReport {
        let sql = if plain_text { self.sql.replace(['\n', '\r'], " ") } else { self.sql.clone() };

        let fetch = (self.total_fetch_time_nanos > 0).then(|| FetchReport {
            total_fetch_time: self.total_fetch_time_nanos / NANOS_PER_MILLI,
            fetch_avg_total_time: format_avg(self.total_fetch_time_nanos, self.execute_count, NANOS_TO_MILLIS),
            fetch_avg_float_time: self.avg_fetch_time_ms.format(REPORT_PRECISION),
        });

        StatementReport {
            sql,
            prepare_count: (self.prepare_count > 0).then_some(self.prepare_count),
            execute_count: self.execute_count,
            exec_per_minute: format_avg(self.execute_count, uptime_seconds.max(1), 60.0),
            fail_execute_count: (self.fail_execute_count > 0).then_some(self.fail_execute_count),
            total_execute_time: self.total_execute_time_nanos / NANOS_PER_MILLI,
            execute_avg_total_time: format_avg(self.total_execute_time_nanos, self.execute_count, NANOS_TO_MILLIS),
            execute_avg_float_time: self.avg_execute_time_ms.format(REPORT_PRECISION),
            execute_time: self.execute_time_ms.report(REPORT_PRECISION),
            fetch,
            batch: distribution(&self.batch),
            update: distribution(&self.update),
            total_result_set_size: (self.total_result_set_size > 0).then_some(self.total_result_set_size),
            total_empty_result_sets: (self.total_empty_result_sets > 0).then_some(self.total_empty_result_sets),
            exceptions: self.exception_reports(),
        }
    }

    fn exception_reports(&self) -> Option<Vec<ExceptionReport>> {
        if self.exceptions.is_empty() {
            return None;
        }
        let mut reports = Vec::with_capacity(self.exceptions.len());
        self.exceptions.for_each(|signature, sample| {
            reports.push(ExceptionReport {
                message: signature.clone(),
                count: sample.count(),
                stack_trace: sample.stack_trace().map(str::to_string),
            })
        });
        reports.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        Some(reports)
    }
}

fn distribution(counts: &BoundedKeyedCache<i64, u64>) -> Option<BTreeMap<i64, u64>> {
    if counts.is_empty() {
        return None;
    }
    let mut sorted = BTreeMap::new();
    counts.for_each(|value, count| {
        sorted.insert(*value, *count);
    });
    Some(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(sql: &str) -> StatementStats {
        StatementStats::new(sql, &StatisticsConfig::default()).unwrap()
    }

    #[test]
    fn test_execute_accumulates() {
        let mut stats = stats("SELECT 1");
        stats.record_execute(2_000_000, None);
        stats.record_execute(4_000_000, None);

        assert_eq!(stats.execute_count(), 2);
        assert_eq!(stats.total_execute_time_nanos(), 6_000_000);
        assert_eq!(stats.fail_execute_count(), 0);
        assert_eq!(stats.average_execute_time_nanos(), 3_000_000.0);
        assert_eq!(stats.execute_histogram().total_count(), 2);
    }

    #[test]
    fn test_failures_are_sampled() {
        let mut stats = stats("UPDATE t SET x = 1");
        let deadlock = ObservedFailure::new("deadlock detected");
        stats.record_execute(1_000, Some(&deadlock.clone().with_stack_trace("first")));
        stats.record_execute(1_000, Some(&deadlock.with_stack_trace("second")));
        stats.record_execute(1_000, None);

        assert_eq!(stats.execute_count(), 3);
        assert_eq!(stats.fail_execute_count(), 2);
        let sample = stats.exception("deadlock detected").unwrap();
        assert_eq!(sample.count(), 2);
        assert_eq!(sample.stack_trace(), Some("second"));
    }

    #[test]
    fn test_exception_signatures_are_bounded() {
        let config = StatisticsConfig {
            exception_capacity: 2,
            ..StatisticsConfig::default()
        };
        let mut stats = StatementStats::new("SELECT 1", &config).unwrap();
        for signature in ["a", "b", "c", "c"] {
            stats.record_execute(10, Some(&ObservedFailure::new(signature)));
        }

        assert_eq!(stats.fail_execute_count(), 4);
        let report = stats.render(60, false);
        let messages: Vec<&str> = report.exceptions.as_ref().unwrap().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_distributions() {
        let mut stats = stats("INSERT INTO t VALUES (?)");
        for _ in 0..5 {
            stats.record_batch(10);
        }
        for _ in 0..3 {
            stats.record_batch(20);
        }
        stats.record_update_result(1);
        stats.record_update_result(0);

        let report = stats.render(1, false);
        assert_eq!(report.batch, Some(BTreeMap::from([(10, 5), (20, 3)])));
        assert_eq!(report.update, Some(BTreeMap::from([(0, 1), (1, 1)])));
    }

    #[test]
    fn test_batch_distribution_is_bounded() {
        let mut stats = stats("INSERT INTO t VALUES (?)");
        for size in 0..20 {
            stats.record_batch(size);
        }
        assert_eq!(stats.render(1, false).batch.unwrap().len(), 16);
    }

    #[test]
    fn test_result_set_sizes() {
        let mut stats = stats("SELECT * FROM t");
        stats.record_result_set_size(5);
        stats.record_result_set_size(7);
        stats.record_result_set_size(0);

        assert_eq!(stats.total_result_set_size(), 12);
        assert_eq!(stats.total_empty_result_sets(), 1);
    }

    #[test]
    fn test_render_minimal_statement() {
        let mut stats = stats("SELECT 1");
        stats.record_execute(2_000_000, None);

        let report = stats.render(60, false);
        assert_eq!(report.sql, "SELECT 1");
        assert_eq!(report.prepare_count, None);
        assert_eq!(report.execute_count, 1);
        assert_eq!(report.exec_per_minute, "1.00");
        assert_eq!(report.fail_execute_count, None);
        assert_eq!(report.total_execute_time, 2);
        assert_eq!(report.execute_avg_total_time, "2.00");
        assert_eq!(report.execute_avg_float_time, "2.00");
        assert_eq!(report.execute_time.get("2.00"), Some(1));
        assert_eq!(report.fetch, None);
        assert_eq!(report.batch, None);
        assert_eq!(report.update, None);
        assert_eq!(report.total_result_set_size, None);
        assert_eq!(report.total_empty_result_sets, None);
        assert_eq!(report.exceptions, None);
    }

    #[test]
    fn test_render_fetch_section() {
        let mut stats = stats("SELECT * FROM t");
        stats.record_prepare(None);
        stats.record_execute(1_000_000, None);
        stats.record_fetch(3_000_000);

        let report = stats.render(60, false);
        assert_eq!(report.prepare_count, Some(1));
        let fetch = report.fetch.unwrap();
        assert_eq!(fetch.total_fetch_time, 3);
        assert_eq!(fetch.fetch_avg_total_time, "3.00");
        assert_eq!(fetch.fetch_avg_float_time, "3.00");
    }

    #[test]
    fn test_render_plain_text() {
        let mut stats = stats("SELECT *\r\nFROM t\nWHERE id = ?");
        stats.record_execute(0, None);

        assert_eq!(stats.render(1, true).sql, "SELECT *  FROM t WHERE id = ?");
        assert_eq!(stats.render(1, false).sql, "SELECT *\r\nFROM t\nWHERE id = ?");
    }

    #[test]
    fn test_exec_per_minute_floors_uptime() {
        let mut stats = stats("SELECT 1");
        stats.record_execute(0, None);
        stats.record_execute(0, None);

        assert_eq!(stats.render(0, false).exec_per_minute, "120.00");
        assert_eq!(stats.render(1, false).exec_per_minute, "120.00");
        assert_eq!(stats.render(120, false).exec_per_minute, "1.00");
    }

    #[test]
    fn test_fork_is_fresh() {
        let prototype = stats("");
        let mut first = prototype.fork("SELECT 1");
        first.record_execute(5, None);

        let second = prototype.fork("SELECT 2");
        assert_eq!(first.sql(), "SELECT 1");
        assert_eq!(second.sql(), "SELECT 2");
        assert_eq!(second.execute_count(), 0);
        assert!(second.execute_histogram().is_empty());
    }
}
