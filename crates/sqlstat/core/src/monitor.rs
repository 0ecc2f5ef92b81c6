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

//! Explicit instrumentation boundary
//!
//! Applications wrap their own driver calls in a [`StatementScope`] instead of
//! relying on generated proxies. Each wrapper runs the call, measures it, and
//! registers the outcome before handing the driver's result back untouched:
//!
//! ```rust
//! use sqlstat_core::{SortKey, StatisticsRegistry};
//!
//! let registry = StatisticsRegistry::default();
//! let scope = registry.statement(Some("SELECT id FROM users"));
//!
//! let rows: Result<Vec<i64>, std::io::Error> = scope.execute(|| Ok(vec![1, 2, 3]));
//! scope.result_set_size(rows.unwrap().len() as i64);
//!
//! let report = registry.report(SortKey::default(), false);
//! assert_eq!(report.statements[0].execute_count, 1);
//! assert_eq!(report.statements[0].total_result_set_size, Some(3));
//! ```

use std::error::Error;
use std::time::Instant;

use crate::exceptions::ObservedFailure;
use crate::registry::StatisticsRegistry;

/// Registration handle bound to one SQL text
#[derive(Debug, Clone, Copy)]
pub struct StatementScope<'a> {
    registry: &'a StatisticsRegistry,
    sql: Option<&'a str>,
}

impl StatisticsRegistry {
    /// Handle for instrumenting calls that run `sql`; `None` groups under the
    /// sentinel key
    pub fn statement<'a>(&'a self, sql: Option<&'a str>) -> StatementScope<'a> {
        StatementScope { registry: self, sql }
    }
}

fn elapsed_nanos(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

impl<'a> StatementScope<'a> {
    pub fn sql(&self) -> Option<&'a str> {
        self.sql
    }

    /// Runs a prepare call and counts it, failed or not
    pub fn prepare<T, E, F>(&self, prepare: F) -> Result<T, E>
    where
        E: Error,
        F: FnOnce() -> Result<T, E>,
    {
        let result = prepare();
        let failure = result.as_ref().err().map(ObservedFailure::from_error);
        self.registry.register_prepare(self.sql, failure.as_ref());
        result
    }

    /// Runs and times an execute call
    pub fn execute<T, E, F>(&self, execute: F) -> Result<T, E>
    where
        E: Error,
        F: FnOnce() -> Result<T, E>,
    {
        let started = Instant::now();
        let result = execute();
        let elapsed = elapsed_nanos(started);

        let failure = result.as_ref().err().map(ObservedFailure::from_error);
        self.registry.register_execute(self.sql, elapsed, failure.as_ref());
        result
    }

    /// Runs and times an execute call returning an affected-row count, which
    /// is added to the update distribution when the call succeeds
    pub fn execute_update<E, F>(&self, execute: F) -> Result<i64, E>
    where
        E: Error,
        F: FnOnce() -> Result<i64, E>,
    {
        let result = self.execute(execute);
        if let Ok(rows) = &result {
            self.update(*rows);
        }
        result
    }

    /// Records the batch size, then runs and times the batch execution
    pub fn execute_batch<T, E, F>(&self, size: i64, execute: F) -> Result<T, E>
    where
        E: Error,
        F: FnOnce() -> Result<T, E>,
    {
        self.batch(size);
        self.execute(execute)
    }

    /// Runs and times a fetch of already-executed results
    pub fn fetch<T, F>(&self, fetch: F) -> T
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let fetched = fetch();
        self.registry.register_fetch(self.sql, elapsed_nanos(started));
        fetched
    }

    pub fn batch(&self, size: i64) {
        self.registry.register_batch(self.sql, size);
    }

    pub fn update(&self, rows: i64) {
        self.registry.register_update(self.sql, rows);
    }

    pub fn result_set_size(&self, size: i64) {
        self.registry.register_result_set_size(self.sql, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SortKey;
    use std::fmt;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct DriverError(&'static str);

    impl fmt::Display for DriverError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for DriverError {}

    #[test]
    fn test_prepare_registers_success_and_failure() {
        let registry = StatisticsRegistry::default();
        let scope = registry.statement(Some("SELECT 1"));

        assert_eq!(scope.prepare(|| Ok::<_, DriverError>(7)), Ok(7));
        assert_eq!(scope.prepare(|| Err::<i32, _>(DriverError("bad syntax"))), Err(DriverError("bad syntax")));

        let report = registry.report(SortKey::default(), false);
        assert_eq!(report.statements[0].prepare_count, Some(2));
        assert_eq!(registry.total_prepare_count(), 2);
    }

    #[test]
    fn test_execute_failure_is_recorded_and_returned() {
        let registry = StatisticsRegistry::default();
        let scope = registry.statement(Some("DELETE FROM t"));

        let result: Result<(), DriverError> = scope.execute(|| Err(DriverError("permission denied")));
        assert_eq!(result, Err(DriverError("permission denied")));

        let report = registry.report(SortKey::default(), false);
        let statement = &report.statements[0];
        assert_eq!(statement.fail_execute_count, Some(1));
        let exceptions = statement.exceptions.as_ref().unwrap();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].message.ends_with("DriverError: permission denied"));
        assert!(exceptions[0].stack_trace.is_some());
    }

    #[test]
    fn test_execute_is_timed() {
        let registry = StatisticsRegistry::default();
        let scope = registry.statement(Some("SELECT pg_sleep(0.02)"));

        scope
            .execute(|| {
                thread::sleep(Duration::from_millis(20));
                Ok::<_, DriverError>(())
            })
            .unwrap();

        let report = registry.report(SortKey::default(), false);
        assert!(report.statements[0].total_execute_time >= 20);
    }

    #[test]
    fn test_update_and_batch_helpers() {
        let registry = StatisticsRegistry::default();
        let scope = registry.statement(Some("UPDATE t SET x = ?"));

        scope.execute_update(|| Ok::<_, DriverError>(3)).unwrap();
        scope.execute_update(|| Err(DriverError("lock timeout"))).unwrap_err();
        scope.execute_batch(50, || Ok::<_, DriverError>(())).unwrap();

        let report = registry.report(SortKey::default(), false);
        let statement = &report.statements[0];
        assert_eq!(statement.execute_count, 3);
        assert_eq!(statement.fail_execute_count, Some(1));
        assert_eq!(statement.update.as_ref().unwrap().get(&3), Some(&1));
        assert_eq!(statement.batch.as_ref().unwrap().get(&50), Some(&1));
    }

    #[test]
    fn test_fetch_is_timed() {
        let registry = StatisticsRegistry::default();
        let scope = registry.statement(None);

        let rows = scope.fetch(|| {
            thread::sleep(Duration::from_millis(5));
            vec!["a", "b"]
        });
        scope.result_set_size(rows.len() as i64);

        let report = registry.report(SortKey::default(), false);
        let statement = &report.statements[0];
        assert_eq!(statement.sql, crate::registry::NULL_SQL_KEY);
        assert!(statement.fetch.as_ref().unwrap().total_fetch_time >= 5);
        assert_eq!(statement.total_result_set_size, Some(2));
    }
}
