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

//! Event log replay
//!
//! An event log is a JSON-lines file, one registration per line, as an
//! interception layer would emit them:
//!
//! ```text
//! {"kind":"prepare","sql":"SELECT 1"}
//! {"kind":"execute","sql":"SELECT 1","elapsed_ns":2000000}
//! {"kind":"execute","sql":"SELECT 1","elapsed_ns":900,"error":"timeout","stack_trace":"..."}
//! {"kind":"fetch","sql":"SELECT 1","elapsed_ns":150000}
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlstat_core::{ObservedFailure, StatisticsRegistry};
use std::io::BufRead;
use tracing::debug;

/// One registration recorded by an interception layer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Prepare {
        sql: Option<String>,
        error: Option<String>,
        stack_trace: Option<String>,
    },
    Execute {
        sql: Option<String>,
        elapsed_ns: u64,
        error: Option<String>,
        stack_trace: Option<String>,
    },
    Fetch {
        sql: Option<String>,
        elapsed_ns: u64,
    },
    Batch {
        sql: Option<String>,
        size: i64,
    },
    Update {
        sql: Option<String>,
        rows: i64,
    },
    ResultSet {
        sql: Option<String>,
        size: i64,
    },
}

fn failure(error: &Option<String>, stack_trace: &Option<String>) -> Option<ObservedFailure> {
    let error = error.as_ref()?;
    let failure = ObservedFailure::new(error.as_str());
    Some(match stack_trace {
        Some(trace) => failure.with_stack_trace(trace.as_str()),
        None => failure,
    })
}

impl Event {
    pub fn apply(&self, registry: &StatisticsRegistry) {
        match self {
            Event::Prepare { sql, error, stack_trace } => {
                registry.register_prepare(sql.as_deref(), failure(error, stack_trace).as_ref());
            }
            Event::Execute { sql, elapsed_ns, error, stack_trace } => {
                registry.register_execute(sql.as_deref(), *elapsed_ns, failure(error, stack_trace).as_ref());
            }
            Event::Fetch { sql, elapsed_ns } => registry.register_fetch(sql.as_deref(), *elapsed_ns),
            Event::Batch { sql, size } => registry.register_batch(sql.as_deref(), *size),
            Event::Update { sql, rows } => registry.register_update(sql.as_deref(), *rows),
            Event::ResultSet { sql, size } => registry.register_result_set_size(sql.as_deref(), *size),
        }
    }
}

/// Applies every event in `reader` to `registry`, returning how many were applied
///
/// Blank lines are skipped; the first malformed line aborts the replay.
pub fn replay<R: BufRead>(reader: R, registry: &StatisticsRegistry) -> Result<usize> {
    let mut applied = 0;
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_number))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: Event = serde_json::from_str(&line).with_context(|| format!("Invalid event on line {}", line_number))?;
        event.apply(registry);
        applied += 1;
    }
    debug!("Replayed {} events", applied);
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlstat_core::SortKey;
    use std::io::Cursor;

    #[test]
    fn test_parse_events() {
        let event: Event = serde_json::from_str(r#"{"kind":"execute","sql":"SELECT 1","elapsed_ns":5}"#).unwrap();
        assert_eq!(
            event,
            Event::Execute {
                sql: Some("SELECT 1".to_string()),
                elapsed_ns: 5,
                error: None,
                stack_trace: None,
            }
        );

        let event: Event = serde_json::from_str(r#"{"kind":"result_set","size":0}"#).unwrap();
        assert_eq!(event, Event::ResultSet { sql: None, size: 0 });
    }

    #[test]
    fn test_replay() {
        let log = r#"
{"kind":"prepare","sql":"SELECT 1"}
{"kind":"execute","sql":"SELECT 1","elapsed_ns":2000000}

{"kind":"execute","sql":"SELECT 1","elapsed_ns":1000000,"error":"timeout","stack_trace":"at pool.rs:10"}
{"kind":"fetch","sql":"SELECT 1","elapsed_ns":3000000}
{"kind":"batch","sql":"INSERT INTO t VALUES (?)","size":10}
{"kind":"update","sql":"INSERT INTO t VALUES (?)","rows":1}
{"kind":"result_set","sql":null,"size":4}
"#;
        let registry = StatisticsRegistry::default();
        assert_eq!(replay(Cursor::new(log), &registry).unwrap(), 7);

        let report = registry.report(SortKey::Query, false);
        assert_eq!(report.summary.total_execute_count, 2);
        let select = report.statement("SELECT 1").unwrap();
        assert_eq!(select.prepare_count, Some(1));
        assert_eq!(select.fail_execute_count, Some(1));
        assert_eq!(select.exceptions.as_ref().unwrap()[0].stack_trace.as_deref(), Some("at pool.rs:10"));
        assert_eq!(report.statement("[null]").unwrap().total_result_set_size, Some(4));
        assert_eq!(report.statements.len(), 3);
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let log = "{\"kind\":\"execute\",\"sql\":\"SELECT 1\",\"elapsed_ns\":1}\n{\"kind\":\"explain\"}\n";
        let registry = StatisticsRegistry::default();

        let err = replay(Cursor::new(log), &registry).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
