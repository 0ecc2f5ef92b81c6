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

//! Report records
//!
//! Reports are detached copies of the registry's state. They serialize into
//! camelCase key-value records whose field order is part of the output, and
//! optional sections are left out entirely when they carry nothing.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::histogram::BucketCounts;

/// Ordering applied to statement records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// SQL text, ignoring case
    Query,
    /// Total execute time, largest first
    TotalExecuteTime,
    /// Mean execute time, largest first
    AverageExecuteTime,
    /// Execute count, largest first
    #[default]
    ExecuteCount,
}

impl SortKey {
    /// Maps a report sort name to a key; unknown or missing names fall back to
    /// [`SortKey::ExecuteCount`]
    pub fn parse(name: Option<&str>) -> Self {
        name.and_then(|name| name.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Query => "query",
            SortKey::TotalExecuteTime => "totalExecuteTime",
            SortKey::AverageExecuteTime => "executeAvgTotalTime",
            SortKey::ExecuteCount => "executeCount",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(SortKey::Query),
            "totalExecuteTime" => Ok(SortKey::TotalExecuteTime),
            "executeAvgTotalTime" => Ok(SortKey::AverageExecuteTime),
            "executeCount" => Ok(SortKey::ExecuteCount),
            other => Err(format!("Unknown sort key: {other}")),
        }
    }
}

/// Registry-wide totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub total_execute_count: u64,
    pub total_execute_time_ms: u64,
    /// Average number of connections busy executing or fetching; may exceed 1.0
    pub avg_active: String,
}

/// One recorded failure signature of a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionReport {
    pub message: String,
    pub count: u64,
    /// Trace of the latest occurrence that carried one, not necessarily the latest occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Statistics of one SQL text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementReport {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepare_count: Option<u64>,
    pub execute_count: u64,
    pub exec_per_minute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_execute_count: Option<u64>,
    /// Milliseconds
    pub total_execute_time: u64,
    pub execute_avg_total_time: String,
    pub execute_avg_float_time: String,
    pub execute_time: BucketCounts,
    #[serde(flatten)]
    pub fetch: Option<FetchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BTreeMap<i64, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<BTreeMap<i64, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_result_set_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_empty_result_sets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exceptions: Option<Vec<ExceptionReport>>,
}

/// Fetch timings, present once any fetch time was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    /// Milliseconds
    pub total_fetch_time: u64,
    pub fetch_avg_total_time: String,
    pub fetch_avg_float_time: String,
}

/// Summary followed by per-statement records in the requested order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: SummaryReport,
    pub statements: Vec<StatementReport>,
}

impl Report {
    /// Flattens the report into ordered key-value records, summary first
    pub fn records(&self) -> Vec<Value> {
        let mut records = Vec::with_capacity(self.statements.len() + 1);
        records.push(serde_json::to_value(&self.summary).unwrap_or(Value::Null));
        records.extend(self.statements.iter().map(|statement| serde_json::to_value(statement).unwrap_or(Value::Null)));
        records
    }

    pub fn statement(&self, sql: &str) -> Option<&StatementReport> {
        self.statements.iter().find(|statement| statement.sql == sql)
    }
}

pub(crate) const NANOS_PER_MILLI: u64 = 1_000_000;

/// Formats `total / count * multiplier` with two decimals; zero when `count` is zero
pub(crate) fn format_avg(total: u64, count: u64, multiplier: f64) -> String {
    let avg = if count == 0 { 0.0 } else { total as f64 / count as f64 };
    format!("{:.2}", avg * multiplier)
}
