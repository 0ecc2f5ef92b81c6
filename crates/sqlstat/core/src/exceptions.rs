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

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::Write;

/// A failure observed on the monitored database, as handed to registration
///
/// The signature groups occurrences; the stack trace is free-form text that
/// only the most recent occurrence of a signature keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFailure {
    signature: String,
    stack_trace: Option<String>,
}

impl ObservedFailure {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Captures a driver error
    ///
    /// The signature is the error's type name followed by its message. The
    /// stack trace lists the error, each source as a `Caused by:` line, and a
    /// backtrace when `RUST_BACKTRACE` enables capturing one.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: Error + ?Sized,
    {
        let signature = format!("{}: {}", std::any::type_name::<E>(), error);

        let mut trace = signature.clone();
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(trace, "\nCaused by: {cause}");
            source = cause.source();
        }
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            let _ = write!(trace, "\n{backtrace}");
        }

        Self {
            signature,
            stack_trace: Some(trace),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}

/// Occurrences of one failure signature on one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSample {
    count: u64,
    stack_trace: Option<String>,
}

impl ExceptionSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one occurrence; a provided trace replaces the stored one
    ///
    /// Occurrences without a trace keep the previous trace, so the stored
    /// trace is the one from the latest occurrence that carried a trace.
    pub fn record(&mut self, stack_trace: Option<&str>) {
        self.count += 1;
        if let Some(trace) = stack_trace {
            self.stack_trace = Some(trace.to_string());
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}
