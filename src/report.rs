//! Run reports
//!
//! A report brackets a run with `START:` and `END:` markers, with the
//! collected outputs in between when stdout is stored.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

use crate::execution::ExecutionResult;

/// Timestamp layout of the START/END markers
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Wall-clock instant with second granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Local>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Local::now())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// Result record of one run against one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Always false; nothing here changes device state
    pub changed: bool,
    pub host: String,
    /// Commands actually executed
    pub executed: usize,
    pub warnings: Vec<String>,
    pub stdout: Vec<String>,
    pub stdout_lines: Vec<Vec<String>>,
}

impl RunReport {
    /// First stdout entry, `START: <ts>`
    pub fn start_marker(&self) -> Option<&str> {
        self.stdout.first().map(String::as_str)
    }

    /// Last stdout entry, `END: <ts>`
    pub fn end_marker(&self) -> Option<&str> {
        self.stdout.last().map(String::as_str)
    }

    /// Outputs between the markers
    pub fn responses(&self) -> &[String] {
        match self.stdout.len() {
            0..=2 => &[],
            n => &self.stdout[1..n - 1],
        }
    }
}

/// Builds the report for one run
#[derive(Debug, Clone)]
pub struct RunReporter {
    host: String,
}

impl RunReporter {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Record the start of the run
    pub fn begin(&self) -> Timestamp {
        Timestamp::now()
    }

    /// Close the run; the end timestamp is taken now
    pub fn finish(
        &self,
        start: Timestamp,
        warnings: Vec<String>,
        executed: usize,
        outputs: &[ExecutionResult],
    ) -> RunReport {
        let end = Timestamp::now();

        let mut stdout = Vec::with_capacity(outputs.len() + 2);
        stdout.push(format!("START: {}", start));
        stdout.extend(outputs.iter().map(|result| result.output.clone()));
        stdout.push(format!("END: {}", end));

        let stdout_lines = stdout.iter().map(|entry| split_lines(entry)).collect();

        RunReport {
            changed: false,
            host: self.host.clone(),
            executed,
            warnings,
            stdout,
            stdout_lines,
        }
    }
}

fn split_lines(entry: &str) -> Vec<String> {
    entry.split('\n').map(str::to_string).collect()
}
