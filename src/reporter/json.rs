// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A reporter that buffers every result and emits a single JSON document on
//! `RunFinished`, rather than streaming one object per event.
//! Machine consumers (CI dashboards, `jq` pipelines) want one well-formed
//! document, not a line-delimited stream they have to reassemble.

use super::{Reporter, ReporterEvent};
use crate::result::{Status, TestResult};
use crate::writer::{write_guarded, Writer};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Summary {
    total: usize,
    completed: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    pending: usize,
    timed_out: usize,
    setup_failed: usize,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    tests: &'a [TestResult],
    summary: Summary,
    timestamp_ms: i64,
}

/// Buffers `TestResult`s in completion order and serializes them as one
/// JSON document when the run finishes.
pub struct JsonReporter {
    writer: Box<dyn Writer>,
    results: Vec<TestResult>,
    pretty: bool,
}

impl JsonReporter {
    pub fn new(writer: impl Writer + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            results: Vec::new(),
            pretty: false,
        }
    }

    /// Pretty-print the document instead of emitting it compact.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn summarize(&self, completed: usize, total: usize) -> Summary {
        let mut summary = Summary {
            total,
            completed,
            passed: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            timed_out: 0,
            setup_failed: 0,
        };
        for result in &self.results {
            match result.status {
                Status::Passed => summary.passed += 1,
                Status::Failed => summary.failed += 1,
                Status::Skipped => summary.skipped += 1,
                Status::Pending => summary.pending += 1,
                Status::TimedOut => summary.timed_out += 1,
                Status::SetupFailed => summary.setup_failed += 1,
            }
        }
        summary
    }
}

impl Reporter for JsonReporter {
    fn handle_event(&mut self, event: &ReporterEvent) {
        match event {
            ReporterEvent::TestFinished { result, .. } => {
                self.results.push(result.clone());
            }
            ReporterEvent::RunFinished { completed, total } => {
                let document = Document {
                    tests: &self.results,
                    summary: self.summarize(*completed, *total),
                    timestamp_ms: Utc::now().timestamp_millis(),
                };
                let rendered = if self.pretty {
                    serde_json::to_string_pretty(&document)
                } else {
                    serde_json::to_string(&document)
                };
                match rendered {
                    Ok(body) => write_guarded(&mut *self.writer, body),
                    Err(err) => tracing::error!(error = %err, "failed to serialize JSON report"),
                }
            }
            _ => {}
        }
    }
}
