// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An indented, hierarchical reporter.
//!
//! On each `TestFinished` it emits only the *delta* of group headers since
//! the previously emitted test — new segments of the group path that
//! weren't already printed — followed by the test's own line. The final
//! summary is computed over the accumulated tally, not the emission order,
//! so it is stable regardless of which order tests actually completed in.

use super::{HookKind, Reporter, ReporterEvent};
use crate::result::Status;
use crate::writer::{write_guarded, Writer};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    passed: usize,
    failed: usize,
    skipped: usize,
    pending: usize,
    timed_out: usize,
    setup_failed: usize,
}

impl Tally {
    fn record(&mut self, status: Status) {
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Pending => self.pending += 1,
            Status::TimedOut => self.timed_out += 1,
            Status::SetupFailed => self.setup_failed += 1,
        }
    }

    fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.pending + self.timed_out + self.setup_failed
    }
}

/// Indented, hierarchical reporter. Output is plain ASCII structure with
/// ANSI color around the pass/fail marker; colors degrade gracefully when
/// the writer isn't a color-capable terminal since the marker text itself
/// stays meaningful either way.
pub struct BddReporter {
    writer: Box<dyn Writer>,
    color: bool,
    previous_path: Vec<String>,
    tally: Tally,
    started_at: Option<Instant>,
}

impl BddReporter {
    pub fn new(writer: impl Writer + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            color: true,
            previous_path: Vec::new(),
            tally: Tally::default(),
            started_at: None,
        }
    }

    /// Disables ANSI color in the marker/summary output.
    pub fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    fn emit(&mut self, s: String) {
        write_guarded(&mut *self.writer, s);
    }

    fn marker(&self, status: Status) -> String {
        let (glyph, plain) = match status {
            Status::Passed => ("✓", "PASS"),
            Status::Failed => ("✗", "FAIL"),
            Status::SetupFailed => ("✗", "SETUP FAILED"),
            Status::TimedOut => ("⏱", "TIMED OUT"),
            Status::Skipped => ("○", "SKIP"),
            Status::Pending => ("…", "PENDING"),
        };
        if !self.color {
            return plain.to_string();
        }
        match status {
            Status::Passed => glyph.green().to_string(),
            Status::Failed | Status::SetupFailed | Status::TimedOut => glyph.red().to_string(),
            Status::Skipped | Status::Pending => glyph.yellow().to_string(),
        }
    }

    fn hook_label(kind: HookKind) -> &'static str {
        kind.as_str()
    }
}

impl Reporter for BddReporter {
    fn handle_event(&mut self, event: &ReporterEvent) {
        match event {
            ReporterEvent::RunStarted { .. } => {
                self.started_at = Some(Instant::now());
            }
            ReporterEvent::TestFinished { result, .. } => {
                let group_path = &result.full_name[..result.full_name.len().saturating_sub(1)];

                let common = group_path
                    .iter()
                    .zip(self.previous_path.iter())
                    .take_while(|(a, b)| a == b)
                    .count();

                for (depth, segment) in group_path.iter().enumerate().skip(common) {
                    let indent = "  ".repeat(depth);
                    self.emit(format!("{indent}{segment}\n"));
                }
                self.previous_path = group_path.to_vec();

                let indent = "  ".repeat(group_path.len());
                let marker = self.marker(result.status);
                self.emit(format!(
                    "{indent}{marker} {name} ({dur}ms)\n",
                    name = result.name,
                    dur = result.duration_ms
                ));
                for failure in &result.failures {
                    let indent = "  ".repeat(group_path.len() + 1);
                    self.emit(format!(
                        "{indent}- {operator}: {message}\n",
                        operator = failure.operator,
                        message = failure.message
                    ));
                }
                self.tally.record(result.status);
            }
            ReporterEvent::HookFinished {
                kind,
                outcome: super::HookOutcome::Error(message),
                ..
            } => {
                self.emit(format!(
                    "! {} hook failed: {}\n",
                    Self::hook_label(*kind),
                    message
                ));
            }
            ReporterEvent::RunFinished { completed, total } => {
                let elapsed = self
                    .started_at
                    .map(|s| s.elapsed())
                    .unwrap_or(Duration::ZERO);
                self.emit(format!(
                    "\n{passed} passed, {failed} failed, {setup_failed} setup failed, \
                     {timed_out} timed out, {skipped} skipped, {pending} pending \
                     ({completed}/{total} tests, {elapsed_ms}ms)\n",
                    passed = self.tally.passed,
                    failed = self.tally.failed,
                    setup_failed = self.tally.setup_failed,
                    timed_out = self.tally.timed_out,
                    skipped = self.tally.skipped,
                    pending = self.tally.pending,
                    completed = completed,
                    total = total,
                    elapsed_ms = elapsed.as_millis(),
                ));
                debug_assert_eq!(self.tally.total(), *completed);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ReporterEvent;
    use crate::result::{Failure, TestKind, TestResult};

    fn result(full_name: &[&str], status: Status) -> TestResult {
        TestResult {
            name: full_name.last().unwrap().to_string(),
            full_name: full_name.iter().map(|s| s.to_string()).collect(),
            status,
            duration_ms: 1,
            tags: vec![],
            failures: if status == Status::Failed {
                vec![Failure::new("eq", "expected 1, got 2")]
            } else {
                vec![]
            },
            kind: TestKind::Unit,
        }
    }

    #[test]
    fn failure_detail_is_emitted_under_the_test_line() {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let buf2 = buf.clone();
        let mut reporter =
            BddReporter::new(move |s: String| buf2.lock().unwrap().push_str(&s)).without_color();
        reporter.handle_event(&ReporterEvent::RunStarted { total: 1 });
        reporter.handle_event(&ReporterEvent::TestFinished {
            completed: 1,
            total: 1,
            result: result(&["Math", "subtracts"], Status::Failed),
        });
        reporter.handle_event(&ReporterEvent::RunFinished {
            completed: 1,
            total: 1,
        });

        let output = buf.lock().unwrap().clone();
        assert!(output.contains("expected 1, got 2"));
        assert!(output.contains("1 failed"));
    }

    #[test]
    fn group_header_only_printed_once_across_tests() {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let buf2 = buf.clone();
        let mut reporter =
            BddReporter::new(move |s: String| buf2.lock().unwrap().push_str(&s)).without_color();
        reporter.handle_event(&ReporterEvent::RunStarted { total: 2 });
        reporter.handle_event(&ReporterEvent::TestFinished {
            completed: 1,
            total: 2,
            result: result(&["Math", "adds"], Status::Passed),
        });
        reporter.handle_event(&ReporterEvent::TestFinished {
            completed: 2,
            total: 2,
            result: result(&["Math", "subtracts"], Status::Passed),
        });
        reporter.handle_event(&ReporterEvent::RunFinished {
            completed: 2,
            total: 2,
        });

        let output = buf.lock().unwrap().clone();
        assert_eq!(output.matches("Math").count(), 1);
        assert!(output.contains("adds"));
        assert!(output.contains("subtracts"));
        assert!(output.contains("2 passed"));
    }
}
