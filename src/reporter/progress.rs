// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A single-line, overwriting progress bar.
//!
//! Each event rewrites the same terminal line via a carriage return rather
//! than appending new lines, so it's only useful against an interactive
//! writer — piping to a file will interleave `\r`s.

use super::{Reporter, ReporterEvent};
use crate::writer::{write_guarded, Writer};
use unicode_segmentation::UnicodeSegmentation;

const MIN_WIDTH: usize = 20;

/// Renders `[####......] 4/10` on a single, rewritten line.
pub struct ProgressReporter {
    writer: Box<dyn Writer>,
    width: usize,
}

impl ProgressReporter {
    pub fn new(writer: impl Writer + 'static) -> Self {
        Self::with_width(writer, 40)
    }

    /// `width` is the bar's character budget, clamped to at least
    /// [`MIN_WIDTH`] so the counter suffix always has room to render.
    pub fn with_width(writer: impl Writer + 'static, width: usize) -> Self {
        Self {
            writer: Box::new(writer),
            width: width.max(MIN_WIDTH),
        }
    }

    fn render(&self, completed: usize, total: usize) -> String {
        let bar_width = self.width - 2; // account for the surrounding brackets
        let filled = if total == 0 {
            bar_width
        } else {
            (bar_width * completed) / total.max(1)
        };
        let filled = filled.min(bar_width);

        // Grapheme count, not byte count: the bar is built from single-width
        // ASCII graphemes, but we measure it the same way we'd measure any
        // other label so padding stays correct if the fill glyph ever
        // changes to something multi-byte.
        let bar: String = std::iter::repeat('#')
            .take(filled)
            .chain(std::iter::repeat('.').take(bar_width - filled))
            .collect();
        let bar_graphemes = bar.graphemes(true).count();
        debug_assert_eq!(bar_graphemes, bar_width);

        format!("\r[{bar}] {completed}/{total}")
    }

    fn pad(label: &str, width: usize) -> String {
        let len = label.graphemes(true).count();
        if len >= width {
            label.to_string()
        } else {
            format!("{label}{}", " ".repeat(width - len))
        }
    }
}

impl Reporter for ProgressReporter {
    fn handle_event(&mut self, event: &ReporterEvent) {
        match event {
            ReporterEvent::RunStarted { total } => {
                let line = Self::pad(&self.render(0, *total), self.width + 12);
                write_guarded(&mut *self.writer, line);
            }
            ReporterEvent::TestFinished { completed, total, .. } => {
                let line = Self::pad(&self.render(*completed, *total), self.width + 12);
                write_guarded(&mut *self.writer, line);
            }
            ReporterEvent::RunFinished { completed, total } => {
                let line = Self::pad(&self.render(*completed, *total), self.width + 12);
                write_guarded(&mut *self.writer, format!("{line}\n"));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Status, TestKind, TestResult};
    use std::sync::{Arc, Mutex};

    fn shared_writer() -> (impl FnMut(String) + Send + 'static, Arc<Mutex<String>>) {
        let buf = Arc::new(Mutex::new(String::new()));
        let buf2 = buf.clone();
        (move |s: String| buf2.lock().unwrap().push_str(&s), buf)
    }

    fn finished(completed: usize, total: usize) -> ReporterEvent {
        ReporterEvent::TestFinished {
            completed,
            total,
            result: TestResult {
                name: "t".into(),
                full_name: vec!["t".into()],
                status: Status::Passed,
                duration_ms: 0,
                tags: vec![],
                failures: vec![],
                kind: TestKind::Unit,
            },
        }
    }

    #[test]
    fn width_is_clamped_to_minimum() {
        let (w, _buf) = shared_writer();
        let reporter = ProgressReporter::with_width(w, 2);
        assert_eq!(reporter.width, MIN_WIDTH);
    }

    #[test]
    fn bar_fills_proportionally_to_completion() {
        let (w, buf) = shared_writer();
        let mut reporter = ProgressReporter::with_width(w, 22);
        reporter.handle_event(&ReporterEvent::RunStarted { total: 4 });
        reporter.handle_event(&finished(2, 4));
        let output = buf.lock().unwrap().clone();
        assert!(output.contains("2/4"));
        assert!(output.contains('#'));
        assert!(output.contains('.'));
    }

    #[test]
    fn final_line_ends_with_newline() {
        let (w, buf) = shared_writer();
        let mut reporter = ProgressReporter::new(w);
        reporter.handle_event(&ReporterEvent::RunStarted { total: 1 });
        reporter.handle_event(&finished(1, 1));
        reporter.handle_event(&ReporterEvent::RunFinished {
            completed: 1,
            total: 1,
        });
        assert!(buf.lock().unwrap().ends_with('\n'));
    }
}
