// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reporter pipeline: a push-style event protocol and three built-in
//! reporters that fold it into rendered output.
//!
//! A reporter is conceptually a `(state, handle_event)` pair; in Rust that
//! is a trait with `&mut self` mutation rather than an explicit fold — the
//! same state-threading expressed idiomatically.

mod bdd;
mod json;
mod progress;

pub use bdd::BddReporter;
pub use json::JsonReporter;
pub use progress::ProgressReporter;

use crate::result::TestResult;

/// Which lifecycle hook an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::BeforeAll => "before_all",
            HookKind::BeforeEach => "before_each",
            HookKind::AfterEach => "after_each",
            HookKind::AfterAll => "after_all",
        }
    }
}

/// The outcome of a single hook invocation, carried on `HookFinished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Ok,
    Error(String),
}

/// An event pushed by the execution engine to the reporter pipeline.
///
/// Ordering guarantees: `RunStarted` precedes everything, `RunFinished`
/// follows everything, every `HookStarted` has exactly one later matching
/// `HookFinished`, and `TestFinished` events arrive in completion order (not
/// declaration order).
#[derive(Debug, Clone)]
pub enum ReporterEvent {
    RunStarted {
        total: usize,
    },
    TestFinished {
        completed: usize,
        total: usize,
        result: TestResult,
    },
    HookStarted {
        kind: HookKind,
        scope: Vec<String>,
        test_name: Option<String>,
    },
    HookFinished {
        kind: HookKind,
        scope: Vec<String>,
        test_name: Option<String>,
        outcome: HookOutcome,
    },
    RunFinished {
        completed: usize,
        total: usize,
    },
}

/// A stateful consumer of the event stream.
///
/// Reporter state is single-threaded: the engine threads one event at a
/// time through a single reporting path, so `&mut self` is never contended.
pub trait Reporter: Send {
    fn handle_event(&mut self, event: &ReporterEvent);
}

/// Dispatches to any number of reporters in turn, so a run can feed more
/// than one built-in (or custom) reporter from the same event stream.
pub struct ReporterChain {
    reporters: Vec<Box<dyn Reporter>>,
}

impl ReporterChain {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn push(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }
}

impl Default for ReporterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ReporterChain {
    fn handle_event(&mut self, event: &ReporterEvent) {
        for reporter in &mut self.reporters {
            reporter.handle_event(event);
        }
    }
}
