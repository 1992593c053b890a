// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome types: the result of a single assertion, a single test, and a
//! full run.
//!
//! These are pure data. Once a [`Failure`] is produced it never mutates —
//! callers that need a different failure construct a new value.

use serde::{Deserialize, Serialize};

/// The outcome of a single assertion made inside a test body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssertionResult {
    /// The assertion held.
    Ok,
    /// The assertion was explicitly skipped.
    Skipped,
    /// The assertion did not hold.
    Failed(Failure),
}

impl AssertionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, AssertionResult::Ok)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AssertionResult::Failed(_))
    }
}

/// A single assertion failure: which operator produced it, a message for
/// humans, and an optional structured payload for richer rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Name of the operator that produced this failure, e.g. `"eq"`,
    /// `"assert"`, `"snapshot"`, or a synthetic operator like `"crash"`.
    pub operator: String,
    /// Human-readable failure message.
    pub message: String,
    /// Structured detail for reporters that want to render more than the
    /// message, e.g. a diff view.
    pub payload: Option<FailurePayload>,
}

impl Failure {
    /// Builds a bare failure with no structured payload.
    pub fn new(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// A synthetic failure representing a crash inside a sandboxed
    /// invocation (test body or hook).
    pub fn crash(message: impl Into<String>) -> Self {
        Self::new("crash", message)
    }
}

/// The structured half of a [`Failure`], for matcher libraries that want to
/// hand the core more than a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailurePayload {
    /// An equality assertion failed; `diff` is a pre-rendered diff view.
    Equality { diff: String },
    /// A boolean assertion failed.
    Boolean { expected: bool, actual: bool },
    /// A snapshot assertion failed or had no baseline to compare against.
    Snapshot {
        path: Option<String>,
        missing: bool,
        diff: String,
    },
}

/// Which reporting lane a test belongs to. Carries no runtime behavior
/// difference — reporters may choose to render lanes differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    Unit,
    Integration,
    /// A scenario lowered from a Gherkin feature, named after the feature.
    GherkinScenario(String),
}

/// The final status of a completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Pending,
    TimedOut,
    /// A hook failed during setup; the test body never ran. Kept distinct
    /// from `Failed` so reporters can tell assertion failures apart from
    /// hook errors.
    SetupFailed,
}

impl Status {
    /// True for statuses that should flip a run's exit code under
    /// `exit_on_failure`.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Status::Failed | Status::SetupFailed | Status::TimedOut
        )
    }
}

/// The result of running a single test to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// The test's own name (no group prefix).
    pub name: String,
    /// Group path + test name, in declaration order.
    pub full_name: Vec<String>,
    pub status: Status,
    pub duration_ms: u64,
    /// Inherited group tags followed by the test's own tags, insertion
    /// order preserved, duplicates allowed.
    pub tags: Vec<String>,
    pub failures: Vec<Failure>,
    pub kind: TestKind,
}

impl TestResult {
    /// The full name joined with `::`, for display and for sort order.
    pub fn full_name_str(&self) -> String {
        self.full_name.join("::")
    }
}
