// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core of the Dream Test framework: a declarative suite tree with context
//! propagation and lifecycle hooks, a parallel execution engine that
//! sandboxes each test for crash and timeout isolation, and a push-style
//! reporter pipeline.
//!
//! This crate is the core only. CLI entry points, file I/O, matcher
//! libraries, and Gherkin feature parsing are external collaborators; see
//! [`gherkin`] for the lowering contract they integrate through.

pub mod builder;
pub mod errors;
pub mod gherkin;
pub mod reporter;
pub mod result;
pub mod sandbox;
pub mod suite;
pub mod writer;

mod runner;

pub use builder::{RunBuilder, TestInfo};
pub use errors::DreamTestError;
pub use gherkin::{lower_feature, GherkinFeature, GherkinScenario, GherkinStep};
pub use reporter::{BddReporter, HookKind, HookOutcome, JsonReporter, ProgressReporter, Reporter, ReporterChain, ReporterEvent};
pub use result::{AssertionResult, Failure, FailurePayload, Status, TestKind, TestResult};
pub use sandbox::{Sandbox, SandboxOutcome, Timeout};
pub use suite::{after_all, after_each, before_all, before_each, group, test, Node, TestSuite};
pub use writer::{StringWriter, Writer};
