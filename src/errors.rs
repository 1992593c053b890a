// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by dream-test.
//!
//! Everything a test or hook can fail with at runtime (assertion failure,
//! crash, timeout, hook error) is recovered locally and folded into a
//! [`crate::result::TestResult`] — it never surfaces here. This module only
//! covers misuse of the core's own APIs: building a malformed suite, or a
//! sandbox that could not even be dispatched. A reporter writer that panics
//! is caught and discarded (see [`crate::writer::write_guarded`]) rather
//! than surfaced as an error, since a misbehaving writer shouldn't be able
//! to abort an otherwise-healthy run.

use std::fmt;
use thiserror::Error;

/// Errors surfaced by the core's own API surface, as opposed to recoverable
/// test/hook outcomes (which become [`crate::result::Status`] values).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DreamTestError {
    /// A suite was built with an invalid configuration (e.g. zero
    /// `max_concurrency`).
    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),

    /// The sandbox's worker pool could not be built.
    #[error("failed to build worker pool")]
    WorkerPoolBuild(#[source] SandboxBuildError),
}

/// Internal error building the sandbox's worker pool.
#[derive(Debug, Error)]
#[error("rayon thread pool build failed: {message}")]
pub struct SandboxBuildError {
    pub(crate) message: String,
}

impl SandboxBuildError {
    pub(crate) fn new(err: impl fmt::Display) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
