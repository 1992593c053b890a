// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-invocation isolation: crash capture and timeout, in bounded
//! wall-clock time, for an arbitrary closure.
//!
//! The sandbox is implemented as a dedicated OS thread per invocation,
//! observed by the caller through a rendezvous channel with a timed receive.
//! On timeout the spawned thread is simply abandoned: it may keep running
//! in the background, but its result is never observed again. Leaked
//! resources inside the closure are the caller's responsibility.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

/// A test or hook's effective timeout.
///
/// An absent override falls back to the runner's default (represented at the
/// call site as `Option<Timeout>` with `None` meaning "inherit");
/// `Millis(0)` is an immediate timeout, and only the explicit `Unbounded`
/// variant disables timeout enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Millis(u64),
    Unbounded,
}

impl Timeout {
    pub(crate) fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Millis(ms) => Some(Duration::from_millis(ms)),
            Timeout::Unbounded => None,
        }
    }
}

/// The result of a sandboxed invocation. Exactly one variant is ever
/// produced for a given call; outcomes are never merged.
#[derive(Debug)]
pub enum SandboxOutcome<T> {
    Ok(T),
    Crashed(String),
    TimedOut,
}

impl<T> SandboxOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SandboxOutcome<U> {
        match self {
            SandboxOutcome::Ok(v) => SandboxOutcome::Ok(f(v)),
            SandboxOutcome::Crashed(m) => SandboxOutcome::Crashed(m),
            SandboxOutcome::TimedOut => SandboxOutcome::TimedOut,
        }
    }
}

/// Formats a `catch_unwind` payload into a human-readable crash message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test body panicked with a non-string payload".to_string()
    }
}

/// The sandbox. Stateless: it owns no resources of its own beyond what it
/// spawns per invocation, so it is trivially reentrant across concurrent
/// callers.
pub struct Sandbox;

impl Sandbox {
    /// Runs `f` to completion, to a panic, or to its timeout, whichever
    /// comes first.
    ///
    /// `timeout` of `Millis(0)` returns `TimedOut` unless `f` happens to
    /// already be done by the time the rendezvous channel is polled, which
    /// in practice means it always reports a timeout for any non-trivial
    /// body — the "immediate timeout" reading of zero.
    pub fn run<T, F>(f: F, timeout: Timeout) -> SandboxOutcome<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let builder = thread::Builder::new().name("dream-test-sandbox".to_string());
        let spawn_result = builder.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            // The receiver may already be gone (caller timed out and moved
            // on); a failed send just means the result is discarded.
            let _ = tx.send(outcome);
        });

        if spawn_result.is_err() {
            return SandboxOutcome::Crashed("failed to spawn sandbox thread".to_string());
        }

        let recv = match timeout.as_duration() {
            Some(d) => rx.recv_timeout(d),
            None => rx.recv().map_err(|_| crossbeam_channel::RecvTimeoutError::Disconnected),
        };

        match recv {
            Ok(Ok(value)) => SandboxOutcome::Ok(value),
            Ok(Err(payload)) => SandboxOutcome::Crashed(panic_message(&payload)),
            Err(_) => SandboxOutcome::TimedOut,
        }
    }
}
