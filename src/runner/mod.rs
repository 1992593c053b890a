// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine: dispatches a prepared plan across a bounded worker
//! pool, sandboxes each test for crash/timeout isolation, and forwards a
//! deterministically-ordered event stream to the reporter pipeline.
//!
//! A `rayon::ThreadPool` bounds concurrency, and a dedicated channel carries
//! results back for ordered collection. Reporter events are funneled through
//! a single dedicated thread so `Reporter::handle_event`'s `&mut self` is
//! never contended even though tests themselves run concurrently.

use crate::errors::{DreamTestError, SandboxBuildError};
use crate::reporter::{HookKind, HookOutcome, Reporter, ReporterEvent};
use crate::result::{Failure, Status, TestKind, TestResult};
use crate::sandbox::{Sandbox, SandboxOutcome, Timeout};
use crate::suite::plan::{ExecutionPlan, GroupScope, HookEventKind, PreparedTest};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Runs every test in `plan` to completion, honoring `max_concurrency`, and
/// returns results sorted by full name (declaration order, not completion
/// order), so consumers see a stable ordering regardless of how tests
/// interleaved.
pub(crate) fn execute<Ctx>(
    plan: ExecutionPlan<Ctx>,
    default_timeout: Timeout,
    max_concurrency: usize,
    reporter: Box<dyn Reporter>,
) -> Result<Vec<TestResult>, DreamTestError>
where
    Ctx: Clone + Send + Sync + 'static,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrency)
        .thread_name(|i| format!("dream-test-worker-{i}"))
        .build()
        .map_err(|e| DreamTestError::WorkerPoolBuild(SandboxBuildError::new(e)))?;

    let total = plan.tests.len();
    let (ev_tx, ev_rx) = crossbeam_channel::unbounded::<ReporterEvent>();
    let reporter_thread = std::thread::Builder::new()
        .name("dream-test-reporter".to_string())
        .spawn(move || {
            let mut reporter = reporter;
            for event in ev_rx.iter() {
                reporter.handle_event(&event);
            }
        })
        .expect("failed to spawn reporter thread");

    let _ = ev_tx.send(ReporterEvent::RunStarted { total });

    let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let completed = Arc::new(AtomicUsize::new(0));

    pool.scope(|scope| {
        for test in plan.tests {
            let ev_tx = ev_tx.clone();
            let results = results.clone();
            let completed = completed.clone();
            scope.spawn(move |_| {
                let result = run_one(&test, default_timeout, &ev_tx);
                let n = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = ev_tx.send(ReporterEvent::TestFinished {
                    completed: n,
                    total,
                    result: result.clone(),
                });
                results.lock().expect("results mutex poisoned").push(result);

                // A test only carries its immediate enclosing scope, but
                // remaining was seeded against each ancestor's *whole*
                // subtree, so every ancestor up to the root must be charged
                // for this completion, not just the nearest one.
                for ancestor in test.scope.chain() {
                    if let Some(after_all) = ancestor.test_completed() {
                        run_after_all(&ancestor, after_all, &ev_tx);
                    }
                }
            });
        }
    });

    let final_completed = completed.load(Ordering::SeqCst);
    let _ = ev_tx.send(ReporterEvent::RunFinished {
        completed: final_completed,
        total,
    });
    drop(ev_tx);
    reporter_thread
        .join()
        .expect("reporter thread panicked while handling an event");

    let mut results = Arc::try_unwrap(results)
        .unwrap_or_else(|arc| Mutex::new(arc.lock().expect("results mutex poisoned").clone()))
        .into_inner()
        .expect("results mutex poisoned");
    results.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(results)
}

/// The outcome of the sandboxed before_each + body chain. Carries the
/// context alongside each outcome so `after_each` can tear down against the
/// same value the chain actually produced, not the pre-`before_each` one.
enum Chain<Ctx> {
    HookFailedAt { index: usize, message: String, ctx: Ctx },
    Body { ctx: Ctx, body: crate::suite::TestBody },
}

fn run_one<Ctx>(
    test: &PreparedTest<Ctx>,
    default_timeout: Timeout,
    ev_tx: &Sender<ReporterEvent>,
) -> TestResult
where
    Ctx: Clone + Send + Sync + 'static,
{
    let group_path = test.full_name[..test.full_name.len().saturating_sub(1)].to_vec();
    let timeout = test.timeout.unwrap_or(default_timeout);

    let sink = |kind: HookEventKind, scope_path: &[String], error: Option<&str>| {
        let reporter_kind = HookKind::BeforeAll;
        match kind {
            HookEventKind::BeforeAllStart => {
                let _ = ev_tx.send(ReporterEvent::HookStarted {
                    kind: reporter_kind,
                    scope: scope_path.to_vec(),
                    test_name: None,
                });
            }
            HookEventKind::BeforeAllEnd => {
                let outcome = match error {
                    Some(msg) => HookOutcome::Error(msg.to_string()),
                    None => HookOutcome::Ok,
                };
                let _ = ev_tx.send(ReporterEvent::HookFinished {
                    kind: reporter_kind,
                    scope: scope_path.to_vec(),
                    test_name: None,
                    outcome,
                });
            }
        }
    };
    let setup = test.scope.resolve(&sink);

    let ctx = match (&setup.ctx, &setup.error) {
        (Some(ctx), None) => ctx.clone(),
        (_, Some(err)) => {
            return TestResult {
                name: test.name.clone(),
                full_name: test.full_name.clone(),
                status: Status::SetupFailed,
                duration_ms: 0,
                tags: test.tags.clone(),
                failures: vec![Failure::new("before_all", err.clone())],
                kind: test.kind.clone(),
            };
        }
        _ => unreachable!("a resolved scope has either a ctx or an error"),
    };

    let has_before_each = !test.before_each.is_empty();
    if has_before_each {
        let _ = ev_tx.send(ReporterEvent::HookStarted {
            kind: HookKind::BeforeEach,
            scope: group_path.clone(),
            test_name: Some(test.name.clone()),
        });
    }

    let before_each = test.before_each.clone();
    let run = test.run.clone();
    let body_ctx = ctx.clone();
    let started = std::time::Instant::now();
    let outcome = Sandbox::run(
        move || {
            let mut ctx = body_ctx;
            for (index, hook) in before_each.iter().enumerate() {
                match hook(ctx.clone()) {
                    Ok(next) => ctx = next,
                    Err(message) => return Chain::HookFailedAt { index, message, ctx },
                }
            }
            let body = run(ctx.clone());
            Chain::Body { ctx, body }
        },
        timeout,
    );
    let duration_ms = started.elapsed().as_millis() as u64;

    // `ctx` (pre-before_each) is the best available fallback for the
    // TimedOut/Crashed arms: the sandboxed thread panicked or was abandoned,
    // so whatever it produced past that point is unrecoverable.
    let (executed_before_each, teardown_ctx, result) = match outcome {
        SandboxOutcome::TimedOut => (
            test.before_each.len(),
            ctx.clone(),
            TestResult {
                name: test.name.clone(),
                full_name: test.full_name.clone(),
                status: Status::TimedOut,
                duration_ms,
                tags: test.tags.clone(),
                failures: vec![Failure::new("timeout", "test exceeded its timeout")],
                kind: test.kind.clone(),
            },
        ),
        SandboxOutcome::Crashed(message) => (
            test.before_each.len(),
            ctx.clone(),
            TestResult {
                name: test.name.clone(),
                full_name: test.full_name.clone(),
                status: Status::Failed,
                duration_ms,
                tags: test.tags.clone(),
                failures: vec![Failure::crash(message)],
                kind: test.kind.clone(),
            },
        ),
        SandboxOutcome::Ok(Chain::HookFailedAt { index, message, ctx: hook_ctx }) => (
            index,
            hook_ctx,
            TestResult {
                name: test.name.clone(),
                full_name: test.full_name.clone(),
                status: Status::SetupFailed,
                duration_ms,
                tags: test.tags.clone(),
                failures: vec![Failure::new("before_each", message)],
                kind: test.kind.clone(),
            },
        ),
        SandboxOutcome::Ok(Chain::Body { ctx: body_ctx, body }) => {
            let (status, failures) = match body {
                crate::suite::TestBody::Assertion(crate::result::AssertionResult::Ok) => {
                    (Status::Passed, vec![])
                }
                crate::suite::TestBody::Assertion(crate::result::AssertionResult::Skipped) => {
                    (Status::Skipped, vec![])
                }
                crate::suite::TestBody::Assertion(crate::result::AssertionResult::Failed(f)) => {
                    (Status::Failed, vec![f])
                }
                crate::suite::TestBody::SetupError(message) => {
                    (Status::SetupFailed, vec![Failure::new("setup", message)])
                }
            };
            (
                test.before_each.len(),
                body_ctx,
                TestResult {
                    name: test.name.clone(),
                    full_name: test.full_name.clone(),
                    status,
                    duration_ms,
                    tags: test.tags.clone(),
                    failures,
                    kind: test.kind.clone(),
                },
            )
        }
    };

    if has_before_each {
        let _ = ev_tx.send(ReporterEvent::HookFinished {
            kind: HookKind::BeforeEach,
            scope: group_path.clone(),
            test_name: Some(test.name.clone()),
            outcome: match &result.status {
                Status::SetupFailed if executed_before_each < test.before_each.len() => {
                    HookOutcome::Error(
                        result
                            .failures
                            .first()
                            .map(|f| f.message.clone())
                            .unwrap_or_default(),
                    )
                }
                _ => HookOutcome::Ok,
            },
        });
    }

    let after_each: Vec<_> = test
        .after_each
        .iter()
        .take(executed_before_each.min(test.after_each.len()))
        .rev()
        .cloned()
        .collect();

    if !after_each.is_empty() {
        let _ = ev_tx.send(ReporterEvent::HookStarted {
            kind: HookKind::AfterEach,
            scope: group_path.clone(),
            test_name: Some(test.name.clone()),
        });
        let outcome = Sandbox::run(
            move || {
                for hook in &after_each {
                    hook(teardown_ctx.clone())?;
                }
                Ok::<(), String>(())
            },
            timeout,
        );
        let hook_outcome = match outcome {
            SandboxOutcome::Ok(Ok(())) => HookOutcome::Ok,
            SandboxOutcome::Ok(Err(message)) => HookOutcome::Error(message),
            SandboxOutcome::Crashed(message) => HookOutcome::Error(message),
            SandboxOutcome::TimedOut => HookOutcome::Error("after_each timed out".to_string()),
        };
        if let HookOutcome::Error(ref message) = hook_outcome {
            tracing::warn!(test = %test.name, error = %message, "after_each hook failed");
        }
        let _ = ev_tx.send(ReporterEvent::HookFinished {
            kind: HookKind::AfterEach,
            scope: group_path,
            test_name: Some(test.name.clone()),
            outcome: hook_outcome,
        });
    }

    result
}

fn run_after_all<Ctx>(
    scope: &Arc<GroupScope<Ctx>>,
    hooks: Vec<Arc<crate::suite::TeardownFn<Ctx>>>,
    ev_tx: &Sender<ReporterEvent>,
) where
    Ctx: Clone + Send + Sync + 'static,
{
    if hooks.is_empty() {
        return;
    }
    let Some(ctx) = scope.resolved_ctx() else {
        return;
    };
    let scope_path = scope.full_path.clone();

    let _ = ev_tx.send(ReporterEvent::HookStarted {
        kind: HookKind::AfterAll,
        scope: scope_path.clone(),
        test_name: None,
    });
    let outcome = Sandbox::run(
        move || {
            for hook in &hooks {
                hook(ctx.clone())?;
            }
            Ok::<(), String>(())
        },
        Timeout::Unbounded,
    );
    let hook_outcome = match outcome {
        SandboxOutcome::Ok(Ok(())) => HookOutcome::Ok,
        SandboxOutcome::Ok(Err(message)) => HookOutcome::Error(message),
        SandboxOutcome::Crashed(message) => HookOutcome::Error(message),
        SandboxOutcome::TimedOut => HookOutcome::Error("after_all timed out".to_string()),
    };
    if let HookOutcome::Error(ref message) = hook_outcome {
        tracing::warn!(scope = ?scope_path, error = %message, "after_all hook failed");
    }
    let _ = ev_tx.send(ReporterEvent::HookFinished {
        kind: HookKind::AfterAll,
        scope: scope_path,
        test_name: None,
        outcome: hook_outcome,
    });
}
