// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runner façade: a fluent builder that ties a suite, a concurrency
//! budget, a filter, and a reporter together into one [`RunBuilder::run`]
//! call.
//!
//! A handful of chained setter methods return `Self`, culminating in one
//! call that builds the worker pool and drives the run to completion.

use crate::errors::DreamTestError;
use crate::reporter::{Reporter, ReporterChain};
use crate::result::{TestKind, TestResult};
use crate::sandbox::Timeout;
use crate::suite::plan::ExecutionPlan;
use crate::suite::TestSuite;
use once_cell::sync::OnceCell;

static NUM_CPUS: OnceCell<usize> = OnceCell::new();

/// The logical CPU count, cached after the first call, used to size the
/// default worker pool off the machine rather than a hardcoded constant.
fn default_concurrency() -> usize {
    *NUM_CPUS.get_or_init(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

/// Everything a filter predicate needs to know about a test, independent of
/// its declared context type.
#[derive(Debug, Clone)]
pub struct TestInfo {
    pub name: String,
    pub full_name: Vec<String>,
    pub tags: Vec<String>,
    pub kind: TestKind,
}

impl TestInfo {
    /// The full name joined with `::`.
    pub fn full_name_str(&self) -> String {
        self.full_name.join("::")
    }
}

type Filter = dyn Fn(&TestInfo) -> bool + Send + Sync;

/// Builds and runs one or more suites.
///
/// `Ctx` is the shared context type; every suite passed to a single
/// `RunBuilder` is combined into one run with a single `RunStarted`/
/// `RunFinished` event stream and one combined, full-name-sorted result
/// list.
pub struct RunBuilder<Ctx> {
    suites: Vec<TestSuite<Ctx>>,
    max_concurrency: usize,
    default_timeout: Timeout,
    filter: Box<Filter>,
    exit_on_failure: bool,
    reporters: Vec<Box<dyn Reporter>>,
}

impl<Ctx> RunBuilder<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    /// Starts a builder for a single `suite`, with sensible defaults:
    /// concurrency equal to the number of logical CPUs, a 30-second default
    /// timeout, no filter, `exit_on_failure` disabled, and no reporters
    /// attached.
    pub fn new(suite: TestSuite<Ctx>) -> Self {
        Self::new_many(vec![suite])
    }

    /// Starts a builder driving several suites of the same context type as
    /// one combined run, with the same defaults as [`Self::new`].
    pub fn new_many(suites: Vec<TestSuite<Ctx>>) -> Self {
        Self {
            suites,
            max_concurrency: default_concurrency(),
            default_timeout: Timeout::Millis(30_000),
            filter: Box::new(|_| true),
            exit_on_failure: false,
            reporters: Vec::new(),
        }
    }

    /// Overrides the worker pool size. `0` is rejected by [`Self::run`].
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Overrides the timeout applied to tests that don't declare their own
    /// via [`crate::suite::Node::with_timeout`].
    pub fn default_timeout(mut self, timeout: Timeout) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Restricts the run to tests for which `predicate` returns `true`.
    /// Replaces any previously set filter; pruned groups (every descendant
    /// test filtered out) don't run their hooks either.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TestInfo) -> bool + Send + Sync + 'static,
    {
        self.filter = Box::new(predicate);
        self
    }

    /// Restricts the run to tests whose tags include `tag`.
    pub fn filter_by_tag(self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.filter(move |info| info.tags.iter().any(|t| t == &tag))
    }

    /// Calls [`std::process::exit`] with a nonzero code if any test finishes
    /// with a failing [`crate::result::Status`].
    pub fn exit_on_failure(mut self, enabled: bool) -> Self {
        self.exit_on_failure = enabled;
        self
    }

    /// Attaches a reporter to the run's event stream. May be called more
    /// than once; every attached reporter sees every event, in attachment
    /// order.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Builds the execution plan, dispatches it, and returns every test's
    /// result sorted by full name.
    ///
    /// Returns [`DreamTestError::InvalidConfig`] if `max_concurrency` was
    /// set to `0`, and [`DreamTestError::WorkerPoolBuild`] if the worker
    /// pool itself could not be created.
    pub fn run(self) -> Result<Vec<TestResult>, DreamTestError> {
        if self.max_concurrency == 0 {
            return Err(DreamTestError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let plan = ExecutionPlan::build_many(
            self.suites.into_iter().map(|s| (s.seed, s.tree)),
            &*self.filter,
        );

        let mut chain = ReporterChain::new();
        for reporter in self.reporters {
            chain.push(reporter);
        }

        let results = crate::runner::execute(
            plan,
            self.default_timeout,
            self.max_concurrency,
            Box::new(chain),
        )?;

        if self.exit_on_failure {
            let failed = results.iter().any(|r| r.status.is_failure());
            if failed {
                std::process::exit(1);
            }
        }

        Ok(results)
    }
}
