// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The declarative suite tree.
//!
//! A [`Node`] is a tagged five-variant tree: groups, tests, and the four
//! hook kinds. The tree is built once and treated as an
//! immutable value for the duration of a run; [`plan`] walks it exactly
//! once into a flat, ready-to-dispatch [`plan::ExecutionPlan`].

pub(crate) mod plan;

use crate::result::{AssertionResult, TestKind};
use crate::sandbox::Timeout;
use std::sync::Arc;

/// A hook that transforms the context, used by `BeforeAll`/`BeforeEach`.
pub type HookFn<Ctx> = dyn Fn(Ctx) -> Result<Ctx, String> + Send + Sync;

/// A teardown hook, used by `AfterEach`/`AfterAll`. Does not transform the
/// context.
pub type TeardownFn<Ctx> = dyn Fn(Ctx) -> Result<(), String> + Send + Sync;

/// A test body function.
pub type RunFn<Ctx> = dyn Fn(Ctx) -> TestBody + Send + Sync;

/// What a test body yields: either an assertion outcome, or a setup error if
/// the body itself needed to bail out before making any assertion (distinct
/// from a hook failure, but reported the same way by the engine).
#[derive(Debug, Clone)]
pub enum TestBody {
    Assertion(AssertionResult),
    SetupError(String),
}

/// A node in the suite tree.
pub struct Node<Ctx> {
    pub(crate) kind: NodeKind<Ctx>,
}

pub(crate) enum NodeKind<Ctx> {
    Group {
        name: String,
        tags: Vec<String>,
        children: Vec<Node<Ctx>>,
    },
    Test {
        name: String,
        tags: Vec<String>,
        kind: TestKind,
        run: Arc<RunFn<Ctx>>,
        timeout_ms: Option<Timeout>,
    },
    BeforeAll(Arc<HookFn<Ctx>>),
    BeforeEach(Arc<HookFn<Ctx>>),
    AfterEach(Arc<TeardownFn<Ctx>>),
    AfterAll(Arc<TeardownFn<Ctx>>),
}

impl<Ctx> Node<Ctx> {
    /// Attaches tags to a `Group` or `Test` node. A no-op on hook nodes.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collected: Vec<String> = tags.into_iter().map(Into::into).collect();
        match &mut self.kind {
            NodeKind::Group { tags, .. } | NodeKind::Test { tags, .. } => *tags = collected,
            _ => {}
        }
        self
    }

    /// Overrides this test's effective timeout. A no-op on non-`Test` nodes.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        if let NodeKind::Test { timeout_ms, .. } = &mut self.kind {
            *timeout_ms = Some(timeout);
        }
        self
    }

    /// Sets this test's reporting lane. A no-op on non-`Test` nodes.
    pub fn with_kind(mut self, kind: TestKind) -> Self {
        if let NodeKind::Test { kind: k, .. } = &mut self.kind {
            *k = kind;
        }
        self
    }
}

/// Creates a named group of children. Children are ordered and nested
/// groups are allowed.
pub fn group<Ctx>(name: impl Into<String>, children: Vec<Node<Ctx>>) -> Node<Ctx> {
    Node {
        kind: NodeKind::Group {
            name: name.into(),
            tags: Vec::new(),
            children,
        },
    }
}

/// Creates a test. Defaults to [`TestKind::Unit`], no tags, and the
/// runner's default timeout; use [`Node::with_tags`], [`Node::with_kind`],
/// and [`Node::with_timeout`] to override.
pub fn test<Ctx, F>(name: impl Into<String>, run: F) -> Node<Ctx>
where
    F: Fn(Ctx) -> TestBody + Send + Sync + 'static,
{
    Node {
        kind: NodeKind::Test {
            name: name.into(),
            tags: Vec::new(),
            kind: TestKind::Unit,
            run: Arc::new(run),
            timeout_ms: None,
        },
    }
}

/// A `BeforeAll` hook: runs once per enclosing group, before the group's
/// first test, producing the context its tests derive from.
pub fn before_all<Ctx, F>(f: F) -> Node<Ctx>
where
    F: Fn(Ctx) -> Result<Ctx, String> + Send + Sync + 'static,
{
    Node {
        kind: NodeKind::BeforeAll(Arc::new(f)),
    }
}

/// A `BeforeEach` hook: runs before every subsequent sibling test (and
/// tests in nested groups), in declaration order.
pub fn before_each<Ctx, F>(f: F) -> Node<Ctx>
where
    F: Fn(Ctx) -> Result<Ctx, String> + Send + Sync + 'static,
{
    Node {
        kind: NodeKind::BeforeEach(Arc::new(f)),
    }
}

/// An `AfterEach` hook: runs after every subsequent sibling test, in
/// reverse of its execution order relative to `BeforeEach`.
pub fn after_each<Ctx, F>(f: F) -> Node<Ctx>
where
    F: Fn(Ctx) -> Result<(), String> + Send + Sync + 'static,
{
    Node {
        kind: NodeKind::AfterEach(Arc::new(f)),
    }
}

/// An `AfterAll` hook: runs once after the last test of its enclosing
/// group has completed.
pub fn after_all<Ctx, F>(f: F) -> Node<Ctx>
where
    F: Fn(Ctx) -> Result<(), String> + Send + Sync + 'static,
{
    Node {
        kind: NodeKind::AfterAll(Arc::new(f)),
    }
}

/// The root of a suite: an initial context value plus the declarative tree
/// describing its tests, groups, and hooks.
pub struct TestSuite<Ctx> {
    pub(crate) seed: Ctx,
    pub(crate) tree: Node<Ctx>,
}

impl<Ctx> TestSuite<Ctx> {
    /// Builds a suite from a seed context and a tree. The seed is the
    /// initial value threaded into the top-level `BeforeAll`/`BeforeEach`
    /// chain; for context-free suites, use `()`.
    pub fn new(seed: Ctx, tree: Node<Ctx>) -> Self {
        Self { seed, tree }
    }
}

impl TestSuite<()> {
    /// Convenience constructor for context-free suites.
    pub fn context_free(tree: Node<()>) -> Self {
        Self::new((), tree)
    }
}
