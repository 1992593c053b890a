// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flattens a [`super::Node`] tree into a ready-to-dispatch plan.
//!
//! Instead of re-walking the tree for every test, the tree is walked exactly
//! once, at plan-build time, into a flat list of [`PreparedTest`]s plus a
//! tree of [`GroupScope`]s carrying each group's own `BeforeAll`/`AfterAll`
//! chains. The engine then dispatches `PreparedTest`s directly with no
//! further tree traversal.
//!
//! ## Hook pairing under partial failure
//!
//! When a `BeforeEach` fails partway through its chain, only the
//! `AfterEach` hooks corresponding to already-successful before-hooks still
//! run. The tree has no explicit pairing between a `BeforeEach` and an
//! `AfterEach` node, so this is resolved positionally: if `before_each[k]`
//! is the first to fail, only `after_each[..k]` run, in reverse. The same
//! rule applies to a group's own `before_all`/`after_all` chains (see
//! [`ScopeSetup`]).
//!
//! `BeforeAll`/`AfterAll` are scoped to their *enclosing group as a whole*
//! rather than positionally within it: every test in a group shares the same
//! [`GroupScope`] regardless of where a `BeforeAll`/`AfterAll` node happens
//! to sit among that group's children. `BeforeEach`/`AfterEach` remain fully
//! positional.

use super::{HookFn, Node, NodeKind, RunFn, TeardownFn};
use crate::builder::TestInfo;
use crate::result::TestKind;
use crate::sandbox::Timeout;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Most groups declare a handful of hooks at most; inline storage for four
/// avoids a heap allocation per scope in the common case.
type HookChain<Ctx> = SmallVec<[Arc<HookFn<Ctx>>; 4]>;
type TeardownChain<Ctx> = SmallVec<[Arc<TeardownFn<Ctx>>; 4]>;

/// A group's own `BeforeAll`/`AfterAll` chains, plus the bookkeeping needed
/// to run them exactly once (before the first test, after the last) and to
/// cascade a failure down to nested groups.
pub(crate) struct GroupScope<Ctx> {
    pub(crate) full_path: Vec<String>,
    parent: Option<Arc<GroupScope<Ctx>>>,
    seed: Option<Ctx>,
    before_all: HookChain<Ctx>,
    after_all: TeardownChain<Ctx>,
    remaining: AtomicUsize,
    setup: OnceLock<Arc<ScopeSetup<Ctx>>>,
}

/// Which phase of a scope's composed `before_all` chain an event concerns.
/// The chain runs as a single logical hook invocation (see module docs on
/// the whole-group `BeforeAll` simplification), so there is exactly one
/// `Start`/`End` pair per scope that actually has `before_all` hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookEventKind {
    BeforeAllStart,
    BeforeAllEnd,
}

/// Callback the engine supplies so [`GroupScope::resolve`] can report when
/// it actually executes a scope's `before_all` chain, exactly once, from
/// inside the `OnceLock` critical section — not at the call site, where
/// concurrent callers racing to be first can't tell who will actually run
/// it.
pub(crate) type HookSink<'a> = dyn Fn(HookEventKind, &[String], Option<&str>) + Sync + 'a;

/// The resolved outcome of a scope's `before_all` chain.
pub(crate) struct ScopeSetup<Ctx> {
    /// The resolved context, present iff the chain (and its ancestors)
    /// fully succeeded.
    pub(crate) ctx: Option<Ctx>,
    /// How many of this scope's *own* `before_all` hooks ran successfully
    /// (not counting ancestors). Used to decide how many `after_all` hooks
    /// pair with a successful setup.
    pub(crate) executed: usize,
    /// The first error encountered, from this scope's own chain or
    /// inherited from a failed ancestor.
    pub(crate) error: Option<String>,
}

impl<Ctx> GroupScope<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    fn new_root(seed: Ctx) -> Arc<Self> {
        Arc::new(Self {
            full_path: Vec::new(),
            parent: None,
            seed: Some(seed),
            before_all: SmallVec::new(),
            after_all: SmallVec::new(),
            remaining: AtomicUsize::new(0),
            setup: OnceLock::new(),
        })
    }

    fn new_child(
        full_path: Vec<String>,
        parent: Arc<GroupScope<Ctx>>,
        before_all: HookChain<Ctx>,
        after_all: TeardownChain<Ctx>,
    ) -> Arc<Self> {
        Arc::new(Self {
            full_path,
            parent: Some(parent),
            seed: None,
            before_all,
            after_all,
            remaining: AtomicUsize::new(0),
            setup: OnceLock::new(),
        })
    }

    /// Resolves this scope's `before_all` chain, memoized so it runs
    /// exactly once no matter how many concurrent tests reach it first.
    /// `sink` is notified, exactly once, iff this call is the one that
    /// actually runs the chain (it is a no-op for scopes with no
    /// `before_all` hooks of their own).
    pub(crate) fn resolve(self: &Arc<Self>, sink: &HookSink<'_>) -> Arc<ScopeSetup<Ctx>> {
        self.setup
            .get_or_init(|| {
                let start: Result<Ctx, String> = match (&self.parent, &self.seed) {
                    (Some(parent), _) => {
                        let parent_setup = parent.resolve(sink);
                        match (&parent_setup.ctx, &parent_setup.error) {
                            (Some(ctx), None) => Ok(ctx.clone()),
                            (_, Some(err)) => Err(err.clone()),
                            _ => unreachable!("a scope's setup has either a ctx or an error"),
                        }
                    }
                    (None, Some(seed)) => Ok(seed.clone()),
                    (None, None) => unreachable!("root scope must carry a seed"),
                };

                if !self.before_all.is_empty() {
                    sink(HookEventKind::BeforeAllStart, &self.full_path, None);
                }

                match start {
                    Err(err) => {
                        if !self.before_all.is_empty() {
                            sink(HookEventKind::BeforeAllEnd, &self.full_path, Some(&err));
                        }
                        Arc::new(ScopeSetup {
                            ctx: None,
                            executed: 0,
                            error: Some(err),
                        })
                    }
                    Ok(mut ctx) => {
                        let mut executed = 0usize;
                        let mut error = None;
                        for hook in &self.before_all {
                            match hook(ctx.clone()) {
                                Ok(next) => {
                                    ctx = next;
                                    executed += 1;
                                }
                                Err(e) => {
                                    error = Some(e);
                                    break;
                                }
                            }
                        }
                        if !self.before_all.is_empty() {
                            sink(
                                HookEventKind::BeforeAllEnd,
                                &self.full_path,
                                error.as_deref(),
                            );
                        }
                        if let Some(err) = error {
                            Arc::new(ScopeSetup {
                                ctx: None,
                                executed,
                                error: Some(err),
                            })
                        } else {
                            Arc::new(ScopeSetup {
                                ctx: Some(ctx),
                                executed,
                                error: None,
                            })
                        }
                    }
                }
            })
            .clone()
    }

    /// Returns the `after_all` hooks that pair with a successful setup,
    /// already in LIFO (reverse-declaration) order.
    pub(crate) fn paired_after_all(&self, executed: usize) -> Vec<Arc<TeardownFn<Ctx>>> {
        self.after_all
            .iter()
            .take(executed.min(self.after_all.len()))
            .rev()
            .cloned()
            .collect()
    }

    /// Call once for each test that completes anywhere in this scope's
    /// subtree. Returns the (already-reversed) `after_all` chain to run if
    /// this call was the one that brought `remaining` to zero, else `None`.
    pub(crate) fn test_completed(&self) -> Option<Vec<Arc<TeardownFn<Ctx>>>> {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            let setup = self.setup.get();
            let executed = setup.map(|s| s.executed).unwrap_or(0);
            Some(self.paired_after_all(executed))
        } else {
            None
        }
    }

    /// All ancestor scopes from this one up to (and including) the root,
    /// nearest first.
    pub(crate) fn chain(self: &Arc<Self>) -> Vec<Arc<GroupScope<Ctx>>> {
        let mut out = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent) = current.parent.clone() {
            out.push(parent.clone());
            current = parent;
        }
        out
    }

    /// Whether this scope declares any `after_all` hooks worth announcing.
    pub(crate) fn has_after_all(&self) -> bool {
        !self.after_all.is_empty()
    }

    /// The context this scope's tests run with, once resolved. `None` if
    /// `resolve` hasn't completed yet or the chain failed.
    pub(crate) fn resolved_ctx(&self) -> Option<Ctx> {
        self.setup.get().and_then(|s| s.ctx.clone())
    }
}

/// One test, fully resolved: its hook chains, its scope, and its body,
/// ready for the engine to dispatch without any further tree walking.
pub(crate) struct PreparedTest<Ctx> {
    pub(crate) name: String,
    pub(crate) full_name: Vec<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) kind: TestKind,
    pub(crate) timeout: Option<Timeout>,
    pub(crate) scope: Arc<GroupScope<Ctx>>,
    pub(crate) before_each: HookChain<Ctx>,
    pub(crate) after_each: TeardownChain<Ctx>,
    pub(crate) run: Arc<RunFn<Ctx>>,
}

/// The flattened result of walking a suite tree once.
pub(crate) struct ExecutionPlan<Ctx> {
    pub(crate) tests: Vec<PreparedTest<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    pub(crate) fn build(seed: Ctx, tree: &Node<Ctx>, filter: &dyn Fn(&TestInfo) -> bool) -> Self {
        let root = GroupScope::new_root(seed);
        let root_for_count = root.clone();
        let mut tests = Vec::new();
        walk(
            tree,
            root,
            &[],
            &[],
            &[],
            &[],
            filter,
            &mut tests,
        );
        // Only matters when `tree` is a bare Test with no enclosing Group, so
        // its scope is the root itself rather than a child scope seeded by
        // the Group branch above; seed it the same way so `test_completed`
        // never underflows when the ancestor chain reaches the root.
        root_for_count.remaining.store(tests.len(), Ordering::Relaxed);
        Self { tests }
    }

    /// Builds one combined plan out of several suites sharing a context
    /// type, each rooted at its own [`GroupScope`] so their `BeforeAll`,
    /// `AfterAll`, and filtering all stay independent; only the resulting
    /// `tests` lists are concatenated.
    pub(crate) fn build_many<I>(suites: I, filter: &dyn Fn(&TestInfo) -> bool) -> Self
    where
        I: IntoIterator<Item = (Ctx, Node<Ctx>)>,
    {
        let mut tests = Vec::new();
        for (seed, tree) in suites {
            tests.extend(Self::build(seed, &tree, filter).tests);
        }
        Self { tests }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk<Ctx>(
    node: &Node<Ctx>,
    parent_scope: Arc<GroupScope<Ctx>>,
    path: &[String],
    inherited_tags: &[String],
    inherited_before_each: &[Arc<HookFn<Ctx>>],
    inherited_after_each: &[Arc<TeardownFn<Ctx>>],
    filter: &dyn Fn(&TestInfo) -> bool,
    out: &mut Vec<PreparedTest<Ctx>>,
) -> usize
where
    Ctx: Clone + Send + Sync + 'static,
{
    match &node.kind {
        NodeKind::Test {
            name,
            tags,
            kind,
            run,
            timeout_ms,
        } => {
            let mut full_name = path.to_vec();
            full_name.push(name.clone());
            let mut eff_tags = inherited_tags.to_vec();
            eff_tags.extend(tags.iter().cloned());

            let info = TestInfo {
                name: name.clone(),
                full_name: full_name.clone(),
                tags: eff_tags.clone(),
                kind: kind.clone(),
            };
            if !filter(&info) {
                return 0;
            }

            out.push(PreparedTest {
                name: name.clone(),
                full_name,
                tags: eff_tags,
                kind: kind.clone(),
                timeout: *timeout_ms,
                scope: parent_scope,
                before_each: SmallVec::from_slice(inherited_before_each),
                after_each: SmallVec::from_slice(inherited_after_each),
                run: run.clone(),
            });
            1
        }
        NodeKind::Group { name, tags, children } => {
            let mut path = path.to_vec();
            path.push(name.clone());
            let mut inherited_tags = inherited_tags.to_vec();
            inherited_tags.extend(tags.iter().cloned());

            // Pass 1: this group's own BeforeAll/AfterAll chains, regardless
            // of where they sit among the group's children (see module docs).
            let mut before_all: HookChain<Ctx> = SmallVec::new();
            let mut after_all: TeardownChain<Ctx> = SmallVec::new();
            for child in children {
                match &child.kind {
                    NodeKind::BeforeAll(f) => before_all.push(f.clone()),
                    NodeKind::AfterAll(f) => after_all.push(f.clone()),
                    _ => {}
                }
            }
            let scope = GroupScope::new_child(path.clone(), parent_scope, before_all, after_all);

            // Pass 2: positional BeforeEach/AfterEach accumulation, and
            // recursion into tests and nested groups in declaration order.
            let mut before_each: HookChain<Ctx> = SmallVec::from_slice(inherited_before_each);
            let mut after_each: TeardownChain<Ctx> = SmallVec::from_slice(inherited_after_each);
            let mut count = 0usize;
            let start_len = out.len();
            for child in children {
                match &child.kind {
                    NodeKind::BeforeAll(_) | NodeKind::AfterAll(_) => {}
                    NodeKind::BeforeEach(f) => before_each.push(f.clone()),
                    NodeKind::AfterEach(f) => after_each.push(f.clone()),
                    NodeKind::Test { .. } | NodeKind::Group { .. } => {
                        count += walk(
                            child,
                            scope.clone(),
                            &path,
                            &inherited_tags,
                            &before_each,
                            &after_each,
                            filter,
                            out,
                        );
                    }
                }
            }

            if count == 0 {
                // Prune entirely: hooks and all.
                out.truncate(start_len);
                0
            } else {
                scope.remaining.store(count, Ordering::Relaxed);
                count
            }
        }
        NodeKind::BeforeAll(_)
        | NodeKind::BeforeEach(_)
        | NodeKind::AfterEach(_)
        | NodeKind::AfterAll(_) => {
            // A bare hook node at the root of a tree (no enclosing group)
            // has nothing to attach to or apply against; treat it as
            // contributing no tests.
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{after_all, after_each, before_all, before_each, group, test, TestBody};
    use crate::result::AssertionResult;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    fn always_true(_: &TestInfo) -> bool {
        true
    }

    #[test]
    fn flat_group_positional_before_each() {
        // A before_each declared between two tests only applies to
        // subsequent siblings.
        let tree: Node<i64> = group(
            "root",
            vec![
                test("A", |ctx: i64| TestBody::Assertion(ctx_eq(ctx, 0))),
                before_each(|ctx: i64| Ok(ctx + 1)),
                test("B", |ctx: i64| TestBody::Assertion(ctx_eq(ctx, 1))),
                before_each(|ctx: i64| Ok(ctx + 1)),
                test("C", |ctx: i64| TestBody::Assertion(ctx_eq(ctx, 2))),
            ],
        );
        let plan = ExecutionPlan::build(0i64, &tree, &always_true);
        assert_eq!(plan.tests.len(), 3);
        assert_eq!(plan.tests[0].before_each.len(), 0);
        assert_eq!(plan.tests[1].before_each.len(), 1);
        assert_eq!(plan.tests[2].before_each.len(), 2);
    }

    fn ctx_eq(ctx: i64, expected: i64) -> AssertionResult {
        if ctx == expected {
            AssertionResult::Ok
        } else {
            AssertionResult::Failed(crate::result::Failure::new(
                "eq",
                format!("expected {expected}, got {ctx}"),
            ))
        }
    }

    #[test]
    fn empty_group_is_pruned() {
        let tree: Node<()> = group(
            "root",
            vec![group(
                "empty",
                vec![before_all(|ctx: ()| Ok(ctx)), after_all(|_: ()| Ok(()))],
            )],
        );
        let plan = ExecutionPlan::build((), &tree, &always_true);
        assert_eq!(plan.tests.len(), 0);
    }

    #[test]
    fn before_all_runs_once_across_sibling_tests() {
        let counter = Arc::new(AtomicI64::new(0));
        let c1 = counter.clone();
        let tree: Node<i64> = group(
            "root",
            vec![
                before_all(move |ctx: i64| {
                    c1.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(ctx + 10)
                }),
                test("A", |_| TestBody::Assertion(AssertionResult::Ok)),
                test("B", |_| TestBody::Assertion(AssertionResult::Ok)),
            ],
        );
        let plan = ExecutionPlan::build(0i64, &tree, &always_true);
        assert_eq!(plan.tests.len(), 2);
        let no_sink: &HookSink<'_> = &|_, _, _| {};
        let scope_a = &plan.tests[0].scope;
        let scope_b = &plan.tests[1].scope;
        let setup_a = scope_a.resolve(no_sink);
        let setup_b = scope_b.resolve(no_sink);
        assert_eq!(setup_a.ctx, Some(10));
        assert_eq!(setup_b.ctx, Some(10));
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn after_each_pairs_only_with_successful_before_each() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let tree: Node<i64> = group(
            "root",
            vec![
                before_each(move |ctx: i64| {
                    o1.lock().unwrap().push("before1");
                    Ok(ctx + 1)
                }),
                before_each(|_ctx: i64| Err("boom".to_string())),
                after_each(move |_ctx: i64| {
                    o2.lock().unwrap().push("after1");
                    Ok(())
                }),
                test("t", |_| TestBody::Assertion(AssertionResult::Ok)),
            ],
        );
        let plan = ExecutionPlan::build(0i64, &tree, &always_true);
        assert_eq!(plan.tests[0].before_each.len(), 2);
        assert_eq!(plan.tests[0].after_each.len(), 1);
    }
}
