// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Gherkin lowering contract.
//!
//! Feature-file parsing is an external collaborator's job; this module only
//! takes an already-structured [`GherkinFeature`] (background steps plus
//! scenarios, each scenario already expanded from any outline examples by
//! the front-end) and lowers it into a [`Node`] subtree the suite tree and
//! execution engine understand natively. A step is itself a context-
//! transforming hook, the same shape as `BeforeEach`/`BeforeAll`, so the
//! background steps compose directly into a single synthesized
//! `BeforeEach`.

use crate::result::{AssertionResult, Failure, TestKind};
use crate::suite::{before_each, group, test, HookFn, Node, TestBody};
use indexmap::IndexMap;
use std::sync::Arc;

/// One Gherkin step, already resolved (or not) against a step-definition
/// registry by the front-end.
///
/// `run` is `None` when the front-end could not find an implementation for
/// `text`; lowering such a step produces a synthesized failing test rather
/// than panicking.
pub struct GherkinStep<Ctx> {
    pub text: String,
    pub run: Option<Arc<HookFn<Ctx>>>,
}

impl<Ctx> GherkinStep<Ctx> {
    /// A resolved step backed by `f`.
    pub fn resolved<F>(text: impl Into<String>, f: F) -> Self
    where
        F: Fn(Ctx) -> Result<Ctx, String> + Send + Sync + 'static,
    {
        Self {
            text: text.into(),
            run: Some(Arc::new(f)),
        }
    }

    /// An unresolved step: the front-end found no matching implementation
    /// for `text`.
    pub fn unresolved(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            run: None,
        }
    }
}

/// One scenario, already fully expanded from any `Scenario Outline` example
/// table by the front-end — `outline_row` is carried only for reporting.
pub struct GherkinScenario<Ctx> {
    pub name: String,
    pub steps: Vec<GherkinStep<Ctx>>,
    pub outline_row: Option<IndexMap<String, String>>,
}

/// A feature: background steps shared by every scenario, plus the scenarios
/// themselves.
pub struct GherkinFeature<Ctx> {
    pub name: String,
    pub background: Vec<GherkinStep<Ctx>>,
    pub scenarios: Vec<GherkinScenario<Ctx>>,
}

/// Composes a step chain into a single hook that threads the context
/// through each step in order, short-circuiting (and naming which step
/// failed) on the first error.
fn compose_steps<Ctx>(steps: Vec<Arc<HookFn<Ctx>>>, scenario_failed_at: String) -> impl Fn(Ctx) -> Result<Ctx, String>
where
    Ctx: Clone,
{
    move |ctx: Ctx| {
        let mut ctx = ctx;
        for step in &steps {
            ctx = step(ctx).map_err(|e| format!("{scenario_failed_at}: {e}"))?;
        }
        Ok(ctx)
    }
}

/// Lowers a feature into a `Group` node: a synthesized `BeforeEach` running
/// the background steps, followed by one `Test` per scenario. Each test's
/// `kind` is [`TestKind::GherkinScenario`] named after the feature.
pub fn lower_feature<Ctx>(feature: GherkinFeature<Ctx>) -> Node<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    let mut children = Vec::with_capacity(feature.scenarios.len() + 1);

    if let Some(unresolved) = feature.background.iter().find(|s| s.run.is_none()) {
        // An unresolved background step poisons every scenario in the
        // feature, since it never runs. Surface it as one synthesized
        // failing test rather than silently running scenarios without
        // their shared setup.
        let feature_name = feature.name.clone();
        let step_text = unresolved.text.clone();
        children.push(
            test(
                format!("{feature_name} (background step unresolved)"),
                move |_ctx: Ctx| {
                    TestBody::Assertion(AssertionResult::Failed(Failure::new(
                        "parse-error",
                        format!("no implementation found for background step: {step_text}"),
                    )))
                },
            )
            .with_tags(["parse-error"])
            .with_kind(TestKind::GherkinScenario(feature.name.clone())),
        );
    } else if !feature.background.is_empty() {
        let background: Vec<Arc<HookFn<Ctx>>> = feature
            .background
            .into_iter()
            .map(|s| s.run.expect("checked above"))
            .collect();
        let composed = compose_steps(background, "background".to_string());
        children.push(before_each(composed));
    }

    let feature_name = feature.name.clone();
    for scenario in feature.scenarios {
        children.push(lower_scenario(&feature_name, scenario));
    }

    group(feature.name, children)
}

fn lower_scenario<Ctx>(feature_name: &str, scenario: GherkinScenario<Ctx>) -> Node<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    let mut name = scenario.name.clone();
    if let Some(row) = &scenario.outline_row {
        let row_desc: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
        name = format!("{name} [{}]", row_desc.join(", "));
    }

    if let Some(unresolved) = scenario.steps.iter().find(|s| s.run.is_none()) {
        let step_text = unresolved.text.clone();
        let feature_name = feature_name.to_string();
        return test(name, move |_ctx: Ctx| {
            TestBody::Assertion(AssertionResult::Failed(Failure::new(
                "parse-error",
                format!("no implementation found for step: {step_text}"),
            )))
        })
        .with_tags(["parse-error"])
        .with_kind(TestKind::GherkinScenario(feature_name));
    }

    let steps: Vec<Arc<HookFn<Ctx>>> = scenario
        .steps
        .into_iter()
        .map(|s| s.run.expect("checked above"))
        .collect();
    let scenario_label = format!("scenario `{name}`");
    let kind = TestKind::GherkinScenario(feature_name.to_string());

    test(name, move |ctx: Ctx| {
        let mut ctx = ctx;
        for step in &steps {
            match step(ctx.clone()) {
                Ok(next) => ctx = next,
                Err(message) => {
                    return TestBody::Assertion(AssertionResult::Failed(Failure::new(
                        "step",
                        format!("{scenario_label}: {message}"),
                    )));
                }
            }
        }
        TestBody::Assertion(AssertionResult::Ok)
    })
    .with_kind(kind)
}
