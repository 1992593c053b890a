// Copyright (c) The dream-test Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios covering the suite tree, hook composition,
//! timeouts, cascading setup failure, parallel determinism, and Gherkin
//! lowering.

mod common;

use common::EventRecorder;
use dream_test::suite::TestBody;
use dream_test::{
    after_all, before_all, before_each, group, lower_feature, test as node_test,
    AssertionResult, Failure, GherkinFeature, GherkinScenario, GherkinStep, ReporterEvent,
    RunBuilder, Status, TestKind, TestSuite, Timeout,
};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn expect_ctx(ctx: i64, expected: i64) -> AssertionResult {
    if ctx == expected {
        AssertionResult::Ok
    } else {
        AssertionResult::Failed(Failure::new(
            "eq",
            format!("expected {expected}, got {ctx}"),
        ))
    }
}

#[test]
fn trivial_pass_reports_full_name_and_events() {
    let tree = group::<()>(
        "Math",
        vec![node_test("adds", |_ctx| {
            TestBody::Assertion(AssertionResult::Ok)
        })],
    );
    let recorder = EventRecorder::new();
    let results = RunBuilder::new(TestSuite::context_free(tree))
        .reporter(recorder.clone())
        .run()
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].full_name, vec!["Math".to_string(), "adds".to_string()]);
    assert_eq!(results[0].status, Status::Passed);
    assert!(results[0].failures.is_empty());

    let events = recorder.events();
    assert!(matches!(events[0], ReporterEvent::RunStarted { total: 1 }));
    match &events[1] {
        ReporterEvent::TestFinished { completed, total, .. } => {
            assert_eq!(*completed, 1);
            assert_eq!(*total, 1);
        }
        other => panic!("expected TestFinished second, got {other:?}"),
    }
    match events.last().unwrap() {
        ReporterEvent::RunFinished { completed, total } => {
            assert_eq!(*completed, 1);
            assert_eq!(*total, 1);
        }
        other => panic!("expected RunFinished last, got {other:?}"),
    }
}

#[test]
fn hook_positional_scope_across_siblings() {
    let tree: dream_test::Node<i64> = group(
        "root",
        vec![
            node_test("A", |ctx: i64| TestBody::Assertion(expect_ctx(ctx, 0))),
            before_each(|ctx: i64| Ok(ctx + 1)),
            node_test("B", |ctx: i64| TestBody::Assertion(expect_ctx(ctx, 1))),
            before_each(|ctx: i64| Ok(ctx + 1)),
            node_test("C", |ctx: i64| TestBody::Assertion(expect_ctx(ctx, 2))),
        ],
    );
    let results = RunBuilder::new(TestSuite::new(0i64, tree)).run().unwrap();
    assert_eq!(results.len(), 3);
    for r in &results {
        assert_eq!(r.status, Status::Passed, "{} failed: {:?}", r.name, r.failures);
    }
}

#[test_case(200, 50 ; "well past timeout")]
#[test_case(120, 30 ; "moderately past timeout")]
fn timeout_terminates_with_timed_out_status(sleep_ms: u64, timeout_ms: u64) {
    let tree: dream_test::Node<()> = group(
        "g",
        vec![node_test("slow", move |_: ()| {
            std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
            TestBody::Assertion(AssertionResult::Ok)
        })
        .with_timeout(Timeout::Millis(timeout_ms))],
    );

    let started = std::time::Instant::now();
    let results = RunBuilder::new(TestSuite::context_free(tree)).run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(results[0].status, Status::TimedOut);
    assert!(results[0].failures.is_empty());
    assert!(
        elapsed.as_millis() < timeout_ms as u128 + 500,
        "expected the sandbox to return near the timeout bound, took {elapsed:?}"
    );
}

#[test]
fn before_all_failure_cascades_as_setup_failed() {
    let after_all_ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = after_all_ran.clone();
    let tree: dream_test::Node<()> = group(
        "g",
        vec![
            before_all(|_: ()| Err("boom".to_string())),
            after_all(move |_: ()| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }),
            node_test("t1", |_| TestBody::Assertion(AssertionResult::Ok)),
            node_test("t2", |_| TestBody::Assertion(AssertionResult::Ok)),
        ],
    );
    let results = RunBuilder::new(TestSuite::context_free(tree)).run().unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.status, Status::SetupFailed);
        assert_eq!(r.failures.len(), 1);
        assert_eq!(r.failures[0].message, "boom");
    }
    assert!(
        !after_all_ran.load(std::sync::atomic::Ordering::SeqCst),
        "after_all must not run when its before_all never succeeded"
    );
}

#[test]
fn parallelism_is_deterministic_across_repeated_runs() {
    let mut expected: Option<Vec<String>> = None;
    for _ in 0..20 {
        let tests: Vec<_> = (0..10)
            .map(|i| node_test(format!("t{i}"), |_: ()| TestBody::Assertion(AssertionResult::Ok)))
            .collect();
        let tree = group::<()>("g", tests);
        let results = RunBuilder::new(TestSuite::context_free(tree))
            .max_concurrency(8)
            .run()
            .unwrap();
        let names: Vec<String> = results.iter().map(|r| r.full_name_str()).collect();
        match &expected {
            None => expected = Some(names),
            Some(expected_names) => assert_eq!(&names, expected_names),
        }
    }
}

#[test]
fn gherkin_feature_lowers_to_group_with_background_and_scenarios() {
    let feature = GherkinFeature {
        name: "Login".to_string(),
        background: vec![GherkinStep::resolved("Given X", |_: Vec<String>| {
            Ok(vec!["X".to_string()])
        })],
        scenarios: vec![
            GherkinScenario {
                name: "S1".to_string(),
                steps: vec![GherkinStep::resolved("a step", |mut ctx: Vec<String>| {
                    ctx.push("S1".to_string());
                    Ok(ctx)
                })],
                outline_row: None,
            },
            GherkinScenario {
                name: "S2".to_string(),
                steps: vec![GherkinStep::resolved("a step", |mut ctx: Vec<String>| {
                    ctx.push("S2".to_string());
                    Ok(ctx)
                })],
                outline_row: None,
            },
        ],
    };

    let tree = lower_feature(feature);
    let results = RunBuilder::new(TestSuite::new(Vec::<String>::new(), tree))
        .run()
        .unwrap();

    assert_eq!(results.len(), 2);
    let names: Vec<_> = results.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["S1".to_string(), "S2".to_string()]);
    for r in &results {
        assert_eq!(r.status, Status::Passed);
        assert_eq!(r.kind, TestKind::GherkinScenario("Login".to_string()));
        assert_eq!(r.full_name[0], "Login");
    }
}
