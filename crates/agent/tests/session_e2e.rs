//! End-to-end tests: the control loop with real tools and perception over
//! in-memory doubles of the environment and decision-maker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uipilot_agent::{
    AgentLoop, BatchRunner, CaseVerdict, EnvironmentLauncher, LoopSettings, TestCase,
};
use uipilot_core::check::LocationContains;
use uipilot_core::testing::{FixedPointer, MockEnvironment, ScriptedDecisionMaker};
use uipilot_core::{
    AccessibilityTree, CheckError, Decision, DomNode, Environment, EnvironmentError,
    EnvironmentKind, Manifest, NormalizedPoint, PointingService, SessionStatus, SuccessCheck,
    Termination, ToolInvocation, ToolRegistry, TurnRecord, Verdict,
};
use uipilot_tools::{ToolCatalog, ToolSettings, default_registry};

// ── Helpers ──────────────────────────────────────────────────────────────

fn browser_tools() -> Arc<ToolRegistry> {
    Arc::new(default_registry(
        EnvironmentKind::Browser,
        ToolSettings::default(),
        None,
    ))
}

fn checkout_page() -> MockEnvironment {
    MockEnvironment::browser("https://shop.test/cart")
        .with_tree(AccessibilityTree::Dom(vec![
            DomNode::new("main", "").with_children(vec![
                DomNode::new("heading", "Your cart"),
                DomNode::new("button", "Continue"),
            ]),
        ]))
        .with_navigation("button", Some("Continue"), "https://shop.test/success")
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolInvocation {
    ToolInvocation::new(id, name, args)
}

fn finish(reason: &str) -> Decision {
    Decision::act(vec![call("fin", "finish", json!({ "reason": reason }))])
}

fn idle() -> Decision {
    Decision::act(vec![call("w", "wait", json!({ "seconds": 0 }))])
}

fn settings(max_turns: u32) -> LoopSettings {
    LoopSettings {
        max_turns,
        ..LoopSettings::default()
    }
}

/// Reports success from the `k`-th call on.
struct PassesFrom {
    k: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl SuccessCheck for PassesFrom {
    async fn check(&self, _env: &dyn Environment) -> Result<bool, CheckError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n >= self.k)
    }
}

// ── Sessions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn continue_scenario_reaches_success_page() {
    uipilot_config::logging::init(false);
    let maker = Arc::new(ScriptedDecisionMaker::new(vec![
        Decision::act(vec![call(
            "c1",
            "click",
            json!({ "role": "button", "name": "Continue" }),
        )]),
        finish("Task Success"),
    ]));
    let agent = AgentLoop::new(maker.clone(), browser_tools(), settings(10));
    let env = checkout_page();

    let result = agent.run(&env, "Proceed past the cart").await.unwrap();

    assert_eq!(result.status, SessionStatus::Success);
    assert_eq!(result.termination, Termination::Finished);
    assert_eq!(result.turns, 2);
    assert_eq!(env.location(), "https://shop.test/success");

    let outputs: Vec<_> = result
        .transcript
        .tool_results()
        .map(|r| r.output.as_str())
        .collect();
    assert_eq!(
        outputs,
        vec![
            "OK: clicked role='button' name='Continue'",
            "TASK_COMPLETE: Task Success",
        ]
    );

    // The second observation sees the new location and the same manifest.
    let observations: Vec<_> = result
        .transcript
        .iter()
        .filter_map(|record| match record {
            TurnRecord::Observation(o) => Some(o),
            _ => None,
        })
        .collect();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].snapshot.location, "https://shop.test/cart");
    assert_eq!(observations[1].snapshot.location, "https://shop.test/success");
    assert_eq!(
        observations[0].snapshot.manifest.render(),
        "- main: (no name)\n- heading: Your cart\n- button: Continue"
    );
    assert!(observations.iter().all(|o| o.task == "Proceed past the cart"));
}

#[tokio::test]
async fn success_check_ends_session_without_finish() {
    let maker = Arc::new(ScriptedDecisionMaker::always(Decision::act(vec![call(
        "c1",
        "click",
        json!({ "role": "button", "name": "Continue" }),
    )])));
    let agent = AgentLoop::new(maker.clone(), browser_tools(), settings(10))
        .with_success_check(Arc::new(LocationContains("/success".into())));

    let result = agent.run(&checkout_page(), "Proceed").await.unwrap();
    assert_eq!(result.status, SessionStatus::Success);
    assert_eq!(result.termination, Termination::CheckPassed);
    assert_eq!(result.turns, 1);
    assert_eq!(maker.call_count(), 1);
}

#[tokio::test]
async fn check_true_at_turn_k_finishes_by_k_plus_one() {
    for check_after_actions in [true, false] {
        for k in 1..=4 {
            let maker = Arc::new(ScriptedDecisionMaker::always(idle()));
            let check = Arc::new(PassesFrom {
                k,
                calls: AtomicUsize::new(0),
            });
            let agent = AgentLoop::new(
                maker,
                browser_tools(),
                LoopSettings {
                    check_after_actions,
                    ..settings(20)
                },
            )
            .with_success_check(check);

            let result = agent.run(&checkout_page(), "wait for it").await.unwrap();
            assert_eq!(result.status, SessionStatus::Success, "k={k}");
            assert!(result.turns <= k as u32 + 1, "k={k} turns={}", result.turns);
        }
    }
}

#[tokio::test]
async fn budget_of_n_stops_at_exactly_n_observations() {
    for n in [1_u32, 3, 7] {
        let maker = Arc::new(ScriptedDecisionMaker::always(idle()));
        let agent = AgentLoop::new(maker.clone(), browser_tools(), settings(n))
            .with_success_check(Arc::new(LocationContains("/never".into())));

        let result = agent.run(&checkout_page(), "never done").await.unwrap();
        assert_eq!(result.termination, Termination::BudgetExhausted);
        assert_eq!(result.turns, n);
        assert_eq!(result.transcript.observations(), n as usize);
        assert_ne!(result.verdict(), Verdict::Success);
        assert_eq!(maker.call_count(), n as usize);
    }
}

#[tokio::test]
async fn finish_reason_classification_drives_status() {
    let cases = [
        ("Task Success", Verdict::Success),
        ("success: logged in", Verdict::Success),
        ("FAILURE: button disabled", Verdict::Failure),
        ("I think we are done", Verdict::Unresolved),
    ];
    for (reason, expected) in cases {
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![finish(reason)]));
        let agent = AgentLoop::new(maker, browser_tools(), settings(5));
        let result = agent.run(&checkout_page(), "task").await.unwrap();
        assert_eq!(result.termination, Termination::Finished, "{reason}");
        assert_eq!(result.verdict(), expected, "{reason}");
    }
}

#[tokio::test]
async fn empty_pointing_answer_clicks_nothing() {
    let pointer: Arc<dyn PointingService> = Arc::new(FixedPointer::nothing());
    let tools = Arc::new(default_registry(
        EnvironmentKind::Browser,
        ToolSettings::default(),
        Some(pointer),
    ));
    let maker = Arc::new(ScriptedDecisionMaker::new(vec![
        Decision::act(vec![call(
            "v1",
            "coord_click",
            json!({ "prompt": "the red Submit button" }),
        )]),
        finish("Failure: no submit button"),
    ]));
    let agent = AgentLoop::new(maker, tools, settings(5));
    let env = checkout_page();

    let result = agent.run(&env, "submit").await.unwrap();
    let first = result.transcript.tool_results().next().unwrap();
    assert!(first.output.starts_with("ERROR: "), "{}", first.output);
    assert!(first.output.ends_with("no points"), "{}", first.output);
    assert!(env.actions().is_empty());
    assert_eq!(result.status, SessionStatus::Failure);
}

#[tokio::test]
async fn vision_click_returns_the_point() {
    let pointer: Arc<dyn PointingService> =
        Arc::new(FixedPointer::points(vec![NormalizedPoint::new(0.25, 0.5)]));
    let tools = Arc::new(default_registry(
        EnvironmentKind::Browser,
        ToolSettings::default(),
        Some(pointer),
    ));
    let maker = Arc::new(ScriptedDecisionMaker::new(vec![
        Decision::act(vec![call("v1", "coord_click", json!({ "prompt": "logo" }))]),
        finish("Task Success"),
    ]));
    let agent = AgentLoop::new(maker, tools, settings(5));
    let env = checkout_page();

    let result = agent.run(&env, "click the logo").await.unwrap();
    let first = result.transcript.tool_results().next().unwrap();
    assert_eq!(first.output, "(0.25, 0.5)");
    assert_eq!(env.actions().len(), 1);
}

#[tokio::test]
async fn script_mode_drives_the_page() {
    let tools = Arc::new(
        ToolCatalog::new(EnvironmentKind::Browser, ToolSettings::default())
            .with_script()
            .build(),
    );
    let script = r#"
async fn main(env) {
    env.click("button", "Continue");
    let url = env.location();
    expect(matches(url, "success"), "not on the success page");
    return url;
}
"#;
    let maker = Arc::new(ScriptedDecisionMaker::new(vec![
        Decision::act(vec![call("s1", "run_script", json!({ "script": script }))]),
        finish("Task Success"),
    ]));
    let agent = AgentLoop::new(maker, tools, settings(5));
    let env = checkout_page();

    let result = agent.run(&env, "continue").await.unwrap();
    let first = result.transcript.tool_results().next().unwrap();
    assert_eq!(first.output, "OK: 'https://shop.test/success'");
    assert!(result.is_success());
}

#[tokio::test]
async fn manifest_failure_still_yields_a_snapshot() {
    let env = MockEnvironment::browser("https://shop.test/")
        .with_tree_error(EnvironmentError::Driver("renderer crashed".into()));
    let maker = Arc::new(ScriptedDecisionMaker::new(vec![finish("Failure")]));
    let agent = AgentLoop::new(maker, browser_tools(), settings(5));

    let result = agent.run(&env, "task").await.unwrap();
    let Some(TurnRecord::Observation(observation)) = result.transcript.iter().next() else {
        panic!("first record should be an observation");
    };
    assert!(matches!(observation.snapshot.manifest, Manifest::Error { .. }));
    assert!(
        observation
            .snapshot
            .manifest
            .render()
            .starts_with("UI_MANIFEST_ERROR: DriverError: ")
    );
}

// ── Batch ────────────────────────────────────────────────────────────────

/// Tracks how many environments are alive at once.
#[derive(Default)]
struct CountingLauncher {
    alive: AtomicUsize,
    peak: AtomicUsize,
    launched: AtomicUsize,
}

#[async_trait]
impl EnvironmentLauncher for CountingLauncher {
    async fn launch(&self, url: &str) -> Result<Box<dyn Environment>, EnvironmentError> {
        let alive = self.alive.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(alive, Ordering::SeqCst);
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(
            MockEnvironment::browser(url).with_latency(Duration::from_millis(10)),
        ))
    }

    async fn teardown(&self, _env: Box<dyn Environment>) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_sessions_with_limit_three() {
    let maker = Arc::new(ScriptedDecisionMaker::always(Decision::act(vec![
        call("w", "wait", json!({ "seconds": 0.05 })),
        call("f", "finish", json!({ "reason": "Task Success" })),
    ])));
    let agent = Arc::new(AgentLoop::new(maker, browser_tools(), settings(5)));
    let launcher = Arc::new(CountingLauncher::default());
    let runner = BatchRunner::new(agent, launcher.clone(), 3);

    let cases = (0..5)
        .map(|i| TestCase::new(format!("https://app.test/case/{i}"), format!("case {i}")))
        .collect();
    let summary = runner.run(cases).await;

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 5);
    assert!(summary.cases.iter().all(|c| c.verdict == CaseVerdict::Success));
    assert_eq!(launcher.launched.load(Ordering::SeqCst), 5);
    assert!(launcher.peak.load(Ordering::SeqCst) <= 3);
    assert!(launcher.peak.load(Ordering::SeqCst) >= 2);
    assert_eq!(launcher.alive.load(Ordering::SeqCst), 0);
}
