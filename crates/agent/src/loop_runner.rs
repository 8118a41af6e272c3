//! The control loop: observe, decide, act, repeat.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uipilot_config::{AppConfig, OnNoToolCalls};
use uipilot_core::transcript::Observation;
use uipilot_core::{
    Decision, DecisionError, DecisionMaker, DecisionRequest, DomainEvent, Environment, EventBus,
    Session, SessionAborted, SessionResult, SessionStatus, SuccessCheck, Termination,
    ToolDefinition, ToolRegistry, TurnRecord,
};
use uipilot_perception::Perceiver;

use crate::finish::finish_status;
use crate::prompt::default_system_prompt;

/// Budgets and switches for one [`AgentLoop`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Call budget, counted in observe cycles.
    pub max_turns: u32,
    pub on_no_tool_calls: OnNoToolCalls,
    /// Consult the success check right after each batch of actions as well
    /// as at the start of each observe cycle.
    pub check_after_actions: bool,
    pub perceiver: Perceiver,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut perceiver = Perceiver::new(config.agent.manifest_limit);
        if !config.agent.include_manifest {
            perceiver = perceiver.without_manifest();
        }
        Self {
            max_turns: config.agent.max_turns,
            on_no_tool_calls: config.agent.on_no_tool_calls,
            check_after_actions: config.agent.check_after_actions,
            perceiver,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Drives one session at a time against a caller-supplied environment.
///
/// The loop itself holds no per-session state, so one `AgentLoop` can be
/// shared across concurrently running sessions.
pub struct AgentLoop {
    decision_maker: Arc<dyn DecisionMaker>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
    system_prompt: Option<String>,
    success_check: Option<Arc<dyn SuccessCheck>>,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(
        decision_maker: Arc<dyn DecisionMaker>,
        tools: Arc<ToolRegistry>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            decision_maker,
            tools,
            settings,
            system_prompt: None,
            success_check: None,
            event_bus: None,
        }
    }

    pub fn with_success_check(mut self, check: Arc<dyn SuccessCheck>) -> Self {
        self.success_check = Some(check);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the built-in prompt for the environment kind.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run `task` to a terminal state.
    ///
    /// Tool and check failures never end the session early; they are
    /// recorded in the transcript. Only a failing decision-maker aborts the
    /// run; the error then carries the transcript recorded so far.
    pub async fn run(
        &self,
        env: &dyn Environment,
        task: &str,
    ) -> Result<SessionResult, SessionAborted> {
        let mut session = Session::new(task);
        let system_prompt = self
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| default_system_prompt(env.kind()));
        let definitions = self.tools.definitions();

        info!(
            session_id = %session.id,
            location = %env.location(),
            max_turns = self.settings.max_turns,
            tools = definitions.len(),
            "Session started"
        );
        self.publish(DomainEvent::SessionStarted {
            session_id: session.id.clone(),
            task: task.to_string(),
            location: env.location(),
            timestamp: Utc::now(),
        });

        let mut checked_after_actions = false;
        let termination = loop {
            if !checked_after_actions && self.check_passed(env, &session).await {
                session.resolve(SessionStatus::Success);
                break Termination::CheckPassed;
            }
            checked_after_actions = false;

            if session.turns() >= self.settings.max_turns {
                warn!(
                    session_id = %session.id,
                    turns = session.turns(),
                    "Call budget exhausted"
                );
                break Termination::BudgetExhausted;
            }

            let turn = session.begin_turn();
            self.observe(env, &mut session, turn).await;

            let decision = match self
                .decide(system_prompt, &session, &definitions)
                .await
            {
                Ok(decision) => decision,
                Err(error) => {
                    warn!(session_id = %session.id, turn, error = %error, "Decision failed");
                    self.finished(&session, Termination::Aborted);
                    return Err(SessionAborted {
                        error,
                        partial: Box::new(session.into_result(Termination::Aborted)),
                    });
                }
            };
            self.publish(DomainEvent::DecisionReceived {
                session_id: session.id.clone(),
                turn,
                invocations: decision.invocations.len(),
                timestamp: Utc::now(),
            });
            session.transcript.push(TurnRecord::Decision {
                turn,
                decision: decision.clone(),
            });

            if !decision.has_actions() {
                match self.settings.on_no_tool_calls {
                    OnNoToolCalls::Finish => {
                        debug!(session_id = %session.id, turn, "No tool calls, finishing");
                        break Termination::NoAction;
                    }
                    OnNoToolCalls::Reobserve => {
                        debug!(session_id = %session.id, turn, "No tool calls, observing again");
                        continue;
                    }
                }
            }

            if let Some(reason) = self.act(env, &mut session, turn, &decision).await {
                let status = finish_status(&reason);
                session.resolve(status);
                info!(
                    session_id = %session.id,
                    turn,
                    reason = %reason,
                    status = ?session.status(),
                    "Finish requested"
                );
                break Termination::Finished;
            }

            if self.settings.check_after_actions {
                if self.check_passed(env, &session).await {
                    session.resolve(SessionStatus::Success);
                    break Termination::CheckPassed;
                }
                checked_after_actions = true;
            }
        };

        self.finished(&session, termination);
        Ok(session.into_result(termination))
    }

    fn finished(&self, session: &Session, termination: Termination) {
        info!(
            session_id = %session.id,
            turns = session.turns(),
            status = ?session.status(),
            termination = ?termination,
            "Session finished"
        );
        self.publish(DomainEvent::SessionFinished {
            session_id: session.id.clone(),
            status: session.status(),
            turns: session.turns(),
            termination,
            timestamp: Utc::now(),
        });
    }

    async fn observe(&self, env: &dyn Environment, session: &mut Session, turn: u32) {
        let snapshot = self.settings.perceiver.observe(env).await;
        debug!(
            session_id = %session.id,
            turn,
            location = %snapshot.location,
            "Observed"
        );
        self.publish(DomainEvent::TurnObserved {
            session_id: session.id.clone(),
            turn,
            location: snapshot.location.clone(),
            manifest_lines: snapshot.manifest.entries().len(),
            timestamp: Utc::now(),
        });
        session.transcript.push(TurnRecord::Observation(Observation {
            turn,
            task: session.task().to_string(),
            snapshot,
            timestamp: Utc::now(),
        }));
    }

    async fn decide(
        &self,
        system_prompt: &str,
        session: &Session,
        definitions: &[ToolDefinition],
    ) -> Result<Decision, DecisionError> {
        let decision = self
            .decision_maker
            .decide(DecisionRequest {
                system_prompt,
                transcript: &session.transcript,
                tools: definitions,
            })
            .await?;
        debug!(
            session_id = %session.id,
            decision_maker = self.decision_maker.name(),
            invocations = decision.invocations.len(),
            "Decision received"
        );
        Ok(decision)
    }

    /// Execute the decision's invocations in order. Returns the finish
    /// reason if one of them was the finish tool; anything queued after it
    /// is not executed.
    async fn act(
        &self,
        env: &dyn Environment,
        session: &mut Session,
        turn: u32,
        decision: &Decision,
    ) -> Option<String> {
        let mut results = Vec::with_capacity(decision.invocations.len());
        let mut finish = None;

        for (index, invocation) in decision.invocations.iter().enumerate() {
            let report = self.tools.invoke(env, invocation).await;
            info!(
                session_id = %session.id,
                turn,
                tool = %report.tool,
                ok = report.ok,
                duration_ms = report.duration_ms,
                "Tool executed"
            );
            self.publish(DomainEvent::ToolExecuted {
                session_id: session.id.clone(),
                tool: report.tool.clone(),
                ok: report.ok,
                duration_ms: report.duration_ms,
                timestamp: Utc::now(),
            });
            results.push(report.to_record());

            if let Some(reason) = report.finish {
                let skipped = decision.invocations.len() - index - 1;
                if skipped > 0 {
                    debug!(session_id = %session.id, turn, skipped, "Ignoring invocations after finish");
                }
                finish = Some(reason);
                break;
            }
        }

        session.transcript.push(TurnRecord::ToolResults { turn, results });
        finish
    }

    /// A failing check counts as "not yet".
    async fn check_passed(&self, env: &dyn Environment, session: &Session) -> bool {
        let Some(check) = &self.success_check else {
            return false;
        };
        match check.check(env).await {
            Ok(passed) => {
                if passed {
                    info!(session_id = %session.id, turn = session.turns(), "Success check passed");
                }
                passed
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Success check failed");
                false
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use uipilot_core::testing::{MockEnvironment, ScriptedDecisionMaker};
    use uipilot_core::{
        AccessibilityTree, CheckError, DomNode, EnvironmentKind, ToolInvocation, Verdict,
    };
    use uipilot_tools::{ToolSettings, default_registry};

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(default_registry(
            EnvironmentKind::Browser,
            ToolSettings::default(),
            None,
        ))
    }

    fn page() -> MockEnvironment {
        MockEnvironment::browser("https://app.test/")
            .with_tree(AccessibilityTree::Dom(vec![DomNode::new("button", "Continue")]))
            .with_navigation("button", Some("Continue"), "https://app.test/success")
    }

    fn settings(max_turns: u32) -> LoopSettings {
        LoopSettings {
            max_turns,
            ..LoopSettings::default()
        }
    }

    fn finish(reason: &str) -> Decision {
        Decision::act(vec![ToolInvocation::new(
            "f",
            "finish",
            json!({ "reason": reason }),
        )])
    }

    fn wait() -> Decision {
        Decision::act(vec![ToolInvocation::new("w", "wait", json!({ "seconds": 0 }))])
    }

    struct AlwaysErrors;

    #[async_trait]
    impl SuccessCheck for AlwaysErrors {
        async fn check(&self, _env: &dyn Environment) -> Result<bool, CheckError> {
            Err(CheckError("selector engine unavailable".into()))
        }
    }

    #[tokio::test]
    async fn finish_success_ends_session() {
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![finish("Task Success")]));
        let agent = AgentLoop::new(maker.clone(), registry(), settings(10));

        let result = agent.run(&page(), "press continue").await.unwrap();
        assert_eq!(result.status, SessionStatus::Success);
        assert_eq!(result.termination, Termination::Finished);
        assert_eq!(result.turns, 1);
        assert_eq!(maker.call_count(), 1);
        // observation, decision, tool results
        assert_eq!(result.transcript.len(), 3);
    }

    #[tokio::test]
    async fn unclassified_finish_is_unresolved() {
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![finish("done here")]));
        let agent = AgentLoop::new(maker, registry(), settings(10));

        let result = agent.run(&page(), "press continue").await.unwrap();
        assert_eq!(result.termination, Termination::Finished);
        assert_eq!(result.verdict(), Verdict::Unresolved);
    }

    #[tokio::test]
    async fn invocations_after_finish_are_ignored() {
        let decision = Decision::act(vec![
            ToolInvocation::new("1", "finish", json!({ "reason": "Failure" })),
            ToolInvocation::new("2", "click", json!({ "role": "button", "name": "Continue" })),
        ]);
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![decision]));
        let agent = AgentLoop::new(maker, registry(), settings(10));
        let env = page();

        let result = agent.run(&env, "press continue").await.unwrap();
        assert_eq!(result.status, SessionStatus::Failure);
        assert!(env.actions().is_empty());
        let outputs: Vec<_> = result.transcript.tool_results().collect();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output, "TASK_COMPLETE: Failure");
    }

    #[tokio::test]
    async fn invocations_run_in_issue_order() {
        let decision = Decision::act(vec![
            ToolInvocation::new("1", "type", json!({ "text": "hello" })),
            ToolInvocation::new("2", "keypress", json!({ "key": "Enter" })),
            ToolInvocation::new("3", "click", json!({ "role": "button", "name": "Continue" })),
        ]);
        let maker = Arc::new(
            ScriptedDecisionMaker::new(vec![decision]).then_always(finish("Task Success")),
        );
        let agent = AgentLoop::new(maker, registry(), settings(10));
        let env = page();

        agent.run(&env, "type and submit").await.unwrap();
        let actions = env.actions();
        assert_eq!(actions.len(), 3);
        assert!(actions[0].starts_with("type"));
        assert!(actions[1].starts_with("press"));
        assert!(actions[2].starts_with("click"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_a_result_not_a_failure() {
        let decision = Decision::act(vec![ToolInvocation::new("1", "teleport", json!({}))]);
        let maker = Arc::new(
            ScriptedDecisionMaker::new(vec![decision]).then_always(finish("Task Success")),
        );
        let agent = AgentLoop::new(maker, registry(), settings(10));

        let result = agent.run(&page(), "task").await.unwrap();
        assert!(result.is_success());
        let first = result.transcript.tool_results().next().unwrap();
        assert!(first.output.starts_with("ERROR: UnknownToolError: "));
        assert!(first.output.contains("'back', 'check', 'click'"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_unresolved() {
        let maker = Arc::new(ScriptedDecisionMaker::always(wait()));
        let agent = AgentLoop::new(maker.clone(), registry(), settings(4));

        let result = agent.run(&page(), "never converges").await.unwrap();
        assert_eq!(result.termination, Termination::BudgetExhausted);
        assert_eq!(result.turns, 4);
        assert_eq!(result.verdict(), Verdict::Unresolved);
        assert_eq!(maker.call_count(), 4);
    }

    #[tokio::test]
    async fn no_tool_calls_reobserves_by_default() {
        let maker = Arc::new(
            ScriptedDecisionMaker::new(vec![Decision::say("looking around")])
                .then_always(finish("Task Success")),
        );
        let agent = AgentLoop::new(maker.clone(), registry(), settings(10));

        let result = agent.run(&page(), "task").await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.turns, 2);
        // each call sees the transcript grow by observation + decision (+ results)
        assert_eq!(maker.transcript_lengths(), vec![1, 3]);
    }

    #[tokio::test]
    async fn no_tool_calls_can_finish() {
        let maker = Arc::new(ScriptedDecisionMaker::always(Decision::say("all good")));
        let agent = AgentLoop::new(
            maker.clone(),
            registry(),
            LoopSettings {
                on_no_tool_calls: OnNoToolCalls::Finish,
                ..settings(10)
            },
        );

        let result = agent.run(&page(), "task").await.unwrap();
        assert_eq!(result.termination, Termination::NoAction);
        assert_eq!(result.verdict(), Verdict::Unresolved);
        assert_eq!(maker.call_count(), 1);
    }

    #[tokio::test]
    async fn decision_error_propagates() {
        let maker = Arc::new(ScriptedDecisionMaker::failing(DecisionError::RateLimited {
            retry_after_secs: 5,
        }));
        let agent = AgentLoop::new(maker, registry(), settings(10));

        let err = agent.run(&page(), "task").await.unwrap_err();
        assert!(matches!(err.error, DecisionError::RateLimited { .. }));
        assert_eq!(err.partial.termination, Termination::Aborted);
        assert_eq!(err.partial.verdict(), Verdict::Unresolved);
        assert_eq!(err.partial.turns, 1);
        assert_eq!(err.partial.transcript.observations(), 1);
    }

    #[tokio::test]
    async fn aborted_session_keeps_earlier_turns() {
        // two replies, then the scripted maker runs dry on turn 3
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![wait(), wait()]));
        let agent = AgentLoop::new(maker, registry(), settings(10));

        let err = agent.run(&page(), "task").await.unwrap_err();
        assert!(matches!(err.error, DecisionError::MalformedResponse(_)));
        let partial = err.partial;
        assert_eq!(partial.turns, 3);
        assert_eq!(partial.transcript.observations(), 3);
        assert_eq!(partial.transcript.tool_results().count(), 2);
        assert!(
            partial
                .transcript
                .tool_results()
                .all(|r| r.output.starts_with("OK: "))
        );
        assert_eq!(partial.task, "task");
    }

    #[tokio::test]
    async fn check_errors_count_as_not_yet() {
        let maker = Arc::new(ScriptedDecisionMaker::always(wait()));
        let agent = AgentLoop::new(maker, registry(), settings(3))
            .with_success_check(Arc::new(AlwaysErrors));

        let result = agent.run(&page(), "task").await.unwrap();
        assert_eq!(result.termination, Termination::BudgetExhausted);
        assert_eq!(result.turns, 3);
    }

    #[tokio::test]
    async fn custom_system_prompt_reaches_the_decision_maker() {
        struct PromptRecorder(std::sync::Mutex<String>);

        #[async_trait]
        impl DecisionMaker for PromptRecorder {
            fn name(&self) -> &str {
                "prompt-recorder"
            }

            async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
                *self.0.lock().unwrap() = request.system_prompt.to_string();
                Ok(Decision::act(vec![ToolInvocation::new(
                    "f",
                    "finish",
                    json!({ "reason": "success" }),
                )]))
            }
        }

        let recorder = Arc::new(PromptRecorder(std::sync::Mutex::new(String::new())));
        let agent = AgentLoop::new(recorder.clone(), registry(), settings(5))
            .with_system_prompt("Only click green buttons.");
        agent.run(&page(), "task").await.unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), "Only click green buttons.");
    }

    #[tokio::test]
    async fn events_trace_the_session() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let maker = Arc::new(ScriptedDecisionMaker::new(vec![finish("Task Success")]));
        let agent = AgentLoop::new(maker, registry(), settings(5)).with_event_bus(bus);

        agent.run(&page(), "task").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::SessionStarted { .. } => "started",
                DomainEvent::TurnObserved { .. } => "observed",
                DomainEvent::DecisionReceived { .. } => "decided",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::SessionFinished { .. } => "finished",
            });
        }
        assert_eq!(kinds, vec!["started", "observed", "decided", "tool", "finished"]);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 7;
        config.agent.on_no_tool_calls = OnNoToolCalls::Finish;
        config.agent.manifest_limit = 40;
        let settings = LoopSettings::from_config(&config);
        assert_eq!(settings.max_turns, 7);
        assert_eq!(settings.on_no_tool_calls, OnNoToolCalls::Finish);
        assert_eq!(settings.perceiver.limit(), 40);
    }
}
