//! In-memory doubles for the collaborator traits.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to every other crate's tests. Nothing here touches a real browser,
//! sandbox or network.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::accessibility::{AccessibilityNode, AccessibilityTree};
use crate::decision::{Decision, DecisionMaker, DecisionRequest};
use crate::environment::{CommandOutput, Environment, EnvironmentKind, MouseButton, Viewport};
use crate::error::{DecisionError, EnvironmentError, VisionError};
use crate::vision::{NormalizedPoint, PointingService};

/// Bytes returned by [`MockEnvironment::screenshot`]: a PNG signature plus
/// a short marker, enough for encoders and size checks.
pub const MOCK_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmock-screenshot";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe_target(role: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("role='{role}' name='{name}'"),
        None => format!("role='{role}'"),
    }
}

fn contains_target(node: &dyn AccessibilityNode, role: &str, name: Option<&str>) -> bool {
    if node.is_hidden() {
        return false;
    }
    let role_matches = node.role().is_some_and(|r| r.eq_ignore_ascii_case(role));
    let name_matches = match name {
        None => true,
        Some(wanted) => node
            .name()
            .is_some_and(|n| n.to_lowercase().contains(&wanted.to_lowercase())),
    };
    (role_matches && name_matches)
        || node
            .children()
            .into_iter()
            .any(|child| contains_target(child, role, name))
}

/// A scripted environment that records every actuation.
///
/// Semantic primitives resolve against the configured accessibility tree;
/// clicking a target listed with [`MockEnvironment::with_navigation`] moves
/// the location, mimicking a link or submit button.
pub struct MockEnvironment {
    kind: EnvironmentKind,
    viewport: Viewport,
    location: Mutex<String>,
    history: Mutex<Vec<String>>,
    tree: Option<AccessibilityTree>,
    tree_error: Option<EnvironmentError>,
    screenshot_error: Option<EnvironmentError>,
    navigations: Vec<(String, Option<String>, String)>,
    failing: Vec<String>,
    latency: Option<Duration>,
    command_output: CommandOutput,
    actions: Mutex<Vec<String>>,
}

impl MockEnvironment {
    fn with_kind(kind: EnvironmentKind, location: &str) -> Self {
        Self {
            kind,
            viewport: Viewport::default(),
            location: Mutex::new(location.to_string()),
            history: Mutex::new(Vec::new()),
            tree: None,
            tree_error: None,
            screenshot_error: None,
            navigations: Vec::new(),
            failing: Vec::new(),
            latency: None,
            command_output: CommandOutput::default(),
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn browser(url: &str) -> Self {
        Self::with_kind(EnvironmentKind::Browser, url)
    }

    pub fn desktop(sandbox_id: &str) -> Self {
        Self::with_kind(EnvironmentKind::Desktop, sandbox_id)
    }

    pub fn with_tree(mut self, tree: AccessibilityTree) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Make `accessibility_tree()` fail.
    pub fn with_tree_error(mut self, error: EnvironmentError) -> Self {
        self.tree_error = Some(error);
        self
    }

    pub fn with_screenshot_error(mut self, error: EnvironmentError) -> Self {
        self.screenshot_error = Some(error);
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Clicking `role`/`name` navigates to `to`.
    pub fn with_navigation(mut self, role: &str, name: Option<&str>, to: &str) -> Self {
        self.navigations
            .push((role.to_string(), name.map(str::to_string), to.to_string()));
        self
    }

    /// Every actuation sleeps this long before taking effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the named primitive (e.g. `"mouse_click"`) fail with a driver error.
    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.push(operation.to_string());
        self
    }

    pub fn with_command_output(mut self, output: CommandOutput) -> Self {
        self.command_output = output;
        self
    }

    /// Actuations performed so far, oldest first.
    pub fn actions(&self) -> Vec<String> {
        lock(&self.actions).clone()
    }

    pub fn set_location(&self, location: &str) {
        *lock(&self.location) = location.to_string();
    }

    async fn actuate(&self, operation: &str, record: String) -> Result<(), EnvironmentError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.iter().any(|f| f == operation) {
            return Err(EnvironmentError::Driver(format!("{operation} failed")));
        }
        lock(&self.actions).push(record);
        Ok(())
    }

    fn desktop_only(&self, operation: &str) -> Result<(), EnvironmentError> {
        match self.kind {
            EnvironmentKind::Desktop => Ok(()),
            EnvironmentKind::Browser => Err(EnvironmentError::Unsupported(operation.to_string())),
        }
    }

    fn resolve(&self, role: &str, name: Option<&str>) -> Result<(), EnvironmentError> {
        let found = self.tree.as_ref().is_some_and(|tree| {
            tree.roots()
                .into_iter()
                .any(|root| contains_target(root, role, name))
        });
        if found {
            Ok(())
        } else {
            Err(EnvironmentError::TargetNotFound(describe_target(role, name)))
        }
    }

    fn navigate_to(&self, to: &str) {
        let mut location = lock(&self.location);
        lock(&self.history).push(location.clone());
        *location = to.to_string();
    }
}

#[async_trait]
impl Environment for MockEnvironment {
    fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    fn location(&self) -> String {
        lock(&self.location).clone()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn screenshot(&self) -> Result<Vec<u8>, EnvironmentError> {
        match &self.screenshot_error {
            Some(e) => Err(e.clone()),
            None => Ok(MOCK_PNG.to_vec()),
        }
    }

    async fn accessibility_tree(&self) -> Result<Option<AccessibilityTree>, EnvironmentError> {
        match &self.tree_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.tree.clone()),
        }
    }

    async fn click_role(&self, role: &str, name: Option<&str>) -> Result<(), EnvironmentError> {
        self.resolve(role, name)?;
        self.actuate("click_role", format!("click {}", describe_target(role, name)))
            .await?;
        let target = self.navigations.iter().find(|(r, n, _)| {
            r == role && (n.is_none() || n.as_deref() == name)
        });
        if let Some((_, _, to)) = target {
            self.navigate_to(to);
        }
        Ok(())
    }

    async fn check_role(&self, role: &str, name: Option<&str>) -> Result<(), EnvironmentError> {
        self.resolve(role, name)?;
        self.actuate("check_role", format!("check {}", describe_target(role, name)))
            .await
    }

    async fn fill_role(
        &self,
        role: &str,
        name: Option<&str>,
        value: &str,
    ) -> Result<(), EnvironmentError> {
        self.resolve(role, name)?;
        self.actuate(
            "fill_role",
            format!("fill {} with '{value}'", describe_target(role, name)),
        )
        .await
    }

    async fn select_option(
        &self,
        role: &str,
        name: Option<&str>,
        option: &str,
    ) -> Result<(), EnvironmentError> {
        self.resolve(role, name)?;
        self.actuate(
            "select_option",
            format!("select '{option}' in {}", describe_target(role, name)),
        )
        .await
    }

    async fn mouse_click(&self, x: f64, y: f64, button: MouseButton) -> Result<(), EnvironmentError> {
        self.actuate("mouse_click", format!("mouse_click {x} {y} {button}"))
            .await
    }

    async fn double_click(&self, x: f64, y: f64) -> Result<(), EnvironmentError> {
        self.actuate("double_click", format!("double_click {x} {y}")).await
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<(), EnvironmentError> {
        self.actuate("wheel", format!("wheel {delta_x} {delta_y}")).await
    }

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError> {
        self.actuate("type_text", format!("type '{text}'")).await
    }

    async fn press_key(&self, key: &str) -> Result<(), EnvironmentError> {
        self.actuate("press_key", format!("press {key}")).await
    }

    async fn navigate(&self, url: &str) -> Result<(), EnvironmentError> {
        self.actuate("navigate", format!("goto {url}")).await?;
        self.navigate_to(url);
        Ok(())
    }

    async fn go_back(&self) -> Result<(), EnvironmentError> {
        self.actuate("go_back", "back".into()).await?;
        let previous = lock(&self.history).pop();
        if let Some(previous) = previous {
            *lock(&self.location) = previous;
        }
        Ok(())
    }

    async fn hotkey(&self, modifier: &str, key: &str) -> Result<(), EnvironmentError> {
        self.desktop_only("hotkey")?;
        self.actuate("hotkey", format!("hotkey {modifier}+{key}")).await
    }

    async fn launch(&self, command: &str) -> Result<(), EnvironmentError> {
        self.desktop_only("launch")?;
        self.actuate("launch", format!("launch {command}")).await
    }

    async fn open(&self, target: &str) -> Result<(), EnvironmentError> {
        self.desktop_only("open")?;
        self.actuate("open", format!("open {target}")).await
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, EnvironmentError> {
        self.desktop_only("run_command")?;
        self.actuate("run_command", format!("run {command}")).await?;
        Ok(self.command_output.clone())
    }
}

/// A decision-maker that replays a fixed sequence of replies.
///
/// Once the sequence is exhausted it repeats the fallback decision if one
/// was given, otherwise it reports a malformed response.
pub struct ScriptedDecisionMaker {
    replies: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    fallback: Option<Decision>,
    calls: Mutex<usize>,
    transcript_lengths: Mutex<Vec<usize>>,
}

impl ScriptedDecisionMaker {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            replies: Mutex::new(decisions.into_iter().map(Ok).collect()),
            fallback: None,
            calls: Mutex::new(0),
            transcript_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Returns the same decision forever.
    pub fn always(decision: Decision) -> Self {
        Self::new(Vec::new()).then_always(decision)
    }

    /// Fails on the first call.
    pub fn failing(error: DecisionError) -> Self {
        let maker = Self::new(Vec::new());
        lock(&maker.replies).push_back(Err(error));
        maker
    }

    /// Repeat `decision` after the scripted replies run out.
    pub fn then_always(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }

    /// Transcript length seen on each call.
    pub fn transcript_lengths(&self) -> Vec<usize> {
        lock(&self.transcript_lengths).clone()
    }
}

#[async_trait]
impl DecisionMaker for ScriptedDecisionMaker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        *lock(&self.calls) += 1;
        lock(&self.transcript_lengths).push(request.transcript.len());
        let next = lock(&self.replies).pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(DecisionError::MalformedResponse(
                "scripted decision maker has no more replies".into(),
            )),
        }
    }
}

/// A pointing service with a canned answer.
pub struct FixedPointer {
    answer: Result<Vec<NormalizedPoint>, VisionError>,
    latency: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl FixedPointer {
    pub fn points(points: Vec<NormalizedPoint>) -> Self {
        Self {
            answer: Ok(points),
            latency: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn nothing() -> Self {
        Self::points(Vec::new())
    }

    pub fn failing(error: VisionError) -> Self {
        Self {
            answer: Err(error),
            latency: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl PointingService for FixedPointer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn point(&self, _image: &[u8], prompt: &str) -> Result<Vec<NormalizedPoint>, VisionError> {
        lock(&self.prompts).push(prompt.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.answer.clone()
    }
}
