//! Concurrent batch runner.
//!
//! Each test case gets its own environment from an [`EnvironmentLauncher`]
//! and runs to completion under a shared [`AgentLoop`]. A counting
//! semaphore bounds how many environments are alive at once; an
//! environment is always torn down before its slot is released.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uipilot_config::RunnerConfig;
use uipilot_core::tool::panic_message;
use uipilot_core::{
    Environment, EnvironmentError, SessionAborted, SessionResult, Termination, Transcript, Verdict,
};

use crate::loop_runner::AgentLoop;

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the test case file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub starting_url: String,
    pub task_prompt: String,
}

impl TestCase {
    pub fn new(starting_url: impl Into<String>, task_prompt: impl Into<String>) -> Self {
        Self {
            starting_url: starting_url.into(),
            task_prompt: task_prompt.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Failed to read test cases at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid test case file: {0}")]
    Parse(String),

    #[error("Relative starting_url '{0}' needs a base_url")]
    MissingBaseUrl(String),

    #[error("No test case file configured (runner.cases_path)")]
    NoCaseFile,
}

/// Join a relative `starting_url` onto `base_url`. Absolute `http(s)` URLs
/// pass through untouched.
pub fn resolve_url(starting_url: &str, base_url: Option<&str>) -> Result<String, BatchError> {
    if starting_url.starts_with("http://") || starting_url.starts_with("https://") {
        return Ok(starting_url.to_string());
    }
    let base = base_url
        .map(|b| b.trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| BatchError::MissingBaseUrl(starting_url.to_string()))?;
    if starting_url.starts_with('/') {
        Ok(format!("{base}{starting_url}"))
    } else {
        Ok(format!("{base}/{starting_url}"))
    }
}

/// Parse a JSON array of test cases and resolve their URLs. Entries whose
/// URL or prompt is blank are skipped.
pub fn parse_cases(json: &str, base_url: Option<&str>) -> Result<Vec<TestCase>, BatchError> {
    let raw: Vec<TestCase> =
        serde_json::from_str(json).map_err(|e| BatchError::Parse(e.to_string()))?;
    let mut cases = Vec::with_capacity(raw.len());
    for (index, case) in raw.into_iter().enumerate() {
        let starting_url = case.starting_url.trim();
        let task_prompt = case.task_prompt.trim();
        if starting_url.is_empty() || task_prompt.is_empty() {
            warn!(index, "Skipping test case with blank starting_url or task_prompt");
            continue;
        }
        cases.push(TestCase::new(resolve_url(starting_url, base_url)?, task_prompt));
    }
    Ok(cases)
}

pub fn load_cases(path: &Path, base_url: Option<&str>) -> Result<Vec<TestCase>, BatchError> {
    let content = std::fs::read_to_string(path).map_err(|e| BatchError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_cases(&content, base_url)
}

/// Load the case file named by `runner.cases_path`, resolved against
/// `runner.base_url`.
pub fn load_configured_cases(config: &RunnerConfig) -> Result<Vec<TestCase>, BatchError> {
    let path = config.cases_path.as_deref().ok_or(BatchError::NoCaseFile)?;
    load_cases(path, config.base_url.as_deref())
}

/// Creates and disposes of isolated environments, one per case.
#[async_trait]
pub trait EnvironmentLauncher: Send + Sync {
    /// A fresh environment already showing `starting_url`.
    async fn launch(&self, starting_url: &str) -> Result<Box<dyn Environment>, EnvironmentError>;

    /// Dispose of an environment. Must not fail; problems are logged.
    async fn teardown(&self, env: Box<dyn Environment>);
}

/// Outcome of one case as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseVerdict {
    Success,
    Failure,
    Unresolved,
    /// The session could not start or was aborted by an error.
    Exception,
}

impl From<Verdict> for CaseVerdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Success => CaseVerdict::Success,
            Verdict::Failure => CaseVerdict::Failure,
            Verdict::Unresolved => CaseVerdict::Unresolved,
        }
    }
}

impl std::fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseVerdict::Success => write!(f, "success"),
            CaseVerdict::Failure => write!(f, "failure"),
            CaseVerdict::Unresolved => write!(f, "unresolved"),
            CaseVerdict::Exception => write!(f, "exception"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub starting_url: String,
    pub task_prompt: String,
    pub verdict: CaseVerdict,
    pub turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 PNG taken when the session ended with an exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_screenshot: Option<String>,
    pub duration_ms: u64,
    /// Everything the session recorded, partial when it was aborted. Absent
    /// only when no session ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
}

impl CaseReport {
    fn exception(case: &TestCase, error: String, started: Instant) -> Self {
        Self {
            starting_url: case.starting_url.clone(),
            task_prompt: case.task_prompt.clone(),
            verdict: CaseVerdict::Exception,
            turns: 0,
            termination: None,
            error: Some(error),
            failure_screenshot: None,
            duration_ms: started.elapsed().as_millis() as u64,
            transcript: None,
        }
    }

    fn finished(case: &TestCase, result: SessionResult, started: Instant) -> Self {
        Self {
            starting_url: case.starting_url.clone(),
            task_prompt: case.task_prompt.clone(),
            verdict: result.verdict().into(),
            turns: result.turns,
            termination: Some(result.termination),
            error: None,
            failure_screenshot: None,
            duration_ms: started.elapsed().as_millis() as u64,
            transcript: Some(result.transcript),
        }
    }

    fn aborted(case: &TestCase, aborted: SessionAborted, started: Instant) -> Self {
        let partial = *aborted.partial;
        Self {
            verdict: CaseVerdict::Exception,
            error: Some(aborted.error.to_string()),
            ..Self::finished(case, partial, started)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Everything that did not succeed, exceptions and unresolved included.
    pub failed: usize,
    /// In input order.
    pub cases: Vec<CaseReport>,
}

impl BatchSummary {
    fn from_reports(cases: Vec<CaseReport>) -> Self {
        let succeeded = cases
            .iter()
            .filter(|c| c.verdict == CaseVerdict::Success)
            .count();
        Self {
            total: cases.len(),
            succeeded,
            failed: cases.len() - succeeded,
            cases,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs many cases with at most `concurrency` sessions alive at once.
pub struct BatchRunner {
    agent: Arc<AgentLoop>,
    launcher: Arc<dyn EnvironmentLauncher>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        agent: Arc<AgentLoop>,
        launcher: Arc<dyn EnvironmentLauncher>,
        concurrency: usize,
    ) -> Self {
        Self {
            agent,
            launcher,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(
        agent: Arc<AgentLoop>,
        launcher: Arc<dyn EnvironmentLauncher>,
        config: &RunnerConfig,
    ) -> Self {
        Self::new(agent, launcher, config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run(&self, cases: Vec<TestCase>) -> BatchSummary {
        info!(cases = cases.len(), concurrency = self.concurrency, "Batch started");
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, case) in cases.iter().cloned().enumerate() {
            let gate = gate.clone();
            let agent = self.agent.clone();
            let launcher = self.launcher.clone();
            set.spawn(async move {
                let started = Instant::now();
                let report = match gate.acquire_owned().await {
                    Ok(_permit) => run_case(&agent, launcher.as_ref(), &case).await,
                    Err(e) => CaseReport::exception(&case, e.to_string(), started),
                };
                (index, report)
            });
        }

        let mut reports: Vec<Option<CaseReport>> = vec![None; cases.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = Some(report),
                Err(e) => warn!(error = %e, "Case task aborted"),
            }
        }

        let reports = reports
            .into_iter()
            .zip(&cases)
            .map(|(report, case)| {
                report.unwrap_or_else(|| {
                    CaseReport::exception(case, "case task aborted".into(), Instant::now())
                })
            })
            .collect();
        let summary = BatchSummary::from_reports(reports);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch finished"
        );
        summary
    }
}

async fn run_case(agent: &AgentLoop, launcher: &dyn EnvironmentLauncher, case: &TestCase) -> CaseReport {
    let started = Instant::now();
    let env = match launcher.launch(&case.starting_url).await {
        Ok(env) => env,
        Err(e) => {
            warn!(url = %case.starting_url, error = %e, "Environment launch failed");
            return CaseReport::exception(case, format!("launch failed: {e}"), started);
        }
    };

    // A panicking collaborator must not skip the teardown below.
    let run = AssertUnwindSafe(agent.run(env.as_ref(), &case.task_prompt)).catch_unwind();
    let mut report = match run.await {
        Ok(Ok(result)) => {
            info!(
                url = %case.starting_url,
                verdict = %result.verdict(),
                turns = result.turns,
                "Case finished"
            );
            CaseReport::finished(case, result, started)
        }
        Ok(Err(aborted)) => {
            warn!(url = %case.starting_url, error = %aborted, "Case aborted");
            CaseReport::aborted(case, aborted, started)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(url = %case.starting_url, panic = %message, "Case panicked");
            CaseReport::exception(case, format!("session panicked: {message}"), started)
        }
    };
    if report.verdict == CaseVerdict::Exception {
        report.failure_screenshot = failure_screenshot(env.as_ref()).await;
    }

    launcher.teardown(env).await;
    report
}

async fn failure_screenshot(env: &dyn Environment) -> Option<String> {
    match tokio::time::timeout(SCREENSHOT_TIMEOUT, env.screenshot()).await {
        Ok(Ok(png)) => Some(STANDARD.encode(png)),
        Ok(Err(e)) => {
            warn!(error = %e, "Failure screenshot unavailable");
            None
        }
        Err(_) => {
            warn!("Failure screenshot timed out");
            None
        }
    }
}
