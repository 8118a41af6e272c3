//! The uipilot control loop.
//!
//! [`AgentLoop`] runs one session against one environment: observe the
//! screen, ask the decision-maker for tool invocations, execute them in
//! order, and repeat until the finish tool is called, the success check
//! passes or the call budget runs out.
//!
//! [`BatchRunner`] fans a list of [`TestCase`]s out over isolated
//! environments with bounded concurrency.

pub mod batch;
pub mod finish;
pub mod loop_runner;
pub mod prompt;
pub mod setup;

pub use batch::{
    BatchError, BatchRunner, BatchSummary, CaseReport, CaseVerdict, EnvironmentLauncher, TestCase,
    load_cases, load_configured_cases, parse_cases,
};
pub use finish::classify_finish_reason;
pub use loop_runner::{AgentLoop, LoopSettings};
pub use prompt::default_system_prompt;
pub use setup::agent_from_config;
