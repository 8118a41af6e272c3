//! Wiring an [`AgentLoop`] from an [`AppConfig`].

use std::sync::Arc;

use tracing::info;
use uipilot_config::AppConfig;
use uipilot_core::{EnvironmentKind, Error, PointingService, Result};
use uipilot_providers::{MoondreamPointer, OpenAiCompatDecisionMaker};
use uipilot_tools::{ToolCatalog, ToolSettings};

use crate::loop_runner::{AgentLoop, LoopSettings};

/// Build the production loop for `kind`: the OpenAI-compatible
/// decision-maker, the pointing client when a vision key is configured,
/// and the matching tool catalogue. `with_script` also offers `run_script`.
pub fn agent_from_config(
    config: &AppConfig,
    kind: EnvironmentKind,
    with_script: bool,
) -> Result<AgentLoop> {
    let decision_maker = OpenAiCompatDecisionMaker::from_config(&config.decision)?;

    let mut catalog = ToolCatalog::new(kind, ToolSettings::from_config(config));
    if let Some(pointer) = MoondreamPointer::from_config(&config.vision)? {
        let pointer: Arc<dyn PointingService> = Arc::new(pointer);
        catalog = catalog.with_pointer(pointer);
    }
    if with_script {
        catalog = catalog.with_script();
    }
    let tools = catalog.build();

    info!(
        model = decision_maker.model(),
        kind = %kind,
        tools = tools.len(),
        "Agent configured"
    );

    let mut agent = AgentLoop::new(
        Arc::new(decision_maker),
        Arc::new(tools),
        LoopSettings::from_config(config),
    );
    let prompt = config.system_prompt_override().map_err(|e| Error::Config {
        message: e.to_string(),
    })?;
    if let Some(prompt) = prompt {
        agent = agent.with_system_prompt(prompt);
    }
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uipilot_core::DecisionError;

    fn keyed() -> AppConfig {
        let mut config = AppConfig::default();
        config.decision.api_key = Some("sk-test".into());
        config
    }

    #[test]
    fn missing_api_key_is_an_authentication_error() {
        let err = agent_from_config(&AppConfig::default(), EnvironmentKind::Browser, false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Decision(DecisionError::Authentication(_))));
    }

    #[test]
    fn catalogue_follows_kind_and_script_flag() {
        let agent = agent_from_config(&keyed(), EnvironmentKind::Desktop, true).unwrap();
        let names = agent.tools().names();
        assert!(names.contains(&"run_command"));
        assert!(names.contains(&"run_script"));
        assert!(!names.contains(&"goto"));
    }

    #[test]
    fn unreadable_prompt_override_is_a_config_error() {
        let mut config = keyed();
        config.agent.system_prompt_path = Some("/nonexistent/prompt.txt".into());
        let err = agent_from_config(&config, EnvironmentKind::Browser, false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn prompt_override_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Custom prompt").unwrap();
        let mut config = keyed();
        config.agent.system_prompt_path = Some(file.path().to_path_buf());
        assert!(agent_from_config(&config, EnvironmentKind::Browser, false).is_ok());
    }
}
