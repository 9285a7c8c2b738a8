use std::sync::Arc;

use medchat_agent::agents::AgentError;
use medchat_agent::{
    ConsultationOrchestrator, LlmClient, OpenAiClient, StructuredCallError, StructuredGenerator,
};
use medchat_core::audit::TracingAuditSink;
use medchat_core::cache::ConversationCache;
use medchat_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<ConsultationOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client construction failed: {0}")]
    Llm(#[source] StructuredCallError),
    #[error("agent initialization failed: {0}")]
    Agent(#[source] AgentError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let client = OpenAiClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    info!(
        event_name = "system.bootstrap.llm_configured",
        correlation_id = "bootstrap",
        llm = %client.describe(),
        "llm client configured"
    );

    let client: Arc<dyn LlmClient> = Arc::new(client);
    let orchestrator = assemble(&config, client)?;
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        cache_ttl_secs = config.cache.ttl_secs,
        "consultation orchestrator ready"
    );

    Ok(Application { config, orchestrator })
}

/// Wires the orchestrator around an arbitrary model client.
pub fn assemble(
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
) -> Result<Arc<ConsultationOrchestrator>, BootstrapError> {
    let orchestrator = ConsultationOrchestrator::new(
        StructuredGenerator::new(client),
        ConversationCache::with_system_clock(config.cache.ttl_secs),
        Arc::new(TracingAuditSink),
    )
    .map_err(BootstrapError::Agent)?;
    Ok(Arc::new(orchestrator))
}

#[cfg(test)]
mod tests {
    use medchat_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_overrides() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_model: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.model"));
    }

    #[tokio::test]
    async fn bootstrap_builds_orchestrator_from_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_model: Some("gpt-4o-mini".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                port: Some(9090),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.config.server.port, 9090);
        assert!(app.orchestrator.llm_description().contains("gpt-4o-mini"));
        assert_eq!(app.orchestrator.cache().len(), 0);
    }
}
