use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use medchat_agent::ConsultationOrchestrator;
use medchat_core::config::{LlmConfig, LlmProvider};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub orchestrator: Arc<ConsultationOrchestrator>,
    pub llm: LlmConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm: HealthCheck,
    pub cache: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let llm = llm_check(&state.llm, &state.orchestrator);
    let ready = llm.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "medchat-server runtime initialized".to_string(),
        },
        llm,
        cache: HealthCheck {
            status: "ready",
            detail: format!("{} active conversation(s)", state.orchestrator.cache().len()),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

// Ollama serves without a key; hosted providers are not usable without one.
fn llm_check(config: &LlmConfig, orchestrator: &ConsultationOrchestrator) -> HealthCheck {
    let description =
        format!("provider {} model {}", config.provider.as_str(), orchestrator.llm_description());
    let needs_key = config.provider != LlmProvider::Ollama;
    if needs_key && !config.has_api_key() {
        return HealthCheck {
            status: "degraded",
            detail: format!("{description}: api key not configured"),
        };
    }

    let stats = orchestrator.call_stats().snapshot();
    let failures: u64 = stats.values().map(|entry| entry.failures).sum();
    HealthCheck { status: "ready", detail: format!("{description}: {failures} failed call(s)") }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use medchat_agent::{LlmClient, ScriptedLlmClient};
    use medchat_core::config::{AppConfig, LlmProvider};
    use secrecy::SecretString;

    use crate::bootstrap::assemble;
    use crate::health::{health, HealthState};

    fn state(config: &AppConfig) -> HealthState {
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new());
        let orchestrator = assemble(config, client).expect("orchestrator");
        HealthState { orchestrator, llm: config.llm.clone() }
    }

    #[tokio::test]
    async fn health_is_ready_when_llm_key_is_configured() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-test".to_string()));

        let (status, Json(payload)) = health(State(state(&config))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.llm.status, "ready");
        assert!(payload.llm.detail.contains("provider openai"));
        assert_eq!(payload.cache.detail, "0 active conversation(s)");
    }

    #[tokio::test]
    async fn health_is_degraded_without_hosted_provider_key() {
        let mut config = AppConfig::default();
        config.llm.api_key = None;

        let (status, Json(payload)) = health(State(state(&config))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.service.status, "ready");
        assert!(payload.llm.detail.contains("api key not configured"));
    }

    #[tokio::test]
    async fn local_provider_needs_no_key() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        config.llm.api_key = None;

        let (status, _) = health(State(state(&config))).await;

        assert_eq!(status, StatusCode::OK);
    }
}
