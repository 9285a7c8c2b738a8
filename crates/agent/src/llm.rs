use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medchat_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// One schema-constrained generation: prompts plus the named JSON schema the
/// reply must satisfy.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredRequest {
    pub schema_name: &'static str,
    pub schema: Value,
    pub system: Option<String>,
    pub prompt: String,
}

impl StructuredRequest {
    pub fn new(schema_name: &'static str, schema: Value, prompt: impl Into<String>) -> Self {
        Self { schema_name, schema, system: None, prompt: prompt.into() }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StructuredCallError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("model call timed out")]
    Timeout,
    #[error("model endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reply did not match schema `{schema}`: {message}")]
    Schema { schema: String, message: String },
    #[error("model returned no content")]
    Empty,
}

impl StructuredCallError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Schema { .. } | Self::Empty => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &StructuredRequest) -> Result<Value, StructuredCallError>;

    fn describe(&self) -> String {
        "llm".to_string()
    }
}

/// Decodes a generated value into the caller's type.
pub async fn structured_generate<T>(
    client: &dyn LlmClient,
    request: &StructuredRequest,
) -> Result<T, StructuredCallError>
where
    T: DeserializeOwned,
{
    let value = client.generate(request).await?;
    serde_json::from_value(value).map_err(|error| StructuredCallError::Schema {
        schema: request.schema_name.to_string(),
        message: error.to_string(),
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaStats {
    pub successes: u64,
    pub failures: u64,
}

/// Per-schema outcome counters. Failures here are the calls that ended in an
/// agent fallback or an orchestrator apology.
#[derive(Clone, Default)]
pub struct CallStats {
    counters: Arc<Mutex<BTreeMap<String, SchemaStats>>>,
}

impl CallStats {
    fn record(&self, schema: &str, success: bool) {
        let mut counters = match self.counters.lock() {
            Ok(counters) => counters,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = counters.entry(schema.to_string()).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, SchemaStats> {
        match self.counters.lock() {
            Ok(counters) => counters.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, schema: &str) -> SchemaStats {
        self.snapshot().get(schema).copied().unwrap_or_default()
    }
}

/// Shared handle the agents call through: the client plus outcome counters.
#[derive(Clone)]
pub struct StructuredGenerator {
    client: Arc<dyn LlmClient>,
    stats: CallStats,
}

impl StructuredGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, stats: CallStats::default() }
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn client(&self) -> &dyn LlmClient {
        self.client.as_ref()
    }

    pub async fn generate<T>(&self, request: StructuredRequest) -> Result<T, StructuredCallError>
    where
        T: DeserializeOwned,
    {
        let result = structured_generate::<T>(self.client.as_ref(), &request).await;
        self.stats.record(request.schema_name, result.is_ok());
        if let Err(error) = &result {
            tracing::warn!(
                event_name = "llm.structured_call_failed",
                schema = request.schema_name,
                error = %error,
                "structured generation failed"
            );
        }
        result
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 4_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// OpenAI-compatible chat-completions client using strict `json_schema`
/// response formatting. Works against OpenAI and Ollama's `/v1` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, StructuredCallError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| StructuredCallError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                config.effective_base_url().trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request_body(&self, request: &StructuredRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            }
        })
    }

    async fn attempt(&self, body: &Value) -> Result<Value, StructuredCallError> {
        let mut builder = self.http.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StructuredCallError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        let payload: Value = response.json().await.map_err(from_reqwest)?;
        parse_completion(&payload)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: &StructuredRequest) -> Result<Value, StructuredCallError> {
        let body = self.request_body(request);
        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        event_name = "llm.retry_scheduled",
                        schema = request.schema_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.model, self.endpoint)
    }
}

fn from_reqwest(error: reqwest::Error) -> StructuredCallError {
    if error.is_timeout() {
        StructuredCallError::Timeout
    } else if error.is_decode() {
        StructuredCallError::Schema { schema: "chat.completion".to_string(), message: error.to_string() }
    } else {
        StructuredCallError::Transport(error.to_string())
    }
}

/// Pulls the JSON document out of `choices[0].message.content`.
pub fn parse_completion(payload: &Value) -> Result<Value, StructuredCallError> {
    let message = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or(StructuredCallError::Empty)?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(StructuredCallError::Schema {
            schema: "chat.completion".to_string(),
            message: format!("model refused: {refusal}"),
        });
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .ok_or(StructuredCallError::Empty)?;

    serde_json::from_str(content).map_err(|error| StructuredCallError::Schema {
        schema: "chat.completion".to_string(),
        message: error.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Deterministic client for tests: replies are queued per schema name and
/// every request is recorded.
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    replies: Arc<Mutex<HashMap<String, VecDeque<Result<Value, StructuredCallError>>>>>,
    requests: Arc<Mutex<Vec<StructuredRequest>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, schema_name: &str, value: Value) -> &Self {
        self.push(schema_name, Ok(value))
    }

    pub fn fail(&self, schema_name: &str, error: StructuredCallError) -> &Self {
        self.push(schema_name, Err(error))
    }

    fn push(&self, schema_name: &str, result: Result<Value, StructuredCallError>) -> &Self {
        let mut replies = match self.replies.lock() {
            Ok(replies) => replies,
            Err(poisoned) => poisoned.into_inner(),
        };
        replies.entry(schema_name.to_string()).or_default().push_back(result);
        self
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn requests_for(&self, schema_name: &str) -> Vec<StructuredRequest> {
        self.requests().into_iter().filter(|request| request.schema_name == schema_name).collect()
    }

    pub fn pending(&self) -> usize {
        match self.replies.lock() {
            Ok(replies) => replies.values().map(VecDeque::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(VecDeque::len).sum(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, request: &StructuredRequest) -> Result<Value, StructuredCallError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        let next = match self.replies.lock() {
            Ok(mut replies) => {
                replies.get_mut(request.schema_name).and_then(VecDeque::pop_front)
            }
            Err(poisoned) => {
                poisoned.into_inner().get_mut(request.schema_name).and_then(VecDeque::pop_front)
            }
        };
        next.unwrap_or_else(|| {
            Err(StructuredCallError::Transport(format!(
                "no scripted reply for `{}`",
                request.schema_name
            )))
        })
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
