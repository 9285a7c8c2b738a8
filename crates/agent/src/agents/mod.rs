//! Per-step agents. Each one formats a prompt, asks the structured generator
//! for a schema-constrained reply and hands the typed result back. Agents that
//! have a safe fallback absorb model failures; the rest return `AgentError`.

pub mod content;
pub mod empathy;
pub mod escalation;
pub mod follow_up;
pub mod language;
pub mod search;
pub mod timeline;
pub mod triage;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm::StructuredCallError;

pub use content::{ContentAgent, MildGuidance};
pub use empathy::{EmpathyAgent, EmpathyOutcome};
pub use escalation::EscalationAgent;
pub use follow_up::{FollowUpContext, FollowUpReplyAgent};
pub use language::{LanguageCheckAgent, LanguageReview};
pub use search::SearchAgent;
pub use timeline::{TimelineAgent, TimelineAssessment, TIMELINE_QUESTION};
pub use triage::{TriageAgent, TriageOutcome};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] StructuredCallError),
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("model reply rejected: {0}")]
    Reply(String),
}

impl From<tera::Error> for AgentError {
    fn from(error: tera::Error) -> Self {
        Self::Template(error.to_string())
    }
}

/// Strict-mode object schema: every property required, nothing extra.
pub(crate) fn object_schema(properties: &[(&str, Value)]) -> Value {
    let mut map = Map::new();
    for (name, schema) in properties {
        map.insert((*name).to_string(), schema.clone());
    }
    let required: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    json!({
        "type": "object",
        "properties": Value::Object(map),
        "required": required,
        "additionalProperties": false,
    })
}

pub(crate) fn string_field(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub(crate) fn boolean_field(description: &str) -> Value {
    json!({ "type": "boolean", "description": description })
}

pub(crate) fn case_label_field(description: &str) -> Value {
    json!({
        "type": "string",
        "enum": ["Mild", "Potential Emergency", "Emergency"],
        "description": description,
    })
}
