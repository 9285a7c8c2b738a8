use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::intake::IntakeData;
use crate::flows::states::{ConsultationStep, StepKind};

pub const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("Session ID is required")]
    Empty,
    #[error("Session ID must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Session ID may only contain letters, digits, `-` and `_`")]
    InvalidCharacters,
}

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, SessionIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if trimmed.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong { max: MAX_SESSION_ID_LEN });
        }
        if !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
            return Err(SessionIdError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Urgency tier. Ordering follows urgency, so `max` is the escalation merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CaseLabel {
    #[serde(rename = "Mild")]
    Mild,
    #[serde(rename = "Potential Emergency")]
    PotentialEmergency,
    #[serde(rename = "Emergency")]
    Emergency,
}

impl CaseLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mild => "Mild",
            Self::PotentialEmergency => "Potential Emergency",
            Self::Emergency => "Emergency",
        }
    }

    pub fn is_urgent(&self) -> bool {
        !matches!(self, Self::Mild)
    }

    /// Labels only move up. A later, milder classification never replaces an
    /// earlier, more urgent one.
    pub fn escalate(self, candidate: CaseLabel) -> CaseLabel {
        self.max(candidate)
    }
}

impl std::fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progression {
    Better,
    Worse,
    Same,
}

impl Progression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Better => "better",
            Self::Worse => "worse",
            Self::Same => "same",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineData {
    pub progression: Progression,
    pub details: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_suggestions: Vec<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp,
            follow_up_suggestions: Vec::new(),
        }
    }

    pub fn with_follow_ups(mut self, suggestions: Vec<String>) -> Self {
        self.follow_up_suggestions = suggestions;
        self
    }

    /// `role: content`, the line format used for model context.
    pub fn history_line(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.content)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDecision {
    pub agent: String,
    pub decision: String,
    pub timestamp: DateTime<Utc>,
}

/// What one orchestrator turn hands back to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_suggestions: Vec<String>,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), follow_up_suggestions: Vec::new() }
    }

    pub fn with_follow_ups(content: impl Into<String>, follow_up_suggestions: Vec<String>) -> Self {
        Self { content: content.into(), follow_up_suggestions }
    }
}

/// Aggregate state of one consultation. Step-specific data (intake, timeline,
/// label) lives inside `step`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationState {
    #[serde(flatten)]
    pub step: ConsultationStep,
    pub decisions: Vec<AgentDecision>,
    pub transcript: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Default for ConsultationState {
    fn default() -> Self {
        Self {
            step: ConsultationStep::Intake,
            decisions: Vec::new(),
            transcript: Vec::new(),
            location: None,
        }
    }
}

impl ConsultationState {
    pub fn current_step(&self) -> StepKind {
        self.step.kind()
    }

    pub fn intake(&self) -> Option<&IntakeData> {
        self.step.intake()
    }

    pub fn timeline(&self) -> Option<&TimelineData> {
        self.step.timeline()
    }

    pub fn case_label(&self) -> Option<CaseLabel> {
        self.step.case_label()
    }

    pub fn push_decision(
        &mut self,
        agent: impl Into<String>,
        decision: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.decisions.push(AgentDecision {
            agent: agent.into(),
            decision: decision.into(),
            timestamp,
        });
    }
}
