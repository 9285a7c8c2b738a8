use serde::{Deserialize, Serialize};

use crate::domain::consultation::{CaseLabel, TimelineData};
use crate::domain::intake::IntakeData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Intake,
    Triage,
    Timeline,
    Content,
    Escalation,
    Complete,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Triage => "triage",
            Self::Timeline => "timeline",
            Self::Content => "content",
            Self::Escalation => "escalation",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current position in the consultation. Each variant carries only the data
/// that is known once the conversation has reached it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "currentStep", rename_all = "lowercase")]
pub enum ConsultationStep {
    Intake,
    Triage {
        intake: IntakeData,
    },
    Timeline {
        intake: IntakeData,
        #[serde(rename = "caseLabel")]
        label: CaseLabel,
    },
    Content {
        intake: IntakeData,
        #[serde(rename = "caseLabel")]
        label: CaseLabel,
        timeline: TimelineData,
    },
    Escalation {
        intake: IntakeData,
        #[serde(rename = "caseLabel")]
        label: CaseLabel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeline: Option<TimelineData>,
    },
    Complete {
        intake: IntakeData,
        #[serde(rename = "caseLabel")]
        label: CaseLabel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeline: Option<TimelineData>,
    },
}

impl ConsultationStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Intake => StepKind::Intake,
            Self::Triage { .. } => StepKind::Triage,
            Self::Timeline { .. } => StepKind::Timeline,
            Self::Content { .. } => StepKind::Content,
            Self::Escalation { .. } => StepKind::Escalation,
            Self::Complete { .. } => StepKind::Complete,
        }
    }

    pub fn intake(&self) -> Option<&IntakeData> {
        match self {
            Self::Intake => None,
            Self::Triage { intake }
            | Self::Timeline { intake, .. }
            | Self::Content { intake, .. }
            | Self::Escalation { intake, .. }
            | Self::Complete { intake, .. } => Some(intake),
        }
    }

    pub fn case_label(&self) -> Option<CaseLabel> {
        match self {
            Self::Intake | Self::Triage { .. } => None,
            Self::Timeline { label, .. }
            | Self::Content { label, .. }
            | Self::Escalation { label, .. }
            | Self::Complete { label, .. } => Some(*label),
        }
    }

    pub fn timeline(&self) -> Option<&TimelineData> {
        match self {
            Self::Content { timeline, .. } => Some(timeline),
            Self::Escalation { timeline, .. } | Self::Complete { timeline, .. } => {
                timeline.as_ref()
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    IntakeAccepted { intake: IntakeData },
    TriageCompleted { label: CaseLabel, escalate: bool },
    TimelineAnalyzed { timeline: TimelineData, escalate: bool },
    ResponseDelivered,
    FollowUpTriaged { label: CaseLabel, escalate: bool },
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IntakeAccepted { .. } => "intake_accepted",
            Self::TriageCompleted { .. } => "triage_completed",
            Self::TimelineAnalyzed { .. } => "timeline_analyzed",
            Self::ResponseDelivered => "response_delivered",
            Self::FollowUpTriaged { .. } => "follow_up_triaged",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RunTriage,
    AskTimelineQuestion,
    ComposeMildGuidance,
    ComposeEscalation,
    SuggestFollowUps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: StepKind,
    pub to: ConsultationStep,
    pub event: String,
    pub actions: Vec<FlowAction>,
}
