use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::consultation::CaseLabel;
use crate::domain::intake::IntakeValidationError;
use crate::flows::states::{
    ConsultationStep, FlowAction, FlowEvent, StepKind, TransitionOutcome,
};

/// Pure transition function for the consultation flow. Holds no state; the
/// caller owns the current step and stores the returned one.
#[derive(Clone, Debug, Default)]
pub struct FlowEngine;

impl FlowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_step(&self) -> ConsultationStep {
        ConsultationStep::Intake
    }

    pub fn apply(
        &self,
        current: &ConsultationStep,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConsultationStep,
        event: &FlowEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                let mut audit_event = AuditEvent::new(
                    audit.session_id.clone(),
                    audit.correlation_id.clone(),
                    "flow.transition_applied",
                    AuditCategory::Flow,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.kind().as_str())
                .with_metadata("event", outcome.event.clone());
                if let Some(label) = outcome.to.case_label() {
                    audit_event = audit_event.with_metadata("case_label", label.as_str());
                }
                sink.emit(audit_event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("from", current.kind().as_str())
                    .with_metadata("event", event.name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error(transparent)]
    InvalidIntake(#[from] IntakeValidationError),
    #[error("invalid transition from {state} using event {event}")]
    InvalidTransition { state: StepKind, event: &'static str },
}

fn transition(
    current: &ConsultationStep,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConsultationStep::{Complete, Content, Escalation, Intake, Timeline, Triage};
    use FlowAction::{
        AskTimelineQuestion, ComposeEscalation, ComposeMildGuidance, RunTriage, SuggestFollowUps,
    };

    let (to, actions) = match (current, event) {
        (Intake, FlowEvent::IntakeAccepted { intake }) => {
            intake.validate()?;
            (Triage { intake: intake.clone() }, vec![RunTriage])
        }
        (Triage { intake }, FlowEvent::TriageCompleted { label, escalate }) => {
            if *escalate {
                (
                    Escalation {
                        intake: intake.clone(),
                        label: label.escalate(CaseLabel::Emergency),
                        timeline: None,
                    },
                    vec![ComposeEscalation],
                )
            } else {
                (Timeline { intake: intake.clone(), label: *label }, vec![AskTimelineQuestion])
            }
        }
        (Timeline { intake, label }, FlowEvent::TimelineAnalyzed { timeline, escalate }) => {
            if *escalate {
                (
                    Escalation {
                        intake: intake.clone(),
                        label: label.escalate(CaseLabel::PotentialEmergency),
                        timeline: Some(timeline.clone()),
                    },
                    vec![ComposeEscalation],
                )
            } else {
                (
                    Content { intake: intake.clone(), label: *label, timeline: timeline.clone() },
                    vec![ComposeMildGuidance],
                )
            }
        }
        (Content { intake, label, timeline }, FlowEvent::ResponseDelivered) => (
            Complete { intake: intake.clone(), label: *label, timeline: Some(timeline.clone()) },
            vec![SuggestFollowUps],
        ),
        (Escalation { intake, label, timeline }, FlowEvent::ResponseDelivered) => (
            Complete { intake: intake.clone(), label: *label, timeline: timeline.clone() },
            vec![SuggestFollowUps],
        ),
        (
            Complete { intake, label, timeline },
            FlowEvent::FollowUpTriaged { label: observed, escalate },
        ) => {
            if *escalate {
                (
                    Complete {
                        intake: intake.clone(),
                        label: label.escalate(*observed).escalate(CaseLabel::PotentialEmergency),
                        timeline: timeline.clone(),
                    },
                    vec![ComposeEscalation, SuggestFollowUps],
                )
            } else {
                (
                    Complete {
                        intake: intake.clone(),
                        label: label.escalate(*observed),
                        timeline: timeline.clone(),
                    },
                    Vec::new(),
                )
            }
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.kind(),
                event: event.name(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.kind(), to, event: event.name().to_owned(), actions })
}
