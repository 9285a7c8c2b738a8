use medchat_core::domain::consultation::{CaseLabel, Message, SessionId, TimelineData};
use medchat_core::domain::intake::IntakeData;

const PREVIEW_CHARS: usize = 50;

/// Structured log of what happened in a consultation. Each call is one
/// `tracing` event; nothing is retained in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsultationJournal;

impl ConsultationJournal {
    pub fn intake_received(&self, session_id: &SessionId, intake: &IntakeData) {
        tracing::info!(
            event_name = "consultation.intake_received",
            session_id = %session_id,
            age = intake.age,
            has_location = intake.location().is_some(),
            "intake data received"
        );
    }

    pub fn timeline_recorded(&self, session_id: &SessionId, timeline: &TimelineData) {
        tracing::info!(
            event_name = "consultation.timeline_recorded",
            session_id = %session_id,
            progression = timeline.progression.as_str(),
            "timeline data recorded"
        );
    }

    pub fn case_labeled(&self, session_id: &SessionId, label: CaseLabel) {
        tracing::info!(
            event_name = "consultation.case_labeled",
            session_id = %session_id,
            case_label = label.as_str(),
            "case labeled"
        );
    }

    pub fn decision(&self, session_id: &SessionId, agent: &str, decision: &str) {
        tracing::info!(
            event_name = "consultation.agent_decision",
            session_id = %session_id,
            agent,
            decision,
            "agent decision"
        );
    }

    pub fn message(&self, session_id: &SessionId, message: &Message) {
        tracing::debug!(
            event_name = "consultation.message",
            session_id = %session_id,
            role = message.role.as_str(),
            message_id = %message.id,
            preview = %preview(&message.content),
            "message appended"
        );
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn preview_truncates_long_messages_on_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(60);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 53);
    }
}
