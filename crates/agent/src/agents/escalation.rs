use std::sync::Arc;

use medchat_core::domain::consultation::CaseLabel;
use medchat_core::domain::intake::IntakeData;

use super::{AgentError, ContentAgent};

/// Builds the emergency message for an escalated case.
#[derive(Clone)]
pub struct EscalationAgent {
    content: Arc<ContentAgent>,
}

impl EscalationAgent {
    pub fn new(content: Arc<ContentAgent>) -> Self {
        Self { content }
    }

    pub async fn respond(
        &self,
        intake: &IntakeData,
        label: CaseLabel,
        empathy_lines: &[String],
    ) -> Result<String, AgentError> {
        tracing::warn!(
            event_name = "consultation.escalated",
            case_label = label.as_str(),
            "case escalated"
        );
        let assessment = self.content.emergency_assessment(intake, label).await?;
        self.content.render_emergency(&assessment, empathy_lines)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use medchat_core::domain::consultation::CaseLabel;
    use serde_json::json;

    use super::EscalationAgent;
    use crate::agents::content::EMERGENCY_SCHEMA_NAME;
    use crate::agents::fixtures::{intake, scripted};
    use crate::agents::ContentAgent;

    #[tokio::test]
    async fn escalation_message_wraps_the_assessment() {
        let (client, generator) = scripted();
        client.reply(
            EMERGENCY_SCHEMA_NAME,
            json!({"assessment": "sudden weakness on one side can be a sign of a stroke."}),
        );
        let content = Arc::new(ContentAgent::new(generator).expect("templates parse"));
        let agent = EscalationAgent::new(content);

        let text = agent
            .respond(&intake("sudden weakness"), CaseLabel::Emergency, &[])
            .await
            .expect("scripted assessment");
        assert!(text.starts_with("Based on what you've told me, sudden weakness"));
        assert!(text.contains("This is beyond what I can safely assess remotely."));
    }
}
