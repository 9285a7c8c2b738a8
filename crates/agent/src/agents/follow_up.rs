use medchat_core::domain::consultation::Message;
use medchat_core::domain::intake::IntakeData;
use serde::Deserialize;
use serde_json::Value;

use super::{object_schema, string_field, AgentError};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const SCHEMA_NAME: &str = "follow_up_reply";
pub const RECENT_CONTEXT: usize = 6;

const SYSTEM_PROMPT: &str = "You are a medical assistant providing follow-up guidance.\n\
Maintain a conversational but professional tone.\n\
Use only lay language (no medical jargon).\n\
Always end with \"How does this sound to you?\"\n\
Always include \"I can provide guidance, but I cannot replace an in-person examination.\"\n\n\
Use the conversation history to provide contextual responses and remember what was previously discussed.";

/// Everything the follow-up reply prompt is built from.
#[derive(Clone, Debug)]
pub struct FollowUpContext<'a> {
    pub intake: &'a IntakeData,
    pub history: &'a [String],
    pub recent: &'a [Message],
    pub question: &'a str,
    pub empathy_lines: &'a [String],
}

impl FollowUpContext<'_> {
    pub fn prompt(&self) -> Result<String, AgentError> {
        let intake = serde_json::to_string(self.intake)
            .map_err(|error| AgentError::Reply(error.to_string()))?;
        let skip = self.recent.len().saturating_sub(RECENT_CONTEXT);
        let recent = self.recent[skip..]
            .iter()
            .map(Message::history_line)
            .collect::<Vec<_>>()
            .join("\n");
        let empathy = if self.empathy_lines.is_empty() {
            String::new()
        } else {
            format!("Empathy lines to include: {}", self.empathy_lines.join(" "))
        };

        Ok(format!(
            "Patient Information:\n{intake}\n\nFull Conversation History:\n{}\n\nRecent Messages Context:\n{recent}\n\nUser's Current Follow-up Question:\n\"{}\"\n\n{empathy}\n\nProvide a helpful response that acknowledges the conversation history and addresses this follow-up question contextually.",
            self.history.join("\n"),
            self.question,
        ))
    }
}

#[derive(Clone, Debug, Deserialize)]
struct FollowUpReply {
    response: String,
}

/// Contextual answer to a question asked after guidance was delivered.
#[derive(Clone)]
pub struct FollowUpReplyAgent {
    generator: StructuredGenerator,
}

impl FollowUpReplyAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub fn schema() -> Value {
        object_schema(&[("response", string_field("The contextual follow-up response"))])
    }

    pub async fn reply(&self, context: &FollowUpContext<'_>) -> Result<String, AgentError> {
        let request = StructuredRequest::new(SCHEMA_NAME, Self::schema(), context.prompt()?)
            .with_system(SYSTEM_PROMPT);
        let reply: FollowUpReply = self.generator.generate(request).await?;
        let response = reply.response.trim();
        if response.is_empty() {
            return Err(AgentError::Reply("empty follow-up response".to_string()));
        }
        Ok(response.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use medchat_core::domain::consultation::{Message, Role};
    use serde_json::json;

    use super::{FollowUpContext, FollowUpReplyAgent, SCHEMA_NAME};
    use crate::agents::fixtures::{intake, scripted};
    use crate::agents::AgentError;

    fn transcript(count: usize) -> Vec<Message> {
        (0..count)
            .map(|index| {
                let role = if index % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, format!("message {index}"), Utc::now())
            })
            .collect()
    }

    #[test]
    fn prompt_carries_history_recent_tail_and_empathy() {
        let patient = intake("sore throat");
        let recent = transcript(8);
        let history = vec!["user: hello".to_string(), "assistant: hi".to_string()];
        let empathy = vec!["That sounds really uncomfortable.".to_string()];
        let context = FollowUpContext {
            intake: &patient,
            history: &history,
            recent: &recent,
            question: "can I take ibuprofen?",
            empathy_lines: &empathy,
        };

        let prompt = context.prompt().expect("prompt builds");
        assert!(prompt.contains("\"primarySymptomDescription\":\"sore throat\""));
        assert!(prompt.contains("Full Conversation History:\nuser: hello\nassistant: hi"));
        assert!(!prompt.contains("message 1\n"), "only the last six recent messages");
        assert!(prompt.contains("user: message 2\nassistant: message 3"));
        assert!(prompt.contains("\"can I take ibuprofen?\""));
        assert!(prompt.contains("Empathy lines to include: That sounds really uncomfortable."));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let (client, generator) = scripted();
        client.reply(SCHEMA_NAME, json!({"response": "   "}));
        let agent = FollowUpReplyAgent::new(generator);
        let patient = intake("cough");
        let context = FollowUpContext {
            intake: &patient,
            history: &[],
            recent: &[],
            question: "what now?",
            empathy_lines: &[],
        };

        let error = agent.reply(&context).await.expect_err("blank response");
        assert!(matches!(error, AgentError::Reply(_)));
    }
}
