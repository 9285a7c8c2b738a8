use medchat_core::domain::consultation::CaseLabel;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{boolean_field, object_schema, string_field};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const SCHEMA_NAME: &str = "language_check";

const SYSTEM_PROMPT: &str = "You are a medical language compliance agent. Your job is to ensure all responses follow these strict rules:\n\n\
1. Acknowledgments must begin with \"I understand\"\n\
2. No medical jargon - only lay terms (e.g., \"high blood pressure\" not \"hypertension\")\n\
3. Timeline question must be exactly: \"When did this first start, and has it been getting better, worse, or staying the same?\"\n\
4. For mild cases, must ask \"What concerns you most about this?\" before recommendations\n\
5. Empathy lines must be exact:\n\
   - For worry: \"It's completely understandable that you're concerned about [specific symptom].\"\n\
   - For pain: \"That sounds really uncomfortable.\"\n\
   - Replace \"don't worry\" with \"Let's work through this together.\"\n\
6. All responses must end with \"How does this sound to you?\"\n\
7. Emergency responses must include \"Call 911 or go to the nearest emergency department right away.\"\n\
8. All responses must include \"I can provide guidance, but I cannot replace an in-person examination.\"\n\n\
If any rule is violated, correct the text while preserving the medical content.";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageReply {
    compliant: bool,
    #[serde(default)]
    corrected_text: String,
    #[serde(default)]
    issues: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageReview {
    /// Text to send: the original when compliant, otherwise the correction.
    pub text: String,
    pub compliant: bool,
    pub issues: Vec<String>,
    /// False when the check could not run and the text went out unchecked.
    pub checked: bool,
}

#[derive(Clone)]
pub struct LanguageCheckAgent {
    generator: StructuredGenerator,
}

impl LanguageCheckAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub fn schema() -> Value {
        object_schema(&[
            ("compliant", boolean_field("Whether the response complies with all language requirements")),
            ("correctedText", string_field("The corrected text if non-compliant")),
            (
                "issues",
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of identified issues",
                }),
            ),
        ])
    }

    pub async fn check(&self, text: &str, label: CaseLabel) -> LanguageReview {
        let prompt = format!(
            "Case Label: {}\n\nResponse Text:\n\"{}\"\n\nCheck if this response complies with all language requirements. If not, provide a corrected version.",
            label.as_str(),
            text
        );
        let request =
            StructuredRequest::new(SCHEMA_NAME, Self::schema(), prompt).with_system(SYSTEM_PROMPT);

        let reply: LanguageReply = match self.generator.generate(request).await {
            Ok(reply) => reply,
            Err(_) => {
                return LanguageReview {
                    text: text.to_string(),
                    compliant: true,
                    issues: Vec::new(),
                    checked: false,
                }
            }
        };

        let corrected = reply.corrected_text.trim();
        let text = if reply.compliant || corrected.is_empty() {
            text.to_string()
        } else {
            corrected.to_string()
        };
        LanguageReview { text, compliant: reply.compliant, issues: reply.issues, checked: true }
    }
}

#[cfg(test)]
mod tests {
    use medchat_core::domain::consultation::CaseLabel;
    use serde_json::json;

    use super::{LanguageCheckAgent, SCHEMA_NAME};
    use crate::agents::fixtures::scripted;
    use crate::llm::StructuredCallError;

    #[tokio::test]
    async fn non_compliant_text_is_replaced_wholesale() {
        let (client, generator) = scripted();
        client.reply(
            SCHEMA_NAME,
            json!({
                "compliant": false,
                "correctedText": "I understand you have high blood pressure. How does this sound to you?",
                "issues": ["jargon: hypertension"],
            }),
        );
        let agent = LanguageCheckAgent::new(generator);

        let review = agent.check("You have hypertension.", CaseLabel::Mild).await;
        assert_eq!(
            review.text,
            "I understand you have high blood pressure. How does this sound to you?"
        );
        assert!(!review.compliant && review.checked);
        assert_eq!(review.issues, vec!["jargon: hypertension"]);
        assert!(client.requests()[0].prompt.starts_with("Case Label: Mild"));
    }

    #[tokio::test]
    async fn compliant_text_is_kept_even_with_a_correction() {
        let (client, generator) = scripted();
        client.reply(
            SCHEMA_NAME,
            json!({"compliant": true, "correctedText": "something else", "issues": []}),
        );
        let agent = LanguageCheckAgent::new(generator);

        let review = agent.check("original", CaseLabel::Emergency).await;
        assert_eq!(review.text, "original");
    }

    #[tokio::test]
    async fn failed_check_sends_the_text_unchecked() {
        let (client, generator) = scripted();
        client.fail(SCHEMA_NAME, StructuredCallError::Status { status: 503, body: String::new() });
        let agent = LanguageCheckAgent::new(generator);

        let review = agent.check("original", CaseLabel::Mild).await;
        assert_eq!(review.text, "original");
        assert!(!review.checked);
    }
}
