use medchat_core::domain::consultation::{CaseLabel, TimelineData};
use medchat_core::domain::intake::IntakeData;
use serde::Deserialize;
use serde_json::{json, Value};
use tera::{Context, Tera};

use super::{object_schema, string_field, AgentError};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const MILD_SCHEMA_NAME: &str = "mild_case_response";
pub const EMERGENCY_SCHEMA_NAME: &str = "emergency_response";
pub const RECOMMENDATION_COUNT: usize = 3;

const MILD_TEMPLATE: &str = "guidance/mild_case.txt";
const EMERGENCY_TEMPLATE: &str = "guidance/emergency.txt";

const MILD_SYSTEM_PROMPT: &str = "You are a medical content agent providing guidance for mild medical cases.\n\n\
Your recommendations must:\n\
1. Be in simple, lay language (no medical jargon)\n\
2. Be practical and actionable\n\
3. Focus on self-care measures\n\n\
For the follow-up timeframe, suggest a reasonable number of days (typically 3-7) after which the patient should seek professional care if symptoms don't improve.";

const EMERGENCY_SYSTEM_PROMPT: &str = "You are a medical content agent providing guidance for potential emergency medical cases.\n\n\
Your assessment must:\n\
1. Be in simple, lay language (no medical jargon)\n\
2. Be brief and clear\n\
3. Not cause unnecessary panic but convey appropriate urgency\n\n\
Do not provide a diagnosis, but explain why the symptoms warrant immediate medical attention.";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MildGuidance {
    pub acknowledgment: String,
    pub self_care_recommendations: Vec<String>,
    pub follow_up_timeframe: f64,
}

impl MildGuidance {
    /// Whole days, kept within a sensible window.
    pub fn follow_up_days(&self) -> u32 {
        if self.follow_up_timeframe.is_finite() {
            self.follow_up_timeframe.round().clamp(1.0, 30.0) as u32
        } else {
            3
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct EmergencyAssessment {
    assessment: String,
}

/// Generates guidance content and renders it through the embedded
/// guidance templates.
#[derive(Clone)]
pub struct ContentAgent {
    generator: StructuredGenerator,
    templates: Tera,
}

impl ContentAgent {
    pub fn new(generator: StructuredGenerator) -> Result<Self, AgentError> {
        let mut templates = Tera::default();
        templates.add_raw_template(
            MILD_TEMPLATE,
            include_str!("../../../../templates/guidance/mild_case.txt"),
        )?;
        templates.add_raw_template(
            EMERGENCY_TEMPLATE,
            include_str!("../../../../templates/guidance/emergency.txt"),
        )?;
        Ok(Self { generator, templates })
    }

    pub fn mild_schema() -> Value {
        object_schema(&[
            ("acknowledgment", string_field("Acknowledgment of the patient's primary symptom")),
            (
                "selfCareRecommendations",
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Three self-care recommendations in lay language",
                }),
            ),
            (
                "followUpTimeframe",
                json!({
                    "type": "number",
                    "description": "Number of days to wait before seeking further care if not improving",
                }),
            ),
        ])
    }

    pub fn emergency_schema() -> Value {
        object_schema(&[("assessment", string_field("Brief layperson assessment of the situation"))])
    }

    pub async fn mild_case(
        &self,
        intake: &IntakeData,
        timeline: &TimelineData,
    ) -> Result<MildGuidance, AgentError> {
        let prompt = format!(
            "Patient Information:\n{}\n\nTimeline Information:\nProgression: {}\nDetails: {}\n\nGenerate an acknowledgment and three self-care recommendations for this patient.",
            intake.prompt_summary(),
            timeline.progression.as_str(),
            timeline.details
        );
        let request = StructuredRequest::new(MILD_SCHEMA_NAME, Self::mild_schema(), prompt)
            .with_system(MILD_SYSTEM_PROMPT);
        let mut guidance: MildGuidance = self.generator.generate(request).await?;

        guidance.self_care_recommendations.retain(|item| !item.trim().is_empty());
        if guidance.self_care_recommendations.len() < RECOMMENDATION_COUNT {
            return Err(AgentError::Reply(format!(
                "expected {RECOMMENDATION_COUNT} self-care recommendations, got {}",
                guidance.self_care_recommendations.len()
            )));
        }
        guidance.self_care_recommendations.truncate(RECOMMENDATION_COUNT);
        Ok(guidance)
    }

    pub async fn emergency_assessment(
        &self,
        intake: &IntakeData,
        label: CaseLabel,
    ) -> Result<String, AgentError> {
        let prompt = format!(
            "Patient Information:\n{}\n\nCase Label: {}\n\nGenerate a brief layperson assessment explaining why this situation requires immediate medical attention.",
            intake.prompt_summary(),
            label.as_str()
        );
        let request =
            StructuredRequest::new(EMERGENCY_SCHEMA_NAME, Self::emergency_schema(), prompt)
                .with_system(EMERGENCY_SYSTEM_PROMPT);
        let reply: EmergencyAssessment = self.generator.generate(request).await?;
        Ok(reply.assessment)
    }

    pub fn render_mild(
        &self,
        guidance: &MildGuidance,
        empathy_lines: &[String],
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("empathy", &empathy_lines.join(" "));
        context.insert("acknowledgment", &guidance.acknowledgment);
        context.insert("recommendations", &guidance.self_care_recommendations);
        context.insert("follow_up_days", &guidance.follow_up_days());
        let rendered = self.templates.render(MILD_TEMPLATE, &context)?;
        Ok(rendered.trim_end().to_string())
    }

    pub fn render_emergency(
        &self,
        assessment: &str,
        empathy_lines: &[String],
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("empathy", &empathy_lines.join(" "));
        context.insert("assessment", assessment);
        let rendered = self.templates.render(EMERGENCY_TEMPLATE, &context)?;
        Ok(rendered.trim_end().to_string())
    }
}
