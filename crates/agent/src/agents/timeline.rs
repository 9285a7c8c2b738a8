use medchat_core::domain::consultation::{CaseLabel, Progression, TimelineData};
use medchat_core::domain::intake::IntakeData;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{boolean_field, case_label_field, object_schema, string_field, AgentError};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const SCHEMA_NAME: &str = "timeline_analysis";
pub const TIMELINE_QUESTION: &str =
    "When did this first start, and has it been getting better, worse, or staying the same?";

const SYSTEM_PROMPT: &str = "You are a medical timeline analysis agent. Your job is to examine the patient's description of their symptom timeline and determine if there are concerning patterns.\n\n\
If the patient indicates rapid worsening or alarming changes in symptoms, this may warrant escalation to \"Potential Emergency\" or \"Emergency\".\n\n\
Examples of concerning timeline patterns:\n\
- Symptoms rapidly worsening over hours\n\
- Sudden onset of severe symptoms\n\
- Progressive worsening despite self-care\n\
- New, severe symptoms appearing\n\n\
Be conservative - if there's any doubt about patient safety, err on the side of caution.";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineReply {
    progression: Progression,
    rapid_worsening: bool,
    alarming_change: bool,
    recommended_label: CaseLabel,
    reasoning: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineAssessment {
    pub timeline: TimelineData,
    pub rapid_worsening: bool,
    pub alarming_change: bool,
    pub recommended_label: CaseLabel,
    pub reasoning: String,
}

impl TimelineAssessment {
    pub fn should_escalate(&self) -> bool {
        self.rapid_worsening || self.alarming_change
    }

    pub fn escalation_reason(&self) -> &'static str {
        if self.rapid_worsening {
            "rapid worsening"
        } else {
            "alarming changes"
        }
    }
}

#[derive(Clone)]
pub struct TimelineAgent {
    generator: StructuredGenerator,
}

impl TimelineAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub fn question(&self) -> &'static str {
        TIMELINE_QUESTION
    }

    pub fn schema() -> Value {
        object_schema(&[
            (
                "progression",
                json!({
                    "type": "string",
                    "enum": ["better", "worse", "same"],
                    "description": "Whether symptoms are getting better, worse, or staying the same",
                }),
            ),
            ("rapidWorsening", boolean_field("Whether symptoms are rapidly worsening")),
            ("alarmingChange", boolean_field("Whether there are alarming changes in symptoms")),
            ("recommendedLabel", case_label_field("Recommended case label based on timeline")),
            ("reasoning", string_field("Reasoning behind the timeline analysis")),
        ])
    }

    pub async fn analyze(
        &self,
        response: &str,
        intake: &IntakeData,
    ) -> Result<TimelineAssessment, AgentError> {
        let prompt = format!(
            "Patient Information:\n{}\n\nTimeline Response: \"{}\"\n\nAnalyze this timeline information and determine if there are concerning patterns.",
            intake.prompt_summary(),
            response
        );
        let request =
            StructuredRequest::new(SCHEMA_NAME, Self::schema(), prompt).with_system(SYSTEM_PROMPT);
        let reply: TimelineReply = self.generator.generate(request).await?;

        Ok(TimelineAssessment {
            timeline: TimelineData { progression: reply.progression, details: response.to_string() },
            rapid_worsening: reply.rapid_worsening,
            alarming_change: reply.alarming_change,
            recommended_label: reply.recommended_label,
            reasoning: reply.reasoning,
        })
    }
}
