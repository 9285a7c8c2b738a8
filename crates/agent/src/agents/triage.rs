use medchat_core::domain::consultation::CaseLabel;
use medchat_core::domain::intake::IntakeData;
use medchat_core::symptoms::SymptomTable;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{case_label_field, object_schema, string_field};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const SCHEMA_NAME: &str = "triage_result";
pub const FALLBACK_REASONING: &str = "Error occurred during triage, defaulting to mild case";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageOutcome {
    pub case_label: CaseLabel,
    pub reasoning: String,
    #[serde(default)]
    pub red_flag_terms_detected: Vec<String>,
    /// Set when the model call failed and the mild default was used.
    #[serde(skip)]
    pub degraded: bool,
}

impl TriageOutcome {
    pub fn fallback() -> Self {
        Self {
            case_label: CaseLabel::Mild,
            reasoning: FALLBACK_REASONING.to_string(),
            red_flag_terms_detected: Vec::new(),
            degraded: true,
        }
    }
}

/// Model-backed urgency classifier. The red-flag list comes from the shared
/// symptom table; the label it returns is advisory.
#[derive(Clone)]
pub struct TriageAgent {
    generator: StructuredGenerator,
    table: SymptomTable,
}

impl TriageAgent {
    pub fn new(generator: StructuredGenerator, table: SymptomTable) -> Self {
        Self { generator, table }
    }

    pub fn schema() -> Value {
        object_schema(&[
            ("caseLabel", case_label_field("Urgency label for the case")),
            ("reasoning", string_field("Reasoning behind the triage decision")),
            (
                "redFlagTermsDetected",
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Red flag terms detected in the symptoms",
                }),
            ),
        ])
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a medical triage agent. Your job is to examine the patient's symptoms and medical conditions to determine if this is an emergency situation.\n\n\
             Red flag terms that indicate a potential emergency include: {}\n\n\
             If any of these terms or similar urgent medical concerns are present, label the case as \"Emergency\".\n\
             If the symptoms are concerning but not immediately life-threatening, label as \"Potential Emergency\".\n\
             Otherwise, label the case as \"Mild\".\n\n\
             Be conservative - if there's any doubt about patient safety, err on the side of caution.",
            self.table.red_flag_guidance()
        )
    }

    pub fn request(&self, intake: &IntakeData) -> StructuredRequest {
        let prompt = format!(
            "Patient Information:\n{}\n\nAnalyze this information and determine the appropriate triage label.",
            intake.prompt_summary()
        );
        StructuredRequest::new(SCHEMA_NAME, Self::schema(), prompt).with_system(self.system_prompt())
    }

    pub async fn triage(&self, intake: &IntakeData) -> TriageOutcome {
        match self.generator.generate::<TriageOutcome>(self.request(intake)).await {
            Ok(outcome) => outcome,
            Err(_) => TriageOutcome::fallback(),
        }
    }
}
