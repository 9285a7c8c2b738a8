use serde::Deserialize;
use serde_json::Value;

use super::{boolean_field, object_schema, string_field};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const SCHEMA_NAME: &str = "empathy_analysis";
pub const PAIN_LINE: &str = "That sounds really uncomfortable.";
pub const REASSURANCE: &str = "Let's work through this together";

const WORRY_TERMS: &[&str] =
    &["worried", "anxious", "concerned", "scared", "afraid", "fear", "stress", "nervous"];
const PAIN_TERMS: &[&str] = &["pain", "hurt", "ache", "sore", "discomfort", "agony", "suffering"];
const DONT_WORRY_PHRASES: &[&str] = &["don't worry", "don\u{2019}t worry", "dont worry"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmpathySignals {
    pub worry: bool,
    pub pain: bool,
    pub dont_worry: bool,
}

impl EmpathySignals {
    pub fn any(&self) -> bool {
        self.worry || self.pain || self.dont_worry
    }
}

/// Keyword pass run before any model call.
pub fn pre_screen(message: &str) -> EmpathySignals {
    let lowered = message.to_lowercase();
    EmpathySignals {
        worry: WORRY_TERMS.iter().any(|term| lowered.contains(term)),
        pain: PAIN_TERMS.iter().any(|term| lowered.contains(term)),
        dont_worry: DONT_WORRY_PHRASES.iter().any(|phrase| lowered.contains(phrase)),
    }
}

/// Case-insensitive rewrite of every "don't worry" variant.
pub fn replace_dont_worry(message: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with the original.
    let lowered = message.to_ascii_lowercase();
    let mut out = String::with_capacity(message.len());
    let mut cursor = 0;

    loop {
        let next = DONT_WORRY_PHRASES
            .iter()
            .filter_map(|phrase| lowered[cursor..].find(phrase).map(|at| (cursor + at, phrase.len())))
            .min_by_key(|(at, _)| *at);
        match next {
            Some((at, len)) => {
                out.push_str(&message[cursor..at]);
                out.push_str(REASSURANCE);
                cursor = at + len;
            }
            None => {
                out.push_str(&message[cursor..]);
                return out;
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmpathyReply {
    contains_worry: bool,
    contains_pain: bool,
    contains_dont_worry: bool,
    #[serde(default)]
    specific_symptom: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmpathyOutcome {
    pub lines: Vec<String>,
    pub modified_message: String,
    pub signals: EmpathySignals,
    pub specific_symptom: Option<String>,
}

impl EmpathyOutcome {
    fn unchanged(message: &str) -> Self {
        Self { modified_message: message.to_string(), ..Self::default() }
    }

    pub fn joined(&self) -> Option<String> {
        (!self.lines.is_empty()).then(|| self.lines.join(" "))
    }
}

#[derive(Clone)]
pub struct EmpathyAgent {
    generator: StructuredGenerator,
}

impl EmpathyAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub fn schema() -> Value {
        object_schema(&[
            ("containsWorry", boolean_field("Whether the message contains expressions of worry or anxiety")),
            ("containsPain", boolean_field("Whether the message describes pain")),
            ("containsDontWorry", boolean_field("Whether the message contains 'don't worry' phrasing")),
            ("specificSymptom", string_field("The specific symptom the user is worried about, if any")),
        ])
    }

    /// Never fails: a message without emotional cues, or a failed model
    /// confirmation, yields no empathy lines and the message unchanged.
    pub async fn process(&self, message: &str) -> EmpathyOutcome {
        if !pre_screen(message).any() {
            return EmpathyOutcome::unchanged(message);
        }

        let prompt = format!(
            "Analyze this message for expressions of worry, pain, or \"don't worry\" phrasing:\n\"{message}\"\n\nIf the user expresses worry or concern, identify the specific symptom they're worried about."
        );
        let request = StructuredRequest::new(SCHEMA_NAME, Self::schema(), prompt);
        let reply: EmpathyReply = match self.generator.generate(request).await {
            Ok(reply) => reply,
            Err(_) => return EmpathyOutcome::unchanged(message),
        };

        let specific_symptom = Some(reply.specific_symptom.trim().to_string())
            .filter(|symptom| !symptom.is_empty());
        let mut lines = Vec::new();
        if reply.contains_worry {
            if let Some(symptom) = &specific_symptom {
                lines.push(format!(
                    "It's completely understandable that you're concerned about {symptom}."
                ));
            }
        }
        if reply.contains_pain {
            lines.push(PAIN_LINE.to_string());
        }

        let modified_message = if reply.contains_dont_worry {
            replace_dont_worry(message)
        } else {
            message.to_string()
        };

        EmpathyOutcome {
            lines,
            modified_message,
            signals: EmpathySignals {
                worry: reply.contains_worry,
                pain: reply.contains_pain,
                dont_worry: reply.contains_dont_worry,
            },
            specific_symptom,
        }
    }
}
