pub const DISCLAIMER: &str =
    "I can provide guidance, but I cannot replace an in-person examination.";
pub const CLOSING: &str = "How does this sound to you?";
pub const EMERGENCY_INSTRUCTION: &str =
    "Call 911 or go to the nearest emergency department right away.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuidanceKind {
    Routine,
    Escalation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComplianceDecision {
    Compliant,
    Repaired { reason_codes: Vec<&'static str>, text: String },
}

impl ComplianceDecision {
    pub fn into_text(self, original: &str) -> String {
        match self {
            Self::Compliant => original.to_string(),
            Self::Repaired { text, .. } => text,
        }
    }
}

/// Last deterministic check on outward guidance. Whatever the model or the
/// language check produced, the message leaves with the disclaimer, the 911
/// instruction when escalating, and the closing question as its last line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComplianceGuard {
    pub require_emergency_instruction: bool,
}

impl Default for ComplianceGuard {
    fn default() -> Self {
        Self { require_emergency_instruction: true }
    }
}

impl ComplianceGuard {
    pub fn evaluate(&self, text: &str, kind: GuidanceKind) -> ComplianceDecision {
        let trimmed = text.trim();
        let mut reason_codes = Vec::new();
        if kind == GuidanceKind::Escalation
            && self.require_emergency_instruction
            && !trimmed.contains(EMERGENCY_INSTRUCTION)
        {
            reason_codes.push("missing_emergency_instruction");
        }
        if !trimmed.contains(DISCLAIMER) {
            reason_codes.push("missing_disclaimer");
        }
        if !trimmed.ends_with(CLOSING) {
            reason_codes.push("missing_closing");
        }

        if reason_codes.is_empty() {
            return ComplianceDecision::Compliant;
        }

        let mut body = trimmed.strip_suffix(CLOSING).unwrap_or(trimmed).trim_end().to_string();
        if reason_codes.contains(&"missing_emergency_instruction") {
            push_paragraph(&mut body, &format!("Here's what I recommend: {EMERGENCY_INSTRUCTION}"));
        }
        if reason_codes.contains(&"missing_disclaimer") {
            push_paragraph(&mut body, DISCLAIMER);
        }
        push_paragraph(&mut body, CLOSING);

        ComplianceDecision::Repaired { reason_codes, text: body }
    }

    pub fn enforce(&self, text: &str, kind: GuidanceKind) -> String {
        self.evaluate(text, kind).into_text(text)
    }
}

fn push_paragraph(body: &mut String, paragraph: &str) {
    if !body.is_empty() {
        body.push_str("\n\n");
    }
    body.push_str(paragraph);
}
