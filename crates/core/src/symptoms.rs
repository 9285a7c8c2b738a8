use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymptomRule {
    pub phrase: &'static str,
    pub severity: Severity,
}

/// Maps symptom keywords to the pair of follow-up suggestions offered for them.
/// Suggestion templates use `{location}` as the placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialtyRule {
    pub keywords: &'static [&'static str],
    pub suggestions: [&'static str; 2],
}

const RED_FLAGS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "severe bleeding",
    "sudden weakness",
    "numbness",
    "paralysis",
    "stroke",
    "heart attack",
    "unconscious",
    "unresponsive",
    "seizure",
    "severe headache",
    "head injury",
    "cannot move",
    "cannot speak",
    "severe abdominal pain",
    "coughing blood",
    "vomiting blood",
    "suicidal",
    "overdose",
];

const GRADED: &[SymptomRule] = &[
    SymptomRule { phrase: "loss of consciousness", severity: Severity::Severe },
    SymptomRule { phrase: "persistent cough", severity: Severity::Moderate },
    SymptomRule { phrase: "high fever", severity: Severity::Moderate },
    SymptomRule { phrase: "sore throat", severity: Severity::Mild },
    SymptomRule { phrase: "headache", severity: Severity::Mild },
    SymptomRule { phrase: "cough", severity: Severity::Mild },
];

const SPECIALTIES: &[SpecialtyRule] = &[
    SpecialtyRule {
        keywords: &["cough", "throat"],
        suggestions: ["Find ENT specialists in {location}", "Locate pharmacies near {location}"],
    },
    SpecialtyRule {
        keywords: &["pain", "back"],
        suggestions: [
            "Find physical therapy clinics in {location}",
            "Locate pain management doctors in {location}",
        ],
    },
    SpecialtyRule {
        keywords: &["skin", "rash"],
        suggestions: [
            "Find dermatologists in {location}",
            "Locate urgent care centers in {location}",
        ],
    },
    SpecialtyRule {
        keywords: &["stomach", "nausea"],
        suggestions: [
            "Find gastroenterologists in {location}",
            "Locate urgent care centers in {location}",
        ],
    },
    SpecialtyRule {
        keywords: &["headache", "dizziness"],
        suggestions: ["Find neurologists in {location}", "Locate urgent care centers in {location}"],
    },
];

const DEFAULT_SPECIALTY: [&str; 2] =
    ["Find primary care doctors in {location}", "Locate urgent care centers in {location}"];

/// Single keyword table behind triage guidance, severity classification and
/// follow-up suggestions.
#[derive(Clone, Debug)]
pub struct SymptomTable {
    red_flags: &'static [&'static str],
    graded: &'static [SymptomRule],
    specialties: &'static [SpecialtyRule],
}

impl Default for SymptomTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl SymptomTable {
    pub fn standard() -> Self {
        Self { red_flags: RED_FLAGS, graded: GRADED, specialties: SPECIALTIES }
    }

    pub fn red_flags(&self) -> &[&'static str] {
        self.red_flags
    }

    /// Comma-separated red-flag list handed to the triage model as guidance.
    pub fn red_flag_guidance(&self) -> String {
        self.red_flags.join(", ")
    }

    /// Highest severity whose phrase appears in `text` (case-insensitive).
    /// Every red flag counts as severe. `None` when nothing matches.
    pub fn classify(&self, text: &str) -> Option<Severity> {
        let lowered = text.to_lowercase();
        let red_flag = self
            .red_flags
            .iter()
            .any(|flag| lowered.contains(flag))
            .then_some(Severity::Severe);
        let graded = self
            .graded
            .iter()
            .filter(|rule| lowered.contains(rule.phrase))
            .map(|rule| rule.severity)
            .max();
        red_flag.max(graded)
    }

    pub fn is_severe(&self, text: &str) -> bool {
        self.classify(text) == Some(Severity::Severe)
    }

    /// First specialty rule whose keyword appears in the symptom text; falls
    /// back to primary care + urgent care.
    pub fn specialty_suggestions(&self, symptom: &str) -> [&'static str; 2] {
        let lowered = symptom.to_lowercase();
        self.specialties
            .iter()
            .find(|rule| rule.keywords.iter().any(|keyword| lowered.contains(keyword)))
            .map(|rule| rule.suggestions)
            .unwrap_or(DEFAULT_SPECIALTY)
    }
}
