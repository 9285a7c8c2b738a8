use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_AGE: i32 = 0;
pub const MAX_AGE: i32 = 120;

/// Patient-reported intake form. Field names follow the web form's wire format.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeData {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub existing_medical_conditions: String,
    #[serde(default)]
    pub primary_symptom_description: String,
    #[serde(default)]
    pub symptom_onset: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub weight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_feet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_inches: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntakeField {
    FullName,
    Age,
    Gender,
    ExistingMedicalConditions,
    PrimarySymptomDescription,
    SymptomOnset,
}

impl IntakeField {
    pub const REQUIRED: [IntakeField; 6] = [
        Self::FullName,
        Self::Age,
        Self::Gender,
        Self::ExistingMedicalConditions,
        Self::PrimarySymptomDescription,
        Self::SymptomOnset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullName => "fullName",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::ExistingMedicalConditions => "existingMedicalConditions",
            Self::PrimarySymptomDescription => "primarySymptomDescription",
            Self::SymptomOnset => "symptomOnset",
        }
    }
}

impl std::fmt::Display for IntakeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntakeValidationError {
    #[error("Missing required field: {0}")]
    MissingField(IntakeField),
    #[error("Age must be between 0 and 120")]
    AgeOutOfRange { field: IntakeField, age: i32 },
}

impl IntakeValidationError {
    pub fn field(&self) -> IntakeField {
        match self {
            Self::MissingField(field) | Self::AgeOutOfRange { field, .. } => *field,
        }
    }
}

impl IntakeData {
    /// Checks required fields in form order, then the age range. The first
    /// failure wins.
    pub fn validate(&self) -> Result<(), IntakeValidationError> {
        for field in IntakeField::REQUIRED {
            if self.is_blank(field) {
                return Err(IntakeValidationError::MissingField(field));
            }
        }

        if let Some(age) = self.age {
            if !(MIN_AGE..=MAX_AGE).contains(&age) {
                return Err(IntakeValidationError::AgeOutOfRange { field: IntakeField::Age, age });
            }
        }

        Ok(())
    }

    fn is_blank(&self, field: IntakeField) -> bool {
        let text = match field {
            IntakeField::Age => return self.age.is_none(),
            IntakeField::FullName => &self.full_name,
            IntakeField::Gender => &self.gender,
            IntakeField::ExistingMedicalConditions => &self.existing_medical_conditions,
            IntakeField::PrimarySymptomDescription => &self.primary_symptom_description,
            IntakeField::SymptomOnset => &self.symptom_onset,
        };
        text.trim().is_empty()
    }

    pub fn location(&self) -> Option<&str> {
        let location = self.location.trim();
        (!location.is_empty()).then_some(location)
    }

    /// Copy used for re-triage: the follow-up text is appended to the
    /// original symptom description. The stored intake is never modified.
    pub fn with_follow_up(&self, follow_up: &str) -> Self {
        let mut augmented = self.clone();
        augmented.primary_symptom_description =
            format!("{} + FOLLOW-UP: {}", self.primary_symptom_description, follow_up);
        augmented
    }

    /// Patient block shared by the model prompts.
    pub fn prompt_summary(&self) -> String {
        let age = self.age.map(|age| age.to_string()).unwrap_or_default();
        format!(
            "Full Name: {}\nAge: {}\nGender: {}\nExisting Medical Conditions: {}\nPrimary Symptom Description: {}\nSymptom Onset: {}",
            self.full_name,
            age,
            self.gender,
            self.existing_medical_conditions,
            self.primary_symptom_description,
            self.symptom_onset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{IntakeData, IntakeField, IntakeValidationError};

    fn valid_intake() -> IntakeData {
        IntakeData {
            full_name: "Dana Reyes".to_string(),
            age: Some(34),
            gender: "female".to_string(),
            existing_medical_conditions: "none".to_string(),
            primary_symptom_description: "sore throat".to_string(),
            symptom_onset: "2 days ago".to_string(),
            location: "Austin".to_string(),
            height: "5'6\"".to_string(),
            weight: "140 lb".to_string(),
            height_feet: None,
            height_inches: None,
        }
    }

    #[test]
    fn complete_intake_passes_validation() {
        assert_eq!(valid_intake().validate(), Ok(()));
    }

    #[test]
    fn boundary_ages_are_accepted() {
        for age in [0, 120] {
            let intake = IntakeData { age: Some(age), ..valid_intake() };
            assert_eq!(intake.validate(), Ok(()), "age {age} should be valid");
        }
    }

    #[test]
    fn each_missing_required_field_is_named() {
        let cases: [(IntakeField, fn(&mut IntakeData)); 6] = [
            (IntakeField::FullName, |intake| intake.full_name = "  ".to_string()),
            (IntakeField::Age, |intake| intake.age = None),
            (IntakeField::Gender, |intake| intake.gender.clear()),
            (IntakeField::ExistingMedicalConditions, |intake| {
                intake.existing_medical_conditions.clear()
            }),
            (IntakeField::PrimarySymptomDescription, |intake| {
                intake.primary_symptom_description = "\t".to_string()
            }),
            (IntakeField::SymptomOnset, |intake| intake.symptom_onset.clear()),
        ];

        for (field, blank) in cases {
            let mut intake = valid_intake();
            blank(&mut intake);
            let error = intake.validate().expect_err("blank field must fail");
            assert_eq!(error, IntakeValidationError::MissingField(field));
            assert_eq!(error.to_string(), format!("Missing required field: {}", field.as_str()));
        }
    }

    #[test]
    fn out_of_range_age_names_age_field() {
        for age in [-1, 121, 400] {
            let intake = IntakeData { age: Some(age), ..valid_intake() };
            let error = intake.validate().expect_err("age outside range must fail");
            assert_eq!(error.field(), IntakeField::Age);
            assert_eq!(error.to_string(), "Age must be between 0 and 120");
        }
    }

    #[test]
    fn location_is_optional_for_validation() {
        let intake = IntakeData { location: String::new(), ..valid_intake() };
        assert_eq!(intake.validate(), Ok(()));
        assert_eq!(intake.location(), None);
    }

    #[test]
    fn follow_up_augmentation_leaves_original_untouched() {
        let intake = valid_intake();
        let augmented = intake.with_follow_up("now my chest hurts");

        assert_eq!(intake.primary_symptom_description, "sore throat");
        assert_eq!(
            augmented.primary_symptom_description,
            "sore throat + FOLLOW-UP: now my chest hurts"
        );
    }

    #[test]
    fn deserializes_form_payload_in_camel_case() {
        let intake: IntakeData = serde_json::from_str(
            r#"{"fullName":"Sam","age":40,"gender":"male","existingMedicalConditions":"asthma",
               "primarySymptomDescription":"cough","symptomOnset":"today","location":"Denver",
               "height":"6ft","weight":"180","heightFeet":"6","heightInches":"0"}"#,
        )
        .expect("form payload should parse");

        assert_eq!(intake.full_name, "Sam");
        assert_eq!(intake.age, Some(40));
        assert_eq!(intake.height_feet.as_deref(), Some("6"));
        assert_eq!(intake.validate(), Ok(()));
    }
}
