use medchat_core::domain::intake::IntakeData;
use medchat_core::domain::search::{SearchIntent, SearchResults, SearchType};
use serde_json::{json, Value};

use super::{boolean_field, object_schema, string_field};
use crate::llm::{StructuredGenerator, StructuredRequest};

pub const INTENT_SCHEMA_NAME: &str = "search_intent";
pub const RESULTS_SCHEMA_NAME: &str = "search_results";
pub const SEARCH_FAILURE_NOTE: &str =
    "Sorry, I encountered an error while searching for medical services.";

const SEARCH_TYPES: [&str; 6] =
    ["emergency", "specialist", "pharmacy", "urgent_care", "primary_care", "general"];

const INTENT_SYSTEM_PROMPT: &str = "You are a search intent detection agent. Your job is to determine if a user message is requesting a location-based search for medical services.\n\n\
Look for patterns like:\n\
- \"Find [medical service] in [location]\"\n\
- \"Locate [medical facility] near [location]\"\n\
- \"Search for [doctor type] in [location]\"\n\
- \"[Medical service] near me\"\n\
- \"Emergency rooms in [location]\"\n\
- \"Urgent care centers in [location]\"\n\n\
If the message is a search query, extract the location and service type.";

const RESULTS_SYSTEM_PROMPT: &str = "You are a medical search agent. Your job is to provide realistic, helpful search results for medical services in specific locations.\n\n\
Generate realistic but fictional medical facilities and services for the requested location. Include:\n\
- Names that sound realistic for medical facilities\n\
- Actual street addresses that could exist in the specified city\n\
- Phone numbers in the correct format for the area\n\
- Realistic operating hours\n\
- Appropriate specialties for the search type\n\
- Helpful additional information\n\n\
Make the results diverse and comprehensive. Include a mix of:\n\
- Large hospital systems\n\
- Independent practices\n\
- Urgent care centers\n\
- Specialty clinics\n\
- Community health centers\n\n\
For emergency searches, prioritize hospitals with emergency departments.\n\
For specialist searches, focus on relevant specialty practices.\n\
For pharmacy searches, include both chain and independent pharmacies.";

/// Location-based facility search: intent detection, then generated results.
/// Both calls degrade instead of failing the turn.
#[derive(Clone)]
pub struct SearchAgent {
    generator: StructuredGenerator,
}

impl SearchAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    fn search_type_field() -> Value {
        json!({ "type": "string", "enum": SEARCH_TYPES })
    }

    pub fn intent_schema() -> Value {
        object_schema(&[
            ("isSearchQuery", boolean_field("Whether this is a location-based search query")),
            ("searchType", Self::search_type_field()),
            ("location", string_field("The location mentioned in the query")),
            ("serviceType", string_field("The type of medical service being searched for")),
            (
                "urgency",
                json!({
                    "type": "string",
                    "enum": ["emergency", "urgent", "routine"],
                    "description": "The urgency level of the search",
                }),
            ),
        ])
    }

    pub fn results_schema() -> Value {
        let facility = object_schema(&[
            ("name", string_field("Name of the medical facility or service")),
            ("address", string_field("Full address of the facility")),
            ("phone", string_field("Phone number if available")),
            ("type", string_field("Type of facility (e.g., Emergency Room, Urgent Care, etc.)")),
            ("distance", string_field("Estimated distance from user location")),
            ("hours", string_field("Operating hours if available")),
            (
                "specialties",
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Medical specialties offered",
                }),
            ),
            (
                "rating",
                json!({
                    "type": ["number", "null"],
                    "description": "Rating out of 5 if available",
                }),
            ),
            ("acceptsInsurance", boolean_field("Whether they accept insurance")),
            ("emergencyServices", boolean_field("Whether they provide emergency services")),
        ]);

        object_schema(&[
            ("searchType", Self::search_type_field()),
            ("results", json!({ "type": "array", "items": facility })),
            ("searchQuery", string_field("The processed search query")),
            ("location", string_field("The location being searched")),
            ("additionalInfo", string_field("Additional helpful information about the search")),
        ])
    }

    pub async fn detect_intent(&self, message: &str) -> SearchIntent {
        let prompt = format!(
            "Analyze this message to determine if it's a location-based medical search query:\n\"{message}\"\n\nDetermine if this is a search query and extract the relevant information."
        );
        let request = StructuredRequest::new(INTENT_SCHEMA_NAME, Self::intent_schema(), prompt)
            .with_system(INTENT_SYSTEM_PROMPT);
        self.generator.generate(request).await.unwrap_or_else(|_| SearchIntent::not_a_search())
    }

    pub async fn search(
        &self,
        query: &str,
        location: &str,
        search_type: SearchType,
        intake: Option<&IntakeData>,
    ) -> SearchResults {
        let patient_context = intake
            .and_then(|intake| serde_json::to_string(intake).ok())
            .map(|json| format!("Patient Context: {json}\n"))
            .unwrap_or_default();
        let prompt = format!(
            "Search Query: \"{query}\"\nLocation: \"{location}\"\nSearch Type: \"{}\"\n{patient_context}\nGenerate realistic search results for medical services in this location.\nProvide 5-8 relevant results with complete information.",
            search_type.as_str()
        );
        let request = StructuredRequest::new(RESULTS_SCHEMA_NAME, Self::results_schema(), prompt)
            .with_system(RESULTS_SYSTEM_PROMPT);

        match self.generator.generate::<SearchResults>(request).await {
            Ok(results) => results,
            Err(_) => SearchResults::empty(query, location, search_type, SEARCH_FAILURE_NOTE),
        }
    }
}
