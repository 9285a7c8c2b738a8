use crate::domain::consultation::CaseLabel;
use crate::domain::search::SearchType;
use crate::symptoms::SymptomTable;

pub const MAX_SUGGESTIONS: usize = 2;

/// Deterministic location-aware suggestions attached to assistant replies.
/// Without a location there is nothing to suggest.
#[derive(Clone, Debug, Default)]
pub struct FollowUpSuggester {
    table: SymptomTable,
}

impl FollowUpSuggester {
    pub fn new(table: SymptomTable) -> Self {
        Self { table }
    }

    pub fn for_case(&self, symptom: &str, label: CaseLabel, location: Option<&str>) -> Vec<String> {
        let Some(location) = usable(location) else {
            return Vec::new();
        };
        let templates = if label.is_urgent() {
            ["Find emergency rooms near {location}", "Locate urgent care centers in {location}"]
        } else {
            self.table.specialty_suggestions(symptom)
        };
        render(&templates, location)
    }

    pub fn generic(&self, location: Option<&str>) -> Vec<String> {
        match usable(location) {
            Some(location) => render(
                &["Find primary care doctors in {location}", "Locate pharmacies near {location}"],
                location,
            ),
            None => Vec::new(),
        }
    }

    pub fn for_search(&self, search_type: SearchType, location: Option<&str>) -> Vec<String> {
        let Some(location) = usable(location) else {
            return Vec::new();
        };
        let templates = match search_type {
            SearchType::Emergency => {
                ["Find urgent care centers in {location}", "Locate pharmacies near {location}"]
            }
            SearchType::Pharmacy => [
                "Find urgent care centers in {location}",
                "Locate primary care doctors in {location}",
            ],
            SearchType::UrgentCare => {
                ["Find emergency rooms near {location}", "Locate pharmacies near {location}"]
            }
            SearchType::PrimaryCare => {
                ["Find specialists in {location}", "Locate urgent care centers in {location}"]
            }
            SearchType::Specialist | SearchType::General => [
                "Find primary care doctors in {location}",
                "Locate urgent care centers in {location}",
            ],
        };
        render(&templates, location)
    }
}

fn usable(location: Option<&str>) -> Option<&str> {
    location.map(str::trim).filter(|location| !location.is_empty())
}

fn render(templates: &[&str], location: &str) -> Vec<String> {
    templates
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|template| template.replace("{location}", location))
        .collect()
}
