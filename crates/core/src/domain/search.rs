use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Emergency,
    Specialist,
    Pharmacy,
    UrgentCare,
    PrimaryCare,
    #[default]
    General,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Specialist => "specialist",
            Self::Pharmacy => "pharmacy",
            Self::UrgentCare => "urgent_care",
            Self::PrimaryCare => "primary_care",
            Self::General => "general",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchUrgency {
    Emergency,
    Urgent,
    #[default]
    Routine,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIntent {
    pub is_search_query: bool,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub urgency: SearchUrgency,
}

impl SearchIntent {
    pub fn not_a_search() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityResult {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(rename = "type", default)]
    pub facility_type: String,
    #[serde(default)]
    pub distance: String,
    #[serde(default)]
    pub hours: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub accepts_insurance: bool,
    #[serde(default)]
    pub emergency_services: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub search_type: SearchType,
    pub results: Vec<FacilityResult>,
    pub search_query: String,
    pub location: String,
    #[serde(default)]
    pub additional_info: String,
}

impl SearchResults {
    pub fn empty(
        search_query: impl Into<String>,
        location: impl Into<String>,
        search_type: SearchType,
        additional_info: impl Into<String>,
    ) -> Self {
        Self {
            search_type,
            results: Vec::new(),
            search_query: search_query.into(),
            location: location.into(),
            additional_info: additional_info.into(),
        }
    }

    /// Markdown card rendered into the chat transcript.
    pub fn to_markdown(&self) -> String {
        let location = self.location.trim();
        if self.results.is_empty() {
            let place = if location.is_empty() { String::new() } else { format!(" in {location}") };
            let message = format!(
                "I couldn't find any results for \"{}\"{place}. {}",
                self.search_query, self.additional_info
            );
            return message.trim_end().to_string();
        }

        let mut out = format!("## 🔍 Search Results: {}\n\n", self.search_query);
        if !location.is_empty() {
            out.push_str(&format!("**Location:** {location}\n\n"));
        }
        if self.search_type == SearchType::Emergency {
            out.push_str("⚠️ **For immediate emergencies, call 911**\n\n");
        }

        for (index, result) in self.results.iter().enumerate() {
            out.push_str(&format!("### {}. **{}**\n", index + 1, result.name));
            out.push_str(&format!("📍 **Address:** {}\n", result.address));
            out.push_str(&format!("📞 **Phone:** {}\n", result.phone));
            out.push_str(&format!("🏥 **Type:** {}\n", result.facility_type));
            if !result.distance.is_empty() {
                out.push_str(&format!("📏 **Distance:** {}\n", result.distance));
            }
            if !result.hours.is_empty() {
                out.push_str(&format!("🕒 **Hours:** {}\n", result.hours));
            }
            if !result.specialties.is_empty() {
                out.push_str(&format!("🩺 **Specialties:** {}\n", result.specialties.join(", ")));
            }
            if let Some(rating) = result.rating.filter(|rating| *rating > 0.0) {
                out.push_str(&format!("⭐ **Rating:** {rating}/5\n"));
            }
            if result.accepts_insurance {
                out.push_str("💳 **Insurance:** Accepts most insurance plans\n");
            }
            if result.emergency_services {
                out.push_str("🚨 **Emergency Services:** Available 24/7\n");
            }
            out.push('\n');
        }

        if !self.additional_info.is_empty() {
            out.push_str(&format!("\n💡 **Additional Information:** {}\n\n", self.additional_info));
        }
        out.push_str(
            "\n**Important:** Please call ahead to confirm availability and insurance acceptance. \
             For emergencies, always call 911 or go to the nearest emergency room.\n\n",
        );
        out.push_str("How does this help with your medical needs?");
        out
    }
}
