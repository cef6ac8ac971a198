//! Trust metadata attached to assistant turns
//!
//! The backend may send a `trust_metadata` event before or during a reply.
//! When it does not, [`fallback_metadata`] estimates one from the text.

use serde::{Deserialize, Serialize};

/// How confident the advisor is in an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Sensitivity class of the data an answer draws on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSensitivity {
    Standard,
    Sensitive,
    HealthAdjacent,
}

/// Which context sources were available to the advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSignals {
    pub has_business_profile: bool,
    pub has_recent_sessions: bool,
    pub has_documents: bool,
    pub has_metrics: bool,
    /// Percentage, 0-100
    pub memory_completeness: f64,
}

/// Out-of-band trust signal for one assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustMetadata {
    pub confidence_level: ConfidenceLevel,
    pub data_sensitivity: DataSensitivity,
    pub is_inference: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_signals: Option<DataSignals>,
    pub explanation: String,
    pub factors: Vec<String>,
}

const INFERENCE_MARKERS: &[&str] = &[
    "likely",
    "probably",
    "suggests",
    "indicates",
    "may",
    "might",
    "appears to",
    "seems to",
    "could be",
    "potential",
    "early signal",
];

/// Replies at or below this many characters get no trust indicators
const TRUST_INDICATOR_MIN_CHARS: usize = 100;

/// Estimate trust metadata from reply text
#[must_use]
pub fn fallback_metadata(content: &str, mode: Option<&str>) -> TrustMetadata {
    let lower = content.to_lowercase();
    let is_inference = INFERENCE_MARKERS.iter().any(|m| lower.contains(m));

    // Health wins over behaviour when both appear.
    let data_sensitivity = if lower.contains("wellness") || lower.contains("health") {
        DataSensitivity::HealthAdjacent
    } else if lower.contains("behavior") || lower.contains("behaviour") {
        DataSensitivity::Sensitive
    } else {
        DataSensitivity::Standard
    };

    let mode_label = mode
        .filter(|m| !m.is_empty())
        .map_or_else(|| "general".to_string(), |m| m.replace('_', " "));

    TrustMetadata {
        confidence_level: ConfidenceLevel::Medium,
        data_sensitivity,
        is_inference,
        data_signals: None,
        explanation: "This insight is based on your conversation context.".to_string(),
        factors: vec![
            "Context from this conversation".to_string(),
            format!("Mode: {mode_label}"),
        ],
    }
}

/// Suggest what the user could provide to sharpen future answers
#[must_use]
pub fn improvement_hint(metadata: &TrustMetadata) -> String {
    let Some(signals) = &metadata.data_signals else {
        return "Provide more context or update your profile for better insights.".to_string();
    };

    let mut suggestions = Vec::new();
    if !signals.has_business_profile || signals.memory_completeness < 50.0 {
        suggestions.push("Complete your business profile");
    }
    if !signals.has_documents {
        suggestions.push("Upload relevant documents");
    }
    if !signals.has_metrics {
        suggestions.push("Add key metrics you're tracking");
    }

    if suggestions.is_empty() {
        "Your profile is well configured. Ask follow-up questions for deeper analysis.".to_string()
    } else {
        format!("{} to improve insight accuracy.", suggestions.join(", "))
    }
}

#[must_use]
pub fn shows_trust_indicators(content: &str) -> bool {
    content.chars().count() > TRUST_INDICATOR_MIN_CHARS
}
