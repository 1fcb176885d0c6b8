use std::fmt;

use serde::{Deserialize, Serialize};

use super::client::GenerationOptions;
use super::ProviderError;

/// Complete structured incident report.
///
/// Built fresh by the pipeline for every call and never mutated afterwards.
/// `title` and `executive_summary` are always non-empty when produced by
/// the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident_id: Option<String>,
    pub title: String,
    pub executive_summary: String,
    #[serde(default)]
    pub affected_systems: Vec<String>,
    /// Chronological as emitted by the model; never re-sorted.
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub root_cause_hypothesis: String,
    #[serde(default)]
    pub impact_assessment: String,
    #[serde(default)]
    pub resolution_summary: String,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub related_incidents: Vec<String>,
}

/// A single event in the incident timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Display text ("14:45", "yesterday ~2pm"); not parsed into a time type.
    pub timestamp: String,
    pub description: String,
    pub severity: Option<Severity>,
}

/// A follow-up task coming out of the incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub assignee: Option<String>,
    pub estimated_completion: Option<String>,
}

/// Timeline severity tag. Unrecognized labels are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Other(String),
}

/// Legal severity labels, in the order they are taught to the model.
pub const SEVERITY_LABELS: &[&str] = &["critical", "high", "medium", "low", "info"];

impl Severity {
    /// Case-insensitive parse. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let severity = match trimmed.to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "info" => Self::Info,
            _ => Self::Other(trimmed.to_string()),
        };
        Some(severity)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        Self::parse(&raw).unwrap_or(Self::Other(raw))
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action item priority. Missing or unrecognized values become `Medium`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

pub const PRIORITY_LABELS: &[&str] = &["high", "medium", "low"];

impl Priority {
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => Self::High,
            Some("low") => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-list count of elements dropped during schema coercion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Omissions {
    pub timeline_events: usize,
    pub action_items: usize,
    pub affected_systems: usize,
    pub related_incidents: usize,
}

impl Omissions {
    pub fn total(&self) -> usize {
        self.timeline_events + self.action_items + self.affected_systems + self.related_incidents
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Output of the response parser: a fully typed report plus what was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub report: IncidentReport,
    pub omissions: Omissions,
    /// True when the payload only decoded after quote/comma normalization.
    pub normalized: bool,
}

/// Successful result of `generate_report`.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub run_id: uuid::Uuid,
    pub report: IncidentReport,
    pub omissions: Omissions,
    /// Number of model round-trips performed (1 or 2).
    pub model_calls: u32,
    pub model: String,
    pub warnings: Vec<String>,
    pub raw_response: String,
}

/// "Send text, receive text" capability against a remote language model.
///
/// Implementations perform exactly one round-trip per call and never retry.
pub trait LlmClient {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;
}

impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        (**self).complete(system, prompt, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse(" Info "), Some(Severity::Info));
        assert_eq!(Severity::parse("   "), None);
    }

    #[test]
    fn unknown_severity_is_preserved_verbatim() {
        let sev = Severity::parse("Catastrophic").unwrap();
        assert_eq!(sev, Severity::Other("Catastrophic".into()));
        assert_eq!(sev.to_string(), "Catastrophic");
    }

    #[test]
    fn severity_serializes_as_plain_string() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let json = serde_json::to_string(&Severity::Other("sev-0".into())).unwrap();
        assert_eq!(json, "\"sev-0\"");
        let back: Severity = serde_json::from_str("\"Medium\"").unwrap();
        assert_eq!(back, Severity::Medium);
    }

    #[test]
    fn priority_defaults_to_medium() {
        assert_eq!(Priority::parse_or_default(None), Priority::Medium);
        assert_eq!(Priority::parse_or_default(Some("urgent")), Priority::Medium);
        assert_eq!(Priority::parse_or_default(Some(" HIGH ")), Priority::High);
        assert_eq!(Priority::parse_or_default(Some("low")), Priority::Low);
    }

    #[test]
    fn priority_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn omissions_total() {
        let omissions = Omissions {
            timeline_events: 2,
            action_items: 1,
            affected_systems: 0,
            related_incidents: 0,
        };
        assert_eq!(omissions.total(), 3);
        assert!(!omissions.is_empty());
        assert!(Omissions::default().is_empty());
    }
}
