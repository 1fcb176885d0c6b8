use super::sanitize::NOTES_TAG;
use super::types::{PRIORITY_LABELS, SEVERITY_LABELS};

/// Short system message sent alongside every prompt.
pub const SYSTEM_PROMPT: &str = "You are an expert IT incident analyst. \
You answer with a single JSON object and nothing else.";

const ANALYST_DIRECTIVE: &str = r#"
You are an expert IT incident analyst. Transform messy ticket notes, logs, chat
transcripts or outage descriptions into a comprehensive structured incident report.

Extract and organize:
- Timeline events with timestamps (infer relative times if exact timestamps are unavailable)
- Root cause analysis based on symptoms and error patterns
- Affected systems and services
- Impact assessment (users affected, downtime duration, business impact)
- Actionable next steps with priorities

RULES:
1. Be concise but thorough.
2. If information is missing, say so in the relevant field instead of inventing details.
3. Keep timeline events in chronological order.
4. Use ONLY the field names listed below. Do not add other fields.
"#;

/// Build the extraction prompt for one batch of incident notes.
///
/// Pure function of its input. The schema is spelled out in full because the
/// providers are not asked for a structured-output mode.
pub fn build_prompt(raw_text: &str) -> String {
    format!(
        r#"{ANALYST_DIRECTIVE}
OUTPUT SCHEMA:
{schema}

<{NOTES_TAG}>
{raw_text}
</{NOTES_TAG}>

Analyze the incident notes above and respond with ONLY the JSON object described by the
schema. No markdown fences, no commentary before or after the JSON."#,
        schema = schema_description(),
    )
}

/// Follow-up prompt used once when the first answer was not valid JSON.
pub fn build_repair_prompt(raw_text: &str, previous_response: &str, reason: &str) -> String {
    format!(
        r#"{original}

Your previous response could not be used ({reason}). It began with:
<previous_response>
{previous_response}
</previous_response>

Respond again with ONLY a single valid JSON object matching the schema. Use double quotes
for every key and string, and no trailing commas."#,
        original = build_prompt(raw_text),
    )
}

/// JSON shape taught to the model, with every enumerated value listed.
pub fn schema_description() -> String {
    let severities = SEVERITY_LABELS.join(" | ");
    let priorities = PRIORITY_LABELS.join(" | ");
    format!(
        r#"{{
  "incident_id": "short ticket/incident identifier or null",
  "title": "short human-readable title (required, non-empty)",
  "executive_summary": "high-level overview in prose (required, non-empty)",
  "affected_systems": ["system or service name"],
  "timeline": [
    {{
      "timestamp": "when it happened, as written in the notes",
      "description": "what happened (required)",
      "severity": "{severities} | null"
    }}
  ],
  "root_cause_hypothesis": "likely cause, or \"Unknown\" if it cannot be determined",
  "impact_assessment": "users affected, downtime, business impact",
  "resolution_summary": "how the incident was resolved or mitigated",
  "action_items": [
    {{
      "description": "follow-up task (required)",
      "priority": "{priorities}",
      "assignee": "person or team, or null",
      "estimated_completion": "target date or null"
    }}
  ],
  "related_incidents": ["related incident identifier"]
}}"#
    )
}
