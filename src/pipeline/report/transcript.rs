// Chat transcript input: Slack message lists flattened into incident notes,
// plus trigger detection for the chat listener.

use serde::Deserialize;

use super::ExtractionError;

/// Keywords that ask the listener for a report.
pub const TRIGGER_KEYWORDS: &[&str] = &["@incident-report", "/incident", "!incident"];

/// One message in Slack `conversations.history` / export shape.
/// Only the fields used to build notes are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub text: Option<String>,
    /// Slack timestamp, "<seconds>.<micros>".
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SlackExport {
    Messages(Vec<SlackMessage>),
    History { messages: Vec<SlackMessage> },
}

/// Decode a Slack export: either a bare message array or an object with `messages`.
pub fn parse_slack_export(json: &str) -> Result<Vec<SlackMessage>, ExtractionError> {
    let export: SlackExport = serde_json::from_str(json).map_err(|e| {
        ExtractionError::Input(format!(
            "not a Slack message export (expected an array of messages or an object with \"messages\"): {e}"
        ))
    })?;

    Ok(match export {
        SlackExport::Messages(messages) => messages,
        SlackExport::History { messages } => messages,
    })
}

/// Join message texts oldest-first, one per line. Messages without text are skipped;
/// messages without a parseable `ts` keep their relative position at the end.
pub fn combine_messages(messages: &[SlackMessage]) -> String {
    let mut with_text: Vec<(usize, &SlackMessage, &str)> = messages
        .iter()
        .enumerate()
        .filter_map(|(i, msg)| {
            let text = msg.text.as_deref()?;
            (!text.trim().is_empty()).then_some((i, msg, text))
        })
        .collect();

    with_text.sort_by(|(ia, a, _), (ib, b, _)| {
        match (ts_seconds(a), ts_seconds(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then(ia.cmp(ib))
    });

    with_text
        .into_iter()
        .map(|(_, _, text)| text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether a chat message asks for an incident report. Case-insensitive.
pub fn is_report_trigger(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRIGGER_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

fn ts_seconds(message: &SlackMessage) -> Option<f64> {
    message.ts.as_deref()?.trim().parse::<f64>().ok()
}
