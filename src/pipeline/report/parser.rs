//! Response parser: untrusted model text → fully typed `IncidentReport`.
//!
//! Three stages, each with its own failure:
//! 1. locate the outermost balanced `{...}` span (prose and code fences around
//!    it are ignored) → `NoJsonObject`
//! 2. decode it, retrying once on a quote/trailing-comma normalized copy
//!    → `MalformedJson` (position refers to the located span)
//! 3. coerce field by field → `MissingField` / `WrongType`
//!
//! Element policy for `timeline` and `action_items`: an element that is not an
//! object, or lacks a description, is dropped and counted in `Omissions`; the
//! rest of the report survives. Unknown keys are ignored. Unrecognized
//! severities pass through verbatim; unrecognized priorities become `medium`.

use serde_json::error::Category;
use serde_json::{Map, Value};

use super::repair::normalize_json;
use super::types::{
    ActionItem, IncidentReport, Omissions, ParsedReport, Priority, Severity, TimelineEvent,
};
use super::{ParseError, ParseFailure};

type Object = Map<String, Value>;

const TIMELINE_DESCRIPTION_KEYS: &[&str] = &["description", "event_description", "event"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time"];
const ACTION_DESCRIPTION_KEYS: &[&str] = &["description", "task", "action"];
const ASSIGNEE_KEYS: &[&str] = &["assignee", "assigned_to", "owner"];
const COMPLETION_KEYS: &[&str] = &["estimated_completion", "due_date"];

/// Parse a raw model response into a validated report.
pub fn parse_report_response(raw_response: &str) -> Result<ParsedReport, ParseError> {
    let span = locate_json_object(raw_response)
        .ok_or_else(|| ParseError::new(ParseFailure::NoJsonObject, raw_response))?;

    let (value, normalized) =
        decode_lenient(span).map_err(|failure| ParseError::new(failure, raw_response))?;

    let Value::Object(object) = value else {
        return Err(ParseError::new(
            ParseFailure::WrongType {
                field: "<root>",
                expected: "object",
            },
            raw_response,
        ));
    };

    let (report, omissions) =
        coerce_report(&object).map_err(|failure| ParseError::new(failure, raw_response))?;

    Ok(ParsedReport {
        report,
        omissions,
        normalized,
    })
}

/// Find the first `{` and its matching `}`, skipping braces inside strings.
///
/// Single-quoted strings are recognized where a JSON value or key may start,
/// so that normalization can still rescue them later.
pub fn locate_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev_significant = '{';

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
                prev_significant = c;
            }
            continue;
        }

        match c {
            '"' => quote = Some('"'),
            '\'' if matches!(prev_significant, '{' | '[' | ',' | ':') => quote = Some('\''),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }

        if !c.is_whitespace() {
            prev_significant = c;
        }
    }

    None
}

/// Strict decode first; one normalized retry; report the strict error on failure.
fn decode_lenient(span: &str) -> Result<(Value, bool), ParseFailure> {
    let strict_err = match serde_json::from_str::<Value>(span) {
        Ok(value) => return Ok((value, false)),
        Err(e) => e,
    };

    if let Some(normalized) = normalize_json(span) {
        if let Ok(value) = serde_json::from_str::<Value>(&normalized) {
            tracing::debug!("Model response decoded after JSON normalization");
            return Ok((value, true));
        }
    }

    let detail = match strict_err.classify() {
        Category::Eof => "unexpected end of input",
        Category::Syntax => "syntax error",
        Category::Data => "invalid data",
        Category::Io => "read error",
    };
    Err(ParseFailure::MalformedJson {
        line: strict_err.line(),
        column: strict_err.column(),
        detail: detail.to_string(),
    })
}

fn coerce_report(object: &Object) -> Result<(IncidentReport, Omissions), ParseFailure> {
    let mut omissions = Omissions::default();

    let report = IncidentReport {
        incident_id: optional_prose(object, "incident_id")?,
        title: required_text(object, "title")?,
        executive_summary: required_text(object, "executive_summary")?,
        affected_systems: string_list(object, "affected_systems", &mut omissions.affected_systems)?,
        timeline: object_list(object, "timeline", timeline_event, &mut omissions.timeline_events)?,
        root_cause_hypothesis: prose(object, "root_cause_hypothesis")?,
        impact_assessment: prose(object, "impact_assessment")?,
        resolution_summary: prose(object, "resolution_summary")?,
        action_items: object_list(object, "action_items", action_item, &mut omissions.action_items)?,
        related_incidents: string_list(
            object,
            "related_incidents",
            &mut omissions.related_incidents,
        )?,
    };

    Ok((report, omissions))
}

fn timeline_event(object: &Object) -> Option<TimelineEvent> {
    let description = lookup_text(object, TIMELINE_DESCRIPTION_KEYS)?;
    Some(TimelineEvent {
        timestamp: lookup_text(object, TIMESTAMP_KEYS).unwrap_or_default(),
        description,
        severity: lookup_text(object, &["severity"]).and_then(|s| Severity::parse(&s)),
    })
}

fn action_item(object: &Object) -> Option<ActionItem> {
    let description = lookup_text(object, ACTION_DESCRIPTION_KEYS)?;
    Some(ActionItem {
        description,
        priority: Priority::parse_or_default(lookup_text(object, &["priority"]).as_deref()),
        assignee: lookup_text(object, ASSIGNEE_KEYS),
        estimated_completion: lookup_text(object, COMPLETION_KEYS),
    })
}

/// First present, non-null value among `keys`.
fn lookup<'a>(object: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// Element-level lookup: non-empty scalar text or nothing.
fn lookup_text(object: &Object, keys: &[&str]) -> Option<String> {
    lookup(object, keys)
        .and_then(scalar_text)
        .filter(|text| !text.is_empty())
}

/// Strings are trimmed; numbers and booleans are stringified; containers yield `None`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(object: &Object, field: &'static str) -> Result<String, ParseFailure> {
    let value = lookup(object, &[field]).ok_or(ParseFailure::MissingField(field))?;
    let text = scalar_text(value).ok_or(ParseFailure::WrongType {
        field,
        expected: "string",
    })?;
    if text.is_empty() {
        return Err(ParseFailure::MissingField(field));
    }
    Ok(text)
}

fn optional_prose(object: &Object, field: &'static str) -> Result<Option<String>, ParseFailure> {
    let text = prose(object, field)?;
    Ok((!text.is_empty()).then_some(text))
}

fn prose(object: &Object, field: &'static str) -> Result<String, ParseFailure> {
    match lookup(object, &[field]) {
        None => Ok(String::new()),
        Some(value) => scalar_text(value).ok_or(ParseFailure::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn string_list(
    object: &Object,
    field: &'static str,
    omitted: &mut usize,
) -> Result<Vec<String>, ParseFailure> {
    match lookup(object, &[field]) {
        None => Ok(Vec::new()),
        // A lone string where a list was expected is a one-element list.
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match scalar_text(item).filter(|t| !t.is_empty()) {
                    Some(text) => out.push(text),
                    None => *omitted += 1,
                }
            }
            Ok(out)
        }
        Some(_) => Err(ParseFailure::WrongType {
            field,
            expected: "array of strings",
        }),
    }
}

fn object_list<T>(
    object: &Object,
    field: &'static str,
    parse_element: fn(&Object) -> Option<T>,
    omitted: &mut usize,
) -> Result<Vec<T>, ParseFailure> {
    match lookup(object, &[field]) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_object().and_then(parse_element) {
                    Some(element) => out.push(element),
                    None => *omitted += 1,
                }
            }
            Ok(out)
        }
        Some(_) => Err(ParseFailure::WrongType {
            field,
            expected: "array of objects",
        }),
    }
}
