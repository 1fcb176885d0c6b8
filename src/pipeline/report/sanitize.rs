// Input checks and cleanup applied to incident notes before they reach the prompt.
// Removes invisible Unicode and control characters, strips the prompt's own
// delimiter tags, normalizes line endings and blank-line runs. Indentation is
// preserved (stack traces, YAML snippets).

use super::ExtractionError;

/// Default maximum input size in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 100_000;

/// Reject empty or oversized input. No network call may happen after an `Err`.
pub fn validate_input(raw: &str, max_chars: usize) -> Result<(), ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::Input(
            "incident notes are empty; provide ticket notes, logs or chat messages to analyze"
                .into(),
        ));
    }

    let char_count = raw.chars().count();
    if char_count > max_chars {
        return Err(ExtractionError::Input(format!(
            "incident notes are too long ({char_count} characters, maximum is {max_chars})"
        )));
    }

    Ok(())
}

/// Tag name wrapping the notes inside the prompt.
pub(crate) const NOTES_TAG: &str = "incident_notes";

/// Clean incident notes for LLM consumption. Never truncates.
pub fn sanitize_incident_text(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (cleaned, removed) = remove_delimiter_tags(&cleaned);
    if removed > 0 {
        tracing::warn!(
            removed_lines = removed,
            "Removed notes-delimiter tags from incident text"
        );
    }
    normalize_whitespace(&cleaned)
}

/// Drop lines that open or close the notes block; escape tags found mid-line.
/// Returns (cleaned_text, removed_line_count).
fn remove_delimiter_tags(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0usize;

    for line in text.lines() {
        if is_delimiter_tag(&line.trim_start().to_ascii_lowercase()) {
            removed += 1;
            continue;
        }
        kept.push(escape_delimiter_tags(line));
    }

    (kept.join("\n"), removed)
}

fn is_delimiter_tag(trimmed_lower: &str) -> bool {
    trimmed_lower.strip_prefix('<').is_some_and(names_notes_tag)
}

/// `after_lt` is the text following a `<`; true for `incident_notes` or `/incident_notes`.
fn names_notes_tag(after_lt: &str) -> bool {
    let rest = after_lt.trim_start();
    rest.strip_prefix('/').unwrap_or(rest).trim_start().starts_with(NOTES_TAG)
}

/// Replace the `<` of any `<incident_notes` / `</incident_notes` (any case) with `&lt;`.
fn escape_delimiter_tags(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    let mut out = String::with_capacity(line.len());
    let mut last = 0;

    for (pos, _) in lower.match_indices('<') {
        if names_notes_tag(&lower[pos + 1..]) {
            out.push_str(&line[last..pos]);
            out.push_str("&lt;");
            last = pos + 1;
        }
    }
    out.push_str(&line[last..]);
    out
}

/// Remove zero-width, bidi-override and C0/C1 control characters.
/// Keeps space, tab, and line breaks.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

/// Trim line ends, collapse runs of blank lines, drop leading/trailing blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = false;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() {
            if !prev_blank {
                lines.push("");
                prev_blank = true;
            }
        } else {
            lines.push(trimmed);
            prev_blank = false;
        }
    }

    while lines.first() == Some(&"") {
        lines.remove(0);
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}
