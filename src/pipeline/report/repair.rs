// Best-effort normalization of almost-JSON emitted by language models.
// Handles the two defects seen in practice: single-quoted strings and trailing
// commas. One linear pass; the caller decodes the result at most once.

/// Rewrite single-quoted strings as double-quoted and drop trailing commas.
///
/// Returns `None` when nothing needed rewriting, so the caller can skip a
/// pointless second decode.
pub fn normalize_json(input: &str) -> Option<String> {
    let chars: Vec<char> = input.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(input.len() + 8);
    let mut changed = false;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        match c {
            '"' => {
                out.push(c);
                i += 1;
                while i < n {
                    let d = chars[i];
                    out.push(d);
                    i += 1;
                    if d == '\\' {
                        if i < n {
                            out.push(chars[i]);
                            i += 1;
                        }
                    } else if d == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                changed = true;
                out.push('"');
                i += 1;
                while i < n {
                    let d = chars[i];
                    i += 1;
                    match d {
                        '\\' if i < n => {
                            let escaped = chars[i];
                            i += 1;
                            if escaped == '\'' {
                                out.push('\'');
                            } else {
                                out.push('\\');
                                out.push(escaped);
                            }
                        }
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        _ => out.push(d),
                    }
                }
                out.push('"');
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    changed = true;
                } else {
                    out.push(c);
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    changed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decodes(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn strict_json_is_left_alone() {
        assert_eq!(normalize_json(r#"{"a": [1, 2], "b": "x, }"}"#), None);
    }

    #[test]
    fn removes_trailing_commas() {
        let fixed = normalize_json("{\"a\": [1, 2,], \"b\": 3,\n}").unwrap();
        assert_eq!(decodes(&fixed), serde_json::json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn converts_single_quoted_strings() {
        let fixed = normalize_json("{'title': 'DB \"primary\" down', 'n': 1}").unwrap();
        assert_eq!(
            decodes(&fixed),
            serde_json::json!({"title": "DB \"primary\" down", "n": 1})
        );
    }

    #[test]
    fn unescapes_escaped_apostrophes() {
        let fixed = normalize_json(r"{'title': 'it\'s down'}").unwrap();
        assert_eq!(decodes(&fixed)["title"], "it's down");
    }

    #[test]
    fn apostrophes_inside_double_quotes_are_untouched() {
        let input = r#"{"title": "on-call's pager",}"#;
        let fixed = normalize_json(input).unwrap();
        assert_eq!(decodes(&fixed)["title"], "on-call's pager");
    }

    #[test]
    fn commas_inside_strings_are_kept() {
        let fixed = normalize_json(r#"{"a": "x,]", "b": [1,],}"#).unwrap();
        assert_eq!(decodes(&fixed)["a"], "x,]");
    }

    #[test]
    fn unterminated_single_quote_terminates() {
        let fixed = normalize_json("{'title': 'never closed").unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&fixed).is_err());
    }
}
