//! Shared helpers for LLM payload handling and on-disk naming.

use serde_json::Value;

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(close) => after[..close].trim(),
        None => after.trim(),
    }
}

/// Parse an LLM response into a JSON object.
///
/// Strips code fences, then falls back to brace extraction. Anything that is
/// not an object yields `None`.
pub fn parse_llm_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let body = strip_code_fences(raw);
    let parsed = serde_json::from_str::<Value>(body).ok().or_else(|| {
        extract_json_object(body).and_then(|obj| serde_json::from_str::<Value>(&obj).ok())
    })?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Render an arbitrary JSON value as display text, falling back to `default`
/// for empty values and the literal "None".
pub fn safe_str(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() || s == "None" => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(false)) => default.to_string(),
        Some(Value::Object(map)) => {
            let joined = join_values(map.values());
            if joined.is_empty() {
                default.to_string()
            } else {
                joined
            }
        }
        Some(Value::Array(items)) => {
            if items.is_empty() {
                default.to_string()
            } else {
                items.iter().map(value_text).collect::<Vec<_>>().join(" ")
            }
        }
        Some(other) => other.to_string(),
    }
}

/// Same as [`safe_str`] for plain optional strings.
pub fn safe_text(value: Option<&str>, default: &str) -> String {
    match value {
        Some(s) if !s.trim().is_empty() && s != "None" => s.to_string(),
        _ => default.to_string(),
    }
}

/// Space-join the non-empty values of a JSON collection.
pub fn join_values<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .filter(|v| !is_blank(v))
        .map(value_text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// True for null, empty strings, empty containers and the textual
/// placeholders `{}`, `[]` and `null`.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_blank_text(s),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

pub fn is_blank_text(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t == "{}" || t == "[]" || t == "null"
}

/// Reject identifiers and relative paths that could escape a workspace folder.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Folder holding the generated documents of a workspace.
pub fn generated_folder_name(workspace_name: &str) -> String {
    format!("{}_Documentos_Generados", workspace_name).replace(' ', "_")
}

/// Name of the cached extraction text for an uploaded file.
pub fn extraction_cache_name(filename: &str) -> String {
    format!("extraccion_{}.txt", filename)
}

/// Decode uploaded text: UTF-8 first, then Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Last `max` characters of `s`.
pub fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_object_with_prefix() {
        let text = r#"Here is the JSON: {"key": "value"}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"key": "value"}"#.to_string()));
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"{"outer": {"inner": "value"}} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"outer": {"inner": "value"}}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"{"a": "}{", "b": 1}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_object_unclosed() {
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
        assert_eq!(extract_json_object("No JSON here"), None);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_llm_object() {
        let map = parse_llm_object("```json\n{\"rfc\": \"ABC\"}\n```").unwrap();
        assert_eq!(map["rfc"], "ABC");
        let map = parse_llm_object("Sure! {\"rfc\": \"X\"} hope it helps").unwrap();
        assert_eq!(map["rfc"], "X");
        assert!(parse_llm_object("[1, 2]").is_none());
        assert!(parse_llm_object("not json").is_none());
    }

    #[test]
    fn test_safe_str() {
        assert_eq!(safe_str(None, "N/D"), "N/D");
        assert_eq!(safe_str(Some(&json!("None")), "N/D"), "N/D");
        assert_eq!(safe_str(Some(&json!("")), "N/D"), "N/D");
        assert_eq!(safe_str(Some(&json!("ACME")), "N/D"), "ACME");
        assert_eq!(
            safe_str(Some(&json!({"calle": "Juarez", "cp": "01000"})), "N/D"),
            "Juarez 01000"
        );
        assert_eq!(safe_str(Some(&json!(["a", "b"])), "N/D"), "a b");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("{}")));
        assert!(is_blank(&json!("[]")));
        assert!(is_blank(&json!({})));
        assert!(!is_blank(&json!({"a": 1})));
        assert!(!is_blank(&json!(0)));
    }

    #[test]
    fn test_is_safe_segment() {
        assert!(is_safe_segment("ws-1"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(""));
    }

    #[test]
    fn test_generated_folder_name() {
        assert_eq!(
            generated_folder_name("Obra Publica 2024"),
            "Obra_Publica_2024_Documentos_Generados"
        );
    }

    #[test]
    fn test_decode_text_falls_back_to_latin1() {
        assert_eq!(decode_text("año".as_bytes()), "año");
        assert_eq!(decode_text(&[0x61, 0xf1, 0x6f]), "año");
    }

    #[test]
    fn test_truncate_and_tail_chars() {
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ñandú", 2), "dú");
        assert_eq!(tail_chars("ab", 5), "ab");
    }
}
