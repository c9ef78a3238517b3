//! Structured output parsing for LLM responses
//! Pulls the first well-formed JSON object out of free-form model text.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// First JSON object in `text` that parses, skipping prose, code fences and
/// malformed candidates that precede it.
pub fn first_json_object(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, ch)| *ch == '{')
        .filter_map(|(start, _)| extract_json_object(&text[start..]))
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        })
}

/// Deserialize the first JSON object in `text` into `T`.
pub fn parse_first<T: DeserializeOwned>(text: &str) -> Option<T> {
    first_json_object(text).and_then(|value| serde_json::from_value(value).ok())
}

/// Extract a complete JSON object starting with "{"
fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
