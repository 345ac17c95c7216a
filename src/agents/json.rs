// Lenient JSON extraction from model responses

use serde_json::{Map, Value};

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix("```json") {
        rest
    } else if let Some(rest) = s.strip_prefix("```") {
        rest
    } else {
        s
    };
    if let Some(rest) = s.strip_suffix("```") {
        rest.trim()
    } else {
        s.trim()
    }
}

/// Parse a JSON object out of a model response.
///
/// Models are asked for a bare object but sometimes wrap it in fences or
/// surround it with prose. Returns `None` when no object can be recovered.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let stripped = strip_markdown_fences(text);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stripped) {
        return Some(map);
    }

    // Try the outermost braces within the text
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Non-empty trimmed string value for `key`.
pub fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Render a scalar JSON value as a plain string (strings unquoted).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown_fences_json() {
        let s = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_markdown_fences(s), "{\"a\":1}");
    }

    #[test]
    fn test_strip_markdown_fences_plain() {
        let s = "```\n{\"a\":1}\n```";
        assert_eq!(strip_markdown_fences(s), "{\"a\":1}");
    }

    #[test]
    fn test_strip_markdown_fences_no_fences() {
        assert_eq!(strip_markdown_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_object_with_surrounding_prose() {
        let map = parse_json_object("Sure! Here it is: {\"winner\": \"Model\"} Hope that helps.")
            .unwrap();
        assert_eq!(map["winner"], "Model");
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        assert!(parse_json_object("[1, 2, 3]").is_none());
        assert!(parse_json_object("not json at all").is_none());
        assert!(parse_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_non_empty_str() {
        let map = parse_json_object(r#"{"a": "  ", "b": " x ", "c": 3}"#).unwrap();
        assert_eq!(non_empty_str(&map, "a"), None);
        assert_eq!(non_empty_str(&map, "b"), Some("x"));
        assert_eq!(non_empty_str(&map, "c"), None);
        assert_eq!(non_empty_str(&map, "missing"), None);
    }
}
