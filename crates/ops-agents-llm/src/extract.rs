//! Tolerant JSON extraction from model output
//!
//! Models wrap structured output in prose, markdown fences, or both. The
//! extractor strips fences, locates the outermost JSON object or array, and
//! only then strict-parses. Failures come back as error values.

use serde_json::Value;

use ops_agents_core::{AgentError, Result};

/// Extract the first JSON object from a model response.
pub fn extract_json(content: &str) -> Result<Value> {
    extract_delimited(content, '{', '}')
}

/// Extract the first JSON array from a model response.
pub fn extract_json_array(content: &str) -> Result<Value> {
    extract_delimited(content, '[', ']')
}

/// Extract and deserialize in one step.
pub fn extract_json_as<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let value = extract_json(content)?;
    serde_json::from_value(value).map_err(AgentError::from)
}

fn extract_delimited(content: &str, open: char, close: char) -> Result<Value> {
    let stripped = strip_code_fences(content);

    // Direct parse first: covers responses that are exactly the JSON body.
    if let Ok(value) = serde_json::from_str::<Value>(stripped.trim()) {
        if matches_delimiter(&value, open) {
            return Ok(value);
        }
    }

    let candidate = outermost_span(&stripped, open, close).ok_or_else(|| {
        AgentError::Schema(format!(
            "no JSON {} found in model output",
            if open == '{' { "object" } else { "array" }
        ))
    })?;

    serde_json::from_str(candidate)
        .map_err(|e| AgentError::Schema(format!("model output is not valid JSON: {e}")))
}

fn matches_delimiter(value: &Value, open: char) -> bool {
    match open {
        '{' => value.is_object(),
        '[' => value.is_array(),
        _ => false,
    }
}

/// Remove markdown code fences, keeping their inner text. Handles both
/// ```json and bare ``` fences, closed or dangling.
fn strip_code_fences(content: &str) -> String {
    if !content.contains("```") {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Find the outermost balanced span starting at the first `open` delimiter.
/// String literals and escapes are honored so braces inside values do not
/// unbalance the scan.
fn outermost_span(content: &str, open: char, close: char) -> Option<&str> {
    let start = content.find(open)?;
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        let i = start + offset;
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = i + ch.len_utf8();
                    debug_assert!(end <= bytes.len());
                    return Some(&content[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_object() {
        let value = extract_json(r#"{"severity": "high"}"#).unwrap();
        assert_eq!(value["severity"], "high");
    }

    #[test]
    fn test_fenced_object() {
        let content = "Here is the triage:\n```json\n{\"severity\": \"critical\", \"symptoms\": [\"timeouts\"]}\n```\nLet me know.";
        let value = extract_json(content).unwrap();
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["symptoms"][0], "timeouts");
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let content = r#"Based on the alarms, {"action": "prune", "confidence": 20} is my verdict."#;
        let value = extract_json(content).unwrap();
        assert_eq!(value["action"], "prune");
    }

    #[test]
    fn test_braces_inside_strings() {
        let content = r#"{"statement": "pool {exhausted}", "priority": 1}"#;
        let value = extract_json(content).unwrap();
        assert_eq!(value["statement"], "pool {exhausted}");
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let content = r#"{"reasoning": "the log says \"OOMKilled\" twice"}"#;
        let value = extract_json(content).unwrap();
        assert!(value["reasoning"].as_str().unwrap().contains("OOMKilled"));
    }

    #[test]
    fn test_array_extraction() {
        let content = "```\n[{\"id\": 1}, {\"id\": 2}]\n```";
        let value = extract_json_array(content).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_no_json_is_schema_error() {
        let err = extract_json("I could not produce a verdict.").unwrap_err();
        assert!(matches!(err, AgentError::Schema(_)));
    }

    #[test]
    fn test_unbalanced_json_is_schema_error() {
        let err = extract_json(r#"{"severity": "high""#).unwrap_err();
        assert!(matches!(err, AgentError::Schema(_)));
    }

    #[test]
    fn test_extract_as_typed() {
        #[derive(serde::Deserialize)]
        struct Verdict {
            action: String,
        }
        let verdict: Verdict = extract_json_as(r#"{"action": "confirm"}"#).unwrap();
        assert_eq!(verdict.action, "confirm");
    }

    #[test]
    fn test_nested_fence_with_language_tag() {
        let content = "```json\n{\"a\": {\"b\": [1, 2, 3]}}\n```";
        let value = extract_json(content).unwrap();
        assert_eq!(value["a"]["b"][2], 3);
    }
}
