// JSON block parser - pulls the JSON object out of prose-wrapped model replies

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for JSON extraction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonExtractError {
    #[error("No JSON object found in response")]
    NoObject,

    #[error("JSON object did not match expected shape: {0}")]
    Shape(String),
}

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)```").expect("valid fenced block regex")
    })
}

/// Extract fenced code blocks (```json ... ``` or bare ``` ... ```)
pub fn extract_fenced_blocks(content: &str) -> Vec<String> {
    fenced_block_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Return the balanced `{...}` span starting at byte offset `start`.
///
/// Braces inside JSON string literals (including escaped quotes) are ignored.
fn balanced_object_at(content: &str, start: usize) -> Option<&str> {
    let bytes = content.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// All top-level balanced `{...}` spans in order of appearance
pub fn balanced_objects(content: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = content[cursor..].find('{') {
        let start = cursor + rel;
        match balanced_object_at(content, start) {
            Some(span) => {
                spans.push(span);
                cursor = start + span.len();
            }
            None => cursor = start + 1,
        }
    }

    spans
}

/// Find the first JSON object in a model reply.
///
/// Fenced blocks are tried first, then every balanced `{...}` span in the
/// raw text. The first candidate that parses as a JSON object wins.
pub fn find_json_object(content: &str) -> Option<Value> {
    let fenced = extract_fenced_blocks(content);
    let fenced_spans = fenced.iter().flat_map(|block| balanced_objects(block));

    fenced_spans
        .chain(balanced_objects(content))
        .filter_map(|span| serde_json::from_str::<Value>(span).ok())
        .find(|value| value.is_object())
}

/// Extract and deserialize the first JSON object in a model reply
pub fn parse_json_object<T: DeserializeOwned>(content: &str) -> Result<T, JsonExtractError> {
    let value = find_json_object(content).ok_or(JsonExtractError::NoObject)?;
    serde_json::from_value(value).map_err(|e| JsonExtractError::Shape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let value = find_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_wrapping_variants_parse_identically() {
        let body = r#"{"enoughToStop": false, "identity": "Covered"}"#;
        let bare = find_json_object(body).unwrap();
        let fenced = find_json_object(&format!("```json\n{}\n```", body)).unwrap();
        let prose = find_json_object(&format!("here you go: {}", body)).unwrap();
        let padded = find_json_object(&format!("\n\n   {}   \n", body)).unwrap();

        assert_eq!(bare, fenced);
        assert_eq!(bare, prose);
        assert_eq!(bare, padded);
    }

    #[test]
    fn test_trailing_commentary_ignored() {
        let content = r#"Sure! {"name": "Ana", "tags": ["a", "b"]} Let me know if you want changes {or not}."#;
        let value = find_json_object(content).unwrap();
        assert_eq!(value["name"], "Ana");
    }

    #[test]
    fn test_braces_inside_strings() {
        let content = r#"{"quote": "she said \"{hi}\" loudly", "n": 2}"#;
        let value = find_json_object(content).unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_nested_objects_kept_whole() {
        let content = r#"result: {"bigFive": {"openness": 80}, "name": "Bo"} done"#;
        let spans = balanced_objects(content);
        assert_eq!(spans.len(), 1);
        let value = find_json_object(content).unwrap();
        assert_eq!(value["bigFive"]["openness"], 80);
    }

    #[test]
    fn test_skips_non_json_braces() {
        let content = r#"Template {name} filled: {"name": "Kim"}"#;
        let value = find_json_object(content).unwrap();
        assert_eq!(value["name"], "Kim");
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert!(find_json_object(r#"{"name": "cut off"#).is_none());
        assert!(find_json_object("no json here").is_none());
    }

    #[test]
    fn test_parse_json_object_errors() {
        #[derive(serde::Deserialize, Debug)]
        struct Needs {
            #[allow(dead_code)]
            required: u32,
        }

        assert_eq!(
            parse_json_object::<Needs>("nothing").unwrap_err(),
            JsonExtractError::NoObject
        );
        assert!(matches!(
            parse_json_object::<Needs>(r#"{"other": 1}"#),
            Err(JsonExtractError::Shape(_))
        ));
    }
}
