use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonExtractError {
    #[error("model output contains no JSON object")]
    NotAnObject,
    #[error("model output is not valid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Recover the JSON object a model answered with, tolerating prose or code
/// fences around it.
///
/// Tries the span from the first `{` to the last `}` first, then the whole
/// trimmed text. The span is not nesting-aware: two separate objects in one
/// answer produce an invalid span and fall through to the whole-text attempt.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, JsonExtractError> {
    let trimmed = raw.trim();

    let span_error = match brace_span(trimmed) {
        Some(span) => match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => None,
            Err(err) => Some(err),
        },
        None => None,
    };

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(JsonExtractError::NotAnObject),
        Err(err) => Err(span_error.unwrap_or(err).into()),
    }
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object_parses() {
        let map = extract_object(r#"{"title": "Skyline Heights", "minPrice": 85}"#).unwrap();
        assert_eq!(map["title"], json!("Skyline Heights"));
        assert_eq!(map["minPrice"], json!(85));
    }

    #[test]
    fn prose_and_fences_are_ignored() {
        let raw = "Sure! Here is the data you asked for:\n```json\n{\"status\": \"Launch\", \"areas\": [\"1200 sqft\"]}\n```\nLet me know if you need more.";
        let map = extract_object(raw).unwrap();
        assert_eq!(map["status"], json!("Launch"));
        assert_eq!(map["areas"], json!(["1200 sqft"]));
    }

    #[test]
    fn nested_objects_survive_the_span() {
        let raw = r#"Result: {"features": {"Amenities": ["Pool", "Gym"]}, "faqs": [{"questions": "Q?", "answer": "A."}]} done"#;
        let map = extract_object(raw).unwrap();
        assert_eq!(map["features"]["Amenities"][1], json!("Gym"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let inputs = [
            r#"{"a": 1, "b": {"c": [1, 2, 3]}}"#,
            "Here you go: {\"title\": \"Orchid Villas\", \"bedrooms\": [\"3 BHK\"]} -- end",
            "```\n{\"x\": null}\n```",
        ];
        for input in inputs {
            let first = extract_object(input).unwrap();
            let reserialized = serde_json::to_string(&Value::Object(first.clone())).unwrap();
            let second = extract_object(&reserialized).unwrap();
            assert_eq!(first, second, "input: {input}");
        }
    }

    #[test]
    fn trailing_comma_is_rejected() {
        let raw = "{\"title\": \"Skyline\", \"status\": \"Launch\",}";
        assert!(matches!(
            extract_object(raw),
            Err(JsonExtractError::Invalid(_))
        ));
    }

    #[test]
    fn text_without_braces_fails() {
        assert!(extract_object("I could not find any project details.").is_err());
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            extract_object("[1, 2, 3]"),
            Err(JsonExtractError::NotAnObject)
        ));
    }
}
