//! Pull the JSON payload out of a free-text model reply.
//!
//! Models wrap JSON in prose or code fences, so the reply is searched for the
//! outermost `{...}` or `[...]` span (first opening bracket to last closing one).

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::errors::GatewayError;

static OBJECT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern compiles"));

static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern compiles"));

pub fn object_span(text: &str) -> Option<&str> {
    OBJECT_SPAN.find(text).map(|m| m.as_str())
}

pub fn array_span(text: &str) -> Option<&str> {
    ARRAY_SPAN.find(text).map(|m| m.as_str())
}

/// Parse the object span of `text` as `T`
pub fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    let span = object_span(text).ok_or_else(|| {
        GatewayError::Serde("Could not extract valid JSON from AI response".to_string())
    })?;
    serde_json::from_str(span).map_err(|e| GatewayError::Serde(e.to_string()))
}

/// Parse the array span of `text` as `Vec<T>`
pub fn parse_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, GatewayError> {
    let span = array_span(text).ok_or_else(|| {
        GatewayError::Serde("Could not extract a JSON array from AI response".to_string())
    })?;
    serde_json::from_str(span).map_err(|e| GatewayError::Serde(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn object_inside_code_fence() {
        let reply = "Here you go:\n```json\n{\"medicines\": [{\"name\": \"Aspirin\"}]}\n```";

        let value: Value = parse_object(reply).unwrap();
        assert_eq!(value["medicines"][0]["name"], "Aspirin");
    }

    #[test]
    fn array_spans_lines() {
        let reply = "Suggestions:\n[\n  \"Amoxicillin\",\n  \"Amlodipine\"\n]\nDone.";

        let names: Vec<String> = parse_array(reply).unwrap();
        assert_eq!(names, vec!["Amoxicillin", "Amlodipine"]);
    }

    #[test]
    fn missing_span_is_a_serde_error() {
        let err = parse_object::<Value>("I could not read the image").unwrap_err();
        assert!(matches!(err, GatewayError::Serde(_)));
        assert_eq!(array_span("no brackets"), None);
    }
}
