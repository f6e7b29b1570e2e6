use serde_json::Value as JsonValue;

use super::{ExtractionError, Fields};

/// Parses model output into a field map.
///
/// Surrounding whitespace and a Markdown code fence (with or without a `json` tag) are
/// stripped first. Anything that is not a single JSON object is malformed.
pub fn parse_fields(raw: &str) -> Result<Fields, ExtractionError> {
    let body = strip_code_fence(raw.trim());

    let value: JsonValue =
        serde_json::from_str(body).map_err(|err| ExtractionError::MalformedOutput {
            reason: err.to_string(),
        })?;

    match value {
        JsonValue::Object(fields) => Ok(fields),
        other => Err(ExtractionError::MalformedOutput {
            reason: format!("expected a JSON object, got {}", json_type_name(&other)),
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    rest.trim()
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_fields_accepts_bare_object() {
        let fields = parse_fields(r#"{"species_name":"Pikachu","level":50}"#).expect("parse");
        assert_eq!(fields["species_name"], json!("Pikachu"));
        assert_eq!(fields["level"], json!(50));
    }

    #[test]
    fn parse_fields_strips_tagged_code_fence() {
        let raw = "```json\n{\"species_name\": \"Mew\"}\n```";
        let fields = parse_fields(raw).expect("parse");
        assert_eq!(fields["species_name"], json!("Mew"));
    }

    #[test]
    fn parse_fields_strips_untagged_code_fence() {
        let raw = "  ```\n{\"level\": 7}\n```  ";
        let fields = parse_fields(raw).expect("parse");
        assert_eq!(fields["level"], json!(7));
    }

    #[test]
    fn parse_fields_rejects_prose() {
        let err = parse_fields("I could not read this screen.").expect_err("prose");
        assert!(matches!(err, ExtractionError::MalformedOutput { .. }));
    }

    #[test]
    fn parse_fields_rejects_non_object_json() {
        let err = parse_fields("[1, 2, 3]").expect_err("array");
        assert!(matches!(err, ExtractionError::MalformedOutput { .. }));
    }
}
