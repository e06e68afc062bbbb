//! crates/grammar_drill_core/src/repair.rs
//!
//! Whole-response parsing for non-streamed completions. The model's JSON is
//! patched for the mistakes it commonly makes before being handed to
//! `serde_json`.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array span pattern is valid"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]}])").expect("trailing comma pattern is valid"));
static GLUED_OBJECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\{").expect("glued objects pattern is valid"));

/// The model's output could not be reduced to the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("No JSON array found in response")]
    NoArray,
    #[error("No JSON object found in response")]
    NoObject,
    #[error("Response is not an array")]
    NotArray,
    #[error("First item is not a table")]
    MissingTable,
    #[error("No exercises found in response")]
    NoExercises,
    #[error("Invalid JSON in response: {0}")]
    Invalid(String),
}

/// Parses the first top-level JSON object in `text`.
///
/// Plain JSON is parsed directly; otherwise the span from the first `{` to
/// the last `}` is tried, which covers code fences and leading prose.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    let text = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Ok(map);
    }

    let start = text.find('{').ok_or(ExtractionError::NoObject)?;
    let end = text.rfind('}').ok_or(ExtractionError::NoObject)?;
    if end <= start {
        return Err(ExtractionError::NoObject);
    }

    let repaired = repair(&text[start..=end]);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ExtractionError::NoObject),
        Err(e) => Err(ExtractionError::Invalid(e.to_string())),
    }
}

/// Parses the outermost `[...]` span of `text` as a JSON array, after
/// removing trailing commas, separating glued objects and dropping line
/// breaks.
pub fn parse_item_array(text: &str) -> Result<Vec<Value>, ExtractionError> {
    let span = ARRAY_SPAN
        .find(text)
        .ok_or(ExtractionError::NoArray)?
        .as_str();

    match serde_json::from_str::<Value>(&repair(span)) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(ExtractionError::NotArray),
        Err(e) => Err(ExtractionError::Invalid(e.to_string())),
    }
}

fn repair(json: &str) -> String {
    let without_trailing = TRAILING_COMMA.replace_all(json, "$1");
    let separated = GLUED_OBJECTS.replace_all(&without_trailing, "},{");
    separated.replace(['\n', '\r'], "").trim().to_string()
}
