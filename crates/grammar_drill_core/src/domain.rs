//! crates/grammar_drill_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Nothing in here knows about HTTP, WebSockets or a particular LLM vendor.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The two grammatical areas a learner can practise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarDomain {
    /// Verb conjugation.
    Verb,
    /// Adjective declension.
    Adjective,
}

impl GrammarDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrammarDomain::Verb => "verb",
            GrammarDomain::Adjective => "adjective",
        }
    }
}

impl fmt::Display for GrammarDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrammarDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verb" | "verbs" => Ok(GrammarDomain::Verb),
            "adjective" | "adjectives" => Ok(GrammarDomain::Adjective),
            other => Err(format!("unknown grammar domain '{}'", other)),
        }
    }
}

/// A single fill-in-the-blank exercise as produced by the generator.
///
/// Which tags are present depends on the domain: verb exercises carry
/// `tense`, `person` and `mood`; adjective exercises carry `case`, `gender`
/// and `article_type`. `number` is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub sentence: String,
    pub answer: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub explanation: String,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub tense: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub person: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub case: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub number: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub article_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub mood: Option<String>,
}

impl Exercise {
    /// Decodes an exercise from a JSON value produced by the model.
    ///
    /// Accepts both the bare exercise object and the `{"type": "exercise",
    /// "data": {...}}` wrapper. Returns `None` for anything that does not
    /// carry a non-empty `sentence` and `answer` (e.g. a table row).
    pub fn from_value(value: &Value) -> Option<Self> {
        let inner = match value.get("data") {
            Some(data) if value.get("type").and_then(Value::as_str) == Some("exercise") => data,
            _ => value,
        };
        let exercise: Exercise = serde_json::from_value(inner.clone()).ok()?;
        if exercise.sentence.trim().is_empty() || exercise.answer.trim().is_empty() {
            return None;
        }
        Some(exercise)
    }
}

/// Tags are free text, but the model sometimes writes `"person": 1` or a
/// bool. Scalars keep their JSON spelling; arrays, objects and null count as
/// absent.
fn lenient_tag<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_tag(deserializer)?.unwrap_or_default())
}

/// The user-facing state of one exercise. Wraps the immutable `Exercise`
/// together with the transient fields the UI needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExerciseAttempt {
    pub exercise: Exercise,
    pub submitted: Option<String>,
    pub correct: Option<bool>,
    pub revealed: bool,
}

impl ExerciseAttempt {
    pub fn new(exercise: Exercise) -> Self {
        Self {
            exercise,
            submitted: None,
            correct: None,
            revealed: false,
        }
    }
}

/// A conjugation or declension table. Passed through to the display layer
/// untouched; the only guarantee is that it is a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTable(pub Map<String, Value>);

impl ReferenceTable {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for ReferenceTable {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(ReferenceTable(map)),
            other => Err(other),
        }
    }
}

/// One event of a Generation Result.
///
/// The wire names (`tables`, `exercise`, `complete`, `error`) are what the
/// browser client switches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GenerationEvent {
    #[serde(rename = "tables")]
    Table(ReferenceTable),
    Exercise(Exercise),
    Complete { message: String },
    Error { message: String },
}

impl GenerationEvent {
    /// `true` for the two events that end a Generation Result.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationEvent::Complete { .. } | GenerationEvent::Error { .. }
        )
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the chat-completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Whether the backend must answer with a single JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exercise_is_unwrapped_from_typed_envelope() {
        let value = json!({
            "type": "exercise",
            "data": {"sentence": "Ich ___ nach Hause.", "answer": "gehe", "tense": "Präsens"}
        });
        let exercise = Exercise::from_value(&value).expect("exercise");
        assert_eq!(exercise.answer, "gehe");
        assert_eq!(exercise.tense.as_deref(), Some("Präsens"));
        assert!(exercise.explanation.is_empty());
    }

    #[test]
    fn table_rows_are_not_exercises() {
        let row = json!({"ich": "gehe", "du": "gehst"});
        assert!(Exercise::from_value(&row).is_none());
        let blank = json!({"sentence": "  ", "answer": "x"});
        assert!(Exercise::from_value(&blank).is_none());
    }

    #[test]
    fn scalar_tags_are_kept_as_text() {
        let value = json!({
            "sentence": "Ich ___ heim.",
            "answer": "gehe",
            "person": 1,
            "number": "singular",
            "mood": true,
            "case": {"unexpected": "object"},
            "explanation": 42
        });
        let exercise = Exercise::from_value(&value).expect("exercise");
        assert_eq!(exercise.person.as_deref(), Some("1"));
        assert_eq!(exercise.number.as_deref(), Some("singular"));
        assert_eq!(exercise.mood.as_deref(), Some("true"));
        assert_eq!(exercise.case, None);
        assert_eq!(exercise.explanation, "42");
        assert_eq!(exercise.tense, None);
    }

    #[test]
    fn events_use_client_wire_names() {
        let table = ReferenceTable::try_from(json!({"present": {"ich": "gehe"}})).unwrap();
        let encoded = serde_json::to_value(GenerationEvent::Table(table)).unwrap();
        assert_eq!(encoded["type"], "tables");
        assert_eq!(encoded["data"]["present"]["ich"], "gehe");

        let done = serde_json::to_value(GenerationEvent::Complete {
            message: "ok".into(),
        })
        .unwrap();
        assert_eq!(done, json!({"type": "complete", "data": {"message": "ok"}}));
    }

    #[test]
    fn non_objects_are_not_tables() {
        assert!(ReferenceTable::try_from(json!([1, 2])).is_err());
    }

    #[test]
    fn domain_parses_plural_route_names() {
        assert_eq!("Verbs".parse::<GrammarDomain>(), Ok(GrammarDomain::Verb));
        assert_eq!(
            "adjective".parse::<GrammarDomain>(),
            Ok(GrammarDomain::Adjective)
        );
        assert!("noun".parse::<GrammarDomain>().is_err());
    }
}
