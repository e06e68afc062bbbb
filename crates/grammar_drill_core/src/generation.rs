//! crates/grammar_drill_core/src/generation.rs
//!
//! Turns a submitted word into a Generation Result: one table event, the
//! exercises in order, then exactly one `complete` or `error` event.

use crate::domain::{Exercise, GenerationEvent, GrammarDomain, ReferenceTable, ResponseFormat};
use crate::extractor::{FragmentExtractor, ScanMode};
use crate::ports::{ChatCompletionService, PortError, PortResult};
use crate::prompts::{exercise_messages, single_call_messages, table_messages};
use crate::repair::{parse_item_array, parse_object, ExtractionError};
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The events of one generation, in order.
pub type EventStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// How the exercise request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// One blocking call; all exercises are parsed from the full reply.
    Blocking,
    /// A streamed call; exercises are emitted as soon as each one is complete.
    #[default]
    Streaming,
    /// One call for the table and the exercises together, answered as a
    /// single array whose first item must be the table.
    SingleCall,
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(GenerationMode::Blocking),
            "streaming" => Ok(GenerationMode::Streaming),
            "single_call" | "single-call" => Ok(GenerationMode::SingleCall),
            other => Err(format!("unknown generation mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub exercise_count: usize,
    pub mode: GenerationMode,
    pub scan: ScanMode,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            exercise_count: 32,
            mode: GenerationMode::default(),
            scan: ScanMode::default(),
        }
    }
}

/// Produces Generation Results using a chat-completion backend.
#[derive(Clone)]
pub struct Generator {
    llm: Arc<dyn ChatCompletionService>,
    settings: GeneratorSettings,
}

impl Generator {
    pub fn new(llm: Arc<dyn ChatCompletionService>, settings: GeneratorSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Lazily runs the generation for `word`. Nothing is requested until the
    /// stream is polled.
    pub fn generate(&self, word: &str, domain: GrammarDomain) -> EventStream {
        let llm = self.llm.clone();
        let settings = self.settings.clone();
        let word = word.trim().to_string();

        Box::pin(stream! {
            let started = Instant::now();
            info!("Generating {} exercises for '{}' ({:?} mode).", domain, word, settings.mode);

            // Single-call replies carry the exercises along with the table.
            let fetched = match settings.mode {
                GenerationMode::SingleCall => {
                    fetch_single_call(llm.as_ref(), &word, domain, settings.exercise_count).await
                }
                GenerationMode::Blocking | GenerationMode::Streaming => fetch_table(llm.as_ref(), &word, domain)
                    .await
                    .map(|table| (table, Vec::new())),
            };
            let (table, bundled) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!("Table generation for '{}' failed: {}", word, e);
                    yield error_event(&e);
                    return;
                }
            };
            yield GenerationEvent::Table(table);

            let mut produced = 0usize;
            match settings.mode {
                GenerationMode::SingleCall => {
                    for exercise in bundled {
                        produced += 1;
                        yield GenerationEvent::Exercise(exercise);
                    }
                }
                GenerationMode::Blocking => {
                    match fetch_exercises(llm.as_ref(), &word, domain, settings.exercise_count).await {
                        Ok(exercises) => {
                            for exercise in exercises {
                                produced += 1;
                                yield GenerationEvent::Exercise(exercise);
                            }
                        }
                        Err(e) => {
                            error!("Exercise generation for '{}' failed: {}", word, e);
                            yield error_event(&e);
                            return;
                        }
                    }
                }
                GenerationMode::Streaming => {
                    let messages = match exercise_messages(&word, domain, settings.exercise_count) {
                        Ok(messages) => messages,
                        Err(e) => {
                            yield error_event(&PortError::from(e));
                            return;
                        }
                    };
                    let mut deltas = match llm.complete_streaming(&messages).await {
                        Ok(deltas) => deltas,
                        Err(e) => {
                            error!("Exercise stream for '{}' could not start: {}", word, e);
                            yield error_event(&e);
                            return;
                        }
                    };

                    let mut extractor = FragmentExtractor::new(settings.scan);
                    while let Some(delta) = deltas.next().await {
                        let text = match delta {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Exercise stream for '{}' broke off: {}", word, e);
                                yield error_event(&e);
                                return;
                            }
                        };
                        for fragment in extractor.feed(&text) {
                            for exercise in decode_fragment(&fragment) {
                                produced += 1;
                                yield GenerationEvent::Exercise(exercise);
                            }
                        }
                    }
                    for fragment in extractor.finish() {
                        for exercise in decode_fragment(&fragment) {
                            produced += 1;
                            yield GenerationEvent::Exercise(exercise);
                        }
                    }
                }
            }

            if produced == 0 {
                let e = PortError::from(ExtractionError::NoExercises);
                error!("No exercises could be extracted for '{}'.", word);
                yield error_event(&e);
                return;
            }

            info!("⏱️ Generation for '{}' took: {:?}", word, started.elapsed());
            yield GenerationEvent::Complete {
                message: format!("Generated {} exercises for \"{}\"", produced, word),
            };
        })
    }

    /// Runs a generation to the end and returns every event.
    pub async fn collect(&self, word: &str, domain: GrammarDomain) -> Vec<GenerationEvent> {
        self.generate(word, domain).collect().await
    }
}

fn error_event(error: &PortError) -> GenerationEvent {
    GenerationEvent::Error {
        message: error.to_string(),
    }
}

async fn fetch_table(
    llm: &dyn ChatCompletionService,
    word: &str,
    domain: GrammarDomain,
) -> PortResult<ReferenceTable> {
    let messages = table_messages(word, domain)?;
    let raw = llm.complete(&messages, ResponseFormat::JsonObject).await?;
    let map = parse_object(&raw).map_err(|e| {
        error!("Raw table response: {}", raw);
        e
    })?;
    Ok(ReferenceTable(unwrap_table(map, domain)))
}

async fn fetch_single_call(
    llm: &dyn ChatCompletionService,
    word: &str,
    domain: GrammarDomain,
    count: usize,
) -> PortResult<(ReferenceTable, Vec<Exercise>)> {
    let messages = single_call_messages(word, domain, count)?;
    let raw = llm.complete(&messages, ResponseFormat::Text).await?;
    split_single_call(&raw, domain).map_err(|e| {
        error!("Raw single-call response: {}", raw);
        PortError::from(e)
    })
}

/// Splits a single-call reply into its leading table and the exercises
/// after it. Items after the first that are not exercises are skipped.
fn split_single_call(
    raw: &str,
    domain: GrammarDomain,
) -> Result<(ReferenceTable, Vec<Exercise>), ExtractionError> {
    let mut items = parse_item_array(raw)?.into_iter();
    let table = match items.next() {
        Some(Value::Object(mut first))
            if first.get("type").and_then(Value::as_str) == Some("table") =>
        {
            first.remove("type");
            unwrap_table(first, domain)
        }
        _ => return Err(ExtractionError::MissingTable),
    };
    let exercises = items.filter_map(|item| decode_item(&item)).collect();
    Ok((ReferenceTable(table), exercises))
}

/// Some replies wrap the table as `{"conjugation_table": {...}}` or
/// `{"declension_table": {...}}`; the wrapper is dropped.
fn unwrap_table(mut map: Map<String, Value>, domain: GrammarDomain) -> Map<String, Value> {
    let key = match domain {
        GrammarDomain::Verb => "conjugation_table",
        GrammarDomain::Adjective => "declension_table",
    };
    match map.remove(key) {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            map.insert(key.to_string(), other);
            map
        }
        None => map,
    }
}

async fn fetch_exercises(
    llm: &dyn ChatCompletionService,
    word: &str,
    domain: GrammarDomain,
    count: usize,
) -> PortResult<Vec<Exercise>> {
    let messages = exercise_messages(word, domain, count)?;
    let raw = llm.complete(&messages, ResponseFormat::JsonObject).await?;

    let items = match parse_object(&raw) {
        Ok(mut map) => match map.remove("exercises") {
            Some(Value::Array(items)) => Ok(items),
            _ => parse_item_array(&raw),
        },
        Err(_) => parse_item_array(&raw),
    };
    let items = items.map_err(|e| {
        error!("Raw exercise response: {}", raw);
        e
    })?;

    Ok(items.iter().filter_map(decode_item).collect())
}

/// Reads a fragment produced by the extractor. A fragment may be a single
/// exercise, a typed wrapper around one, or (in balanced mode) an
/// `{"exercises": [...]}` envelope.
fn decode_fragment(fragment: &str) -> Vec<Exercise> {
    let value: Value = match serde_json::from_str(fragment) {
        Ok(value) => value,
        Err(e) => {
            warn!("Fragment is not valid JSON ({}): {}", e, fragment);
            return Vec::new();
        }
    };
    match value.get("exercises") {
        Some(Value::Array(items)) => items.iter().filter_map(decode_item).collect(),
        _ => decode_item(&value).into_iter().collect(),
    }
}

fn decode_item(item: &Value) -> Option<Exercise> {
    let exercise = Exercise::from_value(item);
    if exercise.is_none() && item.get("type").and_then(Value::as_str) != Some("table") {
        warn!("Skipping item that is not an exercise: {}", item);
    }
    exercise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;
    use crate::ports::TextStream;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies in call order.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<PortResult<String>>>,
        chunks: Mutex<Option<Vec<PortResult<String>>>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<PortResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                chunks: Mutex::new(None),
            }
        }

        fn with_stream(self, chunks: Vec<PortResult<String>>) -> Self {
            *self.chunks.lock().unwrap() = Some(chunks);
            self
        }
    }

    #[async_trait]
    impl ChatCompletionService for ScriptedLlm {
        async fn complete(&self, _: &[ChatMessage], _: ResponseFormat) -> PortResult<String> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected blocking call")
        }

        async fn complete_streaming(&self, _: &[ChatMessage]) -> PortResult<TextStream> {
            let chunks = self.chunks.lock().unwrap().take().expect("unexpected stream call");
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    const GEHEN_TABLE: &str = r#"{"present": {"1st_person_singular": "gehe", "3rd_person_singular": "geht"}, "infinitive": "gehen"}"#;

    fn generator(llm: ScriptedLlm, mode: GenerationMode) -> Generator {
        Generator::new(
            Arc::new(llm),
            GeneratorSettings {
                exercise_count: 3,
                mode,
                scan: ScanMode::Flat,
            },
        )
    }

    #[tokio::test]
    async fn streamed_verb_generation_has_table_exercises_then_complete() {
        let llm = ScriptedLlm::new(vec![Ok(GEHEN_TABLE.to_string())]).with_stream(vec![
            Ok(r#"{"exercises": [{"sentence": "Ich ___ heute"#.to_string()),
            Ok(r#" ins Kino.", "answer": "gehe", "tense": "Präsens"},"#.to_string()),
            Ok(r#" {"sentence": "Wenn ich Zeit hätte, ___ ich mit.", "answer": "ginge", "#.to_string()),
            Ok(r#""mood": "Konjunktiv II"}]}"#.to_string()),
        ]);

        let events = generator(llm, GenerationMode::Streaming)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(events.len(), 4);
        match &events[0] {
            GenerationEvent::Table(table) => assert_eq!(table.as_map()["infinitive"], "gehen"),
            other => panic!("expected table, got {:?}", other),
        }
        for event in &events[1..3] {
            match event {
                GenerationEvent::Exercise(exercise) => {
                    assert!(!exercise.sentence.is_empty());
                    assert!(!exercise.answer.is_empty());
                }
                other => panic!("expected exercise, got {:?}", other),
            }
        }
        assert_eq!(
            events[3],
            GenerationEvent::Complete {
                message: "Generated 2 exercises for \"gehen\"".into()
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_yields_only_an_error() {
        let llm = ScriptedLlm::new(vec![Err(PortError::Transport(
            "DeepSeek API error: Internal Server Error".into(),
        ))]);

        let events = generator(llm, GenerationMode::Blocking)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(
            events,
            vec![GenerationEvent::Error {
                message: "DeepSeek API error: Internal Server Error".into()
            }]
        );
    }

    #[tokio::test]
    async fn reply_without_array_keeps_table_then_errors() {
        let llm = ScriptedLlm::new(vec![
            Ok(GEHEN_TABLE.to_string()),
            Ok(r#"{"note": "Ich kann keine Übungen erstellen."}"#.to_string()),
        ]);

        let events = generator(llm, GenerationMode::Blocking)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], GenerationEvent::Table(_)));
        assert_eq!(
            events[1],
            GenerationEvent::Error {
                message: "No JSON array found in response".into()
            }
        );
    }

    #[tokio::test]
    async fn blocking_mode_reads_the_exercises_field() {
        let llm = ScriptedLlm::new(vec![
            Ok(r#"{"declension_table": {"comparative": "schöner"}}"#.to_string()),
            Ok(r#"{"exercises": [
                {"sentence": "Der ___ Tag.", "answer": "schöne", "case": "Nominative", "gender": "masculine"},
                {"type": "table"},
                {"sentence": "Ein ___ Haus.", "answer": "schönes", "article_type": "indefinite"}
            ]}"#
            .to_string()),
        ]);

        let events = generator(llm, GenerationMode::Blocking)
            .collect("schön", GrammarDomain::Adjective)
            .await;

        assert_eq!(events.len(), 4);
        match &events[0] {
            GenerationEvent::Table(table) => assert_eq!(table.as_map()["comparative"], "schöner"),
            other => panic!("expected table, got {:?}", other),
        }
        match &events[2] {
            GenerationEvent::Exercise(exercise) => {
                assert_eq!(exercise.article_type.as_deref(), Some("indefinite"))
            }
            other => panic!("expected exercise, got {:?}", other),
        }
        assert!(events[3].is_terminal());
    }

    #[tokio::test]
    async fn stream_failure_after_some_exercises_ends_with_error() {
        let llm = ScriptedLlm::new(vec![Ok(GEHEN_TABLE.to_string())]).with_stream(vec![
            Ok(r#"[{"sentence": "Du ___.", "answer": "gehst"}, {"sentence": "#.to_string()),
            Err(PortError::Transport("connection reset".into())),
        ]);

        let events = generator(llm, GenerationMode::Streaming)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], GenerationEvent::Exercise(_)));
        assert_eq!(
            events[2],
            GenerationEvent::Error {
                message: "connection reset".into()
            }
        );
    }

    #[tokio::test]
    async fn stream_without_exercises_is_an_extraction_error() {
        let llm = ScriptedLlm::new(vec![Ok(GEHEN_TABLE.to_string())])
            .with_stream(vec![Ok("Entschuldigung, das kann ich nicht.".to_string())]);

        let events = generator(llm, GenerationMode::Streaming)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(
            events.last(),
            Some(&GenerationEvent::Error {
                message: "No exercises found in response".into()
            })
        );
    }

    #[tokio::test]
    async fn blank_word_fails_before_any_request() {
        let events = generator(ScriptedLlm::default(), GenerationMode::Streaming)
            .collect("   ", GrammarDomain::Verb)
            .await;
        assert_eq!(
            events,
            vec![GenerationEvent::Error {
                message: "The word must not be empty".into()
            }]
        );
    }

    #[tokio::test]
    async fn balanced_stream_unwraps_typed_exercises_around_stray_braces() {
        let llm = ScriptedLlm::new(vec![Ok(GEHEN_TABLE.to_string())]).with_stream(vec![
            Ok("Hier kommen die Übungen {ohne Gewähr}:\n".to_string()),
            Ok(r#"{"type": "exercise", "data": {"sentence": "Ich ___ nach Hause.", "#.to_string()),
            Ok(r#""answer": "gehe", "person": 1}}"#.to_string()),
            Ok("\n{\"type\": \"exercise\", \"da".to_string()),
            Ok(r#"ta": {"sentence": "Sie ___ {gestern} weg.", "answer": "ging", "tense": "Präteritum"}}"#.to_string()),
            Ok(r#" {"type": "exercise", "data": {"sentence": "abgebro"#.to_string()),
        ]);
        let generator = Generator::new(
            Arc::new(llm),
            GeneratorSettings {
                exercise_count: 3,
                mode: GenerationMode::Streaming,
                scan: ScanMode::Balanced,
            },
        );

        let events = generator.collect("gehen", GrammarDomain::Verb).await;

        assert_eq!(events.len(), 4, "{:?}", events);
        match &events[1] {
            GenerationEvent::Exercise(exercise) => {
                assert_eq!(exercise.answer, "gehe");
                assert_eq!(exercise.person.as_deref(), Some("1"));
            }
            other => panic!("expected exercise, got {:?}", other),
        }
        match &events[2] {
            GenerationEvent::Exercise(exercise) => {
                assert_eq!(exercise.sentence, "Sie ___ {gestern} weg.");
                assert_eq!(exercise.tense.as_deref(), Some("Präteritum"));
            }
            other => panic!("expected exercise, got {:?}", other),
        }
        assert_eq!(
            events[3],
            GenerationEvent::Complete {
                message: "Generated 2 exercises for \"gehen\"".into()
            }
        );
    }

    #[tokio::test]
    async fn balanced_stream_envelope_is_read_at_end_of_stream() {
        let llm = ScriptedLlm::new(vec![Ok(GEHEN_TABLE.to_string())]).with_stream(vec![
            Ok(r#"{"exercises": [{"sentence": "Wir ___.", "answer": "gehen"},"#.to_string()),
            Ok(r#" {"sentence": "Ihr ___.", "answer": "geht"}]}"#.to_string()),
        ]);
        let generator = Generator::new(
            Arc::new(llm),
            GeneratorSettings {
                exercise_count: 2,
                mode: GenerationMode::Streaming,
                scan: ScanMode::Balanced,
            },
        );

        let events = generator.collect("gehen", GrammarDomain::Verb).await;
        let answers: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                GenerationEvent::Exercise(exercise) => Some(exercise.answer.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answers, vec!["gehen", "geht"]);
        assert!(matches!(events.last(), Some(GenerationEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn single_call_reply_starts_with_the_table() {
        let reply = r#"Hier ist das Array:
[
  {"type": "table", "declension_table": {"base_form": "groß", "nominative": {"definite_m": "der große"}}},
  {"type": "exercise", "data": {"sentence": "Der ___ Mann geht spazieren.", "answer": "große", "case": "Nominativ"}},
  {"type": "exercise", "data": {"sentence": "Ein ___ Haus.", "answer": "großes", "number": 1}},
]"#;
        let llm = ScriptedLlm::new(vec![Ok(reply.to_string())]);

        let events = generator(llm, GenerationMode::SingleCall)
            .collect("groß", GrammarDomain::Adjective)
            .await;

        assert_eq!(events.len(), 4, "{:?}", events);
        match &events[0] {
            GenerationEvent::Table(table) => {
                assert_eq!(table.as_map()["base_form"], "groß");
                assert!(!table.as_map().contains_key("type"));
            }
            other => panic!("expected table, got {:?}", other),
        }
        match &events[2] {
            GenerationEvent::Exercise(exercise) => assert_eq!(exercise.answer, "großes"),
            other => panic!("expected exercise, got {:?}", other),
        }
        assert_eq!(
            events[3],
            GenerationEvent::Complete {
                message: "Generated 2 exercises for \"groß\"".into()
            }
        );
    }

    #[tokio::test]
    async fn single_call_reply_without_leading_table_is_rejected() {
        let reply = r#"[
  {"type": "exercise", "data": {"sentence": "Ich ___.", "answer": "gehe"}},
  {"type": "table", "conjugation_table": {"infinitive": "gehen"}}
]"#;
        let llm = ScriptedLlm::new(vec![Ok(reply.to_string())]);

        let events = generator(llm, GenerationMode::SingleCall)
            .collect("gehen", GrammarDomain::Verb)
            .await;

        assert_eq!(
            events,
            vec![GenerationEvent::Error {
                message: "First item is not a table".into()
            }]
        );
    }

    #[test]
    fn generation_mode_parses_from_config_strings() {
        assert_eq!("single_call".parse::<GenerationMode>(), Ok(GenerationMode::SingleCall));
        assert_eq!("Blocking".parse::<GenerationMode>(), Ok(GenerationMode::Blocking));
        assert!("batch".parse::<GenerationMode>().is_err());
    }

    #[test]
    fn balanced_envelope_expands_into_exercises() {
        let fragment = r#"{"exercises": [{"sentence": "a ___", "answer": "b"}, {"sentence": "c ___", "answer": "d"}]}"#;
        assert_eq!(decode_fragment(fragment).len(), 2);
    }
}
