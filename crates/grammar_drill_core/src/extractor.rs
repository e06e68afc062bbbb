//! crates/grammar_drill_core/src/extractor.rs
//!
//! Incremental extraction of JSON objects from free-form model output.
//!
//! The model is asked for JSON but does not reliably produce a single valid
//! document: objects arrive split across stream deltas, glued together
//! without separators, or surrounded by prose. `FragmentExtractor` keeps an
//! accumulation buffer and hands out every complete object exactly once, in
//! the order it appears.

use regex::Regex;
use serde_json::Value;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// A single-level `{...}` span with no nested braces.
static FLAT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("flat object pattern is valid"));

/// How candidate objects are located in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Leftmost single-level object, found with the `\{[^{}]*\}` pattern.
    /// Objects that contain nested objects or arrays are never returned
    /// whole; the innermost flat object is returned instead.
    #[default]
    Flat,
    /// Brace-depth scanner that skips braces inside string literals and
    /// returns the full outermost object, nested values included.
    Balanced,
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(ScanMode::Flat),
            "balanced" => Ok(ScanMode::Balanced),
            other => Err(format!("unknown scan mode '{}'", other)),
        }
    }
}

/// Result of a single extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A complete, valid JSON object.
    Fragment(String),
    /// No complete candidate in the buffer yet; more input is needed.
    Incomplete,
    /// A complete candidate that is not valid JSON and never will be.
    Malformed(String),
}

/// Accumulates streamed text and yields JSON object fragments.
#[derive(Debug, Clone, Default)]
pub struct FragmentExtractor {
    buffer: String,
    mode: ScanMode,
}

impl FragmentExtractor {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            buffer: String::new(),
            mode,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Text received but not yet consumed by an emitted fragment.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Appends `chunk` and returns every fragment that became complete.
    ///
    /// Malformed candidates are logged and dropped so that the objects that
    /// follow them can still be extracted.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        self.drain(false)
    }

    /// Tries to take the leftmost candidate out of the buffer.
    ///
    /// On `Fragment` and `Malformed` the candidate and everything before it
    /// are removed from the buffer. On `Incomplete` the buffer is untouched.
    pub fn next_fragment(&mut self) -> Extraction {
        self.step(false)
    }

    /// Final pass at end of input. Clears the buffer.
    ///
    /// No more text will arrive, so an object start that never closed is
    /// given up and the scan resumes at the next `{`. Whatever remains after
    /// that is logged and dropped.
    pub fn finish(&mut self) -> Vec<String> {
        let fragments = self.drain(true);

        let leftover = self.buffer.trim();
        if leftover.contains('{') {
            warn!("Discarding unparseable trailing output: {}", leftover);
        } else if !leftover.is_empty() {
            debug!("Discarding trailing text without JSON: {}", leftover);
        }
        self.buffer.clear();
        fragments
    }

    fn drain(&mut self, at_end: bool) -> Vec<String> {
        let mut fragments = Vec::new();
        loop {
            match self.step(at_end) {
                Extraction::Fragment(fragment) => fragments.push(fragment),
                Extraction::Malformed(candidate) => {
                    warn!("Dropping malformed JSON candidate: {}", candidate);
                }
                Extraction::Incomplete => break,
            }
        }
        fragments
    }

    fn step(&mut self, at_end: bool) -> Extraction {
        let candidate = match self.mode {
            ScanMode::Flat => FLAT_OBJECT.find(&self.buffer).map(|m| m.range()),
            ScanMode::Balanced => balanced_object(&self.buffer, at_end),
        };
        let Some(range) = candidate else {
            return Extraction::Incomplete;
        };

        let candidate = self.buffer[range.clone()].to_string();
        self.buffer.drain(..range.end);

        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(_)) => Extraction::Fragment(candidate),
            _ => Extraction::Malformed(candidate),
        }
    }
}

/// Extracts every fragment from a complete text in one pass.
pub fn extract_all(text: &str, mode: ScanMode) -> Vec<String> {
    let mut extractor = FragmentExtractor::new(mode);
    let mut fragments = extractor.feed(text);
    fragments.extend(extractor.finish());
    fragments
}

/// Finds the first complete outermost `{...}`, ignoring braces inside
/// string literals.
///
/// A `{` that cannot start a JSON object (the next token is neither a key
/// nor `}`) is prose and is skipped. A start that is still open waits for
/// more input, unless `at_end` is set, in which case it can never close and
/// the scan moves on to the next `{`.
fn balanced_object(text: &str, at_end: bool) -> Option<Range<usize>> {
    let mut from = 0;
    while let Some(found) = text[from..].find('{') {
        let start = from + found;
        from = start + 1;

        if !opens_object(&text[from..]) {
            continue;
        }
        match closing_offset(&text[start..]) {
            Some(len) => return Some(start..start + len),
            None if at_end => continue,
            None => return None,
        }
    }
    None
}

/// What follows a `{` in a JSON object: a key string or the closing brace.
/// Nothing at all means the next chunk has not arrived yet.
fn opens_object(rest: &str) -> bool {
    matches!(rest.trim_start().bytes().next(), None | Some(b'"') | Some(b'}'))
}

/// Length of the object starting at `text[0] == '{'`, if it closes.
fn closing_offset(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
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
    fn yields_objects_from_noisy_text_in_order() {
        let text = r#"Hier sind die Übungen:
            {"sentence": "Ich ___ heim.", "answer": "gehe"}
            noise, noise ]
            {"sentence": "Du ___ heim.", "answer": "gehst"}{"sentence": "Er ___ heim.", "answer": "geht"}
            done."#;
        let fragments = extract_all(text, ScanMode::Flat);
        let answers: Vec<String> = fragments
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["answer"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(answers, vec!["gehe", "gehst", "geht"]);
    }

    #[test]
    fn split_fragment_is_emitted_only_when_complete() {
        let mut extractor = FragmentExtractor::default();
        assert!(extractor.feed(r#"{"a":1"#).is_empty());
        assert_eq!(extractor.feed(r#","b":2}"#), vec![r#"{"a":1,"b":2}"#.to_string()]);
        assert_eq!(extractor.pending(), "");
    }

    #[test]
    fn fragments_are_never_re_emitted() {
        let mut extractor = FragmentExtractor::default();
        assert_eq!(extractor.feed(r#"{"a":1} {"#).len(), 1);
        assert!(extractor.feed(r#""b""#).is_empty());
        assert_eq!(extractor.feed(r#":2}"#), vec![r#"{"b":2}"#.to_string()]);
        assert!(extractor.finish().is_empty());
    }

    #[test]
    fn chunking_does_not_change_the_result() {
        let text = r#"[{"sentence":"Wir ___ los.","answer":"gehen"}, {"sentence":"Ihr ___ los.","answer":"geht"},]"#;
        let whole = extract_all(text, ScanMode::Flat);
        assert_eq!(whole.len(), 2);

        for size in 1..text.len() {
            let mut extractor = FragmentExtractor::default();
            let mut streamed = Vec::new();
            let mut rest = text;
            while !rest.is_empty() {
                let mut cut = size.min(rest.len());
                while !rest.is_char_boundary(cut) {
                    cut += 1;
                }
                let (chunk, tail) = rest.split_at(cut);
                streamed.extend(extractor.feed(chunk));
                rest = tail;
            }
            streamed.extend(extractor.finish());
            assert_eq!(streamed, whole, "chunk size {}", size);
        }
    }

    #[test]
    fn malformed_candidate_is_reported_then_skipped() {
        let mut extractor = FragmentExtractor::default();
        extractor.buffer.push_str(r#"{"a":1,} {"b":2}"#);
        assert_eq!(
            extractor.next_fragment(),
            Extraction::Malformed(r#"{"a":1,}"#.to_string())
        );
        assert_eq!(
            extractor.next_fragment(),
            Extraction::Fragment(r#"{"b":2}"#.to_string())
        );

        let mut extractor = FragmentExtractor::default();
        assert_eq!(extractor.feed(r#"{oops} {"c":3}"#), vec![r#"{"c":3}"#.to_string()]);
    }

    #[test]
    fn flat_mode_returns_innermost_object_of_nested_input() {
        let text = r#"{"type":"exercise","data":{"sentence":"Ich ___.","answer":"gehe"}}"#;
        assert_eq!(
            extract_all(text, ScanMode::Flat),
            vec![r#"{"sentence":"Ich ___.","answer":"gehe"}"#.to_string()]
        );
    }

    #[test]
    fn balanced_mode_returns_whole_nested_object() {
        let text = r#"x {"type":"exercise","data":{"sentence":"Ich {___}.","answer":"ge\"he"}} y"#;
        let fragments = extract_all(text, ScanMode::Balanced);
        assert_eq!(fragments.len(), 1);
        let value: Value = serde_json::from_str(&fragments[0]).unwrap();
        assert_eq!(value["data"]["sentence"], "Ich {___}.");
    }

    #[test]
    fn balanced_mode_waits_for_the_outer_brace() {
        let mut extractor = FragmentExtractor::new(ScanMode::Balanced);
        assert!(extractor.feed(r#"{"t":{"a":1}"#).is_empty());
        assert_eq!(extractor.feed("}").len(), 1);
    }

    #[test]
    fn finish_reports_unterminated_leftover() {
        let mut extractor = FragmentExtractor::default();
        assert!(extractor.feed(r#"{"sentence": "abgeschnitten"#).is_empty());
        assert!(extractor.finish().is_empty());
        assert_eq!(extractor.pending(), "");

        let mut extractor = FragmentExtractor::default();
        extractor.feed("just prose");
        assert!(extractor.finish().is_empty());
    }

    #[test]
    fn balanced_mode_skips_a_stray_brace_in_prose() {
        let text = r#"Hinweis: Platzhalter {wie hier. {"sentence":"Ich ___.","answer":"gehe"} {"sentence":"Du ___.","answer":"gehst"}"#;
        let flat = extract_all(text, ScanMode::Flat);
        let balanced = extract_all(text, ScanMode::Balanced);
        assert_eq!(balanced.len(), 2);
        assert_eq!(balanced, flat);

        // The stray brace must not hold back streaming either.
        let mut extractor = FragmentExtractor::new(ScanMode::Balanced);
        assert!(extractor.feed("Platzhalter {").is_empty());
        assert!(extractor.feed("wie hier. ").is_empty());
        assert_eq!(
            extractor.feed(r#"{"sentence":"Ich ___.","answer":"gehe"}"#).len(),
            1
        );
    }

    #[test]
    fn balanced_finish_gives_up_on_an_object_that_never_closed() {
        let mut extractor = FragmentExtractor::new(ScanMode::Balanced);
        let text = r#"{"exercises": [{"sentence": "Wir ___.", "answer": "gehen"}, {"sentence": "Ihr ___.", "answer": "geht"}, {"sentence": "abgeschn"#;
        // The envelope is still open, so nothing is final yet.
        assert!(extractor.feed(text).is_empty());

        let answers: Vec<String> = extractor
            .finish()
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["answer"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(answers, vec!["gehen", "geht"]);
        assert_eq!(extractor.pending(), "");
    }

    #[test]
    fn balanced_chunking_does_not_change_the_result() {
        let text = r#"Achtung {Entwurf} {"type":"exercise","data":{"sentence":"Sie ___ {bald}.","answer":"geht"}} und {"type":"exercise","data":{"sentence":"Wir ___.","answer":"gehen"}}"#;
        let whole = extract_all(text, ScanMode::Balanced);
        assert_eq!(whole.len(), 2);

        for size in 1..text.len() {
            let mut extractor = FragmentExtractor::new(ScanMode::Balanced);
            let mut streamed = Vec::new();
            let mut rest = text;
            while !rest.is_empty() {
                let (chunk, tail) = rest.split_at(size.min(rest.len()));
                streamed.extend(extractor.feed(chunk));
                rest = tail;
            }
            streamed.extend(extractor.finish());
            assert_eq!(streamed, whole, "chunk size {}", size);
        }
    }

    #[test]
    fn scan_mode_parses_from_config_strings() {
        assert_eq!("Balanced".parse::<ScanMode>(), Ok(ScanMode::Balanced));
        assert_eq!("flat".parse::<ScanMode>(), Ok(ScanMode::Flat));
        assert!("deep".parse::<ScanMode>().is_err());
    }
}
