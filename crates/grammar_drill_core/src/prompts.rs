//! crates/grammar_drill_core/src/prompts.rs
//!
//! Prompt templates for the chat-completion backend. Every builder is a pure
//! function of its inputs and returns a `[system, user]` message pair.

use crate::domain::{ChatMessage, GrammarDomain};

const VERB_TABLE_SYSTEM: &str = r#"You are a German language expert. Generate conjugation tables for verbs in a structured format.
The tables must cover:
1. Present tense (Präsens)
2. Past tense (Präteritum)
3. Perfect tense (Perfekt)
4. Future tense (Futur I)
5. Subjunctive I (Konjunktiv I): present and perfect
6. Subjunctive II (Konjunktiv II): past and future
7. Imperative forms
8. Infinitive and past participle

Give every tense or mood in all persons, singular and plural. Answer with one JSON object only."#;

const VERB_TABLE_USER: &str = r#"Generate complete conjugation tables for the German verb "{word}" as a JSON object with this structure:
{
  "present": {
    "1st_person_singular": "...",
    "2nd_person_singular": "...",
    "3rd_person_singular": "...",
    "1st_person_plural": "...",
    "2nd_person_plural": "...",
    "3rd_person_plural": "..."
  },
  "preterite": { same keys as "present" },
  "perfect": { same keys as "present" },
  "future": { same keys as "present" },
  "konjunktiv_i": {
    "present": { same keys as "present" },
    "perfect": { same keys as "present" }
  },
  "konjunktiv_ii": {
    "past": { same keys as "present" },
    "future": { same keys as "present" }
  },
  "imperative": { "du": "...", "ihr": "...", "sie": "..." },
  "infinitive": "...",
  "past_participle": "..."
}"#;

const ADJECTIVE_TABLE_SYSTEM: &str = r#"You are a German language expert. Generate declension tables for adjectives in a structured format.
The tables must cover:
1. Declension after the definite article (der/die/das)
2. Declension after the indefinite article (ein/eine)
3. Declension without an article
Each table shows all cases (nominative, accusative, dative, genitive) for masculine, feminine, neuter and plural. Answer with one JSON object only."#;

const ADJECTIVE_TABLE_USER: &str = r#"Generate complete declension tables for the German adjective "{word}" as a JSON object with this structure:
{
  "definite_article": {
    "nominative": { "masculine": "...", "feminine": "...", "neuter": "...", "plural": "..." },
    "accusative": { same keys as "nominative" },
    "dative": { same keys as "nominative" },
    "genitive": { same keys as "nominative" }
  },
  "indefinite_article": { same structure as "definite_article" },
  "no_article": { same structure as "definite_article" },
  "comparative": "...",
  "superlative": "..."
}"#;

const VERB_EXERCISE_SYSTEM: &str = r#"You are a German language expert. Generate verb conjugation exercises that cover all tenses, moods and persons.
Each exercise must contain:
1. A German sentence with a gap (___) for the verb
2. The correct answer (the verb in the required form)
3. The tense
4. The mood (Indikativ, Konjunktiv I or Konjunktiv II)
5. The person (1st, 2nd or 3rd)
6. The number (singular or plural)
7. A short explanation of why this form is used, especially for subjunctive moods
Every exercise is a flat JSON object: no nested objects or arrays inside it."#;

const VERB_EXERCISE_USER: &str = r#"Generate {count} diverse exercises for the German verb "{word}".
Include:
- all indicative tenses (Präsens, Präteritum, Perfekt, Futur I)
- Konjunktiv I (present and perfect), e.g. reported speech
- Konjunktiv II (past and future), e.g. hypothetical situations, polite requests, wishes
- all persons, singular and plural
- some imperative forms and modal verb combinations

Answer with one JSON object of the form {"exercises": [ ... ]}, where each exercise looks like:
{
  "sentence": "Er sagte, er ___ morgen kommen.",
  "answer": "werde",
  "tense": "Präsens",
  "mood": "Konjunktiv I",
  "person": "3rd Person",
  "number": "singular",
  "explanation": "Reported speech uses Konjunktiv I; the 3rd person singular of 'werden' is 'werde'."
}"#;

const ADJECTIVE_EXERCISE_SYSTEM: &str = r#"You are a German language expert. Generate adjective declension exercises that cover all cases, genders and article types.
Each exercise must contain:
1. A German sentence with a gap (___) for the adjective
2. The correct answer (the adjective with the right ending)
3. The grammatical case
4. The gender (for singular) or "plural"
5. The article type (definite, indefinite or no article)
6. A short explanation of why this ending is used
Every exercise is a flat JSON object: no nested objects or arrays inside it."#;

const ADJECTIVE_EXERCISE_USER: &str = r#"Generate {count} diverse exercises for the German adjective "{word}".
Include:
- all cases (nominative, accusative, dative, genitive)
- all genders (masculine, feminine, neuter) and plural
- all article types (definite, indefinite, no article)
- some comparative and superlative forms

Answer with one JSON object of the form {"exercises": [ ... ]}, where each exercise looks like:
{
  "sentence": "Der ___ Mann geht.",
  "answer": "{word}e",
  "case": "Nominative",
  "gender": "masculine",
  "number": "singular",
  "article_type": "definite",
  "explanation": "After the definite article 'der' (masculine, nominative) the adjective takes the -e ending."
}"#;

const VERB_SINGLE_CALL_SYSTEM: &str = r#"You are a German grammar expert. Produce a COMPLETE analysis of the verb "{word}".
IMPORTANT: answer ONLY with a JSON array in the format below, without any other text.
The first element is the conjugation table. It is followed by exactly {count} fill-in-the-blank exercises covering the indicative tenses, Konjunktiv I, Konjunktiv II, the imperative and the passive, in all persons."#;

const ADJECTIVE_SINGLE_CALL_SYSTEM: &str = r#"You are a German grammar expert. Produce a COMPLETE analysis of the adjective "{word}".
IMPORTANT: answer ONLY with a JSON array in the format below, without any other text.
The first element is the declension table. It is followed by exactly {count} fill-in-the-blank exercises covering every case, every gender and the plural, each with a definite and an indefinite article."#;

const VERB_SINGLE_CALL_USER: &str = r#"Generate the array in this format:
[
  {
    "type": "table",
    "conjugation_table": {
      "infinitive": "{word}",
      "present": { "ich": "...", "du": "...", "er_sie_es": "...", "wir": "...", "ihr": "...", "sie_Sie": "..." },
      "preterite": { same keys as "present" },
      "perfect": { same keys as "present" }
    }
  },
  {
    "type": "exercise",
    "data": {
      "sentence": "Ich ___ jeden Tag zur Arbeit.",
      "answer": "...",
      "tense": "Präsens",
      "person": "1. Person",
      "mood": "Indikativ",
      "number": "Singular",
      "explanation": "..."
    }
  }
]"#;

const ADJECTIVE_SINGLE_CALL_USER: &str = r#"Generate the array in this format:
[
  {
    "type": "table",
    "declension_table": {
      "base_form": "{word}",
      "nominative": {
        "definite_m": "...", "definite_f": "...", "definite_n": "...", "definite_pl": "...",
        "indefinite_m": "...", "indefinite_f": "...", "indefinite_n": "...", "indefinite_pl": "..."
      },
      "accusative": { same keys as "nominative" },
      "dative": { same keys as "nominative" },
      "genitive": { same keys as "nominative" }
    }
  },
  {
    "type": "exercise",
    "data": {
      "sentence": "Der ___ Mann geht spazieren.",
      "answer": "...",
      "case": "Nominativ",
      "gender": "maskulin",
      "article_type": "definit",
      "number": "Singular",
      "explanation": "..."
    }
  }
]"#;

const CORRECTION_SYSTEM: &str = "Du bist ein deutscher Grammatik- und Sprachexperte. Korrigiere den folgenden deutschen Text. Gib die korrigierte Version zurück und erkläre die Korrekturen in einer Liste darunter.";

/// Input that cannot be turned into a prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("The word must not be empty")]
    EmptyWord,
    #[error("The text to correct must not be empty")]
    EmptyText,
    #[error("The exercise count must be at least 1")]
    InvalidCount,
}

/// Messages asking for the conjugation or declension table of `word`.
pub fn table_messages(word: &str, domain: GrammarDomain) -> Result<Vec<ChatMessage>, PromptError> {
    let word = validate_word(word)?;
    let (system, user) = match domain {
        GrammarDomain::Verb => (VERB_TABLE_SYSTEM, VERB_TABLE_USER),
        GrammarDomain::Adjective => (ADJECTIVE_TABLE_SYSTEM, ADJECTIVE_TABLE_USER),
    };
    Ok(vec![
        ChatMessage::system(system),
        ChatMessage::user(user.replace("{word}", word)),
    ])
}

/// Messages asking for `count` fill-in-the-blank exercises for `word`.
pub fn exercise_messages(
    word: &str,
    domain: GrammarDomain,
    count: usize,
) -> Result<Vec<ChatMessage>, PromptError> {
    let word = validate_word(word)?;
    if count == 0 {
        return Err(PromptError::InvalidCount);
    }
    let (system, user) = match domain {
        GrammarDomain::Verb => (VERB_EXERCISE_SYSTEM, VERB_EXERCISE_USER),
        GrammarDomain::Adjective => (ADJECTIVE_EXERCISE_SYSTEM, ADJECTIVE_EXERCISE_USER),
    };
    let user = user
        .replace("{word}", word)
        .replace("{count}", &count.to_string());
    Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

/// Messages asking for the table and `count` exercises in one JSON array:
/// a `{"type": "table", ...}` item first, then `{"type": "exercise",
/// "data": {...}}` items.
pub fn single_call_messages(
    word: &str,
    domain: GrammarDomain,
    count: usize,
) -> Result<Vec<ChatMessage>, PromptError> {
    let word = validate_word(word)?;
    if count == 0 {
        return Err(PromptError::InvalidCount);
    }
    let (system, user) = match domain {
        GrammarDomain::Verb => (VERB_SINGLE_CALL_SYSTEM, VERB_SINGLE_CALL_USER),
        GrammarDomain::Adjective => (ADJECTIVE_SINGLE_CALL_SYSTEM, ADJECTIVE_SINGLE_CALL_USER),
    };
    let system = system
        .replace("{word}", word)
        .replace("{count}", &count.to_string());
    Ok(vec![
        ChatMessage::system(system),
        ChatMessage::user(user.replace("{word}", word)),
    ])
}

/// Messages asking for a corrected version of a free German text.
pub fn correction_messages(text: &str) -> Result<Vec<ChatMessage>, PromptError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PromptError::EmptyText);
    }
    Ok(vec![
        ChatMessage::system(CORRECTION_SYSTEM),
        ChatMessage::user(text),
    ])
}

fn validate_word(word: &str) -> Result<&str, PromptError> {
    let word = word.trim();
    if word.is_empty() {
        Err(PromptError::EmptyWord)
    } else {
        Ok(word)
    }
}
