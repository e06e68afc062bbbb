//! crates/grammar_drill_core/src/session.rs
//!
//! The state a learner sees while practising one word: the reference table,
//! the exercises received so far, their answers, and the generation status.

use crate::domain::{ExerciseAttempt, GenerationEvent, GrammarDomain, ReferenceTable};
use serde::Serialize;
use std::time::Duration;

/// Where the current generation stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Generating,
    Complete,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Exercise {index} does not exist (have {len})")]
    NoSuchExercise { index: usize, len: usize },
}

/// Delay inserted after each exercise event so the client can animate
/// arrivals. A zero interval disables pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub emit_interval: Duration,
}

impl Pacing {
    pub fn new(emit_interval: Duration) -> Self {
        Self { emit_interval }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// How long to wait after `event` has been delivered.
    pub fn delay_after(&self, event: &GenerationEvent) -> Option<Duration> {
        match event {
            GenerationEvent::Exercise(_) if !self.emit_interval.is_zero() => {
                Some(self.emit_interval)
            }
            _ => None,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

/// Case-insensitive comparison of trimmed answers.
pub fn check_answer(submitted: &str, expected: &str) -> bool {
    submitted.trim().to_lowercase() == expected.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseSession {
    pub word: Option<String>,
    pub domain: Option<GrammarDomain>,
    pub table: Option<ReferenceTable>,
    pub exercises: Vec<ExerciseAttempt>,
    pub status: SessionStatus,
}

impl Default for ExerciseSession {
    fn default() -> Self {
        Self {
            word: None,
            domain: None,
            table: None,
            exercises: Vec::new(),
            status: SessionStatus::Idle,
        }
    }
}

impl ExerciseSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh generation, discarding the previous result.
    pub fn begin(&mut self, word: &str, domain: GrammarDomain) {
        self.word = Some(word.trim().to_string());
        self.domain = Some(domain);
        self.table = None;
        self.exercises.clear();
        self.status = SessionStatus::Generating;
    }

    /// Folds one generation event into the session.
    ///
    /// An error leaves the table and exercises already received in place.
    pub fn apply(&mut self, event: GenerationEvent) {
        match event {
            GenerationEvent::Table(table) => self.table = Some(table),
            GenerationEvent::Exercise(exercise) => {
                self.exercises.push(ExerciseAttempt::new(exercise))
            }
            GenerationEvent::Complete { .. } => self.status = SessionStatus::Complete,
            GenerationEvent::Error { message } => self.status = SessionStatus::Error(message),
        }
    }

    /// Stops a running generation without discarding what arrived so far.
    pub fn cancel(&mut self) {
        if self.status == SessionStatus::Generating {
            self.status = SessionStatus::Idle;
        }
    }

    /// Records `answer` for exercise `index` and returns whether it is
    /// correct. A resubmission replaces the previous check.
    pub fn submit_answer(&mut self, index: usize, answer: &str) -> Result<bool, SessionError> {
        let attempt = self.attempt_mut(index)?;
        let correct = check_answer(answer, &attempt.exercise.answer);
        attempt.submitted = Some(answer.to_string());
        attempt.correct = Some(correct);
        Ok(correct)
    }

    /// Marks exercise `index` as revealed and returns its canonical answer.
    pub fn reveal(&mut self, index: usize) -> Result<String, SessionError> {
        let attempt = self.attempt_mut(index)?;
        attempt.revealed = true;
        Ok(attempt.exercise.answer.clone())
    }

    pub fn correct_count(&self) -> usize {
        self.exercises
            .iter()
            .filter(|attempt| attempt.correct == Some(true))
            .count()
    }

    fn attempt_mut(&mut self, index: usize) -> Result<&mut ExerciseAttempt, SessionError> {
        let len = self.exercises.len();
        self.exercises
            .get_mut(index)
            .ok_or(SessionError::NoSuchExercise { index, len })
    }
}
