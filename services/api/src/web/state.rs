//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use grammar_drill_core::{
    ChatCompletionService, ExerciseSession, GenerationEvent, Generator, GrammarDomain, Pacing,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn ChatCompletionService>,
    pub generator: Generator,
    pub pacing: Pacing,
}

impl AppState {
    pub fn new(config: Arc<Config>, llm: Arc<dyn ChatCompletionService>) -> Self {
        let generator = Generator::new(llm.clone(), config.generator_settings());
        let pacing = config.pacing();
        Self {
            config,
            llm,
            generator,
            pacing,
        }
    }
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection.
pub struct SessionState {
    pub session_id: Uuid,
    pub exercises: ExerciseSession,
    /// The generation whose events may still be applied. Events tagged with
    /// any other id are stale and dropped.
    pub generation_id: Option<Uuid>,
    /// A token to cancel the current generation task.
    pub cancellation_token: CancellationToken,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            exercises: ExerciseSession::new(),
            generation_id: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Cancels whatever is running and registers a new generation.
    ///
    /// Returns the new generation's id and the token its task must watch.
    pub fn start_generation(&mut self, word: &str, domain: GrammarDomain) -> (Uuid, CancellationToken) {
        self.cancellation_token.cancel();
        self.cancellation_token = CancellationToken::new();

        let generation_id = Uuid::new_v4();
        self.generation_id = Some(generation_id);
        self.exercises.begin(word, domain);
        (generation_id, self.cancellation_token.clone())
    }

    /// Applies `event` if it belongs to the current generation.
    pub fn apply_if_current(&mut self, generation_id: Uuid, event: GenerationEvent) -> bool {
        if self.generation_id != Some(generation_id) {
            return false;
        }
        let terminal = event.is_terminal();
        self.exercises.apply(event);
        if terminal {
            self.generation_id = None;
        }
        true
    }

    /// Stops the current generation, keeping what has been shown.
    pub fn cancel_generation(&mut self) {
        self.cancellation_token.cancel();
        self.generation_id = None;
        self.exercises.cancel();
    }
}
