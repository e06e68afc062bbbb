//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the practice pages.

use grammar_drill_core::{GenerationEvent, GrammarDomain, SessionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts generating a table and exercises for `word`. Any generation
    /// still running for this connection is cancelled first.
    Generate { word: String, domain: GrammarDomain },

    /// Checks the learner's answer for one exercise.
    SubmitAnswer { index: usize, answer: String },

    /// Shows the canonical answer of one exercise.
    Reveal { index: usize },

    /// Stops the running generation.
    Cancel,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection is ready.
    SessionInitialized { session_id: Uuid },

    /// One event of a Generation Result.
    Generation {
        generation_id: Uuid,
        event: GenerationEvent,
    },

    /// Result of a `submit_answer`.
    AnswerChecked { index: usize, correct: bool },

    /// Result of a `reveal`.
    AnswerRevealed { index: usize, answer: String },

    /// The session status changed outside of a generation event.
    Status { status: SessionStatus },

    /// Reports an error that does not end the connection.
    Error { message: String },
}
