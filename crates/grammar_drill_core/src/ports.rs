//! crates/grammar_drill_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! The generation pipeline only talks to the LLM through these traits, so it
//! stays independent of the vendor API and of the HTTP client.

use crate::domain::{ChatMessage, ResponseFormat};
use crate::prompts::PromptError;
use crate::repair::ExtractionError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Errors that end a generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Missing or invalid credentials. Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Network failure or a non-success status from the vendor API.
    #[error("{0}")]
    Transport(String),
    /// The response could not be reduced to a table and exercises.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// The submitted word or text was rejected before any request was made.
    #[error("{0}")]
    InvalidInput(#[from] PromptError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Text deltas of a streamed completion, in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Sends `messages` and waits for the full reply text.
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> PortResult<String>;

    /// Sends `messages` and yields the reply as it is generated.
    async fn complete_streaming(&self, messages: &[ChatMessage]) -> PortResult<TextStream>;
}
