//! services/api/src/web/generation_task.rs
//!
//! This module contains the asynchronous "worker" function that runs one
//! generation and forwards its events to the client.

use crate::web::{
    protocol::ServerMessage,
    state::{AppState, SessionState},
};
use futures::StreamExt;
use grammar_drill_core::GrammarDomain;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// How a generation task ended.
#[derive(Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The last event (`complete` or `error`) was delivered.
    Finished,
    /// The token was cancelled or a newer generation took over.
    Superseded,
    /// The client went away.
    Disconnected,
}

/// Drives the generation for `word`, applying each event to the session and
/// sending it to the client.
///
/// Exercise events are paced according to `AppState::pacing`. The task stops
/// as soon as `cancellation_token` fires, including during the pacing delay.
pub async fn generation_process(
    app_state: Arc<AppState>,
    session_state_lock: Arc<Mutex<SessionState>>,
    outbox: mpsc::Sender<ServerMessage>,
    generation_id: Uuid,
    word: String,
    domain: GrammarDomain,
    cancellation_token: CancellationToken,
) -> GenerationOutcome {
    info!("Generation {} started for '{}'.", generation_id, word);
    let mut events = app_state.generator.generate(&word, domain);

    loop {
        let event = tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Generation {} cancelled.", generation_id);
                return GenerationOutcome::Superseded;
            }
            next = events.next() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let delay = app_state.pacing.delay_after(&event);
        let terminal = event.is_terminal();

        {
            let mut session = session_state_lock.lock().await;
            if !session.apply_if_current(generation_id, event.clone()) {
                info!("Generation {} is stale; dropping its events.", generation_id);
                return GenerationOutcome::Superseded;
            }
        }

        let message = ServerMessage::Generation {
            generation_id,
            event,
        };
        if outbox.send(message).await.is_err() {
            warn!("Client went away during generation {}.", generation_id);
            return GenerationOutcome::Disconnected;
        }

        if terminal {
            break;
        }
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancellation_token.cancelled() => return GenerationOutcome::Superseded,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    info!("Generation {} finished.", generation_id);
    GenerationOutcome::Finished
}
