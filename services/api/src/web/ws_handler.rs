//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection owns one practice session; generations run as separate
//! tasks so the loop can keep handling answers and cancellations.

use crate::web::{
    generation_task::generation_process,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SessionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

/// Messages queued for the socket writer.
const OUTBOX_CAPACITY: usize = 64;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // A single writer task owns the sink; everything else goes through the outbox.
    let (outbox, mut inbox) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to write to WebSocket. Client may have disconnected.");
                break;
            }
        }
    });

    // --- 1. Initialization Phase ---
    let session = SessionState::new();
    let session_id = session.session_id;
    let session_state_lock = Arc::new(Mutex::new(session));
    info!("New WebSocket connection established, session {}", session_id);

    if outbox
        .send(ServerMessage::SessionInitialized { session_id })
        .await
        .is_err()
    {
        error!("Failed to send session initialized message.");
        return;
    }

    // --- 2. Main Message Loop ---
    let mut generation_task_handle: Option<JoinHandle<()>> = None;
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_message(
                    text.as_str(),
                    &app_state,
                    &session_state_lock,
                    &outbox,
                    &mut generation_task_handle,
                )
                .await;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    session_state_lock.lock().await.cancel_generation();
    if let Some(handle) = generation_task_handle {
        handle.abort();
    }
    drop(outbox);
    if writer.await.is_err() {
        warn!("WebSocket writer task ended abnormally.");
    }
    info!("WebSocket connection for session {} closed.", session_id);
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    outbox: &mpsc::Sender<ServerMessage>,
    generation_task_handle: &mut Option<JoinHandle<()>>,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            reply(outbox, ServerMessage::Error {
                message: "Unrecognized message.".to_string(),
            })
            .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::Generate { word, domain } => {
            if word.trim().is_empty() {
                reply(outbox, ServerMessage::Error {
                    message: "Please enter a word.".to_string(),
                })
                .await;
                return;
            }
            info!("Generate message received for '{}' ({}).", word.trim(), domain);

            let (generation_id, token) = session_state_lock
                .lock()
                .await
                .start_generation(&word, domain);
            if let Some(previous) = generation_task_handle.take() {
                previous.abort();
            }

            let app_state = app_state.clone();
            let session_state_lock = session_state_lock.clone();
            let outbox = outbox.clone();
            *generation_task_handle = Some(tokio::spawn(async move {
                let outcome = generation_process(
                    app_state,
                    session_state_lock,
                    outbox,
                    generation_id,
                    word,
                    domain,
                    token,
                )
                .await;
                info!("Generation {} ended: {:?}", generation_id, outcome);
            }));
        }
        ClientMessage::SubmitAnswer { index, answer } => {
            let checked = session_state_lock
                .lock()
                .await
                .exercises
                .submit_answer(index, &answer);
            let message = match checked {
                Ok(correct) => ServerMessage::AnswerChecked { index, correct },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            reply(outbox, message).await;
        }
        ClientMessage::Reveal { index } => {
            let revealed = session_state_lock.lock().await.exercises.reveal(index);
            let message = match revealed {
                Ok(answer) => ServerMessage::AnswerRevealed { index, answer },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            reply(outbox, message).await;
        }
        ClientMessage::Cancel => {
            info!("Cancel message received.");
            let status = {
                let mut session = session_state_lock.lock().await;
                session.cancel_generation();
                session.exercises.status.clone()
            };
            if let Some(handle) = generation_task_handle.take() {
                handle.abort();
            }
            reply(outbox, ServerMessage::Status { status }).await;
        }
    }
}

async fn reply(outbox: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if outbox.send(message).await.is_err() {
        warn!("Failed to queue reply. Client may have disconnected.");
    }
}
