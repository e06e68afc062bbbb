//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::{error::ApiError, web::state::AppState};
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use grammar_drill_core::{
    check_answer,
    prompts::{correction_messages, PromptError},
    GenerationEvent, GrammarDomain, PortError, ResponseFormat,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_handler,
        check_answer_handler,
        correction_handler,
        health_handler,
    ),
    components(
        schemas(
            GenerateRequest,
            GenerateResponse,
            CheckAnswerRequest,
            CheckAnswerResponse,
            CorrectionRequest,
            CorrectionResponse,
        )
    ),
    tags(
        (name = "Grammar Drill API", description = "Conjugation and declension practice backed by an LLM.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// The verb or adjective to practise, e.g. "gehen".
    pub word: String,
    /// `verb` or `adjective`.
    #[schema(value_type = String, example = "verb")]
    pub domain: GrammarDomain,
}

/// The complete Generation Result for one word.
#[derive(Serialize, ToSchema)]
pub struct GenerateResponse {
    pub word: String,
    #[schema(value_type = String)]
    pub domain: GrammarDomain,
    pub generated_at: DateTime<Utc>,
    /// `tables`, then `exercise`s, then `complete` or `error`.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<GenerationEvent>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckAnswerRequest {
    pub answer: String,
    pub expected: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckAnswerResponse {
    pub correct: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CorrectionRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct CorrectionResponse {
    pub corrected: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Generate a reference table and exercises for a word.
///
/// Runs the whole generation and returns every event at once. Vendor and
/// extraction failures are reported inside `events`, not as HTTP errors.
#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Generation Result", body = GenerateResponse),
        (status = 400, description = "Empty word")
    )
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let word = request.word.trim().to_string();
    if word.is_empty() {
        return Err(PortError::InvalidInput(PromptError::EmptyWord).into());
    }

    info!("REST generation requested for '{}' ({}).", word, request.domain);
    let events = app_state.generator.collect(&word, request.domain).await;

    Ok(Json(GenerateResponse {
        word,
        domain: request.domain,
        generated_at: Utc::now(),
        events,
    }))
}

/// Check an answer against the expected form.
#[utoipa::path(
    post,
    path = "/answers/check",
    request_body = CheckAnswerRequest,
    responses(
        (status = 200, description = "Whether the answer is correct", body = CheckAnswerResponse)
    )
)]
pub async fn check_answer_handler(Json(request): Json<CheckAnswerRequest>) -> Json<CheckAnswerResponse> {
    Json(CheckAnswerResponse {
        correct: check_answer(&request.answer, &request.expected),
    })
}

/// Correct a free German text and explain the corrections.
#[utoipa::path(
    post,
    path = "/corrections",
    request_body = CorrectionRequest,
    responses(
        (status = 200, description = "Corrected text with explanations", body = CorrectionResponse),
        (status = 400, description = "Empty text"),
        (status = 502, description = "The LLM vendor failed"),
        (status = 503, description = "The LLM API key is not configured")
    )
)]
pub async fn correction_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CorrectionRequest>,
) -> Result<Json<CorrectionResponse>, ApiError> {
    let messages = correction_messages(&request.text).map_err(PortError::from)?;
    let corrected = app_state
        .llm
        .complete(&messages, ResponseFormat::Text)
        .await?;
    Ok(Json(CorrectionResponse { corrected }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health_handler() -> &'static str {
    "ok"
}
