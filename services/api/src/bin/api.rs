//! services/api/src/bin/api.rs

use api_lib::{
    adapters::DeepSeekChatAdapter,
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // The key is read again on every request; this is only an early hint.
    if std::env::var(&config.llm_api_key_var).is_err() {
        warn!(
            "{} is not set; generation requests will fail until it is.",
            config.llm_api_key_var
        );
    }

    // --- 2. Initialize Service Adapters ---
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("grammar-drill/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let llm = Arc::new(DeepSeekChatAdapter::from_config(http_client, &config));
    info!(
        "Using model {} at {} ({:?} generation, {:?} extraction).",
        config.llm_model, config.llm_api_base, config.generation_mode, config.extractor_scan
    );

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), llm));

    // --- 4. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
