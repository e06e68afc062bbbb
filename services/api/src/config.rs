//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The LLM API key itself is *not* part of
//! this struct: the adapter reads it from the environment on every call.

use grammar_drill_core::{GenerationMode, GeneratorSettings, Pacing, ScanMode};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    pub llm_api_base: String,
    pub llm_api_key_var: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub exercise_count: usize,
    pub exercise_interval: Duration,
    pub generation_mode: GenerationMode,
    pub extractor_scan: ScanMode,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- LLM Settings ---
        let llm_api_base = var_or("LLM_API_BASE", "https://api.deepseek.com/v1")
            .trim_end_matches('/')
            .to_string();
        let llm_api_key_var = var_or("LLM_API_KEY_VAR", "DEEPSEEK_API_KEY");
        if llm_api_key_var.trim().is_empty() {
            return Err(ConfigError::MissingVar("LLM_API_KEY_VAR".to_string()));
        }
        let llm_model = var_or("LLM_MODEL", "deepseek-chat");
        let llm_temperature = parse_var("LLM_TEMPERATURE", &var_or("LLM_TEMPERATURE", "0.7"))?;
        let llm_max_tokens = parse_var("LLM_MAX_TOKENS", &var_or("LLM_MAX_TOKENS", "8000"))?;

        // --- Generation Settings ---
        let exercise_count: usize = parse_var("EXERCISE_COUNT", &var_or("EXERCISE_COUNT", "32"))?;
        if exercise_count == 0 {
            return Err(ConfigError::InvalidValue(
                "EXERCISE_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let interval_ms: u64 =
            parse_var("EXERCISE_INTERVAL_MS", &var_or("EXERCISE_INTERVAL_MS", "500"))?;
        let generation_mode = parse_var("GENERATION_MODE", &var_or("GENERATION_MODE", "streaming"))?;
        let extractor_scan = parse_var("EXTRACTOR_SCAN", &var_or("EXTRACTOR_SCAN", "flat"))?;

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            llm_api_base,
            llm_api_key_var,
            llm_model,
            llm_temperature,
            llm_max_tokens,
            exercise_count,
            exercise_interval: Duration::from_millis(interval_ms),
            generation_mode,
            extractor_scan,
        })
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            exercise_count: self.exercise_count,
            mode: self.generation_mode,
            scan: self.extractor_scan,
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(self.exercise_interval)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
