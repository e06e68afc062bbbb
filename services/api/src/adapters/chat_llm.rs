//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the chat-completion LLM (DeepSeek or
//! any OpenAI-compatible endpoint). It implements the `ChatCompletionService`
//! port from the `core` crate.

use crate::adapters::sse::{delta_content, SseDecoder, SseEvent};
use crate::config::Config;
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use grammar_drill_core::{
    ChatCompletionService, ChatMessage, PortError, PortResult, ResponseFormat, TextStream,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatCompletionService` over HTTP.
#[derive(Clone)]
pub struct DeepSeekChatAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key_var: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl DeepSeekChatAdapter {
    /// Creates a new `DeepSeekChatAdapter`.
    ///
    /// `api_key_var` names the environment variable holding the key; it is
    /// read on every request, not here.
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        api_key_var: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key_var: api_key_var.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 8000,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.llm_api_base.clone(),
            config.llm_api_key_var.clone(),
            config.llm_model.clone(),
        )
        .with_sampling(config.llm_temperature, config.llm_max_tokens)
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn api_key(&self) -> PortResult<String> {
        std::env::var(&self.api_key_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PortError::Configuration(format!(
                    "the API key variable {} is not set",
                    self.api_key_var
                ))
            })
    }

    /// Posts the request and rejects non-success statuses.
    async fn send(&self, request: &ChatRequest<'_>) -> PortResult<reqwest::Response> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.api_base);
        debug!("POST {} (stream: {})", url, request.stream);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("DeepSeek API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or(status.as_str());
            warn!("DeepSeek API answered with status {}", status);
            return Err(PortError::Transport(format!(
                "DeepSeek API error: {}",
                status_text
            )));
        }
        Ok(response)
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        format: ResponseFormat,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: match format {
                ResponseFormat::JsonObject => Some(ResponseFormatBody {
                    kind: "json_object",
                }),
                ResponseFormat::Text => None,
            },
            stream,
        }
    }
}

//=========================================================================================
// `ChatCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatCompletionService for DeepSeekChatAdapter {
    /// Sends the messages and returns `choices[0].message.content`.
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> PortResult<String> {
        let request = self.request(messages, format, false);
        let response = self.send(&request).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("Invalid DeepSeek API response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Transport("DeepSeek API response contained no content".to_string())
            })
    }

    /// Sends the messages with `stream: true` and yields the text deltas.
    async fn complete_streaming(&self, messages: &[ChatMessage]) -> PortResult<TextStream> {
        let request = self.request(messages, ResponseFormat::Text, true);
        let response = self.send(&request).await?;
        info!("DeepSeek stream opened.");

        let mut body = Box::pin(response.bytes_stream());
        let deltas = stream! {
            let mut decoder = SseDecoder::new();
            let mut saw_data = false;
            let mut finished = false;

            while !finished {
                let events = match body.next().await {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        yield Err(PortError::Transport(format!("DeepSeek stream failed: {}", e)));
                        return;
                    }
                    None => {
                        finished = true;
                        decoder.finish().into_iter().collect()
                    }
                };

                for event in events {
                    match event {
                        SseEvent::Done => {
                            finished = true;
                            break;
                        }
                        SseEvent::Data(data) => {
                            saw_data = true;
                            match delta_content(&data) {
                                Ok(Some(text)) => {
                                    yield Ok(text);
                                }
                                Ok(None) => {}
                                Err(e) => warn!("Skipping malformed stream line ({}): {}", e, data),
                            }
                        }
                    }
                }
            }

            if !saw_data {
                yield Err(PortError::Transport("No response body received".to_string()));
            }
        };

        Ok(Box::pin(deltas))
    }
}
