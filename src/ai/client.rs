//! HTTP client for the OpenAI-compatible chat-completion gateway.
//!
//! Handles request construction, authentication and status mapping. 429 and
//! 402 get their own variants because the UI surfaces them differently; all
//! other non-2xx statuses collapse into a generic gateway error.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::ai::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::AiGatewayConfig;

/// AI gateway error taxonomy
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    /// Gateway returned HTTP 429
    #[error("AI gateway rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },
    /// Gateway returned HTTP 402 (credits exhausted)
    #[error("AI gateway credits exhausted")]
    QuotaExhausted,
    /// Any other non-2xx gateway response
    #[error("AI gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },
    /// Network or connectivity error
    #[error("network error: {0}")]
    Network(String),
    /// 2xx response carrying no usable completion text
    #[error("AI gateway returned an empty completion")]
    EmptyCompletion,
}

/// Client for the chat-completion gateway
#[derive(Debug, Clone)]
pub struct AiGatewayClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl AiGatewayClient {
    /// Build a client from gateway configuration.
    pub fn new(config: &AiGatewayConfig) -> Result<Self, AiError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AiError::Network(format!("invalid API key header value: {}", e)))?;
            headers.insert("authorization", value);
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// The configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Overrides the base URL (for tests with a mock server).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Send a non-streaming completion request and return the top choice
    /// text.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            stream: false,
        };

        let response = self
            .http
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = %status, "chat completion response received");

        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                return Err(AiError::RateLimited { retry_after });
            }
            402 => return Err(AiError::QuotaExhausted),
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AiError::Gateway {
                    status: status.as_u16(),
                    message: body,
                });
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;
        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::Gateway {
                status: status.as_u16(),
                message: format!("failed to parse completion response: {}", e),
            })?;

        match completion.top_choice_text() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(AiError::EmptyCompletion),
        }
    }
}
