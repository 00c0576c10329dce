//! AI gateway module
//!
//! OpenAI-compatible chat-completion client used by the classifier. The
//! client performs no retries of its own; retry scheduling belongs to the
//! response executor's backoff policy.

pub mod client;
pub mod types;

pub use client::{AiError, AiGatewayClient};
pub use types::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
