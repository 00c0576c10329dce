//! Platform adapter trait definition
//!
//! Defines the standard interface that all platform adapter implementations
//! must follow, plus the error taxonomy shared between adapters and the
//! response pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::crypto::{CryptoKey, decrypt_connection_tokens};
use crate::models::connection::Model as Connection;

/// Adapter error taxonomy for structured error handling
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// No usable credential: connection missing, inactive, or token-less.
    /// Raised before any network I/O is attempted.
    #[error("no usable {platform} credential")]
    NotConnected { platform: String },
    /// Request was missing a required parameter
    #[error("malformed request: {details}")]
    MalformedRequest { details: String },
    /// Upstream platform returned a non-2xx; status and body surfaced
    /// verbatim
    #[error("platform {platform} returned HTTP {status}: {}", body.as_deref().unwrap_or("no body"))]
    RemoteApi {
        platform: String,
        status: u16,
        body: Option<String>,
    },
    /// Upstream platform returned 429
    #[error("platform rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },
    /// Platform response could not be decoded
    #[error("malformed {platform} response: {details}")]
    MalformedResponse { platform: String, details: String },
    /// Network or connectivity error
    #[error("network error: {details}")]
    Network { details: String, retryable: bool },
}

/// Pipeline error classification used by the executor for retry decisions
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineError {
    #[serde(flatten)]
    pub kind: PipelineErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineErrorKind {
    /// Authentication/authorization failure (stale or revoked token)
    Unauthorized,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Transient/retryable error
    Transient,
    /// Permanent/non-retryable error
    Permanent,
}

impl PipelineError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self {
            kind: PipelineErrorKind::Unauthorized,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: PipelineErrorKind::RateLimited { retry_after_secs },
            message: None,
            details: None,
        }
    }

    pub fn rate_limited_with_message<S: Into<String>>(
        retry_after_secs: Option<u64>,
        message: S,
    ) -> Self {
        Self {
            kind: PipelineErrorKind::RateLimited { retry_after_secs },
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: PipelineErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: PipelineErrorKind::Permanent,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PipelineErrorKind::Unauthorized => write!(f, "Unauthorized")?,
            PipelineErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            PipelineErrorKind::Transient => write!(f, "Transient error")?,
            PipelineErrorKind::Permanent => write!(f, "Permanent error")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {}

impl From<AdapterError> for PipelineError {
    fn from(adapter_error: AdapterError) -> Self {
        match adapter_error {
            AdapterError::RateLimited { retry_after } => PipelineError::rate_limited(retry_after),
            AdapterError::NotConnected { platform } => {
                PipelineError::unauthorized(format!("no usable {} credential", platform))
            }
            AdapterError::Network { details, retryable } => {
                if retryable {
                    PipelineError::transient(details)
                } else {
                    PipelineError::permanent(details)
                }
            }
            AdapterError::RemoteApi {
                platform,
                status,
                body,
            } => {
                if status == 401 {
                    PipelineError::unauthorized(format!(
                        "platform {} rejected the access token",
                        platform
                    ))
                } else if (400..500).contains(&status) {
                    PipelineError::permanent(format!(
                        "platform {} HTTP {}: {}",
                        platform,
                        status,
                        body.unwrap_or_default()
                    ))
                } else {
                    PipelineError::transient(format!(
                        "platform {} HTTP {}: {}",
                        platform,
                        status,
                        body.unwrap_or_default()
                    ))
                }
            }
            AdapterError::MalformedResponse { platform, details } => {
                PipelineError::transient(format!("malformed {} response: {}", platform, details))
            }
            AdapterError::MalformedRequest { details } => {
                PipelineError::permanent(format!("malformed request: {}", details))
            }
        }
    }
}

impl From<crate::ai::AiError> for PipelineError {
    fn from(ai_error: crate::ai::AiError) -> Self {
        use crate::ai::AiError;
        match ai_error {
            AiError::RateLimited { retry_after } => PipelineError::rate_limited_with_message(
                retry_after,
                "AI gateway rate limit exceeded",
            ),
            AiError::QuotaExhausted => {
                PipelineError::permanent("AI gateway credits exhausted".to_string())
            }
            AiError::Gateway { status, message } => {
                if (500..600).contains(&status) {
                    PipelineError::transient(format!("AI gateway HTTP {}: {}", status, message))
                } else {
                    PipelineError::permanent(format!("AI gateway HTTP {}: {}", status, message))
                }
            }
            AiError::Network(details) => PipelineError::transient(details),
            AiError::EmptyCompletion => {
                PipelineError::transient("AI gateway returned an empty completion".to_string())
            }
        }
    }
}

/// A resolved connection plus its decrypted access token.
///
/// All data-path adapter calls go through one of these, so the token is read
/// at call time (a refresh that landed a moment ago is picked up by the next
/// resolve) and the not-connected gate runs before any network I/O.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub connection: Connection,
    pub access_token: String,
}

impl AdapterContext {
    /// Resolve a context from a connection row, enforcing the connected
    /// invariant and decrypting the stored token. Performs no I/O.
    pub fn from_connection(
        crypto_key: &CryptoKey,
        connection: Connection,
    ) -> Result<Self, AdapterError> {
        if !connection.is_connected() {
            return Err(AdapterError::NotConnected {
                platform: connection.platform_slug.clone(),
            });
        }

        let (access_token, _refresh_token) = decrypt_connection_tokens(crypto_key, &connection)
            .map_err(|_| AdapterError::NotConnected {
                platform: connection.platform_slug.clone(),
            })?;

        match access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Self {
                connection,
                access_token,
            }),
            _ => Err(AdapterError::NotConnected {
                platform: connection.platform_slug.clone(),
            }),
        }
    }
}

/// Parameters for the authorize step of the connect flow
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub account_id: Uuid,
    pub redirect_uri: String,
    pub state: String,
}

/// Parameters for exchanging an authorization code
#[derive(Debug, Clone)]
pub struct ExchangeCodeParams {
    pub account_id: Uuid,
    pub code: String,
    pub redirect_uri: String,
}

/// An unsaved connection produced by a successful code exchange
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub platform_user_id: String,
    pub display_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Fresh credentials produced by a token refresh
#[derive(Debug, Clone)]
pub struct RefreshedCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parameters for fetching inbound direct messages
#[derive(Debug, Clone)]
pub struct FetchMessagesParams {
    pub ctx: AdapterContext,
    /// Platform message id of the newest already-processed message; only
    /// strictly newer messages are returned
    pub since_message_id: Option<String>,
    pub limit: Option<u32>,
}

/// One inbound direct message from the platform
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub platform_message_id: String,
    pub participant_id: String,
    pub participant_username: Option<String>,
    pub participant_avatar_url: Option<String>,
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Result of a message fetch
#[derive(Debug, Clone)]
pub struct MessageBatch {
    pub messages: Vec<InboundMessage>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Parameters for fetching recent comments
#[derive(Debug, Clone)]
pub struct FetchCommentsParams {
    pub ctx: AdapterContext,
    pub limit: Option<u32>,
}

/// One public comment from the platform
#[derive(Debug, Clone)]
pub struct InboundComment {
    pub comment_id: String,
    pub author_id: String,
    pub author_username: Option<String>,
    pub text: String,
}

/// Result of a comment fetch
#[derive(Debug, Clone)]
pub struct CommentBatch {
    pub comments: Vec<InboundComment>,
}

/// Parameters for sending an outbound message
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub ctx: AdapterContext,
    pub participant_id: String,
    pub text: String,
}

/// Acknowledgment of a delivered message
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub platform_message_id: String,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Begin the authorization flow for this platform.
    /// Returns an authorization URL for the user to visit.
    async fn authorize(&self, params: AuthorizeParams) -> Result<Url, AdapterError>;

    /// Exchange an authorization code for platform credentials and identity.
    async fn exchange_code(&self, params: ExchangeCodeParams) -> Result<NewConnection, AdapterError>;

    /// Exchange a refresh token for fresh credentials. The caller persists
    /// them; there is no transparent refresh-and-retry around other calls.
    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedCredentials, AdapterError>;

    /// Fetch inbound direct messages newer than the given cursor.
    async fn fetch_messages(&self, params: FetchMessagesParams) -> Result<MessageBatch, AdapterError>;

    /// Fetch recent public comments for buying-signal scanning.
    async fn fetch_comments(&self, params: FetchCommentsParams) -> Result<CommentBatch, AdapterError>;

    /// Send a direct message to a participant.
    async fn send_message(&self, params: SendMessageParams) -> Result<DeliveryReceipt, AdapterError>;
}
