//! TikTok adapter implementation
//!
//! Adapter for the TikTok Open API convention: the access token is sent as an
//! `Authorization: Bearer` header and data-path endpoints are POSTs with JSON
//! bodies.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::adapters::trait_::{
    AuthorizeParams, CommentBatch, DeliveryReceipt, ExchangeCodeParams, FetchCommentsParams,
    FetchMessagesParams, InboundComment, InboundMessage, MessageBatch, NewConnection,
    RefreshedCredentials, SendMessageParams,
};
use crate::adapters::{AdapterError, AdapterRegistry, AuthStyle, PlatformAdapter, PlatformMetadata};

pub const TIKTOK_PLATFORM_SLUG: &str = "tiktok";

const DEFAULT_MESSAGE_LIMIT: u32 = 20;

/// TikTok adapter
#[derive(Clone)]
pub struct TikTokAdapter {
    client_key: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default = "Vec::new")]
    messages: Vec<WireMessage>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: String,
    sender_open_id: String,
    #[serde(default)]
    sender_nickname: Option<String>,
    #[serde(default)]
    sender_avatar_url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    create_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    #[serde(default = "Vec::new")]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    comment_id: String,
    user_open_id: String,
    #[serde(default)]
    user_nickname: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendReceipt {
    message_id: String,
}

impl TikTokAdapter {
    /// Create a new TikTok adapter with the given app credentials and base
    /// URLs
    pub fn new(
        client_key: String,
        client_secret: String,
        oauth_base: String,
        api_base: String,
    ) -> Self {
        Self {
            client_key,
            client_secret,
            oauth_base,
            api_base,
            http: reqwest::Client::new(),
        }
    }

    async fn error_from_response(response: reqwest::Response) -> AdapterError {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return AdapterError::RateLimited { retry_after };
        }

        let body = response.text().await.ok();
        AdapterError::RemoteApi {
            platform: TIKTOK_PLATFORM_SLUG.to_string(),
            status: status.as_u16(),
            body,
        }
    }

    fn network_error(err: reqwest::Error) -> AdapterError {
        AdapterError::Network {
            details: err.to_string(),
            retryable: err.is_timeout() || err.is_connect(),
        }
    }

    fn malformed(details: impl Into<String>) -> AdapterError {
        AdapterError::MalformedResponse {
            platform: TIKTOK_PLATFORM_SLUG.to_string(),
            details: details.into(),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AdapterError> {
        let response = self
            .http
            .post(format!("{}/v2/oauth/token/", self.api_base))
            .form(form)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Self::malformed(e.to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    async fn authorize(&self, params: AuthorizeParams) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!("{}/v2/auth/authorize/", self.oauth_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_key", &self.client_key)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("scope", "user.info.basic,direct.message")
            .append_pair("response_type", "code")
            .append_pair("state", &params.state);

        Ok(url)
    }

    async fn exchange_code(&self, params: ExchangeCodeParams) -> Result<NewConnection, AdapterError> {
        let token = self
            .token_request(&[
                ("client_key", self.client_key.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", params.redirect_uri.as_str()),
                ("code", params.code.as_str()),
            ])
            .await?;

        let open_id = token.open_id.ok_or_else(|| {
            Self::malformed("token response missing open_id".to_string())
        })?;

        let expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        Ok(NewConnection {
            platform_user_id: open_id,
            display_name: None,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            metadata: token.scope.map(|scope| serde_json::json!({ "scope": scope })),
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedCredentials, AdapterError> {
        let token = self
            .token_request(&[
                ("client_key", self.client_key.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        let expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        Ok(RefreshedCredentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }

    async fn fetch_messages(&self, params: FetchMessagesParams) -> Result<MessageBatch, AdapterError> {
        let body = serde_json::json!({
            "max_count": params.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT),
            "since_message_id": params.since_message_id,
        });

        let response = self
            .http
            .post(format!("{}/v2/direct_message/list/", self.api_base))
            .bearer_auth(&params.ctx.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let envelope: DataEnvelope<MessageList> = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        let mut messages: Vec<InboundMessage> = envelope
            .data
            .messages
            .into_iter()
            .filter_map(|wire| {
                let text = wire.text?;
                let sent_at = wire
                    .create_time
                    .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0));
                Some(InboundMessage {
                    platform_message_id: wire.message_id,
                    participant_id: wire.sender_open_id,
                    participant_username: wire.sender_nickname,
                    participant_avatar_url: wire.sender_avatar_url,
                    text,
                    sent_at,
                })
            })
            .collect();

        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));

        Ok(MessageBatch {
            messages,
            next_cursor: envelope.data.cursor,
            has_more: envelope.data.has_more,
        })
    }

    async fn fetch_comments(&self, params: FetchCommentsParams) -> Result<CommentBatch, AdapterError> {
        let body = serde_json::json!({
            "max_count": params.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT),
        });

        let response = self
            .http
            .post(format!("{}/v2/comment/list/", self.api_base))
            .bearer_auth(&params.ctx.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let envelope: DataEnvelope<CommentList> = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        let comments = envelope
            .data
            .comments
            .into_iter()
            .filter_map(|wire| {
                let text = wire.text?;
                Some(InboundComment {
                    comment_id: wire.comment_id,
                    author_id: wire.user_open_id,
                    author_username: wire.user_nickname,
                    text,
                })
            })
            .collect();

        Ok(CommentBatch { comments })
    }

    async fn send_message(&self, params: SendMessageParams) -> Result<DeliveryReceipt, AdapterError> {
        if params.text.trim().is_empty() {
            return Err(AdapterError::MalformedRequest {
                details: "message text cannot be empty".to_string(),
            });
        }

        let body = serde_json::json!({
            "to_open_id": params.participant_id,
            "text": params.text,
        });

        let response = self
            .http
            .post(format!("{}/v2/direct_message/send/", self.api_base))
            .bearer_auth(&params.ctx.access_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let envelope: DataEnvelope<SendReceipt> = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        Ok(DeliveryReceipt {
            platform_message_id: envelope.data.message_id,
        })
    }
}

/// Register the TikTok adapter with the registry
pub fn register_tiktok_adapter(registry: &mut AdapterRegistry, adapter: Arc<TikTokAdapter>) {
    registry.register(
        adapter,
        PlatformMetadata::new(
            TIKTOK_PLATFORM_SLUG.to_string(),
            "TikTok".to_string(),
            AuthStyle::BearerHeader,
            vec!["user.info.basic".to_string(), "direct.message".to_string()],
            true,
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn adapter() -> TikTokAdapter {
        TikTokAdapter::new(
            "client-key".to_string(),
            "client-secret".to_string(),
            "https://www.tiktok.com".to_string(),
            "https://open.tiktokapis.com".to_string(),
        )
    }

    #[tokio::test]
    async fn authorize_url_uses_client_key() {
        let url = adapter()
            .authorize(AuthorizeParams {
                account_id: Uuid::new_v4(),
                redirect_uri: "https://app.example.com/callback".to_string(),
                state: "nonce-2".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(url.host_str(), Some("www.tiktok.com"));
        assert_eq!(url.path(), "/v2/auth/authorize/");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs.get("client_key").map(String::as_str),
            Some("client-key")
        );
        assert_eq!(pairs.get("state").map(String::as_str), Some("nonce-2"));
    }

    #[test]
    fn wire_message_parses_open_api_shape() {
        let raw = serde_json::json!({
            "data": {
                "messages": [
                    {
                        "message_id": "dm-1",
                        "sender_open_id": "open-7",
                        "sender_nickname": "fan",
                        "text": "hello!",
                        "create_time": 1748800000
                    }
                ],
                "cursor": "c-2",
                "has_more": true
            }
        });

        let envelope: DataEnvelope<MessageList> = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.data.messages.len(), 1);
        assert!(envelope.data.has_more);
        assert_eq!(envelope.data.cursor.as_deref(), Some("c-2"));
    }
}
