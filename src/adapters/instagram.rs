//! Instagram adapter implementation
//!
//! Reference adapter for the Meta Graph convention: the access token rides as
//! an `access_token` query parameter on every data-path call. Supports the
//! OAuth2 web flow, DM polling, comment scanning and DM sending.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::adapters::trait_::{
    AuthorizeParams, CommentBatch, DeliveryReceipt, ExchangeCodeParams, FetchCommentsParams,
    FetchMessagesParams, InboundComment, InboundMessage, MessageBatch, NewConnection,
    RefreshedCredentials, SendMessageParams,
};
use crate::adapters::{AdapterError, AdapterRegistry, AuthStyle, PlatformAdapter, PlatformMetadata};

pub const INSTAGRAM_PLATFORM_SLUG: &str = "instagram";

const DEFAULT_MESSAGE_LIMIT: u32 = 50;
const DEFAULT_COMMENT_LIMIT: u32 = 50;

/// Instagram adapter
#[derive(Clone)]
pub struct InstagramAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    cursors: Option<PagingCursors>,
}

#[derive(Debug, Deserialize)]
struct PagingCursors {
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    from: WireParty,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    id: String,
    from: WireParty,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireParty {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    profile_picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendReceipt {
    message_id: String,
}

impl InstagramAdapter {
    /// Create a new Instagram adapter with the given app credentials and
    /// base URLs
    pub fn new(
        client_id: String,
        client_secret: String,
        oauth_base: String,
        api_base: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            oauth_base,
            api_base,
            http: reqwest::Client::new(),
        }
    }

    /// Convert a response into an adapter error, preserving the upstream
    /// status and body.
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
            platform: INSTAGRAM_PLATFORM_SLUG.to_string(),
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
            platform: INSTAGRAM_PLATFORM_SLUG.to_string(),
            details: details.into(),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, AdapterError> {
        let mut url = Url::parse(&format!("{}/me", self.api_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,username")
            .append_pair("access_token", access_token);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| Self::malformed(e.to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    async fn authorize(&self, params: AuthorizeParams) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!("{}/oauth/authorize", self.oauth_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("scope", "user_profile,user_media,instagram_manage_messages")
            .append_pair("response_type", "code")
            .append_pair("state", &params.state);

        Ok(url)
    }

    async fn exchange_code(&self, params: ExchangeCodeParams) -> Result<NewConnection, AdapterError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", params.redirect_uri.as_str()),
            ("code", params.code.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/oauth/access_token", self.oauth_base))
            .form(&form)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        // The token response's user_id may be numeric; the profile call is
        // authoritative for both id and username.
        let profile = self.fetch_profile(&token.access_token).await?;
        debug!(
            account_id = %params.account_id,
            platform_user_id = %profile.id,
            "Exchanged Instagram authorization code"
        );

        let expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        Ok(NewConnection {
            platform_user_id: profile.id,
            display_name: profile.username,
            access_token: token.access_token,
            refresh_token: None,
            expires_at,
            metadata: token
                .user_id
                .map(|user_id| serde_json::json!({ "token_user_id": user_id })),
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedCredentials, AdapterError> {
        // Instagram long-lived tokens refresh themselves: the current token
        // is presented as the grant.
        let mut url = Url::parse(&format!("{}/refresh_access_token", self.api_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("grant_type", "ig_refresh_token")
            .append_pair("access_token", refresh_token);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        let expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        Ok(RefreshedCredentials {
            refresh_token: Some(token.access_token.clone()),
            access_token: token.access_token,
            expires_at,
        })
    }

    async fn fetch_messages(&self, params: FetchMessagesParams) -> Result<MessageBatch, AdapterError> {
        let mut url = Url::parse(&format!("{}/me/messages", self.api_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,from{id,username,profile_picture_url},text,created_time")
            .append_pair(
                "limit",
                &params.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).to_string(),
            )
            .append_pair("access_token", &params.ctx.access_token);
        if let Some(since) = &params.since_message_id {
            url.query_pairs_mut().append_pair("since_id", since);
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let envelope: Envelope<WireMessage> = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        let mut messages: Vec<InboundMessage> = envelope
            .data
            .into_iter()
            .filter_map(|wire| {
                let text = wire.text?;
                let sent_at = wire
                    .created_time
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                Some(InboundMessage {
                    platform_message_id: wire.id,
                    participant_id: wire.from.id,
                    participant_username: wire.from.username,
                    participant_avatar_url: wire.from.profile_picture_url,
                    text,
                    sent_at,
                })
            })
            .collect();

        // Oldest first so the caller's cursor advance lands on the newest.
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));

        let next_cursor = envelope
            .paging
            .as_ref()
            .and_then(|paging| paging.cursors.as_ref())
            .and_then(|cursors| cursors.after.clone());
        let has_more = envelope
            .paging
            .as_ref()
            .is_some_and(|paging| paging.next.is_some());

        Ok(MessageBatch {
            messages,
            next_cursor,
            has_more,
        })
    }

    async fn fetch_comments(&self, params: FetchCommentsParams) -> Result<CommentBatch, AdapterError> {
        let mut url = Url::parse(&format!("{}/me/comments", self.api_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("fields", "id,from{id,username},text")
            .append_pair(
                "limit",
                &params.limit.unwrap_or(DEFAULT_COMMENT_LIMIT).to_string(),
            )
            .append_pair("access_token", &params.ctx.access_token);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let envelope: Envelope<WireComment> = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        let comments = envelope
            .data
            .into_iter()
            .filter_map(|wire| {
                let text = wire.text?;
                Some(InboundComment {
                    comment_id: wire.id,
                    author_id: wire.from.id,
                    author_username: wire.from.username,
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

        let mut url = Url::parse(&format!("{}/me/messages", self.api_base))
            .map_err(|e| Self::malformed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("access_token", &params.ctx.access_token);

        let body = serde_json::json!({
            "recipient": { "id": params.participant_id },
            "message": { "text": params.text },
        });

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let receipt: SendReceipt = response
            .json()
            .await
            .map_err(|e| Self::malformed(e.to_string()))?;

        Ok(DeliveryReceipt {
            platform_message_id: receipt.message_id,
        })
    }
}

/// Register the Instagram adapter with the registry
pub fn register_instagram_adapter(registry: &mut AdapterRegistry, adapter: Arc<InstagramAdapter>) {
    registry.register(
        adapter,
        PlatformMetadata::new(
            INSTAGRAM_PLATFORM_SLUG.to_string(),
            "Instagram".to_string(),
            AuthStyle::QueryParam,
            vec![
                "user_profile".to_string(),
                "user_media".to_string(),
                "instagram_manage_messages".to_string(),
            ],
            true,
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn adapter() -> InstagramAdapter {
        InstagramAdapter::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://api.instagram.com".to_string(),
            "https://graph.instagram.com".to_string(),
        )
    }

    #[tokio::test]
    async fn authorize_url_carries_client_and_state() {
        let url = adapter()
            .authorize(AuthorizeParams {
                account_id: Uuid::new_v4(),
                redirect_uri: "https://app.example.com/callback".to_string(),
                state: "nonce-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(url.host_str(), Some("api.instagram.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("nonce-1"));
        assert_eq!(
            pairs.get("response_type").map(String::as_str),
            Some("code")
        );
        assert!(pairs.get("scope").unwrap().contains("instagram_manage_messages"));
    }

    #[tokio::test]
    async fn send_message_rejects_empty_text() {
        let ctx = crate::adapters::AdapterContext {
            connection: crate::models::connection::Model {
                id: Uuid::new_v4(),
                account_id: Uuid::new_v4(),
                platform_slug: "instagram".to_string(),
                platform_user_id: "ig-1".to_string(),
                display_name: None,
                status: "active".to_string(),
                access_token_ciphertext: None,
                refresh_token_ciphertext: None,
                expires_at: None,
                metadata: None,
                created_at: chrono::Utc::now().into(),
                updated_at: chrono::Utc::now().into(),
            },
            access_token: "tok".to_string(),
        };

        let result = adapter()
            .send_message(SendMessageParams {
                ctx,
                participant_id: "fan-1".to_string(),
                text: "   ".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AdapterError::MalformedRequest { .. })));
    }

    #[test]
    fn wire_message_parses_graph_shape() {
        let raw = serde_json::json!({
            "data": [
                {
                    "id": "mid.1",
                    "from": { "id": "fan-9", "username": "superfan" },
                    "text": "price? link?",
                    "created_time": "2025-06-01T10:00:00+00:00"
                }
            ],
            "paging": { "next": "https://graph.instagram.com/...", "cursors": { "after": "aft" } }
        });

        let envelope: Envelope<WireMessage> = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].from.id, "fan-9");
        assert_eq!(
            envelope.paging.as_ref().unwrap().cursors.as_ref().unwrap().after.as_deref(),
            Some("aft")
        );
    }
}
