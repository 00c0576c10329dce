//! # Connect Flow Handlers
//!
//! OAuth authorize/callback flow creating Connection records. The state
//! nonce is persisted server-side and also carries the account id, because
//! the platform's redirect arrives without our auth headers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::{AuthorizeParams, ExchangeCodeParams};
use crate::auth::{AccountExtension, OperatorAuth};
use crate::error::ApiError;
use crate::repositories::{AccountRepository, ConnectionRepository, OauthStateRepository};
use crate::server::AppState;

/// Response for the authorize step
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    /// URL the user must visit to grant access
    pub authorize_url: String,
}

/// Query parameters delivered by the platform redirect
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Response for a completed callback
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackResponse {
    pub connected: bool,
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    pub platform: String,
}

/// Begin the OAuth flow for a platform
#[utoipa::path(
    get,
    path = "/connect/{platform}",
    security(("bearer_auth" = [])),
    params(("platform" = String, Path, description = "Platform slug")),
    responses(
        (status = 200, description = "Authorize URL issued", body = AuthorizeResponse),
        (status = 404, description = "Unknown platform", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn authorize(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(platform): Path<String>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let adapter = state.registry.get(&platform).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("platform '{}' has no registered adapter", platform),
        )
    })?;

    // Connections need an account row to hang off; first contact creates it.
    let accounts = AccountRepository::new(Arc::new(state.db.clone()));
    if !accounts.exists(&account.0).await? {
        accounts
            .create(account.0, &format!("account-{}", account.0))
            .await?;
    }

    let oauth_states = OauthStateRepository::new(Arc::new(state.db.clone()));
    // Sweep is opportunistic; failures just leave stale rows for next time
    let _ = oauth_states.sweep_expired().await;

    let state_nonce = build_state(&account.0);
    let redirect_uri = callback_redirect_uri(&state.config.oauth_redirect_base, &platform);

    oauth_states
        .create(&account.0, &platform, &state_nonce, Some(redirect_uri.clone()))
        .await?;

    let url = adapter
        .authorize(AuthorizeParams {
            account_id: account.0,
            redirect_uri,
            state: state_nonce,
        })
        .await?;

    Ok(Json(AuthorizeResponse {
        authorize_url: url.to_string(),
    }))
}

/// OAuth callback: validates state, exchanges the code, persists the
/// connection. Public route; identity comes from the state nonce.
#[utoipa::path(
    get,
    path = "/connect/{platform}/callback",
    params(("platform" = String, Path, description = "Platform slug")),
    responses(
        (status = 200, description = "Connection created", body = CallbackResponse),
        (status = 400, description = "Missing code or invalid state", body = ApiError),
        (status = 502, description = "Platform exchange failed", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("platform denied authorization: {}", error),
        ));
    }

    let code = query.code.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "missing code parameter",
        )
    })?;
    let state_nonce = query.state.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "missing state parameter",
        )
    })?;

    let account_id = parse_state_account(&state_nonce).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "state parameter is not recognized",
        )
    })?;

    let oauth_states = OauthStateRepository::new(Arc::new(state.db.clone()));
    let stored = oauth_states
        .consume(&account_id, &platform, &state_nonce)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "state is unknown or expired",
            )
        })?;

    let adapter = state.registry.get(&platform).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("platform '{}' has no registered adapter", platform),
        )
    })?;

    let redirect_uri = stored
        .redirect_uri
        .unwrap_or_else(|| callback_redirect_uri(&state.config.oauth_redirect_base, &platform));

    let new_connection = adapter
        .exchange_code(ExchangeCodeParams {
            account_id,
            code,
            redirect_uri,
        })
        .await?;

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let connection = connection_repo
        .upsert_from_exchange(&account_id, &platform, new_connection)
        .await?;

    tracing::info!(
        account_id = %account_id,
        platform_slug = %platform,
        connection_id = %connection.id,
        "Connection established"
    );

    Ok(Json(CallbackResponse {
        connected: true,
        connection_id: connection.id,
        platform,
    }))
}

fn callback_redirect_uri(base: &str, platform: &str) -> String {
    format!("{}/connect/{}/callback", base.trim_end_matches('/'), platform)
}

/// State nonce layout: base64url("<account uuid>.<random bytes hex-free>")
fn build_state(account_id: &Uuid) -> String {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = base64_url::encode(&nonce_bytes);
    base64_url::encode(format!("{}.{}", account_id, nonce).as_bytes())
}

fn parse_state_account(state: &str) -> Option<Uuid> {
    let decoded = base64_url::decode(state).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (account_part, _nonce) = decoded.split_once('.')?;
    Uuid::parse_str(account_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrips_account_id() {
        let account_id = Uuid::new_v4();
        let state = build_state(&account_id);
        assert_eq!(parse_state_account(&state), Some(account_id));
    }

    #[test]
    fn state_is_unique_per_call() {
        let account_id = Uuid::new_v4();
        assert_ne!(build_state(&account_id), build_state(&account_id));
    }

    #[test]
    fn garbage_state_is_rejected() {
        assert_eq!(parse_state_account("not-base64url!!"), None);
        assert_eq!(parse_state_account(&base64_url::encode(b"no-dot")), None);
    }

    #[test]
    fn redirect_uri_strips_trailing_slash() {
        assert_eq!(
            callback_redirect_uri("http://localhost:8080/", "instagram"),
            "http://localhost:8080/connect/instagram/callback"
        );
    }
}
