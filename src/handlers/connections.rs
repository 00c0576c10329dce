//! # Connections API Handlers
//!
//! Listing and revoking the account's platform connections.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AccountExtension, OperatorAuth};
use crate::error::ApiError;
use crate::repositories::{ConnectionRepository, ResponderSettings};
use crate::server::AppState;

/// Query parameters for the connections listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListConnectionsQuery {
    /// Optional platform filter (snake_case slug, e.g. "instagram")
    pub platform: Option<String>,
}

/// Connection information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    /// Unique identifier for the connection
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Platform slug (e.g. "instagram", "tiktok")
    pub platform: String,
    /// Platform-native user id
    pub platform_user_id: String,
    /// Display name / handle, if known
    pub display_name: Option<String>,
    /// Connection status: active | revoked | error
    pub status: String,
    /// Whether the connection currently holds a usable access token
    pub is_connected: bool,
    /// Whether the auto-responder polls this connection
    pub auto_respond: bool,
    /// Optional expiration timestamp for the access token
    pub expires_at: Option<String>,
    /// Whether an encrypted refresh token is stored
    pub has_refresh_token: bool,
}

impl From<crate::models::connection::Model> for ConnectionInfo {
    fn from(model: crate::models::connection::Model) -> Self {
        let settings = ResponderSettings::from_connection_metadata(model.metadata.as_ref());
        Self {
            id: model.id,
            is_connected: model.is_connected(),
            auto_respond: settings.enabled,
            platform: model.platform_slug,
            platform_user_id: model.platform_user_id,
            display_name: model.display_name,
            status: model.status,
            expires_at: model.expires_at.map(|dt| {
                let utc_dt: DateTime<Utc> = dt.with_timezone(&Utc);
                utc_dt.to_rfc3339()
            }),
            has_refresh_token: model.refresh_token_ciphertext.is_some(),
        }
    }
}

/// Response wrapper for connections listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    /// List of connections for the account
    pub connections: Vec<ConnectionInfo>,
}

/// Lists connections for the authenticated account with optional platform
/// filtering
#[utoipa::path(
    get,
    path = "/connections",
    security(("bearer_auth" = [])),
    params(crate::auth::AccountHeader, ListConnectionsQuery),
    responses(
        (status = 200, description = "List of account connections", body = ConnectionsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    let connections = match query.platform {
        Some(platform) => {
            repo.find_by_account_and_platform(&account.0, &platform)
                .await?
        }
        None => repo.find_by_account(&account.0).await?,
    };

    Ok(Json(ConnectionsResponse {
        connections: connections.into_iter().map(ConnectionInfo::from).collect(),
    }))
}

/// Revokes a connection. The row is kept for audit; only the status flips,
/// so every subsequent adapter action fails the not-connected gate.
#[utoipa::path(
    delete,
    path = "/connections/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Connection revoked", body = ConnectionInfo),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn revoke_connection(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    if repo.find_by_id(&account.0, &id).await?.is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Connection not found",
        ));
    }

    let revoked = repo.revoke(&account.0, &id).await?;
    Ok(Json(ConnectionInfo::from(revoked)))
}
