//! # Auto-Responder Toggle Handler
//!
//! Turns polling on or off for one connection by writing the responder
//! settings into the connection's metadata. Turning it off stops future
//! scheduling; an in-flight job completes and is not cancelled.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AccountExtension, OperatorAuth};
use crate::error::ApiError;
use crate::repositories::responder_settings::{
    MAX_RESPONDER_INTERVAL_SECONDS, MIN_RESPONDER_INTERVAL_SECONDS,
};
use crate::repositories::{ConnectionRepository, ResponderSettings};
use crate::server::AppState;

/// Body for responder toggles
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ResponderToggleRequest {
    /// Connection to toggle
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    /// Whether the auto-responder should poll this connection
    pub enabled: bool,
    /// Optional polling interval override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

/// Current responder state for a connection
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponderStateResponse {
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    pub enabled: bool,
    pub interval_seconds: Option<u64>,
    pub next_run_at: Option<String>,
}

/// Toggle auto-respond for a connection
#[utoipa::path(
    post,
    path = "/responder",
    security(("bearer_auth" = [])),
    request_body = ResponderToggleRequest,
    responses(
        (status = 200, description = "Responder state updated", body = ResponderStateResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "responder"
)]
pub async fn toggle_responder(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Json(request): Json<ResponderToggleRequest>,
) -> Result<Json<ResponderStateResponse>, ApiError> {
    if let Some(interval) = request.interval_seconds
        && !(MIN_RESPONDER_INTERVAL_SECONDS..=MAX_RESPONDER_INTERVAL_SECONDS).contains(&interval)
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!(
                "interval_seconds must be between {} and {}",
                MIN_RESPONDER_INTERVAL_SECONDS, MAX_RESPONDER_INTERVAL_SECONDS
            ),
        ));
    }

    let repo = ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    let connection = repo
        .find_by_id(&account.0, &request.connection_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Connection not found")
        })?;

    if request.enabled && !connection.is_connected() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "NOT_CONNECTED",
            "Cannot enable auto-respond on a connection without a usable credential",
        ));
    }

    let mut settings = ResponderSettings::from_connection_metadata(connection.metadata.as_ref());
    let now = Utc::now();

    settings.enabled = request.enabled;
    if let Some(interval) = request.interval_seconds {
        settings.interval_seconds = Some(interval);
    }
    if request.enabled {
        settings.activated_at.get_or_insert(now);
        // First poll lands one interval from now
        settings.next_run_at = None;
    } else {
        settings.next_run_at = None;
    }

    let metadata = settings.into_connection_metadata(connection.metadata.as_ref());
    let mut active: crate::models::connection::ActiveModel = connection.into();
    active.metadata = Set(Some(metadata));
    active.updated_at = Set(now.into());
    let updated = active.update(&state.db).await?;

    let settings = ResponderSettings::from_connection_metadata(updated.metadata.as_ref());

    tracing::info!(
        connection_id = %request.connection_id,
        account_id = %account.0,
        enabled = request.enabled,
        "Auto-responder toggled"
    );

    Ok(Json(ResponderStateResponse {
        connection_id: request.connection_id,
        enabled: settings.enabled,
        interval_seconds: settings.interval_seconds,
        next_run_at: settings.next_run_at.map(|dt| dt.to_rfc3339()),
    }))
}
