//! # API Handlers
//!
//! This module contains all HTTP handlers for the Engage API.

pub mod actions;
pub mod connect;
pub mod connections;
pub mod conversations;
pub mod jobs;
pub mod personas;
pub mod platforms;
pub mod responder;
pub mod types;

use axum::{Json, extract::State};

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root endpoint returning service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "meta"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness endpoint including a database ping
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "meta"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|e| {
        tracing::error!(error = ?e, "Health check failed");
        ApiError::new(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unavailable",
        )
    })?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
