//! # Platform Catalog Handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::repositories::PlatformRepository;
use crate::server::AppState;

/// Platform catalog entry for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlatformInfo {
    /// Platform slug, e.g. "instagram"
    pub slug: String,
    /// Display name
    pub display_name: String,
    /// Token convention: query_param | bearer_header
    pub auth_style: String,
    /// Whether the responder can scan comments on this platform
    pub supports_comments: bool,
    /// Whether an adapter is registered and the platform is connectable
    pub adapter_registered: bool,
}

/// Response wrapper for the platform listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlatformsResponse {
    pub platforms: Vec<PlatformInfo>,
}

/// Lists the seeded platform catalog, flagging which platforms have a
/// registered adapter
#[utoipa::path(
    get,
    path = "/platforms",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Platform catalog", body = PlatformsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "platforms"
)]
pub async fn list_platforms(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<PlatformsResponse>, ApiError> {
    let repo = PlatformRepository::new(Arc::new(state.db.clone()));
    let rows = repo.list().await?;

    let platforms = rows
        .into_iter()
        .map(|row| PlatformInfo {
            adapter_registered: state.registry.is_registered(&row.slug),
            slug: row.slug,
            display_name: row.display_name,
            auth_style: row.auth_style,
            supports_comments: row.supports_comments,
        })
        .collect();

    Ok(Json(PlatformsResponse { platforms }))
}
