//! # Persona Profile Handlers
//!
//! Reading and updating the account's persona. Updates invalidate the
//! persona cache entry so the next classification sees fresh values.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AccountExtension, OperatorAuth};
use crate::cache::PERSONA_RESOURCE;
use crate::error::ApiError;
use crate::repositories::PersonaRepository;
use crate::repositories::persona::PersonaUpdate;
use crate::server::AppState;

/// Persona profile for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonaInfo {
    pub tone: String,
    pub vocabulary_style: String,
    pub emotional_range: String,
    /// Hard boundaries the responder must never cross
    pub boundaries: Vec<String>,
    pub redirect_url: Option<String>,
}

impl From<crate::models::persona_profile::Model> for PersonaInfo {
    fn from(model: crate::models::persona_profile::Model) -> Self {
        let boundaries = model
            .boundaries
            .as_ref()
            .and_then(|value| value.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            tone: model.tone,
            vocabulary_style: model.vocabulary_style,
            emotional_range: model.emotional_range,
            boundaries,
            redirect_url: model.redirect_url,
        }
    }
}

/// Body for persona upserts
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PersonaRequest {
    pub tone: String,
    pub vocabulary_style: String,
    pub emotional_range: String,
    #[serde(default)]
    pub boundaries: Vec<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Fetch the account's persona profile
#[utoipa::path(
    get,
    path = "/personas",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Persona profile", body = PersonaInfo),
        (status = 404, description = "No persona configured", body = ApiError)
    ),
    tag = "personas"
)]
pub async fn get_persona(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
) -> Result<Json<PersonaInfo>, ApiError> {
    let repo = PersonaRepository::new(Arc::new(state.db.clone()));

    let persona = repo.find_by_account(&account.0).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "No persona configured for this account",
        )
    })?;

    Ok(Json(PersonaInfo::from(persona)))
}

/// Create or replace the account's persona profile
#[utoipa::path(
    put,
    path = "/personas",
    security(("bearer_auth" = [])),
    request_body = PersonaRequest,
    responses(
        (status = 200, description = "Persona stored", body = PersonaInfo),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "personas"
)]
pub async fn put_persona(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Json(request): Json<PersonaRequest>,
) -> Result<Json<PersonaInfo>, ApiError> {
    if request.tone.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "tone cannot be empty",
        ));
    }

    let repo = PersonaRepository::new(Arc::new(state.db.clone()));

    let boundaries = if request.boundaries.is_empty() {
        None
    } else {
        Some(serde_json::json!(request.boundaries))
    };

    let persona = repo
        .upsert(
            &account.0,
            PersonaUpdate {
                tone: request.tone,
                vocabulary_style: request.vocabulary_style,
                emotional_range: request.emotional_range,
                boundaries,
                redirect_url: request.redirect_url,
            },
        )
        .await?;

    // Drop the cached copy so in-flight classifications pick up the change
    state
        .persona_cache
        .invalidate(PERSONA_RESOURCE, &account.0.to_string());

    Ok(Json(PersonaInfo::from(persona)))
}
