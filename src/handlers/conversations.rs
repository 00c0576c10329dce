//! # Conversations API Handlers
//!
//! Inbox listing, message history, manual replies, and per-conversation
//! toggles.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::adapters::AdapterContext;
use crate::auth::{AccountExtension, OperatorAuth};
use crate::cursor::decode_generic_cursor;
use crate::dispatch::{DispatchOutcome, Dispatcher, ReplySender};
use crate::error::ApiError;
use crate::repositories::{ConnectionRepository, ConversationRepository, MessageRepository};
use crate::server::AppState;

/// Query parameters for the conversations listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListConversationsQuery {
    /// Maximum number of conversations to return (default: 50, max: 100)
    pub limit: Option<i64>,
    /// Opaque cursor for pagination continuation
    pub cursor: Option<String>,
}

/// Conversation information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub platform: String,
    pub participant_id: String,
    pub participant_username: Option<String>,
    pub participant_avatar_url: Option<String>,
    /// active | closed
    pub status: String,
    pub ai_enabled: bool,
    pub message_count: i32,
    pub last_message_at: Option<String>,
    pub redirect_sent: bool,
}

impl From<crate::models::conversation::Model> for ConversationInfo {
    fn from(model: crate::models::conversation::Model) -> Self {
        Self {
            id: model.id,
            platform: model.platform_slug,
            participant_id: model.participant_id,
            participant_username: model.participant_username,
            participant_avatar_url: model.participant_avatar_url,
            status: model.status,
            ai_enabled: model.ai_enabled,
            message_count: model.message_count,
            last_message_at: model
                .last_message_at
                .map(|dt| dt.with_timezone(&Utc).to_rfc3339()),
            redirect_sent: model.redirect_sent,
        }
    }
}

/// Message information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    /// fan | ai | manual
    pub sender_type: String,
    pub sender_name: String,
    pub content: String,
    /// pending | sent | failed
    pub status: String,
    pub platform_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

impl From<crate::models::message::Model> for MessageInfo {
    fn from(model: crate::models::message::Model) -> Self {
        Self {
            id: model.id,
            sender_type: model.sender_type,
            sender_name: model.sender_name,
            content: model.content,
            status: model.status,
            platform_message_id: model.platform_message_id,
            error: model.error,
            created_at: model.created_at.with_timezone(&Utc).to_rfc3339(),
        }
    }
}

/// Response wrapper for conversations listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationInfo>,
    /// Opaque cursor for fetching the next page (null on the last page)
    pub next_cursor: Option<String>,
}

/// Response wrapper for message listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<MessageInfo>,
}

/// Body for a manual reply
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ReplyRequest {
    pub text: String,
}

/// Body for conversation updates
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateConversationRequest {
    /// Toggle whether the auto-responder may reply in this thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_enabled: Option<bool>,
    /// Set the thread status: active | closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Lists the account's conversations ordered by last activity descending.
/// An account with no conversations gets an empty list, not an error.
#[utoipa::path(
    get,
    path = "/conversations",
    security(("bearer_auth" = [])),
    params(crate::auth::AccountHeader, ListConversationsQuery),
    responses(
        (status = 200, description = "Conversation inbox", body = ConversationsResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "conversations"
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "limit must be between 1 and 100",
        ));
    }

    if let Some(ref cursor_str) = query.cursor {
        decode_generic_cursor(cursor_str).map_err(|_| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "cursor is not valid base64-encoded JSON",
            )
        })?;
    }

    let repo = ConversationRepository::new(Arc::new(state.db.clone()));
    let (conversations, next_cursor) = repo
        .list_by_account_paginated(&account.0, limit as u64, query.cursor)
        .await?;

    Ok(Json(ConversationsResponse {
        conversations: conversations
            .into_iter()
            .map(ConversationInfo::from)
            .collect(),
        next_cursor,
    }))
}

/// Lists a conversation's messages in chronological order
#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = MessagesResponse),
        (status = 404, description = "Conversation not found", body = ApiError)
    ),
    tag = "conversations"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let conversations = ConversationRepository::new(Arc::new(state.db.clone()));
    let conversation = conversations
        .find_by_id(&account.0, &id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Conversation not found")
        })?;

    let messages = MessageRepository::new(Arc::new(state.db.clone()));
    let rows = messages.list_by_conversation(&conversation.id).await?;

    Ok(Json(MessagesResponse {
        messages: rows.into_iter().map(MessageInfo::from).collect(),
    }))
}

/// Sends a manual operator reply through the platform adapter. The outcome
/// is recorded on the message row either way; a failed remote send returns
/// the row with status "failed" rather than an error.
#[utoipa::path(
    post,
    path = "/conversations/{id}/reply",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply recorded", body = MessageInfo),
        (status = 400, description = "Validation error or no usable credential", body = ApiError),
        (status = 404, description = "Conversation not found", body = ApiError)
    ),
    tag = "conversations"
)]
pub async fn reply(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<MessageInfo>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "text cannot be empty",
        ));
    }

    let conversations = ConversationRepository::new(Arc::new(state.db.clone()));
    let conversation = conversations
        .find_by_id(&account.0, &id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Conversation not found")
        })?;

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let connection = connection_repo
        .find_by_account_and_platform(&account.0, &conversation.platform_slug)
        .await?
        .into_iter()
        .find(|connection| connection.is_connected())
        .ok_or(crate::adapters::AdapterError::NotConnected {
            platform: conversation.platform_slug.clone(),
        })?;

    let ctx = AdapterContext::from_connection(&state.crypto_key, connection)?;

    let messages = MessageRepository::new(Arc::new(state.db.clone()));
    let dispatcher = Dispatcher::new(state.registry.clone(), conversations, messages);

    let outcome = dispatcher
        .send_reply(ctx, &conversation, ReplySender::Manual, request.text, None)
        .await?;

    match outcome {
        DispatchOutcome::Sent(row) | DispatchOutcome::Failed(row) => {
            Ok(Json(MessageInfo::from(row)))
        }
        DispatchOutcome::Duplicate => Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Reply already dispatched",
        )),
    }
}

/// Updates a conversation's AI toggle or status
#[utoipa::path(
    patch,
    path = "/conversations/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Conversation id")),
    request_body = UpdateConversationRequest,
    responses(
        (status = 200, description = "Conversation updated", body = ConversationInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Conversation not found", body = ApiError)
    ),
    tag = "conversations"
)]
pub async fn update_conversation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateConversationRequest>,
) -> Result<Json<ConversationInfo>, ApiError> {
    let repo = ConversationRepository::new(Arc::new(state.db.clone()));

    let mut conversation = repo.find_by_id(&account.0, &id).await?.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Conversation not found")
    })?;

    if let Some(status) = &request.status {
        if !matches!(status.as_str(), "active" | "closed") {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "status must be 'active' or 'closed'",
            ));
        }
        conversation = repo.set_status(&account.0, &id, status).await?;
    }

    if let Some(ai_enabled) = request.ai_enabled {
        conversation = repo.set_ai_enabled(&account.0, &id, ai_enabled).await?;
    }

    Ok(Json(ConversationInfo::from(conversation)))
}
