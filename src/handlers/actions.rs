//! # Action Envelope Handler
//!
//! Generic entry point for adapter-backed operations. The request names an
//! action and a platform; the handler resolves the account's connection,
//! enforces the not-connected gate, and dispatches through the adapter
//! registry.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::adapters::{
    AdapterContext, AdapterError, FetchCommentsParams, FetchMessagesParams,
};
use crate::auth::{AccountExtension, OperatorAuth};
use crate::classifier::Classifier;
use crate::dispatch::{DispatchOutcome, Dispatcher, ReplySender};
use crate::error::ApiError;
use crate::handlers::types::{ActionRequest, ActionResponse};
use crate::repositories::conversation::ParticipantInfo;
use crate::repositories::{ConnectionRepository, ConversationRepository, MessageRepository};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct SendMessageAction {
    participant_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct FetchMessagesAction {
    #[serde(default)]
    since_message_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

/// Execute one adapter-backed action for the authenticated account
#[utoipa::path(
    post,
    path = "/actions",
    security(("bearer_auth" = [])),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action executed", body = ActionResponse),
        (status = 400, description = "Validation error or no usable credential", body = ApiError),
        (status = 429, description = "Upstream rate limit", body = ApiError),
        (status = 502, description = "Upstream platform error", body = ApiError)
    ),
    tag = "actions"
)]
pub async fn execute_action(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    if let Some(body_account) = request.account_id
        && body_account != account.0
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "account_id in body does not match X-Account-Id header",
        ));
    }

    let adapter = state
        .registry
        .get(&request.platform)
        .map_err(|_| ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("platform '{}' has no registered adapter", request.platform),
        ))?;

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    let connections = connection_repo
        .find_by_account_and_platform(&account.0, &request.platform)
        .await?;

    // The not-connected gate runs before any network call, including for
    // refresh_token.
    let connection = connections
        .into_iter()
        .find(|connection| connection.is_connected())
        .ok_or(AdapterError::NotConnected {
            platform: request.platform.clone(),
        })?;

    match request.action.as_str() {
        "fetch_messages" => {
            let params: FetchMessagesAction = parse_params(request.params)?;
            let ctx = AdapterContext::from_connection(&state.crypto_key, connection)?;
            let batch = adapter
                .fetch_messages(FetchMessagesParams {
                    ctx,
                    since_message_id: params.since_message_id,
                    limit: params.limit,
                })
                .await?;

            let messages: Vec<serde_json::Value> = batch
                .messages
                .iter()
                .map(|message| {
                    json!({
                        "platform_message_id": message.platform_message_id,
                        "participant_id": message.participant_id,
                        "participant_username": message.participant_username,
                        "text": message.text,
                        "sent_at": message.sent_at.map(|dt| dt.to_rfc3339()),
                    })
                })
                .collect();

            Ok(Json(ActionResponse::ok(json!({
                "messages": messages,
                "next_cursor": batch.next_cursor,
                "has_more": batch.has_more,
            }))))
        }
        "send_message" => {
            let params: SendMessageAction = parse_params(request.params)?;
            if params.text.trim().is_empty() {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    "text cannot be empty",
                ));
            }

            let ctx = AdapterContext::from_connection(&state.crypto_key, connection)?;

            let conversations = ConversationRepository::new(Arc::new(state.db.clone()));
            let messages = MessageRepository::new(Arc::new(state.db.clone()));
            let dispatcher =
                Dispatcher::new(state.registry.clone(), conversations.clone(), messages);

            let conversation = conversations
                .upsert_for_participant(
                    &account.0,
                    &request.platform,
                    &ParticipantInfo {
                        participant_id: params.participant_id,
                        username: None,
                        avatar_url: None,
                    },
                    false,
                )
                .await?;

            let outcome = dispatcher
                .send_reply(ctx, &conversation, ReplySender::Manual, params.text, None)
                .await?;

            match outcome {
                DispatchOutcome::Sent(row) | DispatchOutcome::Failed(row) => {
                    Ok(Json(ActionResponse::ok(json!({
                        "message_id": row.id,
                        "conversation_id": row.conversation_id,
                        "status": row.status,
                        "platform_message_id": row.platform_message_id,
                        "error": row.error,
                    }))))
                }
                DispatchOutcome::Duplicate => Ok(Json(ActionResponse::ok(json!({
                    "duplicate": true,
                })))),
            }
        }
        "refresh_token" => {
            let result = state.token_refresh.refresh_connection(connection).await?;
            Ok(Json(ActionResponse::ok(json!({
                "refreshed": result.success,
                "connection_id": result.connection_id,
                "expires_at": result.new_expires_at.map(|dt| dt.to_rfc3339()),
                "error": result.error,
            }))))
        }
        "scan_comments" => {
            let metadata = state
                .registry
                .get_metadata(&request.platform)
                .map_err(|e| ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    &e.to_string(),
                ))?;
            if !metadata.supports_comments {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    &format!("platform '{}' has no comment surface", request.platform),
                ));
            }

            let ctx = AdapterContext::from_connection(&state.crypto_key, connection)?;
            let batch = adapter
                .fetch_comments(FetchCommentsParams { ctx, limit: None })
                .await?;

            let classifier =
                Classifier::new(state.ai.clone(), state.config.ai.context_turns);
            let classified = classifier.classify_comments(&batch.comments).await?;

            let items: Vec<serde_json::Value> = classified
                .iter()
                .map(|item| {
                    json!({
                        "id": item.comment_id,
                        "author_id": item.author_id,
                        "author_username": item.author_username,
                        "text": item.text,
                        "signal": item.signal.as_str(),
                        "suggested_reply": item.suggested_reply,
                    })
                })
                .collect();

            Ok(Json(ActionResponse::ok(json!({ "comments": items }))))
        }
        other => Err(crate::error::validation_error(
            "Unknown action",
            json!({ "action": format!("'{}' is not a supported action", other) }),
        )),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(params).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("invalid params: {}", e),
        )
    })
}
