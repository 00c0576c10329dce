//! Conversation repository for database operations
//!
//! Conversations are unique per (account, platform, participant); listing is
//! ordered by last activity descending with cursor pagination for the HTTP
//! API.

use anyhow::{Result, anyhow};
use chrono::DateTime;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::cursor::{decode_generic_cursor, encode_generic_cursor};
use crate::models::conversation::{self, Entity as Conversation};

/// Participant identity attached to an inbound message
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Repository for conversation database operations
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ConversationRepository {
    /// Creates a new ConversationRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a conversation by its ID within an account scope
    pub async fn find_by_id(
        &self,
        account_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<conversation::Model>> {
        Ok(Conversation::find_by_id(*id)
            .filter(conversation::Column::AccountId.eq(*account_id))
            .one(&*self.db)
            .await?)
    }

    /// Finds or creates the conversation for one external participant.
    /// Participant identity fields are refreshed when the platform reports
    /// new values. `ai_enabled_default` only applies on creation; an
    /// operator's explicit toggle is never overwritten.
    pub async fn upsert_for_participant(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
        participant: &ParticipantInfo,
        ai_enabled_default: bool,
    ) -> Result<conversation::Model> {
        let existing = Conversation::find()
            .filter(conversation::Column::AccountId.eq(*account_id))
            .filter(conversation::Column::PlatformSlug.eq(platform_slug))
            .filter(conversation::Column::ParticipantId.eq(&participant.participant_id))
            .one(&*self.db)
            .await?;

        let now = chrono::Utc::now();

        if let Some(existing) = existing {
            let identity_changed = participant.username.is_some()
                && existing.participant_username != participant.username
                || participant.avatar_url.is_some()
                    && existing.participant_avatar_url != participant.avatar_url;

            if !identity_changed {
                return Ok(existing);
            }

            let mut model: conversation::ActiveModel = existing.into();
            if participant.username.is_some() {
                model.participant_username = Set(participant.username.clone());
            }
            if participant.avatar_url.is_some() {
                model.participant_avatar_url = Set(participant.avatar_url.clone());
            }
            model.updated_at = Set(now.into());
            return Ok(model.update(&*self.db).await?);
        }

        let id = Uuid::new_v4();
        let active = conversation::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id),
            platform_slug: Set(platform_slug.to_string()),
            participant_id: Set(participant.participant_id.clone()),
            participant_username: Set(participant.username.clone()),
            participant_avatar_url: Set(participant.avatar_url.clone()),
            status: Set("active".to_string()),
            ai_enabled: Set(ai_enabled_default),
            message_count: Set(0),
            last_message_at: Set(None),
            redirect_sent: Set(false),
            last_processed_message_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = Conversation::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("conversation not persisted"))
    }

    /// Lists all conversations for an account ordered by last activity
    /// descending. An account with no conversations yields an empty vec.
    pub async fn list_by_account(&self, account_id: &Uuid) -> Result<Vec<conversation::Model>> {
        Ok(Conversation::find()
            .filter(conversation::Column::AccountId.eq(*account_id))
            .order_by_desc(conversation::Column::LastMessageAt)
            .order_by_desc(conversation::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Lists AI-enabled active conversations for one account/platform pair
    pub async fn list_ai_enabled(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
    ) -> Result<Vec<conversation::Model>> {
        Ok(Conversation::find()
            .filter(conversation::Column::AccountId.eq(*account_id))
            .filter(conversation::Column::PlatformSlug.eq(platform_slug))
            .filter(conversation::Column::Status.eq("active"))
            .filter(conversation::Column::AiEnabled.eq(true))
            .order_by_desc(conversation::Column::LastMessageAt)
            .all(&*self.db)
            .await?)
    }

    /// Lists conversations for an account with cursor pagination, newest
    /// activity first
    pub async fn list_by_account_paginated(
        &self,
        account_id: &Uuid,
        limit: u64,
        cursor: Option<String>,
    ) -> Result<(Vec<conversation::Model>, Option<String>)> {
        if limit == 0 {
            return Ok((Vec::new(), cursor));
        }

        let mut query = Conversation::find()
            .filter(conversation::Column::AccountId.eq(*account_id))
            .order_by_desc(conversation::Column::LastMessageAt)
            .order_by_desc(conversation::Column::Id);

        if let Some(cursor) = cursor
            && !cursor.is_empty()
        {
            let (last_message_at, cursor_id) = parse_conversation_cursor(&cursor)?;
            // Descending keyset: strictly older activity, or same activity
            // with a smaller id
            let condition = Condition::any()
                .add(conversation::Column::LastMessageAt.lt(last_message_at))
                .add(
                    Condition::all()
                        .add(conversation::Column::LastMessageAt.eq(last_message_at))
                        .add(conversation::Column::Id.lt(cursor_id)),
                );
            query = query.filter(condition);
        }

        let mut rows = query.limit(limit + 1).all(&*self.db).await?;

        let next_cursor = if rows.len() as u64 > limit {
            rows.pop().expect("limit+1 ensures overflow row");
            rows.last()
                .and_then(|last_item| {
                    last_item
                        .last_message_at
                        .map(|ts| build_conversation_cursor(&ts, last_item.id))
                })
                .transpose()?
        } else {
            None
        };

        Ok((rows, next_cursor))
    }

    /// Toggles whether the auto-responder may reply in this conversation
    pub async fn set_ai_enabled(
        &self,
        account_id: &Uuid,
        id: &Uuid,
        ai_enabled: bool,
    ) -> Result<conversation::Model> {
        let existing = self
            .find_by_id(account_id, id)
            .await?
            .ok_or_else(|| anyhow!("Conversation with ID '{}' not found for account", id))?;

        let mut model: conversation::ActiveModel = existing.into();
        model.ai_enabled = Set(ai_enabled);
        model.updated_at = Set(chrono::Utc::now().into());
        Ok(model.update(&*self.db).await?)
    }

    /// Updates the conversation status (active|closed)
    pub async fn set_status(
        &self,
        account_id: &Uuid,
        id: &Uuid,
        status: &str,
    ) -> Result<conversation::Model> {
        let existing = self
            .find_by_id(account_id, id)
            .await?
            .ok_or_else(|| anyhow!("Conversation with ID '{}' not found for account", id))?;

        let mut model: conversation::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(chrono::Utc::now().into());
        Ok(model.update(&*self.db).await?)
    }

    /// Records that the redirect URL has been sent in this conversation
    pub async fn mark_redirect_sent(&self, id: &Uuid) -> Result<()> {
        let existing = Conversation::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Conversation '{}' not found", id))?;

        let mut model: conversation::ActiveModel = existing.into();
        model.redirect_sent = Set(true);
        model.updated_at = Set(chrono::Utc::now().into());
        model.update(&*self.db).await?;
        Ok(())
    }

    /// Advances the responder cursor after a pipeline pass completed for
    /// this conversation
    pub async fn advance_cursor(
        &self,
        id: &Uuid,
        last_processed_message_id: &str,
    ) -> Result<()> {
        let existing = Conversation::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Conversation '{}' not found", id))?;

        let mut model: conversation::ActiveModel = existing.into();
        model.last_processed_message_id = Set(Some(last_processed_message_id.to_string()));
        model.updated_at = Set(chrono::Utc::now().into());
        model.update(&*self.db).await?;
        Ok(())
    }
}

/// Parse conversation cursor from standardized base64 string
fn parse_conversation_cursor(cursor: &str) -> Result<(DateTimeWithTimeZone, Uuid)> {
    let decoded_cursor = decode_generic_cursor(cursor)
        .map_err(|_| anyhow!("Invalid cursor format: must be valid base64-encoded JSON"))?;

    let last_message_at_str = decoded_cursor.keys["last_message_at"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid cursor format: missing last_message_at field"))?;

    let id_str = decoded_cursor.keys["id"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid cursor format: missing id field"))?;

    let last_message_at = DateTime::parse_from_rfc3339(last_message_at_str).map_err(|_| {
        anyhow!("Invalid cursor format: last_message_at must be a valid RFC3339 timestamp")
    })?;

    let id = Uuid::parse_str(id_str)
        .map_err(|_| anyhow!("Invalid cursor format: id must be a valid UUID"))?;

    Ok((last_message_at, id))
}

/// Build conversation cursor using standardized base64 format
fn build_conversation_cursor(last_message_at: &DateTimeWithTimeZone, id: Uuid) -> Result<String> {
    let keys = serde_json::json!({
        "last_message_at": last_message_at.to_rfc3339(),
        "id": id.to_string()
    });
    Ok(encode_generic_cursor(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn build_conversation_cursor_is_opaque_base64() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        let cursor = build_conversation_cursor(&ts.into(), id).unwrap();

        assert!(!cursor.contains("2025-06-01T12:00:00"));
        assert!(
            cursor
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
        );
    }

    #[test]
    fn parse_conversation_cursor_roundtrips() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 13, 30, 0).unwrap();
        let id = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        let ts_fixed: DateTimeWithTimeZone = ts.into();
        let cursor = build_conversation_cursor(&ts_fixed, id).unwrap();
        let (parsed_ts, parsed_id) = parse_conversation_cursor(&cursor).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(parsed_ts, ts_fixed);
    }

    #[test]
    fn parse_conversation_cursor_invalid_format_errors() {
        let err = parse_conversation_cursor("bad-cursor").unwrap_err();
        assert!(err.to_string().contains("Invalid cursor"));
    }
}
