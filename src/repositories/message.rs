//! Message repository for database operations
//!
//! Appending a message bumps the parent conversation's denormalized count
//! and last-activity timestamp in the same transaction, and listing returns
//! non-decreasing `created_at` order regardless of append interleaving.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::conversation::{self, Entity as Conversation};
use crate::models::message::{self, Entity as Message};

/// Fields of a message to append
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// fan|ai|manual
    pub sender_type: String,
    pub sender_name: String,
    pub content: String,
    /// pending|sent|failed
    pub status: String,
    pub platform_message_id: Option<String>,
    pub trigger_id: Option<String>,
    /// Platform-reported send time for inbound messages; defaults to now
    pub sent_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Inbound message from the external participant
    pub fn fan(
        sender_name: String,
        content: String,
        platform_message_id: String,
        sent_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            sender_type: "fan".to_string(),
            sender_name,
            content,
            status: "sent".to_string(),
            platform_message_id: Some(platform_message_id),
            trigger_id: None,
            sent_at,
        }
    }

    /// Outbound message in its pending (pre-send) phase
    pub fn outbound_pending(sender_type: String, sender_name: String, content: String) -> Self {
        Self {
            sender_type,
            sender_name,
            content,
            status: "pending".to_string(),
            platform_message_id: None,
            trigger_id: None,
            sent_at: None,
        }
    }

    pub fn with_trigger_id(mut self, trigger_id: String) -> Self {
        self.trigger_id = Some(trigger_id);
        self
    }
}

/// Repository for message database operations
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pub db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Creates a new MessageRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a message and bumps the parent conversation's message count
    /// and last-message timestamp. The timestamp only moves forward.
    pub async fn append(
        &self,
        conversation_id: &Uuid,
        new_message: NewMessage,
    ) -> Result<message::Model> {
        let txn = self.db.begin().await?;

        let parent = Conversation::find_by_id(*conversation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow!("Conversation '{}' not found", conversation_id))?;

        let now = Utc::now();
        let created_at = new_message.sent_at.unwrap_or(now);
        let id = Uuid::new_v4();

        let active = message::ActiveModel {
            id: Set(id),
            conversation_id: Set(*conversation_id),
            sender_type: Set(new_message.sender_type),
            sender_name: Set(new_message.sender_name),
            content: Set(new_message.content),
            status: Set(new_message.status),
            platform_message_id: Set(new_message.platform_message_id),
            trigger_id: Set(new_message.trigger_id),
            error: Set(None),
            created_at: Set(created_at.into()),
        };
        active.insert(&txn).await?;

        let last_message_at = match parent.last_message_at {
            Some(existing) if existing.with_timezone(&Utc) > created_at => existing,
            _ => created_at.into(),
        };
        let message_count = parent.message_count + 1;

        let mut parent_active: conversation::ActiveModel = parent.into();
        parent_active.message_count = Set(message_count);
        parent_active.last_message_at = Set(Some(last_message_at));
        parent_active.updated_at = Set(now.into());
        parent_active.update(&txn).await?;

        let fetched = Message::find_by_id(id).one(&txn).await?;
        let model = fetched.ok_or_else(|| anyhow!("message not persisted"))?;

        txn.commit().await?;
        Ok(model)
    }

    /// Lists messages of a conversation ordered by created_at ascending, id
    /// as tiebreaker
    pub async fn list_by_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<message::Model>> {
        Ok(Message::find()
            .filter(message::Column::ConversationId.eq(*conversation_id))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Lists the most recent messages of a conversation, oldest first, for
    /// classifier context windows
    pub async fn recent_context(
        &self,
        conversation_id: &Uuid,
        turns: usize,
    ) -> Result<Vec<message::Model>> {
        let mut rows = Message::find()
            .filter(message::Column::ConversationId.eq(*conversation_id))
            .order_by_desc(message::Column::CreatedAt)
            .order_by_desc(message::Column::Id)
            .paginate(&*self.db, turns.max(1) as u64)
            .fetch_page(0)
            .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Resolves an outbound message's pending status after the send attempt
    pub async fn resolve_status(
        &self,
        id: &Uuid,
        status: &str,
        platform_message_id: Option<String>,
        error: Option<String>,
    ) -> Result<message::Model> {
        let existing = Message::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Message '{}' not found", id))?;

        let mut model: message::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        if platform_message_id.is_some() {
            model.platform_message_id = Set(platform_message_id);
        }
        model.error = Set(error);

        Ok(model.update(&*self.db).await?)
    }

    /// Whether an inbound platform message has already been recorded
    pub async fn platform_message_exists(
        &self,
        conversation_id: &Uuid,
        platform_message_id: &str,
    ) -> Result<bool> {
        let count = Message::find()
            .filter(message::Column::ConversationId.eq(*conversation_id))
            .filter(message::Column::PlatformMessageId.eq(platform_message_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    /// Whether an auto-DM for the given triggering comment already exists
    pub async fn trigger_exists(&self, trigger_id: &str) -> Result<bool> {
        let count = Message::find()
            .filter(message::Column::TriggerId.eq(trigger_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }
}
