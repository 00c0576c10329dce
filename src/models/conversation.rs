//! Conversation entity model
//!
//! One conversation per (account, platform, external participant). The
//! `last_processed_message_id` column is the responder's persisted cursor:
//! the executor only classifies messages newer than it, so restarts resume
//! instead of re-scanning.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Platform this thread lives on
    pub platform_slug: String,

    /// Platform-native id of the external participant
    pub participant_id: String,

    /// Participant handle, if known
    pub participant_username: Option<String>,

    /// Participant avatar, if known
    pub participant_avatar_url: Option<String>,

    /// Status of the thread: active|closed
    pub status: String,

    /// Whether the auto-responder may reply in this thread
    pub ai_enabled: bool,

    /// Denormalized message count, bumped on every append
    pub message_count: i32,

    /// Timestamp of the newest message; listing order key
    pub last_message_at: Option<DateTimeWithTimeZone>,

    /// Whether the redirect-URL message has already been sent to this
    /// participant
    pub redirect_sent: bool,

    /// Platform message id of the newest inbound message the responder has
    /// processed
    pub last_processed_message_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    #[sea_orm(has_many = "super::message::Entity")]
    Message,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
