//! Message entity model
//!
//! Messages are append-only; after insert only `status` (pending -> sent or
//! failed) and `error` change. `trigger_id` carries the id of the comment
//! that triggered an auto-DM and is unique, which is what makes repeated
//! polling ticks unable to send twice for the same comment.

use super::conversation::Entity as Conversation;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Parent conversation
    pub conversation_id: Uuid,

    /// Who authored the message: fan|ai|manual
    pub sender_type: String,

    /// Display name of the author
    pub sender_name: String,

    /// Message text
    pub content: String,

    /// Delivery status: pending|sent|failed
    pub status: String,

    /// Platform-native id, present for inbound messages and for outbound
    /// ones once the platform acknowledged the send
    pub platform_message_id: Option<String>,

    /// Id of the comment that triggered this auto-DM, if any (unique)
    pub trigger_id: Option<String>,

    /// Delivery error recorded when status is failed
    pub error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Conversation",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id"
    )]
    Conversation,
}

impl Related<Conversation> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
