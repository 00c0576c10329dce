//! PersonaProfile entity model
//!
//! Per-account configuration biasing generated reply tone and style. The
//! classifier reads this, never writes it.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "persona_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning account (unique: one persona per account)
    pub account_id: Uuid,

    /// Overall tone, e.g. "friendly", "flirty", "professional"
    pub tone: String,

    /// Vocabulary register, e.g. "casual", "emoji-heavy"
    pub vocabulary_style: String,

    /// Emotional range, e.g. "warm", "reserved"
    pub emotional_range: String,

    /// Hard boundaries the responder must never cross (JSON array of
    /// strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub boundaries: Option<JsonValue>,

    /// URL to steer buying-intent fans towards, at most once per
    /// conversation
    pub redirect_url: Option<String>,

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
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
