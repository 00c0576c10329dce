//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores account-scoped OAuth credentials for external social
//! platforms.

use super::platform::Entity as Platform;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Connection entity representing an account-scoped credential for one
/// social platform
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Slug of the platform this connection belongs to
    pub platform_slug: String,

    /// Platform-native user id (unique per account & platform)
    pub platform_user_id: String,

    /// Display name for the connection (optional, e.g. the handle)
    pub display_name: Option<String>,

    /// Status of the connection: active|revoked|error
    pub status: String,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Platform-specific opaque metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// A connection is usable for platform calls only while active and
    /// holding an access token.
    pub fn is_connected(&self) -> bool {
        self.status == "active" && self.access_token_ciphertext.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Platform",
        from = "Column::PlatformSlug",
        to = "super::platform::Column::Slug"
    )]
    Platform,
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
}

impl Related<Platform> for Entity {
    fn to() -> RelationDef {
        Relation::Platform.def()
    }
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
