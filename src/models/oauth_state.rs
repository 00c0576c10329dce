//! OauthState entity model
//!
//! Short-lived CSRF state rows created by the authorize handler and consumed
//! by the callback handler.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Account that initiated the connect flow
    pub account_id: Uuid,

    /// Platform being connected
    pub platform_slug: String,

    /// Opaque state nonce round-tripped through the platform
    pub state: String,

    /// Redirect URI requested by the caller, if any
    pub redirect_uri: Option<String>,

    /// When this state stops being acceptable
    pub expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
