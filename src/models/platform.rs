//! Platform entity model
//!
//! Seeded catalog of social networks. A platform row describes the network's
//! auth convention; whether an adapter is registered for it is a runtime
//! property of the registry, not of this table.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "platforms")]
pub struct Model {
    /// Platform slug, e.g. "instagram" (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub slug: String,

    /// Display name, e.g. "Instagram"
    pub display_name: String,

    /// How the platform expects the access token: "query_param" or
    /// "bearer_header"
    pub auth_style: String,

    /// Whether the platform exposes a public comment surface that can be
    /// scanned for buying signals
    pub supports_comments: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::connection::Entity")]
    Connection,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
