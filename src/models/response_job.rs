//! ResponseJob entity model
//!
//! This module contains the SeaORM entity model for the response_jobs table,
//! the durable work units of the auto-responder. A job covers one poll-and-
//! respond pass over a single connection.

use super::connection::Entity as Connection;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "response_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Platform the job polls
    pub platform_slug: String,

    /// Connection the job polls through
    pub connection_id: Uuid,

    /// Current status of the job: queued|running|succeeded|failed
    pub status: String,

    /// Job priority for claiming (higher values = higher priority)
    pub priority: i16,

    /// Number of attempts made for this job
    pub attempts: i32,

    /// Timestamp when the job is scheduled to run
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp when the job becomes eligible for retry after backoff
    pub retry_after: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job started execution
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job finished execution
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Connection",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id"
    )]
    Connection,
}

impl Related<Connection> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
