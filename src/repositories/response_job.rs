//! Response job repository for database operations
//!
//! The executor claims jobs through its own atomic queries; this repository
//! backs the HTTP introspection and retry endpoints.

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::response_job::{self, Entity as ResponseJob};

/// Repository for response job database operations
#[derive(Debug, Clone)]
pub struct ResponseJobRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ResponseJobRepository {
    /// Creates a new ResponseJobRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a job by its ID within an account scope
    pub async fn find_by_id(
        &self,
        account_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<response_job::Model>> {
        Ok(ResponseJob::find_by_id(*id)
            .filter(response_job::Column::AccountId.eq(*account_id))
            .one(&*self.db)
            .await?)
    }

    /// Lists jobs for an account, newest first, optionally filtered by
    /// status
    pub async fn list_by_account(
        &self,
        account_id: &Uuid,
        status: Option<&str>,
        limit: u64,
    ) -> Result<Vec<response_job::Model>> {
        let mut query = ResponseJob::find()
            .filter(response_job::Column::AccountId.eq(*account_id))
            .order_by_desc(response_job::Column::CreatedAt)
            .order_by_desc(response_job::Column::Id)
            .limit(limit);

        if let Some(status) = status {
            query = query.filter(response_job::Column::Status.eq(status));
        }

        Ok(query.all(&*self.db).await?)
    }

    /// Requeues a failed job for another attempt
    pub async fn requeue(&self, account_id: &Uuid, id: &Uuid) -> Result<response_job::Model> {
        let existing = self
            .find_by_id(account_id, id)
            .await?
            .ok_or_else(|| anyhow!("Response job with ID '{}' not found for account", id))?;

        if existing.status != "failed" {
            return Err(anyhow!(
                "Response job '{}' is {} and cannot be retried",
                id,
                existing.status
            ));
        }

        let now = chrono::Utc::now();
        let mut model: response_job::ActiveModel = existing.into();
        model.status = Set("queued".to_string());
        model.attempts = Set(0);
        model.scheduled_at = Set(now.into());
        model.retry_after = Set(None);
        model.started_at = Set(None);
        model.finished_at = Set(None);
        model.error = Set(None);
        model.updated_at = Set(now.into());

        Ok(model.update(&*self.db).await?)
    }
}
