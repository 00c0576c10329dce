//! Account repository for database operations

use anyhow::{Result, anyhow};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::account::{self, Entity as Account};

/// Repository for account database operations
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pub db: Arc<DatabaseConnection>,
}

impl AccountRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an account with the given id and name
    pub async fn create(&self, id: Uuid, name: &str) -> Result<account::Model> {
        let now = chrono::Utc::now();
        let active = account::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = Account::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("account not persisted"))
    }

    /// Finds an account by id
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<account::Model>> {
        Ok(Account::find_by_id(*id).one(&*self.db).await?)
    }

    /// Whether the account exists
    pub async fn exists(&self, id: &Uuid) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}
