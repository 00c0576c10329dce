//! Platform catalog repository for database operations

use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;

use crate::models::platform::{self, Entity as Platform};

/// Repository for the seeded platform catalog
#[derive(Debug, Clone)]
pub struct PlatformRepository {
    pub db: Arc<DatabaseConnection>,
}

impl PlatformRepository {
    /// Creates a new PlatformRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists the full platform catalog ordered by slug
    pub async fn list(&self) -> Result<Vec<platform::Model>> {
        Ok(Platform::find()
            .order_by_asc(platform::Column::Slug)
            .all(&*self.db)
            .await?)
    }

    /// Finds a platform by slug
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<platform::Model>> {
        Ok(Platform::find()
            .filter(platform::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?)
    }
}
