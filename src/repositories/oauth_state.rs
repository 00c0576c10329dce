//! OAuth state repository for database operations
//!
//! States are single-use: `consume` deletes the row it validates.

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, Entity as OauthState};

const STATE_TTL_MINUTES: i64 = 10;

/// Repository for OAuth state database operations
#[derive(Debug, Clone)]
pub struct OauthStateRepository {
    pub db: Arc<DatabaseConnection>,
}

impl OauthStateRepository {
    /// Creates a new OauthStateRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persists a new state nonce for the connect flow
    pub async fn create(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
        state: &str,
        redirect_uri: Option<String>,
    ) -> Result<oauth_state::Model> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let active = oauth_state::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id),
            platform_slug: Set(platform_slug.to_string()),
            state: Set(state.to_string()),
            redirect_uri: Set(redirect_uri),
            expires_at: Set((now + Duration::minutes(STATE_TTL_MINUTES)).into()),
            created_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = OauthState::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("oauth state not persisted"))
    }

    /// Validates and deletes a state nonce. Returns the stored row when the
    /// state exists and has not expired.
    pub async fn consume(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
        state: &str,
    ) -> Result<Option<oauth_state::Model>> {
        let existing = OauthState::find()
            .filter(oauth_state::Column::AccountId.eq(*account_id))
            .filter(oauth_state::Column::PlatformSlug.eq(platform_slug))
            .filter(oauth_state::Column::State.eq(state))
            .one(&*self.db)
            .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        OauthState::delete_by_id(existing.id).exec(&*self.db).await?;

        if existing.expires_at.with_timezone(&Utc) < Utc::now() {
            return Ok(None);
        }

        Ok(Some(existing))
    }

    /// Deletes expired state rows; called lazily from the connect flow
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = OauthState::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
