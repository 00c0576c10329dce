//! Persona profile repository for database operations

use anyhow::{Result, anyhow};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::persona_profile::{self, Entity as PersonaProfile};

/// Fields of a persona upsert
#[derive(Debug, Clone)]
pub struct PersonaUpdate {
    pub tone: String,
    pub vocabulary_style: String,
    pub emotional_range: String,
    pub boundaries: Option<serde_json::Value>,
    pub redirect_url: Option<String>,
}

/// Repository for persona profile database operations
#[derive(Debug, Clone)]
pub struct PersonaRepository {
    pub db: Arc<DatabaseConnection>,
}

impl PersonaRepository {
    /// Creates a new PersonaRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds the persona profile for an account
    pub async fn find_by_account(
        &self,
        account_id: &Uuid,
    ) -> Result<Option<persona_profile::Model>> {
        Ok(PersonaProfile::find()
            .filter(persona_profile::Column::AccountId.eq(*account_id))
            .one(&*self.db)
            .await?)
    }

    /// Creates or replaces the account's persona profile
    pub async fn upsert(
        &self,
        account_id: &Uuid,
        update: PersonaUpdate,
    ) -> Result<persona_profile::Model> {
        let now = chrono::Utc::now();

        if let Some(existing) = self.find_by_account(account_id).await? {
            let mut model: persona_profile::ActiveModel = existing.into();
            model.tone = Set(update.tone);
            model.vocabulary_style = Set(update.vocabulary_style);
            model.emotional_range = Set(update.emotional_range);
            model.boundaries = Set(update.boundaries);
            model.redirect_url = Set(update.redirect_url);
            model.updated_at = Set(now.into());
            return Ok(model.update(&*self.db).await?);
        }

        let id = Uuid::new_v4();
        let active = persona_profile::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id),
            tone: Set(update.tone),
            vocabulary_style: Set(update.vocabulary_style),
            emotional_range: Set(update.emotional_range),
            boundaries: Set(update.boundaries),
            redirect_url: Set(update.redirect_url),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = PersonaProfile::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("persona profile not persisted"))
    }
}
