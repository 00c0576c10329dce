//! Connection repository for database operations
//!
//! This module provides the ConnectionRepository struct which encapsulates
//! SeaORM operations for the connections table with account-aware methods
//! and token encryption at the boundary.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::NewConnection;
use crate::crypto::{CryptoKey, decrypt_connection_tokens, encrypt_connection_tokens};
use crate::models::connection::{self, Entity as Connection};

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token encryption
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Decrypts tokens from a connection model
    pub async fn decrypt_tokens(
        &self,
        connection: &connection::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        decrypt_connection_tokens(&self.crypto_key, connection).map_err(|e| {
            tracing::error!(
                account_id = %connection.account_id,
                platform_slug = %connection.platform_slug,
                platform_user_id = %connection.platform_user_id,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }

    /// Persists a freshly exchanged connection, encrypting its tokens. An
    /// existing row for the same (account, platform, platform_user_id) is
    /// reactivated and overwritten instead of duplicated.
    pub async fn upsert_from_exchange(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
        new_connection: NewConnection,
    ) -> Result<connection::Model> {
        let now = Utc::now();

        let existing = self
            .find_by_platform_user(account_id, platform_slug, &new_connection.platform_user_id)
            .await?;

        let id = existing.as_ref().map(|model| model.id).unwrap_or_else(Uuid::new_v4);

        // AAD only depends on identity fields, so encrypt against a skeleton
        // carrying them.
        let skeleton = connection::Model {
            id,
            account_id: *account_id,
            platform_slug: platform_slug.to_string(),
            platform_user_id: new_connection.platform_user_id.clone(),
            display_name: None,
            status: "active".to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: None,
            expires_at: None,
            metadata: None,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let (access_cipher, refresh_cipher) = encrypt_connection_tokens(
            &self.crypto_key,
            &skeleton,
            Some(new_connection.access_token.as_str()),
            new_connection.refresh_token.as_deref(),
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let expires_at: Option<DateTimeWithTimeZone> =
            new_connection.expires_at.map(|dt| dt.into());

        if let Some(existing) = existing {
            let mut model: connection::ActiveModel = existing.into();
            model.status = Set("active".to_string());
            model.display_name = Set(new_connection.display_name);
            model.access_token_ciphertext = Set(access_cipher);
            model.refresh_token_ciphertext = Set(refresh_cipher);
            model.expires_at = Set(expires_at);
            model.metadata = Set(new_connection.metadata);
            model.updated_at = Set(now.into());
            return Ok(model.update(&*self.db).await?);
        }

        let active = connection::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id),
            platform_slug: Set(platform_slug.to_string()),
            platform_user_id: Set(new_connection.platform_user_id),
            display_name: Set(new_connection.display_name),
            status: Set("active".to_string()),
            access_token_ciphertext: Set(access_cipher),
            refresh_token_ciphertext: Set(refresh_cipher),
            expires_at: Set(expires_at),
            metadata: Set(new_connection.metadata),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        let fetched = Connection::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("connection not persisted"))
    }

    /// Finds a connection by its ID within an account scope
    pub async fn find_by_id(
        &self,
        account_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(*id)
            .filter(connection::Column::AccountId.eq(*account_id))
            .one(&*self.db)
            .await?)
    }

    /// Retrieves a connection by its ID without account scoping (background
    /// services)
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<connection::Model>> {
        Ok(Connection::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists all connections for an account ordered by creation time then ID
    pub async fn find_by_account(&self, account_id: &Uuid) -> Result<Vec<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::AccountId.eq(*account_id))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Lists connections for an account/platform pair ordered by creation
    /// time then ID
    pub async fn find_by_account_and_platform(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
    ) -> Result<Vec<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::AccountId.eq(*account_id))
            .filter(connection::Column::PlatformSlug.eq(platform_slug))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Finds a connection by its unique `(account, platform, platform_user)`
    /// tuple
    pub async fn find_by_platform_user(
        &self,
        account_id: &Uuid,
        platform_slug: &str,
        platform_user_id: &str,
    ) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::AccountId.eq(*account_id))
            .filter(connection::Column::PlatformSlug.eq(platform_slug))
            .filter(connection::Column::PlatformUserId.eq(platform_user_id))
            .one(&*self.db)
            .await?)
    }

    /// Overwrites tokens and expiry after a successful refresh. The new
    /// ciphertexts fully replace the old ones.
    pub async fn store_refreshed_tokens(
        &self,
        id: &Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<connection::Model> {
        let existing = Connection::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Connection '{}' not found", id))?;

        let (access_cipher, refresh_cipher) = encrypt_connection_tokens(
            &self.crypto_key,
            &existing,
            Some(access_token),
            refresh_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut model: connection::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(access_cipher);
        if refresh_cipher.is_some() {
            model.refresh_token_ciphertext = Set(refresh_cipher);
        }
        if let Some(expires_at) = expires_at {
            let fixed: DateTimeWithTimeZone = expires_at.into();
            model.expires_at = Set(Some(fixed));
        }
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Updates the connection status (active|revoked|error)
    pub async fn set_status(&self, id: &Uuid, status: &str) -> Result<connection::Model> {
        let existing = Connection::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Connection '{}' not found", id))?;

        let mut model: connection::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Marks a connection revoked within an account scope (disconnect). The
    /// row is kept; only the status changes.
    pub async fn revoke(&self, account_id: &Uuid, id: &Uuid) -> Result<connection::Model> {
        let existing = self
            .find_by_id(account_id, id)
            .await?
            .ok_or_else(|| anyhow!("Connection with ID '{}' not found for account", id))?;

        let mut model: connection::ActiveModel = existing.into();
        model.status = Set("revoked".to_string());
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }
}
