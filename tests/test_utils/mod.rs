//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use engage::adapters::NewConnection;
use engage::crypto::CryptoKey;
use engage::migration::{Migrator, MigratorTrait};
use engage::models::connection::Model as ConnectionModel;
use engage::repositories::{AccountRepository, ConnectionRepository, ResponderSettings};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use uuid::Uuid;

/// Fresh in-memory database with migrations applied and the platform
/// catalog seeded.
pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("create in-memory db");
    Migrator::up(&db, None).await.expect("apply migrations");
    engage::seeds::seed_platforms(&db)
        .await
        .expect("seed platforms");
    db
}

/// Deterministic 32-byte test key.
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![0u8; 32]).expect("valid test key")
}

/// Creates an account row and returns its id.
pub async fn create_account(db: &DatabaseConnection) -> Uuid {
    let id = Uuid::new_v4();
    AccountRepository::new(Arc::new(db.clone()))
        .create(id, "Test Account")
        .await
        .expect("create account");
    id
}

/// Creates an active, token-bearing connection for the given account and
/// platform.
pub async fn create_connection(
    db: &DatabaseConnection,
    account_id: &Uuid,
    platform_slug: &str,
    access_token: &str,
) -> ConnectionModel {
    let repo = ConnectionRepository::new(Arc::new(db.clone()), test_crypto_key());
    repo.upsert_from_exchange(
        account_id,
        platform_slug,
        NewConnection {
            platform_user_id: format!("{}-user-1", platform_slug),
            display_name: Some("creator".to_string()),
            access_token: access_token.to_string(),
            refresh_token: Some("refresh-token-1".to_string()),
            expires_at: None,
            metadata: None,
        },
    )
    .await
    .expect("create connection")
}

/// Flips the responder toggle on for a connection.
pub async fn enable_responder(db: &DatabaseConnection, connection: &ConnectionModel) {
    let mut settings = ResponderSettings::from_connection_metadata(connection.metadata.as_ref());
    settings.enabled = true;

    let metadata = settings.into_connection_metadata(connection.metadata.as_ref());
    let mut active: engage::models::connection::ActiveModel = connection.clone().into();
    active.metadata = Set(Some(metadata));
    active.update(db).await.expect("persist responder settings");
}

/// Inserts a queued response job for the connection, scheduled in the past
/// so it is immediately claimable.
pub async fn insert_queued_job(
    db: &DatabaseConnection,
    connection: &ConnectionModel,
) -> engage::models::response_job::Model {
    use engage::models::response_job;

    let now = chrono::Utc::now();
    let scheduled = now - chrono::Duration::seconds(5);
    let active = response_job::ActiveModel {
        id: Set(Uuid::new_v4()),
        account_id: Set(connection.account_id),
        platform_slug: Set(connection.platform_slug.clone()),
        connection_id: Set(connection.id),
        status: Set("queued".to_string()),
        priority: Set(30),
        attempts: Set(0),
        scheduled_at: Set(scheduled.into()),
        retry_after: Set(None),
        started_at: Set(None),
        finished_at: Set(None),
        error: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    active.insert(db).await.expect("insert job")
}
