//! Integration tests for the response poller: durable scheduling with the
//! at-most-once pending guard, and the auto-respond toggle semantics.

mod test_utils;

use std::sync::Arc;

use chrono::{Duration, Utc};
use engage::config::AppConfig;
use engage::models::{connection, response_job};
use engage::poller::ResponsePoller;
use engage::repositories::ResponderSettings;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use test_utils::{create_account, create_connection, setup_db};
use uuid::Uuid;

fn poller_config() -> Arc<AppConfig> {
    let mut config = AppConfig::default();
    config.poller.jitter_pct_min = 0.0;
    config.poller.jitter_pct_max = 0.0;
    Arc::new(config)
}

/// Writes responder settings with an activation timestamp far enough in the
/// past that the connection is immediately due.
async fn enable_responder_in_past(db: &DatabaseConnection, connection_id: &Uuid) {
    let model = connection::Entity::find_by_id(*connection_id)
        .one(db)
        .await
        .unwrap()
        .unwrap();

    let mut settings = ResponderSettings::from_connection_metadata(model.metadata.as_ref());
    settings.enabled = true;
    settings.activated_at = Some(Utc::now() - Duration::minutes(5));

    let metadata = settings.into_connection_metadata(model.metadata.as_ref());
    let mut active: connection::ActiveModel = model.into();
    active.metadata = Set(Some(metadata));
    active.update(db).await.unwrap();
}

async fn queued_job_count(db: &DatabaseConnection, connection_id: &Uuid) -> usize {
    response_job::Entity::find()
        .filter(response_job::Column::ConnectionId.eq(*connection_id))
        .filter(response_job::Column::Status.eq("queued"))
        .all(db)
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn tick_enqueues_job_for_due_connection() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conn = create_connection(&db, &account_id, "instagram", "token").await;
    enable_responder_in_past(&db, &conn.id).await;

    let poller = ResponsePoller::new(poller_config(), Arc::new(db.clone()));
    poller.tick().await.expect("tick succeeds");

    assert_eq!(queued_job_count(&db, &conn.id).await, 1);

    // Cadence metadata was persisted for the next round
    let updated = connection::Entity::find_by_id(conn.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let settings = ResponderSettings::from_connection_metadata(updated.metadata.as_ref());
    assert!(settings.next_run_at.is_some());
    assert_eq!(settings.last_jitter_seconds, Some(0));
}

#[tokio::test]
async fn pending_job_blocks_duplicate_scheduling() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conn = create_connection(&db, &account_id, "instagram", "token").await;
    enable_responder_in_past(&db, &conn.id).await;

    let poller = ResponsePoller::new(poller_config(), Arc::new(db.clone()));
    poller.tick().await.expect("first tick");
    poller.tick().await.expect("second tick");
    poller.tick().await.expect("third tick");

    assert_eq!(
        queued_job_count(&db, &conn.id).await,
        1,
        "at most one pending job per connection"
    );
}

#[tokio::test]
async fn disabled_connection_is_never_scheduled() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conn = create_connection(&db, &account_id, "instagram", "token").await;
    // Responder left disabled

    let poller = ResponsePoller::new(poller_config(), Arc::new(db.clone()));
    poller.tick().await.expect("tick succeeds");

    assert_eq!(queued_job_count(&db, &conn.id).await, 0);
}

#[tokio::test]
async fn toggling_off_stops_future_scheduling_but_keeps_inflight_job() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conn = create_connection(&db, &account_id, "instagram", "token").await;
    enable_responder_in_past(&db, &conn.id).await;

    let poller = ResponsePoller::new(poller_config(), Arc::new(db.clone()));
    poller.tick().await.expect("first tick");
    assert_eq!(queued_job_count(&db, &conn.id).await, 1);

    // The claimed job goes to running (simulating the executor picking it
    // up), then the operator toggles off mid-poll
    let job = response_job::Entity::find()
        .filter(response_job::Column::ConnectionId.eq(conn.id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let mut running: response_job::ActiveModel = job.clone().into();
    running.status = Set("running".to_string());
    running.update(&db).await.unwrap();

    let model = connection::Entity::find_by_id(conn.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let mut settings = ResponderSettings::from_connection_metadata(model.metadata.as_ref());
    settings.enabled = false;
    let metadata = settings.into_connection_metadata(model.metadata.as_ref());
    let mut active: connection::ActiveModel = model.into();
    active.metadata = Set(Some(metadata));
    active.update(&db).await.unwrap();

    // Further ticks schedule nothing and do not touch the in-flight job
    poller.tick().await.expect("tick after toggle-off");

    let jobs = response_job::Entity::find()
        .filter(response_job::Column::ConnectionId.eq(conn.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, "running", "in-flight job left to complete");

    // Even after the running job finishes, a disabled connection stays
    // unscheduled
    let mut finished: response_job::ActiveModel = jobs[0].clone().into();
    finished.status = Set("succeeded".to_string());
    finished.finished_at = Set(Some(Utc::now().into()));
    finished.update(&db).await.unwrap();

    poller.tick().await.expect("tick after completion");
    assert_eq!(queued_job_count(&db, &conn.id).await, 0);
}

#[tokio::test]
async fn revoked_connection_is_not_scheduled() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conn = create_connection(&db, &account_id, "instagram", "token").await;
    enable_responder_in_past(&db, &conn.id).await;

    let model = connection::Entity::find_by_id(conn.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let mut active: connection::ActiveModel = model.into();
    active.status = Set("revoked".to_string());
    active.update(&db).await.unwrap();

    let poller = ResponsePoller::new(poller_config(), Arc::new(db.clone()));
    poller.tick().await.expect("tick succeeds");

    assert_eq!(queued_job_count(&db, &conn.id).await, 0);
}
