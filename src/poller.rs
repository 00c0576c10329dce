//! # Response Poller
//!
//! Background task that evaluates auto-respond-enabled connections, applies
//! jittered intervals, and enqueues response jobs while maintaining
//! at-most-once semantics per connection. This is the durable replacement
//! for an in-browser interval timer: cadence metadata is persisted alongside
//! job rows, so restarts resume instead of silently stopping, and toggling
//! the responder off stops future scheduling without touching in-flight
//! jobs.

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set, TransactionTrait,
};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::{AppConfig, PollerConfig};
use crate::error::ApiError;
use crate::models::connection::{
    ActiveModel as ConnectionActiveModel, Column as ConnectionColumn, Entity as Connection,
    Model as ConnectionModel,
};
use crate::models::response_job::{
    ActiveModel as ResponseJobActiveModel, Column as ResponseJobColumn, Entity as ResponseJob,
};
use crate::repositories::ResponderSettings;

/// Default number of connections evaluated per tick.
const DEFAULT_BATCH_SIZE: usize = 128;

/// Index name for the pending-job uniqueness guard.
const PENDING_UNIQUE_INDEX: &str = "idx_response_jobs_pending";

/// Background poller service.
pub struct ResponsePoller {
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
    batch_size: usize,
}

#[derive(Debug, Default)]
struct TickStats {
    connections_polled: u64,
    jobs_enqueued: u64,
    jobs_skipped_pending: u64,
    jobs_skipped_not_due: u64,
    jobs_skipped_disabled: u64,
    backlog_connections: u64,
    connections_with_errors: u64,
}

#[derive(Debug, Clone)]
struct DueComputation {
    job_due: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
    is_overdue: bool,
}

impl ResponsePoller {
    /// Create a new poller instance.
    pub fn new(config: Arc<AppConfig>, db: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            db,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the number of connections processed per tick (primarily for
    /// tests).
    #[allow(dead_code)]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the poller loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!("Starting response poller");
        let tick_interval = TokioDuration::from_secs(self.config.poller.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Response poller shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Poller tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("response_poller_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Response poller stopped");
        Ok(())
    }

    /// Evaluate one batch of candidate connections.
    pub async fn tick(&self) -> Result<(), ApiError> {
        let now = Utc::now();
        let mut stats = TickStats::default();

        let candidate_ids = self.load_candidate_ids().await?;

        for connection_id in candidate_ids {
            match self
                .process_connection(connection_id, now, &mut stats)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    stats.connections_with_errors += 1;
                    error!(
                        error = ?err,
                        connection_id = %connection_id,
                        "Failed to process connection for scheduling"
                    );
                }
            }
        }

        gauge!("response_poller_backlog_gauge").set(stats.backlog_connections as f64);

        debug!(
            polled = stats.connections_polled,
            enqueued = stats.jobs_enqueued,
            skipped_pending = stats.jobs_skipped_pending,
            skipped_not_due = stats.jobs_skipped_not_due,
            skipped_disabled = stats.jobs_skipped_disabled,
            errors = stats.connections_with_errors,
            backlog = stats.backlog_connections,
            "Poller tick completed"
        );

        Ok(())
    }

    async fn load_candidate_ids(&self) -> Result<Vec<Uuid>, ApiError> {
        let mut models = Connection::find()
            .filter(ConnectionColumn::Status.eq("active"))
            .order_by_asc(ConnectionColumn::CreatedAt)
            .limit((self.batch_size as u64).saturating_mul(4))
            .all(self.db.as_ref())
            .await
            .map_err(|err| map_db_err("failed to load active connections", err))?;

        models.sort_by_key(|connection| {
            let settings = ResponderSettings::from_connection_metadata(connection.metadata.as_ref());
            settings
                .next_run_at
                .or(settings.activated_at)
                .unwrap_or_else(|| connection.created_at.with_timezone(&Utc))
        });

        Ok(models
            .into_iter()
            .take(self.batch_size)
            .map(|connection| connection.id)
            .collect())
    }

    async fn process_connection(
        &self,
        connection_id: Uuid,
        now: DateTime<Utc>,
        stats: &mut TickStats,
    ) -> Result<(), ApiError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|err| map_db_err("failed to start poller transaction", err))?;

        let Some(connection) = Connection::find()
            .filter(ConnectionColumn::Id.eq(connection_id))
            .filter(ConnectionColumn::Status.eq("active"))
            .one(&txn)
            .await
            .map_err(|err| map_db_err("failed to load connection for scheduling", err))?
        else {
            txn.rollback()
                .await
                .map_err(|err| map_db_err("failed to rollback poller transaction", err))?;
            return Ok(());
        };

        stats.connections_polled += 1;

        let mut settings =
            ResponderSettings::from_connection_metadata(connection.metadata.as_ref());
        let mut settings_dirty = settings.sanitize_interval();

        // Toggled off: stop scheduling; any running job finishes on its own.
        if !settings.enabled {
            stats.jobs_skipped_disabled += 1;
            if settings_dirty {
                self.persist_settings(&txn, &connection, &settings, now)
                    .await?;
            }
            txn.commit()
                .await
                .map_err(|err| map_db_err("failed to commit poller transaction", err))?;
            return Ok(());
        }

        if settings.activated_at.is_none() {
            settings.activated_at = Some(connection.created_at.with_timezone(&Utc));
            settings_dirty = true;
        }

        let base_interval = settings.effective_interval_seconds(&self.config.poller);

        let last_finished = self
            .last_job_finished_at(connection.id, &txn)
            .await?;

        let due = compute_due_times(
            &settings,
            base_interval,
            last_finished,
            settings
                .activated_at
                .unwrap_or_else(|| connection.created_at.with_timezone(&Utc)),
            now,
        );

        let pending_exists = ResponseJob::find()
            .filter(ResponseJobColumn::ConnectionId.eq(connection.id))
            .filter(ResponseJobColumn::Status.is_in(vec!["queued", "running"]))
            .count(&txn)
            .await
            .map_err(|err| map_db_err("failed to check pending jobs", err))?
            > 0;

        if pending_exists {
            stats.jobs_skipped_pending += 1;
            debug!(
                connection_id = %connection.id,
                "Skipping scheduling; pending response job exists"
            );
            if settings_dirty {
                self.persist_settings(&txn, &connection, &settings, now)
                    .await?;
            }
            txn.commit()
                .await
                .map_err(|err| map_db_err("failed to commit poller transaction", err))?;
            return Ok(());
        }

        if now < due.job_due {
            stats.jobs_skipped_not_due += 1;
            debug!(
                connection_id = %connection.id,
                due_at = %due.job_due,
                "Connection not yet due for scheduling"
            );
            if settings_dirty {
                self.persist_settings(&txn, &connection, &settings, now)
                    .await?;
            }
            txn.commit()
                .await
                .map_err(|err| map_db_err("failed to commit poller transaction", err))?;
            return Ok(());
        }

        let jitter_seconds = sample_jitter_seconds(&self.config.poller, base_interval);
        let scheduled_at = due
            .job_due
            .checked_add_signed(Duration::seconds(jitter_seconds as i64))
            .unwrap_or(now);

        settings.next_run_at = Some(due.next_run_at);
        settings.last_jitter_seconds = Some(jitter_seconds);
        settings_dirty = true;

        let job_model = ResponseJobActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(connection.account_id),
            platform_slug: Set(connection.platform_slug.clone()),
            connection_id: Set(connection.id),
            status: Set("queued".to_string()),
            priority: Set(30),
            attempts: Set(0),
            scheduled_at: Set(to_db_time(scheduled_at)),
            retry_after: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            error: Set(None),
            created_at: Set(to_db_time(now)),
            updated_at: Set(to_db_time(now)),
        };

        match job_model.insert(&txn).await {
            Ok(_) | Err(DbErr::UnpackInsertId) => {
                stats.jobs_enqueued += 1;
                if due.is_overdue {
                    stats.backlog_connections += 1;
                }
                info!(
                    connection_id = %connection.id,
                    platform_slug = %connection.platform_slug,
                    account_id = %connection.account_id,
                    base_interval_seconds = base_interval,
                    jitter_seconds = jitter_seconds,
                    scheduled_at = %scheduled_at,
                    next_run_at = %due.next_run_at,
                    "Enqueued response job"
                );

                let metric_labels = vec![
                    ("platform_slug", connection.platform_slug.clone()),
                    ("account_id", connection.account_id.to_string()),
                ];
                counter!("response_poller_jobs_scheduled_total", &metric_labels).increment(1);
                histogram!("response_poller_jitter_seconds", &metric_labels)
                    .record(jitter_seconds as f64);
            }
            Err(err) if is_unique_violation(&err) => {
                stats.jobs_skipped_pending += 1;
                debug!(
                    connection_id = %connection.id,
                    "Pending job already exists; skipping enqueue"
                );
            }
            Err(err) => return Err(map_db_err("failed to insert response job", err)),
        }

        if settings_dirty {
            self.persist_settings(&txn, &connection, &settings, now)
                .await?;
        }

        txn.commit()
            .await
            .map_err(|err| map_db_err("failed to commit poller transaction", err))?;

        Ok(())
    }

    async fn last_job_finished_at(
        &self,
        connection_id: Uuid,
        txn: &DatabaseTransaction,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        let last_job = ResponseJob::find()
            .filter(ResponseJobColumn::ConnectionId.eq(connection_id))
            .filter(ResponseJobColumn::Status.eq("succeeded"))
            .order_by_desc(ResponseJobColumn::FinishedAt)
            .limit(1)
            .one(txn)
            .await
            .map_err(|err| map_db_err("failed to load last response job", err))?;

        Ok(last_job
            .and_then(|job| job.finished_at)
            .map(|dt| dt.with_timezone(&Utc)))
    }

    async fn persist_settings(
        &self,
        txn: &DatabaseTransaction,
        connection: &ConnectionModel,
        settings: &ResponderSettings,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let metadata_json = settings.into_connection_metadata(connection.metadata.as_ref());
        let metadata_option = match metadata_json {
            serde_json::Value::Object(ref map) if map.is_empty() => None,
            value => Some(value),
        };

        let active = ConnectionActiveModel {
            id: Set(connection.id),
            metadata: Set(metadata_option),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };

        active
            .update(txn)
            .await
            .map_err(|err| map_db_err("failed to persist responder settings", err))?;

        Ok(())
    }
}

fn compute_due_times(
    settings: &ResponderSettings,
    base_interval_seconds: u64,
    last_finished: Option<DateTime<Utc>>,
    activation_reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DueComputation {
    let base_interval = Duration::seconds(base_interval_seconds as i64);

    let mut next_due = settings
        .next_run_at
        .or_else(|| last_finished.map(|finished| finished + base_interval))
        .unwrap_or(activation_reference + base_interval);

    let mut advanced = false;
    while next_due <= now {
        next_due += base_interval;
        advanced = true;
    }

    let job_due = if advanced {
        next_due - base_interval
    } else {
        next_due
    };

    let next_run_at = if advanced {
        next_due
    } else {
        next_due + base_interval
    };

    DueComputation {
        job_due,
        next_run_at,
        is_overdue: now > job_due,
    }
}

fn sample_jitter_seconds(config: &PollerConfig, base_interval_seconds: u64) -> u64 {
    let mut rng = rand::thread_rng();
    compute_jitter_seconds(config, base_interval_seconds, &mut rng)
}

fn compute_jitter_seconds<R: Rng + ?Sized>(
    config: &PollerConfig,
    base_interval_seconds: u64,
    rng: &mut R,
) -> u64 {
    let min = config.jitter_pct_min.max(0.0);
    let max = config.jitter_pct_max.max(min);

    if min == 0.0 && max == 0.0 {
        return 0;
    }

    let jitter_pct = if (max - min).abs() < f64::EPSILON {
        min
    } else {
        rng.gen_range(min..=max)
    };

    (base_interval_seconds as f64 * jitter_pct).round() as u64
}

fn is_unique_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sea_orm::SqlxError::Database(db_err))) => {
            let code = db_err.code();
            let constraint = db_err.constraint();
            matches!(constraint, Some(PENDING_UNIQUE_INDEX))
                || matches!(code.as_deref(), Some("23505") | Some("2067"))
        }
        _ => false,
    }
}

fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    DateTime::from_naive_utc_and_offset(
        dt.naive_utc(),
        FixedOffset::east_opt(0).expect("UTC offset"),
    )
}

fn map_db_err(context: &'static str, err: DbErr) -> ApiError {
    error!(error = ?err, context, "Database operation failed");
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn poller_config() -> PollerConfig {
        PollerConfig {
            tick_interval_seconds: 30,
            default_interval_seconds: 30,
            jitter_pct_min: 0.0,
            jitter_pct_max: 0.2,
        }
    }

    #[test]
    fn jitter_respects_bounds() {
        let config = poller_config();
        let base_interval = 30;
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(42);

        for _ in 0..100 {
            let jitter = compute_jitter_seconds(&config, base_interval, &mut rng);
            assert!(jitter <= (base_interval as f64 * config.jitter_pct_max).round() as u64);
            assert!(jitter >= (base_interval as f64 * config.jitter_pct_min).round() as u64);
        }
    }

    #[test]
    fn jitter_zero_when_bounds_zero() {
        let config = PollerConfig {
            jitter_pct_min: 0.0,
            jitter_pct_max: 0.0,
            ..poller_config()
        };
        let mut rng = StepRng::new(0, 1);
        let jitter = compute_jitter_seconds(&config, 60, &mut rng);
        assert_eq!(jitter, 0);
    }

    #[test]
    fn compute_due_bootstrap() {
        let settings = ResponderSettings::default();
        let activation = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = activation;
        let due = compute_due_times(&settings, 30, None, activation, now);

        assert_eq!(due.job_due, activation + Duration::seconds(30));
        assert_eq!(due.next_run_at, activation + Duration::seconds(60));
        assert!(!due.is_overdue);
    }

    #[test]
    fn compute_due_catch_up_advances_until_future() {
        let settings = ResponderSettings::default();
        let activation = DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let last_finished = Some(activation);
        let now = activation + Duration::seconds(70);
        let due = compute_due_times(&settings, 30, last_finished, activation, now);

        assert_eq!(due.job_due, activation + Duration::seconds(60));
        assert_eq!(due.next_run_at, activation + Duration::seconds(90));
        assert!(due.is_overdue);
    }

    #[test]
    fn compute_due_steady_state_rolls_forward() {
        let settings = ResponderSettings {
            next_run_at: Some(
                DateTime::parse_from_rfc3339("2025-06-01T10:00:30Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            ..Default::default()
        };
        let activation = DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = DateTime::parse_from_rfc3339("2025-06-01T10:00:45Z")
            .unwrap()
            .with_timezone(&Utc);
        let due = compute_due_times(&settings, 30, None, activation, now);

        assert_eq!(
            due.job_due,
            DateTime::parse_from_rfc3339("2025-06-01T10:00:30Z")
                .unwrap()
                .with_timezone(&Utc)
        );
        assert_eq!(
            due.next_run_at,
            DateTime::parse_from_rfc3339("2025-06-01T10:01:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
        assert!(due.is_overdue);
    }
}
