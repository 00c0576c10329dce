//! # Token Refresh Service
//!
//! Background task that periodically scans active connections and refreshes
//! tokens nearing expiry. Also provides on-demand refresh for the executor
//! when a platform call comes back 401. Callers are responsible for invoking
//! refresh before expiry; data-path calls are never transparently retried.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::connection::{self, Entity as Connection};
use crate::repositories::ConnectionRepository;

/// Background token refresh service
pub struct TokenRefreshService {
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
    connection_repo: Arc<ConnectionRepository>,
    registry: Arc<AdapterRegistry>,
    /// Connections with a refresh currently in flight (single-flight guard)
    in_flight_refreshes: Arc<Mutex<HashSet<Uuid>>>,
}

#[derive(Debug, Default)]
struct RefreshStats {
    refreshes_succeeded: u64,
    refreshes_failed: u64,
}

/// Classification of token refresh errors for appropriate handling
#[derive(Debug, PartialEq)]
pub enum RefreshErrorClassification {
    /// Permanent failures that should disable the connection (e.g.,
    /// invalid_grant)
    Permanent,
    /// Temporary failures that can be retried (e.g., network issues)
    Transient,
    /// Rate limiting errors that should trigger backoff
    RateLimited,
}

/// Result of a token refresh operation
#[derive(Debug)]
pub struct RefreshResult {
    pub success: bool,
    pub connection_id: Uuid,
    pub new_expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TokenRefreshService {
    /// Create a new token refresh service instance
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        connection_repo: Arc<ConnectionRepository>,
        registry: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            config,
            db,
            connection_repo,
            registry,
            in_flight_refreshes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the token refresh loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!("Starting token refresh service");
        let tick_interval = TokioDuration::from_secs(self.config.token_refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Token refresh service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Token refresh tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("token_refresh_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Token refresh service stopped");
        Ok(())
    }

    /// Execute one tick of the token refresh service
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<(), ApiError> {
        let now = Utc::now();
        let mut stats = RefreshStats::default();

        let due_connections = self.find_connections_due_for_refresh(now).await?;

        info!(
            found_connections = due_connections.len(),
            lead_time_seconds = self.config.token_refresh.lead_time_seconds,
            "Found connections due for token refresh"
        );

        gauge!("token_refresh_connections_due_gauge").set(due_connections.len() as f64);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.token_refresh.concurrency as usize,
        ));

        let mut handles = Vec::new();

        for connection in due_connections {
            let semaphore = semaphore.clone();
            let service = self.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                service.refresh_connection_with_jitter(connection).await
            });

            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(result)) if result.success => stats.refreshes_succeeded += 1,
                Ok(Ok(_)) => stats.refreshes_failed += 1,
                Ok(Err(e)) => {
                    stats.refreshes_failed += 1;
                    error!(error = ?e, "Connection refresh failed");
                }
                Err(e) => {
                    stats.refreshes_failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        counter!("token_refresh_success_total").increment(stats.refreshes_succeeded);
        counter!("token_refresh_failure_total").increment(stats.refreshes_failed);

        debug!(
            refreshes_succeeded = stats.refreshes_succeeded,
            refreshes_failed = stats.refreshes_failed,
            "Token refresh tick completed"
        );

        Ok(())
    }

    /// Find active connections whose tokens expire within the lead time
    /// window
    async fn find_connections_due_for_refresh(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<connection::Model>, ApiError> {
        let expiry_cutoff =
            now + Duration::seconds(self.config.token_refresh.lead_time_seconds as i64);
        let expiry_cutoff_db: DateTimeWithTimeZone = expiry_cutoff.into();

        let connections = Connection::find()
            .filter(connection::Column::Status.eq("active"))
            .filter(connection::Column::RefreshTokenCiphertext.is_not_null())
            .filter(
                connection::Column::ExpiresAt
                    .is_not_null()
                    .and(connection::Column::ExpiresAt.lte(expiry_cutoff_db)),
            )
            .order_by_asc(connection::Column::ExpiresAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to query connections due for refresh");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to query connections due for refresh",
                )
            })?;

        Ok(connections)
    }

    /// Refresh a single connection with jitter applied
    async fn refresh_connection_with_jitter(
        &self,
        connection: connection::Model,
    ) -> Result<RefreshResult, ApiError> {
        let jitter_seconds = self.compute_jitter();
        if jitter_seconds > 0 {
            debug!(
                connection_id = %connection.id,
                jitter_seconds = jitter_seconds,
                "Applying jitter before token refresh"
            );
            sleep(TokioDuration::from_secs(jitter_seconds)).await;
        }

        self.refresh_connection(connection).await
    }

    /// Refresh a single connection's tokens
    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn refresh_connection(
        &self,
        connection: connection::Model,
    ) -> Result<RefreshResult, ApiError> {
        let refresh_start = std::time::Instant::now();

        let (_access_token, refresh_token) = self
            .connection_repo
            .decrypt_tokens(&connection)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to decrypt tokens for connection");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to decrypt tokens",
                )
            })?;

        let Some(refresh_token) = refresh_token else {
            warn!(
                connection_id = %connection.id,
                "Connection has no refresh token, cannot refresh"
            );
            return Ok(RefreshResult {
                success: false,
                connection_id: connection.id,
                new_expires_at: None,
                error: Some("No refresh token available".to_string()),
            });
        };

        let adapter = self
            .registry
            .get(&connection.platform_slug)
            .map_err(|e| {
                error!(
                    platform_slug = %connection.platform_slug,
                    error = ?e,
                    "Failed to get adapter for platform"
                );
                ApiError::new(
                    axum::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    &format!(
                        "Adapter for platform '{}' not found",
                        connection.platform_slug
                    ),
                )
            })?;

        match adapter.refresh_token(&refresh_token).await {
            Ok(credentials) => {
                let updated = self
                    .connection_repo
                    .store_refreshed_tokens(
                        &connection.id,
                        &credentials.access_token,
                        credentials.refresh_token.as_deref(),
                        credentials.expires_at,
                    )
                    .await
                    .map_err(|e| {
                        error!(error = ?e, "Failed to persist refreshed tokens");
                        ApiError::new(
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            "INTERNAL_SERVER_ERROR",
                            "Failed to persist refreshed tokens",
                        )
                    })?;

                let refresh_duration = refresh_start.elapsed();
                histogram!("token_refresh_latency_ms")
                    .record(refresh_duration.as_secs_f64() * 1_000.0);

                info!(
                    connection_id = %connection.id,
                    platform_slug = %connection.platform_slug,
                    refresh_duration_ms = refresh_duration.as_millis(),
                    "Successfully refreshed connection tokens"
                );

                let metric_labels = vec![
                    ("platform_slug", connection.platform_slug.clone()),
                    ("account_id", connection.account_id.to_string()),
                ];
                counter!("token_refresh_success_total", &metric_labels).increment(1);

                Ok(RefreshResult {
                    success: true,
                    connection_id: updated.id,
                    new_expires_at: updated.expires_at.map(|dt| dt.with_timezone(&Utc)),
                    error: None,
                })
            }
            Err(e) => {
                let error_str = e.to_string();
                error!(
                    connection_id = %connection.id,
                    platform_slug = %connection.platform_slug,
                    error = %error_str,
                    "Failed to refresh connection tokens"
                );

                match self.classify_refresh_error(&error_str) {
                    RefreshErrorClassification::Permanent => {
                        error!(
                            connection_id = %connection.id,
                            platform_slug = %connection.platform_slug,
                            "Permanent token refresh failure - marking connection as error"
                        );

                        self.connection_repo
                            .set_status(&connection.id, "error")
                            .await
                            .map_err(|e| {
                                error!(error = ?e, "Failed to mark connection as error status");
                                ApiError::new(
                                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                                    "INTERNAL_SERVER_ERROR",
                                    "Failed to update connection status",
                                )
                            })?;

                        counter!("token_refresh_permanent_failure_total").increment(1);
                    }
                    RefreshErrorClassification::Transient => {
                        warn!(
                            connection_id = %connection.id,
                            "Transient token refresh failure - will retry later"
                        );
                        counter!("token_refresh_transient_failure_total").increment(1);
                    }
                    RefreshErrorClassification::RateLimited => {
                        warn!(
                            connection_id = %connection.id,
                            "Rate limited during token refresh"
                        );
                        counter!("token_refresh_rate_limited_total").increment(1);
                    }
                }

                let metric_labels = vec![
                    ("platform_slug", connection.platform_slug.clone()),
                    ("account_id", connection.account_id.to_string()),
                ];
                counter!("token_refresh_failure_total", &metric_labels).increment(1);

                Ok(RefreshResult {
                    success: false,
                    connection_id: connection.id,
                    new_expires_at: None,
                    error: Some(error_str),
                })
            }
        }
    }

    /// Classify token refresh errors for appropriate handling strategy
    pub fn classify_refresh_error(&self, error_str: &str) -> RefreshErrorClassification {
        let error_lower = error_str.to_lowercase();

        if error_lower.contains("invalid_grant")
            || error_lower.contains("invalid_client")
            || error_lower.contains("unauthorized_client")
            || error_lower.contains("revoked")
            || error_lower.contains("forbidden")
            || error_lower.contains("access_denied")
            || error_lower.contains("unsupported_grant_type")
        {
            return RefreshErrorClassification::Permanent;
        }

        if error_lower.contains("rate limit")
            || error_lower.contains("rate_limit")
            || error_lower.contains("too_many_requests")
            || error_lower.contains("temporarily_unavailable")
            || error_lower.contains("quota_exceeded")
        {
            return RefreshErrorClassification::RateLimited;
        }

        RefreshErrorClassification::Transient
    }

    /// Compute jitter delay based on configuration
    fn compute_jitter(&self) -> u64 {
        if self.config.token_refresh.jitter_factor <= 0.0 {
            return 0;
        }

        let max_delay_seconds = (self.config.token_refresh.lead_time_seconds as f64
            * self.config.token_refresh.jitter_factor) as u64;

        let mut rng = rand::thread_rng();
        rng.gen_range(0..=max_delay_seconds)
    }

    /// On-demand refresh for when operations receive a 401 error, with
    /// single-flight protection per connection.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    pub async fn refresh_on_demand(&self, connection_id: &Uuid) -> Result<RefreshResult, ApiError> {
        {
            let mut in_flight = self.in_flight_refreshes.lock().await;
            if !in_flight.insert(*connection_id) {
                info!(
                    connection_id = %connection_id,
                    "Refresh already in progress, waiting for current state"
                );
                drop(in_flight);
                // Brief wait, then report whatever the winning refresh left
                // behind.
                tokio::time::sleep(TokioDuration::from_millis(100)).await;
                return self.current_connection_state(connection_id).await;
            }
        }

        counter!("token_refresh_on_demand_attempts_total").increment(1);

        let result = async {
            let connection = self
                .connection_repo
                .get_by_id(connection_id)
                .await
                .map_err(|e| {
                    error!(error = ?e, "Failed to find connection for on-demand refresh");
                    ApiError::new(
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_SERVER_ERROR",
                        "Failed to load connection",
                    )
                })?
                .ok_or_else(|| {
                    ApiError::new(
                        axum::http::StatusCode::NOT_FOUND,
                        "NOT_FOUND",
                        "Connection not found",
                    )
                })?;

            self.refresh_connection(connection).await
        }
        .await;

        {
            let mut in_flight = self.in_flight_refreshes.lock().await;
            in_flight.remove(connection_id);
        }

        let result = result?;

        if result.success {
            counter!("token_refresh_on_demand_success_total").increment(1);
        } else {
            counter!("token_refresh_on_demand_failure_total").increment(1);
        }

        Ok(result)
    }

    /// Report the current persisted state of a connection after another
    /// task's refresh.
    async fn current_connection_state(
        &self,
        connection_id: &Uuid,
    ) -> Result<RefreshResult, ApiError> {
        let connection = self
            .connection_repo
            .get_by_id(connection_id)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to find connection after refresh");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to get connection state",
                )
            })?
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Connection not found",
                )
            })?;

        Ok(RefreshResult {
            success: connection.status == "active",
            connection_id: *connection_id,
            new_expires_at: connection.expires_at.map(|dt| dt.with_timezone(&Utc)),
            error: None,
        })
    }
}

impl Clone for TokenRefreshService {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            db: self.db.clone(),
            connection_repo: self.connection_repo.clone(),
            registry: self.registry.clone(),
            in_flight_refreshes: self.in_flight_refreshes.clone(),
        }
    }
}
