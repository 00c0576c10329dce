//! Response Executor
//!
//! Background executor responsible for claiming due response jobs, running
//! the poll-classify-dispatch pipeline against platform adapters and the AI
//! gateway, advancing per-conversation cursors, and applying backoff and
//! retry on failure.

use chrono::Utc;
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AdapterContext, AdapterRegistry, FetchCommentsParams, FetchMessagesParams, PipelineError,
    PipelineErrorKind,
};
use crate::cache::{PERSONA_RESOURCE, PersonaCache};
use crate::classifier::{Classifier, Signal};
use crate::config::{ExecutorConfig, RateLimitPolicyConfig};
use crate::crypto::CryptoKey;
use crate::dispatch::{Dispatcher, ReplySender};
use crate::models::{
    connection::Entity as ConnectionEntity,
    conversation::Model as ConversationModel,
    message::Model as MessageModel,
    persona_profile::Model as PersonaModel,
    response_job::{self, ActiveModel as ResponseJobActiveModel, Entity as ResponseJobEntity},
};
use crate::repositories::conversation::ParticipantInfo;
use crate::repositories::{
    ConversationRepository, MessageRepository, NewMessage, PersonaRepository,
};

/// Response executor running the background auto-responder pipeline
pub struct ResponseExecutor {
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<AdapterRegistry>,
    classifier: Classifier,
    dispatcher: Dispatcher,
    conversations: ConversationRepository,
    messages: MessageRepository,
    personas: PersonaRepository,
    persona_cache: Arc<PersonaCache>,
    crypto_key: CryptoKey,
    config: ExecutorConfig,
    rate_limit_policy: RateLimitPolicyConfig,
}

impl ResponseExecutor {
    /// Create a new response executor
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<AdapterRegistry>,
        classifier: Classifier,
        persona_cache: Arc<PersonaCache>,
        crypto_key: CryptoKey,
        config: ExecutorConfig,
        rate_limit_policy: RateLimitPolicyConfig,
    ) -> Self {
        let conversations = ConversationRepository::new(db.clone());
        let messages = MessageRepository::new(db.clone());
        let personas = PersonaRepository::new(db.clone());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            conversations.clone(),
            messages.clone(),
        );

        Self {
            db,
            registry,
            classifier,
            dispatcher,
            conversations,
            messages,
            personas,
            persona_cache,
            crypto_key,
            config,
            rate_limit_policy,
        }
    }

    /// Get the executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Calculate retry backoff based on rate limit policy and error
    fn calculate_backoff(
        &self,
        pipeline_error: &PipelineError,
        attempts_completed: i32,
        platform_slug: &str,
    ) -> (f64, bool) {
        let policy = self.rate_limit_policy.platform_overrides.get(platform_slug);

        let base_seconds = policy
            .and_then(|p| p.base_seconds)
            .unwrap_or(self.rate_limit_policy.base_seconds) as f64;
        let max_seconds = policy
            .and_then(|p| p.max_seconds)
            .unwrap_or(self.rate_limit_policy.max_seconds) as f64;
        let jitter_factor = policy
            .and_then(|p| p.jitter_factor)
            .unwrap_or(self.rate_limit_policy.jitter_factor);

        let mut backoff = (base_seconds * 2_f64.powi(attempts_completed)).min(max_seconds);

        // A retry_after hint from the platform or gateway wins when larger
        if let PipelineErrorKind::RateLimited { retry_after_secs } = &pipeline_error.kind
            && let Some(retry_after) = retry_after_secs
        {
            backoff = backoff.max(*retry_after as f64);
        }

        let jitter = thread_rng().gen_range(0.0..(jitter_factor * backoff).max(f64::MIN_POSITIVE));
        let final_backoff = backoff + jitter;

        let is_rate_limited = matches!(
            pipeline_error.kind,
            PipelineErrorKind::RateLimited { .. }
        );

        (final_backoff, is_rate_limited)
    }

    /// Run the executor loop until the provided shutdown token fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), PipelineError> {
        info!("Starting response executor with config: {:?}", self.config);

        loop {
            let start = std::time::Instant::now();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Response executor shutdown requested");
                    break;
                }
                result = self.claim_and_run_jobs() => {
                    match result {
                        Ok(count) if count > 0 => {
                            debug!("Executed {} response jobs", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Error executing response jobs: {}", e);
                        }
                    }
                }
            }

            // Sleep for remaining tick time
            let elapsed = start.elapsed();
            let tick_duration = Duration::from_millis(self.config.tick_ms);
            if elapsed < tick_duration {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(tick_duration - elapsed) => {}
                }
            }
        }

        info!("Response executor stopped");
        Ok(())
    }

    /// Claim due jobs and execute them
    #[instrument(skip(self), fields(batch_size = self.config.claim_batch))]
    pub async fn claim_and_run_jobs(
        &self,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let timer = std::time::Instant::now();
        let jobs = self.claim_jobs().await?;
        let count = jobs.len();

        if jobs.is_empty() {
            debug!("No due jobs found to claim");
            return Ok(0);
        }

        info!("Claimed {} jobs for execution", count);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.concurrency));

        let mut handles = Vec::new();
        for job in jobs {
            let executor = self.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| "Failed to acquire semaphore permit")?;

            let handle = tokio::spawn(async move {
                let _permit = permit; // held until job completes
                if let Err(e) = executor.run_single_job(job).await {
                    error!("Error running job: {}", e);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        let elapsed = timer.elapsed();
        info!(
            "Completed {} jobs in {:.2}s (avg: {:.2}s/job)",
            count,
            elapsed.as_secs_f64(),
            elapsed.as_secs_f64() / count as f64
        );

        Ok(count)
    }

    /// Claim due jobs from the database with an atomic queued -> running
    /// transition; at most one running job per connection.
    async fn claim_jobs(
        &self,
    ) -> Result<Vec<response_job::Model>, Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let eligible_jobs = ResponseJobEntity::find()
            .select_only()
            .column(response_job::Column::Id)
            .filter(
                response_job::Column::Status
                    .eq("queued")
                    .and(response_job::Column::ScheduledAt.lte(now))
                    .and(
                        response_job::Column::RetryAfter
                            .is_null()
                            .or(response_job::Column::RetryAfter.lte(now)),
                    ),
            )
            .filter(
                response_job::Column::ConnectionId.not_in_subquery(
                    ResponseJobEntity::find()
                        .select_only()
                        .column(response_job::Column::ConnectionId)
                        .filter(response_job::Column::Status.eq("running"))
                        .into_query(),
                ),
            )
            .order_by_desc(response_job::Column::Priority)
            .order_by_asc(response_job::Column::ScheduledAt)
            .limit(Some(self.config.claim_batch as u64))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        let update_result = if !eligible_jobs.is_empty() {
            ResponseJobEntity::update_many()
                .col_expr(response_job::Column::Status, Expr::value("running"))
                .col_expr(response_job::Column::StartedAt, Expr::value(now))
                .col_expr(
                    response_job::Column::Attempts,
                    Expr::value(Expr::col(response_job::Column::Attempts).add(1)),
                )
                .filter(response_job::Column::Id.is_in(eligible_jobs))
                .filter(response_job::Column::Status.eq("queued"))
                .exec(&txn)
                .await?
        } else {
            txn.commit().await?;
            return Ok(Vec::new());
        };

        // Return only the jobs this pass actually transitioned
        let claimed_jobs = if update_result.rows_affected > 0 {
            ResponseJobEntity::find()
                .filter(response_job::Column::Status.eq("running"))
                .filter(response_job::Column::StartedAt.eq(now))
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed_jobs)
    }

    /// Run a single response job
    #[instrument(skip(self), fields(job_id = %job.id, connection_id = %job.connection_id, platform_slug = %job.platform_slug))]
    pub async fn run_single_job(
        &self,
        job: response_job::Model,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let start_time = std::time::Instant::now();
        info!("Starting response job {} (attempt {})", job.id, job.attempts);

        let outcome = tokio::time::timeout(
            Duration::from_secs(self.config.max_run_seconds),
            self.execute_job(&job),
        )
        .await;

        match outcome {
            Ok(Ok(stats)) => {
                let execution_time = start_time.elapsed();
                histogram!("response_job_duration_ms")
                    .record(execution_time.as_secs_f64() * 1_000.0);

                self.handle_success(&job).await?;
                info!(
                    job_id = %job.id,
                    inbound_recorded = stats.inbound_recorded,
                    replies_sent = stats.replies_sent,
                    auto_dms_sent = stats.auto_dms_sent,
                    duration_ms = execution_time.as_millis(),
                    "Response job completed"
                );
                Ok(())
            }
            Ok(Err(pipeline_error)) => {
                warn!(
                    job_id = %job.id,
                    error = %pipeline_error,
                    "Response job failed"
                );
                self.handle_failure(&job, &pipeline_error).await?;
                Err(Box::new(pipeline_error))
            }
            Err(_) => {
                let timeout_error =
                    PipelineError::transient(format!("job timed out after {}s", self.config.max_run_seconds));
                warn!(job_id = %job.id, "Response job timed out");
                self.handle_failure(&job, &timeout_error).await?;
                Err(Box::new(timeout_error))
            }
        }
    }

    /// Execute the poll-classify-dispatch pipeline for one job
    async fn execute_job(&self, job: &response_job::Model) -> Result<JobStats, PipelineError> {
        let mut stats = JobStats::default();

        // Resolve connection and token at call time; the not-connected gate
        // runs before any network I/O.
        let connection = ConnectionEntity::find_by_id(job.connection_id)
            .one(&*self.db)
            .await
            .map_err(|e| PipelineError::transient(e.to_string()))?
            .ok_or_else(|| PipelineError::permanent("connection not found"))?;

        let ctx = AdapterContext::from_connection(&self.crypto_key, connection)?;
        let adapter = self
            .registry
            .get(&job.platform_slug)
            .map_err(|e| PipelineError::permanent(e.to_string()))?;

        let persona = self.load_persona(&job.account_id).await?;

        // Inbound DM sweep: upsert conversations and record new fan messages
        let batch = adapter
            .fetch_messages(FetchMessagesParams {
                ctx: ctx.clone(),
                since_message_id: None,
                limit: None,
            })
            .await?;

        for inbound in batch.messages {
            let conversation = self
                .conversations
                .upsert_for_participant(
                    &job.account_id,
                    &job.platform_slug,
                    &ParticipantInfo {
                        participant_id: inbound.participant_id.clone(),
                        username: inbound.participant_username.clone(),
                        avatar_url: inbound.participant_avatar_url.clone(),
                    },
                    true,
                )
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;

            // Re-scans are idempotent: platform ids already recorded are
            // skipped.
            let already_recorded = self
                .messages
                .platform_message_exists(&conversation.id, &inbound.platform_message_id)
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;
            if already_recorded {
                continue;
            }

            self.messages
                .append(
                    &conversation.id,
                    NewMessage::fan(
                        inbound
                            .participant_username
                            .clone()
                            .unwrap_or_else(|| inbound.participant_id.clone()),
                        inbound.text.clone(),
                        inbound.platform_message_id.clone(),
                        inbound.sent_at,
                    ),
                )
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;

            stats.inbound_recorded += 1;
        }

        // Reply pass, driven by the persisted cursor rather than what this
        // tick happened to append: a restart between record and reply
        // resumes here instead of dropping the message.
        let ai_threads: Vec<ConversationModel> = self
            .conversations
            .list_ai_enabled(&job.account_id, &job.platform_slug)
            .await
            .map_err(|e| PipelineError::transient(e.to_string()))?;

        for conversation in ai_threads {
            let recent: Vec<MessageModel> = self
                .messages
                .recent_context(&conversation.id, self.classifier.context_turns())
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;

            let Some(latest_fan) = recent
                .iter()
                .rev()
                .find(|row| row.sender_type == "fan" && !row.content.trim().is_empty())
            else {
                continue;
            };
            let Some(latest_platform_id) = latest_fan.platform_message_id.clone() else {
                continue;
            };

            // Already answered up to here
            if conversation.last_processed_message_id.as_deref()
                == Some(latest_platform_id.as_str())
            {
                continue;
            }

            let context: Vec<MessageModel> = recent
                .iter()
                .filter(|row| row.id != latest_fan.id)
                .cloned()
                .collect();

            let reply = self
                .classifier
                .generate_reply(
                    &latest_fan.content,
                    &latest_fan.sender_name,
                    &context,
                    persona.as_ref(),
                    conversation.redirect_sent,
                )
                .await?;

            let outcome = self
                .dispatcher
                .send_reply(ctx.clone(), &conversation, ReplySender::Ai, reply.clone(), None)
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;

            if outcome.is_sent() {
                stats.replies_sent += 1;

                if let Some(persona) = persona.as_ref()
                    && let Some(url) = &persona.redirect_url
                    && !conversation.redirect_sent
                    && reply.contains(url.as_str())
                {
                    self.dispatcher
                        .note_redirect_sent(&conversation.id)
                        .await
                        .map_err(|e| PipelineError::transient(e.to_string()))?;
                }
            }

            // The cursor only advances after the dispatch attempt completed
            // for this conversation.
            self.conversations
                .advance_cursor(&conversation.id, &latest_platform_id)
                .await
                .map_err(|e| PipelineError::transient(e.to_string()))?;
        }

        // Comment sweep: classify for buying signals and auto-DM, at most
        // once per triggering comment.
        let supports_comments = self
            .registry
            .get_metadata(&job.platform_slug)
            .map(|metadata| metadata.supports_comments)
            .unwrap_or(false);

        if supports_comments {
            let comment_batch = adapter
                .fetch_comments(FetchCommentsParams {
                    ctx: ctx.clone(),
                    limit: None,
                })
                .await?;

            if !comment_batch.comments.is_empty() {
                let classified = self
                    .classifier
                    .classify_comments(&comment_batch.comments)
                    .await?;

                for item in classified {
                    if item.signal != Signal::Buying {
                        continue;
                    }
                    let Some(reply) = item.suggested_reply else {
                        continue;
                    };

                    let conversation = self
                        .conversations
                        .upsert_for_participant(
                            &job.account_id,
                            &job.platform_slug,
                            &ParticipantInfo {
                                participant_id: item.author_id.clone(),
                                username: item.author_username.clone(),
                                avatar_url: None,
                            },
                            true,
                        )
                        .await
                        .map_err(|e| PipelineError::transient(e.to_string()))?;

                    let outcome = self
                        .dispatcher
                        .send_reply(
                            ctx.clone(),
                            &conversation,
                            ReplySender::Ai,
                            reply,
                            Some(item.comment_id.clone()),
                        )
                        .await
                        .map_err(|e| PipelineError::transient(e.to_string()))?;

                    if outcome.is_sent() {
                        stats.auto_dms_sent += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn load_persona(
        &self,
        account_id: &Uuid,
    ) -> Result<Option<PersonaModel>, PipelineError> {
        let scope = account_id.to_string();
        if let Some(cached) = self.persona_cache.get(PERSONA_RESOURCE, &scope) {
            return Ok(cached);
        }

        let persona = self
            .personas
            .find_by_account(account_id)
            .await
            .map_err(|e| PipelineError::transient(e.to_string()))?;

        self.persona_cache
            .insert(PERSONA_RESOURCE, &scope, persona.clone());
        Ok(persona)
    }

    /// Mark a job succeeded
    async fn handle_success(
        &self,
        job: &response_job::Model,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();

        let mut active_job: ResponseJobActiveModel = job.clone().into();
        active_job.status = Set("succeeded".to_string());
        active_job.finished_at = Set(Some(now.into()));
        active_job.updated_at = Set(now.into());
        active_job.update(&*self.db).await?;

        let metric_labels = vec![("platform", job.platform_slug.clone())];
        counter!("response_jobs_succeeded_total", &metric_labels).increment(1);

        Ok(())
    }

    /// Handle job failure: requeue with backoff, or mark failed for good
    /// after max attempts or a permanent error.
    async fn handle_failure(
        &self,
        job: &response_job::Model,
        pipeline_error: &PipelineError,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();

        // job.attempts already includes the current attempt (incremented
        // during claim)
        let attempts_completed = job.attempts.max(0);
        let prior_failures = attempts_completed.saturating_sub(1).max(0);

        let (backoff_seconds, is_rate_limited) =
            self.calculate_backoff(pipeline_error, prior_failures, &job.platform_slug);

        let permanent = matches!(pipeline_error.kind, PipelineErrorKind::Permanent)
            || attempts_completed >= self.config.max_attempts;

        let mut error_details = serde_json::json!({
            "message": pipeline_error.to_string(),
            "attempts": attempts_completed,
            "timestamp": now.to_rfc3339(),
        });
        error_details["pipeline_error"] = serde_json::to_value(pipeline_error)?;

        let mut active_job: ResponseJobActiveModel = job.clone().into();
        active_job.attempts = Set(attempts_completed);
        active_job.error = Set(Some(error_details));
        active_job.updated_at = Set(now.into());

        if permanent {
            active_job.status = Set("failed".to_string());
            active_job.finished_at = Set(Some(now.into()));
            active_job.update(&*self.db).await?;

            warn!(
                "Job {} failed permanently after {} attempts: {}",
                job.id, attempts_completed, pipeline_error
            );
            let metric_labels = vec![("platform", job.platform_slug.clone())];
            counter!("response_jobs_failed_total", &metric_labels).increment(1);
            return Ok(());
        }

        let retry_after = now + chrono::Duration::seconds(backoff_seconds as i64);
        active_job.status = Set("queued".to_string());
        active_job.retry_after = Set(Some(retry_after.into()));
        active_job.update(&*self.db).await?;

        if is_rate_limited {
            let metric_labels = vec![("platform", job.platform_slug.clone())];
            counter!("rate_limited_total", &metric_labels).increment(1);
            histogram!("rate_limited_backoff_seconds", &metric_labels).record(backoff_seconds);

            warn!(
                "Job {} rate limited (attempt {}), retrying after {:.1}s: {}",
                job.id, attempts_completed, backoff_seconds, pipeline_error
            );
        } else {
            warn!(
                "Job {} failed (attempt {}), retrying after {:.1}s: {}",
                job.id, attempts_completed, backoff_seconds, pipeline_error
            );
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct JobStats {
    inbound_recorded: u64,
    replies_sent: u64,
    auto_dms_sent: u64,
}

impl Clone for ResponseExecutor {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            registry: self.registry.clone(),
            classifier: self.classifier.clone(),
            dispatcher: self.dispatcher.clone(),
            conversations: self.conversations.clone(),
            messages: self.messages.clone(),
            personas: self.personas.clone(),
            persona_cache: self.persona_cache.clone(),
            crypto_key: self.crypto_key.clone(),
            config: self.config.clone(),
            rate_limit_policy: self.rate_limit_policy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiGatewayClient;
    use crate::config::{AiGatewayConfig, RateLimitPlatformOverride};
    use std::collections::BTreeMap;

    fn create_test_rate_limit_policy() -> RateLimitPolicyConfig {
        RateLimitPolicyConfig {
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.1,
            platform_overrides: BTreeMap::new(),
        }
    }

    async fn create_test_executor(policy: RateLimitPolicyConfig) -> ResponseExecutor {
        let db = sea_orm::Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        let ai = Arc::new(AiGatewayClient::new(&AiGatewayConfig::default()).unwrap());
        ResponseExecutor::new(
            Arc::new(db),
            Arc::new(AdapterRegistry::new()),
            Classifier::new(ai, 12),
            Arc::new(PersonaCache::new(Duration::from_secs(60))),
            CryptoKey::new(vec![0u8; 32]).unwrap(),
            ExecutorConfig::default(),
            policy,
        )
    }

    #[tokio::test]
    async fn test_calculate_backoff_default_policy() {
        let executor = create_test_executor(create_test_rate_limit_policy()).await;
        let pipeline_error = PipelineError::rate_limited(None);

        let (backoff1, is_rate_limited) =
            executor.calculate_backoff(&pipeline_error, 0, "instagram");
        assert!(is_rate_limited);
        assert!(backoff1 >= 5.0 && backoff1 <= 5.5); // base * 2^0, jitter 0-0.5

        let (backoff2, _) = executor.calculate_backoff(&pipeline_error, 1, "instagram");
        assert!(backoff2 >= 10.0 && backoff2 <= 11.0);

        let (backoff3, _) = executor.calculate_backoff(&pipeline_error, 2, "instagram");
        assert!(backoff3 >= 20.0 && backoff3 <= 22.0);
    }

    #[tokio::test]
    async fn test_calculate_backoff_with_platform_override() {
        let mut platform_overrides = BTreeMap::new();
        platform_overrides.insert(
            "instagram".to_string(),
            RateLimitPlatformOverride {
                base_seconds: Some(10),
                max_seconds: Some(1800),
                jitter_factor: Some(0.2),
            },
        );

        let policy = RateLimitPolicyConfig {
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.1,
            platform_overrides,
        };

        let executor = create_test_executor(policy).await;
        let pipeline_error = PipelineError::rate_limited(None);

        let (backoff, _) = executor.calculate_backoff(&pipeline_error, 0, "instagram");
        assert!(backoff >= 10.0 && backoff <= 12.0); // override base = 10

        let (backoff, _) = executor.calculate_backoff(&pipeline_error, 0, "tiktok");
        assert!(backoff >= 5.0 && backoff <= 5.5); // default base = 5
    }

    #[tokio::test]
    async fn test_calculate_backoff_retry_after_precedence() {
        let executor = create_test_executor(create_test_rate_limit_policy()).await;

        // retry_after wins when larger than the computed backoff
        let pipeline_error = PipelineError::rate_limited(Some(300));
        let (backoff, _) = executor.calculate_backoff(&pipeline_error, 0, "instagram");
        assert!(backoff >= 300.0 && backoff <= 330.0);

        // computed backoff wins when larger than retry_after
        let pipeline_error = PipelineError::rate_limited(Some(2));
        let (backoff, _) = executor.calculate_backoff(&pipeline_error, 3, "instagram"); // 5*2^3 = 40
        assert!(backoff >= 40.0 && backoff <= 44.0);
    }

    #[tokio::test]
    async fn test_calculate_backoff_max_capping() {
        let executor = create_test_executor(create_test_rate_limit_policy()).await;
        let pipeline_error = PipelineError::rate_limited(None);

        let (backoff, _) = executor.calculate_backoff(&pipeline_error, 10, "instagram");
        assert!(backoff >= 900.0);
        assert!(backoff <= 900.0 + (900.0 * 0.1));
    }

    #[tokio::test]
    async fn test_pipeline_error_creation() {
        let unauthorized = PipelineError::unauthorized("Invalid token");
        assert!(matches!(unauthorized.kind, PipelineErrorKind::Unauthorized));

        let rate_limited = PipelineError::rate_limited(Some(60));
        if let PipelineErrorKind::RateLimited { retry_after_secs } = rate_limited.kind {
            assert_eq!(retry_after_secs, Some(60));
        } else {
            panic!("Expected RateLimited variant");
        }

        let transient = PipelineError::transient("Network error");
        assert!(matches!(transient.kind, PipelineErrorKind::Transient));

        let permanent = PipelineError::permanent("Invalid configuration");
        assert!(matches!(permanent.kind, PipelineErrorKind::Permanent));
    }

    #[tokio::test]
    async fn test_pipeline_error_with_details() {
        let details = serde_json::json!({"status_code": 429, "reset_time": "2025-06-01T00:00:00Z"});
        let error = PipelineError::rate_limited_with_message(Some(60), "API rate limit exceeded")
            .with_details(details.clone());

        assert!(error.details.as_ref().unwrap().get("status_code").is_some());
        if let PipelineErrorKind::RateLimited { retry_after_secs } = error.kind {
            assert_eq!(retry_after_secs, Some(60));
        } else {
            panic!("Expected RateLimited variant");
        }
    }
}
