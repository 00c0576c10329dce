//! # Response Job Handlers
//!
//! Introspection and manual retry of the durable poll jobs.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AccountExtension, OperatorAuth};
use crate::error::ApiError;
use crate::repositories::ResponseJobRepository;
use crate::server::AppState;

/// Query parameters for the jobs listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListJobsQuery {
    /// Optional status filter: queued | running | succeeded | failed
    pub status: Option<String>,
    /// Maximum number of jobs to return (default: 50, max: 200)
    pub limit: Option<i64>,
}

/// Response job information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub platform: String,
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub scheduled_at: String,
    pub retry_after: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub error: Option<serde_json::Value>,
}

impl From<crate::models::response_job::Model> for JobInfo {
    fn from(model: crate::models::response_job::Model) -> Self {
        let to_rfc3339 =
            |dt: &sea_orm::prelude::DateTimeWithTimeZone| dt.with_timezone(&Utc).to_rfc3339();
        Self {
            id: model.id,
            platform: model.platform_slug,
            connection_id: model.connection_id,
            status: model.status,
            attempts: model.attempts,
            scheduled_at: to_rfc3339(&model.scheduled_at),
            retry_after: model.retry_after.as_ref().map(to_rfc3339),
            started_at: model.started_at.as_ref().map(to_rfc3339),
            finished_at: model.finished_at.as_ref().map(to_rfc3339),
            error: model.error,
        }
    }
}

/// Response wrapper for the jobs listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobInfo>,
}

const VALID_STATUSES: &[&str] = &["queued", "running", "succeeded", "failed"];

/// Lists response jobs for the authenticated account
#[utoipa::path(
    get,
    path = "/jobs",
    security(("bearer_auth" = [])),
    params(crate::auth::AccountHeader, ListJobsQuery),
    responses(
        (status = 200, description = "Response jobs, newest first", body = JobsResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "limit must be between 1 and 200",
        ));
    }

    if let Some(status) = &query.status
        && !VALID_STATUSES.contains(&status.as_str())
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "status must be one of queued, running, succeeded, failed",
        ));
    }

    let repo = ResponseJobRepository::new(Arc::new(state.db.clone()));
    let jobs = repo
        .list_by_account(&account.0, query.status.as_deref(), limit as u64)
        .await?;

    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    }))
}

/// Requeue a permanently failed job
#[utoipa::path(
    post,
    path = "/jobs/{id}/retry",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job requeued", body = JobInfo),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job is not in a retryable state", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn retry_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    AccountExtension(account): AccountExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<JobInfo>, ApiError> {
    let repo = ResponseJobRepository::new(Arc::new(state.db.clone()));

    let existing = repo.find_by_id(&account.0, &id).await?.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Response job not found")
    })?;

    if existing.status != "failed" {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!("Job is {} and cannot be retried", existing.status),
        ));
    }

    let requeued = repo.requeue(&account.0, &id).await?;
    Ok(Json(JobInfo::from(requeued)))
}
