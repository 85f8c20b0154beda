//! Job submission, inspection and lifecycle endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde_json::{Value, json};

use autoblog_jobs::{JobError, JobId, JobOrchestrator};

use crate::app::dto::{
    self, CleanupRequest, JobActionQuery, ListJobsQuery, LogsQuery, SubmitJobRequest,
};
use crate::app::errors;

type Engine = Extension<Arc<JobOrchestrator>>;
type ApiResult = Result<Json<Value>, Response>;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route(
            "/jobs",
            get(list_jobs).post(submit_or_retry).delete(cancel_or_delete),
        )
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/logs", get(job_logs))
        .route("/jobs/cleanup", post(cleanup_jobs))
        .route("/jobs/:id", get(get_job))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /jobs
/// POST /jobs?id=<id>&action=retry
///
/// Any non-blank type is accepted; one without a pipeline is recorded and
/// then fails, so it still shows up in the job history.
pub async fn submit_or_retry(
    Extension(engine): Engine,
    Query(query): Query<JobActionQuery>,
    body: Bytes,
) -> ApiResult {
    if let (Some(id), Some("retry")) = (query.id.as_deref(), query.action.as_deref()) {
        return retry_job(&engine, id);
    }

    let req: SubmitJobRequest = dto::parse_body(&body)?;
    let job_type = req.job_type.filter(|t| !t.trim().is_empty());
    let (Some(job_type), Some(data)) = (job_type, req.data.filter(|d| !d.is_null())) else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Type and data are required",
        ));
    };
    let job_type = dto::parse_job_type(&job_type)?;

    let job = engine
        .submit(job_type, data, req.max_retries)
        .map_err(errors::job_error_to_response)?;

    Ok(Json(json!({ "success": true, "job": job })))
}

fn retry_job(engine: &JobOrchestrator, id: &str) -> ApiResult {
    let id = dto::parse_job_id(id)?;
    let job = engine.retry(id).map_err(|err| match err {
        JobError::InvalidState { .. } => errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "Only failed jobs can be retried",
        ),
        other => errors::job_error_to_response(other),
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Job queued for retry",
        "job": job,
    })))
}

/// GET /jobs?status=&type=&limit=
pub async fn list_jobs(Extension(engine): Engine, Query(query): Query<ListJobsQuery>) -> ApiResult {
    let filter = query.into_filter()?;
    Ok(Json(json!({ "jobs": engine.query(&filter) })))
}

/// GET /jobs/:id
pub async fn get_job(Extension(engine): Engine, Path(id): Path<String>) -> ApiResult {
    let job = engine
        .get(dto::parse_job_id(&id)?)
        .map_err(errors::job_error_to_response)?;
    Ok(Json(json!({ "job": job })))
}

/// GET /jobs/stats
pub async fn job_stats(Extension(engine): Engine) -> Json<Value> {
    Json(json!({
        "stats": engine.stats(),
        "pool": engine.pool_stats(),
    }))
}

/// GET /jobs/logs?jobId=<id>
pub async fn job_logs(Extension(engine): Engine, Query(query): Query<LogsQuery>) -> ApiResult {
    let Some(id) = query.job_id.filter(|s| !s.is_empty()) else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Job ID is required",
        ));
    };
    let logs = engine
        .logs(dto::parse_job_id(&id)?)
        .map_err(errors::job_error_to_response)?;
    Ok(Json(json!({ "logs": logs })))
}

/// DELETE /jobs?id=<id>
/// DELETE /jobs?id=<id>&action=delete
pub async fn cancel_or_delete(
    Extension(engine): Engine,
    Query(query): Query<JobActionQuery>,
) -> ApiResult {
    let Some(id) = query.id.filter(|s| !s.is_empty()) else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Job ID is required",
        ));
    };

    if query.action.as_deref() == Some("delete") {
        let id = dto::parse_job_id(&id)?;
        return match engine.delete(id).map_err(errors::job_error_to_response)? {
            true => Ok(Json(json!({
                "success": true,
                "message": "Job deleted successfully",
            }))),
            false => Err(errors::job_error_to_response(JobError::NotFound(id))),
        };
    }

    let cancelled = id.parse::<JobId>().is_ok_and(|id| engine.cancel(id));
    if !cancelled {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "Job not found or cannot be cancelled",
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Job cancelled successfully",
    })))
}

/// POST /jobs/cleanup
///
/// `daysToKeep` absent or zero falls back to the configured retention window.
pub async fn cleanup_jobs(Extension(engine): Engine, body: Bytes) -> ApiResult {
    let req: CleanupRequest = dto::parse_body(&body)?;
    let days = req
        .days_to_keep
        .filter(|d| *d > 0)
        .unwrap_or(engine.config().retention_days);

    let deleted = engine.cleanup(days);
    Ok(Json(json!({
        "success": true,
        "deleted": deleted,
        "message": format!("Cleaned up {deleted} old jobs"),
    })))
}
