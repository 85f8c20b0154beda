use axum::body::Bytes;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use autoblog_jobs::{JobFilter, JobId, JobStatus, JobType};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /jobs`. Fields are optional so missing ones map to a 400
/// with a readable message instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub data: Option<serde_json::Value>,
    pub max_retries: Option<u32>,
}

/// `?id=<id>&action=<retry|delete>` on `POST`/`DELETE /jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobActionQuery {
    pub id: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub job_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub days_to_keep: Option<u32>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// Decode an optional JSON body; an empty body yields `T::default()`.
pub fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", format!("invalid JSON body: {e}"))
    })
}

pub fn parse_job_id(s: &str) -> Result<JobId, axum::response::Response> {
    s.parse()
        .map_err(|_| errors::json_error(StatusCode::NOT_FOUND, "not_found", "Job not found"))
}

pub fn parse_job_type(s: &str) -> Result<JobType, axum::response::Response> {
    s.parse()
        .map_err(|e: autoblog_core::DomainError| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_job_type", e.to_string())
        })
}

pub fn parse_job_status(s: &str) -> Result<JobStatus, axum::response::Response> {
    s.parse()
        .map_err(|e: autoblog_core::DomainError| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string())
        })
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, axum::response::Response> {
        let mut filter = JobFilter::all();
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.with_status(parse_job_status(status)?);
        }
        if let Some(job_type) = self.job_type.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.with_type(parse_job_type(job_type)?);
        }
        if let Some(limit) = self.limit.as_deref().filter(|s| !s.is_empty()) {
            let limit = limit.trim().parse().map_err(|_| {
                errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_limit",
                    "limit must be a non-negative integer",
                )
            })?;
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}
