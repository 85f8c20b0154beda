use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use autoblog_jobs::JobError;

pub fn job_error_to_response(err: JobError) -> axum::response::Response {
    match err {
        JobError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "Job not found"),
        JobError::InvalidState { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_state", err.to_string())
        }
        JobError::ShutDown => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "shutting_down", err.to_string())
        }
        JobError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoblog_jobs::{JobId, JobStatus};

    #[test]
    fn maps_engine_errors_to_status_codes() {
        let id = JobId::new();
        let cases = [
            (JobError::NotFound(id), StatusCode::NOT_FOUND),
            (
                JobError::InvalidState {
                    id,
                    status: JobStatus::Running,
                    action: "delete",
                },
                StatusCode::BAD_REQUEST,
            ),
            (JobError::ShutDown, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(job_error_to_response(err).status(), status);
        }
    }
}
