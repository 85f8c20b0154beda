//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: engine wiring (store, collaborators, orchestrator, sweeper)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use autoblog_jobs::JobOrchestrator;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(orchestrator: Arc<JobOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::log_requests))
                .layer(Extension(orchestrator)),
        )
}
