use axum::Router;

pub mod jobs;
pub mod system;

/// Router for every engine endpoint except `/health`.
pub fn router() -> Router {
    Router::new().merge(jobs::router())
}
