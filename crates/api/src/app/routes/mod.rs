use axum::{
    routing::{get, post},
    Router,
};

pub mod documents;
pub mod jobs;
pub mod system;

/// Router for the public queue endpoints (the trigger is wired separately).
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/create", post(jobs::create_job))
        .route("/jobs/stats", get(jobs::job_stats))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/documents/:id/lock", get(documents::lock_state))
}
