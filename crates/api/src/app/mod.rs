//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/provider selection and the shared queue components
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig, services: AppServices) -> Router {
    let cron_state = middleware::CronAuthState {
        secret: Arc::from(config.cron_secret.as_str()),
    };

    // Trigger endpoint: requires the shared cron secret.
    let protected = Router::new()
        .route("/jobs/process", post(routes::jobs::process_jobs))
        .layer(axum::middleware::from_fn_with_state(
            cron_state,
            middleware::cron_secret_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
