use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Clone)]
pub struct CronAuthState {
    pub secret: Arc<str>,
}

/// Rejects requests whose `x-cron-secret` header does not match.
pub async fn cron_secret_middleware(
    State(state): State<CronAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if extract_secret(req.headers()) == Some(&*state.secret) {
        return next.run(req).await;
    }

    tracing::warn!(path = %req.uri().path(), "rejected request with missing or invalid cron secret");
    errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
}

fn extract_secret(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(CRON_SECRET_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}
