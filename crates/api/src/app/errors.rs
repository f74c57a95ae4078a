use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use docembed_infra::jobs::JobStoreError;

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        JobStoreError::AlreadyExists(id) => {
            json_error(StatusCode::CONFLICT, "conflict", format!("job {id} already exists"))
        }
        JobStoreError::Storage(msg) => {
            tracing::error!(error = %msg, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
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
