use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use docembed_core::{DocumentId, JobId};
use docembed_infra::jobs::{Enqueued, JobStoreError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_request", e.body_text());
        }
    };

    let Some(raw_id) = body.document_id.filter(|id| !id.trim().is_empty()) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "documentId is required",
        );
    };
    let document_id: DocumentId = match raw_id.parse() {
        Ok(id) => id,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
    };

    match services
        .enqueue(document_id, body.priority.unwrap_or(0))
        .await
    {
        Ok(Enqueued { job, created: true }) => {
            tracing::info!(job_id = %job.id, document_id = %document_id, "embedding job queued");
            (
                StatusCode::CREATED,
                Json(dto::CreateJobResponse {
                    job_id: job.id,
                    status: job.status,
                    message: "Job added to queue",
                }),
            )
                .into_response()
        }
        Ok(Enqueued { job, created: false }) => (
            StatusCode::OK,
            Json(dto::CreateJobResponse {
                job_id: job.id,
                status: job.status,
                message: "Job already in queue",
            }),
        )
            .into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// Cron trigger: run one dispatch pass.
pub async fn process_jobs(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.dispatch().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    match services.job(job_id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => errors::job_store_error_to_response(JobStoreError::NotFound(job_id)),
        Err(e) => errors::job_store_error_to_response(e),
    }
}
