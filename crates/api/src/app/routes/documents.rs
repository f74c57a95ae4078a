use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use docembed_core::DocumentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Advisory view of a document's embedding lock.
pub async fn lock_state(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let document_id: DocumentId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    let locked = services.is_locked(document_id).await;
    (
        StatusCode::OK,
        Json(dto::LockStateResponse {
            document_id,
            locked,
        }),
    )
        .into_response()
}
