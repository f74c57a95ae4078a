use serde::{Deserialize, Serialize};

use docembed_core::{DocumentId, JobId, JobStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Optional at the type level so a missing field maps to our own 400.
    pub document_id: Option<String>,
    pub priority: Option<i32>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStateResponse {
    pub document_id: DocumentId,
    pub locked: bool,
}
