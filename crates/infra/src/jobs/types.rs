//! Core job types and transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docembed_core::{DocumentId, JobId, JobStatus};

/// Default retry ceiling for new jobs.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// An embedding job: "embed every un-embedded chunk of one document".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Document whose chunks get embedded
    pub document_id: DocumentId,
    /// Current status
    pub status: JobStatus,
    /// Lower values are dispatched first
    pub priority: i32,
    /// Failed attempts so far; never exceeds `max_retries`
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt
    pub started_at: Option<DateTime<Utc>>,
    /// Set once the job reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Reason of the last failed attempt
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(document_id: DocumentId, priority: i32, max_retries: u32) -> Self {
        Self {
            id: JobId::new(),
            document_id,
            status: JobStatus::Pending,
            priority,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Override the creation timestamp (imports, tests).
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Check if another attempt is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Field changes recording a failed attempt.
    ///
    /// Requeues with `retry_count + 1` while retries remain, otherwise moves the
    /// job to terminal `error`.
    pub fn failure_update(&self, error: impl Into<String>, now: DateTime<Utc>) -> JobUpdate {
        let error = error.into();
        if self.can_retry() {
            JobUpdate::requeue(self.retry_count + 1, error)
        } else {
            JobUpdate::failed(error, now)
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(count) = update.retry_count {
            self.retry_count = count.min(self.max_retries);
        }
        if let Some(error) = &update.error_message {
            self.error_message = Some(error.clone());
        }
    }
}

/// Partial update of a job row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// `pending -> processing`.
    pub fn processing(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            started_at: Some(now),
            ..Default::default()
        }
    }

    /// `processing -> complete`.
    pub fn complete(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Complete),
            completed_at: Some(now),
            ..Default::default()
        }
    }

    /// `processing -> pending`, picked up again by a later dispatch.
    pub fn requeue(retry_count: u32, error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Pending),
            retry_count: Some(retry_count),
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    /// `processing -> error`, retries exhausted.
    pub fn failed(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            completed_at: Some(now),
            error_message: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Result of an enqueue request.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub job: Job,
    /// `false` when an active job for the document already existed.
    pub created: bool,
}
