//! Queue health snapshot over a trailing window.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use docembed_core::JobStatus;

use super::store::{JobStore, JobStoreError};

/// Per-status job counts for jobs created inside the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub complete: u64,
    pub error: u64,
    pub total: u64,
}

pub struct StatsAggregator<S: ?Sized> {
    jobs: Arc<S>,
    window: Duration,
}

impl<S: JobStore + ?Sized> StatsAggregator<S> {
    /// Aggregator over the last 24 hours.
    pub fn new(jobs: Arc<S>) -> Self {
        Self {
            jobs,
            window: Duration::hours(24),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Read-only; `total` is the sum of the four buckets.
    pub async fn snapshot(&self) -> Result<QueueStats, JobStoreError> {
        let since = Utc::now() - self.window;
        let counts = self.jobs.count_jobs_by_status_since(since).await?;
        let get = |s: JobStatus| counts.get(&s).copied().unwrap_or(0);

        let mut stats = QueueStats {
            pending: get(JobStatus::Pending),
            processing: get(JobStatus::Processing),
            complete: get(JobStatus::Complete),
            error: get(JobStatus::Error),
            total: 0,
        };
        stats.total = stats.pending + stats.processing + stats.complete + stats.error;
        Ok(stats)
    }
}
