//! Job and document status enums.
//!
//! Both enums persist as lowercase strings (`pending`, `processing`, ...) in
//! the store and on the wire.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle status of an embedding job.
///
/// `pending -> processing -> {complete, error}`, plus `processing -> pending`
/// when a failed attempt is requeued for retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, eligible for dispatch.
    Pending,
    /// Claimed by a dispatcher run.
    Processing,
    /// Finished; the document may still be `partial` or `error`.
    Complete,
    /// Retries exhausted.
    Error,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Complete,
        JobStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    /// Pending and processing jobs block a second enqueue for the same document.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// Embedding status of a document.
///
/// `Processing` doubles as the per-document lock flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Idle,
    Processing,
    Complete,
    Partial,
    Error,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Idle => "idle",
            EmbeddingStatus::Processing => "processing",
            EmbeddingStatus::Complete => "complete",
            EmbeddingStatus::Partial => "partial",
            EmbeddingStatus::Error => "error",
        }
    }

    /// Derive a document's terminal status from a run's failure count.
    pub fn from_counts(failed: usize, total: usize) -> Self {
        if failed == 0 {
            EmbeddingStatus::Complete
        } else if failed >= total {
            EmbeddingStatus::Error
        } else {
            EmbeddingStatus::Partial
        }
    }
}

macro_rules! impl_status_str {
    ($t:ty, $name:literal, [$($variant:ident),+]) => {
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == <$t>::$variant.as_str() {
                        return Ok(<$t>::$variant);
                    }
                )+
                Err(DomainError::unknown_status(format!("{}: {}", $name, s)))
            }
        }
    };
}

impl_status_str!(JobStatus, "JobStatus", [Pending, Processing, Complete, Error]);
impl_status_str!(
    EmbeddingStatus,
    "EmbeddingStatus",
    [Idle, Processing, Complete, Partial, Error]
);
