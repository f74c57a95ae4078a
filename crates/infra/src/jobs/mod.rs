//! Embedding job queue.
//!
//! ## Components
//!
//! - `JobStore`: durable job rows (in-memory or Postgres)
//! - `LockManager`: per-document exclusion via `embedding_status`
//! - `JobProcessor`: one job end to end, including retry bookkeeping
//! - `Dispatcher`: bounded sequential pass over eligible jobs
//! - `StatsAggregator`: per-status counts over a trailing window

pub mod dispatcher;
pub mod lock;
pub mod postgres;
pub mod processor;
pub mod stats;
pub mod store;
pub mod types;

pub use dispatcher::{
    DispatchReport, DispatchRunnerHandle, Dispatcher, RunnerStats, DEFAULT_DISPATCH_BATCH_SIZE,
};
pub use lock::{LockError, LockManager};
pub use postgres::PostgresJobStore;
pub use processor::{DocumentReport, JobOutcome, JobProcessor, ProcessError};
pub use stats::{QueueStats, StatsAggregator};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{Enqueued, Job, JobUpdate, DEFAULT_MAX_RETRIES};
