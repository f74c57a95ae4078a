//! Queue dispatcher: one bounded, sequential pass over eligible jobs.
//!
//! The dispatcher keeps no state between invocations; eligibility is always
//! re-read from the job store, so overlapping invocations (a retried cron
//! trigger, the in-process runner, a manual call) are safe. The document lock
//! is what keeps two passes off the same document.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::documents::DocumentStore;
use crate::embedding::EmbeddingProvider;

use super::processor::{JobOutcome, JobProcessor};
use super::store::{JobStore, JobStoreError};

/// Jobs taken per invocation unless configured otherwise.
pub const DEFAULT_DISPATCH_BATCH_SIZE: usize = 5;

/// Counters for one dispatch invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Jobs that reached `complete`.
    pub processed: usize,
    /// Jobs that reached terminal `error`, or whose task faulted.
    pub failed: usize,
    /// Jobs requeued for a later invocation.
    pub retried: usize,
    /// Jobs left pending because their document was locked.
    pub skipped: usize,
    pub duration_ms: u64,
}

pub struct Dispatcher<S: ?Sized, D: ?Sized, P: ?Sized> {
    jobs: Arc<S>,
    processor: Arc<JobProcessor<S, D, P>>,
    batch_size: usize,
}

impl<S: ?Sized, D: ?Sized, P: ?Sized> Clone for Dispatcher<S, D, P> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            processor: self.processor.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl<S, D, P> Dispatcher<S, D, P>
where
    S: JobStore + ?Sized + 'static,
    D: DocumentStore + ?Sized + 'static,
    P: EmbeddingProvider + ?Sized + 'static,
{
    pub fn new(jobs: Arc<S>, processor: Arc<JobProcessor<S, D, P>>) -> Self {
        Self {
            jobs,
            processor,
            batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn processor(&self) -> &Arc<JobProcessor<S, D, P>> {
        &self.processor
    }

    /// Fetch up to `batch_size` eligible jobs and run them one after another.
    ///
    /// Each job runs on its own task, awaited before the next starts, so a
    /// panic inside one job is counted as a failure instead of aborting the
    /// batch. Only the eligibility query itself can fail the invocation.
    pub async fn dispatch(&self) -> Result<DispatchReport, JobStoreError> {
        let started = Instant::now();
        let mut report = DispatchReport::default();

        let jobs = self.jobs.fetch_eligible_jobs(self.batch_size).await?;
        if jobs.is_empty() {
            debug!("no pending jobs");
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        info!(count = jobs.len(), "processing embedding jobs");

        for job in jobs {
            let processor = self.processor.clone();
            let attempt = job.clone();
            let task = tokio::spawn(async move { processor.run(&attempt).await });

            match task.await {
                Ok(JobOutcome::Completed(_)) => report.processed += 1,
                Ok(JobOutcome::Requeued { .. }) => report.retried += 1,
                Ok(JobOutcome::Failed { .. }) => report.failed += 1,
                Ok(JobOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "job task faulted");
                    // The row was left `processing`; put it back on the retry path.
                    self.processor
                        .record_failure(&job, format!("job task faulted: {e}"))
                        .await;
                    report.failed += 1;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = report.processed,
            failed = report.failed,
            retried = report.retried,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "dispatch finished"
        );
        Ok(report)
    }

    /// Run [`Dispatcher::dispatch`] every `interval` on a background task.
    pub fn spawn_interval(self, interval: Duration) -> DispatchRunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(RunnerStats::default()));
        let task_stats = stats.clone();

        let join = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "dispatch runner started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let result = self.dispatch().await;
                        if let Ok(mut s) = task_stats.lock() {
                            s.record(&result);
                        }
                        if let Err(e) = result {
                            warn!(error = %e, "dispatch cycle failed");
                        }
                    }
                }
            }

            info!("dispatch runner stopped");
        });

        DispatchRunnerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

/// Totals accumulated by an interval runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_skipped: u64,
}

impl RunnerStats {
    fn record(&mut self, result: &Result<DispatchReport, JobStoreError>) {
        self.cycles += 1;
        match result {
            Ok(r) => {
                self.jobs_processed += r.processed as u64;
                self.jobs_failed += r.failed as u64;
                self.jobs_retried += r.retried as u64;
                self.jobs_skipped += r.skipped as u64;
            }
            Err(_) => self.failed_cycles += 1,
        }
    }
}

/// Handle to control a running interval dispatcher.
#[derive(Debug)]
pub struct DispatchRunnerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<RunnerStats>>,
}

impl DispatchRunnerHandle {
    /// Stop after the in-flight cycle (if any), wait for the task and return
    /// the final totals.
    pub async fn shutdown(self) -> RunnerStats {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "dispatch runner task faulted");
        }
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stats(&self) -> RunnerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
