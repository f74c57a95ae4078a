//! Postgres-backed job store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (unique violation on insert) | `23505` | `AlreadyExists` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{instrument, Span};

use docembed_core::{DocumentId, JobId, JobStatus};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobUpdate};

const JOB_COLUMNS: &str = "id, document_id, status, priority, retry_count, max_retries, \
                           created_at, started_at, completed_at, error_message";

/// Postgres-backed job store over the `embedding_jobs` table.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, document_id = %job.document_id), err)]
    async fn insert_job(&self, job: Job) -> Result<Job, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO embedding_jobs
                (id, document_id, status, priority, retry_count, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.document_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.retry_count as i32)
        .bind(job.max_retries as i32)
        .bind(job.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("insert_job", e)
            }
        })?;

        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM embedding_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(document_id = %document_id), err)]
    async fn find_active_job(&self, document_id: DocumentId) -> Result<Option<Job>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM embedding_jobs \
             WHERE document_id = $1 AND status IN ('pending', 'processing') \
             ORDER BY created_at ASC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(document_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_active_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(job_count = tracing::field::Empty), err)]
    async fn fetch_eligible_jobs(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM embedding_jobs \
             WHERE status = 'pending' \
             ORDER BY priority ASC, created_at ASC, id ASC \
             LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_eligible_jobs", e))?;

        Span::current().record("job_count", rows.len());
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self, update), fields(job_id = %job_id), err)]
    async fn update_job(&self, job_id: JobId, update: JobUpdate) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = COALESCE($2::text, status),
                started_at = COALESCE($3, started_at),
                completed_at = COALESCE($4, completed_at),
                retry_count = COALESCE(LEAST($5::int, max_retries), retry_count),
                error_message = COALESCE($6::text, error_message)
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(update.retry_count.map(|c| c as i32))
        .bind(update.error_message.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    async fn count_jobs_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<JobStatus, u64>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM embedding_jobs
            WHERE created_at >= $1
            GROUP BY status
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_jobs_by_status_since", e))?;

        let mut counts = HashMap::new();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| map_sqlx_error("count_jobs_by_status_since", e))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| map_sqlx_error("count_jobs_by_status_since", e))?;
            let status = parse_status(&status)?;
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, JobStoreError> {
    raw.parse::<JobStatus>()
        .map_err(|e| JobStoreError::Storage(e.to_string()))
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let read = |e: sqlx::Error| JobStoreError::Storage(format!("failed to read job row: {}", e));

    let status: String = row.try_get("status").map_err(read)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(read)?;
    let max_retries: i32 = row.try_get("max_retries").map_err(read)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(read)?),
        document_id: DocumentId::from_uuid(row.try_get("document_id").map_err(read)?),
        status: parse_status(&status)?,
        priority: row.try_get("priority").map_err(read)?,
        retry_count: retry_count.max(0) as u32,
        max_retries: max_retries.max(0) as u32,
        created_at: row.try_get("created_at").map_err(read)?,
        started_at: row.try_get("started_at").map_err(read)?,
        completed_at: row.try_get("completed_at").map_err(read)?,
        error_message: row.try_get("error_message").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
