use std::fmt;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const JOB_SUMMARIZE_DOCUMENT: &str = "summarize-document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

fn summarize_payload(document_id: Uuid) -> Value {
    json!({ "document_id": document_id })
}

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> QueryResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: JobStatus::Queued.as_str().to_string(),
        run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
    };

    diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)
}

/// Queues a summary run for `document_id`. Callers that insert the document
/// in the same transaction get both rows or neither.
pub fn enqueue_summarize_document(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<Job> {
    enqueue_job(
        conn,
        JOB_SUMMARIZE_DOCUMENT,
        summarize_payload(document_id),
        None,
    )
}

/// Whether a summarize job for `document_id` is still waiting or running.
pub fn has_open_summarize_job(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<bool> {
    let open: i64 = jobs::table
        .filter(jobs::job_type.eq(JOB_SUMMARIZE_DOCUMENT))
        .filter(jobs::status.eq_any([JobStatus::Queued.as_str(), JobStatus::Processing.as_str()]))
        .filter(jobs::payload.eq(summarize_payload(document_id)))
        .count()
        .get_result(conn)?;
    Ok(open > 0)
}

/// Claims the oldest runnable job of the given types and bumps its attempt
/// counter. Concurrent workers skip rows another transaction has locked.
pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = Utc::now().naive_utc();

    let reserved = conn.transaction(|conn| {
        let candidate = jobs::table
            .select(jobs::id)
            .filter(jobs::status.eq(JobStatus::Queued.as_str()))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Uuid>(conn)
            .optional()?;

        let Some(job_id) = candidate else {
            return Ok::<_, diesel::result::Error>(None);
        };

        diesel::update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(JobStatus::Processing.as_str()),
                jobs::attempts.eq(jobs::attempts + 1),
                jobs::updated_at.eq(now),
            ))
            .get_result::<Job>(conn)
            .map(Some)
    })?;

    Ok(reserved)
}

fn settle_job(
    conn: &mut PgConnection,
    job_id: Uuid,
    status: JobStatus,
    last_error: Option<&str>,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<()> {
    let now = Utc::now().naive_utc();
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(status.as_str()),
            jobs::last_error.eq(last_error),
            jobs::run_after.eq(run_after.unwrap_or(now)),
            jobs::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    settle_job(conn, job_id, JobStatus::Succeeded, None, None)
}

pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    let delay = ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30));
    let next_run = (Utc::now() + delay).naive_utc();
    settle_job(
        conn,
        job_id,
        JobStatus::Queued,
        Some(error_message),
        Some(next_run),
    )
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    settle_job(conn, job_id, JobStatus::Failed, Some(error_message), None)
}

/// Puts jobs left in `processing` by a worker that died back on the queue.
pub fn requeue_stale_jobs(conn: &mut PgConnection, older_than: Duration) -> JobQueueResult<usize> {
    let older_than =
        ChronoDuration::from_std(older_than).unwrap_or_else(|_| ChronoDuration::minutes(15));
    let now = Utc::now().naive_utc();
    let cutoff = now - older_than;

    let requeued = diesel::update(
        jobs::table
            .filter(jobs::status.eq(JobStatus::Processing.as_str()))
            .filter(jobs::updated_at.lt(cutoff)),
    )
    .set((
        jobs::status.eq(JobStatus::Queued.as_str()),
        jobs::run_after.eq(now),
        jobs::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(requeued)
}
