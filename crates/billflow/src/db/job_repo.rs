//! Job repository: rows and guarded state transitions for `job_threads`.
//!
//! The lifecycle is monotonic: `in_queue -> processing -> {processed | error}`,
//! with an explicit external `retry` as the only path out of `error`. Every
//! transition is a guarded UPDATE whose affected-row count decides whether the
//! transition actually happened, so concurrent workers cannot both claim the
//! same job.

use rusqlite::{params, Row};
use thiserror::Error;

use super::{Database, DatabaseError};
use crate::model::JobStatus;

/// A job thread row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub original_size: i64,
    pub status: JobStatus,
    pub storage_uri: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub failed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_raw: String = row.get("status")?;
        let status = JobStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown job status '{status_raw}'").into(),
            )
        })?;
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            file_name: row.get("file_name")?,
            original_size: row.get("original_size")?,
            status,
            storage_uri: row.get("storage_uri")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            failed_at: row.get("failed_at")?,
        })
    }
}

/// A guarded transition did not apply.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Job '{id}' not found")]
    NotFound { id: String },

    #[error("Invalid transition for job '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_threads (id, user_id, file_name, original_size, status, storage_uri,
             error_message, created_at, updated_at, started_at, completed_at, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id,
                job.user_id,
                job.file_name,
                job.original_size,
                job.status.as_str(),
                job.storage_uri,
                job.error_message,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.failed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM job_threads WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a job by ID scoped to a user.
pub fn find_for_user(
    db: &Database,
    id: &str,
    user_id: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM job_threads WHERE id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![id, user_id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists a user's jobs, newest first.
pub fn list_for_user(db: &Database, user_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job_threads WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![user_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM job_threads WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Atomically claims an `in_queue` job for processing.
///
/// The guarded UPDATE is the concurrency control: if another worker claimed
/// the job first (or it is already terminal), zero rows are affected and an
/// `InvalidTransition` is returned without side effects.
pub fn claim(db: &Database, id: &str, now: &str) -> Result<JobRow, TransitionError> {
    transition(
        db,
        id,
        JobStatus::InQueue,
        JobStatus::Processing,
        "UPDATE job_threads SET status = ?2, started_at = ?3, updated_at = ?3
         WHERE id = ?1 AND status = ?4",
        now,
    )?;
    find_by_id(db, id)?.ok_or_else(|| TransitionError::NotFound { id: id.to_string() })
}

/// Marks a `processing` job as `processed`.
///
/// `note` carries a summary of contained per-page errors; the job still
/// completes successfully when individual pages failed classification.
pub fn complete(
    db: &Database,
    id: &str,
    now: &str,
    note: Option<&str>,
) -> Result<(), TransitionError> {
    let affected = db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE job_threads SET status = ?2, completed_at = ?3, updated_at = ?3,
             error_message = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id,
                JobStatus::Processed.as_str(),
                now,
                note,
                JobStatus::Processing.as_str()
            ],
        )?;
        Ok(affected)
    })?;
    ensure_applied(db, id, affected, JobStatus::Processed)
}

/// Marks a `processing` job as `error` with a (redacted) reason.
pub fn fail(db: &Database, id: &str, reason: &str, now: &str) -> Result<(), TransitionError> {
    let affected = db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE job_threads SET status = ?2, error_message = ?3, failed_at = ?4,
             updated_at = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id,
                JobStatus::Error.as_str(),
                reason,
                now,
                JobStatus::Processing.as_str()
            ],
        )?;
        Ok(affected)
    })?;
    ensure_applied(db, id, affected, JobStatus::Error)
}

/// Re-queues an `error` job. This is the only path out of a terminal state
/// and is an explicit administrative operation, never automatic.
pub fn retry(db: &Database, id: &str, now: &str) -> Result<(), TransitionError> {
    transition(
        db,
        id,
        JobStatus::Error,
        JobStatus::InQueue,
        "UPDATE job_threads SET status = ?2, updated_at = ?3, error_message = NULL,
         started_at = NULL, completed_at = NULL, failed_at = NULL
         WHERE id = ?1 AND status = ?4",
        now,
    )
}

fn transition(
    db: &Database,
    id: &str,
    from: JobStatus,
    to: JobStatus,
    sql: &str,
    now: &str,
) -> Result<(), TransitionError> {
    let affected = db.with_conn(|conn| {
        let affected = conn.execute(sql, params![id, to.as_str(), now, from.as_str()])?;
        Ok(affected)
    })?;
    ensure_applied(db, id, affected, to)
}

/// Maps an unapplied guarded UPDATE to the right error: missing row or a
/// row in a state the transition does not accept.
fn ensure_applied(
    db: &Database,
    id: &str,
    affected: usize,
    to: JobStatus,
) -> Result<(), TransitionError> {
    if affected == 1 {
        return Ok(());
    }
    match find_by_id(db, id)? {
        None => Err(TransitionError::NotFound { id: id.to_string() }),
        Some(row) => Err(TransitionError::InvalidTransition {
            id: id.to_string(),
            from: row.status,
            to,
        }),
    }
}
