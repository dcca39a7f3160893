//! Upload intake: validation, blob storage, and job enqueueing.
//!
//! Validation runs entirely before any byte is written, so a rejected
//! upload leaves no trace in storage or the database.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::db::{job_repo, Database, DatabaseError};
use crate::model::JobStatus;
use crate::sanitize;
use crate::storage::{StorageError, StorageGateway};

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Upload rejected: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What the caller gets back for an accepted upload.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: JobStatus,
}

/// Accepts an upload: validates it, stores the blob, and enqueues a job.
pub fn submit(
    db: &Database,
    storage: &Arc<dyn StorageGateway>,
    config: &IntakeConfig,
    user_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<SubmitReceipt, IntakeError> {
    let _span = tracing::info_span!("intake.submit", user_id).entered();

    validate(config, file_name, bytes)?;

    let job_id = Uuid::new_v4().to_string();
    let storage_uri = storage.store_upload(&job_id, file_name, bytes)?;

    let now = chrono::Utc::now().to_rfc3339();
    job_repo::insert(
        db,
        &job_repo::JobRow {
            id: job_id.clone(),
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            original_size: bytes.len() as i64,
            status: JobStatus::InQueue,
            storage_uri: Some(storage_uri),
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
        },
    )?;

    tracing::info!(
        job_id = %job_id,
        file = %sanitize::redact_path(std::path::Path::new(file_name)),
        size = bytes.len(),
        "upload accepted"
    );
    Ok(SubmitReceipt {
        job_id,
        status: JobStatus::InQueue,
    })
}

fn validate(config: &IntakeConfig, file_name: &str, bytes: &[u8]) -> Result<(), IntakeError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| IntakeError::Validation("file has no extension".to_string()))?;

    if !config
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
        return Err(IntakeError::Validation(format!(
            "file type '.{extension}' is not supported"
        )));
    }

    if bytes.is_empty() {
        return Err(IntakeError::Validation("file is empty".to_string()));
    }

    if bytes.len() as u64 > config.max_upload_bytes {
        return Err(IntakeError::Validation(format!(
            "file exceeds the {} byte limit",
            config.max_upload_bytes
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;

    fn setup() -> (Database, Arc<dyn StorageGateway>, tempfile::TempDir) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageGateway> = Arc::new(FileStorage::new(dir.path()));
        (db, storage, dir)
    }

    #[test]
    fn test_submit_enqueues_job() {
        let (db, storage, _dir) = setup();
        let receipt = submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "invoice.pdf",
            b"%PDF-1.4 fake",
        )
        .unwrap();

        assert_eq!(receipt.status, JobStatus::InQueue);
        let job = job_repo::find_by_id(&db, &receipt.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::InQueue);
        assert_eq!(job.file_name, "invoice.pdf");
        assert_eq!(job.original_size, 13);

        // Upload is fetchable through the stored URI.
        let uri = job.storage_uri.unwrap();
        assert_eq!(storage.fetch(&uri).unwrap(), b"%PDF-1.4 fake");
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let (db, storage, _dir) = setup();
        let result = submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "notes.txt",
            b"hello",
        );
        assert!(matches!(result, Err(IntakeError::Validation(_))));
    }

    #[test]
    fn test_rejects_missing_extension() {
        let (db, storage, _dir) = setup();
        let result = submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "invoice",
            b"data",
        );
        assert!(matches!(result, Err(IntakeError::Validation(_))));
    }

    #[test]
    fn test_rejects_empty_file() {
        let (db, storage, _dir) = setup();
        let result = submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "invoice.pdf",
            b"",
        );
        assert!(matches!(result, Err(IntakeError::Validation(_))));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let (db, storage, _dir) = setup();
        let config = IntakeConfig {
            max_upload_bytes: 4,
            ..IntakeConfig::default()
        };
        let result = submit(&db, &storage, &config, "user-1", "invoice.pdf", b"12345");
        assert!(matches!(result, Err(IntakeError::Validation(_))));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let (db, storage, _dir) = setup();
        let receipt = submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "SCAN.PDF",
            b"%PDF",
        );
        assert!(receipt.is_ok());
    }

    #[test]
    fn test_rejected_upload_writes_nothing() {
        let (db, storage, _dir) = setup();
        submit(
            &db,
            &storage,
            &IntakeConfig::default(),
            "user-1",
            "huge.exe",
            b"MZ",
        )
        .unwrap_err();

        assert_eq!(
            job_repo::count_by_status(&db, JobStatus::InQueue).unwrap(),
            0
        );
    }
}
