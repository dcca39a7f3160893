//! Blob storage for uploads and per-page derivatives.
//!
//! Consumers address blobs by opaque relative URIs; only the gateway knows
//! the physical layout. URIs are deterministic per `(job, page)`, so a
//! re-run of the same job overwrites its page blobs instead of accumulating
//! copies.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::sanitize;

mod filesystem;

pub use filesystem::FileStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write blob '{uri}': {source}")]
    WriteBlob {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read blob '{uri}': {source}")]
    ReadBlob {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),
}

/// Storage seam between the pipeline and the blob store.
pub trait StorageGateway: Send + Sync {
    /// Stores an original upload for a job. Returns the blob's URI.
    fn store_upload(&self, job_id: &str, file_name: &str, bytes: &[u8])
        -> Result<String, StorageError>;

    /// Stores one page blob for a job at a deterministic URI. Re-running
    /// the same page replaces the previous blob.
    fn store_page(
        &self,
        job_id: &str,
        page_number: u32,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    /// Fetches a blob by the URI a `store_*` call returned.
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, StorageError>;
}

/// Rejects URIs that could escape the storage root.
pub(crate) fn validate_uri(uri: &str) -> Result<&Path, StorageError> {
    let path = Path::new(uri);
    let safe = !uri.is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        // The URI may embed user-controlled path parts; log only the tail.
        return Err(StorageError::InvalidUri(sanitize::redact_path(path)));
    }
    Ok(path)
}
