//! Filesystem-backed blob storage.
//!
//! Layout under the root:
//!   `jobs/<job_id>/<file_name>`            the original upload
//!   `jobs/<job_id>/pages/page_<n>.<ext>`   per-page derivatives

use std::io::Write;
use std::path::{Path, PathBuf};

use super::{validate_uri, StorageError, StorageGateway};

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Writes to a sibling temp file and renames over the target, so a
    /// half-written blob is never visible under the final URI.
    fn write_blob(&self, uri: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let relative = validate_uri(uri)?;
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        let io_err = |e: std::io::Error| StorageError::WriteBlob {
            uri: uri.to_string(),
            source: e,
        };

        let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        std::fs::rename(&tmp_path, &path).map_err(io_err)?;
        Ok(())
    }
}

impl StorageGateway for FileStorage {
    fn store_upload(
        &self,
        job_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let uri = format!("jobs/{}/{}", job_id, file_name);
        self.write_blob(&uri, bytes)?;
        Ok(uri)
    }

    fn store_page(
        &self,
        job_id: &str,
        page_number: u32,
        extension: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let uri = format!("jobs/{}/pages/page_{}.{}", job_id, page_number, extension);
        self.write_blob(&uri, bytes)?;
        Ok(uri)
    }

    fn fetch(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let relative = validate_uri(uri)?;
        let path = self.root.join(relative);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(uri.to_string()))
            }
            Err(e) => Err(StorageError::ReadBlob {
                uri: uri.to_string(),
                source: e,
            }),
        }
    }
}
