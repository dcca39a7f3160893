//! Errors for the billflow SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the `Database` handle and the repositories.
///
/// Guarded job-status transitions report their own `TransitionError`
/// instead; everything here is infrastructure.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Underlying SQLite failure, from single statements or a `with_tx`
    /// transaction body.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not create the database file's parent directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema migration did not apply cleanly.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A thread panicked while holding the connection lock.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
