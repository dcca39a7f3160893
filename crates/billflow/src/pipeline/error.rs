use thiserror::Error;

use crate::db::job_repo::TransitionError;
use crate::db::DatabaseError;
use crate::pages::PageError;
use crate::reasoning::ReasoningError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error("Failed to serialize document payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job '{id}' has no stored upload")]
    MissingStorageUri { id: String },
}
