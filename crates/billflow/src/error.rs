use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Intake error: {0}")]
    Intake(#[from] crate::intake::IntakeError),

    #[error("Page error: {0}")]
    Page(#[from] crate::pages::PageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Order service error: {0}")]
    Oms(#[from] crate::oms::OmsError),

    #[error("Reasoning service error: {0}")]
    Reasoning(#[from] crate::reasoning::ReasoningError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] crate::reconcile::ReconcileError),

    #[error("Draft error: {0}")]
    Draft(#[from] crate::draft::DraftError),

    #[error("Worker error: {0}")]
    Worker(#[from] crate::worker::WorkerError),
}

pub type Result<T> = std::result::Result<T, BillflowError>;
