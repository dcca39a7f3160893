pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod extract;
pub mod intake;
pub mod logging;
pub mod model;
pub mod oms;
pub mod pages;
pub mod pipeline;
pub mod reasoning;
pub mod reconcile;
pub mod retry;
pub mod sanitize;
pub mod storage;
pub mod worker;

pub use config::{load_config, AppConfig, ConfigError, IntakeConfig, MatchConfig, ReasoningConfig};
pub use db::Database;
pub use draft::{DraftError, DraftSession, DraftWorkflow};
pub use error::{BillflowError, Result};
pub use intake::{submit, IntakeError, SubmitReceipt};
pub use model::{
    BillItem, DocStatus, DocType, GstType, ItemInput, JobStatus, OcrPayload, OrderItem,
    OrderSnapshot,
};
pub use oms::{HttpOrderService, OmsError, OrderService};
pub use pipeline::{JobPipeline, PipelineError};
pub use reasoning::{HttpReasoningClient, ReasoningClient, ReasoningError};
pub use reconcile::{
    ItemMatcher, LexicalMatcher, ReasoningMatcher, Reconciliation, ReconcileEngine,
};
pub use storage::{FileStorage, StorageError, StorageGateway};
pub use worker::{JobOutcome, WorkerError, WorkerPool};
