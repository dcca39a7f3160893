//! The processing pipeline: claim a queued job, split its upload into
//! pages, classify and extract each page, and record the terminal status.
//!
//! Per-page failures of the soft kind (unknown classification, unusable
//! extraction output) are contained: the page is recorded as unknown and
//! the job still completes, carrying a summary note. Infrastructure
//! failures are fatal and move the job to `error`.

mod error;
mod processor;
mod runner;

pub use error::PipelineError;
pub use processor::{PageOutcome, PageProcessor};
pub use runner::JobPipeline;
