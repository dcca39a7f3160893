//! Background worker pool that drains the job queue.

mod pool;

pub use pool::{JobOutcome, WorkerPool};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed")]
    ChannelClosed,
}
