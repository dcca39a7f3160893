//! Reconciliation of bill line items against purchase-order items.
//!
//! A matcher proposes candidate pairings, the engine filters them through
//! confidence thresholds and enforces a one-to-one mapping, and the amount
//! module computes GST-inclusive line totals in decimal arithmetic.

pub mod amount;
pub mod engine;
pub mod matcher;

use thiserror::Error;

use crate::reasoning::ReasoningError;

pub use amount::{compute_amount, total_gst_rate};
pub use engine::{validate_items, MatchedItem, Reconciliation, ReconcileEngine};
pub use matcher::{ItemMatcher, LexicalMatcher, MatchCandidate, ReasoningMatcher};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
}
