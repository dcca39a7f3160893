//! Readers for the semi-structured extraction payload.
//!
//! The payload comes from the reasoning service and has no fixed schema
//! beyond being a JSON object; these modules pull out the PO number and the
//! line items using prioritized key lookups with a text-scan fallback.

pub mod items;
pub mod po;

pub use items::extract_bill_items;
pub use po::extract_po_number;
