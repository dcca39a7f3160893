//! Core value types shared across the pipeline and the reconciliation engine.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version stamped on every extraction payload envelope.
pub const OCR_PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Lifecycle status of a job thread.
///
/// Transitions are monotonic: `in_queue -> processing -> {processed | error}`.
/// The only way back is an explicit external retry (`error -> in_queue`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InQueue,
    Processing,
    Processed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InQueue => "in_queue",
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_queue" => Some(JobStatus::InQueue),
            "processing" => Some(JobStatus::Processing),
            "processed" => Some(JobStatus::Processed),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    /// Terminal for the pipeline; only an external retry leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified type of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Bill,
    EwayBill,
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Bill => "bill",
            DocType::EwayBill => "eway_bill",
            DocType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bill" => Some(DocType::Bill),
            "eway_bill" => Some(DocType::EwayBill),
            "unknown" => Some(DocType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Draft progress of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    DraftPending,
    DraftCreated,
    Unknown,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::DraftPending => "draft_pending",
            DocStatus::DraftCreated => "draft_created",
            DocStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft_pending" => Some(DocStatus::DraftPending),
            "draft_created" => Some(DocStatus::DraftCreated),
            "unknown" => Some(DocStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GST regime applicable to an order item.
///
/// `CgstSgst` is the domestic split regime (both rates set); `Igst` is the
/// single interstate rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GstType {
    #[serde(rename = "CGST-SGST")]
    CgstSgst,
    #[serde(rename = "IGST")]
    Igst,
}

impl GstType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GstType::CgstSgst => "CGST-SGST",
            GstType::Igst => "IGST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CGST-SGST" => Some(GstType::CgstSgst),
            "IGST" => Some(GstType::Igst),
            _ => None,
        }
    }
}

impl fmt::Display for GstType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when an extraction payload fails envelope validation.
#[derive(Debug, Error)]
#[error("malformed extraction payload: {0}")]
pub struct MalformedPayload(pub String);

/// Versioned envelope for the semi-structured OCR extraction payload.
///
/// The payload shape is validated once on ingestion (must be a JSON object);
/// use-sites then read it through the extraction helpers instead of trusting
/// arbitrary structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrPayload {
    pub schema_version: u32,
    pub doc_type: DocType,
    pub data: serde_json::Value,
}

impl OcrPayload {
    pub fn new(doc_type: DocType, data: serde_json::Value) -> Result<Self, MalformedPayload> {
        if !data.is_object() {
            return Err(MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_type_name(&data)
            )));
        }
        Ok(Self {
            schema_version: OCR_PAYLOAD_SCHEMA_VERSION,
            doc_type,
            data,
        })
    }
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// One line item parsed out of a bill page's extraction payload.
///
/// Transient: derived from a document's payload, never persisted on its own
/// (the document stores the formatted list as JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillItem {
    pub name: Option<String>,
    /// HSN or SAC code, whichever the bill carries.
    pub hsn_sac: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub cgst: Option<Decimal>,
    pub sgst: Option<Decimal>,
    pub igst: Option<Decimal>,
}

/// One item on the purchase order, as fetched from the order service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub master_item_name: Option<String>,
    pub item_code: Option<String>,
    pub hsn_code: Option<String>,
    pub unit: Option<String>,
    pub total_quantity: Decimal,
    /// Quantity already consumed by prior billings.
    pub assigned_quantity: Decimal,
    pub unit_rate: Decimal,
    pub cgst: Option<Decimal>,
    pub sgst: Option<Decimal>,
    pub igst: Option<Decimal>,
    /// Distinct tax-rate options recorded on the order for this item.
    pub available_tax_rates: Vec<Decimal>,
}

impl OrderItem {
    /// Quantity still billable: total minus already assigned.
    pub fn unassigned_quantity(&self) -> Decimal {
        self.total_quantity - self.assigned_quantity
    }

    /// Regime derived from which rates the order records: split domestic
    /// rates without IGST mean CGST-SGST; a lone IGST rate means IGST.
    /// Conflicting or absent rates yield `None`.
    pub fn gst_type(&self) -> Option<GstType> {
        let has_split = self.cgst.is_some() || self.sgst.is_some();
        match (has_split, self.igst.is_some()) {
            (true, false) => Some(GstType::CgstSgst),
            (false, true) => Some(GstType::Igst),
            _ => None,
        }
    }
}

/// Point-in-time order data for one PO number. Immutable once fetched
/// within a reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Upstream order identifier used for the detail lookup.
    pub order_ref: String,
    pub order_number: Option<String>,
    pub po_number: String,
    pub supplier_name: Option<String>,
    pub customer_name: Option<String>,
    pub order_date: Option<String>,
    pub items: Vec<OrderItem>,
}

fn default_selected() -> bool {
    true
}

/// Caller-provided selection for one matched item when saving a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInput {
    pub bill_index: usize,
    pub order_index: usize,
    #[serde(default = "default_selected")]
    pub selected: bool,
    pub quantity: Decimal,
    /// IGST rate percentage, for the interstate regime.
    pub gst_rate: Option<Decimal>,
    pub cgst_rate: Option<Decimal>,
    pub sgst_rate: Option<Decimal>,
}
