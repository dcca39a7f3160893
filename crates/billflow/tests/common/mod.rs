//! Shared fixtures and stub services for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde_json::Value;

use billflow::config::{PromptConfig, ReasoningConfig};
use billflow::oms::{OmsError, OrderService};
use billflow::reasoning::{MatchProposal, ReasoningClient, ReasoningError};
use billflow::{BillItem, DocType, OrderItem, OrderSnapshot};

/// Builds a minimal n-page PDF in memory.
pub fn make_pdf(page_count: usize) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for i in 0..page_count {
        let content = Stream::new(
            dictionary! {},
            format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1).into_bytes(),
        );
        let content_id = doc.add_object(content);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    let kids_len = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => kids_len,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Reasoning stub fed with scripted per-page classifications.
///
/// Each `classify_page` call pops the next scripted result; when the script
/// runs out the page classifies as unknown. Extraction always returns the
/// configured payload.
pub struct StubReasoning {
    classifications: Mutex<VecDeque<Result<DocType, String>>>,
    extraction: Value,
    proposal: MatchProposal,
}

impl StubReasoning {
    pub fn new(classifications: Vec<Result<DocType, String>>, extraction: Value) -> Self {
        Self {
            classifications: Mutex::new(classifications.into()),
            extraction,
            proposal: MatchProposal {
                matches: vec![],
                unmatched: vec![],
            },
        }
    }

    pub fn with_proposal(mut self, proposal: MatchProposal) -> Self {
        self.proposal = proposal;
        self
    }
}

impl ReasoningClient for StubReasoning {
    fn classify_page(
        &self,
        _image: &[u8],
        _extension: &str,
        _prompt: &PromptConfig,
    ) -> Result<DocType, ReasoningError> {
        match self.classifications.lock().unwrap().pop_front() {
            Some(Ok(doc_type)) => Ok(doc_type),
            Some(Err(reason)) => Err(ReasoningError::Upstream(reason)),
            None => Ok(DocType::Unknown),
        }
    }

    fn extract_page(
        &self,
        _image: &[u8],
        _extension: &str,
        _doc_type: DocType,
        _prompt: &PromptConfig,
    ) -> Result<Value, ReasoningError> {
        Ok(self.extraction.clone())
    }

    fn propose_matches(
        &self,
        _bill_items: &[BillItem],
        _order_items: &[OrderItem],
        _prompt: &PromptConfig,
    ) -> Result<MatchProposal, ReasoningError> {
        Ok(self.proposal.clone())
    }
}

/// Order service stub that serves one fixed snapshot for any PO number.
pub struct StubOrders {
    snapshot: OrderSnapshot,
}

impl StubOrders {
    pub fn new(snapshot: OrderSnapshot) -> Self {
        Self { snapshot }
    }
}

impl OrderService for StubOrders {
    fn fetch_order_by_po(&self, po_number: &str) -> Result<OrderSnapshot, OmsError> {
        let mut snapshot = self.snapshot.clone();
        snapshot.po_number = po_number.trim().to_string();
        Ok(snapshot)
    }
}

pub fn reasoning_config() -> ReasoningConfig {
    ReasoningConfig {
        base_url: "http://reasoning.test".to_string(),
        api_key: None,
        timeout_secs: 1,
        classification: PromptConfig::default(),
        extraction: PromptConfig::default(),
        bill_extraction_prompt: None,
        eway_bill_extraction_prompt: None,
        item_match: PromptConfig::default(),
    }
}

pub fn igst_order_item(name: &str, hsn: &str, unit_rate: u32, rate_pct: u32) -> OrderItem {
    OrderItem {
        name: name.to_string(),
        master_item_name: None,
        item_code: Some("CODE-1".to_string()),
        hsn_code: Some(hsn.to_string()),
        unit: Some("nos".to_string()),
        total_quantity: Decimal::from(100),
        assigned_quantity: Decimal::ZERO,
        unit_rate: Decimal::from(unit_rate),
        cgst: None,
        sgst: None,
        igst: Some(Decimal::from(rate_pct)),
        available_tax_rates: vec![Decimal::from(rate_pct)],
    }
}

pub fn order_snapshot(items: Vec<OrderItem>) -> OrderSnapshot {
    OrderSnapshot {
        order_ref: "64f0aa11".to_string(),
        order_number: Some("ORD-2041".to_string()),
        po_number: String::new(),
        supplier_name: Some("Acme Traders".to_string()),
        customer_name: Some("Bluefield Constructions".to_string()),
        order_date: Some("2026-07-14".to_string()),
        items,
    }
}
