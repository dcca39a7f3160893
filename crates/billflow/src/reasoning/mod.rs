//! Reasoning (vision/LLM) service client.
//!
//! Three operations against an OpenAI-compatible chat completions API:
//! page classification, page data extraction, and item match proposals.
//! The service is an external capability behind the `ReasoningClient` seam;
//! everything it returns is treated as untrusted and validated here.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{PromptConfig, ReasoningConfig};
use crate::model::{BillItem, DocType, OrderItem};
use crate::retry::{self, RetryPolicy};

pub const DEFAULT_CLASSIFICATION_PROMPT: &str = "\
You are a document classifier. Analyze the provided image and classify it into one of these categories:
- 'bill': If it's an invoice or bill document
- 'eway_bill': If it's an e-way bill document
- 'unknown': If it doesn't match either category

Respond with ONLY one word: 'bill', 'eway_bill', or 'unknown'. Do not include any explanation or additional text.";

pub const DEFAULT_MATCH_PROMPT: &str = "\
You are a fuzzy matcher with high confidence. Task: produce a ONE-TO-ONE mapping from bill items to PO items.

Rules:

1. Fuzzy Match based on item name semantics and HSN/SAC code

2. If HSN/SAC differs, you MAY still match based on strong name semantics, but only if there is high confidence and no better HSN/SAC alternative.

3. Each billId MUST map to EXACTLY ONE poId.

4. Each poId MUST be used AT MOST ONCE (no two bill items may map to the same PO item).

5. If any billId cannot be matched confidently, list it under unmatched and DO NOT guess.

Return STRICT JSON ONLY with this exact shape:

{
  \"matches\": [{\"billId\": \"b0\", \"poId\": \"p2\"}],
  \"unmatched\": [\"b3\"]
}";

/// Built-in extraction prompt, parameterized by document type.
pub fn default_extraction_prompt(doc_type: DocType) -> String {
    format!(
        "You are an OCR system. Extract all relevant data from this {} document.\n\
         Return the data as a JSON object. Include all fields like dates, invoice numbers, \
         parties, items, amounts, taxes, etc.\n\
         Be thorough and extract all visible information. Return only valid JSON, no other text.",
        doc_type
    )
}

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("Reasoning service api key not configured")]
    MissingApiKey,

    #[error("Reasoning service request failed: {0}")]
    Upstream(String),

    #[error("Reasoning service returned malformed output: {0}")]
    MalformedOutput(String),
}

impl ReasoningError {
    fn is_retryable(&self) -> bool {
        matches!(self, ReasoningError::Upstream(_))
    }
}

/// One proposed pairing in the service's id space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPair {
    #[serde(rename = "billId")]
    pub bill_id: String,
    #[serde(rename = "poId")]
    pub po_id: String,
}

/// The match operation's full output contract. Both fields are required;
/// their absence means the output is malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub matches: Vec<MatchPair>,
    pub unmatched: Vec<String>,
}

/// Seam between the pipeline/reconciliation and the reasoning service.
pub trait ReasoningClient: Send + Sync {
    /// Classifies one page image into a document type. Output that is not
    /// one of the known labels normalizes to `Unknown` rather than failing.
    fn classify_page(
        &self,
        image: &[u8],
        extension: &str,
        prompt: &PromptConfig,
    ) -> Result<DocType, ReasoningError>;

    /// Extracts semi-structured data from one page image as a JSON object.
    fn extract_page(
        &self,
        image: &[u8],
        extension: &str,
        doc_type: DocType,
        prompt: &PromptConfig,
    ) -> Result<Value, ReasoningError>;

    /// Proposes a one-to-one mapping from bill items to order items.
    fn propose_matches(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
        prompt: &PromptConfig,
    ) -> Result<MatchProposal, ReasoningError>;
}

/// HTTP client against an OpenAI-compatible chat completions endpoint.
pub struct HttpReasoningClient {
    client: reqwest::blocking::Client,
    config: ReasoningConfig,
    retry: RetryPolicy,
}

impl HttpReasoningClient {
    pub fn new(config: ReasoningConfig, retry: RetryPolicy) -> Result<Self, ReasoningError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Upstream(e.to_string()))?;
        if let Some(key) = config.api_key.as_deref() {
            tracing::debug!(
                base_url = %config.base_url,
                api_key = %crate::sanitize::redact_token(key),
                "reasoning client configured"
            );
        }
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Sends one chat completion and returns the first choice's content.
    fn chat(
        &self,
        model: &str,
        content: Value,
        json_mode: bool,
    ) -> Result<String, ReasoningError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ReasoningError::MissingApiKey)?;

        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": 4000,
            "temperature": 0,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        retry::with_backoff(
            &self.retry,
            "reasoning.chat",
            ReasoningError::is_retryable,
            || {
                let response = self
                    .client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .map_err(|e| ReasoningError::Upstream(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(ReasoningError::Upstream(format!(
                        "reasoning service returned HTTP {status}"
                    )));
                }

                let payload: Value = response
                    .json()
                    .map_err(|e| ReasoningError::MalformedOutput(e.to_string()))?;
                payload
                    .pointer("/choices/0/message/content")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| {
                        ReasoningError::MalformedOutput(
                            "completion has no message content".to_string(),
                        )
                    })
            },
        )
    }
}

impl ReasoningClient for HttpReasoningClient {
    fn classify_page(
        &self,
        image: &[u8],
        extension: &str,
        prompt: &PromptConfig,
    ) -> Result<DocType, ReasoningError> {
        let _span = tracing::info_span!("reasoning.classify", model = %prompt.model).entered();
        let content = vision_content(
            prompt.text_or(DEFAULT_CLASSIFICATION_PROMPT),
            image,
            extension,
        );
        let raw = self.chat(&prompt.model, content, false)?;
        let doc_type = normalize_classification(&raw);
        tracing::info!(raw = %crate::sanitize::clip_message(&raw, 80), %doc_type, "classified page");
        Ok(doc_type)
    }

    fn extract_page(
        &self,
        image: &[u8],
        extension: &str,
        doc_type: DocType,
        prompt: &PromptConfig,
    ) -> Result<Value, ReasoningError> {
        let _span = tracing::info_span!("reasoning.extract", %doc_type, model = %prompt.model)
            .entered();
        let default_prompt = default_extraction_prompt(doc_type);
        let content = vision_content(prompt.text_or(&default_prompt), image, extension);
        let raw = self.chat(&prompt.model, content, true)?;

        serde_json::from_str(&raw).map_err(|e| {
            ReasoningError::MalformedOutput(format!("extraction output is not valid JSON: {e}"))
        })
    }

    fn propose_matches(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
        prompt: &PromptConfig,
    ) -> Result<MatchProposal, ReasoningError> {
        let _span = tracing::info_span!(
            "reasoning.match",
            bill_items = bill_items.len(),
            order_items = order_items.len()
        )
        .entered();

        let request = format!(
            "{}\n\nBill Items:\n{}\n\nOrder Items:\n{}\n\nReturn the JSON mapping now:",
            prompt.text_or(DEFAULT_MATCH_PROMPT),
            Value::Array(format_bill_items(bill_items)),
            Value::Array(format_order_items(order_items)),
        );

        let raw = self.chat(&prompt.model, Value::String(request), true)?;
        parse_match_proposal(&raw)
    }
}

/// Builds the text + image content block for a vision request.
fn vision_content(prompt: &str, image: &[u8], extension: &str) -> Value {
    let mime = match extension {
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    json!([
        {"type": "text", "text": prompt},
        {"type": "image_url", "image_url": {"url": format!("data:{mime};base64,{encoded}")}}
    ])
}

/// Normalizes free-text classifier output to a document type.
///
/// "eway" anywhere wins over "bill" ("e-way bill" contains both); anything
/// else, including empty or rambling output, is `Unknown`, a soft outcome
/// rather than an error.
pub fn normalize_classification(raw: &str) -> DocType {
    let lower = raw.to_lowercase();
    if lower.contains("eway") || lower.contains("e-way") {
        DocType::EwayBill
    } else if lower.contains("bill") {
        DocType::Bill
    } else {
        DocType::Unknown
    }
}

/// Formats bill items into the id-tagged shape the match prompt expects.
pub fn format_bill_items(items: &[BillItem]) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            json!({
                "billId": format!("b{idx}"),
                "name": item.name.as_deref().unwrap_or(""),
                "hsn_sac": item.hsn_sac.as_deref().unwrap_or(""),
                "quantity": item.quantity,
                "amount": item.amount,
                "unit": item.unit,
                "rate": item.rate,
            })
        })
        .collect()
}

/// Formats order items into the id-tagged shape the match prompt expects.
pub fn format_order_items(items: &[OrderItem]) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            json!({
                "poId": format!("p{idx}"),
                "name": item.name,
                "masterItemName": item.master_item_name.as_deref().unwrap_or(""),
                "hsn_sac": item.hsn_code.as_deref().unwrap_or(""),
            })
        })
        .collect()
}

fn parse_match_proposal(raw: &str) -> Result<MatchProposal, ReasoningError> {
    serde_json::from_str(raw).map_err(|e| {
        ReasoningError::MalformedOutput(format!(
            "match output does not satisfy the matches/unmatched contract: {e}"
        ))
    })
}

/// Parses a service-side id like `b3` or `p1` back into an index.
pub fn parse_tagged_index(id: &str, prefix: char) -> Option<usize> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_classification() {
        assert_eq!(normalize_classification("bill"), DocType::Bill);
        assert_eq!(normalize_classification("This is a BILL."), DocType::Bill);
        assert_eq!(normalize_classification("eway_bill"), DocType::EwayBill);
        assert_eq!(normalize_classification("e-way bill"), DocType::EwayBill);
        assert_eq!(normalize_classification("unknown"), DocType::Unknown);
        assert_eq!(normalize_classification(""), DocType::Unknown);
        assert_eq!(normalize_classification("receipt maybe?"), DocType::Unknown);
    }

    #[test]
    fn test_parse_match_proposal_valid() {
        let raw = r#"{"matches": [{"billId": "b0", "poId": "p2"}], "unmatched": ["b1"]}"#;
        let proposal = parse_match_proposal(raw).unwrap();
        assert_eq!(proposal.matches.len(), 1);
        assert_eq!(proposal.matches[0].bill_id, "b0");
        assert_eq!(proposal.matches[0].po_id, "p2");
        assert_eq!(proposal.unmatched, vec!["b1"]);
    }

    #[test]
    fn test_parse_match_proposal_missing_field() {
        assert!(parse_match_proposal(r#"{"matches": []}"#).is_err());
        assert!(parse_match_proposal("not json").is_err());
    }

    #[test]
    fn test_parse_tagged_index() {
        assert_eq!(parse_tagged_index("b0", 'b'), Some(0));
        assert_eq!(parse_tagged_index("p12", 'p'), Some(12));
        assert_eq!(parse_tagged_index("x3", 'b'), None);
        assert_eq!(parse_tagged_index("bxyz", 'b'), None);
    }

    #[test]
    fn test_format_items_tagging() {
        let bill = vec![BillItem {
            name: Some("Cement".to_string()),
            ..Default::default()
        }];
        let formatted = format_bill_items(&bill);
        assert_eq!(formatted[0]["billId"], "b0");
        assert_eq!(formatted[0]["name"], "Cement");

        let order = vec![OrderItem {
            name: "Cement OPC".to_string(),
            master_item_name: None,
            item_code: None,
            hsn_code: Some("2523".to_string()),
            unit: None,
            total_quantity: rust_decimal::Decimal::ONE,
            assigned_quantity: rust_decimal::Decimal::ZERO,
            unit_rate: rust_decimal::Decimal::ONE,
            cgst: None,
            sgst: None,
            igst: None,
            available_tax_rates: vec![],
        }];
        let formatted = format_order_items(&order);
        assert_eq!(formatted[0]["poId"], "p0");
        assert_eq!(formatted[0]["hsn_sac"], "2523");
    }
}
