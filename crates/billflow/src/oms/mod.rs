//! Order-management service client.
//!
//! Resolving a PO number takes two calls: a list search that turns the PO
//! number into an upstream order reference, then a detail fetch for that
//! reference. The parsed result is an immutable `OrderSnapshot`; callers
//! never see raw upstream payloads.

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::OmsConfig;
use crate::model::{OrderItem, OrderSnapshot};
use crate::retry::{self, RetryPolicy};

#[derive(Error, Debug)]
pub enum OmsError {
    #[error("No order found for PO number '{0}'")]
    NotFound(String),

    #[error("Order service authentication failed")]
    Auth,

    #[error("Order service auth token not configured")]
    MissingToken,

    #[error("PO number cannot be empty")]
    EmptyPoNumber,

    #[error("Order service request failed: {0}")]
    Upstream(String),

    #[error("Order service returned malformed payload: {0}")]
    Malformed(String),
}

impl OmsError {
    /// Only transport-level failures are worth retrying; a missing order or
    /// bad credentials will not improve on the next attempt.
    fn is_retryable(&self) -> bool {
        matches!(self, OmsError::Upstream(_))
    }
}

/// Seam between the draft workflow and the order-management service.
pub trait OrderService: Send + Sync {
    /// Resolves a PO number to a point-in-time order snapshot.
    fn fetch_order_by_po(&self, po_number: &str) -> Result<OrderSnapshot, OmsError>;
}

/// HTTP client against the real order-management API.
pub struct HttpOrderService {
    client: reqwest::blocking::Client,
    config: OmsConfig,
    retry: RetryPolicy,
}

impl HttpOrderService {
    pub fn new(config: OmsConfig, retry: RetryPolicy) -> Result<Self, OmsError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OmsError::Upstream(e.to_string()))?;
        if let Some(token) = config.auth_token.as_deref() {
            tracing::debug!(
                base_url = %config.base_url,
                token = %crate::sanitize::redact_token(token),
                "order service client configured"
            );
        }
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, OmsError> {
        let token = self
            .config
            .auth_token
            .as_deref()
            .ok_or(OmsError::MissingToken)?;

        retry::with_backoff(&self.retry, "oms.get", OmsError::is_retryable, || {
            let response = self
                .client
                .get(url)
                .query(query)
                .header("Accept", "application/json")
                .header("Content-Type", "application/json")
                .header("User-Agent", "billflow/1.0")
                .header("authorizationtoken", token)
                .header("X-Request-Id", Uuid::new_v4().to_string())
                .send()
                .map_err(|e| OmsError::Upstream(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(OmsError::Auth);
            }
            if !status.is_success() {
                // Response bodies can be large and noisy; the status code is
                // what matters for diagnosis.
                return Err(OmsError::Upstream(format!(
                    "order service returned HTTP {status}"
                )));
            }

            response
                .json::<Value>()
                .map_err(|e| OmsError::Malformed(e.to_string()))
        })
    }

    /// Turns a PO number into the upstream order reference via the list
    /// search endpoint.
    fn search_order(&self, po_number: &str) -> Result<Value, OmsError> {
        let url = format!("{}/orders/order-list/order-listV2", self.config.base_url);
        let data = self.get_json(&url, &[("pageNumber", "1"), ("searchText", po_number)])?;

        let success = data.get("success").and_then(Value::as_bool).unwrap_or(false);
        let status = data.get("status").and_then(Value::as_i64).unwrap_or(0);
        if !success || status != 200 {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(OmsError::Upstream(format!(
                "order search failed: {message}"
            )));
        }

        let documents = data
            .pointer("/data/allDocuments")
            .and_then(Value::as_array)
            .ok_or_else(|| OmsError::Malformed("missing data.allDocuments".to_string()))?;

        documents
            .first()
            .cloned()
            .ok_or_else(|| OmsError::NotFound(po_number.to_string()))
    }

    fn fetch_order_details(&self, order_ref: &str) -> Result<Value, OmsError> {
        let url = format!("{}/orders/{}", self.config.base_url, order_ref.trim());
        self.get_json(&url, &[])
    }
}

impl OrderService for HttpOrderService {
    fn fetch_order_by_po(&self, po_number: &str) -> Result<OrderSnapshot, OmsError> {
        let po_number = po_number.trim();
        if po_number.is_empty() {
            return Err(OmsError::EmptyPoNumber);
        }

        let _span = tracing::info_span!("oms.fetch_order", po_number).entered();

        let summary = self.search_order(po_number)?;
        let order_ref = summary
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| OmsError::Malformed("order summary has no _id".to_string()))?
            .to_string();
        tracing::info!(order_ref, "resolved PO number to order reference");

        let details = self.fetch_order_details(&order_ref)?;
        build_snapshot(po_number, &order_ref, &summary, &details)
    }
}

/// Assembles the snapshot from the search summary and the detail payload.
pub fn build_snapshot(
    po_number: &str,
    order_ref: &str,
    summary: &Value,
    details: &Value,
) -> Result<OrderSnapshot, OmsError> {
    // Detail payloads are wrapped in `data` when present.
    let order_data = details.get("data").unwrap_or(details);

    let items_raw = find_order_items(order_data)
        .ok_or_else(|| OmsError::Malformed("order details contain no item list".to_string()))?;
    let items: Vec<OrderItem> = items_raw.iter().filter_map(parse_order_item).collect();
    if items.is_empty() {
        return Err(OmsError::Malformed(
            "order details contain no parseable items".to_string(),
        ));
    }

    let str_field = |source: &Value, key: &str| {
        source
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    };

    Ok(OrderSnapshot {
        order_ref: order_ref.to_string(),
        order_number: str_field(summary, "orderNumber").or_else(|| str_field(order_data, "orderNumber")),
        po_number: po_number.to_string(),
        supplier_name: str_field(summary, "supplierName").or_else(|| str_field(order_data, "supplierName")),
        customer_name: str_field(summary, "customerName").or_else(|| str_field(order_data, "customerName")),
        order_date: str_field(summary, "poDate").or_else(|| str_field(order_data, "poDate")),
        items,
    })
}

/// Order items live in different places depending on the order kind:
/// `orderPODetails.items` for PO orders, a direct `items` list, or
/// `boqDetails.items` for BOQ orders. `orderItems` is an accepted synonym
/// at each location.
fn find_order_items(order_data: &Value) -> Option<&Vec<Value>> {
    let locations = [
        order_data.pointer("/orderPODetails/items"),
        order_data.pointer("/orderPODetails/orderItems"),
        order_data.get("items"),
        order_data.get("orderItems"),
        order_data.pointer("/boqDetails/items"),
        order_data.pointer("/boqDetails/orderItems"),
    ];
    locations
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|a| !a.is_empty())
}

fn parse_order_item(raw: &Value) -> Option<OrderItem> {
    let obj = raw.as_object()?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| obj.get("masterItemName").and_then(Value::as_str))?
        .to_string();

    let decimal_field = |key: &str| obj.get(key).and_then(crate::extract::items::value_to_decimal);
    let str_field = |key: &str| obj.get(key).and_then(Value::as_str).map(|s| s.to_string());

    let total_quantity = decimal_field("quantity").unwrap_or(Decimal::ZERO);
    // The API reports the remaining billable quantity; already-assigned is
    // derived when not reported directly.
    let assigned_quantity = decimal_field("assignedQuantity").unwrap_or_else(|| {
        decimal_field("unassignedQuantity")
            .or_else(|| decimal_field("unassigned_quantity"))
            .map(|unassigned| total_quantity - unassigned)
            .unwrap_or(Decimal::ZERO)
    });

    let mut available_tax_rates: Vec<Decimal> = obj
        .get("taxes")
        .and_then(Value::as_array)
        .map(|taxes| {
            taxes
                .iter()
                .filter_map(|tax| tax.get("rate"))
                .filter_map(crate::extract::items::value_to_decimal)
                .filter(|rate| !rate.is_zero())
                .collect()
        })
        .unwrap_or_default();
    available_tax_rates.sort();
    available_tax_rates.dedup();

    Some(OrderItem {
        name,
        master_item_name: str_field("masterItemName"),
        item_code: str_field("itemCode"),
        hsn_code: str_field("hsnCode"),
        unit: str_field("unit"),
        total_quantity,
        assigned_quantity,
        unit_rate: decimal_field("unitRate")
            .or_else(|| decimal_field("unit_rate"))
            .unwrap_or(Decimal::ZERO),
        cgst: decimal_field("cgst"),
        sgst: decimal_field("sgst"),
        igst: decimal_field("igst"),
        available_tax_rates,
    })
}
