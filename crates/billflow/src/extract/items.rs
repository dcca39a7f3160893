//! Line item extraction from an extraction payload.
//!
//! The reasoning service labels fields inconsistently across bill layouts,
//! so every field is looked up through a synonym list, first hit wins.
//! Items that are not JSON objects are skipped rather than failing the page.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::model::BillItem;

const ITEM_LIST_KEYS: &[&str] = &["items", "lineItems", "line_items"];

const NAME_KEYS: &[&str] = &[
    "name",
    "itemName",
    "item_name",
    "description",
    "productName",
    "product_name",
    "itemDescription",
];

const HSN_KEYS: &[&str] = &["hsn", "hsnCode", "hsn_code", "HSN", "HSNCode", "hsnSac", "hsn_sac"];
const SAC_KEYS: &[&str] = &["sac", "sacCode", "sac_code", "SAC", "SACCode"];

const QUANTITY_KEYS: &[&str] = &["quantity", "qty", "Quantity", "qtyValue"];
const UNIT_KEYS: &[&str] = &["unit", "uom", "unitOfMeasure", "Unit"];
const RATE_KEYS: &[&str] = &["rate", "unitRate", "unit_rate", "price", "unitPrice", "ratePerUnit"];
const AMOUNT_KEYS: &[&str] = &["amount", "total", "totalAmount", "itemTotal", "lineTotal"];
const TAX_RATE_KEYS: &[&str] = &["taxRate", "tax_rate", "gstRate", "gst_rate", "tax"];
const CGST_KEYS: &[&str] = &["cgst", "CGST", "cgstRate", "cgst_rate"];
const SGST_KEYS: &[&str] = &["sgst", "SGST", "sgstRate", "sgst_rate"];
const IGST_KEYS: &[&str] = &["igst", "IGST", "igstRate", "igst_rate"];

/// Extracts line items from the payload. An absent or malformed item list
/// yields an empty vec, not an error.
pub fn extract_bill_items(payload: &Value) -> Vec<BillItem> {
    let Some(root) = payload.as_object() else {
        return Vec::new();
    };

    let items = ITEM_LIST_KEYS
        .iter()
        .filter_map(|key| root.get(*key))
        .find_map(|v| v.as_array().filter(|a| !a.is_empty()));
    let Some(items) = items else {
        tracing::warn!("no items found in extraction payload");
        return Vec::new();
    };

    let mut extracted = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            tracing::warn!(index = idx, "skipping non-object item entry");
            continue;
        };

        extracted.push(BillItem {
            name: first_string(obj, NAME_KEYS),
            hsn_sac: first_string(obj, HSN_KEYS).or_else(|| first_string(obj, SAC_KEYS)),
            quantity: first_decimal(obj, QUANTITY_KEYS),
            unit: first_string(obj, UNIT_KEYS),
            rate: first_decimal(obj, RATE_KEYS),
            amount: first_decimal(obj, AMOUNT_KEYS),
            tax_rate: first_decimal(obj, TAX_RATE_KEYS),
            cgst: first_decimal(obj, CGST_KEYS),
            sgst: first_decimal(obj, SGST_KEYS),
            igst: first_decimal(obj, IGST_KEYS),
        });
    }

    tracing::debug!(count = extracted.len(), "extracted line items from payload");
    extracted
}

fn first_value<'a>(
    obj: &'a serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
}

fn first_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_value(obj, keys).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_decimal(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<Decimal> {
    first_value(obj, keys).and_then(value_to_decimal)
}

/// Parses a decimal from a JSON number or a numeric string (thousand
/// separators and currency symbols stripped).
pub fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse().ok()
        }
        _ => None,
    }
}
