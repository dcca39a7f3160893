//! PO number extraction from an extraction payload.
//!
//! Three strategies in priority order: direct field lookup (exact, then
//! case-insensitive, then dotted paths), a scan over all text values for
//! labeled or pattern-shaped PO numbers, and finally the same field lookup
//! inside well-known sections like `header` or `summary`. Every candidate
//! passes plausibility validation before it is accepted.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Field names that commonly carry the PO number, in priority order.
const PO_FIELDS: &[&str] = &[
    "po_number",
    "poNumber",
    "po_no",
    "order_number",
    "orderNumber",
    "order_no",
    "orderNo",
    "purchase_order_number",
    "purchaseOrderNumber",
    "buyer_order_number",
    "buyerOrderNumber",
    "purchase_order_no",
    "purchaseOrderNo",
    "po#",
    "order#",
    "po",
    "order",
];

/// Labels that precede a PO number in free text.
const PO_KEYWORDS: &[&str] = &[
    "purchase order",
    "po number",
    "po no",
    "order number",
    "order no",
    "buyer order number",
    "buyer order no",
    "purchase order number",
    "purchase order no",
    "po#",
    "order#",
];

/// Sections worth a second field lookup when the root has nothing.
const PO_SECTIONS: &[&str] = &["header", "invoice_header", "bill_header", "details", "summary"];

/// Values that satisfy the shape checks but never are PO numbers.
const FALSE_POSITIVES: &[&str] = &["date", "amount", "total", "quantity", "gst", "tax", "invoice"];

static KEYWORD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PO_KEYWORDS
        .iter()
        .flat_map(|keyword| {
            let escaped = regex::escape(keyword);
            [
                Regex::new(&format!(r"(?i){escaped}\s*[:#\-]?\s*([A-Z0-9\-/]+)")).unwrap(),
                Regex::new(&format!(r"(?i){escaped}\s+([A-Z0-9\-/]+)")).unwrap(),
            ]
        })
        .collect()
});

static SHAPE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // PO-1234, PO1234
        r"(?i)\b([A-Z]{2,4}-?[A-Z0-9]{3,}-?[0-9]+)\b",
        // PO-12345
        r"(?i)\b([A-Z]{2,4}-[0-9]{4,})\b",
        // ORD-1234
        r"(?i)\b(ORD-?[A-Z0-9]+)\b",
        // PO#1234, PO 1234
        r"(?i)\b(PO#?\s?[0-9]{3,})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static HAS_LETTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]").unwrap());
static HAS_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Extracts a PO number from the payload, or `None` when nothing plausible
/// is found. Never guesses: a miss is a miss.
pub fn extract_po_number(payload: &Value) -> Option<String> {
    let root = payload.as_object()?;
    if root.is_empty() {
        return None;
    }

    // Strategy 1: direct field lookup at the root.
    for field in PO_FIELDS {
        if let Some(value) = get_field(payload, field) {
            if let Some(po) = validated(&value) {
                tracing::debug!(field, "found PO number in payload field");
                return Some(po);
            }
        }
    }

    // Strategy 2: scan all text content.
    let text = collect_text(payload, 5);
    if !text.is_empty() {
        if let Some(po) = find_po_in_text(&text) {
            tracing::debug!("found PO number via text scan");
            return Some(po);
        }
    }

    // Strategy 3: field lookup inside known sections.
    for section in PO_SECTIONS {
        if let Some(section_value) = get_field(payload, section) {
            if section_value.is_object() {
                for field in PO_FIELDS {
                    if let Some(value) = get_field(&section_value, field) {
                        if let Some(po) = validated(&value) {
                            tracing::debug!(section, field, "found PO number in section field");
                            return Some(po);
                        }
                    }
                }
            }
        }
    }

    tracing::warn!("could not extract a PO number from the payload");
    None
}

/// Looks a key up exactly, then case-insensitively, then as a dotted path.
fn get_field(data: &Value, key: &str) -> Option<Value> {
    let obj = data.as_object()?;

    if let Some(value) = obj.get(key) {
        return Some(value.clone());
    }

    let key_lower = key.to_lowercase();
    for (k, v) in obj {
        if k.to_lowercase() == key_lower {
            return Some(v.clone());
        }
    }

    if key.contains('.') {
        let mut current = data;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        return Some(current.clone());
    }

    None
}

/// Flattens string values (with their keys) into one searchable blob,
/// depth-limited to keep pathological payloads cheap.
fn collect_text(data: &Value, max_depth: u32) -> String {
    if max_depth == 0 {
        return String::new();
    }
    match data {
        Value::Object(map) => {
            let mut parts = Vec::new();
            for (key, value) in map {
                match value {
                    Value::String(s) => parts.push(format!("{key}: {s}")),
                    Value::Object(_) | Value::Array(_) => {
                        let nested = collect_text(value, max_depth - 1);
                        if !nested.is_empty() {
                            parts.push(nested);
                        }
                    }
                    _ => {}
                }
            }
            parts.join(" ")
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| collect_text(item, max_depth - 1))
                .filter(|s| !s.is_empty())
                .collect();
            parts.join(" ")
        }
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn find_po_in_text(text: &str) -> Option<String> {
    for pattern in KEYWORD_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                let candidate = m.as_str().trim();
                if is_valid_po(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    for pattern in SHAPE_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                let candidate = m.as_str().trim();
                if is_valid_po(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    None
}

fn validated(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if is_valid_po(&text) {
        Some(text)
    } else {
        None
    }
}

/// Shape check for a PO candidate: at least 3 characters, a plausible
/// letter/digit mix, and not a known field label.
fn is_valid_po(value: &str) -> bool {
    let value = value.trim();
    if value.len() < 3 {
        return false;
    }

    let has_letter = HAS_LETTER.is_match(value);
    let has_digit = HAS_DIGIT.is_match(value);
    let plausible = (has_letter && has_digit)
        || (has_letter && value.len() >= 5)
        || (has_digit && value.len() >= 4);

    plausible && !FALSE_POSITIVES.contains(&value.to_lowercase().as_str())
}
