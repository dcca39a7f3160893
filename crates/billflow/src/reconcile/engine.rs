//! Acceptance and one-to-one assignment of proposed candidates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::model::{BillItem, GstType, ItemInput, OrderItem};

use super::matcher::MatchCandidate;

/// How a candidate pair's HSN/SAC codes relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HsnRelation {
    Equal,
    Differs,
    /// One side or both carry no code.
    Unknown,
}

fn hsn_relation(bill_item: &BillItem, order_item: &OrderItem) -> HsnRelation {
    match (bill_item.hsn_sac.as_deref(), order_item.hsn_code.as_deref()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            if a == b {
                HsnRelation::Equal
            } else {
                HsnRelation::Differs
            }
        }
        _ => HsnRelation::Unknown,
    }
}

/// One accepted pairing, denormalized with everything the draft form needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedItem {
    pub bill_index: usize,
    pub order_index: usize,
    pub bill_item: BillItem,
    /// Display name: the order's name, falling back to the catalogue name.
    pub item_name: String,
    pub master_item_name: Option<String>,
    pub item_code: Option<String>,
    pub hsn: Option<String>,
    pub total_quantity: Decimal,
    /// Quantity still open on the order; the cap for the saved quantity.
    pub billable_quantity: Decimal,
    pub unit: Option<String>,
    pub unit_rate: Decimal,
    pub gst_type: Option<GstType>,
    pub available_tax_rates: Vec<Decimal>,
    pub confidence: f64,
}

/// One bill item no candidate survived for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedItem {
    pub bill_index: usize,
    pub bill_item: BillItem,
}

/// Outcome of one reconciliation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub matches: Vec<MatchedItem>,
    pub unmatched: Vec<UnmatchedItem>,
    pub validation_errors: Vec<String>,
}

/// Applies confidence thresholds and the one-to-one constraint to a set of
/// proposed candidates.
pub struct ReconcileEngine {
    config: MatchConfig,
}

impl ReconcileEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Accepts candidates greedily in bill order. Each order item is used at
    /// most once; a bill item with no surviving candidate stays unmatched and
    /// is reported, never guessed.
    pub fn reconcile(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
        candidates: &[MatchCandidate],
    ) -> Reconciliation {
        let mut matches = Vec::new();
        let mut unmatched = Vec::new();
        let mut used_order_indices = vec![false; order_items.len()];

        for (bill_index, bill_item) in bill_items.iter().enumerate() {
            let mut surviving: Vec<&MatchCandidate> = candidates
                .iter()
                .filter(|c| {
                    c.bill_index == bill_index
                        && c.order_index < order_items.len()
                        && !used_order_indices[c.order_index]
                        && self.accepts(bill_item, &order_items[c.order_index], c.confidence)
                })
                .collect();

            // Prefer an exact HSN/SAC hit, then higher confidence, then the
            // earlier order item for a stable outcome.
            surviving.sort_by(|a, b| {
                let a_hsn = hsn_relation(bill_item, &order_items[a.order_index]) == HsnRelation::Equal;
                let b_hsn = hsn_relation(bill_item, &order_items[b.order_index]) == HsnRelation::Equal;
                b_hsn
                    .cmp(&a_hsn)
                    .then(b.confidence.total_cmp(&a.confidence))
                    .then(a.order_index.cmp(&b.order_index))
            });

            match surviving.first() {
                Some(candidate) => {
                    used_order_indices[candidate.order_index] = true;
                    matches.push(build_matched_item(
                        bill_item,
                        &order_items[candidate.order_index],
                        candidate,
                    ));
                }
                None => unmatched.push(UnmatchedItem {
                    bill_index,
                    bill_item: bill_item.clone(),
                }),
            }
        }

        let mut validation_errors = Vec::new();
        if !unmatched.is_empty() {
            validation_errors.push(format!(
                "{} bill item(s) could not be matched to order items",
                unmatched.len()
            ));
        }

        tracing::info!(
            matched = matches.len(),
            unmatched = unmatched.len(),
            "reconciled bill items against order items"
        );

        Reconciliation {
            matches,
            unmatched,
            validation_errors,
        }
    }

    /// Threshold check. Pairs whose codes disagree must clear the higher
    /// cross-HSN bar.
    fn accepts(&self, bill_item: &BillItem, order_item: &OrderItem, confidence: f64) -> bool {
        let required = match hsn_relation(bill_item, order_item) {
            HsnRelation::Equal | HsnRelation::Unknown => self.config.min_confidence,
            HsnRelation::Differs => self.config.cross_hsn_min_confidence,
        };
        confidence >= required
    }
}

fn build_matched_item(
    bill_item: &BillItem,
    order_item: &OrderItem,
    candidate: &MatchCandidate,
) -> MatchedItem {
    let item_name = if order_item.name.is_empty() {
        order_item
            .master_item_name
            .clone()
            .unwrap_or_default()
    } else {
        order_item.name.clone()
    };
    MatchedItem {
        bill_index: candidate.bill_index,
        order_index: candidate.order_index,
        bill_item: bill_item.clone(),
        item_name,
        master_item_name: order_item.master_item_name.clone(),
        item_code: order_item.item_code.clone(),
        hsn: order_item.hsn_code.clone(),
        total_quantity: order_item.total_quantity,
        billable_quantity: order_item.unassigned_quantity(),
        unit: order_item.unit.clone(),
        unit_rate: order_item.unit_rate,
        gst_type: order_item.gst_type(),
        available_tax_rates: order_item.available_tax_rates.clone(),
        confidence: candidate.confidence,
    }
}

/// Validates caller selections against the matched set before a draft save.
/// Returns every problem found, not just the first.
pub fn validate_items(inputs: &[ItemInput], matches: &[MatchedItem]) -> Vec<String> {
    let mut errors = Vec::new();

    if inputs.is_empty() {
        errors.push("At least one item is required".to_string());
        return errors;
    }

    let selected: Vec<&ItemInput> = inputs.iter().filter(|i| i.selected).collect();
    if selected.is_empty() {
        errors.push("No items selected to save".to_string());
        return errors;
    }

    for input in selected {
        let matched = matches
            .iter()
            .find(|m| m.bill_index == input.bill_index && m.order_index == input.order_index);
        let Some(matched) = matched else {
            errors.push(format!(
                "No match exists for bill item {} and order item {}",
                input.bill_index, input.order_index
            ));
            continue;
        };

        if input.quantity <= Decimal::ZERO {
            errors.push(format!(
                "Quantity for '{}' must be positive",
                matched.item_name
            ));
        } else if input.quantity > matched.billable_quantity {
            errors.push(format!(
                "Quantity {} for '{}' exceeds billable quantity {}",
                input.quantity, matched.item_name, matched.billable_quantity
            ));
        }

        match matched.gst_type {
            Some(GstType::CgstSgst) => {
                if input.cgst_rate.is_none() || input.sgst_rate.is_none() {
                    errors.push(format!(
                        "CGST and SGST rates are required for '{}'",
                        matched.item_name
                    ));
                }
            }
            Some(GstType::Igst) => {
                if input.gst_rate.is_none() {
                    errors.push(format!(
                        "GST rate is required for '{}'",
                        matched.item_name
                    ));
                }
            }
            None => {}
        }
    }

    errors
}
