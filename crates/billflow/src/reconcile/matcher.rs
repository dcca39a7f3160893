//! Candidate pairing strategies.
//!
//! Two matchers share one seam: a lexical one built on Jaro-Winkler name
//! similarity, and one that delegates to the reasoning service. Both only
//! PROPOSE candidates; acceptance thresholds and the one-to-one guarantee
//! live in the engine.

use std::sync::Arc;

use strsim::jaro_winkler;

use crate::config::PromptConfig;
use crate::model::{BillItem, OrderItem};
use crate::reasoning::{self, ReasoningClient};

use super::ReconcileError;

/// One proposed pairing with the matcher's confidence in it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub bill_index: usize,
    pub order_index: usize,
    pub confidence: f64,
}

/// Seam between the engine and whichever strategy proposes candidates.
pub trait ItemMatcher: Send + Sync {
    fn propose(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
    ) -> Result<Vec<MatchCandidate>, ReconcileError>;
}

/// Name-similarity matcher. Deterministic and offline; used as the fallback
/// when no reasoning service is configured, and in tests.
pub struct LexicalMatcher {
    similarity_floor: f64,
}

impl LexicalMatcher {
    pub fn new(similarity_floor: f64) -> Self {
        Self { similarity_floor }
    }
}

impl ItemMatcher for LexicalMatcher {
    fn propose(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
    ) -> Result<Vec<MatchCandidate>, ReconcileError> {
        let mut candidates = Vec::new();
        for (bill_index, bill_item) in bill_items.iter().enumerate() {
            let bill_name = normalize_name(bill_item.name.as_deref().unwrap_or(""));
            for (order_index, order_item) in order_items.iter().enumerate() {
                let similarity = name_similarity(&bill_name, order_item);
                let hsn_equal = matches!(
                    (bill_item.hsn_sac.as_deref(), order_item.hsn_code.as_deref()),
                    (Some(a), Some(b)) if !a.is_empty() && a == b
                );
                // An exact HSN/SAC hit is always worth proposing, even when
                // the names read nothing alike.
                if similarity >= self.similarity_floor || hsn_equal {
                    candidates.push(MatchCandidate {
                        bill_index,
                        order_index,
                        confidence: similarity,
                    });
                }
            }
        }
        tracing::debug!(count = candidates.len(), "lexical matcher proposed candidates");
        Ok(candidates)
    }
}

/// Best similarity of the bill name against the order name and its master
/// catalogue name.
fn name_similarity(bill_name: &str, order_item: &OrderItem) -> f64 {
    if bill_name.is_empty() {
        return 0.0;
    }
    let primary = jaro_winkler(bill_name, &normalize_name(&order_item.name));
    let master = order_item
        .master_item_name
        .as_deref()
        .map(|name| jaro_winkler(bill_name, &normalize_name(name)))
        .unwrap_or(0.0);
    primary.max(master)
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Matcher backed by the reasoning service's one-to-one mapping operation.
///
/// The service reports pairings, not scores, so accepted pairs carry full
/// confidence; ids that do not resolve to known indices are dropped with a
/// warning rather than failing the whole proposal.
pub struct ReasoningMatcher {
    client: Arc<dyn ReasoningClient>,
    prompt: PromptConfig,
}

impl ReasoningMatcher {
    pub fn new(client: Arc<dyn ReasoningClient>, prompt: PromptConfig) -> Self {
        Self { client, prompt }
    }
}

impl ItemMatcher for ReasoningMatcher {
    fn propose(
        &self,
        bill_items: &[BillItem],
        order_items: &[OrderItem],
    ) -> Result<Vec<MatchCandidate>, ReconcileError> {
        let proposal = self
            .client
            .propose_matches(bill_items, order_items, &self.prompt)?;

        let mut candidates = Vec::with_capacity(proposal.matches.len());
        for pair in &proposal.matches {
            let bill_index = reasoning::parse_tagged_index(&pair.bill_id, 'b')
                .filter(|i| *i < bill_items.len());
            let order_index = reasoning::parse_tagged_index(&pair.po_id, 'p')
                .filter(|i| *i < order_items.len());
            match (bill_index, order_index) {
                (Some(bill_index), Some(order_index)) => candidates.push(MatchCandidate {
                    bill_index,
                    order_index,
                    confidence: 1.0,
                }),
                _ => {
                    tracing::warn!(
                        bill_id = %pair.bill_id,
                        po_id = %pair.po_id,
                        "dropping match pair with unresolvable ids"
                    );
                }
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bill(name: &str, hsn: Option<&str>) -> BillItem {
        BillItem {
            name: Some(name.to_string()),
            hsn_sac: hsn.map(str::to_string),
            ..Default::default()
        }
    }

    fn order(name: &str, hsn: Option<&str>) -> OrderItem {
        OrderItem {
            name: name.to_string(),
            master_item_name: None,
            item_code: None,
            hsn_code: hsn.map(str::to_string),
            unit: None,
            total_quantity: Decimal::from(100),
            assigned_quantity: Decimal::ZERO,
            unit_rate: Decimal::from(10),
            cgst: None,
            sgst: None,
            igst: None,
            available_tax_rates: vec![],
        }
    }

    #[test]
    fn test_lexical_proposes_similar_names() {
        let matcher = LexicalMatcher::new(0.40);
        let candidates = matcher
            .propose(
                &[bill("Cement OPC 53 Grade", None)],
                &[order("Cement OPC 53", None), order("Hydraulic Excavator", None)],
            )
            .unwrap();
        assert!(candidates.iter().any(|c| c.order_index == 0 && c.confidence > 0.9));
    }

    #[test]
    fn test_lexical_floor_drops_dissimilar_names() {
        let matcher = LexicalMatcher::new(0.40);
        let candidates = matcher
            .propose(&[bill("zzzz", None)], &[order("Cement OPC 53", None)])
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_lexical_always_proposes_hsn_equal() {
        let matcher = LexicalMatcher::new(0.99);
        let candidates = matcher
            .propose(
                &[bill("completely different wording", Some("2523"))],
                &[order("Cement OPC 53", Some("2523"))],
            )
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_lexical_uses_master_item_name() {
        let mut target = order("INT-CODE-7781", None);
        target.master_item_name = Some("TMT Steel Bar 12mm".to_string());
        let matcher = LexicalMatcher::new(0.80);
        let candidates = matcher
            .propose(&[bill("TMT Steel Bar 12 mm", None)], &[target])
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    struct FixedProposal(crate::reasoning::MatchProposal);

    impl ReasoningClient for FixedProposal {
        fn classify_page(
            &self,
            _: &[u8],
            _: &str,
            _: &PromptConfig,
        ) -> Result<crate::model::DocType, crate::reasoning::ReasoningError> {
            unimplemented!()
        }

        fn extract_page(
            &self,
            _: &[u8],
            _: &str,
            _: crate::model::DocType,
            _: &PromptConfig,
        ) -> Result<serde_json::Value, crate::reasoning::ReasoningError> {
            unimplemented!()
        }

        fn propose_matches(
            &self,
            _: &[BillItem],
            _: &[OrderItem],
            _: &PromptConfig,
        ) -> Result<crate::reasoning::MatchProposal, crate::reasoning::ReasoningError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_reasoning_matcher_maps_ids_and_drops_invalid() {
        let proposal = crate::reasoning::MatchProposal {
            matches: vec![
                crate::reasoning::MatchPair {
                    bill_id: "b0".to_string(),
                    po_id: "p1".to_string(),
                },
                crate::reasoning::MatchPair {
                    bill_id: "b9".to_string(), // out of range
                    po_id: "p0".to_string(),
                },
                crate::reasoning::MatchPair {
                    bill_id: "x0".to_string(), // bad prefix
                    po_id: "p0".to_string(),
                },
            ],
            unmatched: vec![],
        };
        let matcher =
            ReasoningMatcher::new(Arc::new(FixedProposal(proposal)), PromptConfig::default());
        let candidates = matcher
            .propose(
                &[bill("Cement", None)],
                &[order("Sand", None), order("Cement", None)],
            )
            .unwrap();
        assert_eq!(
            candidates,
            vec![MatchCandidate {
                bill_index: 0,
                order_index: 1,
                confidence: 1.0,
            }]
        );
    }
}
