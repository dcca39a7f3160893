//! Draft bill workflow: confirm a PO, reconcile items, save the draft.
//!
//! The workflow is session-based. Confirming a PO fetches a fresh order
//! snapshot and pins it in the session; matching and saving always work
//! against that snapshot, never against re-fetched data, so the quantities
//! validated are the quantities saved.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::db::draft_repo::{self, DraftBillRow, DraftItemRow, DraftSaveError, DraftSummary};
use crate::db::{doc_repo, Database, DatabaseError};
use crate::model::{DocStatus, DocType, GstType, ItemInput, OrderSnapshot};
use crate::oms::{OmsError, OrderService};
use crate::reconcile::{
    self, ItemMatcher, MatchedItem, Reconciliation, ReconcileEngine, ReconcileError,
};

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Draft validation failed: {0}")]
    Validation(String),

    #[error("Document '{doc_id}' not found")]
    DocNotFound { doc_id: String },

    #[error("Document '{doc_id}' is not eligible for a draft: {reason}")]
    NotEligible { doc_id: String, reason: String },

    #[error("A draft already exists for document '{doc_id}'")]
    DuplicateDraft { doc_id: String },

    #[error(transparent)]
    Oms(#[from] OmsError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Failed to serialize draft data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-flight draft state between PO confirmation and the save.
#[derive(Debug, Clone)]
pub struct DraftSession {
    pub doc_id: String,
    pub user_id: String,
    pub job_thread_id: String,
    pub po_number: String,
    /// Order data pinned at confirmation time.
    pub order: OrderSnapshot,
    /// Filled by `match_items`; empty until then.
    pub matched_items: Vec<MatchedItem>,
}

/// Full detail of a saved draft.
#[derive(Debug)]
pub struct DraftDetail {
    pub bill: DraftBillRow,
    pub items: Vec<DraftItemRow>,
}

pub struct DraftWorkflow {
    db: Database,
    oms: Arc<dyn OrderService>,
    matcher: Arc<dyn ItemMatcher>,
    engine: ReconcileEngine,
}

impl DraftWorkflow {
    pub fn new(
        db: Database,
        oms: Arc<dyn OrderService>,
        matcher: Arc<dyn ItemMatcher>,
        engine: ReconcileEngine,
    ) -> Self {
        Self {
            db,
            oms,
            matcher,
            engine,
        }
    }

    /// Confirms the PO number for a bill document and opens a draft session
    /// around a freshly fetched order snapshot.
    ///
    /// The caller may pass the extracted PO number or a corrected one; the
    /// confirmed value is recorded on the document either way.
    pub fn confirm_po(
        &self,
        doc_id: &str,
        user_id: &str,
        po_number: &str,
    ) -> Result<DraftSession, DraftError> {
        let _span = tracing::info_span!("draft.confirm_po", doc_id).entered();

        let doc = doc_repo::find_for_user(&self.db, doc_id, user_id)?
            .ok_or_else(|| DraftError::DocNotFound {
                doc_id: doc_id.to_string(),
            })?;

        if doc.doc_type != DocType::Bill {
            return Err(DraftError::NotEligible {
                doc_id: doc_id.to_string(),
                reason: format!("document is classified as '{}'", doc.doc_type),
            });
        }
        if doc.status != DocStatus::DraftPending {
            return Err(DraftError::NotEligible {
                doc_id: doc_id.to_string(),
                reason: format!("document status is '{}'", doc.status),
            });
        }

        let po_number = po_number.trim();
        if po_number.is_empty() {
            return Err(DraftError::Validation(
                "PO number must not be empty".to_string(),
            ));
        }

        let order = self.oms.fetch_order_by_po(po_number)?;

        let now = chrono::Utc::now().to_rfc3339();
        doc_repo::set_po_number(&self.db, doc_id, po_number, &now)?;
        tracing::info!(po_number, items = order.items.len(), "PO confirmed");

        Ok(DraftSession {
            doc_id: doc.id,
            user_id: doc.user_id,
            job_thread_id: doc.job_thread_id,
            po_number: po_number.to_string(),
            order,
            matched_items: Vec::new(),
        })
    }

    /// Reconciles the document's extracted items against the session's
    /// order snapshot and stores the accepted matches in the session.
    pub fn match_items(&self, session: &mut DraftSession) -> Result<Reconciliation, DraftError> {
        let _span = tracing::info_span!("draft.match_items", doc_id = %session.doc_id).entered();

        let doc = doc_repo::find_for_user(&self.db, &session.doc_id, &session.user_id)?
            .ok_or_else(|| DraftError::DocNotFound {
                doc_id: session.doc_id.clone(),
            })?;

        let bill_items = doc.bill_items()?;
        if bill_items.is_empty() {
            return Err(DraftError::Validation(
                "No line items were extracted from this document".to_string(),
            ));
        }

        let candidates = self.matcher.propose(&bill_items, &session.order.items)?;
        let reconciliation = self
            .engine
            .reconcile(&bill_items, &session.order.items, &candidates);

        session.matched_items = reconciliation.matches.clone();
        Ok(reconciliation)
    }

    /// Validates the caller's selections and persists the draft atomically.
    /// Returns the new draft's id.
    pub fn save_draft(
        &self,
        session: &DraftSession,
        inputs: &[ItemInput],
    ) -> Result<String, DraftError> {
        let _span = tracing::info_span!("draft.save", doc_id = %session.doc_id).entered();

        let errors = reconcile::validate_items(inputs, &session.matched_items);
        if !errors.is_empty() {
            return Err(DraftError::Validation(errors.join("; ")));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let draft_id = Uuid::new_v4().to_string();

        let mut items = Vec::new();
        for input in inputs.iter().filter(|i| i.selected) {
            // Validation guarantees the match exists.
            let Some(matched) = session.matched_items.iter().find(|m| {
                m.bill_index == input.bill_index && m.order_index == input.order_index
            }) else {
                continue;
            };

            let total_rate = reconcile::total_gst_rate(matched.gst_type, input);
            let amount = reconcile::compute_amount(input.quantity, matched.unit_rate, total_rate);

            let (cgst_rate, sgst_rate, igst_rate) = match matched.gst_type {
                Some(GstType::CgstSgst) => (input.cgst_rate, input.sgst_rate, None),
                Some(GstType::Igst) => (None, None, input.gst_rate),
                None => (None, None, None),
            };

            items.push(DraftItemRow {
                id: Uuid::new_v4().to_string(),
                draft_bill_id: draft_id.clone(),
                position: items.len() as u32,
                item_name: matched.item_name.clone(),
                master_item_name: matched.master_item_name.clone(),
                item_code: matched.item_code.clone(),
                hsn: matched.hsn.clone(),
                total_quantity: Some(matched.total_quantity),
                billable_quantity: Some(matched.billable_quantity),
                quantity: input.quantity,
                gst_type: matched.gst_type,
                cgst_rate,
                sgst_rate,
                igst_rate,
                unit: matched.unit.clone(),
                unit_rate: Some(matched.unit_rate),
                amount,
                created_at: now.clone(),
            });
        }

        let bill = DraftBillRow {
            id: draft_id.clone(),
            doc_id: session.doc_id.clone(),
            job_thread_id: session.job_thread_id.clone(),
            user_id: session.user_id.clone(),
            po_number: session.po_number.clone(),
            order_number: session.order.order_number.clone(),
            order_ref: Some(session.order.order_ref.clone()),
            order_snapshot: Some(serde_json::to_string(&session.order)?),
            created_at: now.clone(),
            updated_at: now,
        };

        draft_repo::insert_draft(&self.db, &bill, &items).map_err(|e| match e {
            DraftSaveError::DuplicateDraft { doc_id } => DraftError::DuplicateDraft { doc_id },
            DraftSaveError::Database(e) => DraftError::Database(e),
        })?;

        let total: Decimal = items.iter().map(|i| i.amount).sum();
        tracing::info!(draft_id = %draft_id, items = items.len(), %total, "draft saved");
        Ok(draft_id)
    }

    /// Lists the user's drafts, newest first.
    pub fn list_drafts(&self, user_id: &str) -> Result<Vec<DraftSummary>, DraftError> {
        Ok(draft_repo::summaries(&self.db, user_id)?)
    }

    /// Loads a saved draft with its items by the source document id.
    pub fn draft_detail(&self, doc_id: &str, user_id: &str) -> Result<DraftDetail, DraftError> {
        let bill = draft_repo::find_by_doc(&self.db, doc_id, user_id)?.ok_or_else(|| {
            DraftError::DocNotFound {
                doc_id: doc_id.to_string(),
            }
        })?;
        let items = draft_repo::items_for(&self.db, &bill.id)?;
        Ok(DraftDetail { bill, items })
    }
}
