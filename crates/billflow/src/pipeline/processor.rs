//! Per-page processing: store, classify, extract, persist.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::ReasoningConfig;
use crate::db::{doc_repo, Database};
use crate::extract;
use crate::model::{DocStatus, DocType, OcrPayload};
use crate::pages::Page;
use crate::reasoning::{ReasoningClient, ReasoningError};
use crate::storage::StorageGateway;

use super::PipelineError;

/// Result of processing one page. A `note` means a contained problem: the
/// page is recorded as unknown but the job goes on.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page_number: u32,
    pub doc_type: DocType,
    pub note: Option<String>,
}

pub struct PageProcessor {
    db: Database,
    storage: Arc<dyn StorageGateway>,
    reasoning: Arc<dyn ReasoningClient>,
    config: ReasoningConfig,
}

impl PageProcessor {
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageGateway>,
        reasoning: Arc<dyn ReasoningClient>,
        config: ReasoningConfig,
    ) -> Self {
        Self {
            db,
            storage,
            reasoning,
            config,
        }
    }

    /// Stores the page blob, classifies it, runs extraction, and upserts the
    /// document row. The upsert key is `(job, page)`, so a retried job
    /// overwrites its earlier page results.
    pub fn process_page(
        &self,
        job_id: &str,
        user_id: &str,
        page: &Page,
    ) -> Result<PageOutcome, PipelineError> {
        let _span =
            tracing::info_span!("pipeline.page", job_id, page = page.number).entered();

        let storage_uri =
            self.storage
                .store_page(job_id, page.number, page.extension, &page.bytes)?;

        let doc_type = self.reasoning.classify_page(
            &page.bytes,
            page.extension,
            &self.config.classification,
        )?;

        if doc_type == DocType::Unknown {
            let note = format!("page {}: could not classify document type", page.number);
            self.persist_unknown(job_id, user_id, page, &storage_uri)?;
            return Ok(PageOutcome {
                page_number: page.number,
                doc_type,
                note: Some(note),
            });
        }

        let prompt = self.config.extraction_for(doc_type);
        let data = match self
            .reasoning
            .extract_page(&page.bytes, page.extension, doc_type, &prompt)
        {
            Ok(data) => data,
            // Unusable output is a property of this page, not of the
            // pipeline; contain it and move on.
            Err(ReasoningError::MalformedOutput(reason)) => {
                tracing::warn!(page = page.number, %reason, "extraction output unusable");
                let note = format!("page {}: extraction output unusable", page.number);
                self.persist_unknown(job_id, user_id, page, &storage_uri)?;
                return Ok(PageOutcome {
                    page_number: page.number,
                    doc_type: DocType::Unknown,
                    note: Some(note),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let payload = match OcrPayload::new(doc_type, data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(page = page.number, error = %e, "extraction payload rejected");
                let note = format!("page {}: extraction output unusable", page.number);
                self.persist_unknown(job_id, user_id, page, &storage_uri)?;
                return Ok(PageOutcome {
                    page_number: page.number,
                    doc_type: DocType::Unknown,
                    note: Some(note),
                });
            }
        };

        let po_number = extract::extract_po_number(&payload.data);
        let (items, status) = match doc_type {
            DocType::Bill => {
                let items = extract::extract_bill_items(&payload.data);
                (Some(serde_json::to_string(&items)?), DocStatus::DraftPending)
            }
            _ => (None, DocStatus::Unknown),
        };

        let now = chrono::Utc::now().to_rfc3339();
        doc_repo::upsert(
            &self.db,
            &doc_repo::DocRow {
                id: Uuid::new_v4().to_string(),
                job_thread_id: job_id.to_string(),
                user_id: user_id.to_string(),
                page_number: page.number,
                doc_type,
                status,
                ocr_payload: Some(serde_json::to_string(&payload)?),
                po_number,
                items,
                storage_uri: Some(storage_uri),
                created_at: now.clone(),
                updated_at: now,
            },
        )?;

        Ok(PageOutcome {
            page_number: page.number,
            doc_type,
            note: None,
        })
    }

    /// Records a page whose content could not be understood. The blob and
    /// the row survive so the page stays auditable.
    fn persist_unknown(
        &self,
        job_id: &str,
        user_id: &str,
        page: &Page,
        storage_uri: &str,
    ) -> Result<(), PipelineError> {
        let now = chrono::Utc::now().to_rfc3339();
        doc_repo::upsert(
            &self.db,
            &doc_repo::DocRow {
                id: Uuid::new_v4().to_string(),
                job_thread_id: job_id.to_string(),
                user_id: user_id.to_string(),
                page_number: page.number,
                doc_type: DocType::Unknown,
                status: DocStatus::Unknown,
                ocr_payload: None,
                po_number: None,
                items: None,
                storage_uri: Some(storage_uri.to_string()),
                created_at: now.clone(),
                updated_at: now,
            },
        )?;
        Ok(())
    }
}
