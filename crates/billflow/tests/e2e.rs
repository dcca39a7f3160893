//! End-to-end tests: upload intake through the processing pipeline and on
//! to the draft workflow, with stubbed external services.

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use billflow::config::{IntakeConfig, MatchConfig};
use billflow::db::{doc_repo, job_repo, Database};
use billflow::draft::{DraftError, DraftWorkflow};
use billflow::pipeline::JobPipeline;
use billflow::reconcile::{LexicalMatcher, ReconcileEngine};
use billflow::storage::{FileStorage, StorageGateway};
use billflow::{intake, DocStatus, DocType, GstType, ItemInput, JobStatus};

use common::{igst_order_item, make_pdf, order_snapshot, reasoning_config, StubOrders, StubReasoning};

fn bill_payload() -> serde_json::Value {
    json!({
        "po_number": "PO-2041",
        "supplier": "Acme Traders",
        "items": [
            {"name": "Cement OPC 53", "hsnCode": "2523", "quantity": "10", "rate": "100.00"}
        ]
    })
}

struct TestEnv {
    db: Database,
    storage: Arc<dyn StorageGateway>,
    _dir: tempfile::TempDir,
}

impl TestEnv {
    fn new() -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn StorageGateway> = Arc::new(FileStorage::new(dir.path()));
        Self {
            db,
            storage,
            _dir: dir,
        }
    }

    fn pipeline(&self, reasoning: StubReasoning) -> JobPipeline {
        JobPipeline::new(
            self.db.clone(),
            self.storage.clone(),
            Arc::new(reasoning),
            reasoning_config(),
        )
    }

    fn submit(&self, file_name: &str, bytes: &[u8]) -> String {
        intake::submit(
            &self.db,
            &self.storage,
            &IntakeConfig::default(),
            "user-1",
            file_name,
            bytes,
        )
        .unwrap()
        .job_id
    }

    fn workflow(&self) -> DraftWorkflow {
        let snapshot = order_snapshot(vec![igst_order_item("Cement OPC 53", "2523", 100, 18)]);
        DraftWorkflow::new(
            self.db.clone(),
            Arc::new(StubOrders::new(snapshot)),
            Arc::new(LexicalMatcher::new(0.40)),
            ReconcileEngine::new(MatchConfig::default()),
        )
    }
}

#[test]
fn multipage_pdf_produces_one_doc_per_page() {
    let env = TestEnv::new();
    let job_id = env.submit("invoice.pdf", &make_pdf(2));

    let reasoning = StubReasoning::new(
        vec![Ok(DocType::Bill), Ok(DocType::EwayBill)],
        bill_payload(),
    );
    env.pipeline(reasoning).process_job(&job_id).unwrap();

    let job = job_repo::find_by_id(&env.db, &job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processed);
    assert!(job.error_message.is_none());
    assert!(job.completed_at.is_some());

    let docs = doc_repo::list_by_job(&env.db, &job_id).unwrap();
    assert_eq!(docs.len(), 2);

    let bill = &docs[0];
    assert_eq!(bill.page_number, 1);
    assert_eq!(bill.doc_type, DocType::Bill);
    assert_eq!(bill.status, DocStatus::DraftPending);
    assert_eq!(bill.po_number.as_deref(), Some("PO-2041"));
    let items = bill.bill_items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name.as_deref(), Some("Cement OPC 53"));
    assert_eq!(items[0].quantity, Some(Decimal::from(10)));

    let eway = &docs[1];
    assert_eq!(eway.doc_type, DocType::EwayBill);
    assert_eq!(eway.status, DocStatus::Unknown);
    assert!(eway.bill_items().unwrap().is_empty());
    assert!(eway.payload().unwrap().is_some());
}

#[test]
fn unknown_page_is_contained_not_fatal() {
    let env = TestEnv::new();
    let job_id = env.submit("invoice.pdf", &make_pdf(2));

    let reasoning = StubReasoning::new(
        vec![Ok(DocType::Bill), Ok(DocType::Unknown)],
        bill_payload(),
    );
    env.pipeline(reasoning).process_job(&job_id).unwrap();

    let job = job_repo::find_by_id(&env.db, &job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processed);
    let note = job.error_message.unwrap();
    assert!(note.contains("page 2"), "unexpected note: {note}");

    let docs = doc_repo::list_by_job(&env.db, &job_id).unwrap();
    assert_eq!(docs[1].doc_type, DocType::Unknown);
    assert_eq!(docs[1].status, DocStatus::Unknown);
    // The page blob is still stored for audit.
    let uri = docs[1].storage_uri.clone().unwrap();
    assert!(!env.storage.fetch(&uri).unwrap().is_empty());
}

#[test]
fn upstream_failure_fails_job_and_retry_reruns_cleanly() {
    let env = TestEnv::new();
    let job_id = env.submit("invoice.pdf", &make_pdf(1));

    let broken = StubReasoning::new(vec![Err("service down".to_string())], bill_payload());
    assert!(env.pipeline(broken).process_job(&job_id).is_err());

    let job = job_repo::find_by_id(&env.db, &job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.unwrap().contains("service down"));
    assert!(job.failed_at.is_some());

    job_repo::retry(&env.db, &job_id, "2026-08-30T10:00:00Z").unwrap();

    let working = StubReasoning::new(vec![Ok(DocType::Bill)], bill_payload());
    env.pipeline(working).process_job(&job_id).unwrap();

    let job = job_repo::find_by_id(&env.db, &job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processed);
    assert!(job.error_message.is_none());

    // The re-run upserted the page, no duplicate rows.
    let docs = doc_repo::list_by_job(&env.db, &job_id).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].doc_type, DocType::Bill);
}

#[test]
fn draft_flow_from_upload_to_saved_draft() {
    let env = TestEnv::new();
    let job_id = env.submit("invoice.pdf", &make_pdf(1));

    let reasoning = StubReasoning::new(vec![Ok(DocType::Bill)], bill_payload());
    env.pipeline(reasoning).process_job(&job_id).unwrap();

    let docs = doc_repo::list_by_job(&env.db, &job_id).unwrap();
    let doc_id = docs[0].id.clone();

    let workflow = env.workflow();
    let mut session = workflow.confirm_po(&doc_id, "user-1", "PO-2041").unwrap();
    assert_eq!(session.order.order_number.as_deref(), Some("ORD-2041"));

    let reconciliation = workflow.match_items(&mut session).unwrap();
    assert_eq!(reconciliation.matches.len(), 1);
    assert!(reconciliation.unmatched.is_empty());
    let matched = &reconciliation.matches[0];
    assert_eq!(matched.gst_type, Some(GstType::Igst));
    assert_eq!(matched.billable_quantity, Decimal::from(100));

    let input = ItemInput {
        bill_index: matched.bill_index,
        order_index: matched.order_index,
        selected: true,
        quantity: Decimal::from(10),
        gst_rate: Some(Decimal::from(18)),
        cgst_rate: None,
        sgst_rate: None,
    };
    workflow.save_draft(&session, &[input.clone()]).unwrap();

    let detail = workflow.draft_detail(&doc_id, "user-1").unwrap();
    assert_eq!(detail.bill.po_number, "PO-2041");
    assert_eq!(detail.items.len(), 1);
    // 10 x 100.00 at 18% IGST.
    assert_eq!(detail.items[0].amount, "1180.00".parse::<Decimal>().unwrap());
    assert_eq!(detail.items[0].igst_rate, Some(Decimal::from(18)));
    assert_eq!(detail.items[0].cgst_rate, None);

    let doc = doc_repo::find_by_id(&env.db, &doc_id).unwrap().unwrap();
    assert_eq!(doc.status, DocStatus::DraftCreated);

    // A second save for the same document is rejected and changes nothing.
    assert!(matches!(
        workflow.save_draft(&session, &[input]),
        Err(DraftError::DuplicateDraft { .. })
    ));
    let drafts = workflow.list_drafts("user-1").unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(
        drafts[0].total_amount,
        "1180.00".parse::<Decimal>().unwrap()
    );
}

#[test]
fn unmatched_bill_items_are_reported_not_guessed() {
    let env = TestEnv::new();
    let job_id = env.submit("invoice.pdf", &make_pdf(1));

    let payload = json!({
        "po_number": "PO-2041",
        "items": [
            {"name": "Cement OPC 53", "hsnCode": "2523", "quantity": "10", "rate": "100.00"},
            {"name": "Diesel 500L", "hsnCode": "2710", "quantity": "2", "rate": "90.00"}
        ]
    });
    let reasoning = StubReasoning::new(vec![Ok(DocType::Bill)], payload);
    env.pipeline(reasoning).process_job(&job_id).unwrap();

    let docs = doc_repo::list_by_job(&env.db, &job_id).unwrap();
    let doc_id = docs[0].id.clone();

    let workflow = env.workflow();
    let mut session = workflow.confirm_po(&doc_id, "user-1", "PO-2041").unwrap();
    let reconciliation = workflow.match_items(&mut session).unwrap();

    assert_eq!(reconciliation.matches.len(), 1);
    assert_eq!(reconciliation.unmatched.len(), 1);
    assert_eq!(
        reconciliation.unmatched[0].bill_item.name.as_deref(),
        Some("Diesel 500L")
    );
    assert_eq!(
        reconciliation.validation_errors,
        vec!["1 bill item(s) could not be matched to order items"]
    );

    // Selecting the unmatched pair anyway is a validation failure.
    let bogus = ItemInput {
        bill_index: 1,
        order_index: 0,
        selected: true,
        quantity: Decimal::ONE,
        gst_rate: Some(Decimal::from(18)),
        cgst_rate: None,
        sgst_rate: None,
    };
    assert!(matches!(
        workflow.save_draft(&session, &[bogus]),
        Err(DraftError::Validation(_))
    ));
}
