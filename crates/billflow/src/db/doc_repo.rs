//! Document repository: per-page records for the `docs` table.
//!
//! Writes are upserts keyed on `(job_thread_id, page_number)`, so re-running
//! a job after a retry overwrites page results instead of duplicating them.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::model::{BillItem, DocStatus, DocType, OcrPayload};

/// A document (page) row from the database.
#[derive(Debug, Clone)]
pub struct DocRow {
    pub id: String,
    pub job_thread_id: String,
    pub user_id: String,
    pub page_number: u32,
    pub doc_type: DocType,
    pub status: DocStatus,
    /// JSON-serialized `OcrPayload` envelope.
    pub ocr_payload: Option<String>,
    pub po_number: Option<String>,
    /// JSON array of extracted `BillItem`s.
    pub items: Option<String>,
    pub storage_uri: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let doc_type_raw: String = row.get("doc_type")?;
        let doc_type = DocType::parse(&doc_type_raw)
            .ok_or_else(|| conversion_error(&format!("unknown doc type '{doc_type_raw}'")))?;
        let status_raw: String = row.get("status")?;
        let status = DocStatus::parse(&status_raw)
            .ok_or_else(|| conversion_error(&format!("unknown doc status '{status_raw}'")))?;
        Ok(Self {
            id: row.get("id")?,
            job_thread_id: row.get("job_thread_id")?,
            user_id: row.get("user_id")?,
            page_number: row.get("page_number")?,
            doc_type,
            status,
            ocr_payload: row.get("ocr_payload")?,
            po_number: row.get("po_number")?,
            items: row.get("items")?,
            storage_uri: row.get("storage_uri")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Parses the stored extraction payload envelope, if any.
    pub fn payload(&self) -> Result<Option<OcrPayload>, serde_json::Error> {
        self.ocr_payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
    }

    /// Parses the stored bill item list, if any.
    pub fn bill_items(&self) -> Result<Vec<BillItem>, serde_json::Error> {
        match self.items.as_deref() {
            Some(json) => serde_json::from_str(json),
            None => Ok(Vec::new()),
        }
    }
}

fn conversion_error(message: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.to_string().into(),
    )
}

/// Inserts or overwrites the document for `(job_thread_id, page_number)`.
///
/// On conflict the existing row keeps its `id` and `created_at`; everything
/// else is replaced by the new processing result.
pub fn upsert(db: &Database, doc: &DocRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO docs (id, job_thread_id, user_id, page_number, doc_type, status,
             ocr_payload, po_number, items, storage_uri, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT (job_thread_id, page_number) DO UPDATE SET
                doc_type = excluded.doc_type,
                status = excluded.status,
                ocr_payload = excluded.ocr_payload,
                po_number = excluded.po_number,
                items = excluded.items,
                storage_uri = excluded.storage_uri,
                updated_at = excluded.updated_at",
            params![
                doc.id,
                doc.job_thread_id,
                doc.user_id,
                doc.page_number,
                doc.doc_type.as_str(),
                doc.status.as_str(),
                doc.ocr_payload,
                doc.po_number,
                doc.items,
                doc.storage_uri,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM docs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DocRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a document by ID scoped to a user.
pub fn find_for_user(
    db: &Database,
    id: &str,
    user_id: &str,
) -> Result<Option<DocRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM docs WHERE id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![id, user_id], DocRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all documents for a job, in page order.
pub fn list_by_job(db: &Database, job_thread_id: &str) -> Result<Vec<DocRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM docs WHERE job_thread_id = ?1 ORDER BY page_number")?;
        let rows: Vec<DocRow> = stmt
            .query_map(params![job_thread_id], DocRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Updates only the status of a document.
pub fn update_status(
    db: &Database,
    id: &str,
    status: DocStatus,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE docs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at],
        )?;
        Ok(())
    })
}

/// Records the confirmed PO number on a document.
pub fn set_po_number(
    db: &Database,
    id: &str,
    po_number: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE docs SET po_number = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, po_number, updated_at],
        )?;
        Ok(())
    })
}
