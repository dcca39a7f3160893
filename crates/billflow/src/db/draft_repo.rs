//! Draft bill repository: atomic persistence for `draft_bills` and
//! `draft_bill_items`.
//!
//! A draft and its items are written in one transaction together with the
//! source document's status flip; either everything lands or nothing does.
//! `draft_bills.doc_id` is UNIQUE, so a document can back at most one draft.

use rusqlite::{params, Row};
use rust_decimal::Decimal;
use thiserror::Error;

use super::{Database, DatabaseError};
use crate::model::{DocStatus, GstType};

/// A draft bill header row.
#[derive(Debug, Clone)]
pub struct DraftBillRow {
    pub id: String,
    pub doc_id: String,
    pub job_thread_id: String,
    pub user_id: String,
    pub po_number: String,
    pub order_number: Option<String>,
    pub order_ref: Option<String>,
    /// JSON-serialized `OrderSnapshot` captured at save time.
    pub order_snapshot: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DraftBillRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            doc_id: row.get("doc_id")?,
            job_thread_id: row.get("job_thread_id")?,
            user_id: row.get("user_id")?,
            po_number: row.get("po_number")?,
            order_number: row.get("order_number")?,
            order_ref: row.get("order_ref")?,
            order_snapshot: row.get("order_snapshot")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// One line on a draft bill.
#[derive(Debug, Clone)]
pub struct DraftItemRow {
    pub id: String,
    pub draft_bill_id: String,
    /// Line position, preserving the bill's extraction order.
    pub position: u32,
    pub item_name: String,
    pub master_item_name: Option<String>,
    pub item_code: Option<String>,
    pub hsn: Option<String>,
    pub total_quantity: Option<Decimal>,
    pub billable_quantity: Option<Decimal>,
    pub quantity: Decimal,
    pub gst_type: Option<GstType>,
    pub cgst_rate: Option<Decimal>,
    pub sgst_rate: Option<Decimal>,
    pub igst_rate: Option<Decimal>,
    pub unit: Option<String>,
    pub unit_rate: Option<Decimal>,
    pub amount: Decimal,
    pub created_at: String,
}

impl DraftItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let gst_type = match row.get::<_, Option<String>>("gst_type")? {
            Some(raw) => Some(
                GstType::parse(&raw)
                    .ok_or_else(|| conversion_error(&format!("unknown gst type '{raw}'")))?,
            ),
            None => None,
        };
        Ok(Self {
            id: row.get("id")?,
            draft_bill_id: row.get("draft_bill_id")?,
            position: row.get("position")?,
            item_name: row.get("item_name")?,
            master_item_name: row.get("master_item_name")?,
            item_code: row.get("item_code")?,
            hsn: row.get("hsn")?,
            total_quantity: opt_decimal(row, "total_quantity")?,
            billable_quantity: opt_decimal(row, "billable_quantity")?,
            quantity: decimal(row, "quantity")?,
            gst_type,
            cgst_rate: opt_decimal(row, "cgst_rate")?,
            sgst_rate: opt_decimal(row, "sgst_rate")?,
            igst_rate: opt_decimal(row, "igst_rate")?,
            unit: row.get("unit")?,
            unit_rate: opt_decimal(row, "unit_rate")?,
            amount: decimal(row, "amount")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Compact listing entry for a user's drafts.
#[derive(Debug, Clone)]
pub struct DraftSummary {
    pub id: String,
    pub doc_id: String,
    pub po_number: String,
    pub order_number: Option<String>,
    pub item_count: u32,
    pub total_amount: Decimal,
    pub created_at: String,
}

/// The atomic draft save did not go through.
#[derive(Error, Debug)]
pub enum DraftSaveError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("A draft already exists for document '{doc_id}'")]
    DuplicateDraft { doc_id: String },
}

fn conversion_error(message: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.to_string().into(),
    )
}

fn decimal(row: &Row<'_>, column: &str) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|_| conversion_error(&format!("invalid decimal '{raw}' in column {column}")))
}

fn opt_decimal(row: &Row<'_>, column: &str) -> Result<Option<Decimal>, rusqlite::Error> {
    match row.get::<_, Option<String>>(column)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| conversion_error(&format!("invalid decimal '{raw}' in column {column}"))),
        None => Ok(None),
    }
}

fn decimal_text(value: &Decimal) -> String {
    value.to_string()
}

fn opt_decimal_text(value: &Option<Decimal>) -> Option<String> {
    value.as_ref().map(Decimal::to_string)
}

/// Inserts a draft bill with its items and flips the source document to
/// `draft_created`, all inside one transaction.
///
/// The duplicate check runs inside the transaction; since all access goes
/// through the single serialized connection, no second saver can slip in
/// between the check and the insert.
pub fn insert_draft(
    db: &Database,
    bill: &DraftBillRow,
    items: &[DraftItemRow],
) -> Result<(), DraftSaveError> {
    let inserted = db.with_tx(|tx| {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM draft_bills WHERE doc_id = ?1)",
            params![bill.doc_id],
            |r| r.get(0),
        )?;
        if exists {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO draft_bills (id, doc_id, job_thread_id, user_id, po_number,
             order_number, order_ref, order_snapshot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                bill.id,
                bill.doc_id,
                bill.job_thread_id,
                bill.user_id,
                bill.po_number,
                bill.order_number,
                bill.order_ref,
                bill.order_snapshot,
                bill.created_at,
                bill.updated_at,
            ],
        )?;

        for item in items {
            tx.execute(
                "INSERT INTO draft_bill_items (id, draft_bill_id, position, item_name,
                 master_item_name, item_code, hsn, total_quantity, billable_quantity,
                 quantity, gst_type, cgst_rate, sgst_rate, igst_rate, unit, unit_rate,
                 amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, ?18)",
                params![
                    item.id,
                    item.draft_bill_id,
                    item.position,
                    item.item_name,
                    item.master_item_name,
                    item.item_code,
                    item.hsn,
                    opt_decimal_text(&item.total_quantity),
                    opt_decimal_text(&item.billable_quantity),
                    decimal_text(&item.quantity),
                    item.gst_type.map(|g| g.as_str()),
                    opt_decimal_text(&item.cgst_rate),
                    opt_decimal_text(&item.sgst_rate),
                    opt_decimal_text(&item.igst_rate),
                    item.unit,
                    opt_decimal_text(&item.unit_rate),
                    decimal_text(&item.amount),
                    item.created_at,
                ],
            )?;
        }

        tx.execute(
            "UPDATE docs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![bill.doc_id, DocStatus::DraftCreated.as_str(), bill.updated_at],
        )?;

        Ok(true)
    })?;

    if !inserted {
        return Err(DraftSaveError::DuplicateDraft {
            doc_id: bill.doc_id.clone(),
        });
    }
    Ok(())
}

/// Finds the draft backed by a document, scoped to a user.
pub fn find_by_doc(
    db: &Database,
    doc_id: &str,
    user_id: &str,
) -> Result<Option<DraftBillRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM draft_bills WHERE doc_id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![doc_id, user_id], DraftBillRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists a draft's items in line order.
pub fn items_for(db: &Database, draft_bill_id: &str) -> Result<Vec<DraftItemRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM draft_bill_items WHERE draft_bill_id = ?1 ORDER BY position")?;
        let rows: Vec<DraftItemRow> = stmt
            .query_map(params![draft_bill_id], DraftItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists a user's drafts, newest first, with item counts and totals.
pub fn summaries(db: &Database, user_id: &str) -> Result<Vec<DraftSummary>, DatabaseError> {
    let bills = db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM draft_bills WHERE user_id = ?1 ORDER BY created_at DESC")?;
        let rows: Vec<DraftBillRow> = stmt
            .query_map(params![user_id], DraftBillRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let mut result = Vec::with_capacity(bills.len());
    for bill in bills {
        let items = items_for(db, &bill.id)?;
        let total_amount = items.iter().map(|i| i.amount).sum();
        result.push(DraftSummary {
            id: bill.id,
            doc_id: bill.doc_id,
            po_number: bill.po_number,
            order_number: bill.order_number,
            item_count: items.len() as u32,
            total_amount,
            created_at: bill.created_at,
        });
    }
    Ok(result)
}
