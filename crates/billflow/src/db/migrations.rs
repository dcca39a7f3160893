//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_job_threads_table",
        sql: include_str!("sql/001_create_job_threads.sql"),
    },
    Migration {
        version: 2,
        description: "create_docs_table",
        sql: include_str!("sql/002_create_docs.sql"),
    },
    Migration {
        version: 3,
        description: "create_draft_bills_table",
        sql: include_str!("sql/003_create_draft_bills.sql"),
    },
    Migration {
        version: 4,
        description: "create_draft_bill_items_table",
        sql: include_str!("sql/004_create_draft_bill_items.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    // Create the migrations tracking table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        // Running again should be a no-op.
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_docs_page_unique_per_job() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO job_threads (id, user_id, file_name, original_size, status, created_at, updated_at)
             VALUES ('j1', 'u1', 'f.pdf', 10, 'in_queue', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO docs (id, job_thread_id, user_id, page_number, doc_type, status, created_at, updated_at)
             VALUES ('d1', 'j1', 'u1', 1, 'bill', 'draft_pending', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO docs (id, job_thread_id, user_id, page_number, doc_type, status, created_at, updated_at)
             VALUES ('d2', 'j1', 'u1', 1, 'bill', 'draft_pending', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_draft_bills_doc_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO job_threads (id, user_id, file_name, original_size, status, created_at, updated_at)
             VALUES ('j1', 'u1', 'f.pdf', 10, 'processed', '2026-01-01', '2026-01-01');
             INSERT INTO docs (id, job_thread_id, user_id, page_number, doc_type, status, created_at, updated_at)
             VALUES ('d1', 'j1', 'u1', 1, 'bill', 'draft_pending', '2026-01-01', '2026-01-01');
             INSERT INTO draft_bills (id, doc_id, job_thread_id, user_id, po_number, created_at, updated_at)
             VALUES ('b1', 'd1', 'j1', 'u1', 'PO-1001', '2026-01-01', '2026-01-01');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO draft_bills (id, doc_id, job_thread_id, user_id, po_number, created_at, updated_at)
             VALUES ('b2', 'd1', 'j1', 'u1', 'PO-1001', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(dup.is_err());
    }
}
