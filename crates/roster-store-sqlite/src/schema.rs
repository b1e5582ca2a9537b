//! Ledger DDL and schema introspection helpers.
//!
//! The fact table is supplied by the loader; the only table this crate owns
//! up front is the step ledger. Dimension tables are created by their
//! extraction steps.

use rusqlite::{Connection, OptionalExtension as _};

/// Connection settings plus the step ledger; idempotent.
pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

-- One row per plan step, rewritten each time the step is applied.
CREATE TABLE IF NOT EXISTS pipeline_steps (
    step          TEXT PRIMARY KEY,
    run_id        TEXT NOT NULL,
    applied_at    TEXT NOT NULL,   -- RFC 3339 UTC
    rows_affected INTEGER NOT NULL
);
";

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

/// Declared type of `table.column`, upper-cased; `None` if the column is
/// missing.
pub fn declared_type(
  conn: &Connection,
  table: &str,
  column: &str,
) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT upper(type) FROM pragma_table_info(?1) WHERE name = ?2",
      [table, column],
      |row| row.get(0),
    )
    .optional()
}

pub fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
  Ok(declared_type(conn, table, column)?.is_some())
}

pub fn count(conn: &Connection, sql: &str) -> rusqlite::Result<u64> {
  conn.query_row(sql, [], |row| row.get(0))
}
