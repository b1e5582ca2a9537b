//! Reads and writes of the `pipeline_steps` ledger.

use rusqlite::Connection;

use crate::encode::RawLedgerEntry;

pub fn record(
  conn: &Connection,
  step: &str,
  run_id: &str,
  applied_at: &str,
  rows_affected: u64,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO pipeline_steps (step, run_id, applied_at, rows_affected)
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      step,
      run_id,
      applied_at,
      i64::try_from(rows_affected).unwrap_or(i64::MAX)
    ],
  )?;
  Ok(())
}

pub fn entries(conn: &Connection) -> rusqlite::Result<Vec<RawLedgerEntry>> {
  let mut stmt = conn.prepare(
    "SELECT step, run_id, applied_at, rows_affected FROM pipeline_steps",
  )?;
  stmt
    .query_map([], |row| {
      Ok(RawLedgerEntry {
        step:          row.get(0)?,
        run_id:        row.get(1)?,
        applied_at:    row.get(2)?,
        rows_affected: row.get(3)?,
      })
    })?
    .collect()
}
