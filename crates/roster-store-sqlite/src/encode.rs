//! Conversions between SQLite values and the plain-text representations the
//! pipeline works with.
//!
//! Ledger timestamps are stored as RFC 3339 strings and run IDs as hyphenated
//! lowercase UUIDs. Raw fact columns may hold any storage class; they are read
//! through [`text_value`].

use chrono::{DateTime, Utc};
use roster_core::{plan::Step, report::StepStatus};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw column values ───────────────────────────────────────────────────────

/// The textual form of a cell, or `None` for NULL and blobs.
pub fn text_value(value: Value) -> Option<String> {
  match value {
    Value::Text(s) => Some(s),
    Value::Integer(i) => Some(i.to_string()),
    Value::Real(f) => Some(f.to_string()),
    Value::Null | Value::Blob(_) => None,
  }
}

// ─── Ledger rows ─────────────────────────────────────────────────────────────

/// A `pipeline_steps` row as stored.
pub struct RawLedgerEntry {
  pub step:          String,
  pub run_id:        String,
  pub applied_at:    String,
  pub rows_affected: i64,
}

impl RawLedgerEntry {
  pub fn into_status(self, step: &Step) -> Result<StepStatus> {
    Ok(StepStatus {
      step:          self.step,
      repeatable:    step.is_repeatable(),
      applied_at:    Some(decode_dt(&self.applied_at)?),
      run_id:        Some(decode_uuid(&self.run_id)?),
      rows_affected: u64::try_from(self.rows_affected).ok(),
    })
  }
}

/// Status of a plan step that has never been applied.
pub fn pending_status(step: &Step) -> StepStatus {
  StepStatus {
    step:          step.name().into_owned(),
    repeatable:    step.is_repeatable(),
    applied_at:    None,
    run_id:        None,
    rows_affected: None,
  }
}
