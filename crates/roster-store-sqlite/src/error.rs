//! Error type for `roster-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("table not found: {0}")]
  MissingTable(String),

  #[error("column {table}.{column} not found")]
  MissingColumn { table: String, column: String },

  /// A drop step found the key it depends on absent.
  #[error("step {step}: key column {key} has not been built")]
  KeyNotBuilt { step: String, key: String },

  /// A drop step found rows whose source text never received a key.
  #[error("step {step}: {rows} row(s) with source text have no {key}")]
  UnmatchedRows { step: String, key: String, rows: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
