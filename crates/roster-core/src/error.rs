//! Error types for `roster-core`.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A ledger row names a step that is not part of the plan.
  #[error("unknown pipeline step: {0:?}")]
  UnknownStep(String),

  #[error("cannot subtract {years} years from {from}")]
  DateOutOfRange { from: NaiveDate, years: u32 },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
