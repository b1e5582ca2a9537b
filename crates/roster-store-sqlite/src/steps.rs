//! Dispatch of one plan step inside an open transaction.

use chrono::NaiveDate;
use roster_core::{
  dimension::{Dimension, FACT_TABLE},
  plan::{RunOptions, Step},
};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{
  Error, cleaner,
  normalizer::{self, category},
  schema::{count, has_column},
};

/// Values shared by every step of one run.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
  pub options:        RunOptions,
  /// Latest birthdate meeting the minimum working age as of `options.as_of`.
  pub eligible_until: NaiveDate,
}

/// Result of running a step's body. A blocked step must not be committed.
#[derive(Debug)]
pub enum Outcome {
  Done(u64),
  Blocked(Blocker),
}

#[derive(Debug)]
pub enum Blocker {
  KeyNotBuilt { key: String },
  Unmatched { key: String, rows: u64 },
}

impl Blocker {
  pub fn into_error(self, step: String) -> Error {
    match self {
      Blocker::KeyNotBuilt { key } => Error::KeyNotBuilt { step, key },
      Blocker::Unmatched { key, rows } => Error::UnmatchedRows { step, key, rows },
    }
  }
}

pub fn apply(conn: &Connection, step: &Step, ctx: &StepContext) -> rusqlite::Result<Outcome> {
  let rows = match step {
    Step::RetypeDate(column) => cleaner::retype_date(conn, *column)?,
    Step::DeriveAge => cleaner::derive_age(conn, ctx.options.as_of)?,
    Step::NullUnderageBirthdates => {
      cleaner::null_underage_birthdates(conn, ctx.eligible_until)?
    }
    Step::SentinelLateTermdates => {
      cleaner::sentinel_late_termdates(conn, ctx.options.termdate_sentinel)?
    }
    Step::Extract(dimension) => normalizer::extract(conn, dimension)?,
    Step::DropSource { column, dimension } => {
      return drop_source(conn, column, dimension);
    }
  };
  Ok(Outcome::Done(rows))
}

/// Drop a source text column once every row with text in all of
/// `dimension`'s source columns carries its key.
///
/// The check runs while all source columns still exist. After the first of
/// them is dropped, the remaining rows can no longer be told apart, so the
/// later drops rely on that first check; keys are not rewritten in between.
///
/// Returns the number of non-null values discarded.
fn drop_source(
  conn: &Connection,
  column: &str,
  dimension: &Dimension,
) -> rusqlite::Result<Outcome> {
  if !has_column(conn, FACT_TABLE, column)? {
    info!(column, "source column already dropped");
    return Ok(Outcome::Done(0));
  }

  let key = match dimension.fact_key {
    Some(key) if has_column(conn, FACT_TABLE, key)? => key,
    key => {
      return Ok(Outcome::Blocked(Blocker::KeyNotBuilt {
        key: key.unwrap_or(dimension.table).to_owned(),
      }));
    }
  };

  let sources = dimension.source_columns();
  let mut dropped = Vec::new();
  for source in &sources {
    if !has_column(conn, FACT_TABLE, source)? {
      dropped.push(*source);
    }
  }

  if dropped.is_empty() {
    let sourced = sources
      .iter()
      .map(|source| format!("{} IS NOT NULL", category(source)))
      .collect::<Vec<_>>()
      .join(" AND ");
    let unmatched = count(
      conn,
      &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE {sourced} AND {key} IS NULL"),
    )?;
    if unmatched > 0 {
      return Ok(Outcome::Blocked(Blocker::Unmatched {
        key:  key.to_owned(),
        rows: unmatched,
      }));
    }
  } else {
    debug!(column, key, ?dropped, "backfill checked by an earlier drop");
  }

  let discarded = count(
    conn,
    &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE {column} IS NOT NULL"),
  )?;
  conn.execute_batch(&format!("ALTER TABLE {FACT_TABLE} DROP COLUMN {column}"))?;
  info!(column, key, "source column dropped");
  Ok(Outcome::Done(discarded))
}
