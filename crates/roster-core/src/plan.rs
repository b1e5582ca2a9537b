//! The ordered migration plan.
//!
//! Every transformation of the `employees` table is a named [`Step`]. Steps
//! run strictly in [`PLAN`] order, each inside its own transaction. Schema
//! steps are recorded in a ledger once applied and skipped on later runs;
//! repeatable steps (the derived age and the outlier corrections) run on
//! every pass because they depend on the processing date.

use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  dimension::{
    CITIES, DEPARTMENTS, Dimension, ETHNICITIES, GENDERS, JOBTITLES, LOCATIONS,
    STATES,
  },
};

// ─── Date columns ────────────────────────────────────────────────────────────

/// A raw date column and the way its text is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateColumn {
  Birthdate,
  HireDate,
  /// UTC timestamps, present only for employees who left.
  Termdate,
}

impl DateColumn {
  pub fn column(self) -> &'static str {
    match self {
      DateColumn::Birthdate => "birthdate",
      DateColumn::HireDate => "hire_date",
      DateColumn::Termdate => "termdate",
    }
  }

  /// Whether values use a delimited layout that must be discovered first.
  pub fn is_delimited(self) -> bool {
    !matches!(self, DateColumn::Termdate)
  }
}

// ─── Steps ───────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum Step {
  /// Parse a text column and replace it with a `DATE` column.
  RetypeDate(DateColumn),
  /// Add (if missing) and recompute `age` from `birthdate`.
  DeriveAge,
  /// Null `birthdate` and `age` below the minimum working age.
  NullUnderageBirthdates,
  /// Replace `termdate` values at or after the latest hire date with the
  /// sentinel.
  SentinelLateTermdates,
  /// Build a dimension table and backfill its fact-table key.
  Extract(&'static Dimension),
  /// Drop a source text column once `dimension`'s key is fully backfilled.
  DropSource {
    column:    &'static str,
    dimension: &'static Dimension,
  },
}

impl Step {
  /// Stable ledger name, e.g. `retype-birthdate` or `extract-cities`.
  pub fn name(&self) -> Cow<'static, str> {
    match self {
      Step::RetypeDate(column) => {
        Cow::Owned(format!("retype-{}", column.column().replace('_', "-")))
      }
      Step::DeriveAge => Cow::Borrowed("derive-age"),
      Step::NullUnderageBirthdates => Cow::Borrowed("null-underage-birthdates"),
      Step::SentinelLateTermdates => Cow::Borrowed("sentinel-late-termdates"),
      Step::Extract(dimension) => Cow::Owned(format!("extract-{}", dimension.table)),
      Step::DropSource { column, .. } => {
        Cow::Owned(format!("drop-{}", column.replace('_', "-")))
      }
    }
  }

  /// Repeatable steps run on every pass; the rest run once.
  pub fn is_repeatable(&self) -> bool {
    matches!(
      self,
      Step::DeriveAge | Step::NullUnderageBirthdates | Step::SentinelLateTermdates
    )
  }

  /// Whether the step changes the fact table's columns irreversibly.
  pub fn is_destructive(&self) -> bool { matches!(self, Step::DropSource { .. }) }

  /// Fact columns that must exist before the step can run.
  pub fn required_columns(&self) -> Vec<&'static str> {
    match self {
      Step::RetypeDate(column) => vec![column.column()],
      Step::DeriveAge | Step::NullUnderageBirthdates => vec!["birthdate"],
      Step::SentinelLateTermdates => vec!["termdate", "hire_date"],
      Step::Extract(dimension) => dimension.source_columns(),
      // A missing column means it was already dropped.
      Step::DropSource { .. } => Vec::new(),
    }
  }

  /// Look up a plan step by its ledger name.
  pub fn by_name(name: &str) -> Result<&'static Step> {
    PLAN
      .iter()
      .find(|step| step.name() == name)
      .ok_or_else(|| Error::UnknownStep(name.to_owned()))
  }
}

/// The full pipeline: cleaner first, then the normalizer, then the drops.
///
/// A source column is dropped only after every dimension reading it has been
/// extracted, so the drops come last, children before parents.
pub const PLAN: &[Step] = &[
  Step::RetypeDate(DateColumn::Birthdate),
  Step::RetypeDate(DateColumn::HireDate),
  Step::RetypeDate(DateColumn::Termdate),
  Step::DeriveAge,
  Step::NullUnderageBirthdates,
  Step::SentinelLateTermdates,
  Step::Extract(&ETHNICITIES),
  Step::Extract(&GENDERS),
  Step::Extract(&LOCATIONS),
  Step::Extract(&DEPARTMENTS),
  Step::Extract(&JOBTITLES),
  Step::Extract(&STATES),
  Step::Extract(&CITIES),
  Step::DropSource { column: "race", dimension: &ETHNICITIES },
  Step::DropSource { column: "gender", dimension: &GENDERS },
  Step::DropSource { column: "location", dimension: &LOCATIONS },
  Step::DropSource { column: "jobtitle", dimension: &JOBTITLES },
  Step::DropSource { column: "department", dimension: &JOBTITLES },
  Step::DropSource { column: "location_city", dimension: &CITIES },
  Step::DropSource { column: "location_state", dimension: &CITIES },
];

// ─── Run options ─────────────────────────────────────────────────────────────

/// Minimum working age applied to birthdates.
pub const DEFAULT_MIN_WORKING_AGE: u32 = 18;

/// Placeholder for termination dates known to be invalid.
pub fn default_termdate_sentinel() -> NaiveDate {
  NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Parameters of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
  /// The processing date: ages and the working-age floor are relative to it.
  pub as_of:             NaiveDate,
  pub min_working_age:   u32,
  pub termdate_sentinel: NaiveDate,
}

impl RunOptions {
  pub fn new(as_of: NaiveDate) -> Self {
    Self {
      as_of,
      min_working_age: DEFAULT_MIN_WORKING_AGE,
      termdate_sentinel: default_termdate_sentinel(),
    }
  }
}
