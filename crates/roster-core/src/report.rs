//! Reports produced by the pipeline: runs, step status, inspection and audit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{Result, date::FormatReport, dimension::AmbiguityReport};

// ─── Runs ────────────────────────────────────────────────────────────────────

/// What happened to one plan step during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
  Applied { rows: u64 },
  /// Already recorded in the ledger by an earlier run.
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
  pub step:    String,
  #[serde(flatten)]
  pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id: Uuid,
  pub as_of:  NaiveDate,
  pub steps:  Vec<StepRecord>,
}

impl RunReport {
  pub fn applied(&self) -> impl Iterator<Item = &StepRecord> {
    self
      .steps
      .iter()
      .filter(|r| matches!(r.outcome, StepOutcome::Applied { .. }))
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// A plan step joined with its most recent ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
  pub step:          String,
  pub repeatable:    bool,
  pub applied_at:    Option<DateTime<Utc>>,
  pub run_id:        Option<Uuid>,
  pub rows_affected: Option<u64>,
}

impl StepStatus {
  pub fn is_pending(&self) -> bool { self.applied_at.is_none() }
}

// ─── Inspection ──────────────────────────────────────────────────────────────

/// Read-only discovery results, gathered before anything is mutated.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
  pub formats:     Vec<FormatReport>,
  pub ambiguities: Vec<AmbiguityReport>,
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// A broken invariant found on a processed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
  /// Birthdates later than the minimum-working-age cutoff.
  UnderageBirthdate { rows: u64 },
  /// `age` is null where `birthdate` is not, or the other way round.
  AgeNullMismatch { rows: u64 },
  /// `age` differs from the whole-year difference to the processing date.
  StaleAge { rows: u64 },
  /// Termination dates at or after the latest hire date that escaped the
  /// sentinel.
  LateTermdate { rows: u64 },
  /// Natural-key values occurring more than once in a dimension.
  DuplicateNaturalKey { table: String, keys: u64 },
  /// Foreign keys pointing at no dimension row.
  DanglingKey { table: String, column: String, rows: u64 },
  /// Fact rows with source text present but no key assigned.
  MissingKey { column: String, rows: u64 },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
  /// Names of the checks that could run against the current schema.
  pub checks:     Vec<String>,
  pub violations: Vec<Violation>,
}

impl AuditReport {
  pub fn is_clean(&self) -> bool { self.violations.is_empty() }

  /// Record that `check` ran, and its violation if `rows` is non-zero.
  pub fn record(
    &mut self,
    check: impl Into<String>,
    rows: u64,
    violation: impl FnOnce(u64) -> Violation,
  ) {
    self.checks.push(check.into());
    if rows > 0 {
      self.violations.push(violation(rows));
    }
  }
}

/// Pretty JSON for any report.
pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
  Ok(serde_json::to_string_pretty(report)?)
}
