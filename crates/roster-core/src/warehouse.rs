//! The `Warehouse` trait.
//!
//! Implemented by storage backends (e.g. `roster-store-sqlite`). The CLI
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  plan::RunOptions,
  report::{AuditReport, InspectReport, RunReport, StepStatus},
};

/// A relational store holding the `employees` fact table and, once the
/// pipeline has run, its dimension tables.
pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Discover date formats and key ambiguities without mutating anything.
  fn inspect(&self) -> impl Future<Output = Result<InspectReport, Self::Error>> + Send + '_;

  /// Run every pending plan step in order.
  ///
  /// Each step is atomic. A failing step rolls back and stops the run; steps
  /// committed before it stay recorded, so the next run resumes there.
  fn run(
    &self,
    options: RunOptions,
  ) -> impl Future<Output = Result<RunReport, Self::Error>> + Send + '_;

  /// Every plan step with its ledger state.
  fn status(&self) -> impl Future<Output = Result<Vec<StepStatus>, Self::Error>> + Send + '_;

  /// Check the cleaned and normalized invariants that the current schema
  /// allows checking.
  fn audit(
    &self,
    options: RunOptions,
  ) -> impl Future<Output = Result<AuditReport, Self::Error>> + Send + '_;
}
