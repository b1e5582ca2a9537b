//! [`SqliteWarehouse`], the SQLite implementation of [`Warehouse`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use roster_core::{
  date::latest_eligible_birthdate,
  dimension::{CITIES, FACT_TABLE, JOBTITLES},
  plan::{DateColumn, PLAN, RunOptions, Step},
  report::{
    AuditReport, InspectReport, RunReport, StepOutcome, StepRecord, StepStatus,
  },
  warehouse::Warehouse,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result, audit, cleaner, ledger, normalizer,
  encode::{RawLedgerEntry, encode_dt, encode_uuid, pending_status},
  schema::{SCHEMA, has_column, table_exists},
  steps::{self, Outcome, StepContext},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An employee warehouse backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open a warehouse at `path` and make sure the step ledger exists.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let warehouse = Self { conn };
    warehouse.init_schema().await?;
    Ok(warehouse)
  }

  /// Open an in-memory warehouse, e.g. for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let warehouse = Self { conn };
    warehouse.init_schema().await?;
    Ok(warehouse)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Execute raw SQL against the warehouse, e.g. to stage the raw
  /// `employees` table.
  pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread, e.g. to read the processed tables.
  pub async fn with_connection<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    Ok(self.conn.call(move |conn| Ok(f(conn)?)).await?)
  }

  /// Ledger entries keyed by step name; every name must belong to the plan.
  async fn ledger(&self) -> Result<HashMap<String, RawLedgerEntry>> {
    let entries = self
      .conn
      .call(|conn| Ok(ledger::entries(conn)?))
      .await?;

    let mut by_step = HashMap::with_capacity(entries.len());
    for entry in entries {
      Step::by_name(&entry.step)?;
      by_step.insert(entry.step.clone(), entry);
    }
    Ok(by_step)
  }

  /// Ensure the fact table carries every column the pending steps read.
  async fn validate(&self, pending: &[&'static Step]) -> Result<()> {
    let required: Vec<&'static str> =
      pending.iter().flat_map(|step| step.required_columns()).collect();

    let missing = self
      .conn
      .call(move |conn| {
        if !table_exists(conn, FACT_TABLE)? {
          return Ok(Some(None));
        }
        for column in required {
          if !has_column(conn, FACT_TABLE, column)? {
            return Ok(Some(Some(column)));
          }
        }
        Ok(None)
      })
      .await?;

    match missing {
      None => Ok(()),
      Some(None) => Err(Error::MissingTable(FACT_TABLE.to_owned())),
      Some(Some(column)) => Err(Error::MissingColumn {
        table:  FACT_TABLE.to_owned(),
        column: column.to_owned(),
      }),
    }
  }

  /// Run one step in its own transaction and record it in the ledger.
  async fn apply(
    &self,
    step: &'static Step,
    ctx: StepContext,
    run_id: Uuid,
  ) -> Result<u64> {
    let name = step.name().into_owned();
    let ledger_name = name.clone();
    let run_id_str = encode_uuid(run_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = steps::apply(&tx, step, &ctx)?;
        if let Outcome::Done(rows) = outcome {
          ledger::record(&tx, &ledger_name, &run_id_str, &encode_dt(Utc::now()), rows)?;
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;

    match outcome {
      Outcome::Done(rows) => Ok(rows),
      Outcome::Blocked(blocker) => Err(blocker.into_error(name)),
    }
  }

  fn context(options: RunOptions) -> Result<StepContext> {
    Ok(StepContext {
      options,
      eligible_until: latest_eligible_birthdate(
        options.as_of,
        options.min_working_age,
      )?,
    })
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = Error;

  async fn inspect(&self) -> Result<InspectReport> {
    self.validate(&[]).await?;

    let report = self
      .conn
      .call(|conn| {
        let mut formats = Vec::new();
        for column in [DateColumn::Birthdate, DateColumn::HireDate] {
          if has_column(conn, FACT_TABLE, column.column())? {
            formats.push(cleaner::discover(conn, column.column())?);
          }
        }

        let mut ambiguities = Vec::new();
        for dimension in [&JOBTITLES, &CITIES] {
          let mut present = true;
          for source in dimension.source_columns() {
            present &= has_column(conn, FACT_TABLE, source)?;
          }
          if present && let Some(report) = normalizer::ambiguity(conn, dimension)? {
            ambiguities.push(report);
          }
        }

        Ok(InspectReport { formats, ambiguities })
      })
      .await?;

    Ok(report)
  }

  async fn run(&self, options: RunOptions) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let ctx = Self::context(options)?;
    let ledger = self.ledger().await?;

    let pending: Vec<&'static Step> = PLAN
      .iter()
      .filter(|step| step.is_repeatable() || !ledger.contains_key(step.name().as_ref()))
      .collect();
    self.validate(&pending).await?;

    info!(%run_id, as_of = %options.as_of, pending = pending.len(), "starting pipeline run");

    let mut steps = Vec::with_capacity(PLAN.len());
    for step in PLAN {
      let name = step.name().into_owned();
      if !pending.contains(&step) {
        debug!(step = %name, "already applied");
        steps.push(StepRecord { step: name, outcome: StepOutcome::Skipped });
        continue;
      }

      let rows = self.apply(step, ctx, run_id).await?;
      info!(step = %name, rows, "step applied");
      steps.push(StepRecord { step: name, outcome: StepOutcome::Applied { rows } });
    }

    Ok(RunReport { run_id, as_of: options.as_of, steps })
  }

  async fn status(&self) -> Result<Vec<StepStatus>> {
    let mut ledger = self.ledger().await?;
    PLAN
      .iter()
      .map(|step| match ledger.remove(step.name().as_ref()) {
        Some(entry) => entry.into_status(step),
        None => Ok(pending_status(step)),
      })
      .collect()
  }

  async fn audit(&self, options: RunOptions) -> Result<AuditReport> {
    let ctx = Self::context(options)?;
    self.validate(&[]).await?;

    let report = self
      .conn
      .call(move |conn| Ok(audit::audit(conn, &ctx)?))
      .await?;
    Ok(report)
  }
}
