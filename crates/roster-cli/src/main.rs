//! `roster`: clean and normalise a staged employee table in SQLite.
//!
//! # Usage
//!
//! ```
//! roster --database hr.db inspect
//! roster --database hr.db --as-of 2024-06-01 run
//! roster --config roster.toml verify --json
//! ```

mod render;
mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail, ensure};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use roster_core::{plan::RunOptions, report::to_json, warehouse::Warehouse};
use roster_store_sqlite::SqliteWarehouse;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{RosterConfig, expand_tilde};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roster", version, about = "Employee roster cleaning pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "roster.toml")]
  config: PathBuf,

  /// SQLite database holding the `employees` table; overrides the config.
  #[arg(long, global = true, value_name = "FILE")]
  database: Option<PathBuf>,

  /// Processing date for ages and the working-age floor.
  #[arg(long, global = true, value_name = "YYYY-MM-DD")]
  as_of: Option<NaiveDate>,

  /// Print reports as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Apply every pending step of the plan.
  Run,
  /// Report date formats and key ambiguity without changing anything.
  Inspect,
  /// Check the processed database; exits non-zero on any violation.
  Verify,
  /// List plan steps and when they were applied.
  Status,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = RosterConfig::load(&cli.config)?;

  let database = expand_tilde(cli.database.as_ref().unwrap_or(&cfg.database));
  ensure!(database.exists(), "database {} does not exist", database.display());

  let options = RunOptions {
    as_of:             cli
      .as_of
      .or(cfg.as_of)
      .unwrap_or_else(|| Local::now().date_naive()),
    min_working_age:   cfg.min_working_age,
    termdate_sentinel: cfg.termdate_sentinel,
  };

  let warehouse = SqliteWarehouse::open(&database)
    .await
    .with_context(|| format!("failed to open database at {database:?}"))?;

  match cli.command {
    Command::Run => {
      let report = warehouse.run(options).await.context("pipeline run failed")?;
      emit(cli.json, &report, render::run)?;
    }
    Command::Inspect => {
      let report = warehouse.inspect().await.context("inspection failed")?;
      emit(cli.json, &report, render::inspect)?;
    }
    Command::Verify => {
      let report = warehouse.audit(options).await.context("audit failed")?;
      emit(cli.json, &report, render::audit)?;
      if !report.is_clean() {
        bail!("{} invariant violation(s) found", report.violations.len());
      }
    }
    Command::Status => {
      let steps = warehouse.status().await.context("failed to read step ledger")?;
      emit(cli.json, &steps, |s: &Vec<_>| render::status(s))?;
    }
  }

  Ok(())
}

fn emit<T: Serialize>(
  json: bool,
  report: &T,
  human: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
  if json {
    println!("{}", to_json(report)?);
  } else {
    print!("{}", human(report));
  }
  Ok(())
}
