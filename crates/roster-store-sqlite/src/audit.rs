//! Invariant checks over a processed database.
//!
//! Each check runs only if the columns and tables it reads exist, so the audit
//! works on a database at any point of the plan. The report lists which checks
//! ran alongside what they found.

use chrono::NaiveDate;
use roster_core::{
  date::{format_iso, parse_iso, whole_years},
  dimension::{DIMENSIONS, Dimension, FACT_TABLE, Shape},
  report::{AuditReport, Violation},
};
use rusqlite::{Connection, types::Value};

use crate::{
  encode::text_value,
  normalizer::category,
  schema::{count, has_column, table_exists},
  steps::StepContext,
};

pub fn audit(conn: &Connection, ctx: &StepContext) -> rusqlite::Result<AuditReport> {
  let mut report = AuditReport::default();
  let has = |column: &str| has_column(conn, FACT_TABLE, column);

  if has("birthdate")? {
    let rows = conn.query_row(
      &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE birthdate > ?1"),
      [format_iso(ctx.eligible_until)],
      |row| row.get(0),
    )?;
    report.record("birthdate-floor", rows, |rows| Violation::UnderageBirthdate { rows });

    if has("age")? {
      let rows = count(
        conn,
        &format!(
          "SELECT COUNT(*) FROM {FACT_TABLE}
           WHERE (age IS NULL) <> (birthdate IS NULL)"
        ),
      )?;
      report.record("age-nullity", rows, |rows| Violation::AgeNullMismatch { rows });

      let rows = stale_ages(conn, ctx.options.as_of)?;
      report.record("age-value", rows, |rows| Violation::StaleAge { rows });
    }
  }

  if has("termdate")? && has("hire_date")? {
    let rows = conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM {FACT_TABLE}
         WHERE termdate IS NOT NULL
           AND termdate <> ?1
           AND termdate >= (SELECT MAX(hire_date) FROM {FACT_TABLE})"
      ),
      [format_iso(ctx.options.termdate_sentinel)],
      |row| row.get(0),
    )?;
    report.record("termdate-ceiling", rows, |rows| Violation::LateTermdate { rows });
  }

  for dimension in DIMENSIONS {
    audit_dimension(conn, dimension, &mut report)?;
  }

  Ok(report)
}

/// Rows whose `age` disagrees with their birthdate as of `as_of`.
fn stale_ages(conn: &Connection, as_of: NaiveDate) -> rusqlite::Result<u64> {
  let mut stmt = conn.prepare(&format!(
    "SELECT birthdate, age FROM {FACT_TABLE}
     WHERE birthdate IS NOT NULL AND age IS NOT NULL"
  ))?;
  let rows = stmt
    .query_map([], |row| Ok((text_value(row.get::<_, Value>(0)?), row.get::<_, i64>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let stale = rows
    .into_iter()
    .filter(|(birth, age)| {
      let expected = birth
        .as_deref()
        .and_then(parse_iso)
        .and_then(|b| whole_years(b, as_of))
        .map(i64::from);
      expected != Some(*age)
    })
    .count();
  Ok(stale as u64)
}

fn audit_dimension(
  conn: &Connection,
  dimension: &Dimension,
  report: &mut AuditReport,
) -> rusqlite::Result<()> {
  let table = dimension.table;
  if !table_exists(conn, table)? {
    return Ok(());
  }

  let natural_key = match dimension.shape {
    Shape::Simple { .. } => "name".to_owned(),
    Shape::Scoped { parent_key, column, .. } => format!("{parent_key}, {column}"),
  };
  let keys = count(
    conn,
    &format!(
      "SELECT COUNT(*) FROM (
         SELECT 1 FROM {table} GROUP BY {natural_key} HAVING COUNT(*) > 1
       )"
    ),
  )?;
  report.record(format!("unique-{table}"), keys, |keys| {
    Violation::DuplicateNaturalKey { table: table.to_owned(), keys }
  });

  if let Shape::Scoped { parent, parent_key, .. } = dimension.shape {
    let parent_table = parent.table;
    let rows = count(
      conn,
      &format!(
        "SELECT COUNT(*) FROM {table} AS c
         WHERE NOT EXISTS (SELECT 1 FROM {parent_table} AS p WHERE p.id = c.{parent_key})"
      ),
    )?;
    report.record(format!("references-{table}.{parent_key}"), rows, |rows| {
      Violation::DanglingKey {
        table: parent_table.to_owned(),
        column: format!("{table}.{parent_key}"),
        rows,
      }
    });
  }

  let Some(key) = dimension.fact_key else {
    return Ok(());
  };
  if !has_column(conn, FACT_TABLE, key)? {
    return Ok(());
  }

  let rows = count(
    conn,
    &format!(
      "SELECT COUNT(*) FROM {FACT_TABLE} AS e
       WHERE e.{key} IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM {table} AS d WHERE d.id = e.{key})"
    ),
  )?;
  report.record(format!("references-{key}"), rows, |rows| Violation::DanglingKey {
    table: table.to_owned(),
    column: format!("{FACT_TABLE}.{key}"),
    rows,
  });

  // Only checkable while every source column still exists.
  let sources = dimension.source_columns();
  let mut present = true;
  for source in &sources {
    present &= has_column(conn, FACT_TABLE, source)?;
  }
  if present {
    let sourced = sources
      .iter()
      .map(|s| format!("{} IS NOT NULL", category(s)))
      .collect::<Vec<_>>()
      .join(" AND ");
    let rows = count(
      conn,
      &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE {sourced} AND {key} IS NULL"),
    )?;
    report.record(format!("backfill-{key}"), rows, |rows| Violation::MissingKey {
      column: key.to_owned(),
      rows,
    });
  }

  Ok(())
}
