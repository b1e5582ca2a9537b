//! The dimension builder.
//!
//! One routine extracts every dimension in the catalogue: it creates the
//! table, assigns surrogate keys in sorted order, adds the fact table's
//! foreign key and backfills it by matching the source text. Scoped dimensions
//! first check whether their child text repeats across parents and, if it
//! does, make the `(parent, child)` pair the natural key.

use roster_core::dimension::{AmbiguityReport, Dimension, FACT_TABLE, KeyScope, Shape};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::schema::count;

/// SQL for the category text held in `expr`: trimmed, with blanks as NULL.
pub fn category(expr: &str) -> String { format!("NULLIF(TRIM({expr}), '')") }

/// Check whether a scoped dimension's child text is unique on its own.
///
/// Returns `None` for simple dimensions.
pub fn ambiguity(
  conn: &Connection,
  dimension: &Dimension,
) -> rusqlite::Result<Option<AmbiguityReport>> {
  let Shape::Scoped { parent, source, .. } = dimension.shape else {
    return Ok(None);
  };
  let parent_text = category(parent.source());
  let child_text = category(source);

  // Distinct pairs, then the children that occur in more than one pair.
  let mut stmt = conn.prepare(&format!(
    "WITH pairs AS (
       SELECT DISTINCT {parent_text} AS parent, {child_text} AS child
       FROM {FACT_TABLE}
       WHERE {parent_text} IS NOT NULL AND {child_text} IS NOT NULL
     )
     SELECT parent, child FROM pairs
     WHERE child IN (SELECT child FROM pairs GROUP BY child HAVING COUNT(*) > 1)
     ORDER BY child, parent"
  ))?;
  let pairs = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Some(AmbiguityReport::from_pairs(dimension.table, pairs)))
}

/// Build `dimension` and backfill its fact-table key.
///
/// Returns the number of dimension rows created.
pub fn extract(conn: &Connection, dimension: &Dimension) -> rusqlite::Result<u64> {
  let table = dimension.table;

  let inserted = match dimension.shape {
    Shape::Simple { source } => {
      let text = category(source);
      conn.execute_batch(&format!(
        "CREATE TABLE {table} (
           id   INTEGER PRIMARY KEY,
           name TEXT NOT NULL UNIQUE
         )"
      ))?;
      conn.execute(
        &format!(
          "INSERT INTO {table} (id, name)
           SELECT ROW_NUMBER() OVER (ORDER BY value), value
           FROM (SELECT DISTINCT {text} AS value FROM {FACT_TABLE}
                 WHERE {text} IS NOT NULL)"
        ),
        [],
      )?
    }
    Shape::Scoped { parent, parent_key, source, column } => {
      let scope = match ambiguity(conn, dimension)? {
        Some(report) if report.scope() == KeyScope::Parent => {
          warn!(
            table,
            ambiguous = report.ambiguous.len(),
            "{source} repeats across {}; keying on the pair",
            parent.table
          );
          KeyScope::Parent
        }
        _ => KeyScope::Global,
      };
      let natural_key = match scope {
        KeyScope::Global => column.to_owned(),
        KeyScope::Parent => format!("{parent_key}, {column}"),
      };
      let parent_table = parent.table;
      let parent_value = parent.value_column();
      let parent_text = category(parent.source());
      let child_text = category(source);

      conn.execute_batch(&format!(
        "CREATE TABLE {table} (
           id           INTEGER PRIMARY KEY,
           {parent_key} INTEGER NOT NULL REFERENCES {parent_table}(id),
           {column}     TEXT NOT NULL,
           UNIQUE ({natural_key})
         )"
      ))?;
      conn.execute(
        &format!(
          "INSERT INTO {table} (id, {parent_key}, {column})
           SELECT ROW_NUMBER() OVER (ORDER BY p.{parent_value}, s.child), p.id, s.child
           FROM (SELECT DISTINCT {parent_text} AS parent, {child_text} AS child
                 FROM {FACT_TABLE}
                 WHERE {parent_text} IS NOT NULL AND {child_text} IS NOT NULL) AS s
           JOIN {parent_table} AS p ON p.{parent_value} = s.parent"
        ),
        [],
      )?
    }
  };

  if let Some(key) = dimension.fact_key {
    conn.execute_batch(&format!(
      "ALTER TABLE {FACT_TABLE} ADD COLUMN {key} INTEGER REFERENCES {table}(id)"
    ))?;
    conn.execute(&backfill_sql(dimension, key), [])?;
    let backfilled = count(
      conn,
      &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE {key} IS NOT NULL"),
    )?;
    info!(table, rows = inserted, key, backfilled, "dimension extracted");
  } else {
    info!(table, rows = inserted, "dimension extracted");
  }

  Ok(inserted as u64)
}

/// The UPDATE assigning `key` to every fact row whose source text matches a
/// dimension row. Scoped dimensions always match parent and child jointly.
fn backfill_sql(dimension: &Dimension, key: &str) -> String {
  let table = dimension.table;
  match dimension.shape {
    Shape::Simple { source } => {
      let text = category(&format!("{FACT_TABLE}.{source}"));
      format!(
        "UPDATE {FACT_TABLE} SET {key} = (
           SELECT d.id FROM {table} AS d WHERE d.name = {text}
         )"
      )
    }
    Shape::Scoped { parent, parent_key, source, column } => {
      let parent_table = parent.table;
      let parent_value = parent.value_column();
      let parent_text = category(&format!("{FACT_TABLE}.{}", parent.source()));
      let child_text = category(&format!("{FACT_TABLE}.{source}"));
      format!(
        "UPDATE {FACT_TABLE} SET {key} = (
           SELECT c.id FROM {table} AS c
           JOIN {parent_table} AS p ON p.id = c.{parent_key}
           WHERE c.{column} = {child_text}
             AND p.{parent_value} = {parent_text}
         )"
      )
    }
  }
}
