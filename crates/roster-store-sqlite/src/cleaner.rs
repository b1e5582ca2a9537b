//! Date repair and derived attributes on the fact table.
//!
//! SQLite has no in-place column retype, so a text column becomes a `DATE`
//! column by adding a staging column, filling it, dropping the original and
//! renaming the staging column into place. The caller wraps all of it in one
//! transaction, so a failure leaves the original strings untouched.

use chrono::NaiveDate;
use roster_core::{
  date::{FormatReport, format_iso, parse_iso, parse_termination, whole_years},
  dimension::FACT_TABLE,
  plan::DateColumn,
};
use rusqlite::{Connection, types::Value};
use tracing::{debug, info, warn};

use crate::{encode::text_value, schema::declared_type};

/// Declared type of every retyped date column.
pub const DATE_TYPE: &str = "DATE";

/// Every `(rowid, text)` pair of a fact column.
pub fn read_column(
  conn: &Connection,
  column: &str,
) -> rusqlite::Result<Vec<(i64, Option<String>)>> {
  let mut stmt = conn.prepare(&format!("SELECT rowid, {column} FROM {FACT_TABLE}"))?;
  stmt
    .query_map([], |row| Ok((row.get(0)?, text_value(row.get::<_, Value>(1)?))))?
    .collect()
}

/// Discover the layout of a delimited date column.
pub fn discover(conn: &Connection, column: &str) -> rusqlite::Result<FormatReport> {
  let rows = read_column(conn, column)?;
  Ok(FormatReport::infer(
    column,
    rows.iter().filter_map(|(_, text)| text.as_deref()),
  ))
}

/// Parse `column` into dates and retype it to [`DATE_TYPE`].
///
/// Values that match no known layout become NULL. Returns the number of rows
/// holding a date afterwards; a column that is already `DATE` is left alone.
pub fn retype_date(conn: &Connection, column: DateColumn) -> rusqlite::Result<u64> {
  let name = column.column();
  if declared_type(conn, FACT_TABLE, name)?.as_deref() == Some(DATE_TYPE) {
    info!(column = name, "column already holds dates");
    return Ok(0);
  }

  let rows = read_column(conn, name)?;
  let parsed: Vec<(i64, Option<NaiveDate>)> = if column.is_delimited() {
    let report = FormatReport::infer(
      name,
      rows.iter().filter_map(|(_, text)| text.as_deref()),
    );
    for profile in &report.profiles {
      debug!(
        column = name,
        delimiter = ?profile.delimiter,
        order = ?profile.order,
        rows = profile.rows,
        "discovered date layout"
      );
      if profile.ambiguous {
        warn!(
          column = name,
          delimiter = ?profile.delimiter,
          "date component ranges are ambiguous; assuming month-day-year"
        );
      }
    }
    rows
      .iter()
      .map(|(rowid, text)| (*rowid, text.as_deref().and_then(|t| report.parse(t))))
      .collect()
  } else {
    rows
      .iter()
      .map(|(rowid, text)| (*rowid, text.as_deref().and_then(parse_termination)))
      .collect()
  };

  let present = rows
    .iter()
    .filter(|(_, text)| text.as_deref().is_some_and(|t| !t.trim().is_empty()))
    .count();
  let converted = parsed.iter().filter(|(_, date)| date.is_some()).count();
  if converted < present {
    warn!(
      column = name,
      unparseable = present - converted,
      "values matching no known date layout were set to NULL"
    );
  }

  replace_with_dates(conn, name, &parsed)?;
  Ok(converted as u64)
}

fn replace_with_dates(
  conn: &Connection,
  column: &str,
  parsed: &[(i64, Option<NaiveDate>)],
) -> rusqlite::Result<()> {
  let staging = format!("{column}__date");
  conn.execute_batch(&format!(
    "ALTER TABLE {FACT_TABLE} ADD COLUMN {staging} {DATE_TYPE}"
  ))?;

  {
    let mut stmt = conn.prepare(&format!(
      "UPDATE {FACT_TABLE} SET {staging} = ?1 WHERE rowid = ?2"
    ))?;
    for (rowid, date) in parsed {
      stmt.execute(rusqlite::params![date.map(format_iso), rowid])?;
    }
  }

  conn.execute_batch(&format!(
    "ALTER TABLE {FACT_TABLE} DROP COLUMN {column};
     ALTER TABLE {FACT_TABLE} RENAME COLUMN {staging} TO {column};"
  ))
}

/// Add `age` if missing and recompute it for every row as of `as_of`.
///
/// Returns the number of rows with a known age.
pub fn derive_age(conn: &Connection, as_of: NaiveDate) -> rusqlite::Result<u64> {
  if declared_type(conn, FACT_TABLE, "age")?.is_none() {
    conn.execute_batch(&format!("ALTER TABLE {FACT_TABLE} ADD COLUMN age INTEGER"))?;
  }

  let rows = read_column(conn, "birthdate")?;
  let mut stmt =
    conn.prepare(&format!("UPDATE {FACT_TABLE} SET age = ?1 WHERE rowid = ?2"))?;
  let mut known = 0;
  for (rowid, birthdate) in rows {
    let age = birthdate
      .as_deref()
      .and_then(parse_iso)
      .and_then(|birth| whole_years(birth, as_of));
    known += u64::from(age.is_some());
    stmt.execute(rusqlite::params![age, rowid])?;
  }
  Ok(known)
}

/// Null `birthdate` and `age` wherever the birthdate falls after
/// `eligible_until`.
pub fn null_underage_birthdates(
  conn: &Connection,
  eligible_until: NaiveDate,
) -> rusqlite::Result<u64> {
  let changed = conn.execute(
    &format!(
      "UPDATE {FACT_TABLE} SET birthdate = NULL, age = NULL
       WHERE birthdate > ?1"
    ),
    [format_iso(eligible_until)],
  )?;
  if changed > 0 {
    info!(rows = changed, cutoff = %eligible_until, "nulled birthdates below working age");
  }
  Ok(changed as u64)
}

/// Replace every termination date at or after the latest hire date with
/// `sentinel`.
pub fn sentinel_late_termdates(conn: &Connection, sentinel: NaiveDate) -> rusqlite::Result<u64> {
  let changed = conn.execute(
    &format!(
      "UPDATE {FACT_TABLE} SET termdate = ?1
       WHERE termdate IS NOT NULL
         AND termdate <> ?1
         AND termdate >= (SELECT MAX(hire_date) FROM {FACT_TABLE})"
    ),
    [format_iso(sentinel)],
  )?;
  if changed > 0 {
    info!(rows = changed, sentinel = %sentinel, "flagged termination dates after the last hire");
  }
  Ok(changed as u64)
}
