//! Integration tests for `SqliteWarehouse` against an in-memory database.

use chrono::NaiveDate;
use roster_core::{
  dimension::{DEPARTMENTS, ETHNICITIES, JOBTITLES},
  plan::{PLAN, RunOptions, Step},
  report::{StepOutcome, Violation},
  warehouse::Warehouse,
};
use rusqlite::{Connection, types::Value};

use crate::{
  Error, SqliteWarehouse,
  encode::text_value,
  schema::{declared_type, has_column},
  steps::{self, Blocker, Outcome, StepContext},
};

const EMPLOYEES: &str = "
CREATE TABLE employees (
    id             TEXT PRIMARY KEY,
    first_name     TEXT,
    race           TEXT,
    gender         TEXT,
    location       TEXT,
    location_city  TEXT,
    location_state TEXT,
    department     TEXT,
    jobtitle       TEXT,
    birthdate      TEXT,
    hire_date      TEXT,
    termdate       TEXT
);

INSERT INTO employees VALUES
  ('E1', 'Ada',   'White',                     'Male',           'Headquarters', 'Cleveland',   'Ohio',     'Engineering',        'Business Analyst',    '02/05/1955', '04/20/2003', ''),
  ('E2', 'Ben',   'Black or African American', 'Female',         'Remote',       'Columbus',    'Ohio',     'Product Management', 'Business Analyst',    '12-28-88',   '06-29-09',   '2021-03-15 00:00:00 UTC'),
  ('E3', 'Cy',    'White',                     'Female',         'Headquarters', 'Springfield', 'Illinois', 'Engineering',        'Software Engineer I', '6/13/1972',  '11/15/2010', ''),
  ('E4', 'Dee',   'Asian',                     'Male',           'Remote',       'Springfield', 'Ohio',     'Sales',              'Account Executive',   '01-20-14',   '01-20-14',   '2030-07-01 08:12:00 UTC'),
  ('E5', 'Eve',   'Hispanic or Latino',        'Non-Conforming', 'Headquarters', 'Cleveland',   'Ohio',     'Engineering',        'Business Analyst',    '07-04-65',   '03/01/2022', '2022-03-01 00:00:00 UTC'),
  ('E6', 'Flo',   NULL,                        'Male',           'Remote',       'Columbus',    'Ohio',     'Sales',              'Account Executive',   'not a date', '09/10/2015', '2018-05-05 12:00:00 UTC');
";

fn as_of() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }

fn options() -> RunOptions { RunOptions::new(as_of()) }

async fn warehouse() -> SqliteWarehouse {
  let w = SqliteWarehouse::open_in_memory()
    .await
    .expect("in-memory warehouse");
  w.execute_batch(EMPLOYEES).await.expect("seed employees");
  w
}

/// Every row of `sql` as nullable text.
async fn rows(w: &SqliteWarehouse, sql: &str) -> Vec<Vec<Option<String>>> {
  let sql = sql.to_owned();
  w.with_connection(move |conn| {
    let mut stmt = conn.prepare(&sql)?;
    let width = stmt.column_count();
    stmt
      .query_map([], |row| {
        (0..width)
          .map(|i| row.get::<_, Value>(i).map(text_value))
          .collect()
      })?
      .collect()
  })
  .await
  .unwrap()
}

/// A single text cell.
async fn cell(w: &SqliteWarehouse, sql: &str) -> Option<String> {
  rows(w, sql).await.remove(0).remove(0)
}

fn text(s: &str) -> Option<String> { Some(s.to_owned()) }

// ─── Cleaner ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dates_are_parsed_and_retyped() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  let got = rows(&w, "SELECT id, birthdate, hire_date, termdate FROM employees ORDER BY id").await;
  assert_eq!(got, vec![
    vec![text("E1"), text("1955-02-05"), text("2003-04-20"), None],
    vec![text("E2"), text("1988-12-28"), text("2009-06-29"), text("2021-03-15")],
    vec![text("E3"), text("1972-06-13"), text("2010-11-15"), None],
    vec![text("E4"), None, text("2014-01-20"), text("1900-01-01")],
    vec![text("E5"), None, text("2022-03-01"), text("1900-01-01")],
    vec![text("E6"), None, text("2015-09-10"), text("2018-05-05")],
  ]);

  let types = w
    .with_connection(|conn| {
      Ok([
        declared_type(conn, "employees", "birthdate")?,
        declared_type(conn, "employees", "hire_date")?,
        declared_type(conn, "employees", "termdate")?,
        declared_type(conn, "employees", "birthdate__date")?,
      ])
    })
    .await
    .unwrap();
  assert_eq!(types, [text("DATE"), text("DATE"), text("DATE"), None]);
}

#[tokio::test]
async fn age_is_derived_and_underage_birthdates_are_nulled() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  let got = rows(&w, "SELECT id, age FROM employees ORDER BY id").await;
  assert_eq!(got, vec![
    vec![text("E1"), text("69")],
    vec![text("E2"), text("35")],
    // Birthday on June 13 has not come round by June 1.
    vec![text("E3"), text("51")],
    // Ten years old: below working age.
    vec![text("E4"), None],
    // Two-digit year pivots into 2065.
    vec![text("E5"), None],
    // Unparseable text.
    vec![text("E6"), None],
  ]);

  let mismatched = cell(
    &w,
    "SELECT COUNT(*) FROM employees WHERE (age IS NULL) <> (birthdate IS NULL)",
  )
  .await;
  assert_eq!(mismatched, text("0"));
}

#[tokio::test]
async fn failed_retype_rolls_back_and_resumes() {
  let w = warehouse().await;
  // A view over the column makes the DROP inside the retype fail.
  w.execute_batch("CREATE VIEW birthdays AS SELECT birthdate FROM employees")
    .await
    .unwrap();

  let err = w.run(options()).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "{err:?}");

  assert_eq!(
    cell(&w, "SELECT birthdate FROM employees WHERE id = 'E1'").await,
    text("02/05/1955")
  );
  let staged = w
    .with_connection(|conn| has_column(conn, "employees", "birthdate__date"))
    .await
    .unwrap();
  assert!(!staged);
  let status = w.status().await.unwrap();
  assert!(status.iter().all(|s| s.is_pending()));

  w.execute_batch("DROP VIEW birthdays").await.unwrap();
  let report = w.run(options()).await.unwrap();
  assert_eq!(report.applied().count(), PLAN.len());
  assert_eq!(
    cell(&w, "SELECT birthdate FROM employees WHERE id = 'E1'").await,
    text("1955-02-05")
  );
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn simple_dimensions_are_sorted_and_keyed() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  assert_eq!(rows(&w, "SELECT id, name FROM ethnicities ORDER BY id").await, vec![
    vec![text("1"), text("Asian")],
    vec![text("2"), text("Black or African American")],
    vec![text("3"), text("Hispanic or Latino")],
    vec![text("4"), text("White")],
  ]);
  assert_eq!(rows(&w, "SELECT name FROM genders ORDER BY id").await, vec![
    vec![text("Female")],
    vec![text("Male")],
    vec![text("Non-Conforming")],
  ]);
  assert_eq!(
    rows(&w, "SELECT id, ethnicity_id, gender_id, location_id FROM employees ORDER BY id").await,
    vec![
      vec![text("E1"), text("4"), text("2"), text("1")],
      vec![text("E2"), text("2"), text("1"), text("2")],
      vec![text("E3"), text("4"), text("1"), text("1")],
      vec![text("E4"), text("1"), text("2"), text("2")],
      vec![text("E5"), text("3"), text("3"), text("1")],
      // Unknown race stays an unresolved reference.
      vec![text("E6"), None, text("2"), text("2")],
    ]
  );
}

#[tokio::test]
async fn business_analyst_is_split_by_department() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  assert_eq!(
    rows(
      &w,
      "SELECT j.id, d.name, j.jobtitle FROM jobtitles j
       JOIN departments d ON d.id = j.department_id ORDER BY j.id"
    )
    .await,
    vec![
      vec![text("1"), text("Engineering"), text("Business Analyst")],
      vec![text("2"), text("Engineering"), text("Software Engineer I")],
      vec![text("3"), text("Product Management"), text("Business Analyst")],
      vec![text("4"), text("Sales"), text("Account Executive")],
    ]
  );
  assert_eq!(
    rows(&w, "SELECT id, jobtitle_id FROM employees WHERE id IN ('E1', 'E2', 'E5') ORDER BY id")
      .await,
    vec![
      vec![text("E1"), text("1")],
      vec![text("E2"), text("3")],
      vec![text("E5"), text("1")],
    ]
  );
}

#[tokio::test]
async fn cities_are_scoped_to_their_state() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  assert_eq!(
    rows(
      &w,
      "SELECT c.id, s.name, c.name FROM cities c
       JOIN states s ON s.id = c.state_id ORDER BY c.id"
    )
    .await,
    vec![
      vec![text("1"), text("Illinois"), text("Springfield")],
      vec![text("2"), text("Ohio"), text("Cleveland")],
      vec![text("3"), text("Ohio"), text("Columbus")],
      vec![text("4"), text("Ohio"), text("Springfield")],
    ]
  );
  assert_eq!(
    rows(&w, "SELECT id, city_id FROM employees WHERE id IN ('E3', 'E4') ORDER BY id").await,
    vec![vec![text("E3"), text("1")], vec![text("E4"), text("4")]]
  );
}

#[tokio::test]
async fn unambiguous_children_are_unique_on_their_own() {
  let w = SqliteWarehouse::open_in_memory().await.unwrap();
  w.execute_batch(EMPLOYEES).await.unwrap();
  w.execute_batch("UPDATE employees SET jobtitle = 'Analyst II' WHERE id = 'E2'")
    .await
    .unwrap();
  w.run(options()).await.unwrap();

  let ddl = cell(&w, "SELECT sql FROM sqlite_master WHERE name = 'jobtitles'")
    .await
    .unwrap();
  assert!(ddl.contains("UNIQUE (jobtitle)"), "{ddl}");

  let cities = cell(&w, "SELECT sql FROM sqlite_master WHERE name = 'cities'")
    .await
    .unwrap();
  assert!(cities.contains("UNIQUE (state_id, name)"), "{cities}");
}

#[tokio::test]
async fn joins_reproduce_the_original_text() {
  let w = warehouse().await;
  let before = rows(
    &w,
    "SELECT id, race, gender, location, department, jobtitle, location_state, location_city
     FROM employees ORDER BY id",
  )
  .await;

  w.run(options()).await.unwrap();

  let after = rows(
    &w,
    "SELECT e.id, eth.name, g.name, l.name, d.name, j.jobtitle, s.name, c.name
     FROM employees e
     LEFT JOIN ethnicities eth ON eth.id = e.ethnicity_id
     JOIN genders g            ON g.id = e.gender_id
     JOIN locations l          ON l.id = e.location_id
     JOIN jobtitles j          ON j.id = e.jobtitle_id
     JOIN departments d        ON d.id = j.department_id
     JOIN cities c             ON c.id = e.city_id
     JOIN states s             ON s.id = c.state_id
     ORDER BY e.id",
  )
  .await;
  assert_eq!(before, after);

  let remaining = w
    .with_connection(|conn| {
      ["race", "gender", "location", "department", "jobtitle", "location_state", "location_city"]
        .into_iter()
        .filter_map(|c| match has_column(conn, "employees", c) {
          Ok(true) => Some(Ok(c)),
          Ok(false) => None,
          Err(e) => Some(Err(e)),
        })
        .collect::<rusqlite::Result<Vec<_>>>()
    })
    .await
    .unwrap();
  assert!(remaining.is_empty(), "source columns left behind: {remaining:?}");
}

// ─── Plan & ledger ───────────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_only_repeats_repeatable_steps() {
  let w = warehouse().await;
  let first = w.run(options()).await.unwrap();
  assert_eq!(first.applied().count(), PLAN.len());

  let later = RunOptions::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
  let second = w.run(later).await.unwrap();
  let applied: Vec<_> = second.applied().map(|r| r.step.as_str()).collect();
  assert_eq!(applied, [
    "derive-age",
    "null-underage-birthdates",
    "sentinel-late-termdates"
  ]);
  assert!(second
    .steps
    .iter()
    .filter(|r| r.step.starts_with("extract-"))
    .all(|r| r.outcome == StepOutcome::Skipped));

  // Ages move with the processing date; keys stay put.
  assert_eq!(cell(&w, "SELECT age FROM employees WHERE id = 'E1'").await, text("70"));
  assert_eq!(cell(&w, "SELECT jobtitle_id FROM employees WHERE id = 'E2'").await, text("3"));
}

#[tokio::test]
async fn status_tracks_the_ledger() {
  let w = warehouse().await;
  let before = w.status().await.unwrap();
  assert_eq!(before.len(), PLAN.len());
  assert!(before.iter().all(|s| s.is_pending()));

  let report = w.run(options()).await.unwrap();
  let after = w.status().await.unwrap();
  assert!(after.iter().all(|s| !s.is_pending() && s.run_id == Some(report.run_id)));

  let cities = after.iter().find(|s| s.step == "extract-cities").unwrap();
  assert_eq!(cities.rows_affected, Some(4));
  assert!(!cities.repeatable);
}

#[tokio::test]
async fn unknown_ledger_steps_are_rejected() {
  let w = warehouse().await;
  w.execute_batch(
    "INSERT INTO pipeline_steps VALUES ('extract-planets', 'x', '2024-01-01T00:00:00Z', 0)",
  )
  .await
  .unwrap();

  let err = w.run(options()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(roster_core::Error::UnknownStep(ref name)) if name == "extract-planets"
  ));
}

#[tokio::test]
async fn missing_fact_table_is_reported() {
  let w = SqliteWarehouse::open_in_memory().await.unwrap();
  let err = w.run(options()).await.unwrap_err();
  assert!(matches!(err, Error::MissingTable(ref t) if t == "employees"));
}

#[tokio::test]
async fn missing_source_column_is_reported_before_any_change() {
  let w = warehouse().await;
  w.execute_batch("ALTER TABLE employees DROP COLUMN location_city")
    .await
    .unwrap();

  let err = w.run(options()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::MissingColumn { ref column, .. } if column == "location_city"
  ));
  assert_eq!(
    cell(&w, "SELECT birthdate FROM employees WHERE id = 'E1'").await,
    text("02/05/1955")
  );
}

#[tokio::test]
async fn drop_waits_for_a_complete_backfill() {
  let w = warehouse().await;
  let ctx = StepContext {
    options:        options(),
    eligible_until: NaiveDate::from_ymd_opt(2006, 6, 1).unwrap(),
  };

  let outcome = w
    .with_connection(move |conn: &mut Connection| {
      let drop_race = Step::DropSource { column: "race", dimension: &ETHNICITIES };
      let before_extract = steps::apply(conn, &drop_race, &ctx)?;

      steps::apply(conn, &Step::Extract(&ETHNICITIES), &ctx)?;
      conn.execute("UPDATE employees SET ethnicity_id = NULL WHERE id = 'E1'", [])?;
      let after_unlink = steps::apply(conn, &drop_race, &ctx)?;
      let still_there = has_column(conn, "employees", "race")?;

      Ok((before_extract, after_unlink, still_there))
    })
    .await
    .unwrap();

  assert!(matches!(
    outcome.0,
    Outcome::Blocked(Blocker::KeyNotBuilt { ref key }) if key == "ethnicity_id"
  ));
  assert!(matches!(
    outcome.1,
    Outcome::Blocked(Blocker::Unmatched { ref key, rows: 1 }) if key == "ethnicity_id"
  ));
  assert!(outcome.2);
}

#[tokio::test]
async fn first_scoped_drop_checks_the_full_pair() {
  let w = warehouse().await;
  let ctx = StepContext {
    options:        options(),
    eligible_until: NaiveDate::from_ymd_opt(2006, 6, 1).unwrap(),
  };

  let outcome = w
    .with_connection(move |conn| {
      steps::apply(conn, &Step::Extract(&DEPARTMENTS), &ctx)?;
      steps::apply(conn, &Step::Extract(&JOBTITLES), &ctx)?;
      conn.execute("UPDATE employees SET jobtitle_id = NULL WHERE id = 'E2'", [])?;
      steps::apply(conn, &Step::DropSource { column: "jobtitle", dimension: &JOBTITLES }, &ctx)
    })
    .await
    .unwrap();

  assert!(matches!(
    outcome,
    Outcome::Blocked(Blocker::Unmatched { ref key, rows: 1 }) if key == "jobtitle_id"
  ));
}

#[tokio::test]
async fn missing_child_or_parent_text_leaves_the_key_null() {
  let w = warehouse().await;
  w.execute_batch(
    "UPDATE employees SET jobtitle = NULL WHERE id = 'E6';
     UPDATE employees SET department = NULL WHERE id = 'E3';
     UPDATE employees SET location_city = NULL WHERE id = 'E6';
     UPDATE employees SET location_state = NULL WHERE id = 'E1';",
  )
  .await
  .unwrap();

  let report = w.run(options()).await.unwrap();
  assert_eq!(report.applied().count(), PLAN.len());

  assert_eq!(
    rows(&w, "SELECT id, jobtitle_id, city_id FROM employees ORDER BY id").await,
    vec![
      vec![text("E1"), text("1"), None],
      vec![text("E2"), text("2"), text("3")],
      vec![text("E3"), None, text("1")],
      vec![text("E4"), text("3"), text("4")],
      vec![text("E5"), text("1"), text("2")],
      vec![text("E6"), None, None],
    ]
  );

  let audit = w.audit(options()).await.unwrap();
  assert!(audit.is_clean(), "{:?}", audit.violations);

  let again = w.run(options()).await.unwrap();
  assert!(again
    .steps
    .iter()
    .filter(|r| r.step.starts_with("drop-"))
    .all(|r| r.outcome == StepOutcome::Skipped));
}

#[tokio::test]
async fn out_of_range_years_are_treated_as_unparseable() {
  let w = warehouse().await;
  w.execute_batch("UPDATE employees SET birthdate = '01/01/20000' WHERE id = 'E1'")
    .await
    .unwrap();
  w.run(options()).await.unwrap();

  assert_eq!(
    rows(&w, "SELECT birthdate, age FROM employees WHERE id = 'E1'").await,
    vec![vec![None, None]]
  );
  let audit = w.audit(options()).await.unwrap();
  assert!(audit.is_clean(), "{:?}", audit.violations);
}

#[tokio::test]
async fn blank_categories_are_treated_as_missing() {
  let w = warehouse().await;
  w.execute_batch(
    "UPDATE employees SET race = '' WHERE id = 'E1';
     UPDATE employees SET gender = '   ' WHERE id = 'E2';
     UPDATE employees SET location_city = '' WHERE id = 'E4';",
  )
  .await
  .unwrap();
  w.run(options()).await.unwrap();

  assert_eq!(
    cell(&w, "SELECT COUNT(*) FROM ethnicities WHERE TRIM(name) = ''").await,
    text("0")
  );
  assert_eq!(rows(&w, "SELECT name FROM genders ORDER BY id").await, vec![
    vec![text("Female")],
    vec![text("Male")],
    vec![text("Non-Conforming")],
  ]);
  assert_eq!(
    rows(
      &w,
      "SELECT id, ethnicity_id, gender_id, city_id FROM employees
       WHERE id IN ('E1', 'E2', 'E4') ORDER BY id"
    )
    .await,
    vec![
      vec![text("E1"), None, text("2"), text("2")],
      vec![text("E2"), text("2"), None, text("3")],
      vec![text("E4"), text("1"), text("2"), None],
    ]
  );
  let audit = w.audit(options()).await.unwrap();
  assert!(audit.is_clean(), "{:?}", audit.violations);
}

// ─── Inspect & audit ─────────────────────────────────────────────────────────

#[tokio::test]
async fn inspect_reports_without_mutating() {
  let w = warehouse().await;
  let report = w.inspect().await.unwrap();

  let birthdate = &report.formats[0];
  assert_eq!(birthdate.column, "birthdate");
  assert_eq!(birthdate.scanned, 6);
  assert_eq!(birthdate.unmatched, 1);
  assert_eq!(birthdate.profiles.len(), 2);

  let jobtitles = &report.ambiguities[0];
  assert_eq!(jobtitles.table, "jobtitles");
  assert_eq!(jobtitles.ambiguous.len(), 1);
  assert_eq!(jobtitles.ambiguous[0].value, "Business Analyst");
  assert_eq!(report.ambiguities[1].ambiguous[0].parents, ["Illinois", "Ohio"]);

  assert_eq!(
    cell(&w, "SELECT birthdate FROM employees WHERE id = 'E1'").await,
    text("02/05/1955")
  );
  assert!(w.status().await.unwrap().iter().all(|s| s.is_pending()));
}

#[tokio::test]
async fn audit_is_clean_after_a_run() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();

  let report = w.audit(options()).await.unwrap();
  assert!(report.is_clean(), "{:?}", report.violations);
  assert!(report.checks.iter().any(|c| c == "unique-jobtitles"));
  assert!(report.checks.iter().any(|c| c == "references-city_id"));
}

#[tokio::test]
async fn audit_flags_stale_ages_and_dangling_keys() {
  let w = warehouse().await;
  w.run(options()).await.unwrap();
  w.execute_batch(
    "PRAGMA foreign_keys = OFF;
     UPDATE employees SET gender_id = 99 WHERE id = 'E1';
     PRAGMA foreign_keys = ON;",
  )
  .await
  .unwrap();

  let later = RunOptions::new(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap());
  let report = w.audit(later).await.unwrap();
  assert!(report.violations.contains(&Violation::StaleAge { rows: 3 }));
  assert!(report.violations.contains(&Violation::DanglingKey {
    table:  "genders".into(),
    column: "employees.gender_id".into(),
    rows:   1,
  }));
}
