//! Plain-text rendering of reports for the terminal.

use std::fmt::Write as _;

use roster_core::{
  date::{DateOrder, DelimiterProfile},
  report::{AuditReport, InspectReport, RunReport, StepOutcome, StepStatus, Violation},
};

pub fn run(report: &RunReport) -> String {
  let mut out = format!("run {} (as of {})\n", report.run_id, report.as_of);
  for record in &report.steps {
    match record.outcome {
      StepOutcome::Applied { rows } => {
        let _ = writeln!(out, "  {:<28} applied  {rows} rows", record.step);
      }
      StepOutcome::Skipped => {
        let _ = writeln!(out, "  {:<28} skipped", record.step);
      }
    }
  }
  out
}

pub fn status(steps: &[StepStatus]) -> String {
  let mut out = String::new();
  for s in steps {
    let kind = if s.repeatable { "repeatable" } else { "once" };
    match (s.applied_at, s.rows_affected) {
      (Some(at), rows) => {
        let rows = rows.map_or_else(|| "?".to_owned(), |r| r.to_string());
        let _ = writeln!(
          out,
          "  {:<28} {kind:<10} applied {} ({rows} rows)",
          s.step,
          at.format("%Y-%m-%d %H:%M:%S")
        );
      }
      (None, _) => {
        let _ = writeln!(out, "  {:<28} {kind:<10} pending", s.step);
      }
    }
  }
  out
}

fn order(order: DateOrder) -> &'static str {
  match order {
    DateOrder::MonthDayYear => "month/day/year",
    DateOrder::DayMonthYear => "day/month/year",
    DateOrder::YearMonthDay => "year/month/day",
  }
}

fn profile(out: &mut String, p: &DelimiterProfile) {
  let ranges = p
    .components
    .iter()
    .map(|c| format!("{}..{}", c.min, c.max))
    .collect::<Vec<_>>()
    .join(", ");
  let _ = writeln!(
    out,
    "    '{}'  {} rows  [{ranges}]  {}{}",
    p.delimiter.as_char(),
    p.rows,
    order(p.order),
    if p.ambiguous { " (assumed)" } else { "" }
  );
}

pub fn inspect(report: &InspectReport) -> String {
  let mut out = String::new();
  for format in &report.formats {
    let _ = writeln!(
      out,
      "{}: {} values, {} unparseable",
      format.column, format.scanned, format.unmatched
    );
    for p in &format.profiles {
      profile(&mut out, p);
    }
  }
  for ambiguity in &report.ambiguities {
    if ambiguity.ambiguous.is_empty() {
      let _ = writeln!(out, "{}: unique on its own", ambiguity.table);
      continue;
    }
    let _ = writeln!(
      out,
      "{}: {} values repeat across parents",
      ambiguity.table,
      ambiguity.ambiguous.len()
    );
    for value in &ambiguity.ambiguous {
      let _ = writeln!(out, "    {} ({})", value.value, value.parents.join(", "));
    }
  }
  out
}

fn violation(v: &Violation) -> String {
  match v {
    Violation::UnderageBirthdate { rows } => {
      format!("{rows} birthdates are below the minimum working age")
    }
    Violation::AgeNullMismatch { rows } => {
      format!("{rows} rows have age and birthdate disagreeing on null")
    }
    Violation::StaleAge { rows } => format!("{rows} ages are out of date"),
    Violation::LateTermdate { rows } => {
      format!("{rows} termination dates fall on or after the latest hire")
    }
    Violation::DuplicateNaturalKey { table, keys } => {
      format!("{table}: {keys} natural keys occur more than once")
    }
    Violation::DanglingKey { table, column, rows } => {
      format!("{column}: {rows} keys do not exist in {table}")
    }
    Violation::MissingKey { column, rows } => {
      format!("{column}: {rows} rows with source text have no key")
    }
  }
}

pub fn audit(report: &AuditReport) -> String {
  let mut out = format!("{} checks run\n", report.checks.len());
  if report.is_clean() {
    out.push_str("  no violations\n");
  }
  for v in &report.violations {
    let _ = writeln!(out, "  {}", violation(v));
  }
  out
}
