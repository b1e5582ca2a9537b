//! Date format discovery and parsing for the raw employee columns.
//!
//! The source spreadsheet mixes `/`-delimited and `-`-delimited dates, and
//! neither carries an explicit field order. [`FormatReport::infer`] scans the
//! observed values, splits each into its three numeric components and decides
//! per delimiter which position holds the year, month and day. Parsing then
//! branches on the delimiter found in each value.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::{Error, Result};

/// Storage format for every retyped date column (ISO 8601 calendar date).
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Source format of `termdate`: a UTC timestamp written by the HR export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

// ─── Delimiters & orders ─────────────────────────────────────────────────────

/// A separator observed between date components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
  Slash,
  Dash,
}

impl Delimiter {
  pub const ALL: [Delimiter; 2] = [Delimiter::Slash, Delimiter::Dash];

  pub fn as_char(self) -> char {
    match self {
      Delimiter::Slash => '/',
      Delimiter::Dash => '-',
    }
  }

  /// The first known delimiter present in `text`, if any.
  pub fn detect(text: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|d| text.contains(d.as_char()))
  }
}

/// Positional order of the year, month and day components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
  #[default]
  MonthDayYear,
  DayMonthYear,
  YearMonthDay,
}

impl DateOrder {
  /// Rearrange components in source order into `(year, month, day)`.
  fn arrange<T>(self, [a, b, c]: [T; 3]) -> (T, T, T) {
    match self {
      DateOrder::MonthDayYear => (c, a, b),
      DateOrder::DayMonthYear => (c, b, a),
      DateOrder::YearMonthDay => (a, b, c),
    }
  }
}

/// A concrete, parseable date layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateFormat {
  pub delimiter: Delimiter,
  pub order:     DateOrder,
}

impl DateFormat {
  /// Parse `text` with this layout.
  ///
  /// Returns `None` for anything that is not exactly three numeric components
  /// forming a real calendar date. Two-digit years pivot like `%y`:
  /// `00..=69` map to the 2000s and `70..=99` to the 1900s.
  pub fn parse(&self, text: &str) -> Option<NaiveDate> {
    let parts = split_components(text.trim(), self.delimiter)?;
    let (year, month, day) = self.order.arrange(parts);
    let year = expand_year(year)?;
    NaiveDate::from_ymd_opt(year, month.value, day.value)
  }
}

// ─── Component statistics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Component<'a> {
  text:  &'a str,
  value: u32,
}

fn split_components<'a>(
  text: &'a str,
  delimiter: Delimiter,
) -> Option<[Component<'a>; 3]> {
  let mut parts = text.split(delimiter.as_char());
  let mut next = || -> Option<Component<'a>> {
    let text = parts.next()?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
      return None;
    }
    Some(Component { text, value: text.parse().ok()? })
  };
  let components = [next()?, next()?, next()?];
  if parts.next().is_some() {
    return None;
  }
  Some(components)
}

/// Years that render as exactly four digits in [`ISO_FORMAT`]. Stored dates
/// are compared as text, so anything outside this range would misorder.
const YEARS: std::ops::RangeInclusive<i32> = 1000..=9999;

fn expand_year(year: Component<'_>) -> Option<i32> {
  let value = i32::try_from(year.value).ok()?;
  match year.text.len() {
    1 | 2 if value < 70 => Some(2000 + value),
    1 | 2 => Some(1900 + value),
    _ => Some(value).filter(|y| YEARS.contains(y)),
  }
}

/// Observed value range of one positional component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComponentRange {
  pub min:       u32,
  pub max:       u32,
  /// Widest textual form seen, e.g. `2` for two-digit years.
  pub max_width: usize,
}

impl ComponentRange {
  fn observe(&mut self, first: bool, component: Component<'_>) {
    if first {
      *self = ComponentRange {
        min:       component.value,
        max:       component.value,
        max_width: component.text.len(),
      };
      return;
    }
    self.min = self.min.min(component.value);
    self.max = self.max.max(component.value);
    self.max_width = self.max_width.max(component.text.len());
  }
}

/// Everything learned about one delimiter's values within a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelimiterProfile {
  pub delimiter:  Delimiter,
  /// Values that split cleanly into three numeric components.
  pub rows:       usize,
  pub components: [ComponentRange; 3],
  pub order:      DateOrder,
  /// `true` when the observed ranges could not pin down the order and
  /// [`DateOrder::MonthDayYear`] was assumed.
  pub ambiguous:  bool,
}

impl DelimiterProfile {
  pub fn format(&self) -> DateFormat {
    DateFormat { delimiter: self.delimiter, order: self.order }
  }

  /// Decide the component order from the observed ranges.
  ///
  /// A position whose maximum exceeds 31 (or that is written with four
  /// digits) can only be the year. Of the other two, one whose maximum
  /// exceeds 12 can only be the day.
  fn resolve_order(components: &[ComponentRange; 3]) -> (DateOrder, bool) {
    let year_positions: Vec<usize> = (0..3)
      .filter(|&i| components[i].max > 31 || components[i].max_width == 4)
      .collect();

    match year_positions.as_slice() {
      [0] => (DateOrder::YearMonthDay, false),
      [2] => match (components[0].max > 12, components[1].max > 12) {
        (false, true) => (DateOrder::MonthDayYear, false),
        (true, false) => (DateOrder::DayMonthYear, false),
        _ => (DateOrder::MonthDayYear, true),
      },
      _ => (DateOrder::MonthDayYear, true),
    }
  }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

/// Result of scanning one raw date column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatReport {
  pub column:    String,
  /// Non-null values scanned.
  pub scanned:   usize,
  /// Values matching no known delimiter pattern; these parse to null.
  pub unmatched: usize,
  pub profiles:  Vec<DelimiterProfile>,
}

impl FormatReport {
  /// Discover the delimiters and component orders used by `values`.
  pub fn infer<'a>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = &'a str>,
  ) -> Self {
    let mut ranges = [[ComponentRange::default(); 3]; 2];
    let mut counts = [0usize; 2];
    let mut scanned = 0;
    let mut unmatched = 0;

    for value in values {
      scanned += 1;
      let value = value.trim();
      let Some(delimiter) = Delimiter::detect(value) else {
        unmatched += 1;
        continue;
      };
      let Some(parts) = split_components(value, delimiter) else {
        unmatched += 1;
        continue;
      };
      let slot = delimiter as usize;
      let first = counts[slot] == 0;
      for (range, part) in ranges[slot].iter_mut().zip(parts) {
        range.observe(first, part);
      }
      counts[slot] += 1;
    }

    let profiles = Delimiter::ALL
      .into_iter()
      .filter(|d| counts[*d as usize] > 0)
      .map(|delimiter| {
        let components = ranges[delimiter as usize];
        let (order, ambiguous) = DelimiterProfile::resolve_order(&components);
        DelimiterProfile {
          delimiter,
          rows: counts[delimiter as usize],
          components,
          order,
          ambiguous,
        }
      })
      .collect();

    Self { column: column.into(), scanned, unmatched, profiles }
  }

  pub fn format_for(&self, delimiter: Delimiter) -> Option<DateFormat> {
    self
      .profiles
      .iter()
      .find(|p| p.delimiter == delimiter)
      .map(DelimiterProfile::format)
  }

  /// Parse one raw value by branching on its delimiter.
  pub fn parse(&self, text: &str) -> Option<NaiveDate> {
    let delimiter = Delimiter::detect(text)?;
    self.format_for(delimiter)?.parse(text)
  }
}

// ─── Termination timestamps ──────────────────────────────────────────────────

/// Parse a `termdate` value, keeping only its calendar date.
///
/// Empty strings mean "still employed" and yield `None`, as does anything that
/// is not a recognised timestamp. Plain ISO dates are accepted so that an
/// already-normalised column parses to itself.
pub fn parse_termination(text: &str) -> Option<NaiveDate> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
    .map(|dt| dt.date())
    .or_else(|_| NaiveDate::parse_from_str(text, ISO_FORMAT))
    .ok()
    .filter(|date| YEARS.contains(&date.year()))
}

/// Parse a value stored in [`ISO_FORMAT`].
pub fn parse_iso(text: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(text.trim(), ISO_FORMAT).ok()
}

pub fn format_iso(date: NaiveDate) -> String {
  date.format(ISO_FORMAT).to_string()
}

// ─── Age ─────────────────────────────────────────────────────────────────────

/// Completed years between `birth` and `as_of`; `None` if `birth` is later.
pub fn whole_years(birth: NaiveDate, as_of: NaiveDate) -> Option<u32> {
  if birth > as_of {
    return None;
  }
  let mut years = as_of.year() - birth.year();
  if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
    years -= 1;
  }
  u32::try_from(years).ok()
}

/// The latest birthdate that is still at least `min_age` years before
/// `as_of`. Anything after it belongs to someone too young to be employed.
pub fn latest_eligible_birthdate(as_of: NaiveDate, min_age: u32) -> Result<NaiveDate> {
  min_age
    .checked_mul(12)
    .and_then(|months| as_of.checked_sub_months(Months::new(months)))
    .ok_or(Error::DateOutOfRange { from: as_of, years: min_age })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn discovers_month_day_year_from_ranges() {
    let report = FormatReport::infer(
      "birthdate",
      ["02/05/1955", "12/28/1988", "6/13/1972", "01/01/2001"],
    );
    assert_eq!(report.profiles.len(), 1);
    let profile = &report.profiles[0];
    assert_eq!(profile.delimiter, Delimiter::Slash);
    assert_eq!(profile.order, DateOrder::MonthDayYear);
    assert!(!profile.ambiguous);
    assert_eq!(profile.components[2].max, 2001);
    assert_eq!(report.parse("02/05/1955"), Some(ymd(1955, 2, 5)));
  }

  #[test]
  fn each_delimiter_gets_its_own_profile() {
    let report = FormatReport::infer(
      "hire_date",
      [
        "04/20/2003",
        "11/15/2010",
        "06-29-09",
        "01-20-14",
        "06-04-91",
        "garbage",
      ],
    );
    assert_eq!(report.scanned, 6);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.profiles.len(), 2);

    let dash = report.format_for(Delimiter::Dash).unwrap();
    assert_eq!(dash.order, DateOrder::MonthDayYear);
    assert_eq!(report.parse("06-29-09"), Some(ymd(2009, 6, 29)));
    assert_eq!(report.parse("garbage"), None);
  }

  #[test]
  fn detects_day_first_and_year_first() {
    let dmy = FormatReport::infer("d", ["25/03/1990", "01/12/1985"]);
    assert_eq!(dmy.profiles[0].order, DateOrder::DayMonthYear);
    assert_eq!(dmy.parse("01/12/1985"), Some(ymd(1985, 12, 1)));

    let ymd_report = FormatReport::infer("d", ["2001-03-04", "1999-12-31"]);
    assert_eq!(ymd_report.profiles[0].order, DateOrder::YearMonthDay);
    assert_eq!(ymd_report.parse("1999-12-31"), Some(ymd(1999, 12, 31)));
  }

  #[test]
  fn indistinct_ranges_fall_back_to_month_first() {
    let report = FormatReport::infer("d", ["01/02/1990", "03/04/1991"]);
    assert_eq!(report.profiles[0].order, DateOrder::MonthDayYear);
    assert!(report.profiles[0].ambiguous);
  }

  #[test]
  fn two_digit_years_pivot_at_seventy() {
    let format = DateFormat {
      delimiter: Delimiter::Dash,
      order:     DateOrder::MonthDayYear,
    };
    assert_eq!(format.parse("03-15-69"), Some(ymd(2069, 3, 15)));
    assert_eq!(format.parse("03-15-70"), Some(ymd(1970, 3, 15)));
  }

  #[test]
  fn impossible_dates_parse_to_none() {
    let format = DateFormat {
      delimiter: Delimiter::Slash,
      order:     DateOrder::MonthDayYear,
    };
    assert_eq!(format.parse("02/30/1990"), None);
    assert_eq!(format.parse("1/2/3/4"), None);
    assert_eq!(format.parse("ab/01/1990"), None);
  }

  #[test]
  fn years_outside_four_digits_are_rejected() {
    let format = DateFormat {
      delimiter: Delimiter::Slash,
      order:     DateOrder::MonthDayYear,
    };
    assert_eq!(format.parse("01/01/20000"), None);
    assert_eq!(format.parse("01/01/199"), None);
    assert_eq!(format.parse("01/01/0999"), None);
    assert_eq!(format.parse("01/01/9999"), Some(ymd(9999, 1, 1)));

    let report = FormatReport::infer("birthdate", ["01/01/20000", "02/05/1955"]);
    assert_eq!(report.parse("01/01/20000"), None);
    assert_eq!(parse_termination("20000-01-01 00:00:00 UTC"), None);
  }

  #[test]
  fn termination_timestamps_truncate_to_date() {
    assert_eq!(parse_termination(""), None);
    assert_eq!(parse_termination("   "), None);
    assert_eq!(
      parse_termination("2021-03-15 00:00:00 UTC"),
      Some(ymd(2021, 3, 15))
    );
    assert_eq!(
      parse_termination("2019-11-02 17:45:10 UTC"),
      Some(ymd(2019, 11, 2))
    );
    assert_eq!(parse_termination("2020-01-31"), Some(ymd(2020, 1, 31)));
    assert_eq!(parse_termination("yesterday"), None);
  }

  #[test]
  fn whole_years_counts_completed_birthdays() {
    let as_of = ymd(2024, 6, 15);
    assert_eq!(whole_years(ymd(1990, 6, 15), as_of), Some(34));
    assert_eq!(whole_years(ymd(1990, 6, 16), as_of), Some(33));
    assert_eq!(whole_years(ymd(2030, 1, 1), as_of), None);
  }

  #[test]
  fn eligibility_cutoff_matches_whole_years() {
    let as_of = ymd(2024, 2, 29);
    let cutoff = latest_eligible_birthdate(as_of, 18).unwrap();
    assert_eq!(cutoff, ymd(2006, 2, 28));
    assert_eq!(whole_years(cutoff, as_of), Some(18));
    assert_eq!(whole_years(ymd(2006, 3, 1), as_of), Some(17));
  }
}
