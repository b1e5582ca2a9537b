//! The dimension catalogue of the employee snowflake schema.
//!
//! Every dimension is described once, as data, and extracted by a single
//! generic builder in the storage backend. A [`Shape::Simple`] dimension is a
//! distinct-value list of one source column. A [`Shape::Scoped`] dimension
//! holds a child value under a parent dimension (a job title within a
//! department, a city within a state); whether the child text is unique on its
//! own is decided from the data by [`AmbiguityReport`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// The fact table every dimension is extracted from.
pub const FACT_TABLE: &str = "employees";

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum Shape {
  /// `(id, name)` populated from one fact column.
  Simple {
    source: &'static str,
  },
  /// `(id, <parent_key>, <column>)` populated from a `(parent, child)` pair
  /// of fact columns. The parent is stored by surrogate key, not by text.
  Scoped {
    parent:     &'static Dimension,
    parent_key: &'static str,
    source:     &'static str,
    column:     &'static str,
  },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Dimension {
  pub table:    &'static str,
  pub shape:    Shape,
  /// Foreign-key column added to the fact table, if the fact table refers to
  /// this dimension directly. Parents of scoped dimensions are reached through
  /// their child instead.
  pub fact_key: Option<&'static str>,
}

impl Dimension {
  /// Column in the dimension table holding the natural (text) value.
  pub fn value_column(&self) -> &'static str {
    match self.shape {
      Shape::Simple { .. } => "name",
      Shape::Scoped { column, .. } => column,
    }
  }

  /// Fact column the dimension's own value is read from.
  pub fn source(&self) -> &'static str {
    match self.shape {
      Shape::Simple { source } | Shape::Scoped { source, .. } => source,
    }
  }

  /// Every fact column needed to match a fact row to this dimension, parent
  /// columns first.
  pub fn source_columns(&self) -> Vec<&'static str> {
    match self.shape {
      Shape::Simple { source } => vec![source],
      Shape::Scoped { parent, source, .. } => {
        let mut columns = parent.source_columns();
        columns.push(source);
        columns
      }
    }
  }

  pub fn parent(&self) -> Option<&'static Dimension> {
    match self.shape {
      Shape::Simple { .. } => None,
      Shape::Scoped { parent, .. } => Some(parent),
    }
  }
}

// ─── Catalogue ───────────────────────────────────────────────────────────────

pub const ETHNICITIES: Dimension = Dimension {
  table:    "ethnicities",
  shape:    Shape::Simple { source: "race" },
  fact_key: Some("ethnicity_id"),
};

pub const GENDERS: Dimension = Dimension {
  table:    "genders",
  shape:    Shape::Simple { source: "gender" },
  fact_key: Some("gender_id"),
};

pub const LOCATIONS: Dimension = Dimension {
  table:    "locations",
  shape:    Shape::Simple { source: "location" },
  fact_key: Some("location_id"),
};

pub const DEPARTMENTS: Dimension = Dimension {
  table:    "departments",
  shape:    Shape::Simple { source: "department" },
  fact_key: None,
};

pub const JOBTITLES: Dimension = Dimension {
  table:    "jobtitles",
  shape:    Shape::Scoped {
    parent:     &DEPARTMENTS,
    parent_key: "department_id",
    source:     "jobtitle",
    column:     "jobtitle",
  },
  fact_key: Some("jobtitle_id"),
};

pub const STATES: Dimension = Dimension {
  table:    "states",
  shape:    Shape::Simple { source: "location_state" },
  fact_key: None,
};

pub const CITIES: Dimension = Dimension {
  table:    "cities",
  shape:    Shape::Scoped {
    parent:     &STATES,
    parent_key: "state_id",
    source:     "location_city",
    column:     "name",
  },
  fact_key: Some("city_id"),
};

/// Every dimension in extraction order; parents precede their children.
pub const DIMENSIONS: [&Dimension; 7] = [
  &ETHNICITIES,
  &GENDERS,
  &LOCATIONS,
  &DEPARTMENTS,
  &JOBTITLES,
  &STATES,
  &CITIES,
];

// ─── Key scope ───────────────────────────────────────────────────────────────

/// Where a scoped dimension's child value is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
  /// The child text alone identifies a row.
  Global,
  /// The same child text recurs under different parents; only the
  /// `(parent, child)` pair identifies a row.
  Parent,
}

/// A child value observed under more than one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousValue {
  pub value:   String,
  pub parents: Vec<String>,
}

/// Outcome of checking whether a scoped dimension's child column is unique on
/// its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguityReport {
  pub table:     String,
  pub ambiguous: Vec<AmbiguousValue>,
}

impl AmbiguityReport {
  /// Group `(parent, child)` pairs by child and keep every child seen under
  /// more than one distinct parent.
  pub fn from_pairs(
    table: impl Into<String>,
    pairs: impl IntoIterator<Item = (String, String)>,
  ) -> Self {
    let mut by_child: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (parent, child) in pairs {
      by_child.entry(child).or_default().insert(parent);
    }

    let ambiguous = by_child
      .into_iter()
      .filter(|(_, parents)| parents.len() > 1)
      .map(|(value, parents)| AmbiguousValue {
        value,
        parents: parents.into_iter().collect(),
      })
      .collect();

    Self { table: table.into(), ambiguous }
  }

  pub fn scope(&self) -> KeyScope {
    if self.ambiguous.is_empty() {
      KeyScope::Global
    } else {
      KeyScope::Parent
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pair(parent: &str, child: &str) -> (String, String) {
    (parent.to_owned(), child.to_owned())
  }

  #[test]
  fn repeated_child_under_two_parents_is_ambiguous() {
    let report = AmbiguityReport::from_pairs(
      "jobtitles",
      [
        pair("Engineering", "Business Analyst"),
        pair("Product Management", "Business Analyst"),
        pair("Engineering", "Software Engineer I"),
        pair("Engineering", "Business Analyst"),
      ],
    );
    assert_eq!(report.scope(), KeyScope::Parent);
    assert_eq!(report.ambiguous, vec![AmbiguousValue {
      value:   "Business Analyst".into(),
      parents: vec!["Engineering".into(), "Product Management".into()],
    }]);
  }

  #[test]
  fn unique_children_keep_a_global_scope() {
    let report = AmbiguityReport::from_pairs(
      "cities",
      [pair("Ohio", "Cleveland"), pair("Michigan", "Detroit")],
    );
    assert_eq!(report.scope(), KeyScope::Global);
    assert!(report.ambiguous.is_empty());
  }

  #[test]
  fn scoped_sources_list_parent_first() {
    assert_eq!(JOBTITLES.source_columns(), ["department", "jobtitle"]);
    assert_eq!(CITIES.source_columns(), ["location_state", "location_city"]);
    assert_eq!(ETHNICITIES.source_columns(), ["race"]);
    assert_eq!(CITIES.value_column(), "name");
    assert_eq!(JOBTITLES.parent(), Some(&DEPARTMENTS));
  }

  #[test]
  fn parents_are_extracted_before_children() {
    for (i, dimension) in DIMENSIONS.iter().enumerate() {
      if let Some(parent) = dimension.parent() {
        let parent_pos = DIMENSIONS.iter().position(|d| *d == parent).unwrap();
        assert!(parent_pos < i, "{} extracted before its parent", dimension.table);
      }
    }
  }
}
