//! Runtime configuration, layered from `roster.toml` and `ROSTER_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use roster_core::plan::{DEFAULT_MIN_WORKING_AGE, default_termdate_sentinel};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
  /// SQLite file holding the staged `employees` table.
  #[serde(default = "default_database")]
  pub database:          PathBuf,
  /// Fixed processing date; today when unset.
  #[serde(default)]
  pub as_of:             Option<NaiveDate>,
  #[serde(default = "default_min_working_age")]
  pub min_working_age:   u32,
  #[serde(default = "default_termdate_sentinel")]
  pub termdate_sentinel: NaiveDate,
}

fn default_database() -> PathBuf { PathBuf::from("roster.db") }

fn default_min_working_age() -> u32 { DEFAULT_MIN_WORKING_AGE }

impl RosterConfig {
  /// Read `path` if it exists, then overlay the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ROSTER").try_parsing(true))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    settings
      .try_deserialize()
      .context("failed to deserialise RosterConfig")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let cfg = RosterConfig::load(Path::new("/nonexistent/roster.toml")).unwrap();
    assert_eq!(cfg.min_working_age, 18);
    assert_eq!(cfg.termdate_sentinel, NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
  }

  #[test]
  fn tilde_is_expanded_only_at_the_start() {
    let home = std::env::var("HOME").unwrap();
    assert_eq!(
      expand_tilde(Path::new("~/hr/roster.db")),
      PathBuf::from(home).join("hr/roster.db")
    );
    assert_eq!(expand_tilde(Path::new("data/~/x.db")), PathBuf::from("data/~/x.db"));
  }
}
