//! Runtime configuration, read from `showtime.toml` and `SHOWTIME_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;
use showtime_core::{
  aggregate::RefreshStrategy,
  ingest::{IdentifierPolicy, IngestOptions},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:      PathBuf,
  /// How long a batch waits on another writer's lock.
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms: u64,
  /// Attempts per batch, including the first, on transient failures.
  #[serde(default = "default_max_attempts")]
  pub max_attempts:    u32,
  #[serde(default)]
  pub refresh:         RefreshStrategy,
  #[serde(default)]
  pub identifiers:     IdentifierPolicy,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/showtime/showtime.db") }

fn default_busy_timeout_ms() -> u64 { 5_000 }

fn default_max_attempts() -> u32 { 3 }

impl Settings {
  /// Layer `path` (optional) under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SHOWTIME"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn ingest_options(&self) -> IngestOptions {
    IngestOptions {
      refresh:     self.refresh,
      identifiers: self.identifiers,
    }
  }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

  /// `store_path` with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
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
  use std::io::Write as _;

  use super::*;

  #[test]
  fn defaults_apply_without_a_file() {
    let settings = Settings::load(Path::new("does-not-exist.toml")).unwrap();
    assert_eq!(settings.max_attempts, 3);
    assert_eq!(settings.busy_timeout(), Duration::from_secs(5));
    assert_eq!(settings.ingest_options(), IngestOptions::default());
  }

  #[test]
  fn reads_policies_from_toml() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      "store_path = \"/tmp/st.db\"\nrefresh = \"full_rebuild\"\nidentifiers = \"rekey\"\nmax_attempts = 5"
    )
    .unwrap();

    let settings = Settings::load(file.path()).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("/tmp/st.db"));
    assert_eq!(settings.max_attempts, 5);
    assert_eq!(settings.refresh, RefreshStrategy::FullRebuild);
    assert_eq!(settings.identifiers, IdentifierPolicy::Rekey);
  }

  #[test]
  fn tilde_is_expanded() {
    let settings = Settings {
      store_path:      PathBuf::from("/abs/st.db"),
      busy_timeout_ms: 1,
      max_attempts:    1,
      refresh:         RefreshStrategy::default(),
      identifiers:     IdentifierPolicy::default(),
    };
    assert_eq!(settings.resolved_store_path(), PathBuf::from("/abs/st.db"));

    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(
        expand_tilde(Path::new("~/x.db")),
        PathBuf::from(home).join("x.db")
      );
    }
  }
}
