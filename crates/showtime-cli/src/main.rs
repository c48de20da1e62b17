//! `showtime` — ingest scraped showtime batches into the SQLite store.
//!
//! Reads `showtime.toml` (or the path given with `--config`) layered under
//! `SHOWTIME_*` environment variables.
//!
//! ```text
//! showtime ingest batch.json
//! scraper | showtime ingest -
//! showtime aggregates
//! ```

mod retry;
mod settings;

use std::{
  fs::File,
  io::{self, BufReader, Read},
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use showtime_core::{
  aggregate::RefreshStrategy,
  ingest::{FactAction, IdentifierPolicy},
  showtime::NewShowtime,
  store::ShowtimeStore,
};
use showtime_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Showtime fact ingestion")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "showtime.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest a JSON array of showtime records as one batch.
  Ingest {
    /// Batch file, or `-` for stdin.
    file:         PathBuf,
    /// Move rows whose id reappears under a new key instead of failing.
    #[arg(long)]
    rekey:        bool,
    /// Rebuild every aggregate instead of repairing the batch's keys.
    #[arg(long)]
    full_rebuild: bool,
  },
  /// Drop and recompute all aggregates.
  Rebuild,
  /// Print every stored fact as JSON.
  Facts,
  /// Print every aggregate with its representative fact as JSON.
  Aggregates,
  /// Report aggregates whose fact has moved to another key.
  Audit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = settings.resolved_store_path();
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store =
    SqliteStore::open_with_busy_timeout(&store_path, settings.busy_timeout())
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Ingest { file, rekey, full_rebuild } => {
      let mut options = settings.ingest_options();
      if rekey {
        options.identifiers = IdentifierPolicy::Rekey;
      }
      if full_rebuild {
        options.refresh = RefreshStrategy::FullRebuild;
      }

      let batch = read_batch(&file)?;
      tracing::info!(records = batch.len(), ?options, "ingesting batch");

      let result = retry::retry_transient(
        settings.max_attempts,
        showtime_store_sqlite::Error::is_transient,
        || store.ingest(batch.clone(), options),
      )
      .await
      .inspect_err(|e| {
        if let Some(record) = e.conflict() {
          tracing::error!(
            showtime_id = %record.showtime_id,
            cinema = %record.cinema_name,
            movie = %record.movie_title,
            "batch rolled back on identifier conflict"
          );
        }
      })
      .context("batch was not applied")?;

      tracing::info!(
        batch_id = %result.batch_id,
        inserted = result.count(FactAction::Inserted),
        merged = result.count(FactAction::Merged),
        rekeyed = result.count(FactAction::Rekeyed),
        aggregates = result.aggregates_refreshed,
        "batch committed"
      );
      print_json(&result)
    }
    Command::Rebuild => {
      let written = store.rebuild_aggregates().await?;
      tracing::info!(aggregates = written, "aggregates rebuilt");
      Ok(())
    }
    Command::Facts => print_json(&store.list_facts().await?),
    Command::Aggregates => print_json(&store.list_aggregates().await?),
    Command::Audit => {
      let stale = store.stale_aggregates().await?;
      if stale.is_empty() {
        tracing::info!("no stale aggregates");
        return Ok(());
      }
      print_json(&stale)?;
      anyhow::bail!("{} stale aggregate(s); run `showtime rebuild`", stale.len())
    }
  }
}

/// Parse a batch from a file, or stdin when `path` is `-`.
fn read_batch(path: &Path) -> anyhow::Result<Vec<NewShowtime>> {
  let reader: Box<dyn Read> = if path.as_os_str() == "-" {
    Box::new(io::stdin().lock())
  } else {
    Box::new(
      File::open(path).with_context(|| format!("failed to open {path:?}"))?,
    )
  };
  serde_json::from_reader(BufReader::new(reader))
    .with_context(|| format!("failed to parse showtime batch from {path:?}"))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  serde_json::to_writer_pretty(io::stdout().lock(), value)?;
  println!();
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  fn batch_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn reads_batch_from_file() {
    let file = batch_file(
      r#"[
        {
          "showtimeId": "a1",
          "movieTitle": "Dune",
          "cinemaName": "Roxy",
          "showtimeInUTC": "2024-03-01T19:30:00Z",
          "bookingLink": "https://roxy.example/book/a1",
          "attributes": ["IMAX"]
        },
        {
          "showtimeId": "b2",
          "movieTitle": "Arrival",
          "cinemaName": "Vue",
          "showtimeInUTC": "2024-03-02T18:00:00+01:00",
          "bookingLink": "https://vue.example/b2",
          "attributes": [],
          "city": "Leeds"
        }
      ]"#,
    );

    let batch = read_batch(file.path()).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].showtime_id, "a1");
    assert_eq!(batch[0].city, None);
    assert_eq!(batch[1].city.as_deref(), Some("Leeds"));
    assert_eq!(batch[1].starts_at.to_rfc3339(), "2024-03-02T17:00:00+00:00");
  }

  #[test]
  fn empty_array_is_an_empty_batch() {
    let file = batch_file("[]");
    assert!(read_batch(file.path()).unwrap().is_empty());
  }

  #[test]
  fn malformed_json_names_the_source() {
    let file = batch_file(r#"[{"showtimeId": "a1"}]"#);
    let err = read_batch(file.path()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("failed to parse showtime batch"), "{message}");
    assert!(message.contains("movieTitle"), "{message}");
  }

  #[test]
  fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_batch(&dir.path().join("nope.json")).unwrap_err();
    assert!(format!("{err:#}").contains("failed to open"));
  }
}
