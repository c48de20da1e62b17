//! [`SqliteStore`] — the SQLite implementation of [`ShowtimeStore`].

use std::{collections::BTreeSet, path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use showtime_core::{
  aggregate::{AggregateView, RefreshStrategy, ShowtimeAggregate},
  ingest::{FactOutcome, IngestOptions, IngestResult},
  showtime::{validate_batch, NewShowtime, ShowtimeFact},
  store::ShowtimeStore,
};
use uuid::Uuid;

use crate::{
  aggregates,
  encode::{RawAggregate, RawFact, AGGREGATE_COLUMNS, FACT_COLUMNS},
  facts,
  schema::SCHEMA,
  Result,
};

/// How long a batch waits for another connection's write lock by default.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A showtime store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. Separate
/// `open` calls on the same file give independent connections whose batches
/// are serialised by SQLite's write lock.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT).await
  }

  /// Like [`SqliteStore::open`], with an explicit lock wait.
  pub async fn open_with_busy_timeout(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Batch transaction ───────────────────────────────────────────────────────

/// Apply a batch and repair its aggregates in one `IMMEDIATE` transaction.
///
/// Any error returns before `commit`, and dropping the transaction rolls back
/// every fact and aggregate write made so far.
fn apply_batch(
  conn: &mut Connection,
  batch: &[NewShowtime],
  options: IngestOptions,
) -> Result<(Vec<FactOutcome>, usize)> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let now = Utc::now();

  let mut outcomes = Vec::with_capacity(batch.len());
  let mut touched = BTreeSet::new();
  for record in batch {
    let applied = facts::upsert(&tx, record, options.identifiers, now)?;
    touched.extend(applied.touched);
    outcomes.push(applied.outcome);
  }

  let refreshed = match options.refresh {
    RefreshStrategy::Incremental => aggregates::refresh(&tx, &touched, now)?,
    RefreshStrategy::FullRebuild => aggregates::rebuild(&tx, now)?,
  };

  tx.commit()?;
  Ok((outcomes, refreshed))
}

fn rebuild_all(conn: &mut Connection) -> Result<usize> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let written = aggregates::rebuild(&tx, Utc::now())?;
  tx.commit()?;
  Ok(written)
}

// ─── ShowtimeStore impl ──────────────────────────────────────────────────────

impl ShowtimeStore for SqliteStore {
  type Error = crate::Error;

  async fn ingest(
    &self,
    batch: Vec<NewShowtime>,
    options: IngestOptions,
  ) -> Result<IngestResult> {
    validate_batch(&batch)?;
    let batch_id = Uuid::new_v4();

    let (outcomes, aggregates_refreshed) = self
      .conn
      .call(move |conn| Ok(apply_batch(conn, &batch, options)))
      .await??;

    Ok(IngestResult { batch_id, outcomes, aggregates_refreshed })
  }

  async fn rebuild_aggregates(&self) -> Result<usize> {
    self.conn.call(|conn| Ok(rebuild_all(conn))).await?
  }

  async fn get_fact(&self, showtime_id: &str) -> Result<Option<ShowtimeFact>> {
    let showtime_id = showtime_id.to_owned();

    let raw: Option<RawFact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {FACT_COLUMNS} FROM showtime_facts f WHERE f.showtime_id = ?1"
              ),
              rusqlite::params![showtime_id],
              |row| RawFact::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFact::into_fact).transpose()
  }

  async fn list_facts(&self) -> Result<Vec<ShowtimeFact>> {
    let raws: Vec<RawFact> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FACT_COLUMNS} FROM showtime_facts f ORDER BY f.fact_id"
        ))?;
        let rows = stmt
          .query_map([], |row| RawFact::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn list_aggregates(&self) -> Result<Vec<AggregateView>> {
    let raws: Vec<(RawAggregate, RawFact)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AGGREGATE_COLUMNS}, {FACT_COLUMNS}
           FROM showtime_aggregates a
           JOIN showtime_facts f ON f.fact_id = a.fact_id
           ORDER BY a.fact_id"
        ))?;
        let rows = stmt
          .query_map([], |row| {
            Ok((RawAggregate::from_row(row)?, RawFact::from_row(row, 5)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(aggregate, fact)| {
        Ok(AggregateView {
          aggregate:      aggregate.into_aggregate()?,
          representative: fact.into_fact()?,
        })
      })
      .collect()
  }

  async fn stale_aggregates(&self) -> Result<Vec<ShowtimeAggregate>> {
    let raws: Vec<RawAggregate> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AGGREGATE_COLUMNS}
           FROM showtime_aggregates a
           LEFT JOIN showtime_facts f ON f.fact_id = a.fact_id
           WHERE f.fact_id IS NULL OR f.key_digest <> a.key_digest
           ORDER BY a.aggregate_id"
        ))?;
        let rows = stmt
          .query_map([], RawAggregate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAggregate::into_aggregate).collect()
  }
}
