//! Aggregate maintenance.
//!
//! Aggregates are derived strictly from `showtime_facts` and are written
//! only here, always inside the transaction that changed the facts. Both
//! strategies upsert on `key_digest`, so re-running a grouping never adds a
//! second row for a key.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::Transaction;

use crate::{encode::encode_dt, Result};

/// Groups facts by every logical-key attribute and writes one aggregate per
/// group, pointing at the lowest `fact_id` in it. `?1` is `computed_at`; the
/// caller appends the `WHERE` filter as `{filter}`.
fn grouped_insert(filter: &str) -> String {
  format!(
    "INSERT INTO showtime_aggregates (fact_id, key_digest, observation_count, computed_at)
     SELECT MIN(f.fact_id), f.key_digest, SUM(f.observation_count), ?1
     FROM showtime_facts f
     WHERE {filter}
     GROUP BY f.key_digest, f.starts_at, f.cinema_name, f.movie_title,
              f.attributes, f.city
     ON CONFLICT (key_digest) DO UPDATE SET
       fact_id           = excluded.fact_id,
       observation_count = excluded.observation_count,
       computed_at       = excluded.computed_at"
  )
}

/// Incremental repair for the keys in `touched`. Returns the number of
/// aggregate rows written.
///
/// For each key: drop any aggregate computed for it or pointing at a fact
/// that now carries it, then regroup that key alone. Keys with no facts left
/// (the old side of a rekey) end up with no aggregate.
pub fn refresh(
  tx: &Transaction<'_>,
  touched: &BTreeSet<String>,
  now: DateTime<Utc>,
) -> Result<usize> {
  let computed_at = encode_dt(now);
  let mut delete = tx.prepare_cached(
    "DELETE FROM showtime_aggregates
     WHERE key_digest = ?1
        OR fact_id IN (SELECT fact_id FROM showtime_facts WHERE key_digest = ?1)",
  )?;
  let mut insert = tx.prepare_cached(&grouped_insert("f.key_digest = ?2"))?;

  let mut written = 0;
  for digest in touched {
    delete.execute([digest])?;
    written += insert.execute(rusqlite::params![computed_at, digest])?;
  }

  purge_stale(tx)?;
  Ok(written)
}

/// Full rebuild: delete every aggregate, then regroup the whole table.
pub fn rebuild(tx: &Transaction<'_>, now: DateTime<Utc>) -> Result<usize> {
  tx.execute("DELETE FROM showtime_aggregates", [])?;
  let written =
    tx.execute(&grouped_insert("true"), rusqlite::params![encode_dt(now)])?;
  Ok(written)
}

/// Delete aggregates whose fact no longer has the key they were computed
/// for. Returns the number of rows removed.
pub fn purge_stale(tx: &Transaction<'_>) -> Result<usize> {
  Ok(tx.execute(
    "DELETE FROM showtime_aggregates
     WHERE NOT EXISTS (
       SELECT 1 FROM showtime_facts f
       WHERE f.fact_id    = showtime_aggregates.fact_id
         AND f.key_digest = showtime_aggregates.key_digest
     )",
    [],
  )?)
}
