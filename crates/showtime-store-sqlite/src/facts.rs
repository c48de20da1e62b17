//! The fact upsert protocol.
//!
//! Every function here takes the batch's open [`Transaction`]; nothing
//! commits on its own. Records are applied one at a time in input order, so
//! a later record with the same logical key supersedes an earlier one.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction};
use showtime_core::{
  ingest::{FactAction, FactOutcome, IdentifierPolicy},
  showtime::{LogicalKey, NewShowtime},
};

use crate::{encode::{encode_attributes, encode_dt}, Result};

/// The result of applying one record.
#[derive(Debug)]
pub struct Applied {
  pub outcome: FactOutcome,
  /// Logical-key digests whose aggregates this write invalidated. A rekey
  /// touches both the old and the new key.
  pub touched: Vec<String>,
}

/// A row located by one of the two unique columns.
struct Existing {
  fact_id:    i64,
  key_digest: String,
}

/// Apply a single record.
///
/// - New logical key and unseen id: insert with a counter of 1.
/// - Existing logical key: overwrite `showtime_id` and `booking_link`,
///   increment the counter.
/// - Unseen logical key but the id belongs to another row: reject, or move
///   that row to the new key under [`IdentifierPolicy::Rekey`].
/// - Key held by one row and id by another: always a conflict.
pub fn upsert(
  tx: &Transaction<'_>,
  record: &NewShowtime,
  policy: IdentifierPolicy,
  now: DateTime<Utc>,
) -> Result<Applied> {
  let key = record.logical_key();
  let digest = key.digest();

  let by_key = find_by_digest(tx, &digest)?;
  let by_id = find_by_showtime_id(tx, &record.showtime_id)?;

  match (by_key, by_id) {
    (Some(k), Some(i)) if k.fact_id != i.fact_id => {
      Err(showtime_core::Error::conflict(record).into())
    }
    (Some(_), _) => {
      let (fact_id, count) = write(tx, record, &key, &digest, now)?;
      Ok(applied(record, fact_id, FactAction::Merged, count, vec![digest]))
    }
    (None, Some(i)) => match policy {
      IdentifierPolicy::Reject => {
        Err(showtime_core::Error::conflict(record).into())
      }
      IdentifierPolicy::Rekey => {
        let count = rekey(tx, i.fact_id, record, &key, &digest, now)?;
        Ok(applied(
          record,
          i.fact_id,
          FactAction::Rekeyed,
          count,
          vec![i.key_digest, digest],
        ))
      }
    },
    (None, None) => {
      let (fact_id, count) = write(tx, record, &key, &digest, now)?;
      Ok(applied(record, fact_id, FactAction::Inserted, count, vec![digest]))
    }
  }
}

fn applied(
  record: &NewShowtime,
  fact_id: i64,
  action: FactAction,
  observation_count: i64,
  touched: Vec<String>,
) -> Applied {
  Applied {
    outcome: FactOutcome {
      showtime_id: record.showtime_id.clone(),
      fact_id,
      action,
      observation_count,
    },
    touched,
  }
}

fn find_by_digest(tx: &Transaction<'_>, digest: &str) -> Result<Option<Existing>> {
  Ok(
    tx.query_row(
      "SELECT fact_id, key_digest FROM showtime_facts WHERE key_digest = ?1",
      [digest],
      |row| {
        Ok(Existing {
          fact_id:    row.get(0)?,
          key_digest: row.get(1)?,
        })
      },
    )
    .optional()?,
  )
}

fn find_by_showtime_id(
  tx: &Transaction<'_>,
  showtime_id: &str,
) -> Result<Option<Existing>> {
  Ok(
    tx.query_row(
      "SELECT fact_id, key_digest FROM showtime_facts WHERE showtime_id = ?1",
      [showtime_id],
      |row| {
        Ok(Existing {
          fact_id:    row.get(0)?,
          key_digest: row.get(1)?,
        })
      },
    )
    .optional()?,
  )
}

/// Conditional write keyed on the logical key. Returns `(fact_id, counter)`.
fn write(
  tx: &Transaction<'_>,
  record: &NewShowtime,
  key: &LogicalKey,
  digest: &str,
  now: DateTime<Utc>,
) -> Result<(i64, i64)> {
  let attributes = encode_attributes(&key.attributes)?;
  let now = encode_dt(now);

  Ok(tx.query_row(
    "INSERT INTO showtime_facts (
       showtime_id, movie_title, cinema_name, starts_at, booking_link,
       attributes, city, key_digest, observation_count, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)
     ON CONFLICT (key_digest) DO UPDATE SET
       showtime_id       = excluded.showtime_id,
       booking_link      = excluded.booking_link,
       observation_count = showtime_facts.observation_count + 1,
       updated_at        = excluded.updated_at
     RETURNING fact_id, observation_count",
    rusqlite::params![
      record.showtime_id,
      key.movie_title,
      key.cinema_name,
      key.starts_at_text(),
      record.booking_link,
      attributes,
      key.city,
      digest,
      now,
    ],
    |row| Ok((row.get(0)?, row.get(1)?)),
  )?)
}

/// Move `fact_id` to a new logical key. The counter restarts because it
/// counts observations of the key, not of the row.
fn rekey(
  tx: &Transaction<'_>,
  fact_id: i64,
  record: &NewShowtime,
  key: &LogicalKey,
  digest: &str,
  now: DateTime<Utc>,
) -> Result<i64> {
  let attributes = encode_attributes(&key.attributes)?;

  Ok(tx.query_row(
    "UPDATE showtime_facts SET
       movie_title       = ?2,
       cinema_name       = ?3,
       starts_at         = ?4,
       booking_link      = ?5,
       attributes        = ?6,
       city              = ?7,
       key_digest        = ?8,
       observation_count = 1,
       updated_at        = ?9
     WHERE fact_id = ?1
     RETURNING observation_count",
    rusqlite::params![
      fact_id,
      key.movie_title,
      key.cinema_name,
      key.starts_at_text(),
      record.booking_link,
      attributes,
      key.city,
      digest,
      encode_dt(now),
    ],
    |row| row.get(0),
  )?)
}
