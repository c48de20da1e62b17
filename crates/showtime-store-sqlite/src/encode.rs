//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings; attribute tags are a compact JSON array.

use chrono::{DateTime, Utc};
use showtime_core::{aggregate::ShowtimeAggregate, showtime::ShowtimeFact};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Attributes ──────────────────────────────────────────────────────────────

pub fn encode_attributes(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_attributes(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawFact::from_row`], for `showtime_facts f`.
pub const FACT_COLUMNS: &str = "f.fact_id, f.showtime_id, f.movie_title, \
   f.cinema_name, f.starts_at, f.booking_link, f.attributes, f.city, \
   f.observation_count, f.created_at, f.updated_at";

/// Raw values read directly from a `showtime_facts` row.
pub struct RawFact {
  pub fact_id:           i64,
  pub showtime_id:       String,
  pub movie_title:       String,
  pub cinema_name:       String,
  pub starts_at:         String,
  pub booking_link:      String,
  pub attributes:        String,
  pub city:              Option<String>,
  pub observation_count: i64,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawFact {
  /// Read the eleven [`FACT_COLUMNS`] starting at `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      fact_id:           row.get(offset)?,
      showtime_id:       row.get(offset + 1)?,
      movie_title:       row.get(offset + 2)?,
      cinema_name:       row.get(offset + 3)?,
      starts_at:         row.get(offset + 4)?,
      booking_link:      row.get(offset + 5)?,
      attributes:        row.get(offset + 6)?,
      city:              row.get(offset + 7)?,
      observation_count: row.get(offset + 8)?,
      created_at:        row.get(offset + 9)?,
      updated_at:        row.get(offset + 10)?,
    })
  }

  pub fn into_fact(self) -> Result<ShowtimeFact> {
    Ok(ShowtimeFact {
      fact_id:           self.fact_id,
      showtime_id:       self.showtime_id,
      movie_title:       self.movie_title,
      cinema_name:       self.cinema_name,
      starts_at:         decode_dt(&self.starts_at)?,
      booking_link:      self.booking_link,
      attributes:        decode_attributes(&self.attributes)?,
      city:              self.city,
      observation_count: self.observation_count,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawAggregate::from_row`], for `showtime_aggregates a`.
pub const AGGREGATE_COLUMNS: &str =
  "a.aggregate_id, a.fact_id, a.key_digest, a.observation_count, a.computed_at";

/// Raw values read directly from a `showtime_aggregates` row.
pub struct RawAggregate {
  pub aggregate_id:      i64,
  pub fact_id:           i64,
  pub key_digest:        String,
  pub observation_count: i64,
  pub computed_at:       String,
}

impl RawAggregate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      aggregate_id:      row.get(0)?,
      fact_id:           row.get(1)?,
      key_digest:        row.get(2)?,
      observation_count: row.get(3)?,
      computed_at:       row.get(4)?,
    })
  }

  pub fn into_aggregate(self) -> Result<ShowtimeAggregate> {
    Ok(ShowtimeAggregate {
      aggregate_id:      self.aggregate_id,
      fact_id:           self.fact_id,
      key_digest:        self.key_digest,
      observation_count: self.observation_count,
      computed_at:       decode_dt(&self.computed_at)?,
    })
  }
}
