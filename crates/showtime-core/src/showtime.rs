//! Showtime facts and their logical key.
//!
//! A showtime fact is one observed showing of a movie. Two facts describe the
//! same showing when their [`LogicalKey`]s are equal; the external
//! `showtime_id` is a reference supplied by the scraper and is deliberately
//! not part of that key.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Longest external identifier accepted from the scraper.
pub const MAX_SHOWTIME_ID_LEN: usize = 255;

// ─── NewShowtime ─────────────────────────────────────────────────────────────

/// A scraped showtime record, as handed to [`crate::store::ShowtimeStore::ingest`].
///
/// The serde names match the scraper's JSON output. Every field except `city`
/// is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShowtime {
  pub showtime_id:  String,
  pub movie_title:  String,
  pub cinema_name:  String,
  /// Start of the showing. Any RFC 3339 offset is accepted and normalised
  /// to UTC.
  #[serde(rename = "showtimeInUTC")]
  pub starts_at:    DateTime<Utc>,
  pub booking_link: String,
  pub attributes:   Vec<String>,
  #[serde(default)]
  pub city:         Option<String>,
}

impl NewShowtime {
  /// The logical key this record will be stored under.
  pub fn logical_key(&self) -> LogicalKey {
    LogicalKey::new(
      self.starts_at,
      &self.cinema_name,
      &self.movie_title,
      &self.attributes,
      self.city.as_deref(),
    )
  }

  /// Check that every field is present and well-formed.
  pub fn validate(&self) -> Result<()> {
    let id = self.showtime_id.as_str();

    if id.is_empty() {
      return Err(Error::invalid(id, "showtime id is empty"));
    }
    if id.chars().count() > MAX_SHOWTIME_ID_LEN {
      return Err(Error::invalid(
        id,
        format!("showtime id is longer than {MAX_SHOWTIME_ID_LEN} characters"),
      ));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
      return Err(Error::invalid(id, "showtime id contains whitespace"));
    }

    for (field, value) in [
      ("movie title", &self.movie_title),
      ("cinema name", &self.cinema_name),
      ("booking link", &self.booking_link),
    ] {
      if value.trim().is_empty() {
        return Err(Error::invalid(id, format!("{field} is blank")));
      }
    }

    if !(self.booking_link.starts_with("http://")
      || self.booking_link.starts_with("https://"))
    {
      return Err(Error::invalid(id, "booking link is not an http(s) URL"));
    }

    for (i, tag) in self.attributes.iter().enumerate() {
      if tag.trim().is_empty() {
        return Err(Error::invalid(id, format!("attribute #{i} is blank")));
      }
      if self.attributes[..i].contains(tag) {
        return Err(Error::invalid(id, format!("attribute {tag:?} is repeated")));
      }
    }

    if self.city.as_deref().is_some_and(|c| c.trim().is_empty()) {
      return Err(Error::invalid(id, "city is present but blank"));
    }

    Ok(())
  }
}

/// Validate a whole batch, stopping at the first bad record.
pub fn validate_batch(batch: &[NewShowtime]) -> Result<()> {
  batch.iter().try_for_each(NewShowtime::validate)
}

// ─── LogicalKey ──────────────────────────────────────────────────────────────

/// The attributes that together identify "the same showing".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
  /// Truncated to microseconds, the precision the store keeps.
  pub starts_at:   DateTime<Utc>,
  pub cinema_name: String,
  pub movie_title: String,
  /// Order is significant: `["IMAX", "3D"]` and `["3D", "IMAX"]` are
  /// different keys.
  pub attributes:  Vec<String>,
  pub city:        Option<String>,
}

impl LogicalKey {
  pub fn new(
    starts_at: DateTime<Utc>,
    cinema_name: &str,
    movie_title: &str,
    attributes: &[String],
    city: Option<&str>,
  ) -> Self {
    Self {
      starts_at:   starts_at.trunc_subsecs(6),
      cinema_name: cinema_name.to_owned(),
      movie_title: movie_title.to_owned(),
      attributes:  attributes.to_vec(),
      city:        city.map(str::to_owned),
    }
  }

  /// Canonical text form of `starts_at` used for storage and hashing.
  pub fn starts_at_text(&self) -> String {
    self.starts_at.to_rfc3339_opts(SecondsFormat::Micros, true)
  }

  /// SHA-256 hex digest over a length-prefixed encoding of every key
  /// attribute. Stored alongside facts and aggregates as their unique key.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    let starts_at = self.starts_at_text();

    for part in [
      starts_at.as_str(),
      self.cinema_name.as_str(),
      self.movie_title.as_str(),
    ] {
      write_part(&mut hasher, part);
    }

    hasher.update((self.attributes.len() as u64).to_be_bytes());
    for tag in &self.attributes {
      write_part(&mut hasher, tag);
    }

    match &self.city {
      Some(city) => {
        hasher.update([1]);
        write_part(&mut hasher, city);
      }
      None => hasher.update([0]),
    }

    hex::encode(hasher.finalize())
  }
}

fn write_part(hasher: &mut Sha256, part: &str) {
  hasher.update((part.len() as u64).to_be_bytes());
  hasher.update(part.as_bytes());
}

// ─── ShowtimeFact ────────────────────────────────────────────────────────────

/// A stored showtime row. Exactly one exists per distinct logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeFact {
  /// Store-assigned surrogate identity.
  pub fact_id:           i64,
  pub showtime_id:       String,
  pub movie_title:       String,
  pub cinema_name:       String,
  pub starts_at:         DateTime<Utc>,
  pub booking_link:      String,
  pub attributes:        Vec<String>,
  pub city:              Option<String>,
  /// Number of times this logical key has been ingested.
  pub observation_count: i64,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl ShowtimeFact {
  pub fn logical_key(&self) -> LogicalKey {
    LogicalKey::new(
      self.starts_at,
      &self.cinema_name,
      &self.movie_title,
      &self.attributes,
      self.city.as_deref(),
    )
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn dune() -> NewShowtime {
    NewShowtime {
      showtime_id:  "a1".into(),
      movie_title:  "Dune".into(),
      cinema_name:  "Roxy".into(),
      starts_at:    Utc.with_ymd_and_hms(2024, 3, 1, 19, 30, 0).unwrap(),
      booking_link: "https://roxy.example/book/a1".into(),
      attributes:   vec!["IMAX".into()],
      city:         None,
    }
  }

  #[test]
  fn valid_record_passes() {
    dune().validate().unwrap();
  }

  #[test]
  fn rejects_bad_showtime_ids() {
    for id in ["", "a 1", "a\t1"] {
      let mut s = dune();
      s.showtime_id = id.into();
      assert!(matches!(s.validate(), Err(Error::Invalid { .. })), "{id:?}");
    }

    let mut s = dune();
    s.showtime_id = "x".repeat(MAX_SHOWTIME_ID_LEN + 1);
    assert!(s.validate().is_err());
  }

  #[test]
  fn rejects_blank_fields_and_bad_links() {
    let mut s = dune();
    s.cinema_name = "  ".into();
    assert!(s.validate().is_err());

    let mut s = dune();
    s.booking_link = "roxy.example/book".into();
    assert!(s.validate().is_err());

    let mut s = dune();
    s.city = Some(String::new());
    assert!(s.validate().is_err());
  }

  #[test]
  fn rejects_repeated_attributes() {
    let mut s = dune();
    s.attributes = vec!["IMAX".into(), "3D".into(), "IMAX".into()];
    let err = s.validate().unwrap_err();
    assert!(err.to_string().contains("repeated"));
  }

  #[test]
  fn validate_batch_reports_first_offender() {
    let mut bad = dune();
    bad.showtime_id = "b 2".into();
    let err = validate_batch(&[dune(), bad]).unwrap_err();
    assert!(matches!(err, Error::Invalid { showtime_id, .. } if showtime_id == "b 2"));
  }

  #[test]
  fn digest_ignores_showtime_id_and_link() {
    let a = dune();
    let mut b = dune();
    b.showtime_id = "zz".into();
    b.booking_link = "https://elsewhere.example".into();
    assert_eq!(a.logical_key().digest(), b.logical_key().digest());
  }

  #[test]
  fn digest_distinguishes_every_key_attribute() {
    let base = dune().logical_key().digest();

    let mut s = dune();
    s.cinema_name = "Odeon".into();
    assert_ne!(s.logical_key().digest(), base);

    let mut s = dune();
    s.attributes = vec!["IMAX".into(), "3D".into()];
    assert_ne!(s.logical_key().digest(), base);

    let mut s = dune();
    s.city = Some("Berlin".into());
    assert_ne!(s.logical_key().digest(), base);

    let mut s = dune();
    s.starts_at = s.starts_at + chrono::Duration::minutes(15);
    assert_ne!(s.logical_key().digest(), base);
  }

  #[test]
  fn attribute_order_is_significant() {
    let mut a = dune();
    a.attributes = vec!["IMAX".into(), "3D".into()];
    let mut b = dune();
    b.attributes = vec!["3D".into(), "IMAX".into()];
    assert_ne!(a.logical_key(), b.logical_key());
    assert_ne!(a.logical_key().digest(), b.logical_key().digest());
  }

  #[test]
  fn field_boundaries_do_not_collide() {
    let mut a = dune();
    a.cinema_name = "Ro".into();
    a.movie_title = "xyDune".into();
    let mut b = dune();
    b.cinema_name = "Roxy".into();
    b.movie_title = "Dune".into();
    assert_ne!(a.logical_key().digest(), b.logical_key().digest());
  }

  #[test]
  fn deserializes_scraper_json_with_offset() {
    let json = r#"{
      "showtimeId": "a1",
      "movieTitle": "Dune",
      "cinemaName": "Roxy",
      "showtimeInUTC": "2024-03-01T20:30:00+01:00",
      "bookingLink": "https://roxy.example/book/a1",
      "attributes": ["IMAX"]
    }"#;
    let parsed: NewShowtime = serde_json::from_str(json).unwrap();
    assert_eq!(parsed, dune());
  }
}
