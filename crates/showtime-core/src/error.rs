//! Error types for `showtime-core`.

use thiserror::Error;

use crate::showtime::NewShowtime;

#[derive(Debug, Error)]
pub enum Error {
  /// A record failed validation before anything was written.
  #[error("invalid showtime {showtime_id:?}: {reason}")]
  Invalid {
    showtime_id: String,
    reason:      String,
  },

  /// The external identifier is already held by a row with a different
  /// logical key. The whole batch is rolled back.
  #[error("showtime id {showtime_id:?} is already used by a different showing")]
  Conflict {
    showtime_id: String,
    record:      Box<NewShowtime>,
  },
}

impl Error {
  pub(crate) fn invalid(showtime_id: &str, reason: impl Into<String>) -> Self {
    Self::Invalid {
      showtime_id: showtime_id.to_owned(),
      reason:      reason.into(),
    }
  }

  /// Build a [`Error::Conflict`] carrying a copy of the offending record.
  pub fn conflict(record: &NewShowtime) -> Self {
    Self::Conflict {
      showtime_id: record.showtime_id.clone(),
      record:      Box::new(record.clone()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
