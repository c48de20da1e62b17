//! Error type for `showtime-store-sqlite`.

use rusqlite::{ErrorCode, ffi};
use showtime_core::showtime::NewShowtime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Validation and identifier conflicts.
  #[error(transparent)]
  Core(#[from] showtime_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Raised inside a batch transaction, before it is handed back across the
  /// connection thread.
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Whether retrying the whole batch may succeed.
  ///
  /// Lock contention is transient, and so is a UNIQUE or PRIMARY KEY
  /// violation raised by the engine (rather than detected up front as a
  /// [`showtime_core::Error::Conflict`]), which means a concurrent writer
  /// claimed the key first. CHECK, foreign-key and trigger failures are
  /// deterministic and are not.
  pub fn is_transient(&self) -> bool {
    let Some(failure) = self.sqlite_failure() else {
      return false;
    };
    match failure.code {
      ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => true,
      ErrorCode::ConstraintViolation => matches!(
        failure.extended_code,
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
      ),
      _ => false,
    }
  }

  /// The conflicting record, if this is an identifier conflict.
  pub fn conflict(&self) -> Option<&NewShowtime> {
    match self {
      Self::Core(showtime_core::Error::Conflict { record, .. }) => Some(record.as_ref()),
      _ => None,
    }
  }

  fn sqlite_failure(&self) -> Option<&ffi::Error> {
    match self {
      Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
      | Self::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
