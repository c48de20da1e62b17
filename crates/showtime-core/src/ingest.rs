//! Options and results for a single ingest batch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::RefreshStrategy;

// ─── Options ─────────────────────────────────────────────────────────────────

/// What to do when an incoming record's `showtime_id` already belongs to a
/// row with a different logical key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
  /// Fail the batch with a conflict error.
  #[default]
  Reject,
  /// Move the existing row to the new key. Its counter restarts at 1 and the
  /// aggregate computed for its old key is invalidated.
  Rekey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
  #[serde(default)]
  pub refresh:     RefreshStrategy,
  #[serde(default)]
  pub identifiers: IdentifierPolicy,
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// What the upsert did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactAction {
  /// First observation of this logical key.
  Inserted,
  /// The key already existed; link and id were overwritten and the counter
  /// incremented.
  Merged,
  /// The id's existing row was moved to a new logical key.
  Rekeyed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactOutcome {
  pub showtime_id:       String,
  pub fact_id:           i64,
  pub action:            FactAction,
  /// Counter value after this record was applied.
  pub observation_count: i64,
}

/// Returned by a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
  /// Fresh per call; lets callers correlate logs for one batch.
  pub batch_id:             Uuid,
  /// One entry per input record, in input order.
  pub outcomes:             Vec<FactOutcome>,
  /// Aggregate rows written while repairing the batch's keys.
  pub aggregates_refreshed: usize,
}

impl IngestResult {
  pub fn count(&self, action: FactAction) -> usize {
    self.outcomes.iter().filter(|o| o.action == action).count()
  }
}
