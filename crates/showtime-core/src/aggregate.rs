//! The derived per-showing observation summary.
//!
//! Aggregates are never written by callers. The store derives them from the
//! current fact rows inside the same transaction that changed those rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::showtime::ShowtimeFact;

/// One row per distinct logical key.
///
/// The aggregate points at a representative fact (the lowest `fact_id` in
/// its group) instead of copying the key columns. `key_digest` records which
/// key the count was computed for; if the representative's digest no longer
/// matches, the row is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeAggregate {
  pub aggregate_id:      i64,
  pub fact_id:           i64,
  pub key_digest:        String,
  pub observation_count: i64,
  pub computed_at:       DateTime<Utc>,
}

/// An aggregate joined with its representative fact, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateView {
  pub aggregate:      ShowtimeAggregate,
  pub representative: ShowtimeFact,
}

/// How the store brings aggregates back in line after a batch.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
  /// Recompute only the keys the batch touched.
  #[default]
  Incremental,
  /// Drop every aggregate and regroup the whole fact table.
  FullRebuild,
}
