//! The `ShowtimeStore` trait.
//!
//! Implemented by storage backends (e.g. `showtime-store-sqlite`). Callers
//! such as the `showtime` binary depend on this abstraction.

use std::future::Future;

use crate::{
  aggregate::{AggregateView, ShowtimeAggregate},
  ingest::{IngestOptions, IngestResult},
  showtime::{NewShowtime, ShowtimeFact},
};

/// Abstraction over a showtime fact store and its derived aggregates.
///
/// Every write runs in one transaction covering both the fact rows and the
/// aggregate rows they justify: either both commit or neither does.
pub trait ShowtimeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Apply `batch` in input order, then repair the aggregates of every key it
  /// touched, all in one transaction.
  ///
  /// Fails without writing anything if any record is invalid or its
  /// `showtime_id` collides with another showing (see
  /// [`IdentifierPolicy`](crate::ingest::IdentifierPolicy)).
  fn ingest(
    &self,
    batch: Vec<NewShowtime>,
    options: IngestOptions,
  ) -> impl Future<Output = Result<IngestResult, Self::Error>> + Send + '_;

  /// Delete every aggregate and regroup the whole fact table. Returns the
  /// number of aggregate rows written.
  fn rebuild_aggregates(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Look a fact up by its external identifier.
  fn get_fact<'a>(
    &'a self,
    showtime_id: &'a str,
  ) -> impl Future<Output = Result<Option<ShowtimeFact>, Self::Error>> + Send + 'a;

  /// All facts, ordered by `fact_id`.
  fn list_facts(
    &self,
  ) -> impl Future<Output = Result<Vec<ShowtimeFact>, Self::Error>> + Send + '_;

  /// All aggregates with their representative facts.
  fn list_aggregates(
    &self,
  ) -> impl Future<Output = Result<Vec<AggregateView>, Self::Error>> + Send + '_;

  /// Aggregates whose representative fact no longer carries the key they
  /// were computed for. Empty whenever the store is consistent.
  fn stale_aggregates(
    &self,
  ) -> impl Future<Output = Result<Vec<ShowtimeAggregate>, Self::Error>> + Send + '_;
}
