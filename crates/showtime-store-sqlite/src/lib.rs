//! SQLite backend for the showtime store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The write path is split in two halves
//! that share one [`rusqlite::Transaction`]: [`facts`] applies the upsert
//! protocol and [`aggregates`] repairs the derived counts.

mod encode;
mod schema;
mod store;

pub mod aggregates;
pub mod error;
pub mod facts;

pub use error::{Error, Result};
pub use store::SqliteStore;
