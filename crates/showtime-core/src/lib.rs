//! Core types and trait definitions for the showtime ingestion store.
//!
//! This crate is deliberately free of database dependencies. The storage
//! backend (`showtime-store-sqlite`) and the `showtime` binary depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod error;
pub mod ingest;
pub mod showtime;
pub mod store;

pub use error::{Error, Result};
