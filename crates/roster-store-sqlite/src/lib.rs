//! SQLite backend for the roster pipeline.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on the connection's
//! dedicated thread. Each plan step executes synchronously inside one
//! transaction on that thread; the async layer only sequences the steps.

mod audit;
mod cleaner;
mod encode;
mod ledger;
mod normalizer;
mod schema;
mod steps;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteWarehouse;

#[cfg(test)]
mod tests;
