//! Core types and algorithms for the roster employee pipeline.
//!
//! This crate is deliberately free of database dependencies. It owns date
//! format inference, the dimension catalogue, the ordered migration plan and
//! the report types; storage backends (e.g. `roster-store-sqlite`) implement
//! [`warehouse::Warehouse`] on top of it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod date;
pub mod dimension;
pub mod error;
pub mod plan;
pub mod report;
pub mod warehouse;

pub use error::{Error, Result};
