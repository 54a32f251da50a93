//! Catalog ingestion library.
//!
//! Persists crawl records into `SQLite` with natural-key upserts, an
//! append-only observation history, and summary embeddings that are only
//! recomputed when the summary text changes.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
