//! # rustwos
//!
//! Resumable bibliographic enrichment pipeline: harvest an author's
//! publication list, fill in impact factor, keywords, affiliation, DOI and
//! abstract for each title from a citation-index portal, and split the result
//! into clean and abandoned tables.
//!
//! ## Modules
//!
//! - [`harvest`] - Baseline publication list from Google Scholar
//! - [`pipeline`] - Resumable per-row enrichment run
//! - [`source`] - Detail source trait and the portal client
//! - [`checkpoint`] - CSV checkpoint table with atomic rewrites
//! - [`retry`] / [`pacing`] - Backoff, jitter and batch pauses
//! - [`matcher`] - Title similarity gate
//! - [`partition`] - Clean/abandon split
//! - [`config`] - TOML configuration
//! - [`cookies`] - Cookie persistence
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustwos::checkpoint::{load_table, CheckpointStore};
//! use rustwos::config::AppConfig;
//! use rustwos::pipeline::Enricher;
//! use rustwos::source::wos::WosSource;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let table = load_table(Path::new("Franco_Nori_publications_original.csv"))?;
//!     let store = CheckpointStore::new("Franco_Nori_publications_all.csv");
//!     let source = WosSource::new(&config.portal, &[])?;
//!     let outcome = Enricher::new(source, &config.enrich, "Nori").run(table, &store).await?;
//!     println!("{} rows failed", outcome.failed.len());
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod cookies;
pub mod error;
pub mod harvest;
pub mod http;
pub mod matcher;
pub mod pacing;
pub mod partition;
pub mod paths;
pub mod pipeline;
pub mod retry;
pub mod source;

pub use error::{EnrichError, Result};
