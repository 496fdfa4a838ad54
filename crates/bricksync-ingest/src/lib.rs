//! Bricksync Ingest Library
//!
//! Pulls the Rebrickable CSV dumps into a MySQL catalog without ever duplicating a row.
//!
//! # Stages
//!
//! - **[`fetch`]**: obtains the downloads page through a chain of bypass strategies
//! - **[`links`]**: finds a download URL for each of the [`tables::REQUIRED_FILES`]
//! - **[`downloader`]**: paced, retried downloads with blocked-response detection
//! - **[`decompression`]**: gzip to staged CSV
//! - **[`statements`]**: one `INSERT ... WHERE NOT EXISTS` per row
//! - **[`loader`]**: replays statements in foreign-key order and rebuilds the summaries
//!
//! [`pipeline::IngestPipeline`] runs them in order.
//!
//! # Example
//!
//! ```no_run
//! use bricksync_common::DataDirs;
//! use bricksync_ingest::{loader, DatabaseConfig, IngestConfig, IngestPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = DatabaseConfig::from_env()?;
//!     let pipeline = IngestPipeline::new(IngestConfig::from_env(), DataDirs::under("."))?;
//!     let report = pipeline.run(|| loader::connect(&db)).await?;
//!     println!("inserted {} rows", report.load.inserted_rows());
//!     Ok(())
//! }
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod dataset;
pub mod decompression;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod links;
pub mod loader;
pub mod pipeline;
pub mod statements;
pub mod tables;

pub use config::{DatabaseConfig, IngestConfig};
pub use error::{IngestError, Result};
pub use pipeline::{IngestPipeline, PipelineReport};
