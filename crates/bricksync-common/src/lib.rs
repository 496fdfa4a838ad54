//! Bricksync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared pieces used by every bricksync workspace member:
//!
//! - **Error Handling**: [`CommonError`] and its result alias
//! - **Directories**: [`DataDirs`], the staging / output / log layout the pipeline stages
//!   exchange files through
//! - **Logging**: `tracing` subscriber set-up driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use bricksync_common::{DataDirs, Result};
//!
//! fn prepare() -> Result<DataDirs> {
//!     let dirs = DataDirs::under(".");
//!     dirs.ensure()?;
//!     Ok(dirs)
//! }
//! ```

pub mod dirs;
pub mod error;
pub mod logging;

pub use dirs::DataDirs;
pub use error::{CommonError, Result};
