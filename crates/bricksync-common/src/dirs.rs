//! Working directory layout
//!
//! The pipeline exchanges artifacts between stages through three directories:
//!
//! - **staging** (`temp/`): downloaded archives and the decompressed CSV tables
//! - **output** (`sql_output/`): one `<table>_inserts.sql` file per table
//! - **logs** (`logs/`): rolling log files and `debug_page.html` dumps
//!
//! Components receive a [`DataDirs`] instead of building paths themselves, so tests can
//! point a whole run at a temporary directory.

use crate::error::{CommonError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default staging directory name
pub const STAGING_DIR: &str = "temp";

/// Default statement output directory name
pub const OUTPUT_DIR: &str = "sql_output";

/// Default log directory name
pub const LOG_DIR: &str = "logs";

/// File name of the page dump written when link resolution fails
pub const DEBUG_PAGE_FILE: &str = "debug_page.html";

/// Placeholder kept in otherwise empty directories
pub const KEEP_FILE: &str = ".gitkeep";

/// Resolved locations of the pipeline's working directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    staging: PathBuf,
    output: PathBuf,
    logs: PathBuf,
}

impl DataDirs {
    /// Lay out the default directories under `root`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            staging: root.join(STAGING_DIR),
            output: root.join(OUTPUT_DIR),
            logs: root.join(LOG_DIR),
        }
    }

    /// Use explicit directories
    pub fn new(
        staging: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        logs: impl Into<PathBuf>,
    ) -> Self {
        Self {
            staging: staging.into(),
            output: output.into(),
            logs: logs.into(),
        }
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn logs(&self) -> &Path {
        &self.logs
    }

    /// Create every directory that does not exist yet
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.staging, &self.output, &self.logs] {
            std::fs::create_dir_all(dir).map_err(|source| CommonError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            debug!(dir = %dir.display(), "Directory ready");
        }
        Ok(())
    }

    /// Path of a downloaded archive, e.g. `temp/sets.csv.gz`
    pub fn compressed_file(&self, compressed_name: &str) -> PathBuf {
        self.staging.join(compressed_name)
    }

    /// Path of a decompressed table, e.g. `temp/sets.csv`
    pub fn staged_table(&self, table: &str) -> PathBuf {
        self.staging.join(format!("{}.csv", table))
    }

    /// Path of a table's statement file, e.g. `sql_output/sets_inserts.sql`
    pub fn statement_file(&self, table: &str) -> PathBuf {
        self.output.join(format!("{}_inserts.sql", table))
    }

    /// Path of the page dump written when no download links are found
    pub fn debug_page(&self) -> PathBuf {
        self.logs.join(DEBUG_PAGE_FILE)
    }

    /// Remove every file in the staging directory except the keep file
    ///
    /// Returns the number of files removed.
    pub fn clean_staging(&self) -> Result<usize> {
        if !self.staging.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.staging)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || entry.file_name() == KEEP_FILE {
                continue;
            }
            std::fs::remove_file(&path)?;
            removed += 1;
        }

        info!(removed, dir = %self.staging.display(), "Cleaned staging directory");
        Ok(removed)
    }
}

impl Default for DataDirs {
    fn default() -> Self {
        Self::under(".")
    }
}
