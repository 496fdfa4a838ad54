//! Error types for the ingestion pipeline

use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for Rebrickable ingestion
///
/// Whether an error aborts the run depends on the stage: page fetch, link resolution and
/// configuration errors are fatal, per-file download/decompress errors skip that file, and
/// per-statement execution errors skip that statement.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(
        "Access denied (HTTP 403) fetching {url}; the page is behind bot protection. \
         Configure WEBDRIVER_URL with a running chromedriver to enable the rendered-browser strategy"
    )]
    AccessDenied { url: String },

    #[error("No download links found ({details})")]
    Resolution { details: String },

    #[error("Download of {file} failed after {attempts} attempt(s): {reason}")]
    Download {
        file: String,
        attempts: u32,
        reason: String,
    },

    #[error("Download of {file} looks blocked: got {content_type} response of {size} bytes")]
    Blocked {
        file: String,
        content_type: String,
        size: usize,
    },

    #[error("{file} is not a valid gzip stream: {reason}")]
    Decompress { file: String, reason: String },

    #[error("Decompressing {file} produced no data")]
    EmptyOutput { file: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table {table} has no column {column} required by its unique key")]
    SchemaMismatch { table: String, column: String },

    #[error("Statement failed on {table}: {reason}")]
    StatementExecution { table: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No required files could be downloaded and decompressed")]
    NoFilesAcquired,

    #[error("No statement files were generated")]
    NoStatementFiles,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] bricksync_common::CommonError),
}

impl IngestError {
    /// Whether this error ends the whole run rather than one file or statement
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IngestError::Download { .. }
                | IngestError::Blocked { .. }
                | IngestError::Decompress { .. }
                | IngestError::EmptyOutput { .. }
                | IngestError::StatementExecution { .. }
        )
    }
}
