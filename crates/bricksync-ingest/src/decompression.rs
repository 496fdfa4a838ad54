//! Gzip decompression of downloaded archives into staged CSV tables

use crate::error::{IngestError, Result};
use crate::tables::RequiredFile;
use bricksync_common::DataDirs;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Decompress gzip-compressed data
///
/// Fails with `Decompress` when `data` is not a gzip stream and with `EmptyOutput` when the
/// stream decodes to nothing.
pub fn decompress_gzip(file: &str, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(IngestError::Decompress {
            file: file.to_string(),
            reason: "input is empty".to_string(),
        });
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| IngestError::Decompress {
            file: file.to_string(),
            reason: e.to_string(),
        })?;

    if decompressed.is_empty() {
        return Err(IngestError::EmptyOutput {
            file: file.to_string(),
        });
    }

    debug!(file, compressed = data.len(), decompressed = decompressed.len(), "Decompressed archive");
    Ok(decompressed)
}

/// Persist a downloaded archive as its staged CSV table
///
/// The archive is written to the staging directory, decoded into `<table>.csv`, and then
/// removed. On failure neither the archive nor a partial table is left behind.
pub fn stage_archive(dirs: &DataDirs, file: &RequiredFile, data: &[u8]) -> Result<PathBuf> {
    let archive_path = dirs.compressed_file(file.compressed_name);
    let table_path = dirs.staged_table(file.table);

    std::fs::write(&archive_path, data)?;

    let outcome = decompress_gzip(file.compressed_name, data)
        .and_then(|decoded| std::fs::write(&table_path, &decoded).map_err(IngestError::from));

    if let Err(e) = std::fs::remove_file(&archive_path) {
        warn!(path = %archive_path.display(), error = %e, "Failed to remove archive");
    }

    match outcome {
        Ok(()) => {
            info!(file = %file, path = %table_path.display(), "Staged table");
            Ok(table_path)
        },
        Err(e) => {
            if table_path.exists() {
                let _ = std::fs::remove_file(&table_path);
            }
            Err(e)
        },
    }
}
