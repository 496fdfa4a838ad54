//! Fixed catalog of the Rebrickable tables this pipeline loads
//!
//! Each entry ties the compressed file published on the downloads page to the table it
//! feeds and to the columns that identify a row in that table. [`LOAD_ORDER`] lists the
//! tables parents-first so foreign keys resolve during the load.

use crate::error::{IngestError, Result};

/// One of the compressed CSV files the pipeline must obtain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequiredFile {
    /// Name on the downloads page and CDN, e.g. `sets.csv.gz`
    pub compressed_name: &'static str,
    /// Destination table
    pub table: &'static str,
    /// Columns whose combined values identify a row
    pub unique_key: &'static [&'static str],
}

impl RequiredFile {
    /// File name once decompressed, e.g. `sets.csv`
    pub fn csv_name(&self) -> &'static str {
        self.compressed_name
            .strip_suffix(".gz")
            .unwrap_or(self.compressed_name)
    }
}

impl std::fmt::Display for RequiredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.compressed_name)
    }
}

pub static SETS: RequiredFile = RequiredFile {
    compressed_name: "sets.csv.gz",
    table: "sets",
    unique_key: &["set_num"],
};

pub static INVENTORY_SETS: RequiredFile = RequiredFile {
    compressed_name: "inventory_sets.csv.gz",
    table: "inventory_sets",
    unique_key: &["inventory_id", "set_num"],
};

pub static INVENTORY_MINIFIGS: RequiredFile = RequiredFile {
    compressed_name: "inventory_minifigs.csv.gz",
    table: "inventory_minifigs",
    unique_key: &["inventory_id", "fig_num"],
};

pub static MINIFIGS: RequiredFile = RequiredFile {
    compressed_name: "minifigs.csv.gz",
    table: "minifigs",
    unique_key: &["fig_num"],
};

pub static THEMES: RequiredFile = RequiredFile {
    compressed_name: "themes.csv.gz",
    table: "themes",
    unique_key: &["id"],
};

pub static INVENTORIES: RequiredFile = RequiredFile {
    compressed_name: "inventories.csv.gz",
    table: "inventories",
    unique_key: &["id", "set_num"],
};

/// Every required file, in the order they are listed on the downloads page
pub static REQUIRED_FILES: [&RequiredFile; 6] = [
    &SETS,
    &INVENTORY_SETS,
    &INVENTORY_MINIFIGS,
    &MINIFIGS,
    &THEMES,
    &INVENTORIES,
];

/// Tables in foreign-key dependency order
pub static LOAD_ORDER: [&str; 6] = [
    "themes",
    "sets",
    "minifigs",
    "inventories",
    "inventory_minifigs",
    "inventory_sets",
];

/// Look up a required file by its compressed name
pub fn by_compressed_name(name: &str) -> Option<&'static RequiredFile> {
    REQUIRED_FILES
        .iter()
        .copied()
        .find(|file| file.compressed_name == name)
}

/// Look up a required file by its table name
pub fn by_table(table: &str) -> Result<&'static RequiredFile> {
    REQUIRED_FILES
        .iter()
        .copied()
        .find(|file| file.table == table)
        .ok_or_else(|| IngestError::UnknownTable(table.to_string()))
}

/// Unique key columns for `table`
pub fn unique_key(table: &str) -> Result<&'static [&'static str]> {
    by_table(table).map(|file| file.unique_key)
}
