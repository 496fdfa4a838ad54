//! Conditional insert generation
//!
//! Every row becomes one `INSERT ... SELECT ... WHERE NOT EXISTS` statement guarded on the
//! table's unique key, so replaying a statement file against a store that already holds the
//! rows inserts nothing.

use crate::dataset::{TabularDataset, Value};
use crate::error::{IngestError, Result};
use crate::tables::{self, LOAD_ORDER};
use bricksync_common::DataDirs;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Render a cell as a SQL literal
///
/// Text is single-quoted with embedded quotes doubled; absent values are the bare `NULL`.
/// Backslashes are copied unchanged, so the store must read them literally (the MySQL
/// connection from [`loader::connect`](crate::loader::connect) enables
/// `NO_BACKSLASH_ESCAPES`).
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// One conditional insert for one source row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    sql: String,
}

impl InsertStatement {
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Turn a dataset into conditional inserts for `table`
///
/// Fails with `UnknownTable` for a table outside the catalog and `SchemaMismatch` when the
/// dataset lacks one of the table's key columns.
pub fn generate(dataset: &TabularDataset, table: &str) -> Result<Vec<InsertStatement>> {
    let key = tables::unique_key(table)?;

    let key_indices = key
        .iter()
        .map(|column| {
            dataset
                .column_index(column)
                .map(|idx| (*column, idx))
                .ok_or_else(|| IngestError::SchemaMismatch {
                    table: table.to_string(),
                    column: column.to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let column_list = dataset.columns().join(", ");

    let statements = dataset
        .rows()
        .iter()
        .map(|row| {
            let literals: Vec<String> = row.iter().map(sql_literal).collect();
            let predicate = key_indices
                .iter()
                .map(|(column, idx)| match row[*idx] {
                    Value::Null => format!("{} IS NULL", column),
                    _ => format!("{} = {}", column, literals[*idx]),
                })
                .collect::<Vec<_>>()
                .join(" AND ");

            InsertStatement {
                sql: format!(
                    "INSERT INTO {table} ({column_list})\nSELECT {}\nWHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {predicate});",
                    literals.join(", "),
                ),
            }
        })
        .collect();

    Ok(statements)
}

/// Write statements to `path`, one per line group, returning how many were written
pub fn write_statement_file(path: &Path, statements: &[InsertStatement]) -> Result<usize> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for statement in statements {
        writeln!(writer, "{}", statement)?;
    }
    writer.flush()?;
    Ok(statements.len())
}

/// A statement file produced for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFile {
    pub table: &'static str,
    pub path: PathBuf,
    pub statements: usize,
}

/// Generates statement files from the staged CSV tables
pub struct StatementGenerator {
    dirs: DataDirs,
}

impl StatementGenerator {
    pub fn new(dirs: DataDirs) -> Self {
        Self { dirs }
    }

    /// Generate the statement file for one staged table
    pub fn generate_table(&self, table: &str) -> Result<StatementFile> {
        let file = tables::by_table(table)?;
        let source = self.dirs.staged_table(file.table);
        let dataset = TabularDataset::from_path(&source)?;
        let statements = generate(&dataset, file.table)?;

        let path = self.dirs.statement_file(file.table);
        let written = write_statement_file(&path, &statements)?;
        debug!(table = file.table, statements = written, path = %path.display(), "Wrote statement file");

        Ok(StatementFile {
            table: file.table,
            path,
            statements: written,
        })
    }

    /// Generate statement files for every staged table, in load order
    ///
    /// Missing staged files are skipped with a warning and a table that fails to generate is
    /// logged and skipped. Only non-empty statement files are returned; none at all fails with
    /// `NoStatementFiles`. A statement file left over for a table not produced here is removed.
    pub fn generate_all(&self) -> Result<Vec<StatementFile>> {
        std::fs::create_dir_all(self.dirs.output())?;

        let mut produced = Vec::new();
        for table in LOAD_ORDER {
            let source = self.dirs.staged_table(table);
            if !source.exists() {
                warn!(table, path = %source.display(), "Staged file not found, skipping");
                self.discard(table)?;
                continue;
            }

            match self.generate_table(table) {
                Ok(generated) if generated.statements > 0 => {
                    info!(
                        table = generated.table,
                        statements = generated.statements,
                        "Generated insert statements"
                    );
                    produced.push(generated);
                },
                Ok(generated) => {
                    warn!(table = generated.table, "Staged file has no rows, no statements generated");
                    self.discard(table)?;
                },
                Err(e) => {
                    error!(table, error = %e, "Failed to generate statements");
                    self.discard(table)?;
                },
            }
        }

        if produced.is_empty() {
            return Err(IngestError::NoStatementFiles);
        }

        Ok(produced)
    }

    fn discard(&self, table: &str) -> Result<()> {
        let path = self.dirs.statement_file(table);
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!(table, path = %path.display(), "Removed stale statement file");
        }
        Ok(())
    }
}
