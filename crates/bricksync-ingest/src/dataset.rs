//! In-memory table decoded from a staged CSV file
//!
//! Cells are typed per column rather than per cell: a column is numeric only when every
//! present value in it is a canonical integer (or every one a canonical decimal). Anything
//! else keeps the column textual, so an identifier such as `0012` or `10179-1` never loses
//! its formatting on the way into SQL.

use crate::error::Result;
use std::io::Read;
use std::path::Path;

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// How a whole column is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

/// Decoded CSV: ordered column names plus rows aligned to them
#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Vec<Value>>,
}

impl TabularDataset {
    /// Read and type a CSV file with a header row
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Read and type CSV text with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row = (0..columns.len())
                .map(|idx| record.get(idx).and_then(present))
                .collect();
            raw_rows.push(row);
        }

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|idx| infer_kind(raw_rows.iter().filter_map(|row| row[idx].as_deref())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&kinds)
                    .map(|(cell, kind)| typed(cell, *kind))
                    .collect()
            })
            .collect();

        Ok(TabularDataset {
            columns,
            kinds,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).map(|idx| self.kinds[idx])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Empty cells and NaN markers are absent
fn present(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(cell.to_string())
    }
}

fn is_canonical_integer(s: &str) -> bool {
    s.parse::<i64>().map(|n| n.to_string() == s).unwrap_or(false)
}

fn is_canonical_float(s: &str) -> bool {
    s.contains('.')
        && s.parse::<f64>()
            .map(|f| f.is_finite() && f.to_string() == s)
            .unwrap_or(false)
}

fn infer_kind<'a>(mut cells: impl Iterator<Item = &'a str> + Clone) -> ColumnKind {
    if cells.clone().all(is_canonical_integer) {
        ColumnKind::Integer
    } else if cells.all(|c| is_canonical_integer(c) || is_canonical_float(c)) {
        ColumnKind::Float
    } else {
        ColumnKind::Text
    }
}

fn typed(cell: Option<String>, kind: ColumnKind) -> Value {
    let Some(raw) = cell else {
        return Value::Null;
    };
    match kind {
        ColumnKind::Integer => raw.parse().map(Value::Integer).unwrap_or(Value::Text(raw)),
        ColumnKind::Float => raw.parse().map(Value::Float).unwrap_or(Value::Text(raw)),
        ColumnKind::Text => Value::Text(raw),
    }
}
