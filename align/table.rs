//! # Batch Feature Tables
//!
//! Loads a header-bearing CSV (or TSV) whose columns are feature names and
//! aligns every row against a schema in one pass. The rules are the ones the
//! single-row aligner applies, lifted to columns:
//!
//! - Every schema column must exist. All absent columns are reported together.
//! - Columns the schema does not name are ignored.
//! - Every cell in a schema column must be a finite number. Text cells are
//!   trimmed and parsed the way a single request's text is. Empty cells are
//!   reported as missing values with their row; anything else is a type
//!   mismatch carrying the row, the feature and the offending cell.
//!
//! Rows in errors are 1-based data rows (the header is not counted).

use crate::aligner::AlignError;
use crate::input::FeatureValue;
use crate::schema::FeatureSchema;
use ndarray::{Array2, ShapeBuilder};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Aligned rows plus an identifier for each.
#[derive(Debug)]
pub struct FeatureTable {
    /// Shape `[n_rows, schema.len()]`, columns in schema order.
    pub rows: Array2<f64>,
    /// Values of the id column when present, otherwise 1-based row numbers.
    pub row_ids: Vec<String>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error("Row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: AlignError,
    },
    #[error(
        "Missing value in feature column '{column}' at row {row}. Every feature cell must be filled."
    )]
    MissingValue { column: String, row: usize },
    #[error("The table '{0}' contains no data rows.")]
    Empty(String),
    #[error("Internal error: aligned columns could not be assembled into a matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl TableError {
    /// True when the table contents, not the environment, are at fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TableError::Align(_)
                | TableError::Row { .. }
                | TableError::MissingValue { .. }
                | TableError::Empty(_)
        )
    }
}

/// Reads `path` and aligns its rows against `schema`.
///
/// Files ending in `.tsv` or `.tab` are tab-separated; everything else is read
/// as comma-separated.
pub fn load_feature_table(
    path: &Path,
    schema: &FeatureSchema,
    id_column: Option<&str>,
) -> Result<FeatureTable, TableError> {
    let separator = if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab"))
    {
        b'\t'
    } else {
        b','
    };

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;

    let present: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let missing: Vec<String> = schema
        .names()
        .iter()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(AlignError::MissingFeatures { missing }.into());
    }

    let n_rows = df.height();
    if n_rows == 0 {
        return Err(TableError::Empty(path.display().to_string()));
    }

    let mut buffer = Vec::with_capacity(n_rows * schema.len());
    for name in schema.names() {
        let mut column = extract_feature_column(&df, name)?;
        buffer.append(&mut column);
    }
    let rows = Array2::from_shape_vec((n_rows, schema.len()).f(), buffer)?;
    let row_ids = build_row_ids(&df, id_column, n_rows)?;

    log::info!(
        "Aligned {} rows from '{}' against {} schema features",
        n_rows,
        path.display(),
        schema.len()
    );

    Ok(FeatureTable { rows, row_ids })
}

fn extract_feature_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, TableError> {
    let column = df.column(name)?;
    if column.null_count() > 0 {
        return Err(TableError::MissingValue {
            column: name.to_string(),
            row: first_null_row(column),
        });
    }

    if column.dtype() == &DataType::String {
        return text_column_values(column, name);
    }

    // Non-strict cast: cells that do not parse become nulls.
    let casted = column.cast(&DataType::Float64)?;
    if casted.null_count() > 0 {
        let row = first_null_row(&casted);
        return Err(TableError::Row {
            row,
            source: AlignError::TypeMismatch {
                feature: name.to_string(),
                received: cell_value(column, row - 1),
            },
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(TableError::Row {
            row: index + 1,
            source: AlignError::TypeMismatch {
                feature: name.to_string(),
                received: FeatureValue::Number(values[index]),
            },
        });
    }
    Ok(values)
}

/// Coerces a column the reader left as text one cell at a time, with the
/// rules a single request gets.
fn text_column_values(column: &Column, name: &str) -> Result<Vec<f64>, TableError> {
    let cells = column.as_materialized_series().str()?;
    let mut values = Vec::with_capacity(cells.len());
    for (index, cell) in cells.into_iter().enumerate() {
        let raw = FeatureValue::Text(cell.unwrap_or_default().to_string());
        match raw.to_number() {
            Some(value) => values.push(value),
            None => {
                return Err(TableError::Row {
                    row: index + 1,
                    source: AlignError::TypeMismatch {
                        feature: name.to_string(),
                        received: raw,
                    },
                });
            }
        }
    }
    Ok(values)
}

fn first_null_row(column: &Column) -> usize {
    (0..column.len())
        .find(|&i| matches!(column.get(i), Ok(AnyValue::Null)))
        .map_or(1, |i| i + 1)
}

fn cell_value(column: &Column, index: usize) -> FeatureValue {
    match column.get(index) {
        Ok(AnyValue::String(text)) => FeatureValue::Text(text.to_string()),
        Ok(AnyValue::Boolean(flag)) => FeatureValue::Flag(flag),
        Ok(other) => FeatureValue::Text(other.to_string()),
        Err(_) => FeatureValue::Text(String::new()),
    }
}

fn build_row_ids(
    df: &DataFrame,
    id_column: Option<&str>,
    n_rows: usize,
) -> Result<Vec<String>, TableError> {
    let sequential = || (1..=n_rows).map(|i| i.to_string()).collect();

    let Some(id_name) = id_column else {
        return Ok(sequential());
    };
    if !df.get_column_names().iter().any(|c| c.as_str() == id_name) {
        log::warn!("Id column '{id_name}' not found; using row numbers as identifiers");
        return Ok(sequential());
    }

    let column = df.column(id_name)?;
    let ids = (0..n_rows)
        .map(|i| match column.get(i) {
            Ok(AnyValue::String(text)) if !text.is_empty() => text.to_string(),
            Ok(AnyValue::Null) | Ok(AnyValue::String(_)) | Err(_) => (i + 1).to_string(),
            Ok(other) => other.to_string(),
        })
        .collect();
    Ok(ids)
}
