//! Pairwise Pearson correlations between the dataset's numeric columns.

use super::OverviewError;
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Symmetric correlation matrix; row and column `i` both belong to `columns[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// NaN where a pair has fewer than two complete rows or a constant column.
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Correlation between two named columns.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[[i, j]])
    }
}

/// Reads the dataset at `path` and correlates every numeric column with every
/// other. Text columns are skipped. Each pair uses only the rows where both
/// cells are present.
pub fn correlation_matrix(path: &Path) -> Result<CorrelationMatrix, OverviewError> {
    let file = File::open(path).map_err(|source| OverviewError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let polars_error = |source: PolarsError| OverviewError::Polars {
        path: path.to_path_buf(),
        source,
    };
    let df = CsvReader::new(file)
        .with_options(CsvReadOptions::default().with_has_header(true))
        .finish()
        .map_err(polars_error)?;

    let mut columns = Vec::new();
    let mut data: Vec<Vec<f64>> = Vec::new();
    for column in df.get_columns() {
        if !is_numeric(column.dtype()) {
            continue;
        }
        let casted = column.cast(&DataType::Float64).map_err(polars_error)?;
        let cells = casted
            .f64()
            .map_err(polars_error)?
            .into_iter()
            .map(|cell| cell.unwrap_or(f64::NAN))
            .collect();
        columns.push(column.name().to_string());
        data.push(cells);
    }
    if columns.is_empty() {
        return Err(OverviewError::NoObservations(path.to_path_buf()));
    }

    let k = columns.len();
    let mut values = Array2::from_elem((k, k), f64::NAN);
    for i in 0..k {
        for j in i..k {
            let r = pearson(ArrayView1::from(&data[i]), ArrayView1::from(&data[j]));
            let r = if i == j && r.is_finite() { 1.0 } else { r };
            values[[i, j]] = r;
            values[[j, i]] = r;
        }
    }

    log::info!("Correlated {} numeric columns from '{}'", k, path.display());
    Ok(CorrelationMatrix { columns, values })
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Pearson's r over the rows where both values are finite.
fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (sxy, sxx, syy) = pairs.iter().fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), (a, b)| {
        let dx = a - mean_x;
        let dy = b - mean_y;
        (sxy + dx * dy, sxx + dx * dx, syy + dy * dy)
    });
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}
