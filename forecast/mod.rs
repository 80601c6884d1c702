//! # Forecast Store
//!
//! Per-country forecast tables exported by the time-series training job. Each
//! table is a CSV with the columns `ds`, `yhat`, `yhat_lower` and `yhat_upper`
//! (extra columns are ignored) stored as `<dir>/<country>_forecast.csv`, or
//! `<dir>/<country>_prophet.csv` for tables written by older training runs.
//!
//! Tables are read once per country and shared for the life of the store.

use dashmap::DashMap;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const FORECAST_SUFFIXES: [&str; 2] = ["_forecast.csv", "_prophet.csv"];

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("No forecast is available for '{country}' in '{}'.", .dir.display())]
    NotAvailable { country: String, dir: PathBuf },
    #[error("Failed to read forecast location '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed forecast table '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Forecast table '{}' contains no rows.", .0.display())]
    Empty(PathBuf),
    #[error("Forecast table '{}' has a non-finite value at row {row}.", .path.display())]
    NonFinite { path: PathBuf, row: usize },
}

/// One forecast step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastPoint {
    /// Period label as written by the exporter, usually an ISO date.
    pub ds: String,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl ForecastPoint {
    fn is_finite(&self) -> bool {
        self.yhat.is_finite() && self.yhat_lower.is_finite() && self.yhat_upper.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    pub country: String,
    pub points: Vec<ForecastPoint>,
}

impl ForecastTable {
    /// Reads and checks one table.
    pub fn read(country: &str, path: &Path) -> Result<Self, ForecastError> {
        let csv_error = |source| ForecastError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_error)?;

        let points: Vec<ForecastPoint> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .map_err(csv_error)?;
        if points.is_empty() {
            return Err(ForecastError::Empty(path.to_path_buf()));
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(ForecastError::NonFinite {
                path: path.to_path_buf(),
                row: index + 1,
            });
        }

        Ok(Self {
            country: country.to_string(),
            points,
        })
    }

    /// Percentage change of `yhat` against the previous step. The first step
    /// and steps following a zero forecast have no rate.
    pub fn growth_rates(&self) -> Vec<Option<f64>> {
        std::iter::once(None)
            .chain(self.points.iter().tuple_windows().map(|(prev, next)| {
                if prev.yhat == 0.0 {
                    None
                } else {
                    Some((next.yhat - prev.yhat) / prev.yhat * 100.0)
                }
            }))
            .collect()
    }

    pub fn latest(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }
}

/// Lazily loads and caches forecast tables from one directory.
pub struct ForecastStore {
    dir: PathBuf,
    cache: DashMap<String, Arc<ForecastTable>>,
}

impl ForecastStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The table for `country`, read from disk on first use.
    pub fn load(&self, country: &str) -> Result<Arc<ForecastTable>, ForecastError> {
        if let Some(table) = self.cache.get(country) {
            return Ok(Arc::clone(table.value()));
        }

        let path = self.locate(country)?;
        let table = Arc::new(ForecastTable::read(country, &path)?);
        log::info!(
            "Loaded {}-step forecast for {} from '{}'",
            table.points.len(),
            country,
            path.display()
        );
        let entry = self.cache.entry(country.to_string()).or_insert(table);
        Ok(Arc::clone(entry.value()))
    }

    /// Countries that have a table in the directory, sorted and deduplicated.
    pub fn countries(&self) -> Result<Vec<String>, ForecastError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ForecastError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut countries = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| ForecastError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(country) = FORECAST_SUFFIXES
                .iter()
                .find_map(|suffix| name.strip_suffix(suffix))
                .filter(|country| !country.is_empty())
            {
                countries.insert(country.to_string());
            }
        }
        Ok(countries.into_iter().collect())
    }

    fn locate(&self, country: &str) -> Result<PathBuf, ForecastError> {
        let not_available = || ForecastError::NotAvailable {
            country: country.to_string(),
            dir: self.dir.clone(),
        };
        if country.trim().is_empty() || country.contains(['/', '\\']) {
            return Err(not_available());
        }
        FORECAST_SUFFIXES
            .iter()
            .map(|suffix| self.dir.join(format!("{country}{suffix}")))
            .find(|path| path.is_file())
            .ok_or_else(not_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const HEADER: &str = "ds,trend,yhat,yhat_lower,yhat_upper";

    fn write_table(dir: &Path, file: &str, rows: &[&str]) {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        fs::write(dir.join(file), text).unwrap();
    }

    #[test]
    fn growth_rates_follow_consecutive_yhat() {
        let dir = tempfile::tempdir().unwrap();
        write_table(
            dir.path(),
            "Cambodia_forecast.csv",
            &[
                "2023-12-31,1,20.0,18.0,22.0",
                "2024-12-31,1,22.0,19.0,25.0",
                "2025-12-31,1,0.0,-1.0,1.0",
                "2026-12-31,1,5.0,4.0,6.0",
            ],
        );
        let store = ForecastStore::new(dir.path());
        let table = store.load("Cambodia").unwrap();
        assert_eq!(table.points.len(), 4);
        assert_eq!(table.latest().map(|p| p.ds.as_str()), Some("2026-12-31"));

        let rates = table.growth_rates();
        assert_eq!(rates.len(), 4);
        assert_eq!(rates[0], None);
        assert_abs_diff_eq!(rates[1].unwrap(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rates[2].unwrap(), -100.0, epsilon = 1e-9);
        assert_eq!(rates[3], None);
    }

    #[test]
    fn tables_are_cached_after_first_read() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "Laos_forecast.csv", &["2024-12-31,1,9.5,9.0,10.0"]);
        let store = ForecastStore::new(dir.path());
        let first = store.load("Laos").unwrap();
        fs::remove_file(dir.path().join("Laos_forecast.csv")).unwrap();
        let second = store.load("Laos").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn legacy_file_name_is_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "Myanmar_prophet.csv", &["2024-12-31,1,30.0,28.0,33.0"]);
        write_table(dir.path(), "Thailand_forecast.csv", &["2024-12-31,1,8.0,7.0,9.0"]);
        write_table(dir.path(), "Thailand_prophet.csv", &["2024-12-31,1,99.0,98.0,100.0"]);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ForecastStore::new(dir.path());
        assert_abs_diff_eq!(store.load("Myanmar").unwrap().points[0].yhat, 30.0);
        assert_abs_diff_eq!(store.load("Thailand").unwrap().points[0].yhat, 8.0);
        assert_eq!(store.countries().unwrap(), vec!["Myanmar", "Thailand"]);
    }

    #[test]
    fn unknown_country_is_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForecastStore::new(dir.path());
        assert!(matches!(
            store.load("Atlantis"),
            Err(ForecastError::NotAvailable { .. })
        ));
        assert!(matches!(
            store.load("../Cambodia"),
            Err(ForecastError::NotAvailable { .. })
        ));
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "Empty_forecast.csv", &[]);
        write_table(dir.path(), "Text_forecast.csv", &["2024-12-31,1,high,1.0,2.0"]);
        write_table(dir.path(), "Inf_forecast.csv", &[
            "2024-12-31,1,1.0,1.0,2.0",
            "2025-12-31,1,inf,1.0,2.0",
        ]);
        let store = ForecastStore::new(dir.path());

        assert!(matches!(store.load("Empty"), Err(ForecastError::Empty(_))));
        assert!(matches!(store.load("Text"), Err(ForecastError::Csv { .. })));
        assert!(matches!(
            store.load("Inf"),
            Err(ForecastError::NonFinite { row: 2, .. })
        ));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForecastStore::new(dir.path().join("absent"));
        assert!(matches!(store.countries(), Err(ForecastError::Io { .. })));
    }
}
