//! Regional summary metrics for the landing page.
//!
//! Built from the exploratory dataset (one row per country and year) and the
//! feature-importance table exported next to the trained model.

mod correlation;

pub use correlation::{CorrelationMatrix, correlation_matrix};

use crate::drift::DriftReport;
use crate::schema::FeatureSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverviewError {
    #[error("Failed to open '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed table '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to read '{}' as a table: {source}", .path.display())]
    Polars {
        path: PathBuf,
        #[source]
        source: polars::prelude::PolarsError,
    },
    #[error("'{}' contains no usable observations.", .0.display())]
    NoObservations(PathBuf),
}

/// One dataset row. Other columns in the file are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    #[serde(rename = "Area")]
    pub area: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Food Insecurity Rate")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryMean {
    pub country: String,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    /// Observations that carried a finite rate.
    pub observations: usize,
    pub mean_rate: f64,
    pub country_means: BTreeMap<String, f64>,
    pub highest: CountryMean,
    pub lowest: CountryMean,
    trends: BTreeMap<String, BTreeMap<i32, f64>>,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

impl Overview {
    /// Summarises observations. Rows without a finite rate are skipped; `None`
    /// when none remain.
    pub fn from_observations<I>(observations: I) -> Option<Self>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut overall = Accumulator::default();
        let mut by_country: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut by_year: BTreeMap<String, BTreeMap<i32, Accumulator>> = BTreeMap::new();

        for obs in observations {
            let Some(rate) = obs.rate.filter(|r| r.is_finite()) else {
                continue;
            };
            overall.push(rate);
            by_country.entry(obs.area.clone()).or_default().push(rate);
            by_year
                .entry(obs.area)
                .or_default()
                .entry(obs.year)
                .or_default()
                .push(rate);
        }
        if overall.count == 0 {
            return None;
        }

        let country_means: BTreeMap<String, f64> = by_country
            .into_iter()
            .map(|(country, acc)| (country, acc.mean()))
            .collect();

        // Map iteration is alphabetical, so strict comparisons keep the first
        // country on ties.
        let mut highest: Option<(&String, f64)> = None;
        let mut lowest: Option<(&String, f64)> = None;
        for (country, &mean) in &country_means {
            if highest.is_none_or(|(_, best)| mean > best) {
                highest = Some((country, mean));
            }
            if lowest.is_none_or(|(_, best)| mean < best) {
                lowest = Some((country, mean));
            }
        }
        let owned = |(country, mean): (&String, f64)| CountryMean {
            country: country.clone(),
            mean,
        };
        let highest = highest.map(owned)?;
        let lowest = lowest.map(owned)?;

        let trends = by_year
            .into_iter()
            .map(|(country, years)| {
                let series = years
                    .into_iter()
                    .map(|(year, acc)| (year, acc.mean()))
                    .collect();
                (country, series)
            })
            .collect();

        Some(Self {
            observations: overall.count,
            mean_rate: overall.mean(),
            country_means,
            highest,
            lowest,
            trends,
        })
    }

    /// Reads the dataset at `path` and summarises it.
    pub fn load(path: &Path) -> Result<Self, OverviewError> {
        let observations: Vec<Observation> = read_csv_rows(path)?;
        let overview = Self::from_observations(observations)
            .ok_or_else(|| OverviewError::NoObservations(path.to_path_buf()))?;
        log::info!(
            "Summarised {} observations across {} countries from '{}'",
            overview.observations,
            overview.country_means.len(),
            path.display()
        );
        Ok(overview)
    }

    /// Yearly mean rate for one country, in year order.
    pub fn trend(&self, country: &str) -> Option<&BTreeMap<i32, f64>> {
        self.trends.get(country)
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.country_means.keys().map(String::as_str)
    }
}

/// A row of the feature-importance table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeatureImportance {
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Importance")]
    pub importance: f64,
}

/// Loads the table ranked by descending importance, ties by name.
pub fn load_feature_importance(path: &Path) -> Result<Vec<FeatureImportance>, OverviewError> {
    let mut rows: Vec<FeatureImportance> = read_csv_rows(path)?;
    if rows.is_empty() {
        return Err(OverviewError::NoObservations(path.to_path_buf()));
    }
    rows.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    Ok(rows)
}

/// Compares the ranked feature names with the schema the model was trained on.
pub fn importance_drift(schema: &FeatureSchema, ranking: &[FeatureImportance]) -> DriftReport {
    DriftReport::compare(schema, ranking.iter().map(|row| row.feature.as_str()))
}

/// Share of total importance per feature, in ranking order.
pub fn importance_shares(ranking: &[FeatureImportance]) -> Vec<f64> {
    let total: f64 = ranking.iter().map(|row| row.importance).sum();
    if total > 0.0 {
        ranking.iter().map(|row| row.importance / total).collect()
    } else {
        vec![0.0; ranking.len()]
    }
}

fn read_csv_rows<T>(path: &Path) -> Result<Vec<T>, OverviewError>
where
    T: for<'de> Deserialize<'de>,
{
    let file = File::open(path).map_err(|source| OverviewError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| OverviewError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::fs;

    fn obs(area: &str, year: i32, rate: Option<f64>) -> Observation {
        Observation {
            area: area.to_string(),
            year,
            rate,
        }
    }

    #[test]
    fn means_and_extremes() {
        let overview = Overview::from_observations(vec![
            obs("Cambodia", 2019, Some(20.0)),
            obs("Cambodia", 2020, Some(30.0)),
            obs("Laos", 2019, Some(10.0)),
            obs("Laos", 2020, None),
            obs("Viet Nam", 2019, Some(5.0)),
        ])
        .unwrap();

        assert_eq!(overview.observations, 4);
        assert_abs_diff_eq!(overview.mean_rate, 16.25, epsilon = 1e-12);
        assert_abs_diff_eq!(overview.country_means["Cambodia"], 25.0, epsilon = 1e-12);
        assert_eq!(overview.highest.country, "Cambodia");
        assert_eq!(overview.lowest.country, "Viet Nam");
        assert_eq!(
            overview.countries().collect::<Vec<_>>(),
            vec!["Cambodia", "Laos", "Viet Nam"]
        );
        let trend = overview.trend("Laos").unwrap();
        assert_eq!(trend.keys().copied().collect::<Vec<_>>(), vec![2019]);
    }

    #[test]
    fn ties_resolve_alphabetically() {
        let overview = Overview::from_observations(vec![
            obs("Thailand", 2020, Some(8.0)),
            obs("Brunei", 2020, Some(8.0)),
            obs("Malaysia", 2020, Some(8.0)),
        ])
        .unwrap();
        assert_eq!(overview.highest.country, "Brunei");
        assert_eq!(overview.lowest.country, "Brunei");
    }

    #[test]
    fn blank_only_dataset_has_no_overview() {
        assert!(Overview::from_observations(vec![obs("Laos", 2020, None)]).is_none());
        assert!(Overview::from_observations(Vec::new()).is_none());
    }

    #[test]
    fn dataset_file_ignores_extra_columns_and_blank_rates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eda_df.csv");
        fs::write(
            &path,
            "Area,Year,Food Insecurity Rate,Item\n\
             Cambodia,2019,20.0,a\n\
             Cambodia,2019,30.0,b\n\
             Laos,2019,,c\n",
        )
        .unwrap();
        let overview = Overview::load(&path).unwrap();
        assert_eq!(overview.observations, 2);
        assert_abs_diff_eq!(overview.trend("Cambodia").unwrap()[&2019], 25.0, epsilon = 1e-12);
        assert!(overview.trend("Laos").is_none());
    }

    #[test]
    fn dataset_errors_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Overview::load(&dir.path().join("absent.csv")),
            Err(OverviewError::Io { .. })
        ));

        let blank = dir.path().join("blank.csv");
        fs::write(&blank, "Area,Year,Food Insecurity Rate\nLaos,2019,\n").unwrap();
        assert!(matches!(
            Overview::load(&blank),
            Err(OverviewError::NoObservations(_))
        ));

        let broken = dir.path().join("broken.csv");
        fs::write(&broken, "Area,Year,Food Insecurity Rate\nLaos,recent,3.0\n").unwrap();
        assert!(matches!(
            Overview::load(&broken),
            Err(OverviewError::Csv { .. })
        ));
    }

    #[test]
    fn importance_is_ranked_and_checked_against_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_importance.csv");
        fs::write(
            &path,
            "Feature,Importance\nwater access,0.25\nirrigation,0.5\nyear,0.25\n",
        )
        .unwrap();
        let ranking = load_feature_importance(&path).unwrap();
        let names: Vec<&str> = ranking.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["irrigation", "water access", "year"]);

        let shares = importance_shares(&ranking);
        assert_abs_diff_eq!(shares[0], 0.5, epsilon = 1e-12);

        let schema =
            FeatureSchema::new(vec!["irrigation".to_string(), "water_access".to_string()]).unwrap();
        let report = importance_drift(&schema, &ranking);
        assert_eq!(report.unserved, vec!["water_access"]);
        assert_eq!(report.likely_renames.len(), 1);
        assert_eq!(report.likely_renames[0].producer_key, "water access");
    }
}
