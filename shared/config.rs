//! Dashboard configuration.
//!
//! Stored as TOML. Every section has defaults that reproduce the layout the
//! dashboard ships with, so an absent or partial file is valid:
//!
//! ```toml
//! [paths]
//! schema = "models/prediction/feature_columns.toml"
//! model = "models/prediction/food_model.toml"
//! forecast_dir = "models/forecast"
//!
//! [[form]]
//! key = "irrigation"
//! label = "Irrigation %"
//! min = 0.0
//! max = 100.0
//! default = 50.0
//! ```
//!
//! Relative paths are resolved against the directory that holds the file.

use crate::input::FeatureInput;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "foodsec.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Form field '{key}' is invalid: {reason}")]
    InvalidFormField { key: String, reason: String },
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub paths: ArtifactPaths,
    /// Fields of the manual prediction form, in display order.
    #[serde(default = "default_form")]
    pub form: Vec<FormField>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            paths: ArtifactPaths::default(),
            form: default_form(),
        }
    }
}

/// Locations of the flat artifacts the toolkit reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Ordered feature-name list exported at training time.
    #[serde(default = "default_schema_path")]
    pub schema: PathBuf,
    /// Serialized regression forest.
    #[serde(default = "default_model_path")]
    pub model: PathBuf,
    /// Directory of per-country forecast tables.
    #[serde(default = "default_forecast_dir")]
    pub forecast_dir: PathBuf,
    /// Exploratory dataset with `Area`, `Year` and `Food Insecurity Rate`.
    #[serde(default = "default_dataset_path")]
    pub dataset: PathBuf,
    #[serde(default = "default_feature_importance_path")]
    pub feature_importance: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            schema: default_schema_path(),
            model: default_model_path(),
            forecast_dir: default_forecast_dir(),
            dataset: default_dataset_path(),
            feature_importance: default_feature_importance_path(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("models/prediction/feature_columns.toml")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/prediction/food_model.toml")
}

fn default_forecast_dir() -> PathBuf {
    PathBuf::from("models/forecast")
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("dataset/eda_df.csv")
}

fn default_feature_importance_path() -> PathBuf {
    PathBuf::from("dataset/feature_importance.csv")
}

/// One slider of the prediction form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Feature name the field produces.
    pub key: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl FormField {
    /// True when `value` lies on the slider's range.
    pub fn accepts(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

fn default_form() -> Vec<FormField> {
    vec![
        FormField {
            key: "irrigation".to_string(),
            label: "Irrigation %".to_string(),
            min: 0.0,
            max: 100.0,
            default: 50.0,
        },
        FormField {
            key: "water_access".to_string(),
            label: "Water Access %".to_string(),
            min: 0.0,
            max: 100.0,
            default: 60.0,
        },
    ]
}

impl DashboardConfig {
    /// Loads and validates a configuration file, resolving relative artifact
    /// paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: DashboardConfig = toml::from_str(&text)?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        log::info!("Loaded configuration from '{}'", path.display());
        Ok(config)
    }

    /// Uses `explicit` when given, otherwise `foodsec.toml` in the working
    /// directory if it exists, otherwise the built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            return Self::load(fallback);
        }
        log::debug!("No configuration file found; using built-in defaults");
        Ok(Self::default())
    }

    /// Form keys must be unique and every range must be finite, ordered and
    /// contain its default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for field in &self.form {
            let invalid = |reason: &str| ConfigError::InvalidFormField {
                key: field.key.clone(),
                reason: reason.to_string(),
            };
            if field.key.trim().is_empty() {
                return Err(invalid("key is blank"));
            }
            if !seen.insert(field.key.as_str()) {
                return Err(invalid("key appears more than once"));
            }
            if !(field.min.is_finite() && field.max.is_finite() && field.default.is_finite()) {
                return Err(invalid("min, max and default must be finite"));
            }
            if field.min > field.max {
                return Err(invalid("min exceeds max"));
            }
            if !field.accepts(field.default) {
                return Err(invalid("default lies outside [min, max]"));
            }
        }
        Ok(())
    }

    /// The input the form submits when nothing is touched.
    pub fn form_defaults(&self) -> FeatureInput {
        self.form
            .iter()
            .map(|field| (field.key.clone(), field.default))
            .collect()
    }

    pub fn form_field(&self, key: &str) -> Option<&FormField> {
        self.form.iter().find(|field| field.key == key)
    }
}

impl ArtifactPaths {
    fn resolve_against(&mut self, base: &Path) {
        for path in [
            &mut self.schema,
            &mut self.model,
            &mut self.forecast_dir,
            &mut self.dataset,
            &mut self.feature_importance,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
