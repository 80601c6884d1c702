//! # Prediction
//!
//! The regressor is an opaque collaborator behind the [`Predictor`] trait. This
//! module wires it to the aligner and keeps the three failure classes of a
//! prediction apart:
//!
//! - `Schema`: the feature-name artifact is absent or broken (redeploy).
//! - `Input`: the caller's mapping is incomplete or non-numeric (fix the input).
//! - `Model`: the model artifact is broken or disagrees with the schema.

pub mod forest;

use crate::aligner::{AlignError, FeatureAligner};
use crate::input::FeatureInput;
use crate::schema::{FeatureSchema, SchemaLoadError, SchemaStore};
use ndarray::{Array1, ArrayView2};
use std::sync::Arc;
use thiserror::Error;

pub use forest::{Node, RegressionForest, Tree};

/// Errors from loading, validating or evaluating a model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Prediction data has {found} feature columns, but the model was trained on {expected}.")]
    FeatureCountMismatch { found: usize, expected: usize },
    #[error(
        "Feature {position} is '{schema_name}' in the schema but '{model_name}' in the model. The schema and model artifacts come from different training runs."
    )]
    FeatureOrderMismatch {
        position: usize,
        schema_name: String,
        model_name: String,
    },
    #[error("The model contains no trees.")]
    EmptyForest,
    #[error("The model returned no prediction for a non-empty input.")]
    EmptyOutput,
    #[error("Tree {tree}, node {node}: {reason}")]
    InvalidNode {
        tree: usize,
        node: usize,
        reason: String,
    },
}

/// A fitted model that maps rows of aligned features to predictions.
pub trait Predictor {
    /// Number of columns every input row must have.
    fn feature_count(&self) -> usize;

    /// Column names recorded at training time, if the artifact carries them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// One prediction per row of `rows`, which has shape `[n, feature_count()]`.
    fn predict(&self, rows: ArrayView2<f64>) -> Result<Array1<f64>, ModelError>;
}

/// Checks that `model` was trained on exactly the columns `schema` lists.
pub fn check_model_schema<P: Predictor + ?Sized>(
    schema: &FeatureSchema,
    model: &P,
) -> Result<(), ModelError> {
    if model.feature_count() != schema.len() {
        return Err(ModelError::FeatureCountMismatch {
            found: schema.len(),
            expected: model.feature_count(),
        });
    }
    if let Some(model_names) = model.feature_names() {
        let divergence = schema
            .names()
            .iter()
            .zip(model_names)
            .enumerate()
            .find(|(_, (schema_name, model_name))| schema_name != model_name);
        if let Some((position, (schema_name, model_name))) = divergence {
            return Err(ModelError::FeatureOrderMismatch {
                position,
                schema_name: schema_name.clone(),
                model_name: model_name.clone(),
            });
        }
    }
    Ok(())
}

/// Any failure along the input → prediction path.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Feature schema unavailable: {0}")]
    Schema(#[from] SchemaLoadError),
    #[error("Invalid prediction input: {0}")]
    Input(#[from] AlignError),
    #[error("Model failure: {0}")]
    Model(#[from] ModelError),
}

impl PredictionError {
    /// True when resubmitting corrected input can succeed.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, PredictionError::Input(_))
    }
}

/// An aligner and a model that are known to agree on the feature order.
pub struct PredictionService<P> {
    aligner: FeatureAligner,
    model: P,
}

impl<P: Predictor> PredictionService<P> {
    /// Binds `model` to `schema` after checking they agree.
    pub fn new(schema: Arc<FeatureSchema>, model: P) -> Result<Self, ModelError> {
        check_model_schema(&schema, &model)?;
        Ok(Self {
            aligner: FeatureAligner::new(schema),
            model,
        })
    }

    /// Like [`PredictionService::new`], taking the schema from a store.
    pub fn open(store: &SchemaStore, model: P) -> Result<Self, PredictionError> {
        let schema = store.get()?;
        Ok(Self::new(schema, model)?)
    }

    pub fn aligner(&self) -> &FeatureAligner {
        &self.aligner
    }

    pub fn model(&self) -> &P {
        &self.model
    }

    /// Aligns one input and returns the first (only) prediction.
    pub fn predict(&self, input: &FeatureInput) -> Result<f64, PredictionError> {
        let aligned = self.aligner.align(input)?;
        let predictions = self.model.predict(aligned.as_row())?;
        let first = predictions.get(0).copied().ok_or(ModelError::EmptyOutput)?;
        Ok(first)
    }

    /// Predicts every row of an already aligned table.
    pub fn predict_rows(&self, rows: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if rows.ncols() != self.aligner.schema().len() {
            return Err(ModelError::FeatureCountMismatch {
                found: rows.ncols(),
                expected: self.aligner.schema().len(),
            });
        }
        self.model.predict(rows)
    }
}
