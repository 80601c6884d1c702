//! # Feature Aligner
//!
//! Maps an unordered [`FeatureInput`] onto the positional vector a trained
//! model consumes. A model fed a reordered or short vector still returns a
//! number, just the wrong one, so every mismatch between input and schema is
//! turned into an explicit error here instead.
//!
//! - Every schema name must be present. All absent names are reported together.
//! - Keys the schema does not know are ignored.
//! - Present values must coerce to a finite number.
//! - The result is a pure function of `(input, schema)`. No I/O, no logging,
//!   and never a partial vector.

use crate::input::{FeatureInput, FeatureValue};
use crate::schema::FeatureSchema;
use ndarray::{ArrayView1, ArrayView2, Axis};
use std::ops::Index;
use std::sync::Arc;
use thiserror::Error;

/// Caller-recoverable alignment failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error(
        "Input is missing {} required feature(s): {}",
        .missing.len(),
        .missing.join(", ")
    )]
    MissingFeatures {
        /// Every absent schema name, in schema order.
        missing: Vec<String>,
    },
    #[error("Feature '{feature}' received {received}, which is not a finite number.")]
    TypeMismatch {
        feature: String,
        received: FeatureValue,
    },
}

/// Feature values in schema order, ready for a model.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedVector {
    values: Vec<f64>,
}

impl AlignedVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.values.as_slice())
    }

    /// The vector as a single-row table, the shape a model's batch API expects.
    pub fn as_row(&self) -> ArrayView2<'_, f64> {
        self.view().insert_axis(Axis(0))
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

impl Index<usize> for AlignedVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

/// Aligns `input` against `schema`.
///
/// Missing names take precedence over type mismatches: when both occur the
/// caller first learns everything that is absent. Among type mismatches the
/// first in schema order is reported.
pub fn align(input: &FeatureInput, schema: &FeatureSchema) -> Result<AlignedVector, AlignError> {
    let mut values = Vec::with_capacity(schema.len());
    let mut missing = Vec::new();
    let mut mismatch = None;

    for name in schema.names() {
        match input.get(name) {
            None => missing.push(name.clone()),
            Some(raw) => match raw.to_number() {
                Some(value) => values.push(value),
                None if mismatch.is_none() => {
                    mismatch = Some(AlignError::TypeMismatch {
                        feature: name.clone(),
                        received: raw.clone(),
                    });
                }
                None => {}
            },
        }
    }

    if !missing.is_empty() {
        return Err(AlignError::MissingFeatures { missing });
    }
    if let Some(err) = mismatch {
        return Err(err);
    }
    Ok(AlignedVector { values })
}

/// An aligner bound to one schema, shared read-only between callers.
#[derive(Debug, Clone)]
pub struct FeatureAligner {
    schema: Arc<FeatureSchema>,
}

impl FeatureAligner {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn align(&self, input: &FeatureInput) -> Result<AlignedVector, AlignError> {
        align(input, &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard_schema() -> FeatureSchema {
        FeatureSchema::new(vec!["irrigation".to_string(), "water_access".to_string()]).unwrap()
    }

    #[test]
    fn complete_input_aligns_in_schema_order() {
        let input = FeatureInput::new()
            .with("water_access", 60.0)
            .with("irrigation", 50.0);
        let aligned = align(&input, &dashboard_schema()).unwrap();
        assert_eq!(aligned.as_slice(), &[50.0, 60.0]);
    }

    #[test]
    fn absent_feature_is_reported_by_name() {
        let input = FeatureInput::new().with("irrigation", 50.0);
        assert_eq!(
            align(&input, &dashboard_schema()),
            Err(AlignError::MissingFeatures {
                missing: vec!["water_access".to_string()]
            })
        );
    }

    #[test]
    fn extra_keys_are_ignored() {
        let input = FeatureInput::new()
            .with("irrigation", 50.0)
            .with("water_access", 60.0)
            .with("extra_field", "ignored");
        let aligned = align(&input, &dashboard_schema()).unwrap();
        assert_eq!(aligned.as_slice(), &[50.0, 60.0]);
    }

    #[test]
    fn text_label_is_a_type_mismatch() {
        let input = FeatureInput::new()
            .with("irrigation", "high")
            .with("water_access", 60.0);
        match align(&input, &dashboard_schema()) {
            Err(AlignError::TypeMismatch { feature, received }) => {
                assert_eq!(feature, "irrigation");
                assert_eq!(received, FeatureValue::from("high"));
            }
            other => panic!("Expected TypeMismatch for irrigation, got {other:?}"),
        }
    }

    #[test]
    fn missing_features_outrank_type_mismatches() {
        let schema = FeatureSchema::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ])
        .unwrap();
        let input = FeatureInput::new().with("b", "oops").with("c", 1.0);
        assert_eq!(
            align(&input, &schema),
            Err(AlignError::MissingFeatures {
                missing: vec!["a".to_string(), "d".to_string()]
            })
        );
    }

    #[test]
    fn first_mismatch_in_schema_order_is_reported() {
        let schema = FeatureSchema::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        let input = FeatureInput::new().with("a", "x").with("b", f64::NAN);
        match align(&input, &schema) {
            Err(AlignError::TypeMismatch { feature, .. }) => assert_eq!(feature, "a"),
            other => panic!("Expected TypeMismatch for a, got {other:?}"),
        }
    }

    #[test]
    fn error_messages_name_the_offenders() {
        let missing = AlignError::MissingFeatures {
            missing: vec!["irrigation".to_string(), "water_access".to_string()],
        };
        assert_eq!(
            missing.to_string(),
            "Input is missing 2 required feature(s): irrigation, water_access"
        );

        let mismatch = AlignError::TypeMismatch {
            feature: "irrigation".to_string(),
            received: FeatureValue::from("high"),
        };
        assert_eq!(
            mismatch.to_string(),
            "Feature 'irrigation' received \"high\", which is not a finite number."
        );
    }

    #[test]
    fn aligner_shares_its_schema() {
        let schema = Arc::new(dashboard_schema());
        let aligner = FeatureAligner::new(Arc::clone(&schema));
        let input = FeatureInput::new()
            .with("irrigation", 1.0)
            .with("water_access", 2.0);
        let aligned = aligner.align(&input).unwrap();
        assert_eq!(aligned.as_row().shape(), &[1, 2]);
        assert_eq!(aligned[1], 2.0);
        assert_eq!(aligner.schema().len(), 2);
        assert_eq!(Arc::strong_count(&schema), 2);
    }
}
