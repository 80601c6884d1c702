//! Inference for a serialized random-forest regressor.
//!
//! The training side (an off-the-shelf tree ensemble) exports every tree as a
//! flat node list. Node 0 is the root; a split sends a row left when
//! `row[feature] <= threshold` and right otherwise; the forest prediction is
//! the mean of the leaf values reached in each tree.
//!
//! ```toml
//! feature_names = ["irrigation", "water_access"]
//!
//! [[trees]]
//! nodes = [
//!   { feature = 0, threshold = 55.0, left = 1, right = 2 },
//!   { value = 10.0 },
//!   { value = 20.0 },
//! ]
//! ```

use super::{ModelError, Predictor};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A decision-tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walks from the root to a leaf. Only valid on a validated tree.
    fn evaluate(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// The trained model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionForest {
    /// Training columns in the order the trees index them.
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

impl RegressionForest {
    /// Builds and validates a forest.
    pub fn new(feature_names: Vec<String>, trees: Vec<Tree>) -> Result<Self, ModelError> {
        let forest = Self {
            feature_names,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    /// Checks the structural invariants evaluation relies on: at least one
    /// tree, no empty tree, feature indices in range, finite numbers, and
    /// child indices that point strictly forward (so every walk terminates).
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::EmptyForest);
        }

        let n_features = self.feature_names.len();
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            let invalid = |node: usize, reason: String| ModelError::InvalidNode {
                tree: tree_idx,
                node,
                reason,
            };
            if tree.nodes.is_empty() {
                return Err(invalid(0, "tree has no nodes".to_string()));
            }
            let n_nodes = tree.nodes.len();
            for (node_idx, node) in tree.nodes.iter().enumerate() {
                match node {
                    Node::Leaf { value } if !value.is_finite() => {
                        return Err(invalid(node_idx, format!("leaf value {value} is not finite")));
                    }
                    Node::Leaf { .. } => {}
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= n_features {
                            return Err(invalid(
                                node_idx,
                                format!(
                                    "feature index {feature} is out of range for {n_features} features"
                                ),
                            ));
                        }
                        if !threshold.is_finite() {
                            return Err(invalid(
                                node_idx,
                                format!("threshold {threshold} is not finite"),
                            ));
                        }
                        for child in [*left, *right] {
                            if child <= node_idx || child >= n_nodes {
                                return Err(invalid(
                                    node_idx,
                                    format!(
                                        "child index {child} must lie in ({node_idx}, {n_nodes})"
                                    ),
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Mean leaf value over all trees for one row.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.evaluate(row)).sum();
        total / self.trees.len() as f64
    }

    /// Saves the forest to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a forest from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let forest: Self = toml::from_str(&toml_string)?;
        forest.validate()?;
        log::info!(
            "Loaded regression forest from '{}': {} trees over {} features",
            path.display(),
            forest.trees.len(),
            forest.feature_names.len()
        );
        Ok(forest)
    }
}

impl Predictor for RegressionForest {
    fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }

    fn predict(&self, rows: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if rows.ncols() != self.feature_count() {
            return Err(ModelError::FeatureCountMismatch {
                found: rows.ncols(),
                expected: self.feature_count(),
            });
        }

        let predictions: Vec<f64> = rows
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| self.predict_row(row))
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}
