#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! # foodsec
//!
//! Feature alignment, prediction and forecast serving behind the ASEAN food
//! security monitoring dashboard.
//!
//! The heart of the crate is [`aligner`]: it turns an unordered mapping of
//! feature name to value into the exact positional vector a trained regressor
//! was fitted on, and refuses loudly when the mapping is incomplete or holds a
//! value that is not a number. Everything else loads the flat artifacts that
//! surround it (schema, model, forecast tables, dataset summaries).

pub mod aligner;
pub mod drift;
pub mod input;
pub mod schema;
pub mod table;

#[path = "../shared/config.rs"]
pub mod config;

#[path = "../predict/mod.rs"]
pub mod predict;

#[path = "../forecast/mod.rs"]
pub mod forecast;

#[path = "../overview/mod.rs"]
pub mod overview;

pub use aligner::{AlignError, AlignedVector, FeatureAligner, align};
pub use input::{FeatureInput, FeatureValue, InputError};
pub use schema::{FeatureSchema, SchemaLoadError, SchemaStore};
