//! Caller-supplied feature values, keyed by name.
//!
//! Producers (the prediction form, a TOML request file, command-line
//! assignments) hand over whatever keys they know about. Nothing here checks
//! those keys against a schema; that is the aligner's job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// A single raw value as a producer supplied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl FeatureValue {
    /// Coerces the value to a finite number, the only thing a model accepts.
    ///
    /// Booleans map to 1.0 and 0.0. Text is trimmed and parsed as a float.
    /// NaN and infinities are refused whatever their origin.
    pub fn to_number(&self) -> Option<f64> {
        let value = match self {
            FeatureValue::Number(v) => *v,
            FeatureValue::Flag(true) => 1.0,
            FeatureValue::Flag(false) => 0.0,
            FeatureValue::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{v}"),
            FeatureValue::Flag(b) => write!(f, "{b}"),
            FeatureValue::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Flag(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

/// Failures while building an input before it ever reaches the aligner.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse input file as a flat TOML table of feature values: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Malformed assignment '{0}'. Expected NAME=VALUE.")]
    MalformedAssignment(String),
}

/// An unordered mapping from feature name to raw value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FeatureInput {
    values: HashMap<String, FeatureValue>,
}

impl FeatureInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing any earlier value for the same key.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Overlays every entry of `other` onto `self`.
    pub fn extend(&mut self, other: FeatureInput) {
        self.values.extend(other.values);
    }

    /// Parses `NAME=VALUE` assignments as typed on a command line.
    ///
    /// The value is stored as a number when it parses as one and as text
    /// otherwise, so a later type mismatch reports what was typed.
    /// Only the first `=` splits; names are trimmed and must be non-empty.
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> Result<Self, InputError> {
        let mut input = Self::new();
        for raw in assignments {
            let raw = raw.as_ref();
            let (name, value) = raw
                .split_once('=')
                .ok_or_else(|| InputError::MalformedAssignment(raw.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(InputError::MalformedAssignment(raw.to_string()));
            }
            let value = match value.trim().parse::<f64>() {
                Ok(number) => FeatureValue::Number(number),
                Err(_) => FeatureValue::Text(value.trim().to_string()),
            };
            input.insert(name, value);
        }
        Ok(input)
    }

    /// Reads a flat TOML table (`name = value` lines) into an input.
    pub fn from_toml_file(path: &Path) -> Result<Self, InputError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

impl<K, V> FromIterator<(K, V)> for FeatureInput
where
    K: Into<String>,
    V: Into<FeatureValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut input = Self::new();
        for (name, value) in iter {
            input.insert(name, value);
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn numbers_flags_and_numeric_text_coerce() {
        assert_eq!(FeatureValue::Number(50.0).to_number(), Some(50.0));
        assert_eq!(FeatureValue::Flag(true).to_number(), Some(1.0));
        assert_eq!(FeatureValue::Flag(false).to_number(), Some(0.0));
        assert_eq!(FeatureValue::from(" 60.5 ").to_number(), Some(60.5));
    }

    #[test]
    fn labels_and_non_finite_values_do_not_coerce() {
        assert_eq!(FeatureValue::from("high").to_number(), None);
        assert_eq!(FeatureValue::from("").to_number(), None);
        assert_eq!(FeatureValue::from("NaN").to_number(), None);
        assert_eq!(FeatureValue::from("inf").to_number(), None);
        assert_eq!(FeatureValue::Number(f64::NAN).to_number(), None);
        assert_eq!(FeatureValue::Number(f64::NEG_INFINITY).to_number(), None);
    }

    #[test]
    fn text_values_display_quoted() {
        assert_eq!(FeatureValue::from("high").to_string(), "\"high\"");
        assert_eq!(FeatureValue::Number(60.0).to_string(), "60");
    }

    #[test]
    fn assignments_keep_unparseable_values_as_text() {
        let input =
            FeatureInput::from_assignments(&["irrigation=50", "water_access = high"]).unwrap();
        assert_eq!(input.get("irrigation"), Some(&FeatureValue::Number(50.0)));
        assert_eq!(
            input.get("water_access"),
            Some(&FeatureValue::from("high"))
        );
    }

    #[test]
    fn assignment_splits_on_first_equals_only() {
        let input = FeatureInput::from_assignments(&["note=a=b"]).unwrap();
        assert_eq!(input.get("note"), Some(&FeatureValue::from("a=b")));
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        for raw in ["irrigation", "=50"] {
            match FeatureInput::from_assignments(&[raw]) {
                Err(InputError::MalformedAssignment(text)) => assert_eq!(text, raw),
                other => panic!("Expected MalformedAssignment for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn toml_file_yields_mixed_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "irrigation = 50\nwater_access = 60.5\nlabel = \"high\"\nurban = true"
        )
        .unwrap();
        file.flush().unwrap();

        let input = FeatureInput::from_toml_file(file.path()).unwrap();
        assert_eq!(input.len(), 4);
        assert_eq!(input.get("irrigation"), Some(&FeatureValue::Number(50.0)));
        assert_eq!(input.get("water_access"), Some(&FeatureValue::Number(60.5)));
        assert_eq!(input.get("label"), Some(&FeatureValue::from("high")));
        assert_eq!(input.get("urban"), Some(&FeatureValue::Flag(true)));
    }

    #[test]
    fn nested_tables_are_not_feature_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[irrigation]\nvalue = 50").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            FeatureInput::from_toml_file(file.path()),
            Err(InputError::Parse(_))
        ));
    }

    #[test]
    fn later_entries_override_earlier_ones() {
        let mut input = FeatureInput::new().with("irrigation", 50.0);
        input.extend(FeatureInput::new().with("irrigation", 70.0));
        assert_eq!(input.get("irrigation"), Some(&FeatureValue::Number(70.0)));
    }
}
