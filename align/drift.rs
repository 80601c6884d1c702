//! Name-set consistency between a schema and an input producer.
//!
//! Alignment catches a bad request when it happens. This check catches the
//! same class of problem earlier, at load time, by comparing the keys a
//! producer (the prediction form, a feature-importance table, a request
//! template) is able to supply with the names the schema requires. Renamed
//! features such as `water access` vs `water_access` are flagged as likely
//! renames so the fix is obvious.

use crate::schema::FeatureSchema;
use itertools::Itertools;
use std::collections::HashSet;
use std::fmt;

/// A producer key that looks like a renamed schema feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikelyRename {
    pub producer_key: String,
    pub schema_name: String,
}

/// The outcome of comparing a schema with a producer's key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    /// Schema names the producer never supplies, in schema order.
    pub unserved: Vec<String>,
    /// Producer keys the schema does not use, sorted.
    pub unknown: Vec<String>,
    /// Unknown keys whose normalised spelling matches an unserved name.
    pub likely_renames: Vec<LikelyRename>,
}

impl DriftReport {
    pub fn compare<'a>(
        schema: &FeatureSchema,
        producer_keys: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let supplied: HashSet<&str> = producer_keys.into_iter().collect();

        let unserved: Vec<String> = schema
            .names()
            .iter()
            .filter(|name| !supplied.contains(name.as_str()))
            .cloned()
            .collect();

        let unknown: Vec<String> = supplied
            .iter()
            .filter(|key| !schema.contains(key))
            .map(|key| key.to_string())
            .sorted()
            .collect();

        let likely_renames = unknown
            .iter()
            .filter_map(|key| {
                let normalised = normalise_name(key);
                unserved
                    .iter()
                    .find(|name| normalise_name(name) == normalised)
                    .map(|name| LikelyRename {
                        producer_key: key.clone(),
                        schema_name: name.clone(),
                    })
            })
            .collect();

        Self {
            unserved,
            unknown,
            likely_renames,
        }
    }

    /// True when the producer can satisfy every schema name.
    pub fn is_compatible(&self) -> bool {
        self.unserved.is_empty()
    }

    /// True when the key sets are identical.
    pub fn is_exact(&self) -> bool {
        self.unserved.is_empty() && self.unknown.is_empty()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "producer keys match the schema exactly");
        }
        if !self.unserved.is_empty() {
            writeln!(
                f,
                "never supplied: {}",
                self.unserved.iter().map(|n| format!("'{n}'")).join(", ")
            )?;
        }
        if !self.unknown.is_empty() {
            writeln!(
                f,
                "not in schema: {}",
                self.unknown.iter().map(|n| format!("'{n}'")).join(", ")
            )?;
        }
        for rename in &self.likely_renames {
            writeln!(
                f,
                "likely rename: '{}' -> '{}'",
                rename.producer_key, rename.schema_name
            )?;
        }
        Ok(())
    }
}

/// Lowercases and collapses every run of non-alphanumeric characters to `_`.
pub fn normalise_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|n| n.to_string()).collect()).unwrap()
    }

    #[test]
    fn identical_key_sets_are_exact() {
        let report = DriftReport::compare(
            &schema(&["irrigation", "water_access"]),
            ["water_access", "irrigation"],
        );
        assert!(report.is_exact());
        assert!(report.is_compatible());
        assert_eq!(report.to_string(), "producer keys match the schema exactly");
    }

    #[test]
    fn superset_producer_is_compatible_but_not_exact() {
        let report = DriftReport::compare(
            &schema(&["irrigation"]),
            ["irrigation", "year", "area"],
        );
        assert!(report.is_compatible());
        assert!(!report.is_exact());
        assert_eq!(report.unknown, vec!["area", "year"]);
    }

    #[test]
    fn renamed_feature_is_flagged() {
        let report = DriftReport::compare(
            &schema(&["irrigation", "water access"]),
            ["irrigation", "water_access"],
        );
        assert!(!report.is_compatible());
        assert_eq!(report.unserved, vec!["water access"]);
        assert_eq!(
            report.likely_renames,
            vec![LikelyRename {
                producer_key: "water_access".to_string(),
                schema_name: "water access".to_string(),
            }]
        );
        let text = report.to_string();
        assert!(text.contains("never supplied: 'water access'"));
        assert!(text.contains("likely rename: 'water_access' -> 'water access'"));
    }

    #[test]
    fn normalisation_collapses_punctuation_runs() {
        assert_eq!(
            normalise_name("Cereal import dependency ratio (percent) (3-year average)"),
            "cereal_import_dependency_ratio_percent_3_year_average"
        );
        assert_eq!(normalise_name("  Water--Access "), "water_access");
    }
}
