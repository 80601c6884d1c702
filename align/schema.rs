//! # Feature Schema Store
//!
//! The schema is the ordered list of feature names a regressor was fitted on.
//! It is produced once at training time, persisted as a flat artifact, and then
//! treated as read-only for the rest of the process lifetime.
//!
//! - Order is the contract. The model consumes an unlabeled positional vector,
//!   so position `i` of every aligned vector must hold the value for `names[i]`.
//! - Loading failures (`SchemaLoadError`) are deployment problems, not caller
//!   problems. They are kept apart from the alignment errors on purpose.
//! - Two artifact formats are accepted: a TOML file with a `features` array
//!   (and an optional `version`), or a plain list with one name per line.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// The ordered, duplicate-free list of feature names a model expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
    version: Option<String>,
}

/// Failures while locating, reading, parsing or validating a schema artifact.
#[derive(Error, Debug)]
pub enum SchemaLoadError {
    #[error(
        "Feature schema artifact '{}' was not found. Re-export it from the training run or fix the configured path.",
        .0.display()
    )]
    NotFound(PathBuf),
    #[error("Failed to read feature schema artifact '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse feature schema artifact '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("The feature schema lists no features.")]
    Empty,
    #[error("The feature name at position {0} is blank.")]
    BlankFeature(usize),
    #[error("The feature '{0}' appears more than once in the schema.")]
    DuplicateFeature(String),
}

/// On-disk shape of a TOML schema artifact.
#[derive(Deserialize)]
struct SchemaArtifact {
    features: Vec<String>,
    #[serde(default)]
    version: Option<String>,
}

impl FeatureSchema {
    /// Builds a schema from names in training order, enforcing the same rules
    /// as a loaded artifact: non-empty, no blank names, no duplicates.
    pub fn new(names: Vec<String>) -> Result<Self, SchemaLoadError> {
        if names.is_empty() {
            return Err(SchemaLoadError::Empty);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SchemaLoadError::BlankFeature(position));
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaLoadError::DuplicateFeature(name.clone()));
            }
        }

        Ok(Self {
            names,
            version: None,
        })
    }

    /// Tags the schema with the version label recorded at training time.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Loads a schema artifact from disk.
    ///
    /// Files ending in `.toml` are parsed as `features = [...]`; anything else
    /// is read as one name per line, skipping blank lines and `#` comments.
    pub fn load(path: &Path) -> Result<Self, SchemaLoadError> {
        let text = match fs::read_to_string(path) {
            Ok(mut text) => {
                // Spreadsheet exports prepend a byte-order mark to the first name.
                if text.starts_with('\u{feff}') {
                    text.replace_range(..'\u{feff}'.len_utf8(), "");
                }
                text
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SchemaLoadError::NotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(SchemaLoadError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            let artifact: SchemaArtifact =
                toml::from_str(&text).map_err(|source| SchemaLoadError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(Self::new(artifact.features)?.with_version(artifact.version))
        } else {
            Self::new(parse_name_lines(&text))
        }
    }

    /// Feature names in training order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the schema lists no features.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Index of `name` in training order, if the schema contains it.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

fn parse_name_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Process-wide holder for the schema artifact.
///
/// The artifact is read on the first successful `get` and then shared as an
/// immutable `Arc` for the lifetime of the store; it is never re-read once
/// loaded. A failed load is not cached, so a later call can succeed after the
/// artifact is redeployed.
#[derive(Debug)]
pub struct SchemaStore {
    path: PathBuf,
    cell: OnceLock<Arc<FeatureSchema>>,
}

impl SchemaStore {
    /// A store that loads lazily from `path` on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceLock::new(),
        }
    }

    /// A store that already holds `schema` and never touches the filesystem.
    pub fn preloaded(schema: FeatureSchema) -> Self {
        let cell = OnceLock::new();
        cell.get_or_init(|| Arc::new(schema));
        Self {
            path: PathBuf::new(),
            cell,
        }
    }

    /// Location of the backing artifact (empty for a preloaded store).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the cached schema, loading the artifact on first use.
    pub fn get(&self) -> Result<Arc<FeatureSchema>, SchemaLoadError> {
        if let Some(schema) = self.cell.get() {
            log::debug!("Using cached feature schema ({} features)", schema.len());
            return Ok(Arc::clone(schema));
        }

        let loaded = Arc::new(FeatureSchema::load(&self.path)?);
        log::info!(
            "Loaded feature schema from '{}': {} features, version {}",
            self.path.display(),
            loaded.len(),
            loaded.version().unwrap_or("unversioned")
        );
        // A concurrent loader may have won the race; both read the same artifact.
        Ok(Arc::clone(self.cell.get_or_init(|| loaded)))
    }
}
