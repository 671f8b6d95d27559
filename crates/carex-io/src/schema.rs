//! Versioned class-code dictionary loaded from JSON.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument};

use crate::IoError;

/// One class declaration: an integer code and a human-readable label.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClassEntry {
    /// Positive integer class code as stored in the label tables.
    pub code: i64,
    /// Human-readable class label (e.g. "fen", "open water").
    pub label: String,
}

/// The canonical class dictionary for one mapping round.
///
/// ```json
/// {
///   "round": "wetlands-2024",
///   "classes": [ { "code": 1, "label": "bog" }, ... ]
/// }
/// ```
///
/// One schema file per round is the single source of truth for which codes
/// exist; training validates observed labels against it and prediction
/// validates the loaded model's classes against it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClassSchema {
    /// Name of the mapping round this schema belongs to.
    pub round: String,
    /// The declared classes.
    pub classes: Vec<ClassEntry>,
}

impl ClassSchema {
    /// Load and validate a class schema from a JSON file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | File missing or unreadable |
    /// | [`IoError::ClassSchemaParse`] | Malformed JSON |
    /// | [`IoError::InvalidClassSchema`] | Empty class list, non-positive or duplicate code |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IoError::FileNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        let schema: ClassSchema =
            serde_json::from_str(&text).map_err(|e| IoError::ClassSchemaParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        schema.validate(path)?;
        info!(
            round = %schema.round,
            n_classes = schema.classes.len(),
            "class schema loaded"
        );
        Ok(schema)
    }

    fn validate(&self, path: &Path) -> Result<(), IoError> {
        if self.classes.is_empty() {
            return Err(IoError::InvalidClassSchema {
                path: path.to_path_buf(),
                reason: "class list is empty".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for entry in &self.classes {
            if entry.code <= 0 {
                return Err(IoError::InvalidClassSchema {
                    path: path.to_path_buf(),
                    reason: format!("non-positive class code {}", entry.code),
                });
            }
            if !seen.insert(entry.code) {
                return Err(IoError::InvalidClassSchema {
                    path: path.to_path_buf(),
                    reason: format!("duplicate class code {}", entry.code),
                });
            }
        }
        Ok(())
    }

    /// Return the declared class codes in declaration order.
    #[must_use]
    pub fn codes(&self) -> Vec<i64> {
        self.classes.iter().map(|c| c.code).collect()
    }

    /// Return the label for a code, if declared.
    #[must_use]
    pub fn label_for(&self, code: i64) -> Option<&str> {
        self.classes
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.label.as_str())
    }

    /// Check that every observed code is declared in this schema.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownClassCode`] for the first undeclared code.
    pub fn check_codes(&self, observed: &[i64]) -> Result<(), IoError> {
        let declared: HashSet<i64> = self.classes.iter().map(|c| c.code).collect();
        for &code in observed {
            if !declared.contains(&code) {
                return Err(IoError::UnknownClassCode { code });
            }
        }
        Ok(())
    }
}
