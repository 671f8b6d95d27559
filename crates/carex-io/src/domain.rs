//! Domain types for carex-io.

use crate::IoError;

/// A spatial partition identifier (e.g. "A1", "C3").
///
/// Partition names double as input/output file stems, so they must match
/// `[A-Za-z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionId(String);

impl PartitionId {
    /// Parse and validate a partition name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidPartitionName`] if the name is empty or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidPartitionName { name });
        }
        Ok(Self(name))
    }

    /// Return the partition name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A segment identifier, the join key between label and covariate tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentId(String);

impl SegmentId {
    /// Wrap a non-empty segment key.
    pub(crate) fn new(id: String) -> Self {
        debug_assert!(!id.is_empty(), "segment ID must not be empty");
        Self(id)
    }

    /// Return the segment ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The joined labeled working table for training and cross-validation.
///
/// Parallel vectors: row `i` of every field describes the same segment.
/// Loaders build fresh tables; nothing mutates a caller's table.
#[derive(Debug)]
pub struct SegmentTable {
    segment_ids: Vec<SegmentId>,
    point_x: Vec<f64>,
    point_y: Vec<f64>,
    class_codes: Vec<i64>,
    cv_groups: Vec<i64>,
    covariate_names: Vec<String>,
    features: Vec<Vec<f64>>,
}

impl SegmentTable {
    pub(crate) fn new(
        segment_ids: Vec<SegmentId>,
        point_x: Vec<f64>,
        point_y: Vec<f64>,
        class_codes: Vec<i64>,
        cv_groups: Vec<i64>,
        covariate_names: Vec<String>,
        features: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            segment_ids,
            point_x,
            point_y,
            class_codes,
            cv_groups,
            covariate_names,
            features,
        }
    }

    /// Concatenate tables in order into a new table.
    ///
    /// Callers guarantee identical covariate schemas (the loader enforces
    /// this across partitions before any table is built).
    #[must_use]
    pub fn concat(tables: Vec<SegmentTable>) -> Self {
        let covariate_names = tables
            .first()
            .map(|t| t.covariate_names.clone())
            .unwrap_or_default();
        let mut segment_ids = Vec::new();
        let mut point_x = Vec::new();
        let mut point_y = Vec::new();
        let mut class_codes = Vec::new();
        let mut cv_groups = Vec::new();
        let mut features = Vec::new();
        for table in tables {
            segment_ids.extend(table.segment_ids);
            point_x.extend(table.point_x);
            point_y.extend(table.point_y);
            class_codes.extend(table.class_codes);
            cv_groups.extend(table.cv_groups);
            features.extend(table.features);
        }
        Self {
            segment_ids,
            point_x,
            point_y,
            class_codes,
            cv_groups,
            covariate_names,
            features,
        }
    }

    /// Return the segment IDs.
    #[must_use]
    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.segment_ids
    }

    /// Return the POINT_X coordinates.
    #[must_use]
    pub fn point_x(&self) -> &[f64] {
        &self.point_x
    }

    /// Return the POINT_Y coordinates.
    #[must_use]
    pub fn point_y(&self) -> &[f64] {
        &self.point_y
    }

    /// Return the class codes.
    #[must_use]
    pub fn class_codes(&self) -> &[i64] {
        &self.class_codes
    }

    /// Return the cross-validation group values.
    #[must_use]
    pub fn cv_groups(&self) -> &[i64] {
        &self.cv_groups
    }

    /// Return the covariate column names in table order.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the covariate matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.segment_ids.len()
    }

    /// Return the number of covariate columns.
    #[must_use]
    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }
}

/// The unlabeled per-partition table for batch prediction.
///
/// Same layout as [`SegmentTable`] minus the label columns; every joined
/// row is kept, regardless of class.
#[derive(Debug)]
pub struct PredictionInput {
    segment_ids: Vec<SegmentId>,
    point_x: Vec<f64>,
    point_y: Vec<f64>,
    covariate_names: Vec<String>,
    features: Vec<Vec<f64>>,
}

impl PredictionInput {
    pub(crate) fn new(
        segment_ids: Vec<SegmentId>,
        point_x: Vec<f64>,
        point_y: Vec<f64>,
        covariate_names: Vec<String>,
        features: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            segment_ids,
            point_x,
            point_y,
            covariate_names,
            features,
        }
    }

    /// Return the segment IDs.
    #[must_use]
    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.segment_ids
    }

    /// Return the POINT_X coordinates.
    #[must_use]
    pub fn point_x(&self) -> &[f64] {
        &self.point_x
    }

    /// Return the POINT_Y coordinates.
    #[must_use]
    pub fn point_y(&self) -> &[f64] {
        &self.point_y
    }

    /// Return the covariate column names in table order.
    #[must_use]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Return the covariate matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.segment_ids.len()
    }
}
