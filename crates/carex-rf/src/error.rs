use std::path::PathBuf;

/// Errors from ensemble training, cross-validation, and prediction.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when trees_per_forest is zero.
    #[error("trees_per_forest must be at least 1, got {trees_per_forest}")]
    InvalidTreeCount {
        /// The invalid trees_per_forest value provided.
        trees_per_forest: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds the column count.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of predictor columns in the dataset.
        n_features: usize,
    },

    /// Returned when the training table has zero rows.
    #[error("training dataset has zero rows")]
    EmptyDataset,

    /// Returned when the training table has zero predictor columns.
    #[error("training dataset has zero predictor columns")]
    ZeroFeatures,

    /// Returned when a row has a different number of predictors than expected.
    #[error("row {sample_index} has {got} predictor values, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of predictor columns.
        expected: usize,
        /// The actual number of values in the row.
        got: usize,
        /// The zero-based index of the offending row.
        sample_index: usize,
    },

    /// Returned when the label vector length differs from the row count.
    #[error("{n_labels} class labels for {n_samples} rows")]
    LabelCountMismatch {
        /// The number of rows in the predictor matrix.
        n_samples: usize,
        /// The number of class labels provided.
        n_labels: usize,
    },

    /// Returned when a covariate value is NaN or infinite.
    #[error("non-finite covariate at row {sample_index}, column {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending row.
        sample_index: usize,
        /// The zero-based index of the offending predictor column.
        feature_index: usize,
    },

    /// Returned when training data contains fewer than two distinct classes.
    ///
    /// A single-class training set yields a degenerate constant classifier
    /// and indicates a broken fold or label table, so training aborts.
    #[error("training data contains {n_classes} distinct class(es), need at least 2")]
    DegenerateClasses {
        /// The number of distinct class codes observed.
        n_classes: usize,
    },

    /// Returned when a prediction row has the wrong number of predictors.
    #[error("prediction input has {got} predictor values, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of predictor columns.
        expected: usize,
        /// The actual number of values in the prediction input.
        got: usize,
    },

    /// Returned when a covariate column name disagrees with the trained model.
    #[error(
        "predictor column {position} is \"{got}\", but the classifier was trained on \"{expected}\""
    )]
    PredictorColumnMismatch {
        /// Zero-based column position of the first disagreement.
        position: usize,
        /// The column name the classifier was trained on.
        expected: String,
        /// The column name found in the input table.
        got: String,
    },

    /// Returned when the cross-validation groups yield fewer than two folds.
    #[error("cross-validation requires at least 2 distinct groups, got {n_groups}")]
    InsufficientGroups {
        /// The number of distinct group values observed.
        n_groups: usize,
    },

    /// Returned when classifier serialization fails.
    #[error("failed to serialize classifier")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when classifier deserialization fails.
    #[error("failed to deserialize classifier from {path}")]
    DeserializeModel {
        /// Path to the classifier file that could not be decoded.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the classifier file fails.
    #[error("failed to write classifier to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the classifier file fails.
    #[error("failed to read classifier from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a classifier with an incompatible format version.
    #[error("incompatible classifier version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The classifier format version this build expects.
        expected: u32,
        /// The classifier format version found in the file.
        found: u32,
        /// Path to the classifier file with the incompatible version.
        path: PathBuf,
    },
}
