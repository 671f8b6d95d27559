//! I/O error types for carex-io.

use std::path::PathBuf;

/// Errors from partition loading, class-schema parsing, and artifact writing.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when an input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned by the up-front check when a partition's input file is absent.
    #[error("partition {partition} is missing input file {path}")]
    MissingPartitionFile {
        /// The partition whose file is missing.
        partition: String,
        /// Path that was expected.
        path: PathBuf,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a required column is absent from a CSV header.
    #[error("missing column \"{column}\" in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The required column name.
        column: String,
    },

    /// Returned when a partition yields zero usable rows.
    #[error("empty partition (no usable rows) in {path}")]
    EmptyPartition {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a covariate file carries no predictor columns.
    #[error("no covariate columns in {path}")]
    NoCovariateColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when the same segment ID appears more than once in a file.
    #[error("duplicate segment ID \"{segment_id}\" in {path}: first at row {first_row}, again at row {second_row}")]
    DuplicateSegmentId {
        /// Path to the CSV file.
        path: PathBuf,
        /// The duplicated segment ID.
        segment_id: String,
        /// Zero-based row index of the first occurrence.
        first_row: usize,
        /// Zero-based row index of the duplicate.
        second_row: usize,
    },

    /// Returned when a cell cannot be parsed as a finite number.
    #[error("invalid value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    InvalidValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Column name of the offending cell.
        column: String,
        /// The raw cell text.
        raw: String,
    },

    /// Returned when a partition's covariate columns disagree with the
    /// schema fixed by the first partition.
    #[error(
        "covariate schema mismatch in partition {partition}: column {position} is \"{got}\", expected \"{expected}\""
    )]
    SchemaMismatch {
        /// The partition whose columns disagree.
        partition: String,
        /// Zero-based covariate column position of the first disagreement.
        position: usize,
        /// The column name the first partition established.
        expected: String,
        /// The column name found.
        got: String,
    },

    /// Returned when a partition name contains invalid characters.
    #[error("invalid partition name \"{name}\": must match [A-Za-z0-9_-]+")]
    InvalidPartitionName {
        /// The rejected name.
        name: String,
    },

    /// Returned when the class-schema JSON fails validation.
    #[error("invalid class schema in {path}: {reason}")]
    InvalidClassSchema {
        /// Path to the schema file.
        path: PathBuf,
        /// What failed.
        reason: String,
    },

    /// Returned when the class-schema JSON cannot be decoded.
    #[error("cannot parse class schema {path}")]
    ClassSchemaParse {
        /// Path to the schema file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when an observed class code is absent from the class schema.
    #[error("class code {code} is not declared in the class schema")]
    UnknownClassCode {
        /// The undeclared code.
        code: i64,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an artifact file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
