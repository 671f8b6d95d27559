//! Tabular input, validation, and artifact output for the carex pipeline.

mod domain;
mod error;
mod partition;
mod schema;
mod writer;

pub use domain::{PartitionId, PredictionInput, SegmentId, SegmentTable};
pub use error::IoError;
pub use partition::PartitionLoader;
pub use schema::{ClassEntry, ClassSchema};
pub use writer::{ArtifactWriter, PredictionRow};
