//! Merged random-forest classification for land-cover mapping: train,
//! cross-validate, predict.
//!
//! Provides weighted CART decision trees, a three-criterion merged ensemble
//! (Gini, entropy, log-loss sub-forests spliced into one classifier),
//! leave-one-group-out cross-validation, confusion matrices keyed by class
//! code, MDI covariate importances, and model serialization.

mod confusion;
mod ensemble;
mod error;
mod eval;
mod forest;
mod importance;
mod node;
mod serialize;
mod split;
mod tree;

pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use ensemble::{EnsembleConfig, MaxFeatures, MergedEnsemble};
pub use error::RfError;
pub use eval::{CrossValidationResult, Fold, LeaveOneGroupOut, cross_validate};
pub use importance::{FeatureImportance, mdi_importances};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use split::SplitCriterion;
pub use tree::{DecisionTree, DecisionTreeConfig};
