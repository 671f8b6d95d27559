//! Three-criterion merged ensemble: configuration, training, prediction.
//!
//! Training grows one forest per split criterion (Gini, entropy, log-loss)
//! from the same seed and splices their trees into a single
//! [`MergedEnsemble`]. Prediction averages leaf class distributions across
//! all trees and returns the raw class code with the highest mean.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{info, instrument};

use crate::error::RfError;
use crate::forest::{ForestParams, train_forest};
use crate::split::SplitCriterion;
use crate::tree::DecisionTree;

/// How many predictor columns each split considers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// ceil(sqrt(n_features)) — the usual classification default.
    Sqrt,
    /// ceil(log2(n_features)), at least 1.
    Log2,
    /// ceil(n_features * fraction).
    Fraction(f64),
    /// An exact count.
    Fixed(usize),
    /// All columns (no random subsetting).
    All,
}

/// Resolve `MaxFeatures` to a concrete column count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, RfError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(RfError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Configuration for the merged three-criterion ensemble.
///
/// Construct via [`EnsembleConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default  |
/// |---------------------|----------|
/// | `max_depth`         | `None`   |
/// | `min_samples_split` | 2        |
/// | `min_samples_leaf`  | 1        |
/// | `max_features`      | `Sqrt`   |
/// | `bootstrap`         | `true`   |
/// | `balanced`          | `true`   |
/// | `seed`              | 21       |
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub(crate) trees_per_forest: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) bootstrap: bool,
    pub(crate) balanced: bool,
    pub(crate) seed: u64,
}

impl EnsembleConfig {
    /// Create a config with `trees_per_forest` trees per criterion.
    ///
    /// The merged ensemble will hold `3 * trees_per_forest` trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] when `trees_per_forest` is zero.
    pub fn new(trees_per_forest: usize) -> Result<Self, RfError> {
        if trees_per_forest == 0 {
            return Err(RfError::InvalidTreeCount { trees_per_forest });
        }
        Ok(Self {
            trees_per_forest,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            balanced: true,
            seed: 21,
        })
    }

    /// Set the maximum tree depth (`None` = unlimited).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of rows required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of rows required in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the per-split predictor subsetting strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Enable or disable bootstrap sampling of training rows.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Enable or disable balanced class weighting.
    ///
    /// When enabled, each row of class `c` carries weight
    /// `n_samples / (n_classes * count_c)`, so rare classes contribute as
    /// much total weight to impurity and leaf distributions as common ones.
    #[must_use]
    pub fn with_balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    /// Set the random seed. All three sub-forests share it.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train the merged ensemble.
    ///
    /// `features` is row-major; `class_codes` are the raw integer class
    /// codes (need not be dense or zero-based); `feature_names` are the
    /// covariate column names in table order, recorded in the model for
    /// prediction-time schema checks.
    ///
    /// # Errors
    ///
    /// Data errors ([`RfError::EmptyDataset`], [`RfError::ZeroFeatures`],
    /// [`RfError::FeatureCountMismatch`], [`RfError::NonFiniteValue`],
    /// [`RfError::LabelCountMismatch`], [`RfError::DegenerateClasses`]) and
    /// config errors ([`RfError::InvalidMaxDepth`],
    /// [`RfError::InvalidMinSamplesSplit`], [`RfError::InvalidMinSamplesLeaf`],
    /// [`RfError::InvalidMaxFeatures`]).
    #[instrument(skip_all, fields(trees_per_forest = self.trees_per_forest, n_samples = features.len()))]
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        class_codes: &[i64],
        feature_names: &[String],
    ) -> Result<MergedEnsemble, RfError> {
        if features.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let n_samples = features.len();
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(RfError::ZeroFeatures);
        }
        if class_codes.len() != n_samples {
            return Err(RfError::LabelCountMismatch {
                n_samples,
                n_labels: class_codes.len(),
            });
        }
        for (sample_index, row) in features.iter().enumerate() {
            if row.len() != n_features {
                return Err(RfError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                    sample_index,
                });
            }
            for (feature_index, &val) in row.iter().enumerate() {
                if !val.is_finite() {
                    return Err(RfError::NonFiniteValue {
                        sample_index,
                        feature_index,
                    });
                }
            }
        }

        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(RfError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(RfError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let max_features = resolve_max_features(self.max_features, n_features)?;

        // Map raw class codes to dense zero-based indices.
        let mut codes: Vec<i64> = class_codes.to_vec();
        codes.sort_unstable();
        codes.dedup();
        let n_classes = codes.len();
        if n_classes < 2 {
            return Err(RfError::DegenerateClasses { n_classes });
        }
        let labels: Vec<usize> = class_codes
            .iter()
            .map(|code| {
                codes
                    .binary_search(code)
                    .unwrap_or_else(|_| unreachable!("codes built from class_codes"))
            })
            .collect();

        // Balanced weights: n / (k * count_c) per row of class c.
        let weights: Vec<f64> = if self.balanced {
            let mut counts = vec![0usize; n_classes];
            for &label in &labels {
                counts[label] += 1;
            }
            let n = n_samples as f64;
            let k = n_classes as f64;
            labels
                .iter()
                .map(|&label| n / (k * counts[label] as f64))
                .collect()
        } else {
            vec![1.0; n_samples]
        };

        info!(
            n_samples,
            n_features,
            n_classes,
            max_features,
            balanced = self.balanced,
            "training merged ensemble"
        );

        // Same seed per criterion: only the impurity formula varies.
        let mut trees = Vec::with_capacity(3 * self.trees_per_forest);
        for criterion in [
            SplitCriterion::Gini,
            SplitCriterion::Entropy,
            SplitCriterion::LogLoss,
        ] {
            let params = ForestParams {
                criterion,
                n_trees: self.trees_per_forest,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                min_samples_leaf: self.min_samples_leaf,
                max_features,
                bootstrap: self.bootstrap,
                seed: self.seed,
            };
            let forest = train_forest(params, features, &labels, &weights, n_classes)?;
            trees.extend(forest.into_trees());
        }

        info!(n_trees = trees.len(), "merged ensemble training complete");

        Ok(MergedEnsemble {
            trees,
            n_features,
            class_codes: codes,
            feature_names: feature_names.to_vec(),
        })
    }
}

/// A fitted merged ensemble of `3 * trees_per_forest` trees.
///
/// Stores the sorted class codes and covariate names observed at training
/// time; predictions are returned as raw class codes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MergedEnsemble {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) class_codes: Vec<i64>,
    pub(crate) feature_names: Vec<String>,
}

impl MergedEnsemble {
    /// Return the total number of trees.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of covariate columns the model was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of distinct classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_codes.len()
    }

    /// Return the sorted class codes observed at training time.
    #[must_use]
    pub fn class_codes(&self) -> &[i64] {
        &self.class_codes
    }

    /// Return the covariate column names in training order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Check that `names` matches the training covariate schema exactly
    /// (same names, same order).
    ///
    /// # Errors
    ///
    /// [`RfError::PredictionFeatureMismatch`] when the counts differ,
    /// [`RfError::PredictorColumnMismatch`] at the first name disagreement.
    pub fn check_feature_names(&self, names: &[String]) -> Result<(), RfError> {
        if names.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: names.len(),
            });
        }
        for (position, (expected, got)) in self.feature_names.iter().zip(names).enumerate() {
            if expected != got {
                return Err(RfError::PredictorColumnMismatch {
                    position,
                    expected: expected.clone(),
                    got: got.clone(),
                });
            }
        }
        Ok(())
    }

    /// Average the leaf class distributions over all trees for one row.
    ///
    /// The result has length `n_classes` and sums to 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when the row length
    /// disagrees with the trained column count.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let mut sums = vec![0.0f64; self.class_codes.len()];
        for tree in &self.trees {
            let proba = tree.predict_proba(sample)?;
            for (s, p) in sums.iter_mut().zip(&proba) {
                *s += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        for s in &mut sums {
            *s /= n_trees;
        }
        Ok(sums)
    }

    /// Predict the class code for one row.
    ///
    /// Ties between codes break toward the lowest code.
    ///
    /// # Errors
    ///
    /// Same as [`MergedEnsemble::predict_proba`].
    pub fn predict(&self, sample: &[f64]) -> Result<i64, RfError> {
        let (code, _) = self.predict_with_confidence(sample)?;
        Ok(code)
    }

    /// Predict the class code and its mean vote share for one row.
    ///
    /// The confidence is the winning class's averaged distribution value,
    /// in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Same as [`MergedEnsemble::predict_proba`].
    pub fn predict_with_confidence(&self, sample: &[f64]) -> Result<(i64, f64), RfError> {
        let proba = self.predict_proba(sample)?;
        // max_by keeps the last maximum; scanning reversed makes ties
        // break toward the lowest class code.
        let (best_idx, best_p) = proba
            .iter()
            .enumerate()
            .rev()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &p)| (i, p))
            .unwrap_or((0, 0.0));
        Ok((self.class_codes[best_idx], best_p))
    }

    /// Predict class codes for a batch of rows in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`MergedEnsemble::predict_proba`], for the first bad row.
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, RfError> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }

    /// Predict class codes with confidences for a batch of rows in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`MergedEnsemble::predict_proba`], for the first bad row.
    pub fn predict_batch_with_confidence(
        &self,
        rows: &[Vec<f64>],
    ) -> Result<Vec<(i64, f64)>, RfError> {
        rows.par_iter()
            .map(|row| self.predict_with_confidence(row))
            .collect()
    }
}
