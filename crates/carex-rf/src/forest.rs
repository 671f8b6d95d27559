//! Single-criterion forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::error::RfError;
use crate::split::SplitCriterion;
use crate::tree::{DecisionTree, DecisionTreeConfig};

/// A fitted forest of trees grown under a single split criterion.
///
/// Intermediate product of ensemble training; the merged ensemble consumes
/// forests via [`RandomForest::into_trees`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
}

impl RandomForest {
    /// Return the number of trees.
    pub(crate) fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Consume the forest and yield its trees for merging.
    pub(crate) fn into_trees(self) -> Vec<DecisionTree> {
        self.trees
    }
}

/// Parameters for one forest, with `max_features` already resolved to a
/// concrete column count.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ForestParams {
    pub criterion: SplitCriterion,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

/// Draw a bootstrap sample of `n_samples` indices with replacement.
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

/// Train one forest. Inputs are pre-validated by the ensemble layer.
#[instrument(skip_all, fields(criterion = %params.criterion, n_trees = params.n_trees))]
pub(crate) fn train_forest(
    params: ForestParams,
    features: &[Vec<f64>],
    labels: &[usize],
    weights: &[f64],
    n_classes: usize,
) -> Result<RandomForest, RfError> {
    let n_samples = features.len();
    let n_features = features[0].len();

    // Per-tree seeds from a master RNG keep results independent of the
    // rayon scheduling order.
    let mut master_rng = ChaCha8Rng::seed_from_u64(params.seed);
    let tree_seeds: Vec<u64> = (0..params.n_trees).map(|_| master_rng.r#gen()).collect();

    let trees: Vec<DecisionTree> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let tree_config = DecisionTreeConfig::new()
                .with_criterion(params.criterion)
                .with_max_depth(params.max_depth)
                .with_min_samples_split(params.min_samples_split)
                .with_min_samples_leaf(params.min_samples_leaf)
                .with_max_features(Some(params.max_features))
                .with_seed(rng.r#gen());

            let tree = if params.bootstrap {
                let indices = bootstrap_sample(n_samples, &mut rng);
                let boot_features: Vec<Vec<f64>> =
                    indices.iter().map(|&i| features[i].clone()).collect();
                let boot_labels: Vec<usize> = indices.iter().map(|&i| labels[i]).collect();
                let boot_weights: Vec<f64> = indices.iter().map(|&i| weights[i]).collect();
                tree_config.fit(&boot_features, &boot_labels, &boot_weights)
            } else {
                tree_config.fit(features, labels, weights)
            };

            // All inputs are pre-validated — fit cannot fail on data errors.
            tree.expect("tree fit should not fail on pre-validated data")
        })
        .collect();

    debug!(n_trees_trained = trees.len(), "forest training complete");

    Ok(RandomForest {
        trees,
        n_features,
        n_classes,
    })
}
