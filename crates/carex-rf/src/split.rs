use rand::Rng;

use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
///
/// `Entropy` and `LogLoss` measure the same Shannon information in nats and
/// bits respectively; the constant factor between them leaves split ordering
/// unchanged, so the two criteria grow identical trees from the same seed.
/// The merged ensemble trains one sub-forest per variant regardless — the
/// splice is a diversity-injection mechanism, not a criterion comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Shannon entropy in nats: -Σ(p_i · ln(p_i))
    Entropy,
    /// Shannon entropy in bits: -Σ(p_i · log2(p_i))
    LogLoss,
}

impl std::fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitCriterion::Gini => write!(f, "gini"),
            SplitCriterion::Entropy => write!(f, "entropy"),
            SplitCriterion::LogLoss => write!(f, "log_loss"),
        }
    }
}

impl SplitCriterion {
    /// Compute the impurity of a node from its weighted class sums.
    ///
    /// `class_weights[c]` is the total sample weight of class `c` at the
    /// node; `total_weight` is their sum. Returns zero when the node carries
    /// no weight.
    #[must_use]
    pub fn impurity(&self, class_weights: &[f64], total_weight: f64) -> Impurity {
        if total_weight <= 0.0 {
            return Impurity::new(0.0);
        }
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_weights
                    .iter()
                    .map(|&w| {
                        let p = w / total_weight;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => -class_weights
                .iter()
                .filter(|&&w| w > 0.0)
                .map(|&w| {
                    let p = w / total_weight;
                    p * p.ln()
                })
                .sum::<f64>(),
            SplitCriterion::LogLoss => -class_weights
                .iter()
                .filter(|&&w| w > 0.0)
                .map(|&w| {
                    let p = w / total_weight;
                    p * p.log2()
                })
                .sum::<f64>(),
        };
        Impurity::new(value)
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Predictor column used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Weighted impurity decrease from this split (MDI formula).
    pub(crate) impurity_decrease: f64,
    /// Row indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Row indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among a random subset of predictor columns.
///
/// For each of `max_features` randomly chosen columns, sorts the
/// `(value, row)` pairs, scans left-to-right with incremental weighted
/// class-sum updates, and tracks the globally best split by weighted
/// impurity decrease.
///
/// Returns `None` when no valid split exists (all values identical, or
/// every candidate would violate `min_samples_leaf`).
///
/// # Column-major layout
///
/// `features` is column-major: `features[feature_idx][sample_idx]`.
/// `sample_indices` are indices into the inner Vecs; `weights` holds one
/// per-sample weight per dataset row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    features: &[Vec<f64>],
    labels: &[usize],
    weights: &[f64],
    sample_indices: &[usize],
    n_classes: usize,
    criterion: SplitCriterion,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = features.len();
    let n_samples = sample_indices.len();

    if n_samples == 0 || n_features == 0 {
        return None;
    }

    // Parent weighted class sums.
    let mut parent_weights = vec![0.0f64; n_classes];
    let mut parent_total = 0.0f64;
    for &si in sample_indices {
        parent_weights[labels[si]] += weights[si];
        parent_total += weights[si];
    }
    let parent_impurity = criterion.impurity(&parent_weights, parent_total);

    // Partial Fisher-Yates: shuffle only the first `max_features` positions.
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }
    let selected_features = &feature_order[..take];

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in selected_features {
        let feat_col = &features[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], si))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        // Incremental scan: left grows from empty, right shrinks from full.
        let mut left_weights = vec![0.0f64; n_classes];
        let mut right_weights = parent_weights.clone();
        let mut left_total = 0.0f64;

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let class_i = labels[si];
            let w_i = weights[si];

            // Move row i from right to left.
            left_weights[class_i] += w_i;
            right_weights[class_i] -= w_i;
            left_total += w_i;

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            let right_total = parent_total - left_total;

            // Skip if next value is identical (no valid boundary here).
            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }

            // min_samples_leaf is enforced on raw row counts, not weights.
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left_impurity = criterion.impurity(&left_weights, left_total);
            let right_impurity = criterion.impurity(&right_weights, right_total);

            // Weighted MDI formula.
            let decrease = parent_total * parent_impurity.value()
                - left_total * left_impurity.value()
                - right_total * right_impurity.value();

            if decrease > best_decrease {
                best_decrease = decrease;
                let threshold = (val_i + val_next) / 2.0;
                best = Some((FeatureIndex::new(feat_idx), threshold));
            }
        }
    }

    let (best_feature, threshold) = best?;

    // Partition sample_indices into left/right.
    let feat_col = &features[best_feature.index()];
    let mut left_indices = Vec::with_capacity(n_samples / 2);
    let mut right_indices = Vec::with_capacity(n_samples / 2);
    for &si in sample_indices {
        if feat_col[si] <= threshold {
            left_indices.push(si);
        } else {
            right_indices.push(si);
        }
    }

    Some(SplitResult {
        feature: best_feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}
