//! Mean-decrease-in-impurity covariate importance.

use crate::ensemble::MergedEnsemble;

/// An importance score for one covariate column.
#[derive(Debug, Clone)]
pub struct FeatureImportance {
    /// Covariate column name.
    pub covariate: String,
    /// Normalized MDI score (sums to 1.0 across all covariates).
    pub importance: f64,
}

/// Compute mean-decrease-in-impurity importances for a fitted ensemble.
///
/// Each tree's weighted impurity decreases are normalized to sum to 1.0,
/// then averaged across all trees. Root-only trees (no splits) contribute
/// nothing. The result preserves covariate column order.
pub fn mdi_importances(model: &MergedEnsemble) -> Vec<FeatureImportance> {
    let n_features = model.n_features;
    let mut means = vec![0.0f64; n_features];
    let mut contributing_trees = 0usize;

    for tree in &model.trees {
        let mut raw = vec![0.0f64; n_features];
        tree.accumulate_importances(&mut raw);
        let sum: f64 = raw.iter().sum();
        if sum > 0.0 {
            for (mean, val) in means.iter_mut().zip(&raw) {
                *mean += val / sum;
            }
            contributing_trees += 1;
        }
    }

    if contributing_trees > 0 {
        let n = contributing_trees as f64;
        means.iter_mut().for_each(|v| *v /= n);
    }

    model
        .feature_names
        .iter()
        .zip(means)
        .map(|(name, importance)| FeatureImportance {
            covariate: name.clone(),
            importance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{EnsembleConfig, MaxFeatures};

    fn make_data() -> (Vec<Vec<f64>>, Vec<i64>, Vec<String>) {
        // Column 0 separates the classes; column 1 is constant noise.
        let mut features = Vec::new();
        let mut codes = Vec::new();
        for i in 0..20 {
            features.push(vec![i as f64, 1.0]);
            codes.push(1);
        }
        for i in 0..20 {
            features.push(vec![100.0 + i as f64, 1.0]);
            codes.push(2);
        }
        let names = vec!["signal".to_string(), "noise".to_string()];
        (features, codes, names)
    }

    #[test]
    fn importances_sum_to_one() {
        let (features, codes, names) = make_data();
        let model = EnsembleConfig::new(10)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42)
            .fit(&features, &codes, &names)
            .unwrap();
        let importances = mdi_importances(&model);
        let total: f64 = importances.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
    }

    #[test]
    fn informative_column_dominates() {
        let (features, codes, names) = make_data();
        let model = EnsembleConfig::new(10)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42)
            .fit(&features, &codes, &names)
            .unwrap();
        let importances = mdi_importances(&model);
        assert_eq!(importances[0].covariate, "signal");
        assert!(importances[0].importance > 0.99);
        assert!(importances[1].importance < 0.01);
    }

    #[test]
    fn preserves_column_order() {
        let (features, codes, names) = make_data();
        let model = EnsembleConfig::new(5)
            .unwrap()
            .with_seed(1)
            .fit(&features, &codes, &names)
            .unwrap();
        let importances = mdi_importances(&model);
        let got: Vec<&str> = importances.iter().map(|f| f.covariate.as_str()).collect();
        assert_eq!(got, ["signal", "noise"]);
    }
}
