//! Leave-one-group-out cross-validation.

use tracing::{info, instrument};

use crate::confusion::ConfusionMatrix;
use crate::ensemble::{EnsembleConfig, MergedEnsemble};
use crate::error::RfError;
use crate::importance::{FeatureImportance, mdi_importances};

/// A single train/test split holding out one group.
#[derive(Debug, Clone)]
pub struct Fold {
    /// 1-based fold number, in first-encounter group order.
    pub number: usize,
    /// The held-out group value.
    pub group: i64,
    /// Row indices trained on (every group but `group`).
    pub train_indices: Vec<usize>,
    /// Row indices evaluated on (exactly the rows of `group`).
    pub test_indices: Vec<usize>,
}

/// Leave-one-group-out splitting over a per-row group column.
pub struct LeaveOneGroupOut;

impl LeaveOneGroupOut {
    /// Build one fold per distinct group value, in first-encounter order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero group values provided |
    /// | [`RfError::InsufficientGroups`] | Fewer than 2 distinct group values |
    pub fn split(groups: &[i64]) -> Result<Vec<Fold>, RfError> {
        if groups.is_empty() {
            return Err(RfError::EmptyDataset);
        }

        let mut distinct: Vec<i64> = Vec::new();
        for &g in groups {
            if !distinct.contains(&g) {
                distinct.push(g);
            }
        }
        if distinct.len() < 2 {
            return Err(RfError::InsufficientGroups {
                n_groups: distinct.len(),
            });
        }

        Ok(distinct
            .iter()
            .enumerate()
            .map(|(i, &group)| {
                let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                    (0..groups.len()).partition(|&row| groups[row] == group);
                Fold {
                    number: i + 1,
                    group,
                    train_indices,
                    test_indices,
                }
            })
            .collect())
    }
}

/// Results of a leave-one-group-out cross-validation run.
#[derive(Debug)]
pub struct CrossValidationResult {
    /// Per-row 1-based fold number (the fold that held the row out).
    pub fold_numbers: Vec<usize>,
    /// Per-row out-of-fold predicted class code.
    pub predictions: Vec<i64>,
    /// Confusion matrix over all out-of-fold predictions.
    pub confusion_matrix: ConfusionMatrix,
    /// The production classifier, trained on the full dataset.
    pub classifier: MergedEnsemble,
    /// MDI importances of the production classifier, in column order.
    pub importances: Vec<FeatureImportance>,
    /// Number of folds run.
    pub n_folds: usize,
    /// Total number of rows.
    pub n_samples: usize,
}

/// Run leave-one-group-out cross-validation, then train the full-data
/// production classifier.
///
/// Folds run strictly sequential: train on every other group, predict the
/// held-out group, accumulate. Every fold trains from the same seed, so
/// fold models differ only in their training rows. Any fold failure aborts
/// the whole run. The reported importances come from the production
/// classifier, not from fold models.
///
/// # Errors
///
/// Split errors from [`LeaveOneGroupOut::split`] plus any training or
/// prediction error from the underlying ensemble.
#[instrument(skip_all, fields(n_samples = features.len()))]
pub fn cross_validate(
    config: &EnsembleConfig,
    features: &[Vec<f64>],
    class_codes: &[i64],
    groups: &[i64],
    feature_names: &[String],
) -> Result<CrossValidationResult, RfError> {
    let n_samples = features.len();
    if class_codes.len() != n_samples || groups.len() != n_samples {
        return Err(RfError::LabelCountMismatch {
            n_samples,
            n_labels: class_codes.len().min(groups.len()),
        });
    }

    let folds = LeaveOneGroupOut::split(groups)?;
    let n_folds = folds.len();

    let mut fold_numbers = vec![0usize; n_samples];
    let mut predictions = vec![0i64; n_samples];

    for fold in &folds {
        let train_features: Vec<Vec<f64>> = fold
            .train_indices
            .iter()
            .map(|&i| features[i].clone())
            .collect();
        let train_codes: Vec<i64> = fold.train_indices.iter().map(|&i| class_codes[i]).collect();

        let model = config.fit(&train_features, &train_codes, feature_names)?;

        let test_features: Vec<Vec<f64>> = fold
            .test_indices
            .iter()
            .map(|&i| features[i].clone())
            .collect();
        let fold_predictions = model.predict_batch(&test_features)?;

        let mut correct = 0usize;
        for (&row, &code) in fold.test_indices.iter().zip(&fold_predictions) {
            fold_numbers[row] = fold.number;
            predictions[row] = code;
            if class_codes[row] == code {
                correct += 1;
            }
        }

        info!(
            fold = fold.number,
            group = fold.group,
            n_test = fold.test_indices.len(),
            accuracy = correct as f64 / fold.test_indices.len() as f64,
            "fold completed"
        );
    }

    let confusion_matrix = ConfusionMatrix::from_codes(class_codes, &predictions)?;

    // Production classifier: no held-out rows, same config and seed.
    let classifier = config.fit(features, class_codes, feature_names)?;
    let importances = mdi_importances(&classifier);

    info!(
        n_folds,
        accuracy = confusion_matrix.accuracy(),
        "cross-validation complete"
    );

    Ok(CrossValidationResult {
        fold_numbers,
        predictions,
        confusion_matrix,
        classifier,
        importances,
        n_folds,
        n_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::MaxFeatures;

    fn make_grouped_data() -> (Vec<Vec<f64>>, Vec<i64>, Vec<i64>, Vec<String>) {
        // Two separable classes spread over three groups.
        let mut features = Vec::new();
        let mut codes = Vec::new();
        let mut groups = Vec::new();
        for group in 1..=3i64 {
            for i in 0..10 {
                features.push(vec![i as f64 * 0.1, group as f64]);
                codes.push(1);
                groups.push(group);
            }
            for i in 0..10 {
                features.push(vec![10.0 + i as f64 * 0.1, group as f64]);
                codes.push(2);
                groups.push(group);
            }
        }
        let names = vec!["x".to_string(), "g".to_string()];
        (features, codes, groups, names)
    }

    #[test]
    fn folds_follow_first_encounter_order() {
        let groups = vec![5, 5, 2, 2, 9, 9];
        let folds = LeaveOneGroupOut::split(&groups).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].number, 1);
        assert_eq!(folds[0].group, 5);
        assert_eq!(folds[1].group, 2);
        assert_eq!(folds[2].group, 9);
    }

    #[test]
    fn every_row_in_exactly_one_test_fold() {
        let groups = vec![1, 2, 3, 1, 2, 3, 1, 2, 3];
        let folds = LeaveOneGroupOut::split(&groups).unwrap();
        let mut seen = vec![0usize; groups.len()];
        for fold in &folds {
            for &i in &fold.test_indices {
                seen[i] += 1;
            }
            assert_eq!(fold.train_indices.len() + fold.test_indices.len(), groups.len());
            for &i in &fold.train_indices {
                assert_ne!(groups[i], fold.group);
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn single_group_rejected() {
        let err = LeaveOneGroupOut::split(&[4, 4, 4]).unwrap_err();
        assert!(matches!(err, RfError::InsufficientGroups { n_groups: 1 }));
    }

    #[test]
    fn empty_groups_rejected() {
        let err = LeaveOneGroupOut::split(&[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn one_prediction_per_row() {
        let (features, codes, groups, names) = make_grouped_data();
        let config = EnsembleConfig::new(5)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = cross_validate(&config, &features, &codes, &groups, &names).unwrap();
        assert_eq!(result.predictions.len(), features.len());
        assert_eq!(result.fold_numbers.len(), features.len());
        assert!(result.fold_numbers.iter().all(|&n| (1..=3).contains(&n)));
        assert_eq!(result.n_folds, 3);
    }

    #[test]
    fn confusion_cells_sum_to_row_count() {
        let (features, codes, groups, names) = make_grouped_data();
        let config = EnsembleConfig::new(5)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = cross_validate(&config, &features, &codes, &groups, &names).unwrap();
        assert_eq!(result.confusion_matrix.total(), features.len());
    }

    #[test]
    fn separable_groups_predict_well() {
        let (features, codes, groups, names) = make_grouped_data();
        let config = EnsembleConfig::new(10)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = cross_validate(&config, &features, &codes, &groups, &names).unwrap();
        assert!(
            result.confusion_matrix.accuracy() > 0.9,
            "accuracy = {}",
            result.confusion_matrix.accuracy()
        );
    }

    #[test]
    fn production_classifier_uses_all_rows() {
        let (features, codes, groups, names) = make_grouped_data();
        let config = EnsembleConfig::new(5)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = cross_validate(&config, &features, &codes, &groups, &names).unwrap();
        assert_eq!(result.classifier.tree_count(), 15);
        assert_eq!(result.classifier.class_codes(), &[1, 2]);
        let total: f64 = result.importances.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10);
    }

    #[test]
    fn three_group_nine_row_two_class_scenario() {
        // 3 groups of 3 rows each, two well-separated classes.
        let features = vec![
            vec![0.0],
            vec![0.5],
            vec![10.0],
            vec![0.2],
            vec![0.7],
            vec![10.2],
            vec![0.4],
            vec![0.9],
            vec![10.4],
        ];
        let codes = vec![1, 1, 2, 1, 1, 2, 1, 1, 2];
        let groups = vec![1, 1, 1, 2, 2, 2, 3, 3, 3];
        let names = vec!["x".to_string()];
        let config = EnsembleConfig::new(5)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let result = cross_validate(&config, &features, &codes, &groups, &names).unwrap();

        assert_eq!(result.n_folds, 3);
        assert_eq!(result.fold_numbers, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
        assert_eq!(result.predictions, codes);
        assert_eq!(result.confusion_matrix.total(), 9);
        assert!((result.confusion_matrix.accuracy() - 1.0).abs() < f64::EPSILON);
    }
}
