//! Confusion matrix keyed by raw class codes, with margin totals.

use std::fmt;

use crate::error::RfError;

/// A confusion matrix over the union of actual and predicted class codes.
///
/// Rows are actual codes, columns predicted codes, both in ascending code
/// order. Entry `[i][j]` counts rows whose actual code is `codes[i]` and
/// predicted code is `codes[j]`. Codes that appear only on one side still
/// get a full row and column, so the matrix is always square.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    codes: Vec<i64>,
    matrix: Vec<Vec<usize>>,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    /// The raw class code.
    pub code: i64,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no actual samples for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of actual samples with this code.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from actual and predicted class codes.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero codes provided |
    /// | [`RfError::LabelCountMismatch`] | Length mismatch between the slices |
    pub fn from_codes(actual: &[i64], predicted: &[i64]) -> Result<Self, RfError> {
        if actual.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if actual.len() != predicted.len() {
            return Err(RfError::LabelCountMismatch {
                n_samples: actual.len(),
                n_labels: predicted.len(),
            });
        }

        let mut codes: Vec<i64> = actual.iter().chain(predicted).copied().collect();
        codes.sort_unstable();
        codes.dedup();

        let n = codes.len();
        let mut matrix = vec![vec![0usize; n]; n];
        for (a, p) in actual.iter().zip(predicted) {
            // Both lookups must succeed: codes is the union of the inputs.
            let (Ok(i), Ok(j)) = (codes.binary_search(a), codes.binary_search(p)) else {
                unreachable!("codes built from actual and predicted")
            };
            matrix[i][j] += 1;
        }

        Ok(Self { codes, matrix })
    }

    /// Return the sorted class codes labelling both axes.
    #[must_use]
    pub fn codes(&self) -> &[i64] {
        &self.codes
    }

    /// Return the underlying count rows (actual-major, no margins).
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Per-actual-code row totals (the "All" margin column).
    #[must_use]
    pub fn row_totals(&self) -> Vec<usize> {
        self.matrix.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-predicted-code column totals (the "All" margin row).
    #[must_use]
    pub fn col_totals(&self) -> Vec<usize> {
        let n = self.codes.len();
        let mut totals = vec![0usize; n];
        for row in &self.matrix {
            for (t, &v) in totals.iter_mut().zip(row) {
                *t += v;
            }
        }
        totals
    }

    /// Grand total count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flat_map(|row| row.iter()).sum()
    }

    /// Overall accuracy: proportion of diagonal counts.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.codes.len()).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Per-class precision, recall, F1, and support, in code order.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.codes.len();
        (0..n)
            .map(|c| {
                let tp = self.matrix[c][c];
                let fp: usize = (0..n)
                    .filter(|&i| i != c)
                    .map(|i| self.matrix[i][c])
                    .sum();
                let fn_: usize = (0..n)
                    .filter(|&j| j != c)
                    .map(|j| self.matrix[c][j])
                    .sum();
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    code: self.codes[c],
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header row with predicted codes plus the All margin.
        write!(f, "{:>10}", "")?;
        for code in &self.codes {
            write!(f, " pred_{code:>4}")?;
        }
        writeln!(f, " {:>9}", "All")?;

        let col_totals = self.col_totals();
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "actual_{:>3}", self.codes[i])?;
            let mut row_total = 0usize;
            for val in row {
                row_total += val;
                write!(f, " {val:>9}")?;
            }
            writeln!(f, " {row_total:>9}")?;
        }

        write!(f, "{:>10}", "All")?;
        for val in &col_totals {
            write!(f, " {val:>9}")?;
        }
        writeln!(f, " {:>9}", self.total())
    }
}
