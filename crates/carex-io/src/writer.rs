//! CSV artifact writers for cross-validation results and batch predictions.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{PartitionId, SegmentId};

/// One row of the cross-validated `prediction.csv` artifact.
#[derive(Debug, Clone)]
pub struct PredictionRow {
    /// Segment key.
    pub segment_id: String,
    /// Segment centroid X coordinate.
    pub point_x: f64,
    /// Segment centroid Y coordinate.
    pub point_y: f64,
    /// Actual class code from the label table.
    pub class_label: i64,
    /// 1-based fold number that held this row out.
    pub fold: usize,
    /// Out-of-fold predicted class code.
    pub class_predict: i64,
}

/// Writes training and prediction artifacts into one output directory.
///
/// Creates the directory on construction. All writers go through a sibling
/// temp file and a rename, so readers never observe a half-written
/// artifact under its final name.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer targeting the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(fields(dir = %output_dir.display()))]
    pub fn new(output_dir: &Path) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Return the path where the classifier binary goes.
    ///
    /// Does not write anything — just computes `{output_dir}/classifier.bin`.
    #[must_use]
    pub fn classifier_path(&self) -> PathBuf {
        self.output_dir.join("classifier.bin")
    }

    /// Write `confusion_matrix_raw.csv` in crosstab layout with margins.
    ///
    /// ```text
    /// Predicted,1,2,...,All
    /// Actual,,,...,
    /// 1,<counts...>,<row total>
    /// ...
    /// All,<column totals...>,<grand total>
    /// ```
    ///
    /// `rows` is actual-major and square over `codes`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_confusion_matrix(
        &self,
        codes: &[i64],
        rows: &[Vec<usize>],
    ) -> Result<(), IoError> {
        let path = self.output_dir.join("confusion_matrix_raw.csv");

        let mut lines = Vec::with_capacity(rows.len() + 3);

        let mut header = vec!["Predicted".to_string()];
        header.extend(codes.iter().map(i64::to_string));
        header.push("All".to_string());
        lines.push(header);

        // Row-axis name line, as pandas crosstab emits it.
        let mut axis = vec!["Actual".to_string()];
        axis.extend(std::iter::repeat_n(String::new(), codes.len() + 1));
        lines.push(axis);

        let mut col_totals = vec![0usize; codes.len()];
        for (code, row) in codes.iter().zip(rows) {
            let mut line = vec![code.to_string()];
            let mut row_total = 0usize;
            for (total, &count) in col_totals.iter_mut().zip(row) {
                *total += count;
                row_total += count;
                line.push(count.to_string());
            }
            line.push(row_total.to_string());
            lines.push(line);
        }

        let mut margin = vec!["All".to_string()];
        let grand_total: usize = col_totals.iter().sum();
        margin.extend(col_totals.iter().map(usize::to_string));
        margin.push(grand_total.to_string());
        lines.push(margin);

        self.write_csv(&path, &lines)?;
        info!(path = %path.display(), "confusion matrix written");
        Ok(())
    }

    /// Write the cross-validated `prediction.csv` artifact.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(n_rows = rows.len()))]
    pub fn write_predictions(&self, rows: &[PredictionRow]) -> Result<(), IoError> {
        let path = self.output_dir.join("prediction.csv");

        let mut lines = Vec::with_capacity(rows.len() + 1);
        lines.push(
            [
                "segment_id",
                "POINT_X",
                "POINT_Y",
                "class_label",
                "outer_cv_split_n",
                "class_predict",
            ]
            .map(String::from)
            .to_vec(),
        );
        for row in rows {
            lines.push(vec![
                row.segment_id.clone(),
                row.point_x.to_string(),
                row.point_y.to_string(),
                row.class_label.to_string(),
                row.fold.to_string(),
                row.class_predict.to_string(),
            ]);
        }

        self.write_csv(&path, &lines)?;
        info!(path = %path.display(), "cross-validated predictions written");
        Ok(())
    }

    /// Write `importance_classifier_mdi.csv` in natural column order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_importances(&self, importances: &[(String, f64)]) -> Result<(), IoError> {
        let path = self.output_dir.join("importance_classifier_mdi.csv");

        let mut lines = Vec::with_capacity(importances.len() + 1);
        lines.push(vec!["covariate".to_string(), "importance".to_string()]);
        for (covariate, importance) in importances {
            lines.push(vec![covariate.clone(), importance.to_string()]);
        }

        self.write_csv(&path, &lines)?;
        info!(path = %path.display(), "covariate importances written");
        Ok(())
    }

    /// Path of a partition's batch-prediction output.
    #[must_use]
    pub fn partition_output_path(&self, partition: &PartitionId) -> PathBuf {
        self.output_dir.join(format!("{partition}.csv"))
    }

    /// Return `true` when a partition's output already exists.
    ///
    /// Re-runs use this to skip completed partitions.
    #[must_use]
    pub fn partition_output_exists(&self, partition: &PartitionId) -> bool {
        self.partition_output_path(partition).is_file()
    }

    /// Write one partition's batch predictions with confidences.
    ///
    /// `predictions[i]` is the `(code, confidence)` pair for `segment_ids[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(partition = %partition, n_rows = segment_ids.len()))]
    pub fn write_partition_predictions(
        &self,
        partition: &PartitionId,
        segment_ids: &[SegmentId],
        point_x: &[f64],
        point_y: &[f64],
        predictions: &[(i64, f64)],
    ) -> Result<(), IoError> {
        let path = self.partition_output_path(partition);

        let mut lines = Vec::with_capacity(segment_ids.len() + 1);
        lines.push(
            ["segment_id", "POINT_X", "POINT_Y", "predicted_class", "confidence"]
                .map(String::from)
                .to_vec(),
        );
        for (i, segment_id) in segment_ids.iter().enumerate() {
            let (code, confidence) = predictions[i];
            lines.push(vec![
                segment_id.as_str().to_string(),
                point_x[i].to_string(),
                point_y[i].to_string(),
                code.to_string(),
                format!("{confidence:.6}"),
            ]);
        }

        self.write_csv(&path, &lines)?;
        info!(path = %path.display(), "partition predictions written");
        Ok(())
    }

    /// Write records to a sibling temp file, then rename over `path`.
    fn write_csv(&self, path: &Path, lines: &[Vec<String>]) -> Result<(), IoError> {
        let tmp_path = path.with_extension("tmp");
        let write = || -> Result<(), std::io::Error> {
            let mut wtr = csv::Writer::from_path(&tmp_path)?;
            for line in lines {
                wtr.write_record(line)?;
            }
            wtr.flush()?;
            Ok(())
        };
        write().map_err(|e| IoError::WriteFile {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, path).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(name: &str) -> PartitionId {
        PartitionId::new(name.to_string()).unwrap()
    }

    #[test]
    fn confusion_matrix_crosstab_layout() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        writer
            .write_confusion_matrix(&[1, 3], &[vec![5, 1], vec![2, 4]])
            .unwrap();

        let content =
            fs::read_to_string(dir.path().join("confusion_matrix_raw.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Predicted,1,3,All");
        assert_eq!(lines[1], "Actual,,,");
        assert_eq!(lines[2], "1,5,1,6");
        assert_eq!(lines[3], "3,2,4,6");
        assert_eq!(lines[4], "All,7,5,12");
    }

    #[test]
    fn prediction_csv_columns() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let rows = vec![PredictionRow {
            segment_id: "s1".to_string(),
            point_x: 100.5,
            point_y: 200.25,
            class_label: 3,
            fold: 1,
            class_predict: 7,
        }];
        writer.write_predictions(&rows).unwrap();

        let content = fs::read_to_string(dir.path().join("prediction.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "segment_id,POINT_X,POINT_Y,class_label,outer_cv_split_n,class_predict"
        );
        assert_eq!(lines[1], "s1,100.5,200.25,3,1,7");
    }

    #[test]
    fn importance_csv_natural_order() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        writer
            .write_importances(&[
                ("ndvi".to_string(), 0.25),
                ("slope".to_string(), 0.75),
            ])
            .unwrap();

        let content =
            fs::read_to_string(dir.path().join("importance_classifier_mdi.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "covariate,importance");
        assert_eq!(lines[1], "ndvi,0.25");
        assert_eq!(lines[2], "slope,0.75");
    }

    #[test]
    fn partition_output_skip_check() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let partition = p("A1");
        assert!(!writer.partition_output_exists(&partition));

        writer
            .write_partition_predictions(
                &partition,
                &[SegmentId::new("s1".into())],
                &[1.0],
                &[2.0],
                &[(4, 0.85)],
            )
            .unwrap();
        assert!(writer.partition_output_exists(&partition));

        let content = fs::read_to_string(dir.path().join("A1.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "segment_id,POINT_X,POINT_Y,predicted_class,confidence"
        );
        assert_eq!(lines[1], "s1,1,2,4,0.850000");
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("results").join("round1");
        let writer = ArtifactWriter::new(&nested).unwrap();
        writer.write_importances(&[("x".to_string(), 1.0)]).unwrap();
        assert!(nested.join("importance_classifier_mdi.csv").exists());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        writer.write_importances(&[("x".to_string(), 1.0)]).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
