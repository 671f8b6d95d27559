//! Per-partition CSV loading and label/covariate joining.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{PartitionId, PredictionInput, SegmentId, SegmentTable};

/// Shape-derived helper columns that rasterization tools append to the
/// covariate tables. They are never predictors.
const DROPPED_COLUMNS: [&str; 2] = ["shape_m", "shape_m2"];

/// Label-table columns required for training.
const LABEL_COLUMNS: [&str; 5] = ["segment_id", "POINT_X", "POINT_Y", "class_label", "cv_group"];

/// Label-table columns required for prediction (no class columns).
const POINT_COLUMNS: [&str; 3] = ["segment_id", "POINT_X", "POINT_Y"];

/// Loads and joins per-partition covariate and label CSVs.
///
/// Each partition `P` reads `<covariate_dir>/P.csv` and `<label_dir>/P.csv`.
/// The join is by `segment_id`, left from the label table; covariates for
/// unmatched segments fill with 0.0. Training mode drops rows whose
/// `class_label` is non-positive; prediction mode keeps every row.
pub struct PartitionLoader {
    covariate_dir: PathBuf,
    label_dir: PathBuf,
}

impl PartitionLoader {
    /// Create a loader over the two input directories.
    pub fn new(covariate_dir: &Path, label_dir: &Path) -> Self {
        Self {
            covariate_dir: covariate_dir.to_path_buf(),
            label_dir: label_dir.to_path_buf(),
        }
    }

    /// Path of a partition's covariate CSV.
    #[must_use]
    pub fn covariate_path(&self, partition: &PartitionId) -> PathBuf {
        self.covariate_dir.join(format!("{partition}.csv"))
    }

    /// Path of a partition's label CSV.
    #[must_use]
    pub fn label_path(&self, partition: &PartitionId) -> PathBuf {
        self.label_dir.join(format!("{partition}.csv"))
    }

    /// Check up front that every partition's input files exist.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingPartitionFile`] for the first absent file.
    pub fn validate(&self, partitions: &[PartitionId]) -> Result<(), IoError> {
        for partition in partitions {
            for path in [self.covariate_path(partition), self.label_path(partition)] {
                if !path.is_file() {
                    return Err(IoError::MissingPartitionFile {
                        partition: partition.as_str().to_string(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    /// Load, join, and concatenate the given partitions for training.
    ///
    /// The first partition's covariate header fixes the expected predictor
    /// set; later partitions must match it exactly. Rows with a
    /// non-positive `class_label` are dropped.
    ///
    /// # Errors
    ///
    /// File, parse, and schema errors per the [`IoError`] variants; a
    /// partition that is empty after the class filter is
    /// [`IoError::EmptyPartition`].
    #[instrument(skip_all, fields(n_partitions = partitions.len()))]
    pub fn load_training(&self, partitions: &[PartitionId]) -> Result<SegmentTable, IoError> {
        self.validate(partitions)?;

        let mut expected_names: Option<Vec<String>> = None;
        let mut tables = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let covariates = read_covariate_file(&self.covariate_path(partition))?;
            match &expected_names {
                None => expected_names = Some(covariates.names.clone()),
                Some(expected) => check_schema(partition, expected, &covariates.names)?,
            }

            let table = self.join_training(partition, &covariates)?;
            info!(
                partition = %partition,
                n_rows = table.n_rows(),
                "partition loaded"
            );
            tables.push(table);
        }

        Ok(SegmentTable::concat(tables))
    }

    /// Load and join one partition for batch prediction.
    ///
    /// Keeps every labeled segment row; the label file only needs the
    /// segment and point columns.
    ///
    /// # Errors
    ///
    /// File and parse errors per the [`IoError`] variants.
    #[instrument(skip_all, fields(partition = %partition))]
    pub fn load_prediction(&self, partition: &PartitionId) -> Result<PredictionInput, IoError> {
        self.validate(std::slice::from_ref(partition))?;

        let covariates = read_covariate_file(&self.covariate_path(partition))?;
        let label_path = self.label_path(partition);
        let rows = read_label_file(&label_path, &POINT_COLUMNS)?;

        let mut segment_ids = Vec::with_capacity(rows.len());
        let mut point_x = Vec::with_capacity(rows.len());
        let mut point_y = Vec::with_capacity(rows.len());
        let mut features = Vec::with_capacity(rows.len());

        for row in rows {
            features.push(covariates.row_for(&row.segment_id));
            segment_ids.push(SegmentId::new(row.segment_id));
            point_x.push(row.point_x);
            point_y.push(row.point_y);
        }

        if segment_ids.is_empty() {
            return Err(IoError::EmptyPartition { path: label_path });
        }

        info!(n_rows = segment_ids.len(), "prediction partition loaded");

        Ok(PredictionInput::new(
            segment_ids,
            point_x,
            point_y,
            covariates.names,
            features,
        ))
    }

    fn join_training(
        &self,
        partition: &PartitionId,
        covariates: &CovariateFile,
    ) -> Result<SegmentTable, IoError> {
        let label_path = self.label_path(partition);
        let rows = read_label_file(&label_path, &LABEL_COLUMNS)?;

        let mut segment_ids = Vec::new();
        let mut point_x = Vec::new();
        let mut point_y = Vec::new();
        let mut class_codes = Vec::new();
        let mut cv_groups = Vec::new();
        let mut features = Vec::new();

        for row in rows {
            // Unlabeled and background segments carry non-positive codes.
            if row.class_label <= 0 {
                continue;
            }
            features.push(covariates.row_for(&row.segment_id));
            segment_ids.push(SegmentId::new(row.segment_id));
            point_x.push(row.point_x);
            point_y.push(row.point_y);
            class_codes.push(row.class_label);
            cv_groups.push(row.cv_group);
        }

        if segment_ids.is_empty() {
            return Err(IoError::EmptyPartition { path: label_path });
        }

        Ok(SegmentTable::new(
            segment_ids,
            point_x,
            point_y,
            class_codes,
            cv_groups,
            covariates.names.clone(),
            features,
        ))
    }
}

fn check_schema(
    partition: &PartitionId,
    expected: &[String],
    got: &[String],
) -> Result<(), IoError> {
    let n = expected.len().max(got.len());
    for position in 0..n {
        let e = expected.get(position).map(String::as_str).unwrap_or("");
        let g = got.get(position).map(String::as_str).unwrap_or("");
        if e != g {
            return Err(IoError::SchemaMismatch {
                partition: partition.as_str().to_string(),
                position,
                expected: e.to_string(),
                got: g.to_string(),
            });
        }
    }
    Ok(())
}

/// One partition's covariate table, keyed by segment ID.
struct CovariateFile {
    names: Vec<String>,
    rows: HashMap<String, Vec<f64>>,
}

impl CovariateFile {
    /// Covariate row for a segment; unmatched segments fill with zeros.
    fn row_for(&self, segment_id: &str) -> Vec<f64> {
        self.rows
            .get(segment_id)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.names.len()])
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, IoError> {
    let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file))
}

fn read_covariate_file(path: &Path) -> Result<CovariateFile, IoError> {
    let mut rdr = csv_reader(path)?;
    let header = rdr
        .headers()
        .map_err(|e| csv_parse(path, e))?
        .clone();

    let Some(id_col) = header.iter().position(|h| h == "segment_id") else {
        return Err(IoError::MissingColumn {
            path: path.to_path_buf(),
            column: "segment_id".to_string(),
        });
    };

    // Predictor columns: everything except the join key and the
    // shape-derived helpers.
    let keep: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|&(i, name)| i != id_col && !DROPPED_COLUMNS.contains(&name))
        .map(|(i, name)| (i, name.to_string()))
        .collect();
    if keep.is_empty() {
        return Err(IoError::NoCovariateColumns {
            path: path.to_path_buf(),
        });
    }
    let names: Vec<String> = keep.iter().map(|(_, name)| name.clone()).collect();
    debug!(n_covariates = names.len(), "read covariate header");

    let mut rows: HashMap<String, Vec<f64>> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    for (row_index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_parse(path, e))?;
        let segment_id = record.get(id_col).unwrap_or("").to_string();
        if let Some(&first_row) = first_seen.get(&segment_id) {
            return Err(IoError::DuplicateSegmentId {
                path: path.to_path_buf(),
                segment_id,
                first_row,
                second_row: row_index,
            });
        }
        first_seen.insert(segment_id.clone(), row_index);

        let mut values = Vec::with_capacity(keep.len());
        for (col, name) in &keep {
            let raw = record.get(*col).unwrap_or("");
            // Empty cells are absent covariates and fill with 0.0,
            // matching the join-side fill.
            let value = if raw.is_empty() {
                0.0
            } else {
                parse_finite(path, row_index, name, raw)?
            };
            values.push(value);
        }
        rows.insert(segment_id, values);
    }

    if rows.is_empty() {
        return Err(IoError::EmptyPartition {
            path: path.to_path_buf(),
        });
    }

    Ok(CovariateFile { names, rows })
}

/// One parsed label row. Class and group are zero for point-only reads.
struct LabelRow {
    segment_id: String,
    point_x: f64,
    point_y: f64,
    class_label: i64,
    cv_group: i64,
}

fn read_label_file(path: &Path, required: &[&str]) -> Result<Vec<LabelRow>, IoError> {
    let mut rdr = csv_reader(path)?;
    let header = rdr
        .headers()
        .map_err(|e| csv_parse(path, e))?
        .clone();

    let mut positions = HashMap::new();
    for &column in required {
        let Some(pos) = header.iter().position(|h| h == column) else {
            return Err(IoError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        };
        positions.insert(column, pos);
    }
    let with_labels = positions.contains_key("class_label");

    let mut rows = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    for (row_index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_parse(path, e))?;

        let segment_id = record.get(positions["segment_id"]).unwrap_or("").to_string();
        if let Some(&first_row) = first_seen.get(&segment_id) {
            return Err(IoError::DuplicateSegmentId {
                path: path.to_path_buf(),
                segment_id,
                first_row,
                second_row: row_index,
            });
        }
        first_seen.insert(segment_id.clone(), row_index);

        let point_x = parse_finite(
            path,
            row_index,
            "POINT_X",
            record.get(positions["POINT_X"]).unwrap_or(""),
        )?;
        let point_y = parse_finite(
            path,
            row_index,
            "POINT_Y",
            record.get(positions["POINT_Y"]).unwrap_or(""),
        )?;

        let (class_label, cv_group) = if with_labels {
            (
                parse_integer(
                    path,
                    row_index,
                    "class_label",
                    record.get(positions["class_label"]).unwrap_or(""),
                )?,
                parse_integer(
                    path,
                    row_index,
                    "cv_group",
                    record.get(positions["cv_group"]).unwrap_or(""),
                )?,
            )
        } else {
            (0, 0)
        };

        rows.push(LabelRow {
            segment_id,
            point_x,
            point_y,
            class_label,
            cv_group,
        });
    }

    Ok(rows)
}

fn csv_parse(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

fn parse_finite(path: &Path, row_index: usize, column: &str, raw: &str) -> Result<f64, IoError> {
    let value: f64 = raw.parse().map_err(|_| IoError::InvalidValue {
        path: path.to_path_buf(),
        row_index,
        column: column.to_string(),
        raw: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(IoError::InvalidValue {
            path: path.to_path_buf(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_integer(path: &Path, row_index: usize, column: &str, raw: &str) -> Result<i64, IoError> {
    raw.parse().map_err(|_| IoError::InvalidValue {
        path: path.to_path_buf(),
        row_index,
        column: column.to_string(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(covariates: &[(&str, &str)], labels: &[(&str, &str)]) -> (TempDir, PartitionLoader) {
        let dir = TempDir::new().unwrap();
        let cov_dir = dir.path().join("covariates");
        let lab_dir = dir.path().join("labels");
        fs::create_dir_all(&cov_dir).unwrap();
        fs::create_dir_all(&lab_dir).unwrap();
        for (name, content) in covariates {
            fs::write(cov_dir.join(format!("{name}.csv")), content).unwrap();
        }
        for (name, content) in labels {
            fs::write(lab_dir.join(format!("{name}.csv")), content).unwrap();
        }
        let loader = PartitionLoader::new(&cov_dir, &lab_dir);
        (dir, loader)
    }

    fn p(name: &str) -> PartitionId {
        PartitionId::new(name.to_string()).unwrap()
    }

    #[test]
    fn join_by_segment_id_not_position() {
        // Covariate rows deliberately out of label-row order.
        let cov = "segment_id,ndvi,slope\ns2,0.2,2.0\ns1,0.1,1.0\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\n\
                   s1,100.0,200.0,3,1\ns2,101.0,201.0,5,2\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let table = loader.load_training(&[p("A1")]).unwrap();

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.segment_ids()[0].as_str(), "s1");
        assert!((table.features()[0][0] - 0.1).abs() < f64::EPSILON);
        assert!((table.features()[1][0] - 0.2).abs() < f64::EPSILON);
        assert_eq!(table.class_codes(), &[3, 5]);
        assert_eq!(table.cv_groups(), &[1, 2]);
    }

    #[test]
    fn unmatched_segment_fills_zero() {
        let cov = "segment_id,ndvi\ns1,0.5\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\n\
                   s1,0.0,0.0,1,1\ns2,1.0,1.0,2,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let table = loader.load_training(&[p("A1")]).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert!((table.features()[1][0] - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_classes_dropped_in_training() {
        let cov = "segment_id,ndvi\ns1,0.1\ns2,0.2\ns3,0.3\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\n\
                   s1,0.0,0.0,4,1\ns2,0.0,0.0,0,1\ns3,0.0,0.0,-1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let table = loader.load_training(&[p("A1")]).unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.class_codes(), &[4]);
    }

    #[test]
    fn prediction_keeps_every_row() {
        let cov = "segment_id,ndvi\ns1,0.1\ns2,0.2\n";
        let lab = "segment_id,POINT_X,POINT_Y\ns1,0.0,0.0\ns2,1.0,1.0\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let input = loader.load_prediction(&p("A1")).unwrap();
        assert_eq!(input.n_rows(), 2);
        assert_eq!(input.covariate_names(), &["ndvi"]);
    }

    #[test]
    fn shape_helper_columns_dropped() {
        let cov = "segment_id,ndvi,shape_m,shape_m2,slope\ns1,0.1,12.0,144.0,2.0\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let table = loader.load_training(&[p("A1")]).unwrap();
        assert_eq!(table.covariate_names(), &["ndvi", "slope"]);
        assert_eq!(table.features()[0], vec![0.1, 2.0]);
    }

    #[test]
    fn first_partition_fixes_schema() {
        let cov_a = "segment_id,ndvi,slope\ns1,0.1,1.0\n";
        let cov_b = "segment_id,slope,ndvi\ns2,2.0,0.2\n";
        let lab_a = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let lab_b = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns2,0.0,0.0,2,2\n";
        let (_dir, loader) = setup(&[("A1", cov_a), ("A2", cov_b)], &[("A1", lab_a), ("A2", lab_b)]);
        let err = loader.load_training(&[p("A1"), p("A2")]).unwrap_err();
        assert!(matches!(
            err,
            IoError::SchemaMismatch { position: 0, .. }
        ));
    }

    #[test]
    fn missing_partition_file_detected_up_front() {
        let cov = "segment_id,ndvi\ns1,0.1\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let err = loader.load_training(&[p("A1"), p("B9")]).unwrap_err();
        assert!(matches!(err, IoError::MissingPartitionFile { .. }));
    }

    #[test]
    fn duplicate_segment_id_error() {
        let cov = "segment_id,ndvi\ns1,0.1\ns1,0.2\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let err = loader.load_training(&[p("A1")]).unwrap_err();
        assert!(matches!(err, IoError::DuplicateSegmentId { .. }));
    }

    #[test]
    fn missing_label_column_error() {
        let cov = "segment_id,ndvi\ns1,0.1\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label\ns1,0.0,0.0,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let err = loader.load_training(&[p("A1")]).unwrap_err();
        assert!(matches!(err, IoError::MissingColumn { column, .. } if column == "cv_group"));
    }

    #[test]
    fn invalid_covariate_value_error() {
        let cov = "segment_id,ndvi\ns1,abc\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let err = loader.load_training(&[p("A1")]).unwrap_err();
        assert!(matches!(err, IoError::InvalidValue { .. }));
    }

    #[test]
    fn empty_covariate_cell_fills_zero() {
        let cov = "segment_id,ndvi,slope\ns1,,2.0\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,1,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let table = loader.load_training(&[p("A1")]).unwrap();
        assert_eq!(table.features()[0], vec![0.0, 2.0]);
    }

    #[test]
    fn all_rows_filtered_is_empty_partition() {
        let cov = "segment_id,ndvi\ns1,0.1\n";
        let lab = "segment_id,POINT_X,POINT_Y,class_label,cv_group\ns1,0.0,0.0,0,1\n";
        let (_dir, loader) = setup(&[("A1", cov)], &[("A1", lab)]);
        let err = loader.load_training(&[p("A1")]).unwrap_err();
        assert!(matches!(err, IoError::EmptyPartition { .. }));
    }

    #[test]
    fn multi_partition_concat_in_order() {
        let cov_a = "segment_id,ndvi\na1,0.1\n";
        let cov_b = "segment_id,ndvi\nb1,0.2\n";
        let lab_a = "segment_id,POINT_X,POINT_Y,class_label,cv_group\na1,0.0,0.0,1,1\n";
        let lab_b = "segment_id,POINT_X,POINT_Y,class_label,cv_group\nb1,0.0,0.0,2,2\n";
        let (_dir, loader) = setup(&[("A1", cov_a), ("B1", cov_b)], &[("A1", lab_a), ("B1", lab_b)]);
        let table = loader.load_training(&[p("A1"), p("B1")]).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.segment_ids()[0].as_str(), "a1");
        assert_eq!(table.segment_ids()[1].as_str(), "b1");
        assert_eq!(table.cv_groups(), &[1, 2]);
    }
}
