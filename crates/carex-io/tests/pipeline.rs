//! End-to-end I/O pipeline tests: load partitions, join, write artifacts.

use std::fs;

use tempfile::TempDir;

use carex_io::{ArtifactWriter, ClassSchema, PartitionId, PartitionLoader, PredictionRow};

struct Fixture {
    _dir: TempDir,
    loader: PartitionLoader,
    output: TempDir,
}

fn p(name: &str) -> PartitionId {
    PartitionId::new(name.to_string()).unwrap()
}

/// Two partitions, three covariates, labels with one background row.
fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let cov_dir = dir.path().join("covariates");
    let lab_dir = dir.path().join("labels");
    fs::create_dir_all(&cov_dir).unwrap();
    fs::create_dir_all(&lab_dir).unwrap();

    fs::write(
        cov_dir.join("A1.csv"),
        "segment_id,ndvi,slope,twi\n\
         a001,0.61,2.5,8.1\n\
         a002,0.12,0.4,11.9\n\
         a003,0.44,1.1,9.3\n",
    )
    .unwrap();
    fs::write(
        lab_dir.join("A1.csv"),
        "segment_id,POINT_X,POINT_Y,class_label,cv_group\n\
         a001,500100.0,6800100.0,3,1\n\
         a002,500200.0,6800200.0,7,1\n\
         a003,500300.0,6800300.0,0,1\n",
    )
    .unwrap();

    fs::write(
        cov_dir.join("A2.csv"),
        "segment_id,ndvi,slope,twi\n\
         b001,0.55,3.0,7.7\n\
         b002,0.08,0.2,12.4\n",
    )
    .unwrap();
    fs::write(
        lab_dir.join("A2.csv"),
        "segment_id,POINT_X,POINT_Y,class_label,cv_group\n\
         b001,510100.0,6810100.0,3,2\n\
         b002,510200.0,6810200.0,7,2\n",
    )
    .unwrap();

    let loader = PartitionLoader::new(&cov_dir, &lab_dir);
    let output = TempDir::new().unwrap();
    Fixture {
        _dir: dir,
        loader,
        output,
    }
}

#[test]
fn training_load_joins_filters_and_concatenates() {
    let fx = fixture();
    let table = fx.loader.load_training(&[p("A1"), p("A2")]).unwrap();

    // a003 has class 0 and is dropped.
    assert_eq!(table.n_rows(), 4);
    assert_eq!(table.covariate_names(), &["ndvi", "slope", "twi"]);
    assert_eq!(table.class_codes(), &[3, 7, 3, 7]);
    assert_eq!(table.cv_groups(), &[1, 1, 2, 2]);
    assert_eq!(table.segment_ids()[2].as_str(), "b001");
    assert!((table.features()[2][0] - 0.55).abs() < f64::EPSILON);
}

#[test]
fn prediction_load_keeps_background_rows() {
    let fx = fixture();
    let input = fx.loader.load_prediction(&p("A1")).unwrap();
    assert_eq!(input.n_rows(), 3);
    assert_eq!(input.covariate_names(), &["ndvi", "slope", "twi"]);
}

#[test]
fn artifacts_round_trip_through_csv() {
    let fx = fixture();
    let table = fx.loader.load_training(&[p("A1"), p("A2")]).unwrap();
    let writer = ArtifactWriter::new(fx.output.path()).unwrap();

    let rows: Vec<PredictionRow> = (0..table.n_rows())
        .map(|i| PredictionRow {
            segment_id: table.segment_ids()[i].as_str().to_string(),
            point_x: table.point_x()[i],
            point_y: table.point_y()[i],
            class_label: table.class_codes()[i],
            fold: table.cv_groups()[i] as usize,
            class_predict: table.class_codes()[i],
        })
        .collect();
    writer.write_predictions(&rows).unwrap();
    writer
        .write_confusion_matrix(&[3, 7], &[vec![2, 0], vec![0, 2]])
        .unwrap();
    writer
        .write_importances(&[
            ("ndvi".to_string(), 0.6),
            ("slope".to_string(), 0.3),
            ("twi".to_string(), 0.1),
        ])
        .unwrap();

    let prediction = fs::read_to_string(fx.output.path().join("prediction.csv")).unwrap();
    assert_eq!(prediction.lines().count(), 5);
    assert!(prediction.starts_with("segment_id,POINT_X,POINT_Y,class_label,"));

    let confusion =
        fs::read_to_string(fx.output.path().join("confusion_matrix_raw.csv")).unwrap();
    assert!(confusion.ends_with("All,2,2,4\n"));

    let importance =
        fs::read_to_string(fx.output.path().join("importance_classifier_mdi.csv")).unwrap();
    assert_eq!(importance.lines().count(), 4);
}

#[test]
fn batch_output_skip_is_idempotent() {
    let fx = fixture();
    let input = fx.loader.load_prediction(&p("A1")).unwrap();
    let writer = ArtifactWriter::new(fx.output.path()).unwrap();
    let partition = p("A1");

    let predictions: Vec<(i64, f64)> = input.segment_ids().iter().map(|_| (3, 0.9)).collect();
    writer
        .write_partition_predictions(
            &partition,
            input.segment_ids(),
            input.point_x(),
            input.point_y(),
            &predictions,
        )
        .unwrap();

    assert!(writer.partition_output_exists(&partition));
    let first = fs::read_to_string(writer.partition_output_path(&partition)).unwrap();

    // A second run consults the exists check and writes nothing.
    if !writer.partition_output_exists(&partition) {
        panic!("output should exist after the first run");
    }
    let second = fs::read_to_string(writer.partition_output_path(&partition)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn class_schema_validates_observed_codes() {
    let fx = fixture();
    let table = fx.loader.load_training(&[p("A1"), p("A2")]).unwrap();

    let schema_path = fx.output.path().join("classes.json");
    fs::write(
        &schema_path,
        r#"{ "round": "test", "classes": [
            { "code": 3, "label": "fen" },
            { "code": 7, "label": "open water" }
        ] }"#,
    )
    .unwrap();
    let schema = ClassSchema::load(&schema_path).unwrap();
    assert!(schema.check_codes(table.class_codes()).is_ok());
    assert!(schema.check_codes(&[99]).is_err());
}
