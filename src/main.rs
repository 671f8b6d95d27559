use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error, info};

use carex_io::{ArtifactWriter, ClassSchema, PartitionId, PartitionLoader, PredictionRow};
use carex_rf::{EnsembleConfig, MaxFeatures, MergedEnsemble, cross_validate};

#[derive(Parser)]
#[command(name = "carex")]
#[command(about = "Merged random-forest land-cover classification over spatial partitions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 21, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Cross-validate and train the production classifier on labeled partitions
    Train {
        /// Directory of per-partition covariate CSVs
        #[arg(long)]
        covariate_dir: PathBuf,

        /// Directory of per-partition label CSVs
        #[arg(long)]
        label_dir: PathBuf,

        /// Comma-separated partition names (e.g. A1,A2,B1)
        #[arg(long, value_delimiter = ',', required = true)]
        partitions: Vec<String>,

        /// Output directory for artifacts
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Class-schema JSON to validate observed labels against
        #[arg(long)]
        class_schema: Option<PathBuf>,

        /// Trees per criterion sub-forest (the classifier holds 3x this)
        #[arg(long, default_value_t = 500)]
        n_trees: usize,

        /// Maximum tree depth (unlimited if not set)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Minimum rows required to attempt a split
        #[arg(long, default_value_t = 2)]
        min_samples_split: usize,

        /// Minimum rows required in each leaf
        #[arg(long, default_value_t = 1)]
        min_samples_leaf: usize,

        /// Covariates tried per split: sqrt, log2, all, a count, or a fraction
        #[arg(long, default_value = "sqrt")]
        max_features: String,

        /// Disable bootstrap sampling of training rows
        #[arg(long)]
        no_bootstrap: bool,

        /// Disable balanced class weighting
        #[arg(long)]
        no_balance: bool,
    },

    /// Batch-predict unlabeled partitions with a trained classifier
    Predict {
        /// Path to the trained classifier binary
        #[arg(long)]
        model: PathBuf,

        /// Directory of per-partition covariate CSVs
        #[arg(long)]
        covariate_dir: PathBuf,

        /// Directory of per-partition label CSVs (segment/point columns)
        #[arg(long)]
        label_dir: PathBuf,

        /// Comma-separated partition names (e.g. A1,A2,B1)
        #[arg(long, value_delimiter = ',', required = true)]
        partitions: Vec<String>,

        /// Output directory for per-partition prediction CSVs
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Class-schema JSON to validate the classifier's classes against
        #[arg(long)]
        class_schema: Option<PathBuf>,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    n_partitions: usize,
    n_rows: usize,
    n_covariates: usize,
    n_classes: usize,
    n_folds: usize,
    n_trees: usize,
    cv_accuracy: f64,
    class_metrics: Vec<ClassSummary>,
    classifier_path: String,
}

/// Per-class cross-validated scores in the train summary.
#[derive(Serialize)]
struct ClassSummary {
    class: i64,
    precision: f64,
    recall: f64,
    f1: f64,
    support: usize,
}

#[derive(Serialize)]
struct PredictOutput {
    n_partitions: usize,
    predicted: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<String>,
    model_n_trees: usize,
    model_n_classes: usize,
}

fn parse_partitions(names: &[String]) -> Result<Vec<PartitionId>> {
    names
        .iter()
        .map(|name| PartitionId::new(name.clone()).map_err(anyhow::Error::from))
        .collect()
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        "all" => Ok(MaxFeatures::All),
        other => {
            if let Ok(n) = other.parse::<usize>() {
                Ok(MaxFeatures::Fixed(n))
            } else if let Ok(f) = other.parse::<f64>() {
                Ok(MaxFeatures::Fraction(f))
            } else {
                anyhow::bail!(
                    "unknown max-features policy: {other} (expected sqrt, log2, all, a count, or a fraction)"
                )
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            covariate_dir,
            label_dir,
            partitions,
            output_dir,
            class_schema,
            n_trees,
            max_depth,
            min_samples_split,
            min_samples_leaf,
            max_features,
            no_bootstrap,
            no_balance,
        } => {
            let partitions = parse_partitions(&partitions)?;
            let max_features = parse_max_features(&max_features)?;
            let schema = class_schema
                .map(ClassSchema::load)
                .transpose()
                .context("failed to load class schema")?;

            // 1. Load, join, and concatenate all partitions.
            let loader = PartitionLoader::new(&covariate_dir, &label_dir);
            let table = loader
                .load_training(&partitions)
                .context("failed to load training partitions")?;
            info!(
                n_rows = table.n_rows(),
                n_covariates = table.n_covariates(),
                "training table assembled"
            );

            if let Some(schema) = &schema {
                schema
                    .check_codes(table.class_codes())
                    .context("observed class labels disagree with the class schema")?;
            }

            // 2. Grouped cross-validation plus the production classifier.
            let config = EnsembleConfig::new(n_trees)?
                .with_max_depth(max_depth)
                .with_min_samples_split(min_samples_split)
                .with_min_samples_leaf(min_samples_leaf)
                .with_max_features(max_features)
                .with_bootstrap(!no_bootstrap)
                .with_balanced(!no_balance)
                .with_seed(cli.seed);

            let result = cross_validate(
                &config,
                table.features(),
                table.class_codes(),
                table.cv_groups(),
                table.covariate_names(),
            )
            .context("cross-validation failed")?;
            debug!("cross-validated confusion matrix:\n{}", result.confusion_matrix);

            // 3. Write artifacts.
            let writer = ArtifactWriter::new(&output_dir)?;

            result
                .classifier
                .save(writer.classifier_path())
                .context("failed to save classifier")?;

            let rows: Vec<PredictionRow> = (0..table.n_rows())
                .map(|i| PredictionRow {
                    segment_id: table.segment_ids()[i].as_str().to_string(),
                    point_x: table.point_x()[i],
                    point_y: table.point_y()[i],
                    class_label: table.class_codes()[i],
                    fold: result.fold_numbers[i],
                    class_predict: result.predictions[i],
                })
                .collect();
            writer.write_predictions(&rows)?;

            let importances: Vec<(String, f64)> = result
                .importances
                .iter()
                .map(|f| (f.covariate.clone(), f.importance))
                .collect();
            writer.write_importances(&importances)?;

            writer.write_confusion_matrix(
                result.confusion_matrix.codes(),
                result.confusion_matrix.as_rows(),
            )?;

            // 4. Print summary.
            let class_metrics: Vec<ClassSummary> = result
                .confusion_matrix
                .class_metrics()
                .iter()
                .map(|m| ClassSummary {
                    class: m.code,
                    precision: m.precision,
                    recall: m.recall,
                    f1: m.f1,
                    support: m.support,
                })
                .collect();

            let output = TrainOutput {
                n_partitions: partitions.len(),
                n_rows: table.n_rows(),
                n_covariates: table.n_covariates(),
                n_classes: result.classifier.n_classes(),
                n_folds: result.n_folds,
                n_trees: result.classifier.tree_count(),
                cv_accuracy: result.confusion_matrix.accuracy(),
                class_metrics,
                classifier_path: writer.classifier_path().display().to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            covariate_dir,
            label_dir,
            partitions,
            output_dir,
            class_schema,
        } => {
            let partitions = parse_partitions(&partitions)?;

            // 1. Load the classifier once for all partitions.
            let classifier = MergedEnsemble::load(&model).context("failed to load classifier")?;
            info!(
                n_trees = classifier.tree_count(),
                n_covariates = classifier.n_features(),
                n_classes = classifier.n_classes(),
                "classifier loaded"
            );

            if let Some(schema_path) = class_schema {
                let schema =
                    ClassSchema::load(schema_path).context("failed to load class schema")?;
                schema
                    .check_codes(classifier.class_codes())
                    .context("classifier classes disagree with the class schema")?;
            }

            let loader = PartitionLoader::new(&covariate_dir, &label_dir);
            let writer = ArtifactWriter::new(&output_dir)?;

            // 2. Predict partition by partition. A failing partition is
            // reported and does not stop the rest of the batch.
            let mut predicted = Vec::new();
            let mut skipped = Vec::new();
            let mut failed = Vec::new();

            for partition in &partitions {
                if writer.partition_output_exists(partition) {
                    info!(partition = %partition, "output exists, skipping");
                    skipped.push(partition.as_str().to_string());
                    continue;
                }
                match predict_partition(&loader, &writer, &classifier, partition) {
                    Ok(n_rows) => {
                        info!(partition = %partition, n_rows, "partition predicted");
                        predicted.push(partition.as_str().to_string());
                    }
                    Err(e) => {
                        error!(partition = %partition, error = ?e, "partition failed");
                        failed.push(partition.as_str().to_string());
                    }
                }
            }

            // 3. Print summary, then fail the run if any partition failed.
            let n_failed = failed.len();
            let output = PredictOutput {
                n_partitions: partitions.len(),
                predicted,
                skipped,
                failed,
                model_n_trees: classifier.tree_count(),
                model_n_classes: classifier.n_classes(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);

            if n_failed > 0 {
                anyhow::bail!("{n_failed} partition(s) failed");
            }
        }
    }

    Ok(())
}

/// Load, check, predict, and write one partition.
fn predict_partition(
    loader: &PartitionLoader,
    writer: &ArtifactWriter,
    classifier: &MergedEnsemble,
    partition: &PartitionId,
) -> Result<usize> {
    let input = loader
        .load_prediction(partition)
        .context("failed to load partition")?;

    classifier
        .check_feature_names(input.covariate_names())
        .context("covariate columns disagree with the classifier")?;

    let predictions = classifier
        .predict_batch_with_confidence(input.features())
        .context("prediction failed")?;

    writer.write_partition_predictions(
        partition,
        input.segment_ids(),
        input.point_x(),
        input.point_y(),
        &predictions,
    )?;

    Ok(input.n_rows())
}
