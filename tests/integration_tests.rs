//! Integration tests for the qsvm library
//!
//! These tests verify end-to-end functionality across multiple modules
//! and validate real-world usage scenarios.

use qsvm::api::{KernelPhase, Qsvm, RunStage, StageStatus};
use qsvm::kernel::{FnKernel, KernelMatrixBuilder, LinearKernel, QuantumKernel, RbfKernel};
use qsvm::optimizer::{KernelRow, SvmModel};
use qsvm::persistence::SerializableModel;
use qsvm::{ClassLabelIndex, ClassPair, CsvDataset, Dataset, MulticlassModel, QsvmError};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn separable_blobs() -> (Dataset, Dataset) {
    let training = Dataset::from_classes(vec![
        (
            "A",
            vec![
                vec![0.0, 0.0],
                vec![0.3, -0.2],
                vec![-0.4, 0.1],
                vec![0.2, 0.4],
                vec![-0.1, -0.3],
            ],
        ),
        (
            "B",
            vec![
                vec![5.0, 5.0],
                vec![5.3, 4.8],
                vec![4.6, 5.1],
                vec![5.2, 5.4],
                vec![4.9, 4.7],
            ],
        ),
    ])
    .expect("valid dataset");
    let test = Dataset::from_classes(vec![
        ("A", vec![vec![0.1, 0.1], vec![-0.2, 0.2]]),
        ("B", vec![vec![5.1, 5.0], vec![4.8, 5.2]]),
    ])
    .expect("valid dataset");
    (training, test)
}

/// Points on small circles around three centres, in radians-scale features
fn three_clusters() -> (Dataset, Dataset) {
    let centres = [("east", (2.5, 0.5)), ("north", (0.5, 2.5)), ("west", (0.5, 0.5))];
    let ring = |(cx, cy): (f64, f64), n: usize, phase: f64| -> Vec<Vec<f64>> {
        (0..n)
            .map(|k| {
                let angle = phase + k as f64 * std::f64::consts::TAU / n as f64;
                vec![cx + 0.15 * angle.cos(), cy + 0.15 * angle.sin()]
            })
            .collect()
    };

    let training =
        Dataset::from_classes(centres.iter().map(|&(name, c)| (name, ring(c, 6, 0.0))))
            .expect("valid dataset");
    let test = Dataset::from_classes(centres.iter().map(|&(name, c)| (name, ring(c, 2, 0.3))))
        .expect("valid dataset");
    (training, test)
}

/// Linearly separable data is classified perfectly
#[test]
fn test_linearly_separable_end_to_end() {
    let (training, test) = separable_blobs();

    for report in [
        Qsvm::new()
            .with_kernel(LinearKernel::new())
            .with_c(10.0)
            .run(&training, &test, None),
        Qsvm::new()
            .with_kernel(RbfKernel::new(0.5).expect("valid gamma"))
            .run(&training, &test, None),
    ] {
        assert!(report.is_success(), "{report}");
        assert_eq!(report.accuracy, Some(1.0));
        assert_eq!(report.test_predictions, vec!["A", "A", "B", "B"]);
    }
}

/// Full three-class run with the quantum kernel, including queries
#[test]
fn test_three_class_quantum_run() {
    let (training, test) = three_clusters();
    let queries = vec![vec![2.5, 0.5], vec![0.5, 2.5]];

    let report = Qsvm::new()
        .with_c(10.0)
        .with_seed(10598)
        .run(&training, &test, Some(&queries));

    assert!(report.is_success(), "{report}");
    assert_eq!(report.state, RunStage::Done);
    assert!(report
        .stages
        .iter()
        .all(|r| r.status == StageStatus::Completed));

    let model = report.model.as_ref().expect("model after success");
    assert_eq!(model.models().len(), 3);
    assert_eq!(
        model.classes().names(),
        &["east".to_string(), "north".to_string(), "west".to_string()]
    );

    let accuracy = report.accuracy.expect("accuracy after evaluation");
    assert!((0.0..=1.0).contains(&accuracy));
    assert_eq!(report.test_predictions.len(), 6);
    assert_eq!(report.predictions.as_ref().map(Vec::len), Some(2));
}

/// Equal seeds give identical models and predictions with sampled kernels
#[test]
fn test_determinism_under_fixed_seed() {
    let (training, test) = three_clusters();
    let queries = vec![vec![1.0, 1.0], vec![2.0, 0.4]];
    let kernel = QuantumKernel::new(2)
        .and_then(|k| k.with_shots(256))
        .expect("valid kernel");
    let qsvm = Qsvm::new().with_kernel(kernel).with_seed(1234);

    let first = qsvm.run(&training, &test, Some(&queries));
    let second = qsvm.run(&training, &test, Some(&queries));

    assert!(first.is_success(), "{first}");
    assert_eq!(first.model, second.model);
    assert_eq!(first.test_predictions, second.test_predictions);
    assert_eq!(first.predictions, second.predictions);
    assert_eq!(first.accuracy, second.accuracy);
}

/// Training kernel matrices are symmetric with a unit diagonal
#[test]
fn test_training_kernel_symmetry() {
    let (training, _) = three_clusters();
    let points: Vec<Vec<f64>> = training.points().iter().map(|p| p.features().to_vec()).collect();
    let kernel = QuantumKernel::default().with_shots(100).expect("valid kernel");

    let matrix = KernelMatrixBuilder::new(&kernel)
        .with_seed(5)
        .build(&points, &points, true)
        .expect("kernel build");

    assert!(matrix.is_symmetric());
    for i in 0..matrix.rows() {
        assert_eq!(matrix.get(i, i), 1.0);
        assert!(matrix.row(i).iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

/// A slow kernel runs into the deadline and the run stops there
#[test]
fn test_timeout_aborts_run() {
    let training = Dataset::from_classes(vec![
        ("a", (0..30).map(|i| vec![i as f64 * 0.01]).collect()),
        ("b", (0..30).map(|i| vec![1.0 + i as f64 * 0.01]).collect()),
    ])
    .expect("valid dataset");
    let test = Dataset::from_classes(vec![("a", vec![vec![0.0]])]).expect("valid dataset");
    let slow = FnKernel::new(|_: &[f64], _: &[f64], _: u64| {
        std::thread::sleep(Duration::from_millis(5));
        0.5
    });

    let report = Qsvm::new()
        .with_kernel(slow)
        .with_timeout(Duration::from_millis(20))
        .run(&training, &test, None);

    assert!(!report.is_success());
    assert!(matches!(report.error, Some(QsvmError::Timeout { .. })));
    assert!(report.accuracy.is_none());
    assert_eq!(
        report.stages.last().map(|r| r.status),
        Some(StageStatus::Failed)
    );
}

/// One vote each: the lowest class index wins
#[test]
fn test_vote_tie_resolves_to_lowest_class() {
    let bias_only = |b: f64| SvmModel::from_parts(vec![], b).expect("valid model");
    let classes = ClassLabelIndex::from_names(vec!["A".into(), "B".into(), "C".into()])
        .expect("valid classes");
    let models = BTreeMap::from([
        (ClassPair::new(0, 1), bias_only(1.0)),
        (ClassPair::new(0, 2), bias_only(-1.0)),
        (ClassPair::new(1, 2), bias_only(1.0)),
    ]);
    let model = MulticlassModel::new(classes, models).expect("complete model");

    assert_eq!(model.predict_name(&KernelRow::new()).expect("vote"), "A");
}

/// A class with a single vector on each side still trains and predicts
#[test]
fn test_single_sample_classes() {
    let training = Dataset::from_classes(vec![
        ("left", vec![vec![0.2, 0.3]]),
        ("right", vec![vec![2.9, 2.7]]),
    ])
    .expect("valid dataset");
    let test = Dataset::from_classes(vec![
        ("left", vec![vec![0.2, 0.3]]),
        ("right", vec![vec![2.9, 2.7]]),
    ])
    .expect("valid dataset");

    let fitted = Qsvm::new()
        .with_kernel(LinearKernel::new())
        .fit(&training)
        .expect("training should succeed");
    assert_eq!(fitted.model().n_support_vectors(), 2);
    assert_eq!(fitted.evaluate(&test).expect("evaluation"), 1.0);
}

/// Pair failures are reported per pair and aggregated
#[test]
fn test_training_failure_is_reported_per_pair() {
    let (training, test) = three_clusters();
    let report = Qsvm::new()
        .with_kernel(LinearKernel::new())
        .with_max_iterations(0)
        .run(&training, &test, None);

    assert!(matches!(
        report.error,
        Some(QsvmError::TrainingFailed { failed: 3, total: 3 })
    ));
    assert_eq!(report.training_failures.len(), 3);
    for failure in &report.training_failures {
        assert!(matches!(
            failure.error,
            QsvmError::TrainingConvergence { .. }
        ));
    }
    assert_eq!(report.state, RunStage::KernelsBuilt(KernelPhase::Training));
}

/// Mixed dimensions are rejected before any kernel work
#[test]
fn test_dimension_mismatch_between_sets() {
    let (training, _) = separable_blobs();
    let test = Dataset::from_classes(vec![("A", vec![vec![0.0, 0.0, 0.0]])]).expect("valid");

    let report = Qsvm::new()
        .with_kernel(LinearKernel::new())
        .run(&training, &test, None);
    assert!(matches!(
        report.error,
        Some(QsvmError::DimensionMismatch { expected: 3, actual: 2 })
    ));
}

/// Complete workflow: CSV loading -> training -> saving -> loading -> prediction
#[test]
fn test_complete_workflow_csv() {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, "x,y,species").expect("Failed to write");
    writeln!(temp_file, "0.1,0.2,setosa").expect("Failed to write");
    writeln!(temp_file, "0.3,0.1,setosa").expect("Failed to write");
    writeln!(temp_file, "2.9,3.1,virginica").expect("Failed to write");
    writeln!(temp_file, "3.2,2.8,virginica").expect("Failed to write");
    temp_file.flush().expect("Failed to flush");

    let dataset = CsvDataset::from_file(temp_file.path())
        .and_then(CsvDataset::into_dataset)
        .expect("CSV loading should succeed");
    let fitted = Qsvm::new()
        .with_kernel(RbfKernel::new(1.0).expect("valid gamma"))
        .fit(&dataset)
        .expect("Training should succeed");

    let model_file = NamedTempFile::new().expect("Failed to create temp file");
    SerializableModel::from_fitted(&fitted)
        .save_to_file(model_file.path())
        .expect("Saving should succeed");
    let restored = SerializableModel::load_from_file(model_file.path())
        .and_then(|m| m.to_fitted())
        .expect("Loading should succeed");

    let queries = vec![vec![0.2, 0.2], vec![3.0, 3.0]];
    let predictions = restored.predict(&queries).expect("Prediction should succeed");
    assert_eq!(predictions, vec!["setosa", "virginica"]);
    assert_eq!(predictions, fitted.predict(&queries).expect("Prediction"));
}
