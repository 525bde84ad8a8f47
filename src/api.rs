//! High-level API for quantum-kernel classification
//!
//! [`Qsvm`] configures a run with a builder; [`Qsvm::fit`] trains a
//! [`FittedQsvm`] and [`Qsvm::run`] drives the whole train → test → predict
//! pipeline, recording every stage in a [`RunReport`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use qsvm::api::Qsvm;
//! use qsvm::core::Dataset;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let training = Dataset::from_classes(vec![
//!     ("A", vec![vec![0.1, 0.4], vec![0.3, 0.2]]),
//!     ("B", vec![vec![2.6, 2.9], vec![2.8, 2.4]]),
//! ])?;
//! let test = Dataset::from_classes(vec![("A", vec![vec![0.2, 0.3]])])?;
//!
//! let report = Qsvm::new().with_seed(42).run(&training, &test, None);
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use crate::core::{
    ClassLabelIndex, Dataset, Deadline, QsvmError, Result, RunConfig, WorkingSetStrategy,
};
use crate::kernel::{mix_seed, Kernel, KernelMatrix, KernelMatrixBuilder, QuantumKernel};
use crate::multiclass::{
    enumerate_pairs, train_all, ClassPair, MulticlassModel, PairFailure, TrainingOutcome,
    TrainingSet,
};
use crate::optimizer::{KernelRow, SvmModel, SvmTrainer};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which set of kernel values a stage computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelPhase {
    /// Training set against itself
    Training,
    /// Test set against the support vectors
    Test,
    /// Query vectors against the support vectors
    Query,
}

impl KernelPhase {
    /// Seed stream for this phase
    fn stream(self) -> u64 {
        match self {
            KernelPhase::Training => 0,
            KernelPhase::Test => 1,
            KernelPhase::Query => 2,
        }
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    KernelsBuilt(KernelPhase),
    Trained,
    Evaluated,
    Predicted,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::Idle => write!(f, "idle"),
            RunStage::KernelsBuilt(KernelPhase::Training) => write!(f, "kernels built (training)"),
            RunStage::KernelsBuilt(KernelPhase::Test) => write!(f, "kernels built (test)"),
            RunStage::KernelsBuilt(KernelPhase::Query) => write!(f, "kernels built (query)"),
            RunStage::Trained => write!(f, "trained"),
            RunStage::Evaluated => write!(f, "evaluated"),
            RunStage::Predicted => write!(f, "predicted"),
            RunStage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Failed,
}

/// Outcome of one attempted transition
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub stage: RunStage,
    pub status: StageStatus,
    pub elapsed: Duration,
}

/// Everything a run produced, including how far it got
#[derive(Debug)]
pub struct RunReport {
    /// Last stage reached successfully
    pub state: RunStage,
    pub stages: Vec<StageRecord>,
    /// Complete one-vs-one model, once every pair trained
    pub model: Option<MulticlassModel>,
    /// Pairs that trained, also when others failed
    pub trained_pairs: BTreeMap<ClassPair, SvmModel>,
    pub training_failures: Vec<PairFailure>,
    /// Fraction of test vectors classified correctly
    pub accuracy: Option<f64>,
    /// Predicted class per test vector, in test set order
    pub test_predictions: Vec<String>,
    /// Predicted class per query vector
    pub predictions: Option<Vec<String>>,
    /// First failure; the run stops there
    pub error: Option<QsvmError>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: RunStage::Idle,
            stages: Vec::new(),
            model: None,
            trained_pairs: BTreeMap::new(),
            training_failures: Vec::new(),
            accuracy: None,
            test_predictions: Vec::new(),
            predictions: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state == RunStage::Done
    }

    /// Run `step` as `stage` unless the deadline already passed
    fn record<T>(
        &mut self,
        stage: RunStage,
        deadline: &Deadline,
        step: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Option<T> {
        let started = Instant::now();
        let result = deadline.check().and_then(|_| step(self));
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                info!("Stage '{stage}' completed in {elapsed:.2?}");
                self.stages.push(StageRecord {
                    stage,
                    status: StageStatus::Completed,
                    elapsed,
                });
                self.state = stage;
                Some(value)
            }
            Err(e) => {
                warn!("Stage '{stage}' failed after {elapsed:.2?}: {e}");
                self.stages.push(StageRecord {
                    stage,
                    status: StageStatus::Failed,
                    elapsed,
                });
                self.error = Some(e);
                None
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<26} {:<10} Elapsed", "Stage", "Status")?;
        for record in &self.stages {
            let status = match record.status {
                StageStatus::Completed => "completed",
                StageStatus::Failed => "failed",
            };
            writeln!(
                f,
                "{:<26} {:<10} {:.2?}",
                record.stage.to_string(),
                status,
                record.elapsed
            )?;
        }
        for failure in &self.training_failures {
            writeln!(
                f,
                "Pair ({}, {}) failed: {}",
                failure.pair.first, failure.pair.second, failure.error
            )?;
        }
        if let Some(accuracy) = self.accuracy {
            writeln!(f, "Accuracy: {:.2}%", accuracy * 100.0)?;
        }
        if let Some(predictions) = &self.predictions {
            writeln!(f, "Predictions: {}", predictions.join(", "))?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        Ok(())
    }
}

/// Quantum-kernel SVM classifier with builder-style configuration
pub struct Qsvm<K: Kernel = QuantumKernel> {
    kernel: Arc<K>,
    config: RunConfig,
}

impl Qsvm<QuantumKernel> {
    /// ZZ feature map kernel with default parameters
    pub fn new() -> Self {
        Self {
            kernel: Arc::new(QuantumKernel::default()),
            config: RunConfig::default(),
        }
    }
}

impl Default for Qsvm<QuantumKernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> Qsvm<K> {
    /// Swap in another kernel, keeping the configuration
    pub fn with_kernel<K2: Kernel>(self, kernel: K2) -> Qsvm<K2> {
        Qsvm {
            kernel: Arc::new(kernel),
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.optimizer.c = c;
        self
    }

    /// Set convergence tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.optimizer.epsilon = epsilon;
        self
    }

    /// Set maximum number of iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.optimizer.max_iterations = max_iterations;
        self
    }

    pub fn with_working_set_strategy(mut self, strategy: WorkingSetStrategy) -> Self {
        self.config.optimizer.working_set_strategy = strategy;
        self
    }

    /// Root seed for every kernel evaluation
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Wall-clock budget for a whole fit or run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Train on `training`, failing if any class pair fails
    pub fn fit(&self, training: &Dataset) -> Result<FittedQsvm<K>> {
        let deadline = Deadline::after(self.config.timeout);
        let session = self.prepare(training, &deadline)?;
        deadline.check()?;

        let outcome = self.train_pairs(&session);
        let total = session.pairs.len();
        if !outcome.is_complete() {
            return Err(QsvmError::TrainingFailed {
                failed: outcome.failures.len(),
                total,
            });
        }
        deadline.check()?;

        let model = MulticlassModel::new(session.classes, outcome.models)?;
        info!(
            "Fitted {} pair models with {} support vectors",
            total,
            model.n_support_vectors()
        );
        Ok(FittedQsvm {
            kernel: Arc::clone(&self.kernel),
            model,
            config: self.config.clone(),
        })
    }

    /// Train, evaluate on `test` and optionally classify `queries`
    ///
    /// Never fails outright: the report records how far the run got and the
    /// first error encountered.
    pub fn run(
        &self,
        training: &Dataset,
        test: &Dataset,
        queries: Option<&[Vec<f64>]>,
    ) -> RunReport {
        let deadline = Deadline::after(self.config.timeout);
        let mut report = RunReport::new();

        let Some(session) = report.record(
            RunStage::KernelsBuilt(KernelPhase::Training),
            &deadline,
            |_| self.prepare(training, &deadline),
        ) else {
            return report;
        };

        let Some(model) = report.record(RunStage::Trained, &deadline, |report| {
            let outcome = self.train_pairs(&session);
            report.trained_pairs = outcome.models.clone();
            if !outcome.is_complete() {
                let failed = outcome.failures.len();
                report.training_failures = outcome.failures;
                return Err(QsvmError::TrainingFailed {
                    failed,
                    total: session.pairs.len(),
                });
            }
            MulticlassModel::new(session.classes.clone(), outcome.models)
        }) else {
            return report;
        };
        report.model = Some(model.clone());

        let Some((test_rows, expected)) = report.record(
            RunStage::KernelsBuilt(KernelPhase::Test),
            &deadline,
            |_| {
                let (points, expected) = labeled_points(test, model.classes())?;
                let rows = self.support_rows(&model, &points, KernelPhase::Test, &deadline)?;
                Ok((rows, expected))
            },
        ) else {
            return report;
        };

        if report
            .record(RunStage::Evaluated, &deadline, |report| {
                let predicted = predict_rows(&model, &test_rows)?;
                let correct = predicted
                    .iter()
                    .zip(&expected)
                    .filter(|(p, e)| p == e)
                    .count();
                report.accuracy = Some(correct as f64 / expected.len() as f64);
                report.test_predictions = predicted
                    .iter()
                    .map(|&c| class_name(&model, c))
                    .collect::<Result<_>>()?;
                Ok(())
            })
            .is_none()
        {
            return report;
        }

        if let Some(queries) = queries {
            let Some(query_rows) = report.record(
                RunStage::KernelsBuilt(KernelPhase::Query),
                &deadline,
                |_| self.support_rows(&model, queries, KernelPhase::Query, &deadline),
            ) else {
                return report;
            };

            if report
                .record(RunStage::Predicted, &deadline, |report| {
                    let names: Vec<String> = predict_rows(&model, &query_rows)?
                        .into_iter()
                        .map(|c| class_name(&model, c))
                        .collect::<Result<_>>()?;
                    report.predictions = Some(names);
                    Ok(())
                })
                .is_none()
            {
                return report;
            }
        }

        report.record(RunStage::Done, &Deadline::none(), |_| Ok(()));
        report
    }

    /// Index classes and build the training Gram matrix
    fn prepare(&self, training: &Dataset, deadline: &Deadline) -> Result<TrainingSession> {
        self.config.optimizer.validate()?;
        let classes = ClassLabelIndex::from_dataset(training)?;
        let training_set = TrainingSet::from_dataset(training, &classes)?;
        let gram = KernelMatrixBuilder::new(self.kernel.as_ref())
            .with_seed(mix_seed(self.config.seed, KernelPhase::Training.stream()))
            .with_deadline(*deadline)
            .build(training_set.all_features(), training_set.all_features(), true)?;
        let pairs = enumerate_pairs(&classes);

        info!(
            "Built {}x{} training kernel for {} classes ({} pairs)",
            gram.rows(),
            gram.cols(),
            classes.len(),
            pairs.len()
        );
        Ok(TrainingSession {
            classes,
            training_set,
            gram,
            pairs,
        })
    }

    fn train_pairs(&self, session: &TrainingSession) -> TrainingOutcome {
        let trainer = SvmTrainer::new(self.config.optimizer.clone());
        train_all(
            &trainer,
            &session.gram,
            &session.training_set,
            &session.classes,
            &session.pairs,
        )
    }

    fn support_rows<A: AsRef<[f64]> + Sync>(
        &self,
        model: &MulticlassModel,
        points: &[A],
        phase: KernelPhase,
        deadline: &Deadline,
    ) -> Result<Vec<KernelRow>> {
        support_rows(
            self.kernel.as_ref(),
            model,
            points,
            mix_seed(self.config.seed, phase.stream()),
            deadline,
        )
    }
}

/// Shared state of a run after the training kernel is built
struct TrainingSession {
    classes: ClassLabelIndex,
    training_set: TrainingSet,
    gram: KernelMatrix,
    pairs: Vec<ClassPair>,
}

/// A trained classifier bound to its kernel
pub struct FittedQsvm<K: Kernel = QuantumKernel> {
    kernel: Arc<K>,
    model: MulticlassModel,
    config: RunConfig,
}

impl<K: Kernel> FittedQsvm<K> {
    /// Rebind a trained model to a kernel, e.g. after loading it from disk
    pub fn new(kernel: K, model: MulticlassModel, config: RunConfig) -> Self {
        Self {
            kernel: Arc::new(kernel),
            model,
            config,
        }
    }

    /// Predicted class name for each vector
    pub fn predict<A: AsRef<[f64]> + Sync>(&self, points: &[A]) -> Result<Vec<String>> {
        let rows = self.rows(points, KernelPhase::Query)?;
        predict_rows(&self.model, &rows)?
            .into_iter()
            .map(|c| class_name(&self.model, c))
            .collect()
    }

    /// Fraction of `test` classified correctly
    pub fn evaluate(&self, test: &Dataset) -> Result<f64> {
        let (points, expected) = labeled_points(test, self.model.classes())?;
        let rows = self.rows(&points, KernelPhase::Test)?;
        let predicted = predict_rows(&self.model, &rows)?;
        let correct = predicted
            .iter()
            .zip(&expected)
            .filter(|(p, e)| p == e)
            .count();
        Ok(correct as f64 / expected.len() as f64)
    }

    pub fn model(&self) -> &MulticlassModel {
        &self.model
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Get model information
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            kernel: self.kernel.name().to_string(),
            classes: self.model.classes().names().to_vec(),
            n_pairs: self.model.models().len(),
            n_support_vectors: self.model.n_support_vectors(),
        }
    }

    fn rows<A: AsRef<[f64]> + Sync>(&self, points: &[A], phase: KernelPhase) -> Result<Vec<KernelRow>> {
        let deadline = Deadline::after(self.config.timeout);
        support_rows(
            self.kernel.as_ref(),
            &self.model,
            points,
            mix_seed(self.config.seed, phase.stream()),
            &deadline,
        )
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub kernel: String,
    pub classes: Vec<String>,
    pub n_pairs: usize,
    pub n_support_vectors: usize,
}

/// Kernel rows of `points` against the model's support vectors only
fn support_rows<K, A>(
    kernel: &K,
    model: &MulticlassModel,
    points: &[A],
    seed: u64,
    deadline: &Deadline,
) -> Result<Vec<KernelRow>>
where
    K: Kernel + ?Sized,
    A: AsRef<[f64]> + Sync,
{
    let support = model.support_vectors();
    let indices: Vec<usize> = support.keys().copied().collect();
    let vectors: Vec<&[f64]> = support.values().copied().collect();

    let matrix = KernelMatrixBuilder::new(kernel)
        .with_seed(seed)
        .with_deadline(*deadline)
        .build(points, &vectors, false)?;

    Ok((0..matrix.rows())
        .map(|i| indices.iter().copied().zip(matrix.row(i).iter().copied()).collect())
        .collect())
}

fn predict_rows(model: &MulticlassModel, rows: &[KernelRow]) -> Result<Vec<usize>> {
    rows.iter().map(|row| model.predict(row)).collect()
}

fn class_name(model: &MulticlassModel, class: usize) -> Result<String> {
    model
        .classes()
        .name(class)
        .map(str::to_string)
        .ok_or_else(|| QsvmError::InvalidParameter(format!("class index {class} out of range")))
}

/// Test vectors with their class indices under `classes`
fn labeled_points(test: &Dataset, classes: &ClassLabelIndex) -> Result<(Vec<Vec<f64>>, Vec<usize>)> {
    if test.is_empty() {
        return Err(QsvmError::EmptyDataset);
    }
    let mut points = Vec::with_capacity(test.len());
    let mut expected = Vec::with_capacity(test.len());
    for point in test.points() {
        let name = point.label().unwrap_or_default();
        let class = classes
            .index_of(name)
            .ok_or_else(|| QsvmError::UnknownClass(name.to_string()))?;
        points.push(point.features().to_vec());
        expected.push(class);
    }
    Ok((points, expected))
}
