//! Core type definitions for kernel classification

use crate::core::{QsvmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Dual coefficients at or below this value are treated as zero.
///
/// The same threshold decides "strictly inside the box" (free / on-margin)
/// vectors: `SUPPORT_TOLERANCE < alpha < C - SUPPORT_TOLERANCE`.
pub const SUPPORT_TOLERANCE: f64 = 1e-6;

/// Prediction result containing label and decision value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted binary label (+1 or -1)
    pub label: f64,
    /// Raw decision function value
    pub decision_value: f64,
}

impl Prediction {
    /// Create a prediction from a decision value; exactly zero maps to +1
    pub fn from_decision_value(decision_value: f64) -> Self {
        let label = if decision_value >= 0.0 { 1.0 } else { -1.0 };
        Self {
            label,
            decision_value,
        }
    }

    /// Get confidence as absolute value of decision value
    pub fn confidence(&self) -> f64 {
        self.decision_value.abs()
    }
}

/// A dense feature vector with an optional class label
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    features: Vec<f64>,
    label: Option<String>,
}

impl DataPoint {
    /// Create an unlabelled point
    pub fn new(features: Vec<f64>) -> Self {
        Self {
            features,
            label: None,
        }
    }

    /// Create a point belonging to `label`
    pub fn labeled(features: Vec<f64>, label: impl Into<String>) -> Self {
        Self {
            features,
            label: Some(label.into()),
        }
    }

    pub fn features(&self) -> &[f64] {
        &self.features
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }
}

impl AsRef<[f64]> for DataPoint {
    fn as_ref(&self) -> &[f64] {
        &self.features
    }
}

/// Class name to ordered feature vectors; all vectors share one dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    classes: BTreeMap<String, Vec<Vec<f64>>>,
    dim: Option<usize>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from `(class, vectors)` pairs
    pub fn from_classes<I, S>(classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Vec<f64>>)>,
        S: Into<String>,
    {
        let mut dataset = Self::new();
        for (class, vectors) in classes {
            let class = class.into();
            dataset.classes.entry(class.clone()).or_default();
            for features in vectors {
                dataset.insert(class.clone(), features)?;
            }
        }
        Ok(dataset)
    }

    /// Append a vector to `class`, checking the shared dimension
    pub fn insert(&mut self, class: impl Into<String>, features: Vec<f64>) -> Result<()> {
        match self.dim {
            Some(expected) if expected != features.len() => {
                return Err(QsvmError::DimensionMismatch {
                    expected,
                    actual: features.len(),
                });
            }
            None => self.dim = Some(features.len()),
            _ => {}
        }
        self.classes.entry(class.into()).or_default().push(features);
        Ok(())
    }

    /// Shared feature dimension, `None` while the dataset holds no vectors
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Total number of vectors across all classes
    pub fn len(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class names in lexicographic order
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Vectors of a single class
    pub fn class(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.classes.get(name).map(Vec::as_slice)
    }

    /// Labelled points ordered by class name, then insertion order
    pub fn points(&self) -> Vec<DataPoint> {
        self.classes
            .iter()
            .flat_map(|(class, vectors)| {
                vectors
                    .iter()
                    .map(move |features| DataPoint::labeled(features.clone(), class.as_str()))
            })
            .collect()
    }
}

/// Bijection between class names and indices `0..k`, ordered lexicographically
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabelIndex {
    names: Vec<String>,
}

impl ClassLabelIndex {
    /// Build the index from the classes of a training set
    ///
    /// Requires at least two classes, each holding at least one vector.
    pub fn from_dataset(training: &Dataset) -> Result<Self> {
        for name in training.class_names() {
            if training.class(name).map_or(true, <[_]>::is_empty) {
                return Err(QsvmError::InvalidDataset(format!(
                    "class '{name}' has no training vectors"
                )));
            }
        }
        Self::from_names(training.class_names().map(str::to_string).collect())
    }

    /// Rebuild an index from names that are already sorted and unique
    pub fn from_names(names: Vec<String>) -> Result<Self> {
        if names.len() < 2 {
            return Err(QsvmError::InvalidDataset(format!(
                "at least two classes are required, got {}",
                names.len()
            )));
        }
        if names.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QsvmError::InvalidParameter(
                "class names must be unique and sorted".to_string(),
            ));
        }
        Ok(Self { names })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .ok()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Result of optimization process
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Lagrange multipliers (alpha values)
    pub alpha: Vec<f64>,
    /// Bias term (b)
    pub b: f64,
    /// Indices of support vectors (where alpha > SUPPORT_TOLERANCE)
    pub support_vectors: Vec<usize>,
    /// Number of iterations performed
    pub iterations: usize,
    /// Final dual objective value
    pub objective_value: f64,
}

/// How the SMO solver picks the pair of multipliers to update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkingSetStrategy {
    /// Maximal violating pair: first-order gradient information only
    MaximalViolatingPair,
    /// Second-order selection of the partner using curvature (libsvm style)
    #[default]
    SecondOrder,
}

/// Configuration for the dual QP solver
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Tolerance on the KKT gap
    pub epsilon: f64,
    /// Maximum number of SMO steps before reporting non-convergence
    pub max_iterations: usize,
    /// Working set selection rule
    pub working_set_strategy: WorkingSetStrategy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.001,
            max_iterations: 100_000,
            working_set_strategy: WorkingSetStrategy::default(),
        }
    }
}

impl OptimizerConfig {
    /// Reject values the solver cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(QsvmError::InvalidParameter(format!(
                "C must be positive and finite, got: {}",
                self.c
            )));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(QsvmError::InvalidParameter(format!(
                "epsilon must be positive and finite, got: {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Seed used when the caller does not provide one
pub const DEFAULT_SEED: u64 = 10598;

/// Everything a single orchestrated run needs besides data and kernel
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub optimizer: OptimizerConfig,
    /// Root seed for every kernel evaluation in the run
    pub seed: u64,
    /// Overall wall-clock budget for the run
    pub timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            seed: DEFAULT_SEED,
            timeout: None,
        }
    }
}

/// Wall-clock limit shared by every stage of a run
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline `limit` from now; `None` never expires
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires
    pub fn none() -> Self {
        Self::after(None)
    }

    pub fn is_expired(&self) -> bool {
        self.limit
            .map_or(false, |limit| self.started.elapsed() >= limit)
    }

    /// Fail with `Timeout` once the limit has passed
    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.is_expired() => Err(QsvmError::Timeout { limit }),
            _ => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
