//! Binary SVM training and prediction on precomputed kernels
//!
//! [`SvmTrainer`] turns one [`BinarySubproblem`] into an [`SvmModel`] by
//! solving the dual on the principal submatrix of the training Gram matrix.
//! A trained model only needs kernel values against its own support vectors,
//! supplied as a [`KernelRow`] keyed by global training index.

use crate::core::{OptimizerConfig, Prediction, QsvmError, Result};
use crate::kernel::KernelMatrix;
use crate::multiclass::{BinarySubproblem, TrainingSet};
use crate::solver::SmoSolver;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kernel values of one input against training vectors, by global training index
pub type KernelRow = BTreeMap<usize, f64>;

/// A training vector with non-zero dual coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVector {
    /// Position in the full training set
    pub index: usize,
    pub features: Vec<f64>,
    pub alpha: f64,
    /// Binary label within the pair (+1 or -1)
    pub label: f64,
}

/// A trained binary classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmModel {
    support_vectors: Vec<SupportVector>,
    bias: f64,
    iterations: usize,
    objective_value: f64,
}

impl SvmModel {
    /// Assemble a model from already-trained parts
    pub fn from_parts(support_vectors: Vec<SupportVector>, bias: f64) -> Result<Self> {
        if !bias.is_finite() {
            return Err(QsvmError::InvalidParameter(format!(
                "bias must be finite, got: {bias}"
            )));
        }
        for sv in &support_vectors {
            if sv.label != 1.0 && sv.label != -1.0 {
                return Err(QsvmError::InvalidLabel(sv.label));
            }
            if !(sv.alpha > 0.0 && sv.alpha.is_finite()) {
                return Err(QsvmError::InvalidParameter(format!(
                    "support vector {} has invalid alpha {}",
                    sv.index, sv.alpha
                )));
            }
        }
        Ok(Self {
            support_vectors,
            bias,
            iterations: 0,
            objective_value: 0.0,
        })
    }

    pub fn support_vectors(&self) -> &[SupportVector] {
        &self.support_vectors
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// SMO iterations spent training this model
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Final dual objective
    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }

    /// f(x) = Σ α_i y_i K(x, sv_i) + b
    ///
    /// Fails if `row` lacks a value for any support vector.
    pub fn decision_value(&self, row: &KernelRow) -> Result<f64> {
        let mut sum = 0.0;
        for sv in &self.support_vectors {
            let k = row.get(&sv.index).ok_or_else(|| {
                QsvmError::InvalidParameter(format!(
                    "kernel row has no value for support vector {}",
                    sv.index
                ))
            })?;
            sum += sv.alpha * sv.label * k;
        }
        Ok(sum + self.bias)
    }

    pub fn predict(&self, row: &KernelRow) -> Result<Prediction> {
        self.decision_value(row)
            .map(Prediction::from_decision_value)
    }
}

/// Trains binary models for class pairs
pub struct SvmTrainer {
    solver: SmoSolver,
}

impl SvmTrainer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            solver: SmoSolver::new(config),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        self.solver.config()
    }

    /// Train the pair described by `problem` against the full training `gram`
    ///
    /// Solver failures surface as `TrainingConvergence` naming the pair.
    pub fn train(
        &self,
        gram: &KernelMatrix,
        problem: &BinarySubproblem,
        training: &TrainingSet,
    ) -> Result<SvmModel> {
        let sub = gram.submatrix(problem.indices())?;
        let result = self
            .solver
            .solve(&sub, problem.labels())
            .map_err(|e| match e {
                QsvmError::OptimizationError(reason) => QsvmError::TrainingConvergence {
                    first: problem.first_name().to_string(),
                    second: problem.second_name().to_string(),
                    reason,
                },
                other => other,
            })?;

        let mut support_vectors = Vec::with_capacity(result.support_vectors.len());
        for &local in &result.support_vectors {
            let index = problem.indices()[local];
            let features = training.features(index).ok_or_else(|| {
                QsvmError::InvalidParameter(format!("training index {index} out of range"))
            })?;
            support_vectors.push(SupportVector {
                index,
                features: features.to_vec(),
                alpha: result.alpha[local],
                label: problem.labels()[local],
            });
        }

        debug!(
            "Trained pair ({}, {}): {} samples, {} support vectors, {} iterations",
            problem.first_name(),
            problem.second_name(),
            problem.len(),
            support_vectors.len(),
            result.iterations
        );

        Ok(SvmModel {
            support_vectors,
            bias: result.b,
            iterations: result.iterations,
            objective_value: result.objective_value,
        })
    }
}
