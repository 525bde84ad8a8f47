//! Error types for QSVM training and prediction

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QsvmError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Optimization failed: {0}")]
    OptimizationError(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: expected -1 or +1, got {0}")]
    InvalidLabel(f64),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Kernel evaluation failed at ({row}, {col}): {reason}")]
    KernelEvaluation {
        row: usize,
        col: usize,
        reason: String,
    },

    #[error("Training did not converge for pair {first}/{second}: {reason}")]
    TrainingConvergence {
        first: String,
        second: String,
        reason: String,
    },

    #[error("Training failed for {failed} of {total} class pairs")]
    TrainingFailed { failed: usize, total: usize },

    #[error("Run exceeded deadline of {limit:?}")]
    Timeout { limit: Duration },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, QsvmError>;
