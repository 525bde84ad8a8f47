//! Quantum-kernel support vector classification
//!
//! A soft-margin SVM trained on precomputed kernel matrices, where the kernel
//! is a state-overlap score in `[0, 1]`. Multiclass problems are reduced to
//! one-vs-one binary SVMs combined by majority vote.

pub mod api;
pub mod core;
pub mod data;
pub mod kernel;
pub mod multiclass;
pub mod optimizer;
pub mod persistence;
pub mod solver;

// Re-export main types for convenience
pub use crate::api::{FittedQsvm, ModelInfo, Qsvm, RunReport, RunStage};
pub use crate::core::types::*;
pub use crate::core::{QsvmError, Result};
pub use crate::data::CsvDataset;
pub use crate::kernel::{Kernel, KernelSpec, LinearKernel, QuantumKernel, RbfKernel};
pub use crate::multiclass::{ClassPair, MulticlassModel};
pub use crate::optimizer::{SvmModel, SvmTrainer};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
