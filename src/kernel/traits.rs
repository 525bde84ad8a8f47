//! Kernel trait definition

use crate::core::{QsvmError, Result};

/// Kernel evaluation capability
///
/// A kernel maps two feature vectors of equal length to a similarity score in
/// `[0, 1]`. Kernels that estimate their value statistically must draw all
/// randomness from `seed`, so that equal seeds give equal values.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: &[f64], y: &[f64], seed: u64) -> Result<f64>;

    /// Short name used in logs and model files
    fn name(&self) -> &str;
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn compute(&self, x: &[f64], y: &[f64], seed: u64) -> Result<f64> {
        (**self).compute(x, y, seed)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Kernel backed by a plain function or closure
///
/// Useful for injecting an externally computed kernel, or a fixed stub in tests.
pub struct FnKernel<F> {
    func: F,
}

impl<F> FnKernel<F>
where
    F: Fn(&[f64], &[f64], u64) -> f64 + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Kernel for FnKernel<F>
where
    F: Fn(&[f64], &[f64], u64) -> f64 + Send + Sync,
{
    fn compute(&self, x: &[f64], y: &[f64], seed: u64) -> Result<f64> {
        check_dimensions(x, y)?;
        Ok((self.func)(x, y, seed))
    }

    fn name(&self) -> &str {
        "custom"
    }
}

/// Fail with `DimensionMismatch` unless both vectors have the same length
pub(crate) fn check_dimensions(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(QsvmError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    Ok(())
}
