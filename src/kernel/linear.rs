//! Normalized linear kernel implementation

use crate::core::Result;
use crate::kernel::traits::check_dimensions;
use crate::kernel::Kernel;

/// Normalized linear kernel: K(x, y) = (1 + cos∠(x̃, ỹ)) / 2 with x̃ = (x, 1)
///
/// The constant coordinate keeps points near the origin distinguishable from
/// each other by direction alone, and the affine rescaling maps the cosine into
/// `[0, 1]` with K(x, x) = 1. The result is still a valid (PSD) kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl LinearKernel {
    /// Create a new linear kernel
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for LinearKernel {
    fn compute(&self, x: &[f64], y: &[f64], _seed: u64) -> Result<f64> {
        check_dimensions(x, y)?;
        let dot = dot_product(x, y) + 1.0;
        let norm_x = (dot_product(x, x) + 1.0).sqrt();
        let norm_y = (dot_product(y, y) + 1.0).sqrt();
        let cosine = (dot / (norm_x * norm_y)).clamp(-1.0, 1.0);
        Ok(0.5 * (1.0 + cosine))
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// Compute dot product between two dense vectors of equal length
pub(crate) fn dot_product(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}
