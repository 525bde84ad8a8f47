//! Kernel (Gram) matrix construction
//!
//! Entries are evaluated in parallel. Every entry draws its own seed from the
//! builder seed and its `(row, col)` position, so a fixed seed reproduces the
//! same matrix regardless of how rayon schedules the work.

use crate::core::{Deadline, QsvmError, Result};
use crate::kernel::Kernel;
use log::{debug, warn};
use rayon::prelude::*;

/// Kernel values this far outside `[0, 1]` are clamped; further out they fail.
pub const CLAMP_TOLERANCE: f64 = 1e-3;

/// Dense row-major kernel matrix with entries in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl KernelMatrix {
    /// Build a matrix from explicit rows; all rows must have equal length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(QsvmError::DimensionMismatch {
                    expected: n_cols,
                    actual: row.len(),
                });
            }
            values.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Entry (i, j)
    ///
    /// # Panics
    /// Panics if `i >= rows()` or `j >= cols()`
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.rows && j < self.cols, "kernel index out of bounds");
        self.values[i * self.cols + j]
    }

    /// Row `i` as a slice
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.cols..(i + 1) * self.cols]
    }

    /// Exact symmetry check
    pub fn is_symmetric(&self) -> bool {
        self.is_square()
            && (0..self.rows).all(|i| (0..i).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Principal submatrix over `indices` (rows and columns alike)
    pub fn submatrix(&self, indices: &[usize]) -> Result<Self> {
        if !self.is_square() {
            return Err(QsvmError::InvalidParameter(
                "principal submatrix needs a square kernel matrix".to_string(),
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.rows) {
            return Err(QsvmError::InvalidParameter(format!(
                "index {bad} outside kernel matrix of size {}",
                self.rows
            )));
        }
        let values = indices
            .iter()
            .flat_map(|&i| indices.iter().map(move |&j| (i, j)))
            .map(|(i, j)| self.values[i * self.cols + j])
            .collect();
        Ok(Self {
            rows: indices.len(),
            cols: indices.len(),
            values,
        })
    }
}

/// Computes kernel matrices between ordered sets of vectors
pub struct KernelMatrixBuilder<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
    seed: u64,
    deadline: Deadline,
}

impl<'k, K: Kernel + ?Sized> KernelMatrixBuilder<'k, K> {
    pub fn new(kernel: &'k K) -> Self {
        Self {
            kernel,
            seed: 0,
            deadline: Deadline::none(),
        }
    }

    /// Root seed for per-entry seeds
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Abandon the build with `Timeout` once `deadline` passes
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Compute K[i][j] = kernel(set_a[i], set_b[j])
    ///
    /// With `symmetric`, `set_b` must be the same set as `set_a`: only the
    /// strict upper triangle is evaluated and mirrored, and the diagonal is 1.
    pub fn build<A, B>(&self, set_a: &[A], set_b: &[B], symmetric: bool) -> Result<KernelMatrix>
    where
        A: AsRef<[f64]> + Sync,
        B: AsRef<[f64]> + Sync,
    {
        check_common_dimension(set_a, set_b)?;
        self.deadline.check()?;

        if symmetric {
            if set_a.len() != set_b.len() {
                return Err(QsvmError::InvalidParameter(format!(
                    "symmetric build needs one set, got sizes {} and {}",
                    set_a.len(),
                    set_b.len()
                )));
            }
            self.build_symmetric(set_a)
        } else {
            self.build_rectangular(set_a, set_b)
        }
    }

    fn build_symmetric<A: AsRef<[f64]> + Sync>(&self, set: &[A]) -> Result<KernelMatrix> {
        let n = set.len();
        let upper: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        debug!(
            "Building symmetric {n}x{n} kernel matrix ({} evaluations, kernel={})",
            upper.len(),
            self.kernel.name()
        );

        let entries: Vec<f64> = upper
            .par_iter()
            .map(|&(i, j)| self.evaluate(set[i].as_ref(), set[j].as_ref(), i, j))
            .collect::<Result<_>>()?;

        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
        }
        for (&(i, j), &value) in upper.iter().zip(&entries) {
            values[i * n + j] = value;
            values[j * n + i] = value;
        }
        Ok(KernelMatrix {
            rows: n,
            cols: n,
            values,
        })
    }

    fn build_rectangular<A, B>(&self, set_a: &[A], set_b: &[B]) -> Result<KernelMatrix>
    where
        A: AsRef<[f64]> + Sync,
        B: AsRef<[f64]> + Sync,
    {
        let (rows, cols) = (set_a.len(), set_b.len());
        debug!(
            "Building {rows}x{cols} kernel matrix (kernel={})",
            self.kernel.name()
        );

        let values: Vec<f64> = (0..rows * cols)
            .into_par_iter()
            .map(|k| {
                let (i, j) = (k / cols, k % cols);
                self.evaluate(set_a[i].as_ref(), set_b[j].as_ref(), i, j)
            })
            .collect::<Result<_>>()?;

        Ok(KernelMatrix { rows, cols, values })
    }

    /// One kernel call, validated
    fn evaluate(&self, x: &[f64], y: &[f64], row: usize, col: usize) -> Result<f64> {
        self.deadline.check()?;
        let value = self
            .kernel
            .compute(x, y, entry_seed(self.seed, row, col))
            .map_err(|e| QsvmError::KernelEvaluation {
                row,
                col,
                reason: e.to_string(),
            })?;
        validate_entry(value, row, col)
    }
}

/// Reject non-finite or out-of-range values, clamp small excursions
fn validate_entry(value: f64, row: usize, col: usize) -> Result<f64> {
    if !value.is_finite() {
        return Err(QsvmError::KernelEvaluation {
            row,
            col,
            reason: format!("non-finite kernel value {value}"),
        });
    }
    if !(-CLAMP_TOLERANCE..=1.0 + CLAMP_TOLERANCE).contains(&value) {
        return Err(QsvmError::KernelEvaluation {
            row,
            col,
            reason: format!("kernel value {value} outside [0, 1]"),
        });
    }
    if !(0.0..=1.0).contains(&value) {
        warn!("Clamping kernel value {value} at ({row}, {col}) into [0, 1]");
        return Ok(value.clamp(0.0, 1.0));
    }
    Ok(value)
}

fn check_common_dimension<A: AsRef<[f64]>, B: AsRef<[f64]>>(
    set_a: &[A],
    set_b: &[B],
) -> Result<()> {
    let mut dims = set_a
        .iter()
        .map(|v| v.as_ref().len())
        .chain(set_b.iter().map(|v| v.as_ref().len()));
    if let Some(expected) = dims.next() {
        if let Some(actual) = dims.find(|&d| d != expected) {
            return Err(QsvmError::DimensionMismatch { expected, actual });
        }
    }
    Ok(())
}

/// SplitMix64 finalizer over `seed` combined with `stream`
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn entry_seed(seed: u64, row: usize, col: usize) -> u64 {
    mix_seed(mix_seed(seed, row as u64), col as u64)
}
