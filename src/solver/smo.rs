//! Sequential Minimal Optimization (SMO) solver on a precomputed kernel matrix
//!
//! Solves the soft-margin SVM dual
//!
//! ```text
//! min  ½ αᵀQα − eᵀα    with Q_ij = y_i y_j K_ij
//! s.t. 0 ≤ α_i ≤ C,  yᵀα = 0
//! ```
//!
//! by repeatedly optimizing a pair of multipliers. The gradient `G = Qα − e` is
//! maintained incrementally; the solver stops once the KKT gap
//! `max_{I_up} −y·G − min_{I_low} −y·G` drops below `epsilon`.

use crate::core::{
    OptimizationResult, OptimizerConfig, QsvmError, Result, WorkingSetStrategy, SUPPORT_TOLERANCE,
};
use crate::kernel::KernelMatrix;
use log::debug;

/// Curvature floor for non-positive-definite pairs
const TAU: f64 = 1e-12;

/// SMO solver for SVM optimization
pub struct SmoSolver {
    config: OptimizerConfig,
}

impl SmoSolver {
    /// Create a new SMO solver with the given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Solve the dual problem for `gram` (m×m) and labels in {−1, +1}
    pub fn solve(&self, gram: &KernelMatrix, labels: &[f64]) -> Result<OptimizationResult> {
        self.config.validate()?;
        if labels.is_empty() {
            return Err(QsvmError::EmptyDataset);
        }
        if !gram.is_square() || gram.rows() != labels.len() {
            return Err(QsvmError::DimensionMismatch {
                expected: labels.len(),
                actual: gram.rows(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&y| y != 1.0 && y != -1.0) {
            return Err(QsvmError::InvalidLabel(bad));
        }

        let n = labels.len();
        let c = self.config.c;

        // A lone sample sits on its margin with the full budget C
        if n == 1 {
            let y = labels[0];
            return Ok(OptimizationResult {
                alpha: vec![c],
                b: y * (1.0 - c * gram.get(0, 0)),
                support_vectors: vec![0],
                iterations: 0,
                objective_value: c - 0.5 * c * c * gram.get(0, 0),
            });
        }
        if labels.iter().all(|&y| y == labels[0]) {
            return Err(QsvmError::InvalidDataset(
                "binary problem needs samples of both labels".to_string(),
            ));
        }

        let mut alpha = vec![0.0; n];
        // G = Qα − e, with α = 0 initially
        let mut gradient = vec![-1.0; n];
        let mut iterations = 0;

        loop {
            let Some((i, j, gap)) = self.select_working_set(gram, labels, &alpha, &gradient)
            else {
                break;
            };
            if gap < self.config.epsilon {
                break;
            }
            if iterations >= self.config.max_iterations {
                return Err(QsvmError::OptimizationError(format!(
                    "KKT gap {gap:.3e} still above {} after {iterations} iterations",
                    self.config.epsilon
                )));
            }

            self.take_step(i, j, gram, labels, &mut alpha, &mut gradient);
            iterations += 1;

            if gradient.iter().any(|g| !g.is_finite()) {
                return Err(QsvmError::OptimizationError(format!(
                    "gradient became non-finite after {iterations} iterations"
                )));
            }
        }

        let b = self.calculate_bias(labels, &alpha, &gradient);
        let support_vectors: Vec<usize> = alpha
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a > SUPPORT_TOLERANCE)
            .map(|(i, _)| i)
            .collect();
        let objective_value = calculate_objective(&alpha, &gradient);

        debug!(
            "SMO converged after {iterations} iterations: {} support vectors, b={b:.6}",
            support_vectors.len()
        );

        Ok(OptimizationResult {
            alpha,
            b,
            support_vectors,
            iterations,
            objective_value,
        })
    }

    /// Pick the pair (i, j) to update, with the current KKT gap
    ///
    /// Returns `None` when one of the index sets is empty.
    fn select_working_set(
        &self,
        gram: &KernelMatrix,
        labels: &[f64],
        alpha: &[f64],
        gradient: &[f64],
    ) -> Option<(usize, usize, f64)> {
        let c = self.config.c;
        let in_up = |t: usize| (labels[t] > 0.0 && alpha[t] < c) || (labels[t] < 0.0 && alpha[t] > 0.0);
        let in_low =
            |t: usize| (labels[t] > 0.0 && alpha[t] > 0.0) || (labels[t] < 0.0 && alpha[t] < c);

        let mut g_max = f64::NEG_INFINITY;
        let mut i = None;
        for t in (0..labels.len()).filter(|&t| in_up(t)) {
            let v = -labels[t] * gradient[t];
            if v > g_max {
                g_max = v;
                i = Some(t);
            }
        }
        let i = i?;

        let mut g_min = f64::INFINITY;
        let mut j_first = None;
        let mut j_second = None;
        let mut best_gain = f64::INFINITY;
        for t in (0..labels.len()).filter(|&t| in_low(t)) {
            let v = -labels[t] * gradient[t];
            if v < g_min {
                g_min = v;
                j_first = Some(t);
            }
            let b_it = g_max - v;
            if b_it > 0.0 {
                let mut a_it = gram.get(i, i) + gram.get(t, t) - 2.0 * gram.get(i, t);
                if a_it <= 0.0 {
                    a_it = TAU;
                }
                let gain = -(b_it * b_it) / a_it;
                if gain < best_gain {
                    best_gain = gain;
                    j_second = Some(t);
                }
            }
        }

        let j = match self.config.working_set_strategy {
            WorkingSetStrategy::MaximalViolatingPair => j_first?,
            WorkingSetStrategy::SecondOrder => j_second.or(j_first)?,
        };
        Some((i, j, g_max - g_min))
    }

    /// Analytically optimize α_i, α_j and update the gradient
    fn take_step(
        &self,
        i: usize,
        j: usize,
        gram: &KernelMatrix,
        labels: &[f64],
        alpha: &mut [f64],
        gradient: &mut [f64],
    ) {
        let c = self.config.c;
        let (y_i, y_j) = (labels[i], labels[j]);
        let (alpha_i_old, alpha_j_old) = (alpha[i], alpha[j]);

        let mut quad = gram.get(i, i) + gram.get(j, j) - 2.0 * gram.get(i, j);
        if quad <= 0.0 {
            quad = TAU;
        }

        if y_i != y_j {
            let delta = (-gradient[i] - gradient[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;

            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let delta = (gradient[i] - gradient[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;

            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let delta_i = alpha[i] - alpha_i_old;
        let delta_j = alpha[j] - alpha_j_old;
        for (t, g) in gradient.iter_mut().enumerate() {
            let y_t = labels[t];
            *g += y_t * (y_i * gram.get(t, i) * delta_i + y_j * gram.get(t, j) * delta_j);
        }
    }

    /// b = −mean(y_i G_i) over free support vectors, else over all of them
    fn calculate_bias(&self, labels: &[f64], alpha: &[f64], gradient: &[f64]) -> f64 {
        let c = self.config.c;
        let mean_of = |keep: &dyn Fn(f64) -> bool| {
            let (sum, count) = alpha
                .iter()
                .zip(labels.iter().zip(gradient))
                .filter(|(a, _)| keep(**a))
                .fold((0.0, 0usize), |(sum, count), (_, (&y, &g))| {
                    (sum + y * g, count + 1)
                });
            (count > 0).then(|| -sum / count as f64)
        };

        mean_of(&|a| a > SUPPORT_TOLERANCE && a < c - SUPPORT_TOLERANCE)
            .or_else(|| mean_of(&|a| a > SUPPORT_TOLERANCE))
            .unwrap_or(0.0)
    }
}

/// Dual objective Σα − ½αᵀQα, using Qα = G + e
fn calculate_objective(alpha: &[f64], gradient: &[f64]) -> f64 {
    alpha
        .iter()
        .zip(gradient)
        .map(|(&a, &g)| a - 0.5 * a * (g + 1.0))
        .sum()
}
