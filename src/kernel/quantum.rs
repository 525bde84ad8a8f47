//! Quantum state-overlap kernel over a second-order ZZ feature map.
//!
//! Each feature vector `x` of length `n` is encoded on `n` qubits by repeating
//! `reps` times a Hadamard layer followed by the diagonal unitary
//!
//! ```text
//! exp(i * [ Σ_q 2·x_q·b_q + Σ_{q<r} 2·(π - x_q)(π - x_r)·(b_q ⊕ b_r) ])
//! ```
//!
//! on every computational basis state `b`. The kernel value is the state
//! fidelity `|⟨ψ(y)|ψ(x)⟩|²`, i.e. the probability of reading all zeros after
//! running `U(y)† U(x)` on `|0…0⟩`. With `shots` set, that probability is
//! estimated from seeded Bernoulli samples instead of returned exactly.

use crate::core::{QsvmError, Result};
use crate::kernel::traits::check_dimensions;
use crate::kernel::Kernel;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Largest feature dimension (one qubit per feature) the simulation accepts
pub const MAX_QUBITS: usize = 16;

/// Feature map repetitions used by `QuantumKernel::default`
pub const DEFAULT_REPS: usize = 2;

/// ZZ feature map fidelity kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantumKernel {
    reps: usize,
    shots: Option<usize>,
}

impl QuantumKernel {
    /// Exact-fidelity kernel with `reps` feature map repetitions
    pub fn new(reps: usize) -> Result<Self> {
        if reps == 0 {
            return Err(QsvmError::InvalidParameter(
                "feature map needs at least one repetition".to_string(),
            ));
        }
        Ok(Self { reps, shots: None })
    }

    /// Estimate fidelities from `shots` measurement samples
    pub fn with_shots(mut self, shots: usize) -> Result<Self> {
        if shots == 0 {
            return Err(QsvmError::InvalidParameter(
                "shot count must be positive".to_string(),
            ));
        }
        self.shots = Some(shots);
        Ok(self)
    }

    pub fn reps(&self) -> usize {
        self.reps
    }

    pub fn shots(&self) -> Option<usize> {
        self.shots
    }

    /// Prepare |ψ(x)⟩
    fn encode(&self, x: &[f64]) -> Statevector {
        let n = x.len();
        let pair_angles: Vec<(usize, usize, f64)> = (0..n)
            .flat_map(|q| ((q + 1)..n).map(move |r| (q, r)))
            .map(|(q, r)| (q, r, 2.0 * (PI - x[q]) * (PI - x[r])))
            .collect();

        let mut state = Statevector::new(n);
        for _ in 0..self.reps {
            for qubit in 0..n {
                state.apply_h(qubit);
            }
            state.apply_phases(|basis| {
                let single: f64 = x
                    .iter()
                    .enumerate()
                    .filter(|&(q, _)| (basis >> q) & 1 == 1)
                    .map(|(_, &xq)| 2.0 * xq)
                    .sum();
                let entangling: f64 = pair_angles
                    .iter()
                    .filter(|&&(q, r, _)| ((basis >> q) ^ (basis >> r)) & 1 == 1)
                    .map(|&(_, _, angle)| angle)
                    .sum();
                single + entangling
            });
        }
        state
    }
}

impl Default for QuantumKernel {
    fn default() -> Self {
        Self {
            reps: DEFAULT_REPS,
            shots: None,
        }
    }
}

impl Kernel for QuantumKernel {
    fn compute(&self, x: &[f64], y: &[f64], seed: u64) -> Result<f64> {
        check_dimensions(x, y)?;
        if x.is_empty() || x.len() > MAX_QUBITS {
            return Err(QsvmError::InvalidParameter(format!(
                "feature dimension must be between 1 and {MAX_QUBITS}, got {}",
                x.len()
            )));
        }

        let fidelity = self
            .encode(y)
            .overlap(&self.encode(x))
            .norm_sqr()
            .clamp(0.0, 1.0);

        match self.shots {
            None => Ok(fidelity),
            Some(shots) => {
                let mut rng = StdRng::seed_from_u64(seed);
                let zeros = (0..shots).filter(|_| rng.gen_bool(fidelity)).count();
                Ok(zeros as f64 / shots as f64)
            }
        }
    }

    fn name(&self) -> &str {
        "zz_feature_map"
    }
}

/// Dense amplitudes of an `n`-qubit register; qubit `q` is bit `q` of the index
struct Statevector {
    amplitudes: Vec<Complex64>,
}

impl Statevector {
    /// |0…0⟩
    fn new(num_qubits: usize) -> Self {
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); 1 << num_qubits];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self { amplitudes }
    }

    fn apply_h(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = (a + b) * FRAC_1_SQRT_2;
                self.amplitudes[j] = (a - b) * FRAC_1_SQRT_2;
            }
        }
    }

    /// Multiply every basis amplitude by `exp(i * phase(basis))`
    fn apply_phases(&mut self, phase: impl Fn(usize) -> f64) {
        for (basis, amp) in self.amplitudes.iter_mut().enumerate() {
            *amp *= Complex64::from_polar(1.0, phase(basis));
        }
    }

    /// ⟨self|other⟩
    fn overlap(&self, other: &Statevector) -> Complex64 {
        self.amplitudes
            .iter()
            .zip(&other.amplitudes)
            .map(|(a, b)| a.conj() * b)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_self_fidelity_is_one() {
        let kernel = QuantumKernel::default();
        let x = [0.4, 2.1];
        assert_relative_eq!(kernel.compute(&x, &x, 0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_qubit_closed_form() {
        // One qubit, one repetition: |ψ(x)⟩ = (|0⟩ + e^{2ix}|1⟩)/√2,
        // so the fidelity is cos²(x - y).
        let kernel = QuantumKernel::new(1).unwrap();
        let value = kernel.compute(&[0.3], &[0.1], 0).unwrap();
        assert_relative_eq!(value, 0.2_f64.cos().powi(2), epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_and_in_range() {
        let kernel = QuantumKernel::default();
        let x = [0.2, 5.9, 1.3];
        let y = [3.0, 0.7, 2.2];
        let kxy = kernel.compute(&x, &y, 0).unwrap();
        let kyx = kernel.compute(&y, &x, 0).unwrap();
        assert_relative_eq!(kxy, kyx, epsilon = 1e-12);
        assert!((0.0..=1.0).contains(&kxy));
    }

    #[test]
    fn test_shots_are_seeded() {
        let kernel = QuantumKernel::default().with_shots(256).unwrap();
        let x = [0.5, 1.5];
        let y = [2.5, 0.1];

        let first = kernel.compute(&x, &y, 7).unwrap();
        let again = kernel.compute(&x, &y, 7).unwrap();
        assert_eq!(first, again);

        // Estimates are multiples of 1/shots
        let scaled = first * 256.0;
        assert_relative_eq!(scaled, scaled.round(), epsilon = 1e-9);
    }

    #[test]
    fn test_shot_estimate_tracks_exact_value() {
        let exact = QuantumKernel::default();
        let sampled = QuantumKernel::default().with_shots(20_000).unwrap();
        let x = [1.0, 0.2];
        let y = [0.8, 0.4];

        let truth = exact.compute(&x, &y, 0).unwrap();
        let estimate = sampled.compute(&x, &y, 11).unwrap();
        assert!((truth - estimate).abs() < 0.03, "{truth} vs {estimate}");
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(QuantumKernel::new(0).is_err());
        assert!(QuantumKernel::default().with_shots(0).is_err());

        let kernel = QuantumKernel::default();
        let wide = vec![0.0; MAX_QUBITS + 1];
        assert!(matches!(
            kernel.compute(&wide, &wide, 0),
            Err(QsvmError::InvalidParameter(_))
        ));
        assert!(matches!(
            kernel.compute(&[1.0], &[1.0, 2.0], 0),
            Err(QsvmError::DimensionMismatch { .. })
        ));
    }
}
