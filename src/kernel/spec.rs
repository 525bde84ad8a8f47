//! Serializable choice of built-in kernel

use crate::core::Result;
use crate::kernel::{Kernel, LinearKernel, QuantumKernel, RbfKernel};
use serde::{Deserialize, Serialize};

/// One of the built-in kernels, as stored in model files and chosen on the CLI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelSpec {
    ZzFeatureMap { reps: usize, shots: Option<usize> },
    Linear,
    Rbf { gamma: f64 },
}

impl KernelSpec {
    /// Validate parameters by constructing the concrete kernel
    pub fn validate(&self) -> Result<()> {
        match *self {
            KernelSpec::ZzFeatureMap { reps, shots } => {
                quantum_kernel(reps, shots)?;
            }
            KernelSpec::Linear => {}
            KernelSpec::Rbf { gamma } => {
                RbfKernel::new(gamma)?;
            }
        }
        Ok(())
    }
}

impl Default for KernelSpec {
    fn default() -> Self {
        let kernel = QuantumKernel::default();
        KernelSpec::ZzFeatureMap {
            reps: kernel.reps(),
            shots: kernel.shots(),
        }
    }
}

impl From<QuantumKernel> for KernelSpec {
    fn from(kernel: QuantumKernel) -> Self {
        KernelSpec::ZzFeatureMap {
            reps: kernel.reps(),
            shots: kernel.shots(),
        }
    }
}

impl From<RbfKernel> for KernelSpec {
    fn from(kernel: RbfKernel) -> Self {
        KernelSpec::Rbf {
            gamma: kernel.gamma(),
        }
    }
}

impl From<LinearKernel> for KernelSpec {
    fn from(_: LinearKernel) -> Self {
        KernelSpec::Linear
    }
}

impl Kernel for KernelSpec {
    fn compute(&self, x: &[f64], y: &[f64], seed: u64) -> Result<f64> {
        match *self {
            KernelSpec::ZzFeatureMap { reps, shots } => {
                quantum_kernel(reps, shots)?.compute(x, y, seed)
            }
            KernelSpec::Linear => LinearKernel::new().compute(x, y, seed),
            KernelSpec::Rbf { gamma } => RbfKernel::new(gamma)?.compute(x, y, seed),
        }
    }

    fn name(&self) -> &str {
        match self {
            KernelSpec::ZzFeatureMap { .. } => "zz_feature_map",
            KernelSpec::Linear => "linear",
            KernelSpec::Rbf { .. } => "rbf",
        }
    }
}

fn quantum_kernel(reps: usize, shots: Option<usize>) -> Result<QuantumKernel> {
    let kernel = QuantumKernel::new(reps)?;
    match shots {
        Some(shots) => kernel.with_shots(shots),
        None => Ok(kernel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_matches_concrete_kernels() {
        let x = [0.3, 1.2];
        let y = [2.0, 0.4];

        let spec = KernelSpec::from(QuantumKernel::default());
        assert_eq!(
            spec.compute(&x, &y, 1).unwrap(),
            QuantumKernel::default().compute(&x, &y, 1).unwrap()
        );

        let spec = KernelSpec::Rbf { gamma: 0.5 };
        assert_eq!(
            spec.compute(&x, &y, 0).unwrap(),
            RbfKernel::new(0.5).unwrap().compute(&x, &y, 0).unwrap()
        );
        assert_eq!(KernelSpec::Linear.name(), "linear");
    }

    #[test]
    fn test_spec_validation() {
        assert!(KernelSpec::default().validate().is_ok());
        assert!(KernelSpec::Rbf { gamma: -1.0 }.validate().is_err());
        assert!(KernelSpec::ZzFeatureMap {
            reps: 2,
            shots: Some(0)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_spec_json_shape() {
        let json = serde_json::to_string(&KernelSpec::ZzFeatureMap {
            reps: 2,
            shots: Some(1024),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"zz_feature_map\""));

        let back: KernelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back,
            KernelSpec::ZzFeatureMap {
                reps: 2,
                shots: Some(1024)
            }
        );
    }
}
