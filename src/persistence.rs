//! Model serialization and persistence
//!
//! This module saves trained classifiers as JSON and loads them back for use
//! by the CLI application and other scenarios where model persistence is needed.

use crate::api::FittedQsvm;
use crate::core::{
    ClassLabelIndex, OptimizerConfig, QsvmError, Result, RunConfig, WorkingSetStrategy,
};
use crate::kernel::{Kernel, KernelSpec};
use crate::multiclass::{ClassPair, MulticlassModel};
use crate::optimizer::SvmModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Serializable representation of a fitted classifier
#[derive(Debug, Serialize, Deserialize)]
pub struct SerializableModel {
    /// Kernel the model was trained with
    pub kernel: KernelSpec,
    /// Class names, in class index order
    pub classes: Vec<String>,
    /// One binary model per class pair
    pub pairs: Vec<SerializablePair>,
    /// Model metadata
    pub metadata: ModelMetadata,
}

/// A binary model with the class pair it separates
#[derive(Debug, Serialize, Deserialize)]
pub struct SerializablePair {
    pub pair: ClassPair,
    pub model: SvmModel,
}

/// Model metadata for tracking and validation
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Number of distinct support vectors across all pairs
    pub n_support_vectors: usize,
    /// Training parameters used
    pub training_params: TrainingParams,
    /// Creation timestamp
    pub created_at: String,
}

/// Training parameters for reference
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingParams {
    pub c: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
    pub working_set_strategy: WorkingSetStrategy,
    pub seed: u64,
}

impl SerializableModel {
    /// Create a serializable model from a fitted classifier
    pub fn from_fitted<K>(fitted: &FittedQsvm<K>) -> Self
    where
        K: Kernel + Clone + Into<KernelSpec>,
    {
        let model = fitted.model();
        let config = fitted.config();

        Self {
            kernel: fitted.kernel().clone().into(),
            classes: model.classes().names().to_vec(),
            pairs: model
                .models()
                .iter()
                .map(|(&pair, model)| SerializablePair {
                    pair,
                    model: model.clone(),
                })
                .collect(),
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                n_support_vectors: model.n_support_vectors(),
                training_params: TrainingParams {
                    c: config.optimizer.c,
                    epsilon: config.optimizer.epsilon,
                    max_iterations: config.optimizer.max_iterations,
                    working_set_strategy: config.optimizer.working_set_strategy,
                    seed: config.seed,
                },
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| QsvmError::SerializationError(e.to_string()))?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model = serde_json::from_reader(reader)
            .map_err(|e| QsvmError::SerializationError(e.to_string()))?;
        Ok(model)
    }

    /// Rebuild a classifier that predicts exactly like the saved one
    pub fn to_fitted(&self) -> Result<FittedQsvm<KernelSpec>> {
        self.kernel.validate()?;
        let classes = ClassLabelIndex::from_names(self.classes.clone())?;
        let models = self
            .pairs
            .iter()
            .map(|p| (p.pair, p.model.clone()))
            .collect();
        let model = MulticlassModel::new(classes, models)?;

        let params = &self.metadata.training_params;
        let config = RunConfig {
            optimizer: OptimizerConfig {
                c: params.c,
                epsilon: params.epsilon,
                max_iterations: params.max_iterations,
                working_set_strategy: params.working_set_strategy,
            },
            seed: params.seed,
            timeout: None,
        };
        Ok(FittedQsvm::new(self.kernel, model, config))
    }

    /// Print model summary
    pub fn print_summary(&self) {
        println!("=== QSVM Model Summary ===");
        println!("Kernel: {}", self.kernel.name());
        match self.kernel {
            KernelSpec::ZzFeatureMap { reps, shots } => {
                println!("  Repetitions: {reps}");
                match shots {
                    Some(shots) => println!("  Shots: {shots}"),
                    None => println!("  Shots: exact"),
                }
            }
            KernelSpec::Rbf { gamma } => println!("  Gamma: {gamma}"),
            KernelSpec::Linear => {}
        }
        println!("Classes: {}", self.classes.join(", "));
        println!("Pair Models: {}", self.pairs.len());
        println!("Support Vectors: {}", self.metadata.n_support_vectors);
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at);
        println!("Training Parameters:");
        println!("  C: {}", self.metadata.training_params.c);
        println!("  Epsilon: {}", self.metadata.training_params.epsilon);
        println!(
            "  Max Iterations: {}",
            self.metadata.training_params.max_iterations
        );
        println!(
            "  Working Set: {:?}",
            self.metadata.training_params.working_set_strategy
        );
        println!("  Seed: {}", self.metadata.training_params.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Qsvm;
    use crate::core::Dataset;
    use crate::kernel::{LinearKernel, QuantumKernel};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn training() -> Dataset {
        Dataset::from_classes(vec![
            ("a", vec![vec![0.1, 0.2], vec![0.3, 0.1]]),
            ("b", vec![vec![2.0, 2.1], vec![2.3, 1.8]]),
            ("c", vec![vec![0.2, 2.4], vec![0.1, 2.0]]),
        ])
        .unwrap()
    }

    #[test]
    fn test_model_serialization() -> Result<()> {
        let fitted = Qsvm::new()
            .with_kernel(LinearKernel::new())
            .with_c(5.0)
            .with_seed(3)
            .fit(&training())?;
        let serializable = SerializableModel::from_fitted(&fitted);

        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        serializable.save_to_file(temp_file.path())?;
        let loaded = SerializableModel::load_from_file(temp_file.path())?;

        assert_eq!(loaded.kernel, KernelSpec::Linear);
        assert_eq!(loaded.classes, vec!["a", "b", "c"]);
        assert_eq!(loaded.pairs.len(), 3);
        assert_eq!(loaded.metadata.training_params.c, 5.0);
        assert_eq!(loaded.metadata.training_params.seed, 3);
        assert!(chrono::DateTime::parse_from_rfc3339(&loaded.metadata.created_at).is_ok());

        let restored = loaded.to_fitted()?;
        assert_eq!(restored.model().classes(), fitted.model().classes());

        let queries = vec![vec![0.2, 0.2], vec![2.1, 2.0], vec![0.0, 2.2]];
        assert_eq!(restored.predict(&queries)?, fitted.predict(&queries)?);
        Ok(())
    }

    #[test]
    fn test_quantum_kernel_parameters_survive() -> Result<()> {
        let kernel = QuantumKernel::new(1)?.with_shots(512)?;
        let fitted = Qsvm::new().with_kernel(kernel).fit(&training())?;
        let serializable = SerializableModel::from_fitted(&fitted);

        let json = serde_json::to_string(&serializable)
            .map_err(|e| QsvmError::SerializationError(e.to_string()))?;
        let back: SerializableModel = serde_json::from_str(&json)
            .map_err(|e| QsvmError::SerializationError(e.to_string()))?;

        assert_eq!(
            back.kernel,
            KernelSpec::ZzFeatureMap {
                reps: 1,
                shots: Some(512)
            }
        );
        assert_eq!(back.to_fitted()?.info().kernel, "zz_feature_map");
        Ok(())
    }

    #[test]
    fn test_missing_pair_is_rejected() -> Result<()> {
        let fitted = Qsvm::new()
            .with_kernel(LinearKernel::new())
            .fit(&training())?;
        let mut serializable = SerializableModel::from_fitted(&fitted);
        serializable.pairs.pop();

        assert!(matches!(
            serializable.to_fitted(),
            Err(QsvmError::InvalidParameter(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(temp_file, "{{ \"kernel\": 3 }}").expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        assert!(matches!(
            SerializableModel::load_from_file(temp_file.path()),
            Err(QsvmError::SerializationError(_))
        ));
        assert!(matches!(
            SerializableModel::load_from_file("/nonexistent/model.json"),
            Err(QsvmError::IoError(_))
        ));
    }
}
