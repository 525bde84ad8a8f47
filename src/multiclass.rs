//! One-vs-one reduction of multiclass classification to binary SVMs
//!
//! Every unordered pair of classes `(a, b)` with `a < b` gets its own binary
//! model in which class `a` is labelled +1 and class `b` is labelled -1.
//! Prediction runs all pair models and takes a majority vote; ties go to the
//! lowest class index.

use crate::core::{ClassLabelIndex, Dataset, QsvmError, Result};
use crate::kernel::KernelMatrix;
use crate::optimizer::{KernelRow, SvmModel, SvmTrainer};
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Class indices `(first, second)` with `first < second`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassPair {
    pub first: usize,
    pub second: usize,
}

impl ClassPair {
    pub fn new(first: usize, second: usize) -> Self {
        debug_assert!(first < second, "class pair must be ordered");
        Self { first, second }
    }

    /// Class index voted for by a binary label
    pub fn winner(&self, label: f64) -> usize {
        if label > 0.0 {
            self.first
        } else {
            self.second
        }
    }
}

/// All `k(k-1)/2` pairs in lexicographic order
pub fn enumerate_pairs(index: &ClassLabelIndex) -> Vec<ClassPair> {
    let k = index.len();
    (0..k)
        .flat_map(|a| ((a + 1)..k).map(move |b| ClassPair::new(a, b)))
        .collect()
}

/// Training vectors flattened in class order, each tagged with its class index
///
/// Positions in this set are the global training indices used by kernel rows
/// and support vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    features: Vec<Vec<f64>>,
    classes: Vec<usize>,
}

impl TrainingSet {
    pub fn from_dataset(dataset: &Dataset, index: &ClassLabelIndex) -> Result<Self> {
        let mut features = Vec::with_capacity(dataset.len());
        let mut classes = Vec::with_capacity(dataset.len());
        for name in dataset.class_names() {
            let class = index
                .index_of(name)
                .ok_or_else(|| QsvmError::UnknownClass(name.to_string()))?;
            for vector in dataset.class(name).unwrap_or_default() {
                features.push(vector.clone());
                classes.push(class);
            }
        }
        Ok(Self { features, classes })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self, i: usize) -> Option<&[f64]> {
        self.features.get(i).map(Vec::as_slice)
    }

    pub fn all_features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn class_of(&self, i: usize) -> Option<usize> {
        self.classes.get(i).copied()
    }

    fn indices_of(&self, class: usize) -> impl Iterator<Item = usize> + '_ {
        self.classes
            .iter()
            .enumerate()
            .filter(move |&(_, &c)| c == class)
            .map(|(i, _)| i)
    }
}

/// The two-class problem for one pair: +1 for `first`, -1 for `second`
#[derive(Debug, Clone, PartialEq)]
pub struct BinarySubproblem {
    pair: ClassPair,
    first_name: String,
    second_name: String,
    indices: Vec<usize>,
    labels: Vec<f64>,
}

impl BinarySubproblem {
    pub fn new(pair: ClassPair, training: &TrainingSet, index: &ClassLabelIndex) -> Result<Self> {
        let name = |class: usize| {
            index.name(class).map(str::to_string).ok_or_else(|| {
                QsvmError::InvalidParameter(format!("class index {class} out of range"))
            })
        };
        let first_name = name(pair.first)?;
        let second_name = name(pair.second)?;

        let mut indices = Vec::new();
        let mut labels = Vec::new();
        for i in training.indices_of(pair.first) {
            indices.push(i);
            labels.push(1.0);
        }
        for i in training.indices_of(pair.second) {
            indices.push(i);
            labels.push(-1.0);
        }

        Ok(Self {
            pair,
            first_name,
            second_name,
            indices,
            labels,
        })
    }

    pub fn pair(&self) -> ClassPair {
        self.pair
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn second_name(&self) -> &str {
        &self.second_name
    }

    /// Global training indices, first class then second
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A pair whose training failed
#[derive(Debug)]
pub struct PairFailure {
    pub pair: ClassPair,
    pub error: QsvmError,
}

/// Models that trained and pairs that did not
#[derive(Debug, Default)]
pub struct TrainingOutcome {
    pub models: BTreeMap<ClassPair, SvmModel>,
    pub failures: Vec<PairFailure>,
}

impl TrainingOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Train every pair independently and in parallel
///
/// A failing pair never stops the others; its error is kept in the outcome.
pub fn train_all(
    trainer: &SvmTrainer,
    gram: &KernelMatrix,
    training: &TrainingSet,
    index: &ClassLabelIndex,
    pairs: &[ClassPair],
) -> TrainingOutcome {
    let results: Vec<(ClassPair, Result<SvmModel>)> = pairs
        .par_iter()
        .map(|&pair| {
            let result = BinarySubproblem::new(pair, training, index)
                .and_then(|problem| trainer.train(gram, &problem, training));
            (pair, result)
        })
        .collect();

    let mut outcome = TrainingOutcome::default();
    for (pair, result) in results {
        match result {
            Ok(model) => {
                outcome.models.insert(pair, model);
            }
            Err(error) => {
                warn!("Training pair ({}, {}) failed: {error}", pair.first, pair.second);
                outcome.failures.push(PairFailure { pair, error });
            }
        }
    }
    outcome
}

/// Index of the highest vote count; ties go to the lowest index
pub fn pick_winner(votes: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (class, &count) in votes.iter().enumerate() {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((class, count));
        }
    }
    best.map(|(class, _)| class)
}

/// One-vs-one ensemble over a fixed set of classes
#[derive(Debug, Clone, PartialEq)]
pub struct MulticlassModel {
    classes: ClassLabelIndex,
    models: BTreeMap<ClassPair, SvmModel>,
}

impl MulticlassModel {
    /// Requires exactly one model per class pair
    pub fn new(classes: ClassLabelIndex, models: BTreeMap<ClassPair, SvmModel>) -> Result<Self> {
        let expected = enumerate_pairs(&classes);
        if expected.len() != models.len() || expected.iter().any(|p| !models.contains_key(p)) {
            return Err(QsvmError::InvalidParameter(format!(
                "expected {} pair models for {} classes, got {}",
                expected.len(),
                classes.len(),
                models.len()
            )));
        }
        Ok(Self { classes, models })
    }

    pub fn classes(&self) -> &ClassLabelIndex {
        &self.classes
    }

    pub fn models(&self) -> &BTreeMap<ClassPair, SvmModel> {
        &self.models
    }

    /// Union of support vectors across all pair models, by global index
    pub fn support_vectors(&self) -> BTreeMap<usize, &[f64]> {
        self.models
            .values()
            .flat_map(SvmModel::support_vectors)
            .map(|sv| (sv.index, sv.features.as_slice()))
            .collect()
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors().len()
    }

    /// Votes per class index
    pub fn tally(&self, row: &KernelRow) -> Result<Vec<usize>> {
        let mut votes = vec![0; self.classes.len()];
        for (pair, model) in &self.models {
            let prediction = model.predict(row)?;
            votes[pair.winner(prediction.label)] += 1;
        }
        Ok(votes)
    }

    /// Winning class index
    pub fn predict(&self, row: &KernelRow) -> Result<usize> {
        let votes = self.tally(row)?;
        pick_winner(&votes).ok_or_else(|| QsvmError::InvalidParameter("no classes to vote on".to_string()))
    }

    /// Winning class name
    pub fn predict_name(&self, row: &KernelRow) -> Result<&str> {
        let class = self.predict(row)?;
        self.classes
            .name(class)
            .ok_or_else(|| QsvmError::InvalidParameter(format!("class index {class} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OptimizerConfig;
    use crate::kernel::{KernelMatrixBuilder, LinearKernel};
    use crate::optimizer::SupportVector;

    fn index(names: &[&str]) -> ClassLabelIndex {
        ClassLabelIndex::from_names(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn bias_only(bias: f64) -> SvmModel {
        SvmModel::from_parts(vec![], bias).unwrap()
    }

    #[test]
    fn test_enumerate_pairs() {
        let pairs = enumerate_pairs(&index(&["A", "B", "C", "D"]));
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0], ClassPair::new(0, 1));
        assert_eq!(pairs[2], ClassPair::new(0, 3));
        assert_eq!(pairs[5], ClassPair::new(2, 3));
    }

    #[test]
    fn test_pick_winner_prefers_lowest_index_on_tie() {
        assert_eq!(pick_winner(&[1, 1, 1]), Some(0));
        assert_eq!(pick_winner(&[0, 2, 2]), Some(1));
        assert_eq!(pick_winner(&[0, 1, 3]), Some(2));
        assert_eq!(pick_winner(&[]), None);
    }

    #[test]
    fn test_three_way_tie_goes_to_first_class() {
        // A beats B, C beats A, B beats C: one vote each
        let models = BTreeMap::from([
            (ClassPair::new(0, 1), bias_only(1.0)),
            (ClassPair::new(0, 2), bias_only(-1.0)),
            (ClassPair::new(1, 2), bias_only(1.0)),
        ]);
        let model = MulticlassModel::new(index(&["A", "B", "C"]), models).unwrap();
        let row = KernelRow::new();

        assert_eq!(model.tally(&row).unwrap(), vec![1, 1, 1]);
        assert_eq!(model.predict(&row).unwrap(), 0);
        assert_eq!(model.predict_name(&row).unwrap(), "A");
    }

    #[test]
    fn test_two_classes_follow_the_single_binary_model() {
        let classes = index(&["left", "right"]);
        for (bias, expected) in [(0.7, "left"), (-0.2, "right"), (0.0, "left")] {
            let models = BTreeMap::from([(ClassPair::new(0, 1), bias_only(bias))]);
            let model = MulticlassModel::new(classes.clone(), models).unwrap();
            assert_eq!(model.predict_name(&KernelRow::new()).unwrap(), expected);
        }
    }

    #[test]
    fn test_model_requires_every_pair() {
        let models = BTreeMap::from([(ClassPair::new(0, 1), bias_only(1.0))]);
        assert!(matches!(
            MulticlassModel::new(index(&["A", "B", "C"]), models),
            Err(QsvmError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_binary_subproblem_labels() {
        let dataset = Dataset::from_classes(vec![
            ("b", vec![vec![2.0], vec![2.5]]),
            ("a", vec![vec![0.0]]),
            ("c", vec![vec![9.0]]),
        ])
        .unwrap();
        let classes = ClassLabelIndex::from_dataset(&dataset).unwrap();
        let training = TrainingSet::from_dataset(&dataset, &classes).unwrap();

        assert_eq!(training.len(), 4);
        assert_eq!(training.class_of(1), Some(1));
        assert_eq!(training.features(3), Some(&[9.0][..]));

        let problem = BinarySubproblem::new(ClassPair::new(1, 2), &training, &classes).unwrap();
        assert_eq!(problem.indices(), &[1, 2, 3]);
        assert_eq!(problem.labels(), &[1.0, 1.0, -1.0]);
        assert_eq!((problem.first_name(), problem.second_name()), ("b", "c"));
    }

    #[test]
    fn test_train_all_and_support_vector_union() {
        let dataset = Dataset::from_classes(vec![
            ("A", vec![vec![0.0, 0.0], vec![0.2, 0.1]]),
            ("B", vec![vec![5.0, 0.0], vec![4.8, 0.3]]),
            ("C", vec![vec![0.0, 5.0], vec![0.4, 4.7]]),
        ])
        .unwrap();
        let classes = ClassLabelIndex::from_dataset(&dataset).unwrap();
        let training = TrainingSet::from_dataset(&dataset, &classes).unwrap();
        let gram = KernelMatrixBuilder::new(&LinearKernel::new())
            .build(training.all_features(), training.all_features(), true)
            .unwrap();
        let trainer = SvmTrainer::new(OptimizerConfig {
            c: 10.0,
            ..OptimizerConfig::default()
        });

        let pairs = enumerate_pairs(&classes);
        let outcome = train_all(&trainer, &gram, &training, &classes, &pairs);
        assert!(outcome.is_complete());
        assert_eq!(outcome.models.len(), 3);

        let model = MulticlassModel::new(classes, outcome.models).unwrap();
        let union = model.support_vectors();
        assert!(!union.is_empty());
        for (&i, features) in &union {
            assert_eq!(training.features(i), Some(*features));
        }

        for i in 0..training.len() {
            let row: KernelRow = union.keys().map(|&j| (j, gram.get(i, j))).collect();
            assert_eq!(model.predict(&row).unwrap(), training.class_of(i).unwrap());
        }
    }

    #[test]
    fn test_train_all_collects_failures_per_pair() {
        let dataset = Dataset::from_classes(vec![
            ("A", vec![vec![0.0, 0.0], vec![1.0, 1.0]]),
            ("B", vec![vec![3.0, 0.0], vec![0.0, 3.0]]),
        ])
        .unwrap();
        let classes = ClassLabelIndex::from_dataset(&dataset).unwrap();
        let training = TrainingSet::from_dataset(&dataset, &classes).unwrap();
        let gram = KernelMatrixBuilder::new(&LinearKernel::new())
            .build(training.all_features(), training.all_features(), true)
            .unwrap();
        let trainer = SvmTrainer::new(OptimizerConfig {
            max_iterations: 0,
            ..OptimizerConfig::default()
        });

        let outcome = train_all(&trainer, &gram, &training, &classes, &enumerate_pairs(&classes));
        assert!(outcome.models.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0].error,
            QsvmError::TrainingConvergence { .. }
        ));
    }

    #[test]
    fn test_tally_fails_without_support_vector_kernel_values() {
        let sv = SupportVector {
            index: 4,
            features: vec![1.0],
            alpha: 1.0,
            label: -1.0,
        };
        let models = BTreeMap::from([(
            ClassPair::new(0, 1),
            SvmModel::from_parts(vec![sv], 0.0).unwrap(),
        )]);
        let model = MulticlassModel::new(index(&["x", "y"]), models).unwrap();
        assert!(model.tally(&KernelRow::new()).is_err());
    }
}
