//! Random forest classifier: training on the labelled train partition,
//! per-cell application to a predictor stack, held-out validation.
//!
//! A [`TrainedClassifier`] is immutable once built. The forecast path reuses
//! the baseline instance through an `Arc`; nothing here retrains.
pub mod metrics;
pub mod tree;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::predictors::PredictorStack;
use crate::samples::Partition;

pub use metrics::{ConfusionMatrix, ValidationMetrics};
use tree::{argmax_lowest, DecisionTree, Features, Node, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub features_per_split: usize,
    pub min_leaf_population: usize,
    /// Bootstrap sample size as a fraction of the training set.
    pub bag_fraction: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            features_per_split: 3,
            min_leaf_population: 1,
            bag_fraction: 0.5,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(LandslideError::InvalidConfig("n_trees must be at least 1".into()));
        }
        if self.features_per_split == 0 || self.min_leaf_population == 0 {
            return Err(LandslideError::InvalidConfig(
                "features_per_split and min_leaf_population must be at least 1".into(),
            ));
        }
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(LandslideError::InvalidConfig(format!(
                "bag_fraction must lie in (0, 1], got {}",
                self.bag_fraction
            )));
        }
        Ok(())
    }
}

/// Per-class vote tally for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub class: u8,
    pub votes: Vec<usize>,
    /// Share of trees voting for the winning class.
    pub confidence: f64,
}

/// A fitted forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedClassifier {
    /// Class codes seen in training, ascending. Trees predict indices into this.
    classes: Vec<u8>,
    trees: Vec<DecisionTree>,
    params: ForestParams,
    n_training: usize,
}

impl TrainedClassifier {
    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_training(&self) -> usize {
        self.n_training
    }

    /// Majority vote; ties go to the lowest class code.
    pub fn predict_with_votes(&self, f: &Features) -> Vote {
        let mut votes = vec![0usize; self.classes.len()];
        for t in &self.trees {
            votes[t.predict(f)] += 1;
        }
        let winner = argmax_lowest(&votes);
        Vote {
            class: self.classes[winner],
            confidence: votes[winner] as f64 / self.trees.len().max(1) as f64,
            votes,
        }
    }

    pub fn predict(&self, f: &Features) -> u8 {
        self.predict_with_votes(f).class
    }

    /// Hash of every fitted parameter. Equal fingerprints mean equal models.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.classes.hash(&mut h);
        for t in &self.trees {
            for node in t.nodes() {
                match node {
                    Node::Leaf { class } => (0u8, *class).hash(&mut h),
                    Node::Split { feature, threshold, left, right } => {
                        (1u8, *feature, threshold.to_bits(), *left, *right).hash(&mut h)
                    }
                }
            }
        }
        h.finish()
    }
}

/// Fit the forest on the labelled training samples. Unlabelled samples are
/// ignored; test samples are never seen.
pub fn train_classifier(partition: &Partition, params: &ForestParams) -> Result<TrainedClassifier> {
    params.validate()?;
    let labeled: Vec<(&Features, u8)> = partition.labeled_train().collect();
    if labeled.is_empty() {
        return Err(LandslideError::NoTrainingData);
    }
    let mut classes: Vec<u8> = labeled.iter().map(|(_, l)| *l).collect();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        return Err(LandslideError::InsufficientLabelDiversity { found: classes.len() });
    }

    let x: Vec<Features> = labeled.iter().map(|(f, _)| **f).collect();
    let y: Vec<usize> = labeled
        .iter()
        .map(|(_, l)| classes.binary_search(l).unwrap_or(0))
        .collect();
    let tree_params = TreeParams {
        features_per_split: params.features_per_split,
        min_leaf_population: params.min_leaf_population,
        n_classes: classes.len(),
    };
    let bag = ((params.bag_fraction * x.len() as f64).round() as usize).max(1);

    let grow = |t: usize| {
        let mut rng = StdRng::seed_from_u64(params.seed ^ (t as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let rows: Vec<usize> = (0..bag).map(|_| rng.gen_range(0..x.len())).collect();
        DecisionTree::fit(&x, &y, rows, &tree_params, &mut rng)
    };

    #[cfg(feature = "threading")]
    let trees: Vec<DecisionTree> = {
        use rayon::prelude::*;
        (0..params.n_trees).into_par_iter().map(grow).collect()
    };
    #[cfg(not(feature = "threading"))]
    let trees: Vec<DecisionTree> = (0..params.n_trees).map(grow).collect();

    let model = TrainedClassifier { classes, trees, params: params.clone(), n_training: x.len() };
    info!(
        trees = model.n_trees(),
        samples = model.n_training,
        classes = ?model.classes,
        fingerprint = model.fingerprint(),
        "classifier trained"
    );
    Ok(model)
}

/// Apply `model` to every cell. Cells with any missing predictor stay missing.
pub fn classify_stack(model: &TrainedClassifier, stack: &PredictorStack) -> RasterGrid {
    RasterGrid::from_fn(stack.geometry(), |r, c| match stack.features(r, c) {
        Some(f) => model.predict(&f) as f32,
        None => f32::NAN,
    })
}

/// Evaluate `model` on the labelled test samples only.
pub fn validate(model: &TrainedClassifier, partition: &Partition) -> ValidationMetrics {
    let pairs: Vec<(u8, u8)> = partition.labeled_test().map(|(f, l)| (l, model.predict(f))).collect();
    let metrics = ValidationMetrics::from_pairs(&pairs);
    info!(
        evaluated = metrics.evaluated,
        accuracy = ?metrics.accuracy,
        kappa = ?metrics.kappa,
        "classifier validated"
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::BAND_COUNT;
    use crate::fixtures;
    use crate::predictors::{build_predictor_stack, PredictorConfig, PredictorSources};
    use crate::samples::{extract_samples, SamplingConfig, TrainingSample};

    fn sample(id: &str, slope: f64, label: Option<u8>, split: f64) -> TrainingSample {
        let mut features = [1000.0; BAND_COUNT];
        features[1] = slope;
        TrainingSample { id: id.into(), location: crate::coords::LatLon::new(30.0, 79.0), features, label, split }
    }

    fn two_class_partition() -> Partition {
        let mut s = Vec::new();
        for i in 0..20 {
            s.push(sample(&format!("lo{i}"), 5.0 + i as f64 * 0.1, Some(1), 0.1));
            s.push(sample(&format!("hi{i}"), 40.0 + i as f64 * 0.1, Some(3), 0.1));
        }
        s.push(sample("unlabeled", 80.0, None, 0.1));
        s.push(sample("test_lo", 6.0, Some(1), 0.9));
        s.push(sample("test_hi", 41.0, Some(3), 0.9));
        Partition::new(&s, 0.7)
    }

    #[test]
    fn separable_classes_are_recovered() {
        let p = two_class_partition();
        let model = train_classifier(&p, &ForestParams::default()).unwrap();
        assert_eq!(model.classes(), &[1, 3]);
        assert_eq!(model.n_training(), 40);
        let m = validate(&model, &p);
        assert_eq!(m.evaluated, 2);
        assert_eq!(m.accuracy, Some(1.0));
    }

    #[test]
    fn training_is_deterministic() {
        let p = two_class_partition();
        let a = train_classifier(&p, &ForestParams::default()).unwrap();
        let b = train_classifier(&p, &ForestParams::default()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let other = ForestParams { seed: 7, ..ForestParams::default() };
        let c = train_classifier(&p, &other).unwrap();
        assert_eq!(c.n_trees(), 100);
    }

    #[test]
    fn single_class_training_is_refused() {
        let s: Vec<TrainingSample> = (0..10).map(|i| sample(&format!("s{i}"), i as f64, Some(2), 0.2)).collect();
        let res = train_classifier(&Partition::new(&s, 0.7), &ForestParams::default());
        assert!(matches!(res, Err(LandslideError::InsufficientLabelDiversity { found: 1 })));
    }

    #[test]
    fn unlabeled_only_is_no_training_data() {
        let s = vec![sample("a", 1.0, None, 0.1), sample("b", 2.0, None, 0.2)];
        let res = train_classifier(&Partition::new(&s, 0.7), &ForestParams::default());
        assert!(matches!(res, Err(LandslideError::NoTrainingData)));
    }

    #[test]
    fn tie_votes_go_to_lowest_class() {
        let p = two_class_partition();
        let mut model = train_classifier(&p, &ForestParams { n_trees: 2, ..ForestParams::default() }).unwrap();
        // Force one vote each.
        model.trees = vec![
            DecisionTree::fit(&[[0.0; BAND_COUNT]], &[1], vec![0], &tree_params(), &mut StdRng::seed_from_u64(0)),
            DecisionTree::fit(&[[0.0; BAND_COUNT]], &[0], vec![0], &tree_params(), &mut StdRng::seed_from_u64(0)),
        ];
        let v = model.predict_with_votes(&[0.0; BAND_COUNT]);
        assert_eq!(v.votes, vec![1, 1]);
        assert_eq!(v.class, 1);
        assert_eq!(v.confidence, 0.5);
    }

    fn tree_params() -> TreeParams {
        TreeParams { features_per_split: 3, min_leaf_population: 1, n_classes: 2 }
    }

    #[test]
    fn classified_surface_matches_stack_geometry() {
        let bundle = fixtures::bundle();
        let stack = build_predictor_stack(&PredictorSources::from(&bundle), &PredictorConfig::default()).unwrap();
        let ex = extract_samples(&fixtures::labeled_points(), &stack, &bundle.region, &SamplingConfig::default())
            .unwrap();
        let p = Partition::new(&ex.samples, 0.7);
        let model = train_classifier(&p, &ForestParams::default()).unwrap();
        let surface = classify_stack(&model, &stack);
        assert!(surface.same_geometry(stack.geometry()));
        assert_eq!(surface.valid_count(), stack.geometry().valid_count());
        for v in surface.data.iter().filter(|v| !v.is_nan()) {
            assert!([1.0, 2.0, 3.0].contains(v));
        }
        // Column bands are learnable from slope alone.
        assert_eq!(surface.value(12, 2), Some(1.0));
        assert_eq!(surface.value(12, 20), Some(3.0));
    }
}
