//! Decision tree implementation

use super::models::{Model, TaskType};
use crate::error::{Result, XaiError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decision tree node.
///
/// `n_samples` is the number of training rows that reached the node; it is
/// the cover used when computing path-dependent SHAP values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        /// Predicted label (classification) or mean target (regression)
        value: f64,
        /// Positive-class share (classification) or mean target (regression)
        score: f64,
        n_samples: usize,
    },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    /// Training rows that reached this node
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Leaf score reached by one row
    pub fn score_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { score, .. } => return *score,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn value_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if row[*feature_idx] <= *threshold {
                    left.value_row(row)
                } else {
                    right.value_row(row)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at each split (all when `None`)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed of the per-split feature draw
    pub random_state: u64,
    /// Label counted as positive in leaf scores; largest label when `None`
    pub positive_class: Option<f64>,
    n_features: usize,
    is_classification: bool,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 0,
            positive_class: None,
            n_features: 0,
            is_classification: true,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set number of features drawn per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set seed of the feature draw
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Set the label treated as positive in leaf scores
    pub fn with_positive_class(mut self, class: f64) -> Self {
        self.positive_class = Some(class);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(XaiError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(XaiError::ValidationError("Cannot fit a tree on zero rows".to_string()));
        }

        self.n_features = n_features;
        let positive = if self.is_classification {
            self.positive_class
                .unwrap_or_else(|| y.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        } else {
            0.0
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &indices, 0, positive, &mut rng);
        self.root = Some(root);

        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        positive: f64,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure(&y_subset);

        if should_stop {
            return self.make_leaf(&y_subset, positive);
        }

        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < x.ncols() => sample(rng, x.ncols(), k).into_vec(),
            _ => (0..x.ncols()).collect(),
        };

        let Some((feature, threshold, _)) = self.find_best_split(x, y, indices, &candidates) else {
            return self.make_leaf(&y_subset, positive);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, positive, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, positive, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
            impurity: self.compute_impurity(&y_subset),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        candidates: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let parent_impurity = self.compute_impurity(&y_subset);
        let n = indices.len() as f64;

        // Each candidate feature is scanned independently
        let feature_results: Vec<Option<(usize, f64, f64)>> = candidates
            .par_iter()
            .map(|&feature_idx| {
                let mut pairs: Vec<(f64, f64)> = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], y[i]))
                    .collect();
                pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let mut left = SplitStats::default();
                let mut right = SplitStats::default();
                for &(_, yi) in &pairs {
                    right.add(yi);
                }

                let mut best: Option<(f64, f64)> = None;
                for w in 0..pairs.len() - 1 {
                    let yi = pairs[w].1;
                    left.add(yi);
                    right.remove(yi);

                    let (lo, hi) = (pairs[w].0, pairs[w + 1].0);
                    if lo >= hi || left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * self.stats_impurity(&left)
                        + right.count as f64 * self.stats_impurity(&right))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(1e-12, |b| b.1) {
                        best = Some(((lo + hi) / 2.0, gain));
                    }
                }

                best.map(|(threshold, gain)| (feature_idx, threshold, gain))
            })
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .max_by(|a, b| {
                a.2.partial_cmp(&b.2)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(&a.0))
            })
    }

    fn stats_impurity(&self, stats: &SplitStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        let n = stats.count as f64;
        match self.criterion {
            Criterion::Gini => {
                1.0 - stats
                    .classes
                    .values()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -stats
                .classes
                .values()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    fn compute_impurity(&self, y: &[f64]) -> f64 {
        let mut stats = SplitStats::default();
        for &v in y {
            stats.add(v);
        }
        self.stats_impurity(&stats)
    }

    fn make_leaf(&self, y: &[f64], positive: f64) -> TreeNode {
        let n_samples = y.len();
        let mean = if y.is_empty() { 0.0 } else { y.iter().sum::<f64>() / n_samples as f64 };

        if !self.is_classification {
            return TreeNode::Leaf {
                value: mean,
                score: mean,
                n_samples,
            };
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for &val in y {
            *counts.entry(val.round() as i64).or_insert(0) += 1;
        }
        // Mode, ties broken towards the smaller label
        let value = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&class, _)| class as f64)
            .unwrap_or(0.0);
        let hits = y.iter().filter(|&&v| (v - positive).abs() < 1e-9).count();
        let score = if n_samples == 0 { 0.0 } else { hits as f64 / n_samples as f64 };

        TreeNode::Leaf {
            value,
            score,
            n_samples,
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root()?;
        self.check_width(x)?;
        Ok(x.rows().into_iter().map(|row| root.value_row(row)).collect())
    }

    /// Leaf scores: positive-class share or regression mean
    pub fn predict_score(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root()?;
        self.check_width(x)?;
        Ok(x.rows().into_iter().map(|row| root.score_row(row)).collect())
    }

    /// Root of the fitted tree
    pub fn root(&self) -> Result<&TreeNode> {
        self.root.as_ref().ok_or(XaiError::ModelNotFitted)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(XaiError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict_score(self, x)
    }

    fn task(&self) -> TaskType {
        if self.is_classification {
            TaskType::Classification
        } else {
            TaskType::Regression
        }
    }

    fn name(&self) -> &str {
        if self.is_classification {
            "decision_tree_classifier"
        } else {
            "decision_tree_regressor"
        }
    }

    fn trees(&self) -> Option<Vec<&TreeNode>> {
        self.root.as_ref().map(|root| vec![root])
    }
}

/// Running statistics of one side of a candidate split
#[derive(Default)]
struct SplitStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    classes: HashMap<i64, usize>,
}

impl SplitStats {
    fn add(&mut self, y: f64) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        *self.classes.entry(y.round() as i64).or_insert(0) += 1;
    }

    fn remove(&mut self, y: f64) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = self.classes.get_mut(&(y.round() as i64)) {
            *c -= 1;
        }
    }
}

fn is_pure(y: &[f64]) -> bool {
    match y.first() {
        None => true,
        Some(&first) => y.iter().all(|&v| (v - first).abs() < 1e-10),
    }
}
