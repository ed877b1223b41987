//! SHAP value explainers
//!
//! - [`TreeExplainer`]: exact path-dependent TreeSHAP over fitted trees
//! - [`PermutationExplainer`]: antithetic permutation sampling over an
//!   [`IndependentMasker`] background, for any model

use crate::error::{Result, XaiError};
use crate::training::{Model, TreeNode};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-row additive feature attributions
pub trait ShapExplainer: Send + Sync {
    /// SHAP values, one row per input row and one column per feature
    fn shap_values(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Expected model output the attributions are relative to
    fn expected_value(&self) -> f64;
}

/// Which SHAP algorithm to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapClass {
    Tree,
    Permutation,
}

/// SHAP explainer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapParams {
    /// Permutations per explained row (each also run in reverse)
    pub n_permutations: usize,
    pub seed: u64,
    /// Cap on background rows kept by the masker
    pub max_background: usize,
}

impl Default for ShapParams {
    fn default() -> Self {
        Self {
            n_permutations: 10,
            seed: 0,
            max_background: 100,
        }
    }
}

impl ShapParams {
    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_background(mut self, n: usize) -> Self {
        self.max_background = n.max(1);
        self
    }
}

/// Mean absolute SHAP value per feature
pub fn mean_abs_shap(values: &Array2<f64>) -> Array1<f64> {
    values
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(values.ncols()))
}

// ---------------------------------------------------------------------------
// TreeSHAP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum FlatNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Tree in array form with per-node covers
#[derive(Debug, Clone)]
struct FlatTree {
    nodes: Vec<FlatNode>,
    covers: Vec<f64>,
}

impl FlatTree {
    fn from_node(root: &TreeNode) -> Self {
        let mut tree = FlatTree {
            nodes: Vec::new(),
            covers: Vec::new(),
        };
        tree.push(root);
        tree
    }

    fn push(&mut self, node: &TreeNode) -> usize {
        let idx = self.nodes.len();
        self.covers.push(node.n_samples() as f64);
        match node {
            TreeNode::Leaf { score, .. } => self.nodes.push(FlatNode::Leaf { value: *score }),
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                // placeholder until the children are numbered
                self.nodes.push(FlatNode::Leaf { value: 0.0 });
                let l = self.push(left);
                let r = self.push(right);
                self.nodes[idx] = FlatNode::Split {
                    feature: *feature_idx,
                    threshold: *threshold,
                    left: l,
                    right: r,
                };
            }
        }
        idx
    }

    fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                FlatNode::Split { feature, .. } => Some(*feature),
                FlatNode::Leaf { .. } => None,
            })
            .max()
    }

    /// Replace training covers by the number of background rows reaching each node
    fn recount_covers(&mut self, background: &Array2<f64>) {
        self.covers.iter_mut().for_each(|c| *c = 0.0);
        for row in background.rows() {
            let mut node = 0;
            loop {
                self.covers[node] += 1.0;
                match self.nodes[node] {
                    FlatNode::Leaf { .. } => break,
                    FlatNode::Split { feature, threshold, left, right } => {
                        node = if row[feature] <= threshold { left } else { right };
                    }
                }
            }
        }
    }

    /// Share of `parent`'s cover flowing into `child`; even split when empty
    fn fraction(&self, parent: usize, child: usize) -> f64 {
        if self.covers[parent] > 0.0 {
            self.covers[child] / self.covers[parent]
        } else {
            0.5
        }
    }

    fn expected_value(&self, node: usize) -> f64 {
        match self.nodes[node] {
            FlatNode::Leaf { value } => value,
            FlatNode::Split { left, right, .. } => {
                self.fraction(node, left) * self.expected_value(left)
                    + self.fraction(node, right) * self.expected_value(right)
            }
        }
    }

    fn shap_row(&self, x: ArrayView1<f64>, phi: &mut [f64]) {
        self.recurse(0, x, phi, &[], 1.0, 1.0, None);
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &self,
        node: usize,
        x: ArrayView1<f64>,
        phi: &mut [f64],
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = parent_path.to_vec();
        extend_path(&mut path, zero_fraction, one_fraction, feature);
        let mut depth = path.len() - 1;

        match self.nodes[node] {
            FlatNode::Leaf { value } => {
                for i in 1..=depth {
                    let w = unwound_path_sum(&path, depth, i);
                    let el = &path[i];
                    if let Some(f) = el.feature {
                        phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            FlatNode::Split { feature: split, threshold, left, right } => {
                let (hot, cold) = if x[split] <= threshold { (left, right) } else { (right, left) };

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = (1..=depth).find(|&k| path[k].feature == Some(split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, depth, k);
                    depth -= 1;
                    path.truncate(depth + 1);
                }

                let hot_zero = self.fraction(node, hot);
                let cold_zero = self.fraction(node, cold);
                self.recurse(hot, x, phi, &path, hot_zero * incoming_zero, incoming_one, Some(split));
                self.recurse(cold, x, phi, &path, cold_zero * incoming_zero, 0.0, Some(split));
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let d = depth as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i as f64 + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - i as f64) / (d + 1.0);
    }
}

fn unwind_path(path: &mut [PathElement], depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (d + 1.0) / ((i as f64 + 1.0) * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (d - i as f64) / (d + 1.0);
        } else {
            path[i].pweight = path[i].pweight * (d + 1.0) / (zero_fraction * (d - i as f64));
        }
    }

    for i in path_index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

fn unwound_path_sum(path: &[PathElement], depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((i as f64 + 1.0) * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (d - i as f64) / (d + 1.0);
        } else if zero_fraction != 0.0 {
            total += (path[i].pweight / zero_fraction) / ((d - i as f64) / (d + 1.0));
        }
    }

    total
}

/// Exact TreeSHAP for tree models; the explained output is the mean leaf score
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    trees: Vec<FlatTree>,
    expected_value: f64,
}

impl TreeExplainer {
    /// Build from a fitted tree model. With `background`, node covers are
    /// counted on those rows instead of the training rows.
    pub fn new(model: &dyn Model, background: Option<&Array2<f64>>) -> Result<Self> {
        let roots = model.trees().ok_or_else(|| {
            XaiError::ConfigError(format!("Tree SHAP needs a tree model, got '{}'", model.name()))
        })?;
        if roots.is_empty() {
            return Err(XaiError::ModelNotFitted);
        }

        let mut trees: Vec<FlatTree> = roots.into_iter().map(FlatTree::from_node).collect();
        if let Some(bg) = background {
            if let Some(max_feature) = trees.iter().filter_map(FlatTree::max_feature).max() {
                if max_feature >= bg.ncols() {
                    return Err(XaiError::ShapeError {
                        expected: format!("more than {} columns", max_feature),
                        actual: format!("{} columns", bg.ncols()),
                    });
                }
            }
            trees.iter_mut().for_each(|t| t.recount_covers(bg));
        }

        let expected_value =
            trees.iter().map(|t| t.expected_value(0)).sum::<f64>() / trees.len() as f64;

        Ok(Self { trees, expected_value })
    }
}

impl ShapExplainer for TreeExplainer {
    fn shap_values(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if let Some(max_feature) = self.trees.iter().filter_map(FlatTree::max_feature).max() {
            if max_feature >= x.ncols() {
                return Err(XaiError::ShapeError {
                    expected: format!("more than {} columns", max_feature),
                    actual: format!("{} columns", x.ncols()),
                });
            }
        }

        let n_trees = self.trees.len() as f64;
        let mut values: Array2<f64> = Array2::zeros(x.dim());
        for (row, mut out) in x.rows().into_iter().zip(values.rows_mut()) {
            let mut phi = vec![0.0; x.ncols()];
            for tree in &self.trees {
                tree.shap_row(row, &mut phi);
            }
            for (o, p) in out.iter_mut().zip(phi) {
                *o = p / n_trees;
            }
        }
        Ok(values)
    }

    fn expected_value(&self) -> f64 {
        self.expected_value
    }
}

// ---------------------------------------------------------------------------
// Permutation SHAP
// ---------------------------------------------------------------------------

/// Background rows that stand in for features outside a coalition
#[derive(Debug, Clone)]
pub struct IndependentMasker {
    background: Array2<f64>,
}

impl IndependentMasker {
    /// Keep at most `max_samples` rows of `data`, drawn without replacement
    pub fn new(data: &Array2<f64>, max_samples: usize, seed: u64) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(XaiError::DataError("Masker needs background rows".to_string()));
        }
        let background = if data.nrows() > max_samples {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let rows = index::sample(&mut rng, data.nrows(), max_samples).into_vec();
            data.select(Axis(0), &rows)
        } else {
            data.clone()
        };
        Ok(Self { background })
    }

    pub fn background(&self) -> &Array2<f64> {
        &self.background
    }

    /// Background copies with `row`'s values on the `on` features
    fn masked(&self, row: ArrayView1<f64>, on: &[bool]) -> Array2<f64> {
        let mut out = self.background.clone();
        for (j, &keep) in on.iter().enumerate() {
            if keep {
                out.column_mut(j).fill(row[j]);
            }
        }
        out
    }
}

/// Model-agnostic Shapley values by antithetic permutation sampling.
///
/// Every permutation is walked forward and backward; marginal
/// contributions telescope, so each row's values sum to
/// `f(x) - mean f(background)` exactly.
pub struct PermutationExplainer {
    model: Arc<dyn Model>,
    masker: IndependentMasker,
    n_permutations: usize,
    seed: u64,
    expected_value: f64,
}

impl PermutationExplainer {
    pub fn new(model: Arc<dyn Model>, masker: IndependentMasker, params: &ShapParams) -> Result<Self> {
        let expected_value = model
            .predict(masker.background())?
            .mean()
            .ok_or_else(|| XaiError::ComputationError("Empty background".to_string()))?;
        Ok(Self {
            model,
            masker,
            n_permutations: params.n_permutations.max(1),
            seed: params.seed,
            expected_value,
        })
    }

    /// Mean model output for each coalition along one feature ordering
    fn coalition_values(&self, row: ArrayView1<f64>, order: &[usize]) -> Result<Vec<f64>> {
        let d = order.len();
        let n_bg = self.masker.background.nrows();
        let mut on = vec![false; d];

        let mut batch: Array2<f64> = Array2::zeros(((d + 1) * n_bg, d));
        for step in 0..=d {
            if step > 0 {
                on[order[step - 1]] = true;
            }
            batch
                .slice_mut(ndarray::s![step * n_bg..(step + 1) * n_bg, ..])
                .assign(&self.masker.masked(row, &on));
        }

        let preds = self.model.predict(&batch)?;
        Ok((0..=d)
            .map(|step| preds.slice(ndarray::s![step * n_bg..(step + 1) * n_bg]).sum() / n_bg as f64)
            .collect())
    }
}

impl ShapExplainer for PermutationExplainer {
    fn shap_values(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let d = self.masker.background.ncols();
        if x.ncols() != d {
            return Err(XaiError::ShapeError {
                expected: format!("{} columns", d),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut values: Array2<f64> = Array2::zeros(x.dim());
        let n_walks = 2.0 * self.n_permutations as f64;

        for (row, mut out) in x.rows().into_iter().zip(values.rows_mut()) {
            for _ in 0..self.n_permutations {
                let mut order: Vec<usize> = (0..d).collect();
                order.shuffle(&mut rng);

                for walk in [order.clone(), order.into_iter().rev().collect::<Vec<_>>()] {
                    let v = self.coalition_values(row, &walk)?;
                    for (k, &feature) in walk.iter().enumerate() {
                        out[feature] += (v[k + 1] - v[k]) / n_walks;
                    }
                }
            }
        }

        Ok(values)
    }

    fn expected_value(&self) -> f64 {
        self.expected_value
    }
}
