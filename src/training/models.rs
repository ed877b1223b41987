//! Model trait and evaluation metrics

use super::decision_tree::TreeNode;
use crate::error::{Result, XaiError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of supervised task a model solves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Binary classification with labels 0/1
    Classification,
    Regression,
}

/// Trait for models used by the experiments.
///
/// Models are trained once and then only read, so every method after `fit`
/// takes `&self` and implementors must be shareable across threads.
pub trait Model: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions (class labels for classifiers)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Continuous output: positive-class probability for classifiers,
    /// the prediction itself for regressors
    fn predict_score(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict(x)
    }

    fn task(&self) -> TaskType;

    /// Short human readable name
    fn name(&self) -> &str;

    /// Fitted tree structures, for models made of trees.
    /// The model output is the mean of the trees' leaf scores.
    fn trees(&self) -> Option<Vec<&TreeNode>> {
        None
    }
}

/// Metrics for model evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy (classification)
    pub accuracy: Option<f64>,
    /// Precision (classification)
    pub precision: Option<f64>,
    /// Recall (classification)
    pub recall: Option<f64>,
    /// F1 score (classification)
    pub f1: Option<f64>,
    /// Area under the ROC curve (classification)
    pub auc: Option<f64>,
    /// Mean Squared Error (regression)
    pub mse: Option<f64>,
    /// Root Mean Squared Error (regression)
    pub rmse: Option<f64>,
    /// R-squared (regression)
    pub r2: Option<f64>,
    /// Mean Absolute Error (regression)
    pub mae: Option<f64>,
    /// Median absolute error (regression)
    pub mad: Option<f64>,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute classification metrics from positive-class scores and a cutoff
    pub fn compute_classification(y_true: &Array1<f64>, y_score: &Array1<f64>, cutoff: f64) -> Self {
        let mut metrics = Self {
            n_samples: y_true.len(),
            ..Self::default()
        };
        if y_true.is_empty() {
            return metrics;
        }

        let y_pred: Array1<f64> = y_score.mapv(|s| if s > cutoff { 1.0 } else { 0.0 });
        let (tp, fp, tn, fn_) = Self::confusion_counts(y_true, &y_pred);

        metrics.accuracy = Some((tp + tn) as f64 / y_true.len() as f64);
        let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
        metrics.precision = Some(precision);
        metrics.recall = Some(recall);
        metrics.f1 = Some(if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        });
        metrics.auc = Some(roc_auc(y_true, y_score));

        metrics
    }

    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self {
            n_samples: y_true.len(),
            ..Self::default()
        };
        if y_true.is_empty() {
            return metrics;
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.mse = Some(mse);
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let mut abs_errors: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
        metrics.mad = Some(median(&mut abs_errors));

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        metrics.r2 = Some(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 });

        metrics
    }

    /// Evaluate a fitted model on labeled data
    pub fn evaluate(model: &dyn Model, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        match model.task() {
            TaskType::Classification => {
                Ok(Self::compute_classification(y, &model.predict_score(x)?, 0.5))
            }
            TaskType::Regression => Ok(Self::compute_regression(y, &model.predict(x)?)),
        }
    }

    /// Available metrics by name
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
            ("auc", self.auc),
            ("mse", self.mse),
            ("rmse", self.rmse),
            ("r2", self.r2),
            ("mae", self.mae),
            ("mad", self.mad),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect()
    }

    /// Look a metric up by name
    pub fn get(&self, name: &str) -> Result<f64> {
        self.to_map()
            .get(name)
            .copied()
            .ok_or_else(|| XaiError::MetricNotFound(name.to_string()))
    }

    fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
        let mut tp = 0;
        let mut fp = 0;
        let mut tn = 0;
        let mut fn_ = 0;

        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            match (*t > 0.5, *p > 0.5) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        (tp, fp, tn, fn_)
    }
}

/// Area under the ROC curve via the rank statistic, ties get average ranks.
/// Returns 0.5 when only one class is present.
pub fn roc_auc(y_true: &Array1<f64>, y_score: &Array1<f64>) -> f64 {
    let n = y_true.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        y_score[a]
            .partial_cmp(&y_score[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && y_score[order[j + 1]] == y_score[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let rank_sum: f64 = (0..n).filter(|&k| y_true[k] > 0.5).map(|k| ranks[k]).sum();
    (rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0) / (n_pos * n_neg) as f64
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_score = array![0.9, 0.2, 0.8, 0.4, 0.1, 0.7, 0.6, 0.3];

        let metrics = ModelMetrics::compute_classification(&y_true, &y_score, 0.5);

        assert_relative_eq!(metrics.accuracy.unwrap(), 0.75);
        assert_relative_eq!(metrics.precision.unwrap(), 0.75);
        assert_relative_eq!(metrics.recall.unwrap(), 0.75);
        // one inverted pair out of 16: (0.4 positive, 0.6 negative)
        assert_relative_eq!(metrics.auc.unwrap(), 15.0 / 16.0);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = ModelMetrics::compute_regression(&y_true, &y_pred);

        assert!(metrics.r2.unwrap() > 0.9);
        assert_relative_eq!(metrics.mad.unwrap(), 0.1, epsilon = 1e-12);
        assert!(metrics.accuracy.is_none());
    }

    #[test]
    fn test_metric_lookup() {
        let metrics = ModelMetrics::compute_regression(&array![1.0, 2.0], &array![1.0, 2.0]);
        assert_eq!(metrics.get("rmse").unwrap(), 0.0);
        assert!(matches!(metrics.get("accuracy"), Err(XaiError::MetricNotFound(_))));
    }

    #[test]
    fn test_auc_ties_and_single_class() {
        assert_relative_eq!(roc_auc(&array![0.0, 1.0], &array![0.5, 0.5]), 0.5);
        assert_relative_eq!(roc_auc(&array![1.0, 1.0], &array![0.1, 0.9]), 0.5);
    }
}
