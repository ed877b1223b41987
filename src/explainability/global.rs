//! Dataset-level explainer wrapping a fitted model and a labeled sample

use super::importance::{self, LossFunction, ModelParts, PviParams};
use super::profile::{self, ModelProfile, ProfileKind, ProfileParams};
use crate::error::{Result, XaiError};
use crate::training::{Model, ModelMetrics, TaskType};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Model output the global explainer works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalExplainerClass {
    /// `predict_score`: positive-class probability for classifiers
    #[default]
    Score,
    /// `predict`: class labels for classifiers
    Prediction,
}

/// Construction parameters of a [`GlobalExplainer`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerParams {
    /// Name attached to result rows; the model name when unset
    pub label: Option<String>,
    /// Overrides the model's own task type
    pub model_type: Option<TaskType>,
}

impl ExplainerParams {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Named performance metrics of the explained model on its sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub result: BTreeMap<String, f64>,
}

impl ModelPerformance {
    pub fn get(&self, metric: &str) -> Result<f64> {
        self.result
            .get(metric)
            .copied()
            .ok_or_else(|| XaiError::MetricNotFound(metric.to_string()))
    }
}

pub struct GlobalExplainer {
    model: Arc<dyn Model>,
    x: Array2<f64>,
    y: Array1<f64>,
    feature_names: Vec<String>,
    label: String,
    task: TaskType,
    class: GlobalExplainerClass,
}

impl GlobalExplainer {
    pub fn new(
        model: Arc<dyn Model>,
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
        class: GlobalExplainerClass,
        params: &ExplainerParams,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(XaiError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(XaiError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        let label = params.label.clone().unwrap_or_else(|| model.name().to_string());
        let task = params.model_type.unwrap_or_else(|| model.task());
        debug!(label = %label, rows = x.nrows(), ?task, "Global explainer created");

        Ok(Self {
            model,
            x,
            y,
            feature_names,
            label,
            task,
            class,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    /// Explained model output on arbitrary rows
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self.class {
            GlobalExplainerClass::Score => self.model.predict_score(x),
            GlobalExplainerClass::Prediction => self.model.predict(x),
        }
    }

    /// Permutation variable importance
    pub fn model_parts(&self, params: &PviParams) -> Result<ModelParts> {
        let loss = params.loss_function.unwrap_or_else(|| LossFunction::default_for(self.task));
        importance::model_parts(
            |m| self.predict(m),
            &self.x,
            &self.y,
            &self.feature_names,
            &self.label,
            loss,
            params,
        )
    }

    /// Partial dependence or accumulated local effects of `variable` on `grid`
    pub fn model_profile(
        &self,
        kind: ProfileKind,
        params: &ProfileParams,
        variable: &str,
        grid: &[f64],
    ) -> Result<ModelProfile> {
        let col = self
            .feature_names
            .iter()
            .position(|n| n == variable)
            .ok_or_else(|| XaiError::FeatureNotFound(variable.to_string()))?;
        profile::model_profile(|m| self.predict(m), &self.x, col, variable, kind, grid, params)
    }

    pub fn model_performance(&self) -> Result<ModelPerformance> {
        let preds = self.predict(&self.x)?;
        let metrics = match self.task {
            TaskType::Classification => ModelMetrics::compute_classification(&self.y, &preds, 0.5),
            TaskType::Regression => ModelMetrics::compute_regression(&self.y, &preds),
        };
        Ok(ModelPerformance { result: metrics.to_map() })
    }
}
