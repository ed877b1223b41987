//! Experiment, run and study configuration

use crate::compression::KernelSpec;
use crate::error::{Result, XaiError};
use crate::explainability::{ExplainerParams, GlobalExplainerClass, ProfileParams, PviParams, ShapClass, ShapParams};
use crate::preprocessing::DataConfig;
use crate::training::ModelSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model and explanation stages of one experiment.
///
/// Every stage is optional; a stage runs only when both its class (where
/// it has one) and its parameters are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub model: ModelSpec,
    pub shap_class: Option<ShapClass>,
    pub shap_params: Option<ShapParams>,
    /// Explain the model directly on each sample; otherwise explain its
    /// predictions over a masker built from the train partition
    pub is_tree: bool,
    pub global_class: Option<GlobalExplainerClass>,
    pub global_params: Option<ExplainerParams>,
    pub pvi_params: Option<PviParams>,
    pub pdp_params: Option<ProfileParams>,
    pub ale_params: Option<ProfileParams>,
    /// Grid resolution of PDP and ALE profiles
    pub pdp_domain: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            shap_class: None,
            shap_params: None,
            is_tree: true,
            global_class: None,
            global_params: None,
            pvi_params: None,
            pdp_params: None,
            ale_params: None,
            pdp_domain: 51,
        }
    }
}

impl ExperimentConfig {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn with_shap(mut self, class: ShapClass, params: ShapParams) -> Self {
        self.shap_class = Some(class);
        self.shap_params = Some(params);
        self
    }

    pub fn with_is_tree(mut self, is_tree: bool) -> Self {
        self.is_tree = is_tree;
        self
    }

    pub fn with_global_explainer(mut self, class: GlobalExplainerClass, params: ExplainerParams) -> Self {
        self.global_class = Some(class);
        self.global_params = Some(params);
        self
    }

    pub fn with_pvi(mut self, params: PviParams) -> Self {
        self.pvi_params = Some(params);
        self
    }

    pub fn with_pdp(mut self, params: ProfileParams) -> Self {
        self.pdp_params = Some(params);
        self
    }

    pub fn with_ale(mut self, params: ProfileParams) -> Self {
        self.ale_params = Some(params);
        self
    }

    pub fn with_pdp_domain(mut self, points: usize) -> Self {
        self.pdp_domain = points;
        self
    }

    /// Reject inconsistent stage combinations
    pub fn validate(&self) -> Result<()> {
        if self.shap_class.is_some() && self.shap_params.is_none() {
            return Err(XaiError::ConfigError("shap_class requires shap_params".to_string()));
        }
        if self.global_class.is_some() && self.global_params.is_none() {
            return Err(XaiError::ConfigError("global_class requires global_params".to_string()));
        }
        if self.pvi_params.is_some() && self.global_class.is_none() {
            return Err(XaiError::ConfigError("pvi_params require a global explainer".to_string()));
        }
        if self.pdp_params.is_some() && self.pvi_params.is_none() {
            return Err(XaiError::ConfigError("pdp_params require pvi_params".to_string()));
        }
        if self.ale_params.is_some() && self.pvi_params.is_none() {
            return Err(XaiError::ConfigError("ale_params require pvi_params".to_string()));
        }
        if self.shap_class == Some(ShapClass::Tree) {
            if !self.is_tree {
                return Err(XaiError::ConfigError(
                    "Tree SHAP explains the model directly and needs is_tree".to_string(),
                ));
            }
            if !self.model.is_tree() {
                return Err(XaiError::ConfigError(format!(
                    "Tree SHAP needs a tree model, got {:?}",
                    self.model
                )));
            }
        }
        if (self.pdp_params.is_some() || self.ale_params.is_some()) && self.pdp_domain == 0 {
            return Err(XaiError::ConfigError("pdp_domain must be positive".to_string()));
        }
        Ok(())
    }
}

/// Trial loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub n_trials: usize,
    pub kernel: KernelSpec,
    pub halving_rounds: u32,
    /// Compression oversampling factor `g`
    pub oversampling: u32,
    /// Parquet file written after the last trial
    pub output_path: Option<PathBuf>,
    /// Metric recorded as `model_performance` when a global explainer runs
    pub performance_metric: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_trials: 10,
            kernel: KernelSpec::default(),
            halving_rounds: 1,
            oversampling: 0,
            output_path: None,
            performance_metric: "accuracy".to_string(),
        }
    }
}

impl RunConfig {
    pub fn new(n_trials: usize, kernel: KernelSpec) -> Self {
        Self {
            n_trials,
            kernel,
            ..Self::default()
        }
    }

    pub fn with_halving_rounds(mut self, rounds: u32) -> Self {
        self.halving_rounds = rounds;
        self
    }

    pub fn with_oversampling(mut self, g: u32) -> Self {
        self.oversampling = g;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_performance_metric(mut self, metric: impl Into<String>) -> Self {
        self.performance_metric = metric.into();
        self
    }
}

/// A complete study: data source, preparation, experiment and run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// CSV, Parquet or JSON table
    pub data_path: PathBuf,
    /// Label column of the table
    pub target: String,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl StudyConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
        assert_eq!(ExperimentConfig::default().pdp_domain, 51);
    }

    #[test]
    fn test_class_without_params() {
        let mut config = ExperimentConfig::default();
        config.shap_class = Some(ShapClass::Tree);
        assert!(matches!(config.validate(), Err(XaiError::ConfigError(_))));

        let mut config = ExperimentConfig::default();
        config.global_class = Some(GlobalExplainerClass::Score);
        assert!(matches!(config.validate(), Err(XaiError::ConfigError(_))));
    }

    #[test]
    fn test_stage_dependencies() {
        let pvi_without_global = ExperimentConfig::default().with_pvi(PviParams::default());
        assert!(pvi_without_global.validate().is_err());

        let pdp_without_pvi = ExperimentConfig::default()
            .with_global_explainer(GlobalExplainerClass::Score, ExplainerParams::default())
            .with_pdp(ProfileParams::default());
        assert!(pdp_without_pvi.validate().is_err());

        let ale_without_pvi = ExperimentConfig::default()
            .with_global_explainer(GlobalExplainerClass::Score, ExplainerParams::default())
            .with_ale(ProfileParams::default());
        assert!(ale_without_pvi.validate().is_err());

        let full = ExperimentConfig::default()
            .with_shap(ShapClass::Tree, ShapParams::default())
            .with_global_explainer(GlobalExplainerClass::Score, ExplainerParams::default())
            .with_pvi(PviParams::default())
            .with_pdp(ProfileParams::default())
            .with_ale(ProfileParams::default());
        assert!(full.validate().is_ok());
    }

    #[test]
    fn test_tree_shap_needs_tree_model() {
        let config = ExperimentConfig::new(ModelSpec::LinearRegression { alpha: 0.0 })
            .with_shap(ShapClass::Tree, ShapParams::default());
        assert!(config.validate().is_err());

        let permutation = ExperimentConfig::new(ModelSpec::LinearRegression { alpha: 0.0 })
            .with_shap(ShapClass::Permutation, ShapParams::default())
            .with_is_tree(false);
        assert!(permutation.validate().is_ok());
    }

    #[test]
    fn test_study_from_json() {
        let json = r#"{
            "data_path": "data/adult.csv",
            "target": "income",
            "data": {"to_drop": ["fnlwgt"], "to_one_hot": ["sex"]},
            "experiment": {
                "model": {"type": "random_forest_classifier", "n_estimators": 20},
                "shap_class": "tree",
                "shap_params": {}
            },
            "run": {"n_trials": 3, "kernel": {"type": "polynomial", "degree": 3}}
        }"#;
        let study = StudyConfig::from_json(json).unwrap();
        assert_eq!(study.target, "income");
        assert_eq!(study.data.to_drop, vec!["fnlwgt".to_string()]);
        assert_eq!(study.data.test_size, 0.4);
        assert_eq!(study.run.n_trials, 3);
        assert_eq!(study.run.kernel, KernelSpec::Polynomial { degree: 3 });
        assert_eq!(study.run.performance_metric, "accuracy");
        assert!(study.experiment.validate().is_ok());
    }
}
