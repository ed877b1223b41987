//! Model selection and hyperparameters

use super::decision_tree::DecisionTree;
use super::linear_models::{LinearRegression, LogisticRegression};
use super::models::{Model, TaskType};
use super::random_forest::{MaxFeatures, RandomForest};
use crate::error::{Result, XaiError};
use serde::{Deserialize, Serialize};

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_n_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_logistic_alpha() -> f64 {
    1.0
}

/// Model class together with its hyperparameters.
///
/// Serialized with a `type` tag, e.g.
/// `{"type": "random_forest_classifier", "n_estimators": 50}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    DecisionTreeClassifier {
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
    },
    DecisionTreeRegressor {
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
    },
    RandomForestClassifier {
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
        #[serde(default)]
        max_features: Option<MaxFeatures>,
        #[serde(default = "default_seed")]
        random_state: u64,
    },
    RandomForestRegressor {
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
        #[serde(default)]
        max_features: Option<MaxFeatures>,
        #[serde(default = "default_seed")]
        random_state: u64,
    },
    LinearRegression {
        #[serde(default)]
        alpha: f64,
    },
    LogisticRegression {
        #[serde(default = "default_logistic_alpha")]
        alpha: f64,
    },
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::RandomForestClassifier {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            random_state: default_seed(),
        }
    }
}

impl ModelSpec {
    /// Whether the model is made of trees
    pub fn is_tree(&self) -> bool {
        !matches!(self, ModelSpec::LinearRegression { .. } | ModelSpec::LogisticRegression { .. })
    }

    pub fn task(&self) -> TaskType {
        match self {
            ModelSpec::DecisionTreeClassifier { .. }
            | ModelSpec::RandomForestClassifier { .. }
            | ModelSpec::LogisticRegression { .. } => TaskType::Classification,
            _ => TaskType::Regression,
        }
    }

    /// Instantiate an unfitted model
    pub fn build(&self) -> Result<Box<dyn Model>> {
        let model: Box<dyn Model> = match *self {
            ModelSpec::DecisionTreeClassifier { max_depth, min_samples_split, min_samples_leaf } => {
                Box::new(tree(DecisionTree::new_classifier(), max_depth, min_samples_split, min_samples_leaf))
            }
            ModelSpec::DecisionTreeRegressor { max_depth, min_samples_split, min_samples_leaf } => {
                Box::new(tree(DecisionTree::new_regressor(), max_depth, min_samples_split, min_samples_leaf))
            }
            ModelSpec::RandomForestClassifier { n_estimators, max_depth, min_samples_leaf, max_features, random_state } => {
                Box::new(forest(
                    RandomForest::new_classifier(n_estimators),
                    max_depth,
                    min_samples_leaf,
                    max_features,
                    random_state,
                )?)
            }
            ModelSpec::RandomForestRegressor { n_estimators, max_depth, min_samples_leaf, max_features, random_state } => {
                Box::new(forest(
                    RandomForest::new_regressor(n_estimators),
                    max_depth,
                    min_samples_leaf,
                    max_features,
                    random_state,
                )?)
            }
            ModelSpec::LinearRegression { alpha } => Box::new(LinearRegression::new().with_alpha(alpha)),
            ModelSpec::LogisticRegression { alpha } => Box::new(LogisticRegression::new().with_alpha(alpha)),
        };
        Ok(model)
    }
}

fn tree(base: DecisionTree, max_depth: Option<usize>, min_split: usize, min_leaf: usize) -> DecisionTree {
    let tree = base
        .with_min_samples_split(min_split)
        .with_min_samples_leaf(min_leaf);
    match max_depth {
        Some(d) => tree.with_max_depth(d),
        None => tree,
    }
}

fn forest(
    base: RandomForest,
    max_depth: Option<usize>,
    min_leaf: usize,
    max_features: Option<MaxFeatures>,
    seed: u64,
) -> Result<RandomForest> {
    if base.n_estimators == 0 {
        return Err(XaiError::ConfigError("n_estimators must be positive".to_string()));
    }
    let mut rf = base.with_min_samples_leaf(min_leaf).with_random_state(seed);
    if let Some(d) = max_depth {
        rf = rf.with_max_depth(d);
    }
    if let Some(mf) = max_features {
        rf = rf.with_max_features(mf);
    }
    Ok(rf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_json() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"type": "random_forest_regressor", "n_estimators": 7}"#).unwrap();
        match &spec {
            ModelSpec::RandomForestRegressor { n_estimators, random_state, .. } => {
                assert_eq!(*n_estimators, 7);
                assert_eq!(*random_state, 42);
            }
            other => panic!("unexpected spec {:?}", other),
        }
        assert!(spec.is_tree());
        assert_eq!(spec.task(), TaskType::Regression);
        assert_eq!(spec.build().unwrap().name(), "random_forest_regressor");
    }

    #[test]
    fn test_linear_is_not_tree() {
        let spec = ModelSpec::LinearRegression { alpha: 0.5 };
        assert!(!spec.is_tree());
        assert!(spec.build().unwrap().trees().is_none());
    }

    #[test]
    fn test_zero_trees_rejected() {
        let spec = ModelSpec::RandomForestClassifier {
            n_estimators: 0,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 1,
        };
        assert!(matches!(spec.build(), Err(XaiError::ConfigError(_))));
    }
}
