//! Model training module
//!
//! Reference models the experiments explain:
//! - Decision trees and Random Forests (exposing their node covers for TreeSHAP)
//! - Linear and logistic regression for the model-agnostic path
//! - Evaluation metrics for classification and regression

mod config;
mod models;
pub mod decision_tree;
pub mod linear_models;
pub mod random_forest;

pub use config::ModelSpec;
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use linear_models::{LinearRegression, LogisticRegression};
pub use models::{roc_auc, Model, ModelMetrics, TaskType};
pub use random_forest::{MaxFeatures, RandomForest};
