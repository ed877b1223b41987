//! Model explainability module
//!
//! Explanation artifacts compared between full and reduced samples:
//! - SHAP values (TreeSHAP and permutation sampling)
//! - Permutation variable importance
//! - Partial dependence and accumulated local effects profiles

mod global;
mod importance;
mod profile;
mod shap;

pub use global::{ExplainerParams, GlobalExplainer, GlobalExplainerClass, ModelPerformance};
pub use importance::{LossFunction, ModelParts, PartsRow, PviParams, BASELINE, FULL_MODEL};
pub use profile::{linspace, ModelProfile, ProfileKind, ProfileParams, ProfileRow};
pub use shap::{
    mean_abs_shap, IndependentMasker, PermutationExplainer, ShapClass, ShapExplainer, ShapParams, TreeExplainer,
};
