//! Explanation artifacts computed on one sample

use crate::explainability::GlobalExplainer;
use ndarray::{Array1, Array2};

/// Everything computed for one sample (full test set, random or compressed).
///
/// Optional fields are set only for stages that ran.
pub struct MetricBundle {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub shap_values: Option<Array2<f64>>,
    /// Mean absolute SHAP value per feature
    pub shap_importance: Option<Array1<f64>>,
    pub explainer: Option<GlobalExplainer>,
    /// Dropout loss per variable, variables sorted by name
    pub pvi: Option<Array1<f64>>,
    /// Variable the profiles were computed for
    pub most_important: Option<String>,
    pub pdp: Option<Array1<f64>>,
    pub ale: Option<Array1<f64>>,
}

impl MetricBundle {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Self {
        Self {
            x,
            y,
            shap_values: None,
            shap_importance: None,
            explainer: None,
            pvi: None,
            most_important: None,
            pdp: None,
            ale: None,
        }
    }

    /// Names of the artifacts present
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = vec!["x", "y"];
        let optional = [
            ("shap_values", self.shap_values.is_some()),
            ("shap_importance", self.shap_importance.is_some()),
            ("explainer", self.explainer.is_some()),
            ("pvi", self.pvi.is_some()),
            ("pdp", self.pdp.is_some()),
            ("ale", self.ale.is_some()),
        ];
        keys.extend(optional.iter().filter(|(_, present)| *present).map(|(k, _)| *k));
        keys
    }

    /// Vector artifact compared across samples, by row-column prefix
    pub fn vector(&self, name: &str) -> Option<&Array1<f64>> {
        match name {
            "svi" => self.shap_importance.as_ref(),
            "pvi" => self.pvi.as_ref(),
            "pdp" => self.pdp.as_ref(),
            "ale" => self.ale.as_ref(),
            _ => None,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }
}

impl std::fmt::Debug for MetricBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricBundle")
            .field("rows", &self.x.nrows())
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_keys_follow_present_fields() {
        let mut bundle = MetricBundle::new(array![[1.0]], array![0.0]);
        assert_eq!(bundle.keys(), vec!["x", "y"]);

        bundle.shap_values = Some(array![[0.5]]);
        bundle.shap_importance = Some(array![0.5]);
        bundle.pvi = Some(array![0.1]);
        assert_eq!(bundle.keys(), vec!["x", "y", "shap_values", "shap_importance", "pvi"]);
        assert!(bundle.vector("svi").is_some());
        assert!(bundle.vector("pdp").is_none());
        assert!(bundle.vector("other").is_none());
    }
}
