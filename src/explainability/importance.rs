//! Permutation variable importance

use crate::error::{Result, XaiError};
use crate::training::{roc_auc, TaskType};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Synthetic row holding the loss of the untouched model
pub const FULL_MODEL: &str = "_full_model_";
/// Synthetic row holding the loss with shuffled labels
pub const BASELINE: &str = "_baseline_";

/// Loss compared before and after permuting a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    Rmse,
    Mse,
    Mae,
    /// `1 - AUC`, for binary classifiers scored by probability
    OneMinusAuc,
}

impl LossFunction {
    pub fn default_for(task: TaskType) -> Self {
        match task {
            TaskType::Classification => LossFunction::OneMinusAuc,
            TaskType::Regression => LossFunction::Rmse,
        }
    }

    pub fn loss(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let n = y_true.len().max(1) as f64;
        match self {
            LossFunction::Rmse => LossFunction::Mse.loss(y_true, y_pred).sqrt(),
            LossFunction::Mse => {
                y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n
            }
            LossFunction::Mae => y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / n,
            LossFunction::OneMinusAuc => 1.0 - roc_auc(y_true, y_pred),
        }
    }
}

/// Parameters of `model_parts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PviParams {
    /// Task default when unset
    pub loss_function: Option<LossFunction>,
    /// Number of permutation rounds averaged
    pub b: usize,
    /// Rows drawn per round; all rows when unset
    pub n: Option<usize>,
    pub random_state: u64,
}

impl Default for PviParams {
    fn default() -> Self {
        Self {
            loss_function: None,
            b: 10,
            n: Some(1000),
            random_state: 0,
        }
    }
}

impl PviParams {
    pub fn with_loss_function(mut self, loss: LossFunction) -> Self {
        self.loss_function = Some(loss);
        self
    }

    pub fn with_b(mut self, b: usize) -> Self {
        self.b = b.max(1);
        self
    }

    pub fn with_n(mut self, n: Option<usize>) -> Self {
        self.n = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartsRow {
    pub variable: String,
    pub dropout_loss: f64,
    pub label: String,
}

/// Result of `model_parts`: `_full_model_` first, variables by increasing
/// loss, `_baseline_` last
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParts {
    pub result: Vec<PartsRow>,
    pub loss_function: LossFunction,
}

impl ModelParts {
    fn is_synthetic(variable: &str) -> bool {
        variable == FULL_MODEL || variable == BASELINE
    }

    /// Real variables and their losses, sorted by variable name
    pub fn variable_losses(&self) -> Vec<(&str, f64)> {
        let mut rows: Vec<(&str, f64)> = self
            .result
            .iter()
            .filter(|r| !Self::is_synthetic(&r.variable))
            .map(|r| (r.variable.as_str(), r.dropout_loss))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    /// Losses of `variable_losses` as a vector
    pub fn loss_vector(&self) -> Array1<f64> {
        self.variable_losses().into_iter().map(|(_, l)| l).collect()
    }

    /// Real variable with the largest loss
    pub fn most_important(&self) -> Option<&str> {
        self.result
            .iter()
            .filter(|r| !Self::is_synthetic(&r.variable))
            .last()
            .map(|r| r.variable.as_str())
    }

    pub fn full_model_loss(&self) -> Option<f64> {
        self.result.iter().find(|r| r.variable == FULL_MODEL).map(|r| r.dropout_loss)
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let variable: Vec<&str> = self.result.iter().map(|r| r.variable.as_str()).collect();
        let loss: Vec<f64> = self.result.iter().map(|r| r.dropout_loss).collect();
        let label: Vec<&str> = self.result.iter().map(|r| r.label.as_str()).collect();
        Ok(df!(
            "variable" => variable,
            "dropout_loss" => loss,
            "label" => label,
        )?)
    }
}

fn shuffled<T: Clone>(values: &[T], rng: &mut ChaCha8Rng) -> Vec<T> {
    let mut out = values.to_vec();
    out.shuffle(rng);
    out
}

/// Average loss after permuting each column, over `params.b` rounds
pub(crate) fn model_parts<F>(
    predict: F,
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    label: &str,
    loss_function: LossFunction,
    params: &PviParams,
) -> Result<ModelParts>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    if x.nrows() == 0 {
        return Err(XaiError::ValidationError("model_parts needs at least one row".to_string()));
    }
    if feature_names.len() != x.ncols() {
        return Err(XaiError::ShapeError {
            expected: format!("{} feature names", x.ncols()),
            actual: format!("{} feature names", feature_names.len()),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
    let rounds = params.b.max(1);
    let mut full = 0.0;
    let mut baseline = 0.0;
    let mut per_variable = vec![0.0; x.ncols()];

    for _ in 0..rounds {
        let (xs, ys) = match params.n {
            Some(n) if n < x.nrows() => {
                let rows = index::sample(&mut rng, x.nrows(), n).into_vec();
                (x.select(Axis(0), &rows), y.select(Axis(0), &rows))
            }
            _ => (x.clone(), y.clone()),
        };

        let preds = predict(&xs)?;
        full += loss_function.loss(&ys, &preds);

        let y_perm = Array1::from(shuffled(&ys.to_vec(), &mut rng));
        baseline += loss_function.loss(&y_perm, &preds);

        for (j, total) in per_variable.iter_mut().enumerate() {
            let column: Vec<f64> = xs.column(j).to_vec();
            let mut xp = xs.clone();
            xp.column_mut(j).assign(&Array1::from(shuffled(&column, &mut rng)));
            *total += loss_function.loss(&ys, &predict(&xp)?);
        }
    }

    let b = rounds as f64;
    let mut variables: Vec<PartsRow> = feature_names
        .iter()
        .zip(per_variable)
        .map(|(name, total)| PartsRow {
            variable: name.clone(),
            dropout_loss: total / b,
            label: label.to_string(),
        })
        .collect();
    variables.sort_by(|a, b| a.dropout_loss.partial_cmp(&b.dropout_loss).unwrap_or(Ordering::Equal));

    let mut result = Vec::with_capacity(variables.len() + 2);
    result.push(PartsRow {
        variable: FULL_MODEL.to_string(),
        dropout_loss: full / b,
        label: label.to_string(),
    });
    result.extend(variables);
    result.push(PartsRow {
        variable: BASELINE.to_string(),
        dropout_loss: baseline / b,
        label: label.to_string(),
    });

    Ok(ModelParts { result, loss_function })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn names(d: usize) -> Vec<String> {
        (0..d).map(|j| format!("x{}", j)).collect()
    }

    #[test]
    fn test_losses() {
        let t = array![1.0, 2.0, 3.0];
        let p = array![1.0, 2.0, 5.0];
        assert_relative_eq!(LossFunction::Mse.loss(&t, &p), 4.0 / 3.0);
        assert_relative_eq!(LossFunction::Rmse.loss(&t, &p), (4.0f64 / 3.0).sqrt());
        assert_relative_eq!(LossFunction::Mae.loss(&t, &p), 2.0 / 3.0);

        let labels = array![0.0, 0.0, 1.0, 1.0];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        assert_relative_eq!(LossFunction::OneMinusAuc.loss(&labels, &scores), 0.0);
    }

    #[test]
    fn test_ordering_and_most_important() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * (j + 2) + j) % 9) as f64);
        // only x2 matters, x0 a little
        let predict = |m: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(m.map_axis(Axis(1), |r| 0.1 * r[0] + 3.0 * r[2]))
        };
        let y = predict(&x).unwrap();

        let parts = model_parts(predict, &x, &y, &names(3), "m", LossFunction::Rmse, &PviParams::default()).unwrap();

        assert_eq!(parts.result.len(), 5);
        assert_eq!(parts.result[0].variable, FULL_MODEL);
        assert_eq!(parts.result[4].variable, BASELINE);
        assert_relative_eq!(parts.full_model_loss().unwrap(), 0.0);
        assert_eq!(parts.most_important(), Some("x2"));

        let by_name = parts.variable_losses();
        assert_eq!(by_name.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec!["x0", "x1", "x2"]);
        assert_relative_eq!(by_name[1].1, 0.0);
        assert_eq!(parts.loss_vector().len(), 3);
    }

    #[test]
    fn test_seeded() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i + 3 * j) % 7) as f64);
        let y = x.column(0).to_owned();
        let predict = |m: &Array2<f64>| -> Result<Array1<f64>> { Ok(m.column(0).to_owned()) };
        let params = PviParams::default().with_n(Some(20)).with_random_state(4);
        let a = model_parts(predict, &x, &y, &names(2), "m", LossFunction::Mae, &params).unwrap();
        let b = model_parts(predict, &x, &y, &names(2), "m", LossFunction::Mae, &params).unwrap();
        assert_eq!(a.result, b.result);
    }

    #[test]
    fn test_to_dataframe() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * j) as f64);
        let y = Array1::zeros(10);
        let predict = |m: &Array2<f64>| -> Result<Array1<f64>> { Ok(Array1::zeros(m.nrows())) };
        let parts = model_parts(predict, &x, &y, &names(2), "m", LossFunction::Mse, &PviParams::default()).unwrap();
        let df = parts.to_dataframe().unwrap();
        assert_eq!(df.height(), 4);
        assert_eq!(df.get_column_names().len(), 3);
    }

    #[test]
    fn test_name_count_mismatch() {
        let x = Array2::zeros((4, 2));
        let y = Array1::zeros(4);
        let predict = |m: &Array2<f64>| -> Result<Array1<f64>> { Ok(Array1::zeros(m.nrows())) };
        assert!(model_parts(predict, &x, &y, &names(3), "m", LossFunction::Mse, &PviParams::default()).is_err());
    }
}
