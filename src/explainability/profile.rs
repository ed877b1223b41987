//! Partial dependence and accumulated local effects profiles

use crate::error::{Result, XaiError};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Profile type computed by `model_profile`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// Partial dependence: mean prediction with the variable fixed at each grid value
    Partial,
    /// Accumulated local effects over the grid intervals
    Accumulated,
}

/// Parameters of `model_profile`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileParams {
    /// Rows drawn for the profile; all rows when unset
    pub n: Option<usize>,
    pub random_state: u64,
    /// Centre accumulated effects before shifting them to the mean prediction
    pub center: bool,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            n: Some(300),
            random_state: 0,
            center: true,
        }
    }
}

impl ProfileParams {
    pub fn with_n(mut self, n: Option<usize>) -> Self {
        self.n = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub variable: String,
    pub x: f64,
    pub yhat: f64,
}

/// One profile curve, one row per grid value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub kind: ProfileKind,
    pub result: Vec<ProfileRow>,
}

impl ModelProfile {
    /// The `_yhat_` column
    pub fn yhat(&self) -> Array1<f64> {
        self.result.iter().map(|r| r.yhat).collect()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let variable: Vec<&str> = self.result.iter().map(|r| r.variable.as_str()).collect();
        let x: Vec<f64> = self.result.iter().map(|r| r.x).collect();
        let yhat: Vec<f64> = self.result.iter().map(|r| r.yhat).collect();
        Ok(df!(
            "variable" => variable,
            "x" => x,
            "_yhat_" => yhat,
        )?)
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

fn sample_rows(x: &Array2<f64>, params: &ProfileParams) -> Array2<f64> {
    match params.n {
        Some(n) if n < x.nrows() => {
            let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
            let rows = index::sample(&mut rng, x.nrows(), n).into_vec();
            x.select(Axis(0), &rows)
        }
        _ => x.clone(),
    }
}

/// Mean prediction over the rows of `x` with column `col` set to `value`
fn mean_at<F>(predict: &F, x: &Array2<f64>, col: usize, value: f64) -> Result<f64>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    let mut fixed = x.clone();
    fixed.column_mut(col).fill(value);
    Ok(predict(&fixed)?.mean().unwrap_or(0.0))
}

fn partial_dependence<F>(predict: &F, x: &Array2<f64>, col: usize, grid: &[f64]) -> Result<Vec<f64>>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    grid.iter().map(|&g| mean_at(predict, x, col, g)).collect()
}

fn accumulated_local_effects<F>(
    predict: &F,
    x: &Array2<f64>,
    col: usize,
    grid: &[f64],
    center: bool,
) -> Result<Vec<f64>>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    if grid.windows(2).any(|w| w[1] < w[0]) {
        return Err(XaiError::ValidationError("ALE grid must be non-decreasing".to_string()));
    }

    let mean_prediction = predict(x)?.mean().unwrap_or(0.0);
    let k = grid.len();
    if k == 1 {
        return Ok(vec![mean_prediction]);
    }

    // interval k covers (grid[k-1], grid[k]]; the first one also takes values
    // below grid[0] and the last one values above grid[k-1]
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &v) in x.column(col).iter().enumerate() {
        let idx = grid.partition_point(|&g| g < v).clamp(1, k - 1);
        members[idx].push(i);
    }

    let mut accumulated = vec![0.0; k];
    for interval in 1..k {
        let effect = if members[interval].is_empty() {
            0.0
        } else {
            let rows = x.select(Axis(0), &members[interval]);
            mean_at(predict, &rows, col, grid[interval])? - mean_at(predict, &rows, col, grid[interval - 1])?
        };
        accumulated[interval] = accumulated[interval - 1] + effect;
    }

    if center {
        let (weighted, count) = (1..k).fold((0.0, 0usize), |(sum, count), interval| {
            let n = members[interval].len();
            let mid = (accumulated[interval - 1] + accumulated[interval]) / 2.0;
            (sum + n as f64 * mid, count + n)
        });
        if count > 0 {
            let offset = weighted / count as f64;
            accumulated.iter_mut().for_each(|a| *a -= offset);
        }
    }

    Ok(accumulated.into_iter().map(|a| a + mean_prediction).collect())
}

/// Profile of `predict` along column `col` of `x` over `grid`
pub(crate) fn model_profile<F>(
    predict: F,
    x: &Array2<f64>,
    col: usize,
    variable: &str,
    kind: ProfileKind,
    grid: &[f64],
    params: &ProfileParams,
) -> Result<ModelProfile>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    if grid.is_empty() {
        return Err(XaiError::ValidationError("Profile grid is empty".to_string()));
    }
    if x.nrows() == 0 {
        return Err(XaiError::ValidationError("Profile needs at least one row".to_string()));
    }
    if col >= x.ncols() {
        return Err(XaiError::FeatureNotFound(variable.to_string()));
    }

    let sample = sample_rows(x, params);
    let values = match kind {
        ProfileKind::Partial => partial_dependence(&predict, &sample, col, grid)?,
        ProfileKind::Accumulated => accumulated_local_effects(&predict, &sample, col, grid, params.center)?,
    };

    let result = grid
        .iter()
        .zip(values)
        .map(|(&g, yhat)| ProfileRow {
            variable: variable.to_string(),
            x: g,
            yhat,
        })
        .collect();

    Ok(ModelProfile { kind, result })
}
