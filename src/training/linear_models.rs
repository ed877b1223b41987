//! Linear model implementations

use super::models::{Model, TaskType};
use crate::error::{Result, XaiError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a · x = b` via Cholesky.
/// A small diagonal jitter is added when the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1.0);
    for jitter in [0.0, 1e-10, 1e-8, 1e-6] {
        let mut l = Array2::<f64>::zeros((n, n));
        let mut ok = true;

        'outer: for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
                if i == j {
                    let diag = a[[i, i]] + jitter * scale - sum;
                    if diag <= 0.0 {
                        ok = false;
                        break 'outer;
                    }
                    l[[i, j]] = diag.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }
        if !ok {
            continue;
        }

        // L · y = b
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
            y[i] = (b[i] - sum) / l[[i, i]];
        }
        // Lᵀ · x = y
        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
            x[i] = (y[i] - sum) / l[[i, i]];
        }
        return Some(x);
    }

    None
}

fn check_rows(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(XaiError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(XaiError::ValidationError("Cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Least squares regression with an optional L2 penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: f64,
    /// Regularization strength (L2)
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create an ordinary least squares model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 0.0,
        }
    }

    /// Set regularization strength (Ridge regression)
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.max(0.0);
        self
    }

    /// Fit on centered data: (XᵀX + αI) w = Xᵀy
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_rows(x, y)?;

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| XaiError::ComputationError("Empty feature matrix".to_string()))?;
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - y_mean;

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..x.ncols() {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            XaiError::ComputationError("Normal equations are singular".to_string())
        })?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(XaiError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(XaiError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept)
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LinearRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearRegression::predict(self, x)
    }

    fn task(&self) -> TaskType {
        TaskType::Regression
    }

    fn name(&self) -> &str {
        "linear_regression"
    }
}

/// Binary logistic regression fitted by Newton iterations (IRLS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 penalty on the coefficients
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha: 1.0,
            max_iter: 100,
            tol: 1e-8,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.max(0.0);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    /// Fit; labels above 0.5 are the positive class
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_rows(x, y)?;
        let (n, d) = x.dim();

        // Design matrix with a leading column of ones
        let mut design = Array2::<f64>::ones((n, d + 1));
        design.slice_mut(ndarray::s![.., 1..]).assign(x);
        let target = y.mapv(|v| if v > 0.5 { 1.0 } else { 0.0 });

        let mut w = Array1::<f64>::zeros(d + 1);
        for _ in 0..self.max_iter {
            let p = design.dot(&w).mapv(sigmoid);
            let weights = p.mapv(|pi| (pi * (1.0 - pi)).max(1e-10));

            let mut gradient = design.t().dot(&(&target - &p));
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let mut hessian = design.t().dot(&weighted);
            for j in 1..=d {
                gradient[j] -= self.alpha * w[j];
                hessian[[j, j]] += self.alpha;
            }

            let step = cholesky_solve(&hessian, &gradient).ok_or_else(|| {
                XaiError::ComputationError("Hessian is singular".to_string())
            })?;
            w += &step;
            if step.iter().map(|s| s.abs()).fold(0.0, f64::max) < self.tol {
                break;
            }
        }

        self.intercept = w[0];
        self.coefficients = Some(w.slice(ndarray::s![1..]).to_owned());
        Ok(self)
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(XaiError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(XaiError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok((x.dot(coefficients) + self.intercept).mapv(sigmoid))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LogisticRegression::predict(self, x)
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn task(&self) -> TaskType {
        TaskType::Classification
    }

    fn name(&self) -> &str {
        "logistic_regression"
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_ols_recovers_plane() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [4.0, 3.0], [5.0, 4.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -v) + 3.0;

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert_abs_diff_eq!(coef[0], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(coef[1], -1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(model.intercept, 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_ridge_shrinks() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];

        let mut ols = LinearRegression::new();
        let mut ridge = LinearRegression::new().with_alpha(10.0);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();

        let w_ols = ols.coefficients.as_ref().unwrap()[0];
        let w_ridge = ridge.coefficients.as_ref().unwrap()[0];
        assert!(w_ridge < w_ols);
    }

    #[test]
    fn test_logistic_separates() {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[7] > 0.5);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(matches!(model.predict(&array![[1.0]]), Err(XaiError::ModelNotFitted)));
    }
}
