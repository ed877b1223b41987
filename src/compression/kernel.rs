//! Reproducing kernels used by kernel thinning

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A kernel evaluated between one point and a batch of points.
///
/// `eval(y, x)` returns `k(y, x_i)` for every row `x_i` of `x`. Any closure
/// with the same signature is a kernel too.
pub trait Kernel: Send + Sync {
    fn eval(&self, y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64>;

    /// Kernel value between two points
    fn eval_pair(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        self.eval(a, b.insert_axis(Axis(0)))[0]
    }
}

impl<F> Kernel for F
where
    F: Fn(ArrayView1<f64>, ArrayView2<f64>) -> Array1<f64> + Send + Sync,
{
    fn eval(&self, y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64> {
        self(y, x)
    }
}

/// `(⟨x, y⟩ + 1)^degree`
pub fn kernel_polynomial(y: ArrayView1<f64>, x: ArrayView2<f64>, degree: u32) -> Array1<f64> {
    x.dot(&y).mapv(|v| (v + 1.0).powi(degree as i32))
}

/// `exp(-γ ‖x - y‖² / 2)`
pub fn kernel_gaussian(y: ArrayView1<f64>, x: ArrayView2<f64>, gamma: f64) -> Array1<f64> {
    x.rows()
        .into_iter()
        .map(|row| {
            let sq_dist: f64 = row.iter().zip(y.iter()).map(|(&a, &b)| (a - b).powi(2)).sum();
            (-gamma * sq_dist / 2.0).exp()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolynomialKernel {
    pub degree: u32,
}

impl Default for PolynomialKernel {
    fn default() -> Self {
        Self { degree: 2 }
    }
}

impl Kernel for PolynomialKernel {
    fn eval(&self, y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64> {
        kernel_polynomial(y, x, self.degree)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianKernel {
    /// Inverse squared bandwidth
    pub gamma: f64,
}

impl Default for GaussianKernel {
    fn default() -> Self {
        Self { gamma: 1.0 }
    }
}

impl Kernel for GaussianKernel {
    fn eval(&self, y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64> {
        kernel_gaussian(y, x, self.gamma)
    }
}

/// Serializable kernel choice for configuration files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelSpec {
    Polynomial {
        #[serde(default = "default_degree")]
        degree: u32,
    },
    Gaussian {
        #[serde(default = "default_gamma")]
        gamma: f64,
    },
}

fn default_degree() -> u32 {
    2
}

fn default_gamma() -> f64 {
    1.0
}

impl Default for KernelSpec {
    fn default() -> Self {
        KernelSpec::Gaussian { gamma: 1.0 }
    }
}

impl Kernel for KernelSpec {
    fn eval(&self, y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64> {
        match *self {
            KernelSpec::Polynomial { degree } => kernel_polynomial(y, x, degree),
            KernelSpec::Gaussian { gamma } => kernel_gaussian(y, x, gamma),
        }
    }
}

/// Full Gram matrix `K[i, j] = k(x_i, x_j)`, rows computed in parallel
pub fn gram_matrix<K: Kernel + ?Sized>(kernel: &K, x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let rows: Vec<Array1<f64>> = (0..n)
        .into_par_iter()
        .map(|i| kernel.eval(x.row(i), x.view()))
        .collect();

    let mut k = Array2::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        k.row_mut(i).assign(&row);
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_polynomial_values() {
        let x = array![[1.0, 2.0], [0.0, 0.0]];
        let y = array![3.0, -1.0];
        let k = PolynomialKernel::default().eval(y.view(), x.view());
        // <(1,2),(3,-1)> = 1 -> (1+1)^2 = 4 ; origin -> 1
        assert_eq!(k, array![4.0, 1.0]);
    }

    #[test]
    fn test_gaussian_values() {
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0];
        let k = GaussianKernel { gamma: 2.0 }.eval(y.view(), x.view());
        assert_relative_eq!(k[0], 1.0);
        assert_relative_eq!(k[1], (-2.0f64).exp());
    }

    #[test]
    fn test_plain_function_is_kernel() {
        fn linear(y: ArrayView1<f64>, x: ArrayView2<f64>) -> Array1<f64> {
            x.dot(&y)
        }
        let a = array![1.0, 2.0];
        let b = array![3.0, 4.0];
        assert_eq!(linear.eval_pair(a.view(), b.view()), 11.0);
    }

    #[test]
    fn test_gram_matrix_symmetric() {
        let x = array![[0.0, 1.0], [2.0, -1.0], [0.5, 0.5]];
        let spec = KernelSpec::Gaussian { gamma: 0.5 };
        let k = gram_matrix(&spec, &x);
        for i in 0..3 {
            assert_relative_eq!(k[[i, i]], 1.0);
            for j in 0..3 {
                assert_relative_eq!(k[[i, j]], k[[j, i]]);
            }
        }
    }

    #[test]
    fn test_spec_json() {
        let spec: KernelSpec = serde_json::from_str(r#"{"type": "polynomial"}"#).unwrap();
        assert_eq!(spec, KernelSpec::Polynomial { degree: 2 });
    }
}
