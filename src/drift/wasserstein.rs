//! Earth mover's distance between empirical samples

use crate::error::{Result, XaiError};
use ndarray::{Array2, ArrayView1};
use std::cmp::Ordering;
use tracing::debug;

fn sorted(values: ArrayView1<f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    out
}

/// Number of entries `<= x` in a sorted slice
fn count_le(sorted: &[f64], x: f64) -> usize {
    sorted.partition_point(|&v| v <= x)
}

/// First Wasserstein distance between two 1-D samples with equal weights.
///
/// Integrates the absolute difference of the two empirical CDFs over the
/// merged support. NaN entries are ignored.
pub fn wasserstein_distance(u: ArrayView1<f64>, v: ArrayView1<f64>) -> Result<f64> {
    let u_sorted = sorted(u);
    let v_sorted = sorted(v);
    if u_sorted.is_empty() || v_sorted.is_empty() {
        return Err(XaiError::ValidationError(
            "Wasserstein distance needs two non-empty samples".to_string(),
        ));
    }

    let mut all: Vec<f64> = u_sorted.iter().chain(v_sorted.iter()).copied().collect();
    all.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let (nu, nv) = (u_sorted.len() as f64, v_sorted.len() as f64);
    let distance = all
        .windows(2)
        .map(|w| {
            let delta = w[1] - w[0];
            let u_cdf = count_le(&u_sorted, w[0]) as f64 / nu;
            let v_cdf = count_le(&v_sorted, w[0]) as f64 / nv;
            (u_cdf - v_cdf).abs() * delta
        })
        .sum();

    Ok(distance)
}

/// Sum over columns of the 1-D Wasserstein distance between matching columns
pub fn feature_wise_wasserstein(reference: &Array2<f64>, sample: &Array2<f64>) -> Result<f64> {
    debug!(
        reference_shape = ?reference.dim(),
        sample_shape = ?sample.dim(),
        "Feature-wise Wasserstein distance"
    );

    if reference.ncols() != sample.ncols() {
        return Err(XaiError::ShapeError {
            expected: format!("{} columns", reference.ncols()),
            actual: format!("{} columns", sample.ncols()),
        });
    }

    reference
        .columns()
        .into_iter()
        .zip(sample.columns())
        .map(|(a, b)| wasserstein_distance(a, b))
        .sum()
}
