//! Recursive compress-then-halve driver

use crate::error::{Result, XaiError};
use ndarray::{Array2, Axis};

/// Compress `x` with a halving routine and oversampling factor `g`.
///
/// The index set is split into four near-equal parts, each part is
/// compressed recursively, the results are concatenated and halved once.
/// Sets of at most `4^g` indices are returned unchanged, so for
/// `n = 4^k` rows the output has `2^g · √n` indices.
///
/// `halve` receives the selected rows and returns indices into them.
pub fn compress<F>(x: &Array2<f64>, halve: &mut F, g: u32) -> Result<Vec<usize>>
where
    F: FnMut(&Array2<f64>) -> Result<Vec<usize>>,
{
    let indices: Vec<usize> = (0..x.nrows()).collect();
    compress_indices(x, halve, g, indices)
}

fn compress_indices<F>(x: &Array2<f64>, halve: &mut F, g: u32, indices: Vec<usize>) -> Result<Vec<usize>>
where
    F: FnMut(&Array2<f64>) -> Result<Vec<usize>>,
{
    let base = 4usize.saturating_pow(g);
    if indices.len() <= base {
        return Ok(indices);
    }

    let mut merged = Vec::with_capacity(indices.len());
    for part in split_four(&indices) {
        merged.extend(compress_indices(x, halve, g, part.to_vec())?);
    }

    let rows = x.select(Axis(0), &merged);
    let halved = halve(&rows)?;
    halved
        .into_iter()
        .map(|i| {
            merged.get(i).copied().ok_or_else(|| {
                XaiError::ComputationError(format!(
                    "Halving returned index {} for {} rows",
                    i,
                    merged.len()
                ))
            })
        })
        .collect()
}

/// Four contiguous chunks, the first `len % 4` one element longer
fn split_four(indices: &[usize]) -> Vec<&[usize]> {
    let (q, r) = (indices.len() / 4, indices.len() % 4);
    let mut parts = Vec::with_capacity(4);
    let mut start = 0;
    for i in 0..4 {
        let len = q + usize::from(i < r);
        parts.push(&indices[start..start + len]);
        start += len;
    }
    parts
}
