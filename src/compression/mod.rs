//! Distribution-preserving sample compression
//!
//! - Reproducing kernels and Gram matrices
//! - Kernel thinning (KT-SPLIT + KT-SWAP)
//! - Recursive compress-then-halve with oversampling
//!
//! The experiment harness only sees the [`Compressor`] trait: any routine
//! returning a subset of row indices can stand in for kernel thinning.

mod compress;
mod kernel;
mod thinning;

pub use compress::compress;
pub use kernel::{
    gram_matrix, kernel_gaussian, kernel_polynomial, GaussianKernel, Kernel, KernelSpec, PolynomialKernel,
};
pub use thinning::{mmd_squared, thin, ThinParams};

use crate::error::Result;
use ndarray::Array2;
use tracing::debug;

/// Index-selection oracle over the rows of a feature matrix
pub trait Compressor: Send + Sync {
    /// Select a subset of row indices of `x`, reproducibly for `seed`
    fn select(&self, x: &Array2<f64>, seed: u64) -> Result<Vec<usize>>;

    fn name(&self) -> &str {
        "compressor"
    }
}

/// Compress++ style compression with kernel thinning as the halving step
#[derive(Debug, Clone)]
pub struct KernelThinningCompressor<K: Kernel = KernelSpec> {
    kernel: K,
    halving_rounds: u32,
    oversampling: u32,
    delta: f64,
    store_k: bool,
}

impl<K: Kernel> KernelThinningCompressor<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            halving_rounds: 1,
            oversampling: 0,
            delta: 0.5,
            store_k: true,
        }
    }

    pub fn with_halving_rounds(mut self, rounds: u32) -> Self {
        self.halving_rounds = rounds;
        self
    }

    pub fn with_oversampling(mut self, g: u32) -> Self {
        self.oversampling = g;
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Evaluate kernels lazily instead of keeping Gram matrices in memory
    pub fn with_store_k(mut self, store_k: bool) -> Self {
        self.store_k = store_k;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: Kernel> Compressor for KernelThinningCompressor<K> {
    fn select(&self, x: &Array2<f64>, seed: u64) -> Result<Vec<usize>> {
        let params = ThinParams {
            m: self.halving_rounds,
            delta: self.delta,
            store_k: self.store_k,
            seed,
            unique: true,
        };
        let mut halve = |rows: &Array2<f64>| thin(rows, &self.kernel, &params);
        let selected = compress(x, &mut halve, self.oversampling)?;

        debug!(
            n = x.nrows(),
            selected = selected.len(),
            rounds = self.halving_rounds,
            oversampling = self.oversampling,
            "Compressed sample"
        );
        Ok(selected)
    }

    fn name(&self) -> &str {
        "kernel_thinning"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressor_is_seeded() {
        let x = Array2::from_shape_fn((64, 3), |(i, j)| ((i * 13 + j * 5) % 17) as f64);
        let kt = KernelThinningCompressor::new(KernelSpec::Gaussian { gamma: 0.1 });
        let a = kt.select(&x, 3).unwrap();
        let b = kt.select(&x, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_eq!(kt.name(), "kernel_thinning");
    }

    #[test]
    fn test_more_rounds_smaller_output() {
        let x = Array2::from_shape_fn((64, 2), |(i, j)| (i as f64 * 0.1).sin() + j as f64);
        let one = KernelThinningCompressor::new(GaussianKernel::default());
        let two = KernelThinningCompressor::new(GaussianKernel::default()).with_halving_rounds(2);
        assert!(two.select(&x, 0).unwrap().len() < one.select(&x, 0).unwrap().len());
    }
}
