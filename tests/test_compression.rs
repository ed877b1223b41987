//! Integration tests for kernel thinning and compression

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use xai_thinning::compression::{
    compress, kernel_gaussian, mmd_squared, thin, Compressor, GaussianKernel, KernelSpec,
    KernelThinningCompressor, PolynomialKernel, ThinParams,
};

fn gaussian_cloud(n: usize, d: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    // sum of uniforms is close enough to normal for these checks
    Array2::from_shape_fn((n, d), |_| (0..6).map(|_| rng.gen::<f64>()).sum::<f64>() - 3.0)
}

fn is_distinct(indices: &[usize]) -> bool {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len() == indices.len()
}

#[test]
fn test_compressed_size_follows_oversampling() {
    let x = gaussian_cloud(256, 3, 1);
    let kernel = GaussianKernel { gamma: 0.5 };

    for (g, expected) in [(0, 16), (1, 32), (2, 64)] {
        let compressor = KernelThinningCompressor::new(kernel).with_oversampling(g);
        let selected = compressor.select(&x, 0).unwrap();
        assert_eq!(selected.len(), expected, "g = {}", g);
        assert!(is_distinct(&selected));
        assert!(selected.iter().all(|&i| i < 256));
    }
}

#[test]
fn test_compressor_is_reproducible_per_seed() {
    let x = gaussian_cloud(128, 2, 2);
    let compressor = KernelThinningCompressor::new(KernelSpec::Polynomial { degree: 2 }).with_oversampling(1);

    let a = compressor.select(&x, 5).unwrap();
    let b = compressor.select(&x, 5).unwrap();
    assert_eq!(a, b);
    assert_eq!(compressor.name(), "kernel_thinning");
}

#[test]
fn test_lazy_kernel_matches_stored() {
    let x = gaussian_cloud(64, 2, 3);
    let stored = KernelThinningCompressor::new(GaussianKernel::default()).with_oversampling(1);
    let lazy = KernelThinningCompressor::new(GaussianKernel::default())
        .with_oversampling(1)
        .with_store_k(false);
    assert_eq!(stored.select(&x, 9).unwrap(), lazy.select(&x, 9).unwrap());
}

#[test]
fn test_closure_kernel() {
    let x = gaussian_cloud(64, 2, 4);
    let kernel = |y: ArrayView1<f64>, x: ArrayView2<f64>| kernel_gaussian(y, x, 2.0);
    let compressor = KernelThinningCompressor::new(kernel);
    let selected = compressor.select(&x, 0).unwrap();
    assert_eq!(selected.len(), 8);
}

#[test]
fn test_thinning_beats_uniform_subsample() {
    let x = gaussian_cloud(512, 2, 5);
    let kernel = GaussianKernel { gamma: 1.0 };
    let params = ThinParams::default().with_rounds(4);

    let thinned = thin(&x, &kernel, &params).unwrap();
    assert_eq!(thinned.len(), 32);
    let thinned_mmd = mmd_squared(&x, &thinned, &kernel);

    // averaged over several uniform draws of the same size
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let uniform_mmd: f64 = (0..10)
        .map(|_| {
            let idx = rand::seq::index::sample(&mut rng, 512, 32).into_vec();
            mmd_squared(&x, &idx, &kernel)
        })
        .sum::<f64>()
        / 10.0;

    assert!(thinned_mmd < uniform_mmd, "{} >= {}", thinned_mmd, uniform_mmd);
}

#[test]
fn test_compress_with_custom_halving() {
    let x = gaussian_cloud(64, 1, 6);
    // keep every other row
    let mut halve = |rows: &Array2<f64>| -> xai_thinning::Result<Vec<usize>> {
        Ok((0..rows.nrows()).step_by(2).collect())
    };
    let selected = compress(&x, &mut halve, 0).unwrap();
    assert_eq!(selected.len(), 8);
    assert!(is_distinct(&selected));
}

#[test]
fn test_polynomial_kernel_compressor() {
    let x = gaussian_cloud(100, 4, 7);
    let compressor = KernelThinningCompressor::new(PolynomialKernel { degree: 3 });
    let selected = compressor.select(&x, 1).unwrap();
    assert!(!selected.is_empty());
    assert!(selected.len() <= 10);
    assert!(is_distinct(&selected));
}
