//! Kernel thinning: split a sample into balanced coresets, keep the best one.
//!
//! `thin` runs `m` rounds of kernel halving (KT-SPLIT), each round sending
//! one point of every consecutive pair to each child coreset through a
//! self-balancing signed walk in the kernel's feature space. The candidate
//! coresets, plus plain every-`2^m`-th-point thinning, are then compared by
//! MMD to the full sample and the winner is refined by one greedy swap pass
//! (KT-SWAP).

use super::kernel::{gram_matrix, Kernel};
use crate::error::{Result, XaiError};
use ndarray::{s, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters of one thinning call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinParams {
    /// Number of halving rounds; output size is `⌊n / 2^m⌋`
    pub m: u32,
    /// Failure probability of the signed walk thresholds
    pub delta: f64,
    /// Precompute and keep the Gram matrix instead of evaluating lazily
    pub store_k: bool,
    pub seed: u64,
    /// Forbid the swap pass from selecting a point twice
    pub unique: bool,
}

impl Default for ThinParams {
    fn default() -> Self {
        Self {
            m: 1,
            delta: 0.5,
            store_k: true,
            seed: 0,
            unique: true,
        }
    }
}

impl ThinParams {
    pub fn with_rounds(mut self, m: u32) -> Self {
        self.m = m;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_store_k(mut self, store_k: bool) -> Self {
        self.store_k = store_k;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Kernel evaluations over a fixed sample, memoized or on demand
enum KernelMatrix<'a, K: Kernel + ?Sized> {
    Stored(Array2<f64>),
    Lazy { x: &'a Array2<f64>, kernel: &'a K },
}

impl<'a, K: Kernel + ?Sized> KernelMatrix<'a, K> {
    fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            KernelMatrix::Stored(k) => k[[i, j]],
            KernelMatrix::Lazy { x, kernel } => kernel.eval_pair(x.row(i), x.row(j)),
        }
    }

    fn row(&self, i: usize) -> Array1<f64> {
        match self {
            KernelMatrix::Stored(k) => k.row(i).to_owned(),
            KernelMatrix::Lazy { x, kernel } => kernel.eval(x.row(i), x.view()),
        }
    }

    fn row_means(&self, n: usize) -> Array1<f64> {
        match self {
            KernelMatrix::Stored(k) => k.rows().into_iter().map(|r| r.sum() / n as f64).collect(),
            KernelMatrix::Lazy { .. } => (0..n).map(|i| self.row(i).sum() / n as f64).collect(),
        }
    }
}

/// Thin `x` to `⌊n / 2^m⌋` rows; returns row indices into `x`.
///
/// Only the first `2^m · ⌊n / 2^m⌋` rows take part, the remainder is dropped.
/// With fewer than `2^m` rows the number of rounds is lowered to `⌊log2 n⌋`,
/// so any non-empty input keeps at least one row.
pub fn thin<K: Kernel + ?Sized>(x: &Array2<f64>, kernel: &K, params: &ThinParams) -> Result<Vec<usize>> {
    if !(params.delta > 0.0 && params.delta < 1.0) {
        return Err(XaiError::ConfigError(format!(
            "delta must lie in (0, 1), got {}",
            params.delta
        )));
    }

    let n = x.nrows();
    if n == 0 {
        return Ok(Vec::new());
    }
    let rounds = params.m.min(n.ilog2());
    if rounds == 0 {
        return Ok((0..n).collect());
    }
    let step = 1usize << rounds;
    let n_used = step * (n / step);

    let x_used = x.slice(s![..n_used, ..]).to_owned();
    let kmat = if params.store_k {
        KernelMatrix::Stored(gram_matrix(kernel, &x_used))
    } else {
        KernelMatrix::Lazy { x: &x_used, kernel }
    };

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let coresets = kt_split(&kmat, n_used, rounds, params.delta, &mut rng);
    let coreset = kt_swap(&kmat, n_used, coresets, step, params.unique);

    debug!(n, n_used, rounds, size = coreset.len(), "Kernel thinning done");
    Ok(coreset)
}

/// `m` rounds of kernel halving, giving `2^m` coresets of size `n / 2^m`
fn kt_split<K: Kernel + ?Sized>(
    kmat: &KernelMatrix<'_, K>,
    n: usize,
    m: u32,
    delta: f64,
    rng: &mut ChaCha8Rng,
) -> Vec<Vec<usize>> {
    let log_multiplier = 2.0 * (2.0 * n as f64 * m as f64 / delta).ln();
    let mut level: Vec<Vec<usize>> = vec![(0..n).collect()];

    for _ in 0..m {
        level = level
            .iter()
            .flat_map(|parent| {
                let (c0, c1) = halve_once(kmat, parent, log_multiplier, rng);
                [c0, c1]
            })
            .collect();
    }

    level
}

/// Split one coreset in two with the self-balancing walk
fn halve_once<K: Kernel + ?Sized>(
    kmat: &KernelMatrix<'_, K>,
    parent: &[usize],
    log_multiplier: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut c0 = Vec::with_capacity(parent.len() / 2);
    let mut c1 = Vec::with_capacity(parent.len() / 2);
    let mut sig_sqd = 0.0f64;

    for pair in parent.chunks_exact(2) {
        let (x1, x2) = (pair[0], pair[1]);
        let b_sqd = (kmat.get(x1, x1) + kmat.get(x2, x2) - 2.0 * kmat.get(x1, x2)).max(0.0);

        // inner product of the running walk with k(x1, .) - k(x2, .)
        let alpha: f64 = c0.iter().map(|&y| kmat.get(y, x1) - kmat.get(y, x2)).sum::<f64>()
            - c1.iter().map(|&y| kmat.get(y, x1) - kmat.get(y, x2)).sum::<f64>();

        let thresh = (b_sqd.sqrt() * sig_sqd.sqrt() * log_multiplier.sqrt()).max(b_sqd);
        let prob_x1 = if thresh > 0.0 {
            (0.5 * (1.0 - alpha / thresh)).clamp(0.0, 1.0)
        } else {
            0.5
        };

        if rng.gen::<f64>() <= prob_x1 {
            c0.push(x1);
            c1.push(x2);
        } else {
            c0.push(x2);
            c1.push(x1);
        }

        if thresh > 0.0 {
            sig_sqd += b_sqd * (1.0 + (b_sqd - 2.0 * thresh) * sig_sqd / (thresh * thresh)).max(0.0);
        }
    }

    (c0, c1)
}

/// MMD² of a coreset against the full sample, without the constant term
fn relative_mmd<K: Kernel + ?Sized>(kmat: &KernelMatrix<'_, K>, coreset: &[usize], mean_k: &Array1<f64>) -> f64 {
    let s = coreset.len() as f64;
    let within: f64 = coreset
        .iter()
        .map(|&i| coreset.iter().map(|&j| kmat.get(i, j)).sum::<f64>())
        .sum();
    let cross: f64 = coreset.iter().map(|&i| mean_k[i]).sum();
    within / (s * s) - 2.0 * cross / s
}

/// Pick the best candidate coreset and refine it with greedy swaps
fn kt_swap<K: Kernel + ?Sized>(
    kmat: &KernelMatrix<'_, K>,
    n: usize,
    mut candidates: Vec<Vec<usize>>,
    step: usize,
    unique: bool,
) -> Vec<usize> {
    let mean_k = kmat.row_means(n);
    candidates.push((step - 1..n).step_by(step).collect());

    let mut coreset = candidates
        .into_iter()
        .map(|c| (relative_mmd(kmat, &c, &mean_k), c))
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c)
        .unwrap_or_default();

    let s = coreset.len() as f64;
    if coreset.is_empty() {
        return coreset;
    }

    let diag: Array1<f64> = (0..n).map(|i| kmat.get(i, i)).collect();
    let mut stat: Array1<f64> = -&mean_k;
    let mut in_coreset = vec![0usize; n];
    for &c in &coreset {
        stat.scaled_add(1.0 / s, &kmat.row(c));
        in_coreset[c] += 1;
    }

    for pos in 0..coreset.len() {
        let current = coreset[pos];
        stat.scaled_add(-1.0 / s, &kmat.row(current));
        in_coreset[current] -= 1;

        let mut best = current;
        let mut best_score = f64::INFINITY;
        for z in 0..n {
            if unique && in_coreset[z] > 0 {
                continue;
            }
            let score = stat[z] + diag[z] / (2.0 * s);
            if score < best_score {
                best_score = score;
                best = z;
            }
        }

        coreset[pos] = best;
        stat.scaled_add(1.0 / s, &kmat.row(best));
        in_coreset[best] += 1;
    }

    coreset
}

/// Squared maximum mean discrepancy between `x` and the rows `coreset` of `x`
pub fn mmd_squared<K: Kernel + ?Sized>(x: &Array2<f64>, coreset: &[usize], kernel: &K) -> f64 {
    let n = x.nrows();
    if n == 0 || coreset.is_empty() {
        return 0.0;
    }
    let k = gram_matrix(kernel, x);
    let kmat: KernelMatrix<'_, K> = KernelMatrix::Stored(k);
    let mean_k = kmat.row_means(n);
    let total = mean_k.sum() / n as f64;
    (relative_mmd(&kmat, coreset, &mean_k) + total).max(0.0)
}
