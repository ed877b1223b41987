//! Distribution distances
//!
//! Measures how far a reduced sample drifts from the full test set:
//! - 1-D Wasserstein distance between empirical samples
//! - Feature-wise sum over the columns of two matrices

mod wasserstein;

pub use wasserstein::{feature_wise_wasserstein, wasserstein_distance};
