//! xai-thinning - explanation fidelity of compressed samples
//!
//! Measures how well model explanations computed on a small, kernel-thinned
//! subsample of a test set agree with the same explanations computed on the
//! whole test set, against a random subsample of equal size as the control.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`preprocessing`] - Column dropping, categorical encoding, train/test split
//! - [`training`] - Decision trees, random forests and linear models
//! - [`explainability`] - Tree and permutation SHAP, permutation variable importance, PDP and ALE
//! - [`compression`] - Kernels, kernel thinning and Compress++
//! - [`experiment`] - Baseline, trials and the results table
//!
//! ## Support
//! - [`drift`] - Feature-wise Wasserstein distance between samples
//! - [`utils`] - Data loading and saving
//! - [`cli`] - Command-line interface
//! - [`error`] - Error type shared by every module

pub mod error;

pub mod preprocessing;
pub mod training;
pub mod explainability;
pub mod compression;
pub mod experiment;

pub mod drift;
pub mod utils;
pub mod cli;

pub use error::{Result, XaiError};
