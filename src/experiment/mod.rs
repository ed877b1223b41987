//! Explanation-fidelity experiments
//!
//! An [`Experiment`] trains one model, explains the full test partition once
//! and then, for every seed, compares those explanations with the ones
//! computed on a compressed sample and on a random sample of the same size.

mod config;
mod harness;
mod metrics;
mod results;
mod timing;

pub use config::{ExperimentConfig, RunConfig, StudyConfig};
pub use harness::{Experiment, Trial, BASELINE_LABEL};
pub use metrics::MetricBundle;
pub use results::{build_row, ResultRow, ResultsTable};
pub use timing::TimingTable;
