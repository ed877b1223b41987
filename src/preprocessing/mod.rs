//! Data preparation module
//!
//! Turns a raw labeled table (or pre-separated arrays) into aligned
//! train/test partitions:
//! - Column dropping and missing-row removal
//! - Categorical codes and one-hot encoding
//! - Seeded shuffling split, or train == test for diagnostic runs

mod config;
mod encoder;
mod processor;

pub use config::DataConfig;
pub use encoder::{CategoryEncoder, EncodingKind};
pub use processor::{columns_to_array2, DataProcessor, DataSplit, Dataset};
