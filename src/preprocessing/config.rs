//! Data preparation configuration

use serde::{Deserialize, Serialize};

/// Configuration for turning a raw labeled table into train/test partitions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Fraction of rows assigned to the test partition
    pub test_size: f64,

    /// Seed of the shuffling split
    pub random_state: u64,

    /// Columns removed before anything else happens
    pub to_drop: Vec<String>,

    /// Columns replaced by integer category codes
    pub to_cat: Vec<String>,

    /// Columns expanded into one indicator column per level
    pub to_one_hot: Vec<String>,

    /// Whether rows holding any missing value are removed
    pub dropna: bool,

    /// Use the whole table as both train and test partition.
    ///
    /// Only meant for diagnostic runs: every metric computed on the "test"
    /// side is then an in-sample metric and therefore optimistic.
    pub train_eq_test: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            test_size: 0.4,
            random_state: 2137,
            to_drop: Vec::new(),
            to_cat: Vec::new(),
            to_one_hot: Vec::new(),
            dropna: true,
            train_eq_test: false,
        }
    }
}

impl DataConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the test fraction
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Builder method to set the split seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Builder method to set the dropped columns
    pub fn with_drop<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.to_drop = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the category-code columns
    pub fn with_cat<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.to_cat = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the one-hot columns
    pub fn with_one_hot<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.to_one_hot = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to toggle missing-row removal
    pub fn with_dropna(mut self, dropna: bool) -> Self {
        self.dropna = dropna;
        self
    }

    /// Builder method to toggle the train == test diagnostic mode
    pub fn with_train_eq_test(mut self, train_eq_test: bool) -> Self {
        self.train_eq_test = train_eq_test;
        self
    }
}
