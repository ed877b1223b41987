//! Raw table to train/test partitions

use super::config::DataConfig;
use super::encoder::{CategoryEncoder, EncodingKind};
use crate::error::{Result, XaiError};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Feature matrix and labels that always travel together.
///
/// `row_ids` holds the position of every row in the table the dataset was
/// built from, so subsets produced by compression or random sampling can be
/// traced back to the source rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub target: Array1<f64>,
    pub feature_names: Vec<String>,
    pub row_ids: Vec<usize>,
}

impl Dataset {
    /// Build a dataset with row ids `0..n`
    pub fn new(features: Array2<f64>, target: Array1<f64>, feature_names: Vec<String>) -> Result<Self> {
        let row_ids = (0..features.nrows()).collect();
        Self::with_row_ids(features, target, feature_names, row_ids)
    }

    /// Build a dataset with explicit row ids
    pub fn with_row_ids(
        features: Array2<f64>,
        target: Array1<f64>,
        feature_names: Vec<String>,
        row_ids: Vec<usize>,
    ) -> Result<Self> {
        if features.nrows() != target.len() || features.nrows() != row_ids.len() {
            return Err(XaiError::ShapeError {
                expected: format!("{} labels and row ids", features.nrows()),
                actual: format!("{} labels, {} row ids", target.len(), row_ids.len()),
            });
        }
        if features.ncols() != feature_names.len() {
            return Err(XaiError::ShapeError {
                expected: format!("{} feature names", features.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        Ok(Self {
            features,
            target,
            feature_names,
            row_ids,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Rows at `indices`, with labels and row ids kept aligned
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(XaiError::ValidationError(format!(
                "row index {} out of bounds for {} rows",
                bad,
                self.n_samples()
            )));
        }
        Ok(Self {
            features: self.features.select(Axis(0), indices),
            target: self.target.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
            row_ids: indices.iter().map(|&i| self.row_ids[i]).collect(),
        })
    }

    /// Position of a named feature
    pub fn feature_index(&self, name: &str) -> Result<usize> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| XaiError::FeatureNotFound(name.to_string()))
    }
}

/// Train and test partitions
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub train: Dataset,
    pub test: Dataset,
}

/// Raw table plus the name of its target column
#[derive(Debug, Clone)]
struct FrameInput {
    frame: DataFrame,
    target: String,
}

/// Already separated features and labels
#[derive(Debug, Clone)]
struct ArrayInput {
    features: Array2<f64>,
    target: Array1<f64>,
    names: Option<Vec<String>>,
}

/// Data preparation: column cleanup, encoding and a seeded split.
///
/// Exactly one input must be given, either a raw table with its target
/// column ([`DataProcessor::with_frame`]) or already separated features and
/// labels ([`DataProcessor::with_arrays`]). Column operations only apply to
/// the raw table.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    config: DataConfig,
    frame: Option<FrameInput>,
    arrays: Option<ArrayInput>,
}

impl DataProcessor {
    /// Create a processor with the given configuration
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            frame: None,
            arrays: None,
        }
    }

    /// Raw labeled table and the name of its target column
    pub fn with_frame(mut self, frame: DataFrame, target: impl Into<String>) -> Self {
        self.frame = Some(FrameInput {
            frame,
            target: target.into(),
        });
        self
    }

    /// Pre-separated features and labels. Feature names default to `"0".."d-1"`.
    pub fn with_arrays(
        mut self,
        features: Array2<f64>,
        target: Array1<f64>,
        names: Option<Vec<String>>,
    ) -> Self {
        self.arrays = Some(ArrayInput {
            features,
            target,
            names,
        });
        self
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Produce the train and test partitions
    pub fn process(&self) -> Result<DataSplit> {
        if !self.config.train_eq_test && !(self.config.test_size > 0.0 && self.config.test_size < 1.0) {
            return Err(XaiError::ConfigError(format!(
                "test_size must lie in (0, 1), got {}",
                self.config.test_size
            )));
        }

        let dataset = match (&self.frame, &self.arrays) {
            (Some(input), None) => self.prepare_frame(&input.frame, &input.target)?,
            (None, Some(input)) => {
                let names = input.names.clone().unwrap_or_else(|| {
                    (0..input.features.ncols()).map(|i| i.to_string()).collect()
                });
                Dataset::new(input.features.clone(), input.target.clone(), names)?
            }
            (Some(_), Some(_)) => {
                return Err(XaiError::ConfigError(
                    "provide either a raw table with a target or features with labels, not both"
                        .to_string(),
                ))
            }
            (None, None) => {
                return Err(XaiError::ConfigError(
                    "provide a raw table with a target or features with labels".to_string(),
                ))
            }
        };

        let split = self.split(dataset)?;
        info!(
            train_rows = split.train.n_samples(),
            test_rows = split.test.n_samples(),
            n_features = split.train.n_features(),
            "Data prepared"
        );
        Ok(split)
    }

    fn prepare_frame(&self, frame: &DataFrame, target: &str) -> Result<Dataset> {
        if frame.column(target).is_err() {
            return Err(XaiError::FeatureNotFound(target.to_string()));
        }

        let mut df = frame.clone();
        for name in &self.config.to_drop {
            df = df
                .drop(name)
                .map_err(|_| XaiError::FeatureNotFound(name.clone()))?;
        }

        let mut row_ids: Vec<usize> = (0..df.height()).collect();
        if self.config.dropna {
            let keep = complete_rows(&df)?;
            row_ids = keep.iter().enumerate().filter(|(_, &k)| k).map(|(i, _)| i).collect();
            let mask = BooleanChunked::new("mask".into(), keep.as_slice());
            df = df.filter(&mask)?;
            debug!(kept = df.height(), dropped = keep.len() - df.height(), "Removed incomplete rows");
        }

        if !self.config.to_cat.is_empty() {
            df = CategoryEncoder::new(EncodingKind::Codes).fit_transform(&df, &self.config.to_cat)?;
        }
        if !self.config.to_one_hot.is_empty() {
            df = CategoryEncoder::new(EncodingKind::OneHot).fit_transform(&df, &self.config.to_one_hot)?;
        }

        let y = target_to_array(df.column(target)?.as_materialized_series())?;
        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|name| name != target)
            .collect();
        let x = columns_to_array2(&df, &feature_names)?;

        Dataset::with_row_ids(x, y, feature_names, row_ids)
    }

    fn split(&self, dataset: Dataset) -> Result<DataSplit> {
        if self.config.train_eq_test {
            return Ok(DataSplit {
                train: dataset.clone(),
                test: dataset,
            });
        }

        let n = dataset.n_samples();
        let n_test = (self.config.test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(XaiError::DataError(format!(
                "cannot split {} rows with test_size {}",
                n, self.config.test_size
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);
        order.shuffle(&mut rng);

        let (test_idx, train_idx) = order.split_at(n_test);
        Ok(DataSplit {
            train: dataset.select(train_idx)?,
            test: dataset.select(test_idx)?,
        })
    }
}

/// Rows without nulls, and without NaN in float columns
fn complete_rows(df: &DataFrame) -> Result<Vec<bool>> {
    let mut keep = vec![true; df.height()];
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        for (flag, is_null) in keep.iter_mut().zip(series.is_null().into_iter()) {
            if is_null.unwrap_or(true) {
                *flag = false;
            }
        }
        if series.dtype().is_float() {
            let as_f64 = series.cast(&DataType::Float64)?;
            for (flag, value) in keep.iter_mut().zip(as_f64.f64()?.into_iter()) {
                if value.map_or(false, f64::is_nan) {
                    *flag = false;
                }
            }
        }
    }
    Ok(keep)
}

/// Labels as f64; string labels become sorted category codes
fn target_to_array(series: &Series) -> Result<Array1<f64>> {
    if matches!(series.dtype(), DataType::String) {
        let values: Vec<Option<String>> = series
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        let mut levels: Vec<&String> = values.iter().flatten().collect();
        levels.sort();
        levels.dedup();
        return values
            .iter()
            .map(|v| {
                v.as_ref()
                    .and_then(|s| levels.iter().position(|l| *l == s))
                    .map(|p| p as f64)
                    .ok_or_else(|| XaiError::DataError("missing target value".to_string()))
            })
            .collect();
    }

    let as_f64 = series.cast(&DataType::Float64)?;
    as_f64
        .f64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| XaiError::DataError("missing target value".to_string())))
        .collect()
}

/// Named numeric columns as a row-major matrix; missing values become NaN
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            let column = df
                .column(name)
                .map_err(|_| XaiError::FeatureNotFound(name.clone()))?;
            let series = column.as_materialized_series();
            if matches!(series.dtype(), DataType::String) {
                return Err(XaiError::DataError(format!(
                    "column '{}' is not numeric; list it under to_cat or to_one_hot",
                    name
                )));
            }
            let as_f64 = series.cast(&DataType::Float64)?;
            Ok(as_f64.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_data[c][r]))
}
