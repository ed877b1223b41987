//! Categorical encodings applied during data preparation

use crate::error::{Result, XaiError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// How a categorical column is turned into numbers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EncodingKind {
    /// One integer code per level, missing values become -1.
    /// The original column is replaced by `<column>_codes`.
    Codes,
    /// One 0/1 indicator column `<column>_<level>` per level, appended
    /// after the remaining columns. Missing values get all zeros.
    OneHot,
}

/// Categorical encoder with levels learned from the data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEncoder {
    kind: EncodingKind,
    /// Sorted levels per encoded column, in encoding order
    levels: Vec<(String, Vec<String>)>,
}

impl CategoryEncoder {
    /// Create an encoder of the given kind
    pub fn new(kind: EncodingKind) -> Self {
        Self {
            kind,
            levels: Vec::new(),
        }
    }

    /// Learn the levels of each named column
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.levels = columns
            .iter()
            .map(|name| {
                let values = string_values(df, name)?;
                Ok((name.clone(), sorted_levels(&values)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    /// Encode the fitted columns
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();

        for (name, levels) in &self.levels {
            let values = string_values(&result, name)?;

            match self.kind {
                EncodingKind::Codes => {
                    let codes: Vec<i64> = values
                        .iter()
                        .map(|v| {
                            v.as_deref()
                                .and_then(|s| levels.iter().position(|l| l == s))
                                .map_or(-1, |p| p as i64)
                        })
                        .collect();
                    result = result.drop(name)?;
                    result.with_column(Column::new(format!("{}_codes", name).into(), codes))?;
                }
                EncodingKind::OneHot => {
                    result = result.drop(name)?;
                    for level in levels {
                        let indicator: Vec<i32> = values
                            .iter()
                            .map(|v| i32::from(v.as_deref() == Some(level.as_str())))
                            .collect();
                        result.with_column(Column::new(
                            format!("{}_{}", name, level).into(),
                            indicator,
                        ))?;
                    }
                }
            }
        }

        Ok(result)
    }

    /// Fit and transform in one call
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Levels learned for a column
    pub fn levels(&self, column: &str) -> Option<&[String]> {
        self.levels
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, levels)| levels.as_slice())
    }
}

/// Read a column as optional strings, whatever its dtype
fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| XaiError::FeatureNotFound(name.to_string()))?;
    let as_str = column.as_materialized_series().cast(&DataType::String)?;
    let ca = as_str.str()?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Unique non-missing levels; numeric order when every level parses as a number
fn sorted_levels(values: &[Option<String>]) -> Vec<String> {
    let mut levels: Vec<String> = values.iter().flatten().cloned().collect();
    levels.sort();
    levels.dedup();

    let numeric: Option<Vec<f64>> = levels.iter().map(|l| l.parse::<f64>().ok()).collect();
    if let Some(numbers) = numeric {
        let mut paired: Vec<(f64, String)> = numbers.into_iter().zip(levels).collect();
        paired.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        levels = paired.into_iter().map(|(_, l)| l).collect();
    }

    levels
}
