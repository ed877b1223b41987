//! Per-trial comparison rows and the results table

use super::metrics::MetricBundle;
use super::timing::TimingTable;
use crate::drift::feature_wise_wasserstein;
use crate::error::{Result, XaiError};
use crate::utils::DataSaver;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Explanation vectors compared against the baseline, by column prefix
const COMPARED: [&str; 4] = ["svi", "pvi", "pdp", "ale"];

/// One trial's values, keyed by column name in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub seed: u64,
    pub columns: Vec<(String, f64)>,
}

impl ResultRow {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            columns: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Append-only table with one row per trial
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Union of row columns, in first-seen order
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            for (name, _) in &row.columns {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Values of one column, `None` where a row lacks it
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(name)).collect()
    }

    /// Mean of each column over the rows that have it
    pub fn column_means(&self) -> Vec<(String, f64)> {
        self.column_names()
            .into_iter()
            .filter_map(|name| {
                let values: Vec<f64> = self.column(&name).into_iter().flatten().collect();
                if values.is_empty() {
                    None
                } else {
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    Some((name, mean))
                }
            })
            .collect()
    }

    /// Leading `seed` column followed by every value column
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new(
            "seed".into(),
            self.rows.iter().map(|r| r.seed).collect::<Vec<u64>>(),
        )];
        for name in self.column_names() {
            columns.push(Column::new(name.as_str().into(), self.column(&name)));
        }
        Ok(DataFrame::new(columns)?)
    }

    pub fn save_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut df = self.to_dataframe()?;
        DataSaver::save_parquet(&mut df, path)
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut df = self.to_dataframe()?;
        DataSaver::save_csv(&mut df, path)
    }
}

fn abs_diff_sum(base: &Array1<f64>, other: &Array1<f64>, name: &str) -> Result<f64> {
    if base.len() != other.len() {
        return Err(XaiError::ShapeError {
            expected: format!("{} values for {}", base.len(), name),
            actual: format!("{} values", other.len()),
        });
    }
    Ok(base.iter().zip(other.iter()).map(|(a, b)| (a - b).abs()).sum())
}

/// Reduce the three bundles of one trial to a results row
pub fn build_row(
    base: &MetricBundle,
    random: &MetricBundle,
    compressed: &MetricBundle,
    timings: &TimingTable,
    seed: u64,
    performance_metric: &str,
) -> Result<ResultRow> {
    let mut row = ResultRow::new(seed);

    if let Some(explainer) = &base.explainer {
        let performance = explainer.model_performance()?;
        row.insert("model_performance", performance.get(performance_metric)?);
    }

    for name in COMPARED {
        let Some(reference) = base.vector(name) else {
            continue;
        };
        for (suffix, sample) in [("random", random), ("compressed", compressed)] {
            let other = sample.vector(name).ok_or_else(|| {
                XaiError::ComputationError(format!("{} missing from the {} sample", name, suffix))
            })?;
            row.insert(format!("{}_{}", name, suffix), abs_diff_sum(reference, other, name)?);
        }
    }

    for (name, seconds) in timings.iter() {
        row.insert(format!("time_{}", name), seconds);
    }

    row.insert("wd_random", feature_wise_wasserstein(&base.x, &random.x)?);
    row.insert("wd_compressed", feature_wise_wasserstein(&base.x, &compressed.x)?);

    if let Some(base_sv) = &base.shap_values {
        for (suffix, sample) in [("random", random), ("compressed", compressed)] {
            let sv = sample.shap_values.as_ref().ok_or_else(|| {
                XaiError::ComputationError(format!("SHAP values missing from the {} sample", suffix))
            })?;
            row.insert(format!("sv_wd_{}", suffix), feature_wise_wasserstein(base_sv, sv)?);
        }
    }

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn bundle(shift: f64) -> MetricBundle {
        let mut b = MetricBundle::new(array![[0.0 + shift], [1.0 + shift]], array![0.0, 1.0]);
        b.shap_values = Some(array![[0.1], [0.2 + shift]]);
        b.shap_importance = Some(array![0.15 + shift / 2.0]);
        b
    }

    #[test]
    fn test_build_row_without_global_explainer() {
        let mut timings = TimingTable::new();
        timings.record("kt", 0.5);
        let row = build_row(&bundle(0.0), &bundle(1.0), &bundle(0.0), &timings, 3, "accuracy").unwrap();

        assert_eq!(row.seed, 3);
        assert_relative_eq!(row.get("svi_random").unwrap(), 0.5);
        assert_relative_eq!(row.get("svi_compressed").unwrap(), 0.0);
        assert_relative_eq!(row.get("wd_random").unwrap(), 1.0);
        assert_relative_eq!(row.get("wd_compressed").unwrap(), 0.0);
        assert!(row.contains("sv_wd_random"));
        assert_eq!(row.get("time_kt"), Some(0.5));
        assert!(!row.contains("model_performance"));
        assert!(!row.contains("pvi_random"));
    }

    #[test]
    fn test_skipped_stage_has_no_columns() {
        let plain = |s: f64| MetricBundle::new(array![[s], [s + 1.0]], array![0.0, 1.0]);
        let row = build_row(&plain(0.0), &plain(0.5), &plain(0.0), &TimingTable::new(), 0, "accuracy").unwrap();
        let names: Vec<&str> = row.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["wd_random", "wd_compressed"]);
    }

    #[test]
    fn test_table_union_and_nulls() {
        let mut table = ResultsTable::new();
        let mut a = ResultRow::new(0);
        a.insert("x", 1.0);
        let mut b = ResultRow::new(1);
        b.insert("x", 3.0);
        b.insert("y", 2.0);
        table.push(a);
        table.push(b);

        assert_eq!(table.column_names(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(table.column("y"), vec![None, Some(2.0)]);
        assert_eq!(table.column_means(), vec![("x".to_string(), 2.0), ("y".to_string(), 2.0)]);

        let df = table.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names()[0].as_str(), "seed");
        assert_eq!(df.column("y").unwrap().null_count(), 1);
    }

    #[test]
    fn test_save_parquet() {
        let mut table = ResultsTable::new();
        let mut row = ResultRow::new(0);
        row.insert("wd_random", 0.25);
        table.push(row);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.parquet");
        table.save_parquet(&path).unwrap();
        assert!(path.exists());
    }
}
