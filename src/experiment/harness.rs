//! Experiment harness: train once, explain the full test set, then compare
//! explanations on compressed and random samples over seeded trials

use super::config::{ExperimentConfig, RunConfig};
use super::metrics::MetricBundle;
use super::results::{build_row, ResultRow, ResultsTable};
use super::timing::TimingTable;
use crate::compression::{Compressor, KernelThinningCompressor};
use crate::error::{Result, XaiError};
use crate::explainability::{
    linspace, mean_abs_shap, GlobalExplainer, IndependentMasker, PermutationExplainer, ProfileKind, ProfileParams,
    ShapClass, ShapExplainer, TreeExplainer,
};
use crate::preprocessing::{DataProcessor, DataSplit, Dataset};
use crate::training::Model;
use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Label of the full test set in timing names
pub const BASELINE_LABEL: &str = "all";

/// Index sets and results row of one trial
#[derive(Debug, Clone)]
pub struct Trial {
    pub seed: u64,
    pub compressed: Vec<usize>,
    pub random: Vec<usize>,
    pub row: ResultRow,
}

/// Owns the trained model, the test partition and the cached baseline
pub struct Experiment {
    config: ExperimentConfig,
    train: Dataset,
    test: Dataset,
    model: Arc<dyn Model>,
    baseline: MetricBundle,
    baseline_timings: TimingTable,
}

impl Experiment {
    /// Validate the configuration, train the model and explain the test set
    pub fn new(split: DataSplit, config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let DataSplit { train, test } = split;
        if train.n_samples() == 0 || test.n_samples() == 0 {
            return Err(XaiError::DataError("Train and test partitions must be non-empty".to_string()));
        }

        let mut model = config.model.build()?;
        model.fit(&train.features, &train.target)?;
        let model: Arc<dyn Model> = Arc::from(model);
        info!(
            model = model.name(),
            train_rows = train.n_samples(),
            test_rows = test.n_samples(),
            features = train.n_features(),
            "Model trained"
        );

        let mut experiment = Self {
            config,
            train,
            baseline: MetricBundle::new(Array2::zeros((0, 0)), Array1::zeros(0)),
            test,
            model,
            baseline_timings: TimingTable::new(),
        };

        let mut timings = TimingTable::new();
        let baseline = experiment.compute_metrics(
            &experiment.test.features,
            &experiment.test.target,
            BASELINE_LABEL,
            &mut timings,
        )?;
        info!(keys = ?baseline.keys(), "Baseline computed");
        experiment.baseline = baseline;
        experiment.baseline_timings = timings;
        Ok(experiment)
    }

    /// Prepare data with `processor`, then build the experiment
    pub fn from_processor(processor: &DataProcessor, config: ExperimentConfig) -> Result<Self> {
        Self::new(processor.process()?, config)
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn train(&self) -> &Dataset {
        &self.train
    }

    pub fn test(&self) -> &Dataset {
        &self.test
    }

    pub fn baseline(&self) -> &MetricBundle {
        &self.baseline
    }

    pub fn baseline_timings(&self) -> &TimingTable {
        &self.baseline_timings
    }

    fn shap_explainer(&self, x: &Array2<f64>) -> Result<Option<Box<dyn ShapExplainer>>> {
        let (Some(class), Some(params)) = (self.config.shap_class, &self.config.shap_params) else {
            return Ok(None);
        };

        let explainer: Box<dyn ShapExplainer> = match class {
            ShapClass::Tree => Box::new(TreeExplainer::new(self.model.as_ref(), Some(x))?),
            ShapClass::Permutation => {
                let background = if self.config.is_tree { x } else { &self.train.features };
                let masker = IndependentMasker::new(background, params.max_background, params.seed)?;
                Box::new(PermutationExplainer::new(self.model.clone(), masker, params)?)
            }
        };
        Ok(Some(explainer))
    }

    /// Run every configured explanation stage on one sample.
    ///
    /// Timings are recorded as `sv_<label>`, `pvi_<label>`, `pdp_<label>`
    /// and `ale_<label>`.
    pub fn compute_metrics(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        label: &str,
        timings: &mut TimingTable,
    ) -> Result<MetricBundle> {
        let mut bundle = MetricBundle::new(x.clone(), y.clone());

        if let Some(explainer) = self.shap_explainer(x)? {
            let sv = timings.time(format!("sv_{}", label), || explainer.shap_values(x))?;
            bundle.shap_importance = Some(mean_abs_shap(&sv));
            bundle.shap_values = Some(sv);
        }

        let (Some(class), Some(params)) = (self.config.global_class, &self.config.global_params) else {
            return Ok(bundle);
        };
        let explainer = GlobalExplainer::new(
            self.model.clone(),
            x.clone(),
            y.clone(),
            self.test.feature_names.clone(),
            class,
            params,
        )?;

        if let Some(pvi_params) = &self.config.pvi_params {
            let parts = timings.time(format!("pvi_{}", label), || explainer.model_parts(pvi_params))?;
            bundle.pvi = Some(parts.loss_vector());

            let variable = parts
                .most_important()
                .ok_or_else(|| XaiError::ComputationError("No variable to profile".to_string()))?
                .to_string();
            let grid = self.profile_grid(x, &variable)?;
            debug!(variable = %variable, points = grid.len(), "Profile grid");

            let stages: [(&str, ProfileKind, &Option<ProfileParams>); 2] = [
                ("pdp", ProfileKind::Partial, &self.config.pdp_params),
                ("ale", ProfileKind::Accumulated, &self.config.ale_params),
            ];
            for (name, kind, profile_params) in stages {
                let Some(profile_params) = profile_params else {
                    continue;
                };
                let profile = timings.time(format!("{}_{}", name, label), || {
                    explainer.model_profile(kind, profile_params, &variable, &grid)
                })?;
                match kind {
                    ProfileKind::Partial => bundle.pdp = Some(profile.yhat()),
                    ProfileKind::Accumulated => bundle.ale = Some(profile.yhat()),
                }
            }
            bundle.most_important = Some(variable);
        }

        bundle.explainer = Some(explainer);
        Ok(bundle)
    }

    /// `pdp_domain` evenly spaced points over the observed range of `variable`
    fn profile_grid(&self, x: &Array2<f64>, variable: &str) -> Result<Vec<f64>> {
        let col = self.test.feature_index(variable)?;
        let (min, max) = x
            .column(col)
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if min > max {
            return Err(XaiError::DataError(format!("Column '{}' has no finite values", variable)));
        }
        Ok(linspace(min, max, self.config.pdp_domain))
    }

    /// Compressed row indices of the test features, timed as `kt`
    pub fn compress<C: Compressor + ?Sized>(
        &self,
        compressor: &C,
        seed: u64,
        timings: &mut TimingTable,
    ) -> Result<Vec<usize>> {
        let indices = timings.time("kt", || compressor.select(&self.test.features, seed))?;
        if indices.is_empty() {
            return Err(XaiError::ComputationError(format!(
                "{} returned an empty sample for {} rows",
                compressor.name(),
                self.test.n_samples()
            )));
        }
        Ok(indices)
    }

    /// `size` distinct test row indices drawn from a source seeded with `seed`,
    /// timed as `random`
    pub fn random_control(&self, size: usize, seed: u64, timings: &mut TimingTable) -> Result<Vec<usize>> {
        let n = self.test.n_samples();
        if size > n {
            return Err(XaiError::ValidationError(format!(
                "Cannot draw {} rows without replacement from {}",
                size, n
            )));
        }
        timings.time("random", || {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Ok(index::sample(&mut rng, n, size).into_vec())
        })
    }

    /// One seeded trial: compress, draw the control, explain both, reduce to a row
    pub fn trial<C: Compressor + ?Sized>(&self, compressor: &C, seed: u64, performance_metric: &str) -> Result<Trial> {
        info!(seed, "Trial started");
        let mut timings = self.baseline_timings.clone();

        let compressed = self.compress(compressor, seed, &mut timings)?;
        let random = self.random_control(compressed.len(), seed, &mut timings)?;
        info!(seed, size = compressed.len(), "Samples drawn");

        let compressed_data = self.test.select(&compressed)?;
        let random_data = self.test.select(&random)?;

        let compressed_metrics =
            self.compute_metrics(&compressed_data.features, &compressed_data.target, "compressed", &mut timings)?;
        let random_metrics =
            self.compute_metrics(&random_data.features, &random_data.target, "random", &mut timings)?;

        let row = build_row(
            &self.baseline,
            &random_metrics,
            &compressed_metrics,
            &timings,
            seed,
            performance_metric,
        )?;
        info!(seed, columns = row.columns.len(), "Trial finished");

        Ok(Trial {
            seed,
            compressed,
            random,
            row,
        })
    }

    /// Trials for seeds `0..n_trials` with any compressor, optionally saved as Parquet
    pub fn run_with<C: Compressor + ?Sized>(
        &self,
        compressor: &C,
        n_trials: usize,
        performance_metric: &str,
        output_path: Option<&Path>,
    ) -> Result<ResultsTable> {
        if let Some(explainer) = &self.baseline.explainer {
            explainer.model_performance()?.get(performance_metric)?;
        }

        let mut table = ResultsTable::new();
        for seed in 0..n_trials as u64 {
            table.push(self.trial(compressor, seed, performance_metric)?.row);
        }

        if let Some(path) = output_path {
            table.save_parquet(path)?;
            info!(path = %path.display(), rows = table.len(), "Results saved");
        }
        Ok(table)
    }

    /// Trials with kernel thinning configured by `run`
    pub fn run(&self, run: &RunConfig) -> Result<ResultsTable> {
        let compressor = KernelThinningCompressor::new(run.kernel)
            .with_halving_rounds(run.halving_rounds)
            .with_oversampling(run.oversampling);
        self.run_with(&compressor, run.n_trials, &run.performance_metric, run.output_path.as_deref())
    }
}
