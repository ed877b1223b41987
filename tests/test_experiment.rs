//! End-to-end tests of the explanation-fidelity experiment

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use polars::prelude::*;
use xai_thinning::compression::{kernel_polynomial, Compressor, GaussianKernel, KernelSpec, KernelThinningCompressor};
use xai_thinning::error::XaiError;
use xai_thinning::experiment::{Experiment, ExperimentConfig, RunConfig, StudyConfig, TimingTable};
use xai_thinning::explainability::{
    ExplainerParams, GlobalExplainerClass, ProfileParams, PviParams, ShapClass, ShapParams,
};
use xai_thinning::preprocessing::{DataConfig, DataProcessor};
use xai_thinning::training::ModelSpec;
use xai_thinning::utils::{DataLoader, DataSaver};

// ============================================================================
// Fixtures
// ============================================================================

/// 160 rows, 3 features; the label depends on the first two
fn synthetic(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (3 * j + 7) + 5 * j) % 23) as f64 / 5.0);
    let y = x.map_axis(Axis(1), |r| if r[0] - 0.5 * r[1] > 1.0 { 1.0 } else { 0.0 });
    (x, y)
}

fn processor() -> DataProcessor {
    let (x, y) = synthetic(160);
    let names = vec!["x1".to_string(), "x2".to_string(), "x3".to_string()];
    DataProcessor::new(DataConfig::default()).with_arrays(x, y, Some(names))
}

fn forest() -> ModelSpec {
    ModelSpec::RandomForestClassifier {
        n_estimators: 8,
        max_depth: Some(5),
        min_samples_leaf: 1,
        max_features: None,
        random_state: 3,
    }
}

fn full_config() -> ExperimentConfig {
    ExperimentConfig::new(forest())
        .with_shap(ShapClass::Tree, ShapParams::default())
        .with_global_explainer(GlobalExplainerClass::Score, ExplainerParams::default())
        .with_pvi(PviParams::default().with_b(2))
        .with_pdp(ProfileParams::default())
        .with_ale(ProfileParams::default())
        .with_pdp_domain(6)
}

// ============================================================================
// Trials
// ============================================================================

#[test]
fn test_shap_only_run() {
    let config = ExperimentConfig::new(forest()).with_shap(ShapClass::Tree, ShapParams::default());
    let experiment = Experiment::from_processor(&processor(), config).unwrap();
    assert_eq!(experiment.test().n_samples(), 64);

    let results = experiment
        .run(&RunConfig::new(2, KernelSpec::Gaussian { gamma: 0.5 }))
        .unwrap();
    assert_eq!(results.len(), 2);

    for row in results.rows() {
        for column in ["svi_random", "svi_compressed", "wd_random", "wd_compressed", "sv_wd_random", "sv_wd_compressed"] {
            assert!(row.contains(column), "missing {}", column);
        }
        for column in ["time_sv_all", "time_sv_compressed", "time_sv_random", "time_kt", "time_random"] {
            assert!(row.get(column).unwrap() >= 0.0, "missing {}", column);
        }
        assert!(!row.contains("model_performance"));
        assert!(row.columns.iter().all(|(name, _)| !name.starts_with("pvi_")
            && !name.starts_with("pdp_")
            && !name.starts_with("ale_")));
    }
    assert_eq!(results.rows()[0].seed, 0);
    assert_eq!(results.rows()[1].seed, 1);
}

#[test]
fn test_full_pipeline_row() {
    let experiment = Experiment::from_processor(&processor(), full_config()).unwrap();
    assert_eq!(
        experiment.baseline().keys(),
        vec!["x", "y", "shap_values", "shap_importance", "explainer", "pvi", "pdp", "ale"]
    );
    assert_eq!(experiment.baseline().pvi.as_ref().unwrap().len(), 3);

    let kt = KernelThinningCompressor::new(GaussianKernel { gamma: 0.5 });
    let trial = experiment.trial(&kt, 4, "accuracy").unwrap();

    for prefix in ["svi", "pvi", "pdp", "ale"] {
        for suffix in ["random", "compressed"] {
            let value = trial.row.get(&format!("{}_{}", prefix, suffix)).unwrap();
            assert!(value.is_finite() && value >= 0.0);
        }
    }
    let accuracy = trial.row.get("model_performance").unwrap();
    assert!((0.0..=1.0).contains(&accuracy));
    for stage in ["sv", "pvi", "pdp", "ale"] {
        for label in ["all", "compressed", "random"] {
            assert!(trial.row.contains(&format!("time_{}_{}", stage, label)));
        }
    }
}

#[test]
fn test_samples_have_equal_cardinality_and_stay_aligned() {
    let experiment = Experiment::from_processor(&processor(), ExperimentConfig::new(forest())).unwrap();
    let kt = KernelThinningCompressor::new(KernelSpec::Polynomial { degree: 2 }).with_oversampling(1);

    let trial = experiment.trial(&kt, 0, "accuracy").unwrap();
    assert_eq!(trial.compressed.len(), trial.random.len());
    assert_eq!(trial.compressed.len(), 16);

    let test = experiment.test();
    let sample = test.select(&trial.compressed).unwrap();
    for (k, &i) in trial.compressed.iter().enumerate() {
        assert_eq!(sample.features.row(k), test.features.row(i));
        assert_eq!(sample.target[k], test.target[i]);
        assert_eq!(sample.row_ids[k], test.row_ids[i]);
    }
}

#[test]
fn test_run_with_several_halving_rounds() {
    let experiment = Experiment::from_processor(&processor(), ExperimentConfig::new(forest())).unwrap();
    for rounds in [2, 3] {
        let run = RunConfig::new(1, KernelSpec::default()).with_halving_rounds(rounds);
        let results = experiment.run(&run).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.rows()[0].contains("wd_compressed"));
    }
}

#[test]
fn test_trial_is_reproducible() {
    let experiment = Experiment::from_processor(&processor(), ExperimentConfig::new(forest())).unwrap();
    let kt = KernelThinningCompressor::new(GaussianKernel::default());

    let a = experiment.trial(&kt, 1, "accuracy").unwrap();
    let b = experiment.trial(&kt, 1, "accuracy").unwrap();
    assert_eq!(a.compressed, b.compressed);
    assert_eq!(a.random, b.random);
    assert_eq!(a.row.get("wd_compressed"), b.row.get("wd_compressed"));
}

#[test]
fn test_baseline_timings_are_not_mutated_by_trials() {
    let config = ExperimentConfig::new(forest()).with_shap(ShapClass::Tree, ShapParams::default());
    let experiment = Experiment::from_processor(&processor(), config).unwrap();
    let before: TimingTable = experiment.baseline_timings().clone();

    let kt = KernelThinningCompressor::new(GaussianKernel::default());
    experiment.run_with(&kt, 2, "accuracy", None).unwrap();

    assert_eq!(experiment.baseline_timings(), &before);
    assert!(before.get("kt").is_none());
}

// ============================================================================
// Model-agnostic path and custom compressors
// ============================================================================

#[test]
fn test_permutation_shap_on_linear_model() {
    let config = ExperimentConfig::new(ModelSpec::LinearRegression { alpha: 0.0 })
        .with_shap(ShapClass::Permutation, ShapParams::default().with_n_permutations(4))
        .with_is_tree(false);
    let experiment = Experiment::from_processor(&processor(), config).unwrap();

    let sv = experiment.baseline().shap_values.as_ref().unwrap();
    assert_eq!(sv.dim(), (64, 3));

    let kt = KernelThinningCompressor::new(GaussianKernel::default());
    let results = experiment.run_with(&kt, 1, "accuracy", None).unwrap();
    assert!(results.rows()[0].contains("sv_wd_compressed"));
}

struct FirstRows(usize);

impl Compressor for FirstRows {
    fn select(&self, x: &Array2<f64>, _seed: u64) -> xai_thinning::Result<Vec<usize>> {
        Ok((0..self.0.min(x.nrows())).collect())
    }
}

#[test]
fn test_any_compressor_can_be_plugged_in() {
    let experiment = Experiment::from_processor(&processor(), ExperimentConfig::new(forest())).unwrap();

    let trial = experiment.trial(&FirstRows(5), 0, "accuracy").unwrap();
    assert_eq!(trial.compressed, vec![0, 1, 2, 3, 4]);
    assert_eq!(trial.random.len(), 5);

    let empty = experiment.trial(&FirstRows(0), 0, "accuracy");
    assert!(matches!(empty, Err(XaiError::ComputationError(_))));

    let closure_kernel = |y: ArrayView1<f64>, x: ArrayView2<f64>| kernel_polynomial(y, x, 3);
    let kt = KernelThinningCompressor::new(closure_kernel);
    let results = experiment.run_with(&kt, 1, "accuracy", None).unwrap();
    assert_eq!(results.len(), 1);
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_invalid_configurations_fail_before_training() {
    let linear_tree_shap = ExperimentConfig::new(ModelSpec::LinearRegression { alpha: 0.0 })
        .with_shap(ShapClass::Tree, ShapParams::default());
    assert!(matches!(
        Experiment::from_processor(&processor(), linear_tree_shap),
        Err(XaiError::ConfigError(_))
    ));

    let mut orphan_class = ExperimentConfig::new(forest());
    orphan_class.global_class = Some(GlobalExplainerClass::Prediction);
    assert!(matches!(
        Experiment::from_processor(&processor(), orphan_class),
        Err(XaiError::ConfigError(_))
    ));
}

#[test]
fn test_unknown_metric_is_reported() {
    let config = ExperimentConfig::new(forest())
        .with_global_explainer(GlobalExplainerClass::Score, ExplainerParams::default());
    let experiment = Experiment::from_processor(&processor(), config).unwrap();
    let run = RunConfig::new(1, KernelSpec::default()).with_performance_metric("balanced_accuracy");
    assert!(matches!(experiment.run(&run), Err(XaiError::MetricNotFound(_))));

    let run = RunConfig::new(1, KernelSpec::default()).with_performance_metric("auc");
    assert!(experiment.run(&run).unwrap().rows()[0].contains("model_performance"));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_study_from_file_writes_parquet() {
    let dir = tempfile::tempdir().unwrap();

    let (x, y) = synthetic(160);
    let mut df = df!(
        "x1" => x.column(0).to_vec(),
        "x2" => x.column(1).to_vec(),
        "x3" => x.column(2).to_vec(),
        "label" => y.to_vec()
    )
    .unwrap();
    let data_path = dir.path().join("synthetic.csv");
    DataSaver::save_csv(&mut df, &data_path).unwrap();

    let output_path = dir.path().join("out").join("results.parquet");
    let json = format!(
        r#"{{
            "data_path": {data:?},
            "target": "label",
            "experiment": {{
                "model": {{"type": "decision_tree_classifier", "max_depth": 4}},
                "shap_class": "tree",
                "shap_params": {{}}
            }},
            "run": {{"n_trials": 3, "kernel": {{"type": "gaussian", "gamma": 0.5}}, "output_path": {out:?}}}
        }}"#,
        data = data_path.display().to_string(),
        out = output_path.display().to_string(),
    );
    let config_path = dir.path().join("study.json");
    std::fs::write(&config_path, json).unwrap();

    let study = StudyConfig::from_file(&config_path).unwrap();
    let frame = DataLoader::new().load_auto(&study.data_path).unwrap();
    let processor = DataProcessor::new(study.data.clone()).with_frame(frame, study.target.clone());
    let experiment = Experiment::from_processor(&processor, study.experiment.clone()).unwrap();
    let results = experiment.run(&study.run).unwrap();
    assert_eq!(results.len(), 3);

    let saved = DataLoader::new().load_parquet(&output_path).unwrap();
    assert_eq!(saved.height(), 3);
    assert_eq!(saved.get_column_names()[0].as_str(), "seed");
    assert!(saved.column("svi_compressed").is_ok());
}
