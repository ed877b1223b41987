//! Command-line interface
//!
//! `run` executes a study described by a JSON file, `info` summarizes a data file.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::experiment::{Experiment, ResultsTable, StudyConfig};
use crate::preprocessing::DataProcessor;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "xai-thinning")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explanation fidelity of kernel-thinned samples versus random samples")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a study described by a JSON configuration file
    Run {
        /// Study configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the number of trials
        #[arg(long)]
        trials: Option<usize>,

        /// Override the Parquet output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Relative data paths are taken relative to the configuration file
fn resolve_data_path(config_path: &Path, data_path: &Path) -> PathBuf {
    if data_path.is_absolute() || data_path.exists() {
        return data_path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(data_path),
        None => data_path.to_path_buf(),
    }
}

pub fn cmd_run(config_path: &Path, trials: Option<usize>, output: Option<&Path>) -> anyhow::Result<()> {
    section("Study");

    let mut study = StudyConfig::from_file(config_path)?;
    if let Some(n) = trials {
        study.run.n_trials = n;
    }
    if let Some(path) = output {
        study.run.output_path = Some(path.to_path_buf());
    }
    let data_path = resolve_data_path(config_path, &study.data_path);

    kv("Config", &config_path.display().to_string());
    kv("Data", &data_path.display().to_string());
    kv("Target", &study.target);
    kv("Model", &format!("{:?}", study.experiment.model));
    kv("Kernel", &format!("{:?}", study.run.kernel));
    kv("Trials", &study.run.n_trials.to_string());
    println!();

    step_run("Loading data");
    let start = Instant::now();
    let df = DataLoader::new().load_auto(&data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run("Training and baseline explanations");
    let start = Instant::now();
    let processor = DataProcessor::new(study.data.clone()).with_frame(df, study.target.clone());
    let experiment = Experiment::from_processor(&processor, study.experiment.clone())?;
    step_done(&format!(
        "{} train / {} test rows in {:?}",
        experiment.train().n_samples(),
        experiment.test().n_samples(),
        start.elapsed()
    ));

    step_run(&format!("Running {} trials", study.run.n_trials));
    let start = Instant::now();
    let table = experiment.run(&study.run)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_means(&table);

    if let Some(path) = &study.run.output_path {
        println!("  {} {}", ok("✓"), format!("Results written to {}", path.display()));
        println!();
    }
    Ok(())
}

fn print_means(table: &ResultsTable) {
    section("Mean over trials");
    println!("  {:<28} {:>14}", muted("Column"), muted("Mean"));
    println!("  {}", dim(&"─".repeat(44)));
    for (name, mean) in table.column_means() {
        println!("  {:<28} {:>14}", name, format!("{:.6}", mean).white());
    }
    println!();
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let loader = DataLoader::new();
    let info = loader.get_file_info(data_path)?;
    let df = loader.load_auto(data_path)?;

    kv("File", &info.path);
    kv("Size", &format!("{:.2} MB", info.file_size as f64 / 1024.0 / 1024.0));
    kv("Rows", &df.height().to_string());
    kv("Columns", &df.width().to_string());
    println!();

    println!("  {:<20} {:<12} {:>6} {:>8}", muted("Column"), muted("Type"), muted("Nulls"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(50)));

    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6} {:>8}",
            col.name().as_str(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0)
        );
    }

    println!();
    Ok(())
}
