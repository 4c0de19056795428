//! Command-line parsing for the per-channel calibration fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::data::CountNoise;
use crate::domain::ModelKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "calib", version, about = "Per-channel photon-sensor histogram calibration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one model stage to a histogram file.
    Fit(FitArgs),
    /// Run hv-off, low-light and full-range in order, each seeding the next.
    Chain(ChainArgs),
    /// Generate a synthetic histogram file from known parameters.
    Simulate(SimulateArgs),
    /// Print per-parameter statistics of a results file.
    Summary(SummaryArgs),
}

/// Options shared by every fitting command.
#[derive(Debug, Parser, Clone)]
pub struct TuningArgs {
    /// JSON config file (solver and model settings). Missing fields use defaults.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Override the solver's trial-step budget per channel.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Override the number of full-range Gaussian components.
    #[arg(long)]
    pub components: Option<usize>,

    /// Print a per-parameter summary after fitting.
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Model to fit.
    #[arg(short = 'm', long, value_enum)]
    pub model: ModelKind,

    /// Histogram JSON file (`bin_centers`, `counts`).
    #[arg(long, value_name = "JSON")]
    pub histogram: PathBuf,

    /// Results file of an earlier stage, used to seed this one.
    #[arg(long, value_name = "JSON")]
    pub prior: Option<PathBuf>,

    /// Where to write this stage's results.
    #[arg(short = 'o', long, value_name = "JSON")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct ChainArgs {
    /// Histogram taken with the high voltage off.
    #[arg(long, value_name = "JSON")]
    pub hv_off: PathBuf,

    /// Histogram taken at low light.
    #[arg(long, value_name = "JSON")]
    pub low_light: PathBuf,

    /// Histogram covering the full dynamic range.
    #[arg(long, value_name = "JSON")]
    pub full_range: PathBuf,

    /// Directory receiving `hv-off.json`, `low-light.json` and `full-range.json`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Model generating the counts.
    #[arg(short = 'm', long, value_enum)]
    pub model: ModelKind,

    /// Model parameters, comma separated, in the model's order.
    #[arg(long, value_delimiter = ',', num_args = 1.., allow_negative_numbers = true, required = true)]
    pub params: Vec<f64>,

    /// Number of channels.
    #[arg(short = 'n', long, default_value_t = 1296)]
    pub channels: usize,

    /// First bin center (ADC).
    #[arg(long, default_value_t = 0.0)]
    pub bin_min: f64,

    /// Last bin center (ADC).
    #[arg(long, default_value_t = 4095.0)]
    pub bin_max: f64,

    /// Bin width (ADC).
    #[arg(long, default_value_t = 1.0)]
    pub bin_width: f64,

    /// Count noise.
    #[arg(long, value_enum, default_value_t = CountNoise::Poisson)]
    pub noise: CountNoise,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Per-channel baseline spread (ADC).
    #[arg(long, default_value_t = 0.0)]
    pub baseline_jitter: f64,

    /// Output histogram JSON.
    #[arg(short = 'o', long, value_name = "JSON")]
    pub output: PathBuf,

    /// JSON config file (model settings such as the component count).
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Override the number of full-range Gaussian components.
    #[arg(long)]
    pub components: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct SummaryArgs {
    /// Results JSON file.
    #[arg(value_name = "JSON")]
    pub results: PathBuf,
}
