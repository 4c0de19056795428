//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads config, histogram and prior files
//! - runs one stage or the whole chain
//! - writes result files and prints summaries

use std::path::Path;

use clap::Parser;

use crate::cli::{ChainArgs, Command, FitArgs, SimulateArgs, SummaryArgs, TuningArgs};
use crate::data::{SyntheticSpec, generate};
use crate::domain::{CalibConfig, FitResults, Histogram};
use crate::error::AppError;
use crate::io::{read_config_json, read_histogram_json, read_results_json, write_histogram_json, write_results_json};
use crate::models::build_model;
use crate::report::{format_summary, summarize};

pub mod pipeline;

/// Entry point for the `calib` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Chain(args) => handle_chain(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = config_from_args(&args.tuning)?;
    let histogram = read_histogram_json(&args.histogram)?;
    let prior = match &args.prior {
        Some(path) => Some(read_results_json(path)?.results),
        None => None,
    };

    let results = pipeline::run_stage(args.model, &histogram, prior.as_ref(), &config)?;
    write_results_json(&args.output, &results)?;
    report(&results, args.tuning.summary);
    Ok(())
}

fn handle_chain(args: ChainArgs) -> Result<(), AppError> {
    let config = config_from_args(&args.tuning)?;
    let hv_off = read_histogram_json(&args.hv_off)?;
    let low_light = read_histogram_json(&args.low_light)?;
    let full_range = read_histogram_json(&args.full_range)?;

    let out = pipeline::run_chain(&hv_off, &low_light, &full_range, &config)?;

    std::fs::create_dir_all(&args.out_dir).map_err(|e| {
        AppError::io(format!("Failed to create output directory '{}': {e}", args.out_dir.display()))
    })?;
    for results in [&out.hv_off, &out.low_light, &out.full_range] {
        let path = args.out_dir.join(format!("{}.json", results.model));
        write_results_json(&path, results)?;
        report(results, args.tuning.summary);
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(k) = args.components {
        config.full_range.n_components = k;
    }
    config.validate()?;

    let n_channels = args.channels;
    let template = Histogram::uniform(args.bin_min, args.bin_max, args.bin_width, 1)?;
    let spec = SyntheticSpec {
        bin_centers: template.bin_centers().to_vec(),
        n_channels,
        noise: args.noise,
        seed: args.seed,
        baseline_jitter: args.baseline_jitter,
    };

    let model = build_model(args.model, &config);
    let run = generate(model.as_ref(), &args.params, &spec)?;
    write_histogram_json(&args.output, &run.histogram)?;
    log::info!(
        "wrote {} {} channels to {}",
        n_channels,
        args.model,
        args.output.display()
    );
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let file = read_results_json(&args.results)?;
    println!("{}", format_summary(&summarize(&file.results)));
    Ok(())
}

fn report(results: &FitResults, print_summary: bool) {
    if print_summary {
        println!("{}", format_summary(&summarize(results)));
    } else {
        println!(
            "{}: fitted {}/{} channels",
            results.model,
            results.fitted_count(),
            results.n_channels()
        );
    }
}

fn load_config(path: Option<&Path>) -> Result<CalibConfig, AppError> {
    match path {
        Some(path) => read_config_json(path),
        None => Ok(CalibConfig::default()),
    }
}

/// Config file (or defaults) with command-line overrides applied.
pub fn config_from_args(args: &TuningArgs) -> Result<CalibConfig, AppError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.max_iterations {
        config.solver.max_iterations = n;
    }
    if let Some(k) = args.components {
        config.full_range.n_components = k;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"solver": {"max_iterations": 40}, "full_range": {"n_components": 10}}"#).unwrap();

        let args = TuningArgs {
            config: Some(path),
            max_iterations: None,
            components: Some(12),
            summary: false,
        };
        let cfg = config_from_args(&args).unwrap();
        assert_eq!(cfg.solver.max_iterations, 40);
        assert_eq!(cfg.full_range.n_components, 12);
    }

    #[test]
    fn zero_iteration_override_is_rejected() {
        let args = TuningArgs {
            config: None,
            max_iterations: Some(0),
            components: None,
            summary: false,
        };
        assert!(config_from_args(&args).is_err());
    }
}
