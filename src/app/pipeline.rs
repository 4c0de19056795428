//! Shared calibration pipeline logic used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! histogram -> model stage (seeded by the previous stage) -> result store
//!
//! The CLI can then focus on file handling and printing.

use crate::domain::{CalibConfig, FitResults, Histogram, ModelKind};
use crate::error::AppError;
use crate::fit::fit_histogram;
use crate::models::build_model;

/// Result stores of a full calibration chain.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub hv_off: FitResults,
    pub low_light: FitResults,
    pub full_range: FitResults,
}

/// Fit one stage with the configured model.
pub fn run_stage(
    kind: ModelKind,
    histogram: &Histogram,
    prior: Option<&FitResults>,
    config: &CalibConfig,
) -> Result<FitResults, AppError> {
    config.validate()?;
    let model = build_model(kind, config);
    if let Some(prior) = prior {
        log::info!("{kind}: seeding from {} results", prior.model);
    }
    fit_histogram(model.as_ref(), histogram, prior, &config.solver)
}

/// Run hv-off, low-light and full-range in order, each stage reading the
/// previous stage's store as its prior.
pub fn run_chain(
    hv_off: &Histogram,
    low_light: &Histogram,
    full_range: &Histogram,
    config: &CalibConfig,
) -> Result<ChainOutput, AppError> {
    let hv_off = run_stage(ModelKind::HvOff, hv_off, None, config)?;
    let low_light = run_stage(ModelKind::LowLight, low_light, Some(&hv_off), config)?;
    let full_range = run_stage(ModelKind::FullRange, full_range, Some(&low_light), config)?;
    Ok(ChainOutput {
        hv_off,
        low_light,
        full_range,
    })
}
