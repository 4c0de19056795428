//! Read/write fit-result and config JSON files.
//!
//! A results file wraps one stage's [`FitResults`] with provenance so a later
//! stage (or a viewer) can check what produced it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CalibConfig, FitResults};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub results: FitResults,
}

impl ResultsFile {
    pub fn new(results: FitResults) -> Self {
        Self {
            tool: "calib".to_string(),
            created: Utc::now(),
            results,
        }
    }
}

/// Write a results JSON file.
pub fn write_results_json(path: &Path, results: &FitResults) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create results file '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &ResultsFile::new(results.clone()))
        .map_err(|e| AppError::io(format!("Failed to write results JSON: {e}")))?;
    Ok(())
}

/// Read a results JSON file.
pub fn read_results_json(path: &Path) -> Result<ResultsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open results file '{}': {e}", path.display())))?;
    let parsed: ResultsFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::io(format!("Invalid results JSON '{}': {e}", path.display())))?;

    let results = &parsed.results;
    if let Some(bad) = results
        .rows()
        .iter()
        .filter_map(|r| r.estimates())
        .find(|e| e.len() != results.n_params())
    {
        return Err(AppError::invalid_input(format!(
            "Results row has {} estimates for {} parameters.",
            bad.len(),
            results.n_params()
        )));
    }
    Ok(parsed)
}

/// Read a config file; missing fields take their defaults.
pub fn read_config_json(path: &Path) -> Result<CalibConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open config file '{}': {e}", path.display())))?;
    let config: CalibConfig = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::invalid_input(format!("Invalid config JSON '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
