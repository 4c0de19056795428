//! Read/write histogram JSON files.
//!
//! Layout: two parallel arrays, shared bin centers and per-channel counts.
//!
//! ```json
//! { "bin_centers": [0.0, 1.0, ...], "counts": [[...], [...]] }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::Histogram;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramFile {
    pub bin_centers: Vec<f64>,
    pub counts: Vec<Vec<f64>>,
}

impl From<&Histogram> for HistogramFile {
    fn from(h: &Histogram) -> Self {
        Self {
            bin_centers: h.bin_centers().to_vec(),
            counts: h.all_counts().to_vec(),
        }
    }
}

/// Write a histogram JSON file.
pub fn write_histogram_json(path: &Path, histogram: &Histogram) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create histogram file '{}': {e}", path.display())))?;
    serde_json::to_writer(file, &HistogramFile::from(histogram))
        .map_err(|e| AppError::io(format!("Failed to write histogram JSON: {e}")))?;
    Ok(())
}

/// Read and validate a histogram JSON file.
pub fn read_histogram_json(path: &Path) -> Result<Histogram, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open histogram file '{}': {e}", path.display())))?;
    let raw: HistogramFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::io(format!("Invalid histogram JSON '{}': {e}", path.display())))?;
    Histogram::new(raw.bin_centers, raw.counts)
}
