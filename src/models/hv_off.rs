//! Pedestal model for data taken with the high voltage off.
//!
//! Only electronic noise is present, so each channel is a single Gaussian:
//! `amplitude · N(x; baseline, sigma_e)`. This is the first stage of a
//! calibration and needs no prior.

use serde::{Deserialize, Serialize};

use crate::domain::{Bounds, ChannelHistogram, ModelKind, ParameterVector, PriorFit, Roi};
use crate::math::{gaussian, weighted_mean, weighted_std};
use crate::models::{CalibrationModel, nonzero_span};

pub const PARAMETERS: [&str; 3] = ["amplitude", "baseline", "sigma_e"];

const AMPLITUDE: usize = 0;
const BASELINE: usize = 1;
const SIGMA_E: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HvOffModel {
    /// Smallest noise width the fit may reach (ADC counts).
    pub min_sigma: f64,
}

impl Default for HvOffModel {
    fn default() -> Self {
        Self { min_sigma: 1e-3 }
    }
}

impl CalibrationModel for HvOffModel {
    fn kind(&self) -> ModelKind {
        ModelKind::HvOff
    }

    fn parameter_names(&self) -> Vec<String> {
        PARAMETERS.iter().map(|s| s.to_string()).collect()
    }

    fn select_roi(&self, hist: ChannelHistogram<'_>, _prior: Option<PriorFit<'_>>) -> Roi {
        match nonzero_span(hist, false) {
            Some((first, last)) => Roi::inclusive(first, last),
            None => Roi::unfittable(),
        }
    }

    fn estimate_guess(
        &self,
        hist: ChannelHistogram<'_>,
        roi: &Roi,
        _prior: Option<PriorFit<'_>>,
    ) -> ParameterVector {
        let mut guess = ParameterVector::undefined(PARAMETERS.len());
        if roi.is_degenerate() {
            return guess;
        }
        let x = roi.slice(hist.bin_centers);
        let y = roi.slice(hist.counts);
        let (Some(mean), Some(std)) = (weighted_mean(&x, &y), weighted_std(&x, &y)) else {
            return guess;
        };

        let total: f64 = y.iter().sum();
        guess.set(AMPLITUDE, total * hist.bin_width());
        guess.set(BASELINE, mean);
        guess.set(SIGMA_E, std.max(self.min_sigma));
        guess
    }

    fn compute_bounds(&self, _prior: Option<PriorFit<'_>>) -> Bounds {
        let mut bounds = Bounds::with_capacity(PARAMETERS.len());
        bounds.push(0.0, f64::INFINITY);
        bounds.push(f64::NEG_INFINITY, f64::INFINITY);
        bounds.push(self.min_sigma, f64::INFINITY);
        bounds
    }

    fn evaluate(&self, params: &[f64], x: &[f64]) -> Vec<f64> {
        let &[amplitude, baseline, sigma_e] = params else {
            return vec![f64::NAN; x.len()];
        };
        x.iter()
            .map(|&xi| amplitude * gaussian(xi, baseline, sigma_e))
            .collect()
    }
}
