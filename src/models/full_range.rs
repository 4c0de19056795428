//! Full-dynamic-range Gaussian-sum model.
//!
//! One free amplitude per photoelectron peak `k = 0..K`:
//!
//! ```text
//! f(x) = Σ_k amplitude_k · N(x; baseline + k·gain, sqrt(sigma_e² + k·sigma_1²))
//! ```
//!
//! Baseline, gain and widths are seeded (and bounded) by the low-light stage.

use serde::{Deserialize, Serialize};

use crate::domain::{Bounds, ChannelHistogram, ModelKind, ParameterVector, PriorFit, Roi};
use crate::math::gaussian;
use crate::models::{CalibrationModel, nonzero_span};

/// Shared parameters ahead of the per-peak amplitudes.
pub const SHARED_PARAMETERS: [&str; 4] = ["baseline", "gain", "sigma_e", "sigma_1"];

const BASELINE: usize = 0;
const GAIN: usize = 1;
const SIGMA_E: usize = 2;
const SIGMA_1: usize = 3;
const N_SHARED: usize = SHARED_PARAMETERS.len();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullRangeModel {
    /// Number of photoelectron peaks `K`.
    pub n_components: usize,
    /// Starting amplitude of every peak.
    pub initial_amplitude: f64,
    /// Multiplier applied to the prior gain when seeding.
    pub gain_scale: f64,
    /// Fit region ends at `baseline + cutoff_peaks · gain · cutoff_margin`.
    pub cutoff_peaks: f64,
    pub cutoff_margin: f64,
    /// Baseline may move by this many `sigma_e` from the prior.
    pub baseline_window: f64,
    /// Allowed gain range relative to the prior gain.
    pub gain_window: [f64; 2],
    /// Allowed width range relative to the prior widths.
    pub width_window: [f64; 2],
    pub exclude_saturation: bool,
}

impl Default for FullRangeModel {
    fn default() -> Self {
        Self {
            n_components: 22,
            initial_amplitude: 100.0,
            gain_scale: 1.0,
            cutoff_peaks: 20.0,
            cutoff_margin: 1.1,
            baseline_window: 2.0,
            gain_window: [0.7, 2.0],
            width_window: [0.2, 3.333],
            exclude_saturation: false,
        }
    }
}

impl FullRangeModel {
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components,
            ..Self::default()
        }
    }

    fn cutoff(&self, prior: Option<PriorFit<'_>>) -> Option<f64> {
        let prior = prior?;
        let baseline = prior.value("baseline")?;
        let gain = prior.value("gain")?;
        Some(baseline + self.cutoff_peaks * gain * self.cutoff_margin)
    }
}

impl CalibrationModel for FullRangeModel {
    fn kind(&self) -> ModelKind {
        ModelKind::FullRange
    }

    fn parameter_names(&self) -> Vec<String> {
        SHARED_PARAMETERS
            .iter()
            .map(|s| s.to_string())
            .chain((0..self.n_components).map(|k| format!("amplitude_{k}")))
            .collect()
    }

    fn select_roi(&self, hist: ChannelHistogram<'_>, prior: Option<PriorFit<'_>>) -> Roi {
        let Some((first, last)) = nonzero_span(hist, self.exclude_saturation) else {
            return Roi::unfittable();
        };
        let last = match self.cutoff(prior) {
            Some(cutoff) => {
                match hist.bin_centers[..=last].iter().rposition(|&c| c < cutoff) {
                    Some(i) => i,
                    None => return Roi::unfittable(),
                }
            }
            None => last,
        };
        if last <= first {
            return Roi::unfittable();
        }
        Roi::inclusive(first, last)
    }

    fn estimate_guess(
        &self,
        hist: ChannelHistogram<'_>,
        _roi: &Roi,
        prior: Option<PriorFit<'_>>,
    ) -> ParameterVector {
        let mut guess = ParameterVector::undefined(N_SHARED + self.n_components);
        let Some(prior) = prior else {
            return guess;
        };
        if hist.nonzero_indices().len() < 2 {
            return guess;
        }
        if let Some(v) = prior.value("baseline") {
            guess.set(BASELINE, v);
        }
        if let Some(v) = prior.value("gain") {
            guess.set(GAIN, v * self.gain_scale);
        }
        if let Some(v) = prior.value("sigma_e") {
            guess.set(SIGMA_E, v);
        }
        if let Some(v) = prior.value("sigma_1") {
            guess.set(SIGMA_1, v);
        }
        for k in 0..self.n_components {
            guess.set(N_SHARED + k, self.initial_amplitude);
        }
        guess
    }

    fn compute_bounds(&self, prior: Option<PriorFit<'_>>) -> Bounds {
        let mut bounds = Bounds::with_capacity(N_SHARED + self.n_components);
        let value = |name: &str| prior.and_then(|p| p.value(name));

        match (value("baseline"), value("sigma_e")) {
            (Some(baseline), Some(sigma_e)) => {
                let half = self.baseline_window * sigma_e;
                bounds.push(baseline - half, baseline + half);
            }
            _ => bounds.push(f64::NEG_INFINITY, f64::INFINITY),
        }
        for (name, window) in [
            ("gain", self.gain_window),
            ("sigma_e", self.width_window),
            ("sigma_1", self.width_window),
        ] {
            match value(name) {
                Some(v) => bounds.push(v * window[0], v * window[1]),
                None => bounds.push(f64::NEG_INFINITY, f64::INFINITY),
            }
        }
        for _ in 0..self.n_components {
            bounds.push(0.0, f64::INFINITY);
        }
        bounds
    }

    fn evaluate(&self, params: &[f64], x: &[f64]) -> Vec<f64> {
        if params.len() != N_SHARED + self.n_components {
            return vec![f64::NAN; x.len()];
        }
        let (baseline, gain) = (params[BASELINE], params[GAIN]);
        let (sigma_e, sigma_1) = (params[SIGMA_E], params[SIGMA_1]);

        let peaks: Vec<(f64, f64, f64)> = params[N_SHARED..]
            .iter()
            .enumerate()
            .map(|(k, &amplitude)| {
                let k = k as f64;
                let sigma_k = (sigma_e * sigma_e + k * sigma_1 * sigma_1).sqrt();
                (amplitude, baseline + k * gain, sigma_k)
            })
            .collect();

        x.iter()
            .map(|&xi| {
                peaks
                    .iter()
                    .map(|&(amplitude, center, sigma_k)| amplitude * gaussian(xi, center, sigma_k))
                    .sum()
            })
            .collect()
    }
}
