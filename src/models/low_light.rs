//! Multi-photoelectron spectrum at low light.
//!
//! The number of detected photoelectrons follows a generalized Poisson law
//! (mean `mu`, crosstalk `mu_xt`); each photoelectron count `n` contributes a
//! Gaussian centered `n · gain` above the baseline with width
//! `sqrt(sigma_e² + n · sigma_1²)`:
//!
//! ```text
//! f(x) = amplitude · Σ_n GP(n; mu, mu_xt) · N(x - baseline; n·gain, σ_n) + offset
//! ```
//!
//! The sum runs over a component window derived from the data extent on every
//! call (see [`ComponentWindow`]).

use serde::{Deserialize, Serialize};

use crate::domain::{Bounds, ChannelHistogram, ModelKind, ParameterVector, PriorFit, Roi};
use crate::math::{find_peaks, fit_line, fit_through_origin, gaussian, generalized_poisson, weighted_mean, weighted_std};
use crate::models::{CalibrationModel, nonzero_span};

pub const PARAMETERS: [&str; 8] = [
    "mu", "mu_xt", "gain", "baseline", "sigma_e", "sigma_1", "amplitude", "offset",
];

const MU: usize = 0;
const MU_XT: usize = 1;
const GAIN: usize = 2;
const BASELINE: usize = 3;
const SIGMA_E: usize = 4;
const SIGMA_1: usize = 5;
const AMPLITUDE: usize = 6;
const OFFSET: usize = 7;

/// `mu` when the mean position gives a non-finite estimate.
pub const MU_FALLBACK: f64 = 100.0;
/// `mu` when the mean position lies below the baseline.
pub const MU_FLOOR: f64 = 0.01;
/// `gain` when the estimate is non-finite or not positive.
pub const GAIN_FALLBACK: f64 = 1.0;

const LOWER: [f64; 8] = [1e-3, 1e-4, 0.0, f64::NEG_INFINITY, 0.0, 0.0, 0.0, f64::NEG_INFINITY];
const UPPER: [f64; 8] = [
    2000.0,
    1.0,
    f64::INFINITY,
    f64::INFINITY,
    f64::INFINITY,
    f64::INFINITY,
    f64::INFINITY,
    f64::INFINITY,
];

/// Which photoelectron counts the evaluator sums over.
///
/// With `lo`/`hi` the distance of the first/last bin center from the baseline
/// in units of gain, the window is `{0} ∪ [floor(lo · lower_margin), ceil(hi · upper_margin)]`,
/// never wider than `max_components` terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWindow {
    pub upper_margin: f64,
    pub lower_margin: f64,
    pub max_components: u32,
}

impl Default for ComponentWindow {
    fn default() -> Self {
        Self {
            upper_margin: 1.5,
            lower_margin: 0.7,
            max_components: 2048,
        }
    }
}

impl ComponentWindow {
    /// Photoelectron counts to sum for data spanning `[x_min, x_max]`.
    pub fn indices(&self, x_min: f64, x_max: f64, baseline: f64, gain: f64) -> Vec<u32> {
        let mut out = vec![0u32];
        if !(gain > 0.0) || !gain.is_finite() {
            return out;
        }
        let hi = ((x_max - baseline) / gain * self.upper_margin).ceil();
        if !(hi >= 1.0) {
            return out;
        }
        let lo = ((x_min - baseline) / gain * self.lower_margin).floor();
        let start = if lo.is_finite() { lo.max(1.0) } else { 1.0 };
        let limit = f64::from(self.max_components.max(1));
        let start = start.min(limit) as u32;
        let stop = hi.min(f64::from(start) + limit - 1.0) as u32;
        out.extend(start..=stop);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowLightModel {
    /// Gain seed when the prior stage does not define one (ADC / p.e.).
    pub default_gain: f64,
    /// Single-photoelectron width seed when the prior stage does not define one.
    pub default_sigma_1: f64,
    /// Crosstalk probability seed.
    pub crosstalk_seed: f64,
    /// Relative peak-height threshold for blind peak detection.
    pub peak_threshold: f64,
    /// Ignore counts in the last (saturated) bin when picking the fit region.
    pub exclude_saturation: bool,
    pub components: ComponentWindow,
}

impl Default for LowLightModel {
    fn default() -> Self {
        Self {
            default_gain: 5.6,
            default_sigma_1: 0.5,
            crosstalk_seed: 0.08,
            peak_threshold: 0.05,
            exclude_saturation: true,
            components: ComponentWindow::default(),
        }
    }
}

/// Gain and single-p.e. width refined from the photoelectron peaks.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PeakEstimate {
    n_peaks: usize,
    gain: Option<f64>,
    sigma_1: Option<f64>,
}

impl LowLightModel {
    fn estimate_from_peaks(&self, x: &[f64], y: &[f64], gain: f64, sigma_e: f64, bin_width: f64) -> PeakEstimate {
        let no_peaks = PeakEstimate {
            n_peaks: 0,
            gain: None,
            sigma_1: None,
        };
        // Peaks spaced wider than the region cannot be resolved.
        let Some(half_window) = half_gain_in_bins(gain, bin_width, x.len()) else {
            return no_peaks;
        };
        let peaks = find_peaks(y, self.peak_threshold, half_window);
        if peaks.is_empty() {
            return no_peaks;
        }

        let photo_peak: Vec<f64> = (0..peaks.len()).map(|n| n as f64).collect();
        let positions: Vec<f64> = peaks.iter().map(|&i| x[i]).collect();
        let fitted_gain = fit_line(&photo_peak, &positions)
            .map(|(_, slope)| slope)
            .filter(|g| g.is_finite() && *g > 0.0);
        let gain = fitted_gain.unwrap_or(gain);

        // Spread of each peak from the second moment inside ±gain/2.
        let half_window = half_gain_in_bins(gain, bin_width, x.len()).unwrap_or(half_window);
        let spreads: Vec<f64> = peaks
            .iter()
            .map(|&p| {
                let start = p.saturating_sub(half_window);
                let end = p.saturating_add(half_window).saturating_add(1).min(x.len());
                weighted_std(&x[start..end], &y[start..end])
                    .filter(|s| s.is_finite() && *s > 0.0)
                    .unwrap_or(sigma_e)
            })
            .collect();

        // σ_n² - σ_e² = n · σ_1²
        let excess: Vec<f64> = spreads.iter().map(|s| s * s - sigma_e * sigma_e).collect();
        // A zero width would start the fit on a flat direction; keep the seed instead.
        let sigma_1 = fit_through_origin(&photo_peak, &excess)
            .filter(|v| *v > 0.0)
            .map(f64::sqrt);

        PeakEstimate {
            n_peaks: peaks.len(),
            gain: fitted_gain,
            sigma_1,
        }
    }
}

/// `gain / 2` in bins, at least one; `None` when it is not finite or spans
/// the whole region.
fn half_gain_in_bins(gain: f64, bin_width: f64, n_bins: usize) -> Option<usize> {
    let half = ((gain / 2.0) / bin_width).floor().max(1.0);
    (half.is_finite() && half < n_bins as f64).then_some(half as usize)
}

impl CalibrationModel for LowLightModel {
    fn kind(&self) -> ModelKind {
        ModelKind::LowLight
    }

    fn parameter_names(&self) -> Vec<String> {
        PARAMETERS.iter().map(|s| s.to_string()).collect()
    }

    fn select_roi(&self, hist: ChannelHistogram<'_>, _prior: Option<PriorFit<'_>>) -> Roi {
        match nonzero_span(hist, self.exclude_saturation) {
            Some((first, last)) => Roi::inclusive(first, last),
            None => Roi::unfittable(),
        }
    }

    fn estimate_guess(
        &self,
        hist: ChannelHistogram<'_>,
        roi: &Roi,
        prior: Option<PriorFit<'_>>,
    ) -> ParameterVector {
        let mut guess = ParameterVector::undefined(PARAMETERS.len());
        let Some(prior) = prior else {
            return guess;
        };
        let (Some(baseline), Some(sigma_e)) = (prior.value("baseline"), prior.value("sigma_e")) else {
            return guess;
        };
        let mut gain = prior
            .value("gain")
            .filter(|g| *g > 0.0)
            .unwrap_or(self.default_gain);
        let mut sigma_1 = prior.value("sigma_1").unwrap_or(self.default_sigma_1);

        guess.set(MU_XT, self.crosstalk_seed);
        guess.set(GAIN, gain);
        guess.set(BASELINE, baseline);
        guess.set(SIGMA_E, sigma_e);
        guess.set(SIGMA_1, sigma_1);
        guess.set(OFFSET, 0.0);

        if roi.is_degenerate() {
            return guess;
        }
        let x = roi.slice(hist.bin_centers);
        let y = roi.slice(hist.counts);
        let Some(mean) = weighted_mean(&x, &y) else {
            return guess;
        };
        let bin_width = hist.bin_width() * roi.stride as f64;
        guess.set(AMPLITUDE, y.iter().sum::<f64>() * bin_width);

        // With no peaks the seeded gain and sigma_1 stay, but `mu` is still
        // normalised below so the channel reaches the solver instead of being
        // skipped with a partially defined guess.
        let peaks = self.estimate_from_peaks(&x, &y, gain, sigma_e, bin_width);
        if peaks.n_peaks > 0 {
            if let Some(g) = peaks.gain {
                gain = g;
            }
            if let Some(s) = peaks.sigma_1 {
                sigma_1 = s;
            }
        }

        if !(gain.is_finite() && gain > 0.0) {
            gain = GAIN_FALLBACK;
        }
        if !sigma_1.is_finite() {
            sigma_1 = self.default_sigma_1;
        }
        let mut mu = (mean - baseline) / gain;
        if !mu.is_finite() {
            mu = MU_FALLBACK;
        }
        if mu < 0.0 {
            mu = MU_FLOOR;
        }

        guess.set(MU, mu);
        guess.set(GAIN, gain);
        guess.set(SIGMA_1, sigma_1);
        guess
    }

    fn compute_bounds(&self, _prior: Option<PriorFit<'_>>) -> Bounds {
        Bounds {
            lower: LOWER.to_vec(),
            upper: UPPER.to_vec(),
        }
    }

    fn evaluate(&self, params: &[f64], x: &[f64]) -> Vec<f64> {
        let &[mu, mu_xt, gain, baseline, sigma_e, sigma_1, amplitude, offset] = params else {
            return vec![f64::NAN; x.len()];
        };
        if x.is_empty() {
            return Vec::new();
        }
        if !(gain > 0.0) {
            return vec![f64::NAN; x.len()];
        }

        let (x_min, x_max) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let terms: Vec<(f64, f64, f64)> = self
            .components
            .indices(x_min, x_max, baseline, gain)
            .into_iter()
            .map(|n| {
                let n_f = f64::from(n);
                let weight = generalized_poisson(n, mu, mu_xt);
                let sigma_n = (sigma_e * sigma_e + n_f * sigma_1 * sigma_1).sqrt();
                (weight, n_f * gain, sigma_n)
            })
            .collect();

        x.iter()
            .map(|&xi| {
                let shifted = xi - baseline;
                let sum: f64 = terms
                    .iter()
                    .map(|&(weight, center, sigma_n)| weight * gaussian(shifted, center, sigma_n))
                    .sum();
                amplitude * sum + offset
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Estimate, Histogram};
    use approx::assert_relative_eq;

    const TRUTH: [f64; 8] = [1.0, 0.08, 5.6, 2000.0, 0.9, 0.5, 1000.0, 0.0];

    fn hv_off_prior_names() -> Vec<String> {
        vec!["amplitude".into(), "baseline".into(), "sigma_e".into()]
    }

    fn hv_off_prior_estimates() -> Vec<Estimate> {
        vec![
            Estimate { value: 1e5, error: 1.0 },
            Estimate { value: 2000.0, error: 0.01 },
            Estimate { value: 0.9, error: 0.01 },
        ]
    }

    #[test]
    fn zero_photoelectron_peak_dominates_at_unit_mean() {
        let model = LowLightModel::default();
        let x: Vec<f64> = (1994..=2030).map(f64::from).collect();
        let y = model.evaluate(&TRUTH, &x);

        assert!(y.iter().all(|v| v.is_finite() && *v >= 0.0));
        let (imax, _) = y
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((x[imax] - TRUTH[BASELINE]).abs() <= TRUTH[GAIN]);
    }

    #[test]
    fn component_window_grows_with_dynamic_range() {
        let window = ComponentWindow::default();
        let narrow = window.indices(1994.0, 2030.0, 2000.0, 5.6);
        let wide = window.indices(1994.0, 2600.0, 2000.0, 5.6);
        assert_eq!(narrow[0], 0);
        assert_eq!(*narrow.last().unwrap(), 9);
        assert!(wide.len() > 150);

        // Data entirely below the baseline still keeps the zero term.
        assert_eq!(window.indices(1900.0, 1990.0, 2000.0, 5.6), vec![0]);
        // Data far above the baseline skips low counts but keeps zero.
        let high = window.indices(2500.0, 2600.0, 2000.0, 5.0);
        assert_eq!(high[0], 0);
        assert_eq!(high[1], 70);
    }

    #[test]
    fn component_window_is_capped() {
        let window = ComponentWindow {
            max_components: 16,
            ..ComponentWindow::default()
        };
        let idx = window.indices(0.0, 1e6, 0.0, 1.0);
        assert_eq!(idx.len(), 17);
    }

    #[test]
    fn guess_needs_prior() {
        let model = LowLightModel::default();
        let mut h = Histogram::uniform(0.0, 4095.0, 1.0, 1).unwrap();
        h.fill(0, 2000.0, 50.0);
        h.fill(0, 2001.0, 30.0);
        let ch = h.channel(0).unwrap();

        let roi = model.select_roi(ch, None);
        assert_eq!(roi, Roi { start: 2000, stop: 2002, stride: 1 });
        assert!(!roi.is_degenerate());

        let guess = model.estimate_guess(ch, &roi, None);
        assert_eq!(guess.len(), PARAMETERS.len());
        assert!(guess.is_fully_undefined());
    }

    #[test]
    fn guess_recovers_gain_and_mean_from_peaks() {
        let model = LowLightModel::default();
        let centers: Vec<f64> = (1980..=2060).map(f64::from).collect();
        let counts = model.evaluate(&[1.2, 0.05, 6.0, 2000.0, 0.9, 0.4, 50_000.0, 0.0], &centers);
        let h = Histogram::new(centers, vec![counts]).unwrap();
        let ch = h.channel(0).unwrap();

        let names = hv_off_prior_names();
        let estimates = hv_off_prior_estimates();
        let prior = PriorFit::new(&names, &estimates);

        let roi = model.select_roi(ch, Some(prior));
        let guess = model.estimate_guess(ch, &roi, Some(prior)).resolved().unwrap();

        assert_relative_eq!(guess[GAIN], 6.0, max_relative = 0.05);
        assert_relative_eq!(guess[BASELINE], 2000.0);
        // Mean photoelectron count including crosstalk: mu / (1 - mu_xt).
        assert_relative_eq!(guess[MU], 1.2 / 0.95, max_relative = 0.1);
        assert_relative_eq!(guess[AMPLITUDE], 50_000.0, max_relative = 1e-3);
        assert!(guess[SIGMA_1] >= 0.0);
    }

    #[test]
    fn peak_window_never_exceeds_region() {
        assert_eq!(half_gain_in_bins(6.0, 1.0, 80), Some(3));
        assert_eq!(half_gain_in_bins(0.5, 1.0, 80), Some(1));
        assert_eq!(half_gain_in_bins(200.0, 1.0, 80), None);
        assert_eq!(half_gain_in_bins(1e20, 1.0, 80), None);
        assert_eq!(half_gain_in_bins(6.0, 0.0, 80), None);
    }

    #[test]
    fn huge_prior_gain_keeps_seed_without_peaks() {
        let model = LowLightModel::default();
        let centers: Vec<f64> = (1980..=2060).map(f64::from).collect();
        let counts = model.evaluate(&[1.2, 0.05, 6.0, 2000.0, 0.9, 0.4, 50_000.0, 0.0], &centers);
        let h = Histogram::new(centers, vec![counts]).unwrap();
        let ch = h.channel(0).unwrap();

        let names: Vec<String> = vec!["baseline".into(), "sigma_e".into(), "gain".into()];
        let estimates = vec![
            Estimate { value: 2000.0, error: 0.01 },
            Estimate { value: 0.9, error: 0.01 },
            Estimate { value: 1e20, error: 1.0 },
        ];
        let prior = PriorFit::new(&names, &estimates);

        let roi = model.select_roi(ch, Some(prior));
        let guess = model.estimate_guess(ch, &roi, Some(prior)).resolved().unwrap();
        assert_eq!(guess[GAIN], 1e20);
        assert!(guess[MU] >= 0.0);
    }

    #[test]
    fn saturated_bin_does_not_inflate_amplitude() {
        let model = LowLightModel::default();
        let centers: Vec<f64> = (1980..=2060).map(f64::from).collect();
        let mut counts = model.evaluate(&[1.2, 0.05, 6.0, 2000.0, 0.9, 0.4, 50_000.0, 0.0], &centers);
        if let Some(last) = counts.last_mut() {
            *last = 1e6;
        }
        let h = Histogram::new(centers, vec![counts]).unwrap();
        let ch = h.channel(0).unwrap();

        let names = hv_off_prior_names();
        let estimates = hv_off_prior_estimates();
        let prior = PriorFit::new(&names, &estimates);

        let roi = model.select_roi(ch, Some(prior));
        assert_eq!(roi.stop, h.n_bins() - 1);
        let guess = model.estimate_guess(ch, &roi, Some(prior)).resolved().unwrap();
        assert_relative_eq!(guess[AMPLITUDE], 50_000.0, max_relative = 1e-3);
    }

    #[test]
    fn bounds_are_fixed_and_ordered() {
        let b = LowLightModel::default().compute_bounds(None);
        assert!(b.is_consistent(PARAMETERS.len()));
        assert_eq!(b.upper[MU], 2000.0);
        assert_eq!(b.lower[MU_XT], 1e-4);
    }
}
