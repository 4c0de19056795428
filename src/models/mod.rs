//! Spectrum model implementations.
//!
//! A model is a bundle of four functions sharing one parameter layout:
//! region-of-interest selection, initial guess, bounds and evaluation. The
//! orchestrator only talks to [`CalibrationModel`], so models can be swapped
//! without touching the fit loop.

pub mod full_range;
pub mod hv_off;
pub mod low_light;

pub use full_range::FullRangeModel;
pub use hv_off::HvOffModel;
pub use low_light::{ComponentWindow, LowLightModel};

use crate::domain::{Bounds, CalibConfig, ChannelHistogram, ModelKind, ParameterVector, PriorFit, Roi};

/// The plug-in contract for one physical hypothesis.
///
/// Every method is a pure function of its arguments and the model's own
/// (immutable) settings; channels can call them concurrently.
pub trait CalibrationModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Parameter names in evaluation order.
    fn parameter_names(&self) -> Vec<String>;

    fn n_params(&self) -> usize {
        self.parameter_names().len()
    }

    /// Bins to fit, or [`Roi::unfittable`] when the channel cannot be fit.
    fn select_roi(&self, hist: ChannelHistogram<'_>, prior: Option<PriorFit<'_>>) -> Roi;

    /// Starting point for the solver. Undefined entries mean "skip this channel".
    fn estimate_guess(
        &self,
        hist: ChannelHistogram<'_>,
        roi: &Roi,
        prior: Option<PriorFit<'_>>,
    ) -> ParameterVector;

    fn compute_bounds(&self, prior: Option<PriorFit<'_>>) -> Bounds;

    /// Model counts at each `x`.
    fn evaluate(&self, params: &[f64], x: &[f64]) -> Vec<f64>;
}

/// Instantiate the named model with its configured settings.
pub fn build_model(kind: ModelKind, config: &CalibConfig) -> Box<dyn CalibrationModel> {
    match kind {
        ModelKind::HvOff => Box::new(config.hv_off.clone()),
        ModelKind::LowLight => Box::new(config.low_light.clone()),
        ModelKind::FullRange => Box::new(config.full_range.clone()),
    }
}

/// First and last non-zero bins, if there are at least two.
///
/// With `exclude_saturation`, counts in the histogram's last bin (the ADC
/// ceiling) are ignored.
pub(crate) fn nonzero_span(hist: ChannelHistogram<'_>, exclude_saturation: bool) -> Option<(usize, usize)> {
    let mut nonzero = hist.nonzero_indices();
    if exclude_saturation {
        let saturated = nonzero.last().map(|&i| hist.bin_centers[i]);
        if saturated.is_some() && saturated == hist.upper_edge() {
            nonzero.pop();
        }
    }
    if nonzero.len() < 2 {
        return None;
    }
    Some((nonzero[0], nonzero[nonzero.len() - 1]))
}
