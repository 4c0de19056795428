//! Shared domain types.
//!
//! These types are intentionally small and serializable so they can be:
//!
//! - threaded through the per-channel fit without hidden state
//! - persisted alongside fit results
//! - reloaded by a later pipeline stage as its prior

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which physical model a stage fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Pure Gaussian pedestal, high voltage off.
    HvOff,
    /// Generalized-Poisson multi-photoelectron spectrum at low light.
    LowLight,
    /// Gaussian-sum over the full dynamic range.
    FullRange,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::HvOff, ModelKind::LowLight, ModelKind::FullRange];

    /// Registered model name (used in files and on the command line).
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::HvOff => "hv-off",
            ModelKind::LowLight => "low-light",
            ModelKind::FullRange => "full-range",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Contiguous bin range `[start, stop)` taken every `stride` bins.
///
/// A region covering fewer than two bins is degenerate and means
/// "do not fit this channel".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub start: usize,
    pub stop: usize,
    pub stride: usize,
}

impl Roi {
    /// Region covering bins `first..=last`.
    pub fn inclusive(first: usize, last: usize) -> Self {
        Self {
            start: first,
            stop: last + 1,
            stride: 1,
        }
    }

    /// The sentinel region `[0, 1, 1]`.
    pub fn unfittable() -> Self {
        Self {
            start: 0,
            stop: 1,
            stride: 1,
        }
    }

    /// Number of bins selected.
    pub fn len(&self) -> usize {
        if self.stop <= self.start || self.stride == 0 {
            return 0;
        }
        (self.stop - self.start).div_ceil(self.stride)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_degenerate(&self) -> bool {
        self.len() < 2
    }

    /// Select the region from a per-bin slice. Out-of-range indices are clipped.
    pub fn slice(&self, values: &[f64]) -> Vec<f64> {
        let stop = self.stop.min(values.len());
        if self.start >= stop || self.stride == 0 {
            return Vec::new();
        }
        values[self.start..stop]
            .iter()
            .step_by(self.stride)
            .copied()
            .collect()
    }
}

/// Ordered model parameters, any of which may be undefined.
///
/// `None` means "could not estimate". A vector with any undefined entry must
/// never reach the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    values: Vec<Option<f64>>,
}

impl ParameterVector {
    /// `len` undefined parameters.
    pub fn undefined(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }

    pub fn from_values(values: &[f64]) -> Self {
        Self {
            values: values.iter().map(|&v| Some(v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Set a parameter. Non-finite values are stored as undefined.
    pub fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.is_finite().then_some(value);
        }
    }

    pub fn is_fully_undefined(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// All values, or `None` when any parameter is undefined or non-finite.
    pub fn resolved(&self) -> Option<Vec<f64>> {
        self.values
            .iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect()
    }
}

/// Per-parameter box constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    /// `(-∞, ∞)` for every parameter.
    pub fn unbounded(len: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; len],
            upper: vec![f64::INFINITY; len],
        }
    }

    /// Empty bounds to be filled with [`Bounds::push`].
    pub fn with_capacity(n_params: usize) -> Self {
        Self {
            lower: Vec::with_capacity(n_params),
            upper: Vec::with_capacity(n_params),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Push an interval, swapping the ends when they arrive out of order.
    pub fn push(&mut self, a: f64, b: f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.lower.push(lo);
        self.upper.push(hi);
    }

    /// Lengths agree with `n_params`, no bound is NaN and `lower <= upper`.
    pub fn is_consistent(&self, n_params: usize) -> bool {
        self.lower.len() == n_params
            && self.upper.len() == n_params
            && self
                .lower
                .iter()
                .zip(&self.upper)
                .all(|(lo, hi)| !lo.is_nan() && !hi.is_nan() && lo <= hi)
    }

    /// Whether parameter `index` is pinned by a collapsed interval.
    pub fn is_fixed(&self, index: usize) -> bool {
        matches!((self.lower.get(index), self.upper.get(index)), (Some(lo), Some(hi)) if lo == hi)
    }

    /// Project parameters into the box.
    pub fn clamp(&self, params: &mut [f64]) {
        for ((p, &lo), &hi) in params.iter_mut().zip(&self.lower).zip(&self.upper) {
            *p = p.clamp(lo, hi);
        }
    }
}

/// A fitted parameter value and its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub error: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfittable_roi_is_degenerate() {
        let roi = Roi::unfittable();
        assert_eq!((roi.start, roi.stop, roi.stride), (0, 1, 1));
        assert!(roi.is_degenerate());
        assert!(!Roi::inclusive(2000, 2001).is_degenerate());
    }

    #[test]
    fn roi_slice_honours_stride_and_clips() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let roi = Roi {
            start: 2,
            stop: 20,
            stride: 3,
        };
        assert_eq!(roi.slice(&values), vec![2.0, 5.0, 8.0]);
        assert_eq!(roi.len(), 6);
    }

    #[test]
    fn parameter_vector_resolves_only_when_complete() {
        let mut p = ParameterVector::undefined(3);
        assert!(p.is_fully_undefined());
        assert!(p.resolved().is_none());
        p.set(0, 1.0);
        p.set(1, f64::NAN);
        p.set(2, 3.0);
        assert_eq!(p.get(1), None);
        assert!(p.resolved().is_none());
        p.set(1, 2.0);
        assert_eq!(p.resolved(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn bounds_push_orders_ends_and_clamps() {
        let mut b = Bounds::with_capacity(2);
        b.push(3.0, 1.0);
        b.push(0.0, f64::INFINITY);
        assert!(b.is_consistent(2));
        let mut p = [5.0, -1.0];
        b.clamp(&mut p);
        assert_eq!(p, [3.0, 0.0]);
    }
}
