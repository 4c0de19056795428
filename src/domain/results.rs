//! Fit-result store.
//!
//! One row per channel, always. A row is either a set of `(value, error)`
//! estimates in the model's parameter order, or a typed failure. Failed rows
//! read back as undefined for every parameter, so "not fit" stays distinct
//! from "fit to zero".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Estimate, ModelKind};

/// Why a single channel produced no estimates.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitFailure {
    #[error("fewer than two usable bins")]
    InsufficientData,
    #[error("initial guess has undefined parameters")]
    UndefinedGuess,
    #[error("bounds are inconsistent with the parameter vector")]
    InvalidBounds,
    #[error("{points} points cannot constrain {params} parameters")]
    TooFewDegreesOfFreedom { points: usize, params: usize },
    #[error("model cost is not finite at the initial guess")]
    NonFiniteCost,
    #[error("no convergence after {iterations} iterations")]
    IterationLimit { iterations: usize },
    #[error("covariance matrix is singular")]
    SingularCovariance,
    #[error("fitted values or errors are not finite")]
    NonFiniteEstimate,
}

/// Outcome of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelFit {
    Fitted {
        estimates: Vec<Estimate>,
        iterations: usize,
        cost: f64,
    },
    Failed {
        reason: FitFailure,
    },
}

impl ChannelFit {
    pub fn failed(reason: FitFailure) -> Self {
        ChannelFit::Failed { reason }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, ChannelFit::Fitted { .. })
    }

    pub fn estimates(&self) -> Option<&[Estimate]> {
        match self {
            ChannelFit::Fitted { estimates, .. } => Some(estimates),
            ChannelFit::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FitFailure> {
        match self {
            ChannelFit::Fitted { .. } => None,
            ChannelFit::Failed { reason } => Some(reason),
        }
    }
}

/// Results of one pipeline stage for every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResults {
    pub model: ModelKind,
    pub parameter_names: Vec<String>,
    rows: Vec<ChannelFit>,
}

impl FitResults {
    pub fn new(model: ModelKind, parameter_names: Vec<String>, rows: Vec<ChannelFit>) -> Self {
        Self {
            model,
            parameter_names,
            rows,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.rows.len()
    }

    pub fn n_params(&self) -> usize {
        self.parameter_names.len()
    }

    pub fn rows(&self) -> &[ChannelFit] {
        &self.rows
    }

    pub fn row(&self, channel: usize) -> Option<&ChannelFit> {
        self.rows.get(channel)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    /// Estimate by `(channel, parameter index)`; `None` when undefined.
    pub fn get(&self, channel: usize, param: usize) -> Option<Estimate> {
        self.rows.get(channel)?.estimates()?.get(param).copied()
    }

    pub fn value(&self, channel: usize, param: usize) -> Option<f64> {
        self.get(channel, param).map(|e| e.value)
    }

    pub fn value_by_name(&self, channel: usize, name: &str) -> Option<f64> {
        self.value(channel, self.parameter_index(name)?)
    }

    /// Read-only view used to seed a later stage. `None` for failed channels.
    pub fn prior(&self, channel: usize) -> Option<PriorFit<'_>> {
        let estimates = self.rows.get(channel)?.estimates()?;
        Some(PriorFit {
            names: &self.parameter_names,
            estimates,
        })
    }

    pub fn fitted_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_fitted()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.rows.len() - self.fitted_count()
    }
}

/// One channel's fitted parameters from an earlier stage, addressed by name.
#[derive(Debug, Clone, Copy)]
pub struct PriorFit<'a> {
    names: &'a [String],
    estimates: &'a [Estimate],
}

impl<'a> PriorFit<'a> {
    pub fn new(names: &'a [String], estimates: &'a [Estimate]) -> Self {
        Self { names, estimates }
    }

    pub fn estimate(&self, name: &str) -> Option<Estimate> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.estimates.get(idx).copied()
    }

    /// Fitted value of `name`, if the prior defines it and it is finite.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.estimate(name)
            .map(|e| e.value)
            .filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FitResults {
        FitResults::new(
            ModelKind::HvOff,
            vec!["amplitude".into(), "baseline".into(), "sigma_e".into()],
            vec![
                ChannelFit::Fitted {
                    estimates: vec![
                        Estimate { value: 1e4, error: 100.0 },
                        Estimate { value: 2010.5, error: 0.015625 },
                        Estimate { value: 0.875, error: 0.0078125 },
                    ],
                    iterations: 7,
                    cost: 12.0,
                },
                ChannelFit::failed(FitFailure::InsufficientData),
            ],
        )
    }

    #[test]
    fn failed_channel_reads_as_undefined() {
        let s = store();
        assert_eq!(s.value_by_name(0, "baseline"), Some(2010.5));
        assert_eq!(s.value_by_name(1, "baseline"), None);
        assert!(s.prior(1).is_none());
        assert_eq!(s.fitted_count(), 1);
        assert_eq!(s.failed_count(), 1);
        assert!((0..s.n_params()).all(|p| s.get(1, p).is_none()));
        assert!(s.get(0, s.n_params()).is_none());
    }

    #[test]
    fn prior_view_resolves_by_name() {
        let s = store();
        let prior = s.prior(0).unwrap();
        assert_eq!(prior.value("sigma_e"), Some(0.875));
        assert_eq!(prior.value("gain"), None);
    }

    #[test]
    fn store_survives_json() {
        let s = store();
        let json = serde_json::to_string(&s).unwrap();
        let back: FitResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
