//! Run configuration.
//!
//! Every tunable lives here and is passed explicitly into the stage that
//! needs it. Missing fields in a config file fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::SolverOptions;
use crate::models::{FullRangeModel, HvOffModel, LowLightModel};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    pub solver: SolverOptions,
    pub hv_off: HvOffModel,
    pub low_light: LowLightModel,
    pub full_range: FullRangeModel,
}

impl CalibConfig {
    /// Reject settings no channel could be fit with.
    pub fn validate(&self) -> Result<(), AppError> {
        let s = &self.solver;
        if s.max_iterations == 0 {
            return Err(AppError::invalid_input("solver.max_iterations must be at least 1."));
        }
        for (name, v) in [
            ("solver.ftol", s.ftol),
            ("solver.xtol", s.xtol),
            ("solver.gtol", s.gtol),
            ("solver.initial_lambda", s.initial_lambda),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AppError::invalid_input(format!("{name} must be finite and non-negative.")));
            }
        }

        if !(self.hv_off.min_sigma.is_finite() && self.hv_off.min_sigma > 0.0) {
            return Err(AppError::invalid_input("hv_off.min_sigma must be positive."));
        }

        let ll = &self.low_light;
        if !(ll.default_gain.is_finite() && ll.default_gain > 0.0) {
            return Err(AppError::invalid_input("low_light.default_gain must be positive."));
        }
        if !(0.0..1.0).contains(&ll.crosstalk_seed) {
            return Err(AppError::invalid_input("low_light.crosstalk_seed must lie in [0, 1)."));
        }
        if !(0.0..=1.0).contains(&ll.peak_threshold) {
            return Err(AppError::invalid_input("low_light.peak_threshold must lie in [0, 1]."));
        }
        let w = &ll.components;
        if !(w.upper_margin >= 1.0 && w.lower_margin > 0.0 && w.lower_margin <= 1.0) {
            return Err(AppError::invalid_input(
                "low_light.components margins must satisfy 0 < lower_margin <= 1 <= upper_margin.",
            ));
        }
        if w.max_components == 0 {
            return Err(AppError::invalid_input("low_light.components.max_components must be at least 1."));
        }

        let fr = &self.full_range;
        if fr.n_components == 0 {
            return Err(AppError::invalid_input("full_range.n_components must be at least 1."));
        }
        for (name, [lo, hi]) in [("full_range.gain_window", fr.gain_window), ("full_range.width_window", fr.width_window)] {
            if !(lo.is_finite() && hi.is_finite() && 0.0 < lo && lo <= hi) {
                return Err(AppError::invalid_input(format!("{name} must satisfy 0 < low <= high.")));
            }
        }
        if !(fr.cutoff_peaks > 0.0 && fr.cutoff_margin > 0.0) {
            return Err(AppError::invalid_input("full_range cutoff settings must be positive."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        CalibConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: CalibConfig =
            serde_json::from_str(r#"{"solver": {"max_iterations": 50}, "full_range": {"n_components": 8}}"#)
                .unwrap();
        assert_eq!(cfg.solver.max_iterations, 50);
        assert_eq!(cfg.solver.ftol, SolverOptions::default().ftol);
        assert_eq!(cfg.full_range.n_components, 8);
        assert_eq!(cfg.low_light, LowLightModel::default());
    }

    #[test]
    fn bad_windows_are_rejected() {
        let mut cfg = CalibConfig::default();
        cfg.full_range.gain_window = [2.0, 0.7];
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID_INPUT);

        let mut cfg = CalibConfig::default();
        cfg.low_light.components.upper_margin = 0.5;
        assert!(cfg.validate().is_err());
    }
}
