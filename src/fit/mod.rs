//! Fitting.
//!
//! Responsibilities:
//!
//! - bounded nonlinear least squares for one channel (`solver`)
//! - the per-channel ROI → guess → bounds → fit loop over a histogram (`orchestrator`)

pub mod orchestrator;
pub mod solver;

pub use orchestrator::*;
pub use solver::*;
