//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the model registry key (`ModelKind`) and per-channel fit inputs
//!   (`Roi`, `ParameterVector`, `Bounds`)
//! - per-channel histograms (`Histogram`, `ChannelHistogram`)
//! - the fit-result store (`FitResults`, `ChannelFit`, `FitFailure`, `PriorFit`)
//! - run configuration (`CalibConfig`)

pub mod config;
pub mod histogram;
pub mod results;
pub mod types;

pub use config::*;
pub use histogram::*;
pub use results::*;
pub use types::*;
