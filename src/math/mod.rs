//! Mathematical utilities: linear least squares, densities, moments, peaks.

pub mod ols;
pub mod pdf;
pub mod peaks;
pub mod stats;

pub use ols::*;
pub use pdf::*;
pub use peaks::*;
pub use stats::*;
