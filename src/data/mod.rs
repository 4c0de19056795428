//! Data sources.
//!
//! - `synthetic`: histograms generated from known model parameters

pub mod synthetic;

pub use synthetic::*;
