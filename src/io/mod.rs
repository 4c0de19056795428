//! Input/output helpers.
//!
//! - histogram JSON read/write (`histogram`)
//! - fit-result and config JSON read/write (`results`)

pub mod histogram;
pub mod results;

pub use histogram::*;
pub use results::*;
