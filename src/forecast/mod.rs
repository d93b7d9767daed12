//! Forecast path construction and exceedance simulation.

pub mod iterative;
pub mod simulate;

pub use iterative::*;
pub use simulate::*;
