//! Mathematical utilities: descriptive statistics, least squares and seeding.

pub mod ols;
pub mod rng;
pub mod stats;

pub use ols::*;
pub use rng::*;
pub use stats::*;
