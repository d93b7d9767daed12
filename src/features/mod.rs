//! Supervised feature construction for the lag-feature model.

pub mod lags;

pub use lags::*;
