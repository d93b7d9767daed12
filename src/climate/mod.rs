//! Climatology: day-window statistics, shrinkage toward them, and risk scoring.

pub mod risk;
pub mod shrinkage;
pub mod window;

pub use risk::*;
pub use shrinkage::*;
pub use window::*;
