//! Model fitting orchestration.
//!
//! Responsibilities:
//!
//! - wrap each model family as a [`FitStrategy`]
//! - run strategies in priority order and fall back on failure

pub mod selection;
pub mod strategy;

pub use selection::*;
pub use strategy::*;
