//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - daily series containers (`TimeSeries`, `MultivariateTable`)
//! - forecast outputs (`ForecastPoint`, `ForecastPath`)
//! - run configuration (`ForecastConfig`, `ModelSpec`, `OutputMode`)

pub mod series;
pub mod types;

pub use series::*;
pub use types::*;
