//! `wx-forecast` library crate.
//!
//! Point forecasts of a daily environmental variable plus the probability of
//! exceeding a threshold, blended with day-of-year climatology.
//!
//! The binary (`wxf`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod climate;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
