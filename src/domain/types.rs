//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and simulation
//! - exported to JSON/CSV
//! - compared between runs (determinism tests)

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// z-value of a two-sided 95% normal interval.
pub const Z_95: f64 = 1.96;

/// Which fitting strategies to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    /// Lag-feature forest when exogenous variables are given, else the
    /// univariate chain (seasonal ARIMA, then trend regression).
    Auto,
    /// Seasonal ARIMA only.
    Sarima,
    /// Trend + seasonality regression only.
    Trend,
    /// Lag-feature forest only.
    Forest,
}

/// Concrete strategy that produced a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Sarima,
    Trend,
    Forest,
}

impl StrategyKind {
    pub fn display_name(self) -> &'static str {
        match self {
            StrategyKind::Sarima => "Seasonal ARIMA",
            StrategyKind::Trend => "Trend + seasonality",
            StrategyKind::Forest => "Lag-feature forest",
        }
    }
}

/// Output presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Verbose human-readable report.
    Report,
    /// Terse machine-readable JSON summary on stdout.
    Json,
}

/// Where historical data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// NASA POWER daily point API.
    Power,
    /// Local CSV file with a `date` column and one column per variable.
    Csv(PathBuf),
    /// Seeded synthetic climate (offline runs, demos).
    Synthetic,
}

/// One day of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ForecastPoint {
    pub fn point(date: NaiveDate, mean: f64) -> Self {
        Self {
            date,
            mean,
            lower: None,
            upper: None,
        }
    }

    /// Build a point with a symmetric 95% interval of standard deviation `std`.
    pub fn with_std(date: NaiveDate, mean: f64, std: f64) -> Self {
        let half = Z_95 * std.max(0.0);
        Self {
            date,
            mean,
            lower: Some(mean - half),
            upper: Some(mean + half),
        }
    }

    /// Standard deviation implied by the interval, if the model reported one.
    pub fn std(&self) -> Option<f64> {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) if lo.is_finite() && hi.is_finite() => {
                Some(((hi - lo) / (2.0 * Z_95)).max(0.0))
            }
            _ => None,
        }
    }
}

/// Contiguous daily forecast covering the requested horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPath {
    points: Vec<ForecastPoint>,
}

impl ForecastPath {
    /// Validate contiguity and interval ordering.
    pub fn new(points: Vec<ForecastPoint>) -> Result<Self, AppError> {
        for w in points.windows(2) {
            if w[1].date != w[0].date + Duration::days(1) {
                return Err(AppError::fit(format!(
                    "Forecast dates are not contiguous: {} -> {}.",
                    w[0].date, w[1].date
                )));
            }
        }
        for p in &points {
            if !p.mean.is_finite() {
                return Err(AppError::fit(format!("Non-finite forecast mean on {}.", p.date)));
            }
            if let (Some(lo), Some(hi)) = (p.lower, p.upper) {
                if !(lo <= p.mean && p.mean <= hi) {
                    return Err(AppError::fit(format!(
                        "Forecast interval does not bracket the mean on {}.",
                        p.date
                    )));
                }
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }

    /// Keep the trailing `n` points.
    pub fn keep_last(mut self, n: usize) -> Self {
        let drop = self.points.len().saturating_sub(n);
        self.points.drain(..drop);
        self
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub lat: f64,
    pub lon: f64,
    pub start_year: i32,
    pub end_year: i32,

    /// Variable being forecast (e.g. `T2M`).
    pub target: String,
    /// Additional drivers for the lag-feature model.
    pub exogenous: Vec<String>,

    /// Exceedance threshold in the target's units.
    pub threshold: f64,
    pub forecast_days: usize,
    /// Explicit first forecast day; defaults to tomorrow.
    pub forecast_start: Option<NaiveDate>,

    pub lags: usize,
    pub n_sims: usize,
    pub buffer_days: u32,
    pub n_trees: usize,
    pub seed: u64,

    pub model_spec: ModelSpec,
    pub source: SourceSpec,
    pub output: OutputMode,
    pub out_dir: Option<PathBuf>,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat)) {
            return Err(AppError::invalid("Latitude must be within [-90, 90]."));
        }
        if !(self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon)) {
            return Err(AppError::invalid("Longitude must be within [-180, 180]."));
        }
        if self.end_year < self.start_year {
            return Err(AppError::invalid("End year must not precede start year."));
        }
        if !self.threshold.is_finite() {
            return Err(AppError::invalid("Threshold must be finite."));
        }
        if self.forecast_days == 0 {
            return Err(AppError::invalid("Forecast horizon must be > 0 days."));
        }
        if self.lags == 0 {
            return Err(AppError::invalid("Lag depth must be > 0."));
        }
        if self.n_sims == 0 {
            return Err(AppError::invalid("Simulation count must be > 0."));
        }
        if self.n_trees == 0 {
            return Err(AppError::invalid("Tree count must be > 0."));
        }
        if self.target.trim().is_empty() {
            return Err(AppError::invalid("Target variable must be named."));
        }
        if self
            .exogenous
            .iter()
            .any(|v| v.eq_ignore_ascii_case(&self.target))
        {
            return Err(AppError::invalid("Target variable must not be listed as exogenous."));
        }
        Ok(())
    }

    /// Target followed by exogenous variables (deduplicated, order kept).
    pub fn model_variables(&self) -> Vec<String> {
        let mut out = vec![self.target.clone()];
        for v in &self.exogenous {
            if !out.iter().any(|o| o.eq_ignore_ascii_case(v)) {
                out.push(v.clone());
            }
        }
        out
    }
}
