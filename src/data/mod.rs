//! Historical data providers.
//!
//! A provider returns one daily [`TimeSeries`] per requested variable it could
//! find. Sentinel codes are already missing values; temperatures reported in
//! Kelvin are converted to Celsius. A requested variable the source does not
//! carry is simply absent from the result; callers decide whether that is
//! fatal.

pub mod power;
pub mod sample;

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::domain::{SourceSpec, TimeSeries};
use crate::error::AppError;
use crate::io::load_history_csv;

pub use power::PowerClient;
pub use sample::SyntheticHistory;

/// Series whose mean exceeds this are taken to be in Kelvin.
const KELVIN_MEAN_THRESHOLD: f64 = 200.0;
const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub lat: f64,
    pub lon: f64,
    pub start_year: i32,
    pub end_year: i32,
    pub variables: Vec<String>,
    /// Requests reaching into the current year end here.
    pub today: NaiveDate,
}

impl HistoryRequest {
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start_year, 1, 1)
    }

    /// Dec 31 of the end year, capped at today.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let end = NaiveDate::from_ymd_opt(self.end_year, 12, 31)?;
        Some(end.min(self.today))
    }
}

pub trait HistoryProvider {
    fn name(&self) -> &'static str;

    fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError>;
}

/// Local CSV history (see [`load_history_csv`] for the layout).
pub struct CsvHistory {
    path: PathBuf,
}

impl CsvHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryProvider for CsvHistory {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
        let columns = load_history_csv(&self.path, request)?;
        Ok(columns
            .into_iter()
            .map(|(name, series)| {
                let series = normalize_units(&name, series);
                (name, series)
            })
            .collect())
    }
}

/// Build the provider selected on the command line.
pub fn provider_for(source: &SourceSpec, seed: u64) -> Result<Box<dyn HistoryProvider>, AppError> {
    Ok(match source {
        SourceSpec::Power => Box::new(PowerClient::from_env()?),
        SourceSpec::Csv(path) => Box::new(CsvHistory::new(path.clone())),
        SourceSpec::Synthetic => Box::new(SyntheticHistory::new(seed)),
    })
}

/// Find the source key for a requested variable: exact match (ignoring
/// case) first, then the first key that extends it (`PRECTOT` matches
/// `PRECTOTCORR`).
pub fn match_variable<'a, I>(requested: &str, available: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let keys: Vec<&str> = available.into_iter().collect();
    let wanted = requested.to_ascii_lowercase();
    keys.iter()
        .find(|k| k.to_ascii_lowercase() == wanted)
        .or_else(|| keys.iter().find(|k| k.to_ascii_lowercase().starts_with(&wanted)))
        .copied()
}

fn is_temperature(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("T2M") || upper == "TS"
}

/// Convert a temperature series from Kelvin when its level says so.
pub fn normalize_units(name: &str, series: TimeSeries) -> TimeSeries {
    if !is_temperature(name) || !series.mean().is_some_and(|m| m > KELVIN_MEAN_THRESHOLD) {
        return series;
    }
    tracing::info!(variable = name, "converting Kelvin to Celsius");
    let start = series.start();
    let values = series
        .values()
        .iter()
        .map(|v| v.map(|k| k - KELVIN_OFFSET))
        .collect();
    TimeSeries::new(start, values)
}
