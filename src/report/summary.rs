//! Machine-readable run summaries.
//!
//! [`CompactSummary`] is the one-line JSON object printed in `--output json`
//! mode; [`PersistedSummary`] is written to `forecast_summary.json`. Numbers
//! that could not be computed serialize as `null`, never as absent keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::climate::{
    ClimatologyStats, RECENT_DAYS, RiskLabel, ShrinkageEstimate, ShrinkageInputs, assess, display_value,
    historical_average, sample_for_date, shrink,
};
use crate::data::match_variable;
use crate::domain::TimeSeries;
use crate::math::mean;

pub const SPARKLINE_POINTS: usize = 20;
const SPARKLINE_MIN_RANGE: f64 = 1e-6;

/// Days averaged for variables that are not modelled.
pub const RECENT_MEAN_DAYS: usize = 7;

/// The rain amount drives the risk score.
pub const DOMINANT_FACTOR: &str = "Rain";

/// The three variables every summary reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryVariable {
    Temperature,
    Precipitation,
    Wind,
}

impl SummaryVariable {
    pub const ALL: [SummaryVariable; 3] = [
        SummaryVariable::Temperature,
        SummaryVariable::Precipitation,
        SummaryVariable::Wind,
    ];

    /// POWER parameter fetched for this variable.
    pub fn parameter(self) -> &'static str {
        match self {
            SummaryVariable::Temperature => "T2M",
            SummaryVariable::Precipitation => "PRECTOTCORR",
            SummaryVariable::Wind => "WS2M",
        }
    }

    /// Whether a modelled variable name refers to this summary variable
    /// (`PRECTOT` refers to `PRECTOTCORR`).
    pub fn is_modelled_as(self, name: &str) -> bool {
        match_variable(name, [self.parameter()]).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Readings {
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub wind_m_s: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsByVariable {
    pub temp_c: Option<ClimatologyStats>,
    pub precip_mm: Option<ClimatologyStats>,
    pub wind_m_s: Option<ClimatologyStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrecipReading {
    pub precip_mm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactSummary {
    pub location: Location,
    pub forecast_date: NaiveDate,
    pub forecast: Readings,
    pub historical_avg: Readings,
    pub historical_stats: StatsByVariable,
    pub forecast_adjusted: PrecipReading,
    pub forecast_raw: PrecipReading,
    pub climate_risk_score: u8,
    pub risk_label: RiskLabel,
    pub dominant_factor: &'static str,
    pub sparkline: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSummary {
    /// `[lat, lon]`
    pub location: [f64; 2],
    pub hist_start: NaiveDate,
    pub hist_end: NaiveDate,
    pub forecast_start: Option<NaiveDate>,
    pub forecast_end: Option<NaiveDate>,
    pub threshold_c: f64,
    pub overall_daily_exceed_prob: Option<f64>,
}

/// Per-variable outlook for the forecast date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableOutlook {
    pub forecast: Option<f64>,
    pub historical_avg: Option<f64>,
    pub stats: Option<ClimatologyStats>,
    /// Day-window sample behind `stats`.
    pub sample: Vec<f64>,
    /// Most recent observations, oldest first.
    pub recent: Vec<f64>,
}

impl VariableOutlook {
    /// `modelled` is the first forecast day when this variable is the
    /// model target; otherwise the recent mean stands in.
    pub fn build(series: Option<&TimeSeries>, date: NaiveDate, buffer: u32, modelled: Option<f64>) -> Self {
        let Some(series) = series else {
            return Self {
                forecast: modelled,
                ..Self::default()
            };
        };
        let sample = sample_for_date(series, date, buffer);
        let recent = series.tail_observed(RECENT_DAYS);
        let recent_mean = mean(&recent[recent.len().saturating_sub(RECENT_MEAN_DAYS)..]);
        Self {
            forecast: modelled.or(recent_mean),
            historical_avg: historical_average(&sample, series),
            stats: ClimatologyStats::from_sample(&sample),
            sample,
            recent,
        }
    }
}

/// Inputs for [`build_compact_summary`].
pub struct SummaryInputs<'a> {
    pub location: Location,
    pub forecast_date: NaiveDate,
    pub temperature: VariableOutlook,
    pub precipitation: VariableOutlook,
    pub wind: VariableOutlook,
    /// Forecast path means (sparkline source).
    pub path_means: &'a [f64],
    /// Recent target observations (sparkline fallback).
    pub target_recent: &'a [f64],
}

/// Compact summary plus the precipitation shrinkage behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub compact: CompactSummary,
    pub shrinkage: ShrinkageEstimate,
    pub display_precip: Option<f64>,
}

pub fn build_compact_summary(inputs: SummaryInputs<'_>) -> SummaryOutcome {
    let precip = &inputs.precipitation;
    let shrinkage = shrink(&ShrinkageInputs {
        forecast: precip.forecast,
        recent: &precip.recent,
        window: &precip.sample,
        stats: precip.stats.as_ref(),
        non_negative: true,
    });
    let display_precip = display_value(
        shrinkage.value.or(shrinkage.raw),
        precip.stats.as_ref(),
        precip.historical_avg,
    );
    let risk_input = [display_precip, shrinkage.value, shrinkage.raw]
        .into_iter()
        .find_map(|v| v);
    let (score, label) = assess(risk_input);

    let sparkline = sparkline(inputs.path_means).or_else(|| {
        let tail = &inputs.target_recent[inputs.target_recent.len().saturating_sub(SPARKLINE_POINTS)..];
        sparkline(tail)
    });

    let compact = CompactSummary {
        location: inputs.location,
        forecast_date: inputs.forecast_date,
        forecast: Readings {
            temp_c: round2(inputs.temperature.forecast),
            precip_mm: round2(display_precip),
            wind_m_s: round2(inputs.wind.forecast),
        },
        historical_avg: Readings {
            temp_c: round2(inputs.temperature.historical_avg),
            precip_mm: round2(precip.historical_avg),
            wind_m_s: round2(inputs.wind.historical_avg),
        },
        historical_stats: StatsByVariable {
            temp_c: inputs.temperature.stats.clone(),
            precip_mm: precip.stats.clone(),
            wind_m_s: inputs.wind.stats.clone(),
        },
        forecast_adjusted: PrecipReading {
            precip_mm: round2(shrinkage.value),
        },
        forecast_raw: PrecipReading {
            precip_mm: round2(shrinkage.raw),
        },
        climate_risk_score: score,
        risk_label: label,
        dominant_factor: DOMINANT_FACTOR,
        sparkline,
    };

    SummaryOutcome {
        compact,
        shrinkage,
        display_precip,
    }
}

/// Up to [`SPARKLINE_POINTS`] values scaled to `0..=1`.
pub fn sparkline(values: &[f64]) -> Option<Vec<f64>> {
    let vals: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .take(SPARKLINE_POINTS)
        .collect();
    if vals.is_empty() {
        return None;
    }
    let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = (max - min).max(SPARKLINE_MIN_RANGE);
    Some(vals.iter().map(|v| (v - min) / range).collect())
}

fn round2(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(|x| (x * 100.0).round() / 100.0)
}
