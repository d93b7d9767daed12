//! Blend a short-horizon forecast with its climatology prior.
//!
//! Inputs and their fallbacks are resolved as named candidate chains:
//!
//! - forecast variance `v_f`: sample variance of the recent observations
//! - prior mean `p`: the climatology window median
//! - prior variance `v_p`: window sample variance, else `(IQR / 1.349)²`
//!
//! An empty climatology window provides no prior, so the raw forecast passes
//! through unmodified.

use serde::Serialize;

use crate::climate::window::ClimatologyStats;
use crate::math::sample_variance;

/// Recent observations used for the forecast variance.
pub const RECENT_DAYS: usize = 14;

pub const WEIGHT_MIN: f64 = 0.3;
pub const WEIGHT_MAX: f64 = 0.9;

/// IQR of a standard normal distribution.
const IQR_TO_SD: f64 = 1.349;

/// Variance used when a variance source is missing or not positive.
const DEFAULT_VARIANCE: f64 = 1.0;

/// How the blended value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMethod {
    /// Relative-uncertainty weight, clamped to `[WEIGHT_MIN, WEIGHT_MAX]`.
    Weighted,
    /// Inverse-variance posterior mean with defaulted variances.
    Posterior,
    ForecastOnly,
    PriorOnly,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShrinkageEstimate {
    pub value: Option<f64>,
    /// Weight on the prior; set only for [`BlendMethod::Weighted`].
    pub prior_weight: Option<f64>,
    pub raw: Option<f64>,
    pub method: BlendMethod,
}

#[derive(Debug, Clone, Copy)]
pub struct ShrinkageInputs<'a> {
    pub forecast: Option<f64>,
    /// Most recent observations, oldest first.
    pub recent: &'a [f64],
    /// Climatology window sample.
    pub window: &'a [f64],
    pub stats: Option<&'a ClimatologyStats>,
    /// Clamp the result at zero (precipitation, wind).
    pub non_negative: bool,
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

fn forecast_variance(recent: &[f64]) -> Option<f64> {
    let tail = &recent[recent.len().saturating_sub(RECENT_DAYS)..];
    sample_variance(tail)
}

fn prior_variance(window: &[f64], stats: Option<&ClimatologyStats>) -> Option<f64> {
    let candidates: [&dyn Fn() -> Option<f64>; 2] = [
        &|| sample_variance(window),
        &|| {
            stats.map(|s| {
                let iqr = s.iqr();
                if iqr > 0.0 { (iqr / IQR_TO_SD).powi(2) } else { DEFAULT_VARIANCE }
            })
        },
    ];
    candidates.iter().find_map(|c| c())
}

pub fn shrink(inputs: &ShrinkageInputs<'_>) -> ShrinkageEstimate {
    let f = inputs.forecast.filter(|v| v.is_finite());
    // Prior is the window median only: an empty window has no prior and the
    // raw forecast passes through. The full-series mean is used for display.
    let p = inputs.stats.map(|s| s.median);
    let v_f = forecast_variance(inputs.recent);
    let v_p = prior_variance(inputs.window, inputs.stats);

    let (value, prior_weight, method) = match (f, p) {
        (None, None) => (None, None, BlendMethod::NoData),
        (Some(f), None) => (Some(f), None, BlendMethod::ForecastOnly),
        (None, Some(p)) => (Some(p), None, BlendMethod::PriorOnly),
        (Some(f), Some(p)) => match (positive(v_f), positive(v_p)) {
            (Some(vf), Some(vp)) => {
                let w = (vf / (vf + vp)).clamp(WEIGHT_MIN, WEIGHT_MAX);
                (Some(w * p + (1.0 - w) * f), Some(w), BlendMethod::Weighted)
            }
            (vf, vp) => {
                let vf = vf.unwrap_or(DEFAULT_VARIANCE);
                let vp = vp.unwrap_or(DEFAULT_VARIANCE);
                let post = (f / vf + p / vp) / (1.0 / vf + 1.0 / vp);
                (Some(post), None, BlendMethod::Posterior)
            }
        },
    };

    let value = if inputs.non_negative { value.map(|v| v.max(0.0)) } else { value };
    ShrinkageEstimate {
        value,
        prior_weight,
        raw: inputs.forecast,
        method,
    }
}

/// Clamp a value into the historical range for display.
///
/// Bounds, first available wins: `[p25, p75]`, `[min(median, avg),
/// max(median, avg)]`, `[0, median]`, `[0, avg]`, none. The result is never
/// negative.
pub fn display_value(
    base: Option<f64>,
    stats: Option<&ClimatologyStats>,
    hist_avg: Option<f64>,
) -> Option<f64> {
    let base = base.filter(|v| v.is_finite())?;
    let median = stats.map(|s| s.median);
    let bounds = stats
        .map(|s| (s.p25.min(s.p75), s.p25.max(s.p75)))
        .or_else(|| median.zip(hist_avg).map(|(m, a)| (m.min(a), m.max(a))))
        .or_else(|| median.map(|m| (0.0, m)))
        .or_else(|| hist_avg.map(|a| (0.0, a)));

    let clamped = match bounds {
        Some((lo, hi)) => base.max(lo).min(hi),
        None => base,
    };
    Some(clamped.max(0.0))
}
