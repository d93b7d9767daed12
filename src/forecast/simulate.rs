//! Monte-Carlo exceedance probabilities.
//!
//! For every forecast day we draw `n_sims` values from `Normal(mean, std)` and
//! count how many exceed the threshold. The spread comes from the model's
//! interval when it has one, else from the residual standard deviation, else
//! [`FALLBACK_STD`].
//!
//! Day `i` draws from its own seed stream, so the days can be simulated in
//! parallel without changing the result.

use chrono::{Datelike, NaiveDate};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::ForecastPath;
use crate::error::AppError;
use crate::math::{population_std, stream_rng};

pub const DEFAULT_SIMS: usize = 2000;

/// Spread used when neither an interval nor residuals are available.
pub const FALLBACK_STD: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayExceedance {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub std: f64,
    pub prob: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyExceedance {
    pub year: i32,
    pub month: u32,
    pub total_days: usize,
    pub avg_prob: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceedanceSummary {
    pub threshold: f64,
    pub days: Vec<DayExceedance>,
    /// Share of all draws above the threshold; NaN for an empty horizon.
    pub pooled: f64,
}

impl ExceedanceSummary {
    /// The pooled probability, or `None` when there was nothing to simulate.
    pub fn pooled_prob(&self) -> Option<f64> {
        self.pooled.is_finite().then_some(self.pooled)
    }

    /// Per calendar month: number of days and mean daily probability.
    pub fn monthly(&self) -> Vec<MonthlyExceedance> {
        let mut out: Vec<MonthlyExceedance> = Vec::new();
        for day in &self.days {
            let (year, month) = (day.date.year(), day.date.month());
            match out.last_mut() {
                Some(m) if m.year == year && m.month == month => {
                    m.avg_prob += day.prob;
                    m.total_days += 1;
                }
                _ => out.push(MonthlyExceedance {
                    year,
                    month,
                    total_days: 1,
                    avg_prob: day.prob,
                }),
            }
        }
        for m in &mut out {
            m.avg_prob /= m.total_days as f64;
        }
        out
    }
}

/// Standard deviation of the residuals when usable.
fn residual_std(residuals: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    population_std(&finite).filter(|s| s.is_finite() && *s > 0.0)
}

pub fn simulate_exceedance(
    path: &ForecastPath,
    residuals: &[f64],
    threshold: f64,
    n_sims: usize,
    seed: u64,
) -> Result<ExceedanceSummary, AppError> {
    if n_sims == 0 {
        return Err(AppError::invalid("Simulation count must be > 0."));
    }
    let fallback = residual_std(residuals).unwrap_or(FALLBACK_STD);

    let days: Vec<DayExceedance> = path
        .points()
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let std = p.std().filter(|s| s.is_finite()).unwrap_or(fallback);
            let normal = Normal::new(p.mean, std)
                .map_err(|e| AppError::fit(format!("Invalid simulation spread on {}: {e}.", p.date)))?;
            let mut rng = stream_rng(seed, i as u64);
            let hits = (0..n_sims)
                .filter(|_| normal.sample(&mut rng) > threshold)
                .count();
            Ok(DayExceedance {
                date: p.date,
                mean: p.mean,
                lower: p.lower,
                upper: p.upper,
                std,
                prob: hits as f64 / n_sims as f64,
            })
        })
        .collect::<Result<_, AppError>>()?;

    // Every day has the same number of draws, so the pooled share is the
    // mean of the daily probabilities.
    let pooled = if days.is_empty() {
        f64::NAN
    } else {
        days.iter().map(|d| d.prob).sum::<f64>() / days.len() as f64
    };

    Ok(ExceedanceSummary {
        threshold,
        days,
        pooled,
    })
}
