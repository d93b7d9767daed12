//! Additive trend + seasonality regression.
//!
//! ```text
//! y(t) = β0 + β1·t + Σ_k [a_k sin(2πk t/P_year) + b_k cos(2πk t/P_year)]
//!                  + Σ_k [c_k sin(2πk t/7)      + d_k cos(2πk t/7)]
//! ```
//!
//! `t` is measured in days from the first observation. Daily seasonality is
//! constant on a daily grid, so it folds into the intercept `β0`.
//!
//! The interval uses the in-sample residual standard deviation, which keeps the
//! model cheap and deterministic.

use std::f64::consts::PI;

use nalgebra::DVector;

use crate::error::AppError;
use crate::math::{design_matrix, population_std, solve_least_squares};

pub const YEAR_DAYS: f64 = 365.25;
const YEARLY_ORDER: usize = 10;
const WEEKLY_ORDER: usize = 3;

/// Minimum number of observations beyond the parameter count.
const MIN_N_BUFFER: usize = 5;

#[derive(Debug, Clone)]
pub struct TrendModel {
    pub betas: Vec<f64>,
    pub sigma: f64,
    yearly_order: usize,
    weekly_order: usize,
    /// Day offset of the first value after the history.
    next_t: usize,
    residuals: Vec<f64>,
}

impl TrendModel {
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn predict_at(&self, t: f64) -> f64 {
        let row = design_row(t, self.yearly_order, self.weekly_order);
        row.iter().zip(self.betas.iter()).map(|(x, b)| x * b).sum()
    }

    /// Forecast `steps` ahead. Returns `(mean, std)` per step.
    pub fn forecast(&self, steps: usize) -> Vec<(f64, f64)> {
        (0..steps)
            .map(|h| (self.predict_at((self.next_t + h) as f64), self.sigma))
            .collect()
    }
}

/// `[1, t/year, yearly sin/cos .., weekly sin/cos ..]`. Daily seasonal terms
/// are constant on a daily grid, so the intercept stands in for them.
fn design_row(t: f64, yearly_order: usize, weekly_order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + 2 * (yearly_order + weekly_order));
    row.push(1.0);
    row.push(t / YEAR_DAYS);
    for k in 1..=yearly_order {
        let w = 2.0 * PI * k as f64 * t / YEAR_DAYS;
        row.push(w.sin());
        row.push(w.cos());
    }
    for k in 1..=weekly_order {
        let w = 2.0 * PI * k as f64 * t / 7.0;
        row.push(w.sin());
        row.push(w.cos());
    }
    row
}

/// Fit the regression on a contiguous daily series (missing days allowed).
pub fn fit_trend(values: &[Option<f64>]) -> Result<TrendModel, AppError> {
    let observed: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(t, v)| v.filter(|x| x.is_finite()).map(|x| (t, x)))
        .collect();

    // Shorter histories cannot identify high yearly harmonics.
    let span_years = values.len() as f64 / YEAR_DAYS;
    let yearly_order = if span_years >= 1.0 {
        YEARLY_ORDER
    } else {
        ((span_years * YEARLY_ORDER as f64).floor() as usize).min(YEARLY_ORDER)
    };
    let weekly_order = WEEKLY_ORDER;
    let k = 2 + 2 * (yearly_order + weekly_order);
    if observed.len() < k + MIN_N_BUFFER {
        return Err(AppError::fit(format!(
            "Underdetermined trend regression: n={} < {}.",
            observed.len(),
            k + MIN_N_BUFFER
        )));
    }

    let rows: Vec<Vec<f64>> = observed
        .iter()
        .map(|(t, _)| design_row(*t as f64, yearly_order, weekly_order))
        .collect();
    let design =
        design_matrix(&rows).ok_or_else(|| AppError::fit("Failed to build trend design matrix."))?;
    let y = DVector::from_iterator(observed.len(), observed.iter().map(|(_, v)| *v));
    let beta = solve_least_squares(&design, &y)
        .ok_or_else(|| AppError::fit("Trend regression is ill-conditioned."))?;
    let betas: Vec<f64> = beta.iter().copied().collect();

    let residuals: Vec<f64> = rows
        .iter()
        .zip(observed.iter())
        .map(|(row, (_, v))| v - row.iter().zip(betas.iter()).map(|(x, b)| x * b).sum::<f64>())
        .collect();
    let sigma = population_std(&residuals).unwrap_or(0.0);
    if !sigma.is_finite() {
        return Err(AppError::fit("Trend regression produced a non-finite residual spread."));
    }

    Ok(TrendModel {
        betas,
        sigma,
        yearly_order,
        weekly_order,
        next_t: values.len(),
        residuals,
    })
}
