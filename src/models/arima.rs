//! Seasonal ARIMA fitted by Hannan–Rissanen regression.
//!
//! The model works on the mean-centred series `x_t = y_t - μ` (no differencing):
//!
//! ```text
//! x_t = Σ φ_l x_{t-l} + Σ θ_l e_{t-l} + e_t
//! ```
//!
//! where the AR lag set is `1..=p` plus the seasonal lags `s, 2s, ..=P·s`,
//! and the MA lag set is `1..=q` plus `s, ..=Q·s`. Seasonal terms enter
//! additively rather than as a multiplicative polynomial product, which keeps
//! every stage a plain least squares problem:
//!
//! 1. a long autoregression gives innovation estimates `ê_t`
//! 2. `x_t` is regressed on its lags and the lagged `ê_t`
//! 3. conditional residuals are recomputed recursively with the final
//!    coefficients and give `σ²` and the AIC
//!
//! Forecast intervals come from the ψ-weights of the fitted ARMA recursion:
//! `Var(h) = σ² Σ_{j<h} ψ_j²`.

use std::fmt;

use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::AppError;
use crate::math::{design_matrix, mean, solve_least_squares};

/// Order of the long autoregression used to estimate innovations.
const LONG_AR_ORDER: usize = 10;

/// Minimum number of regression rows beyond the parameter count.
const MIN_N_BUFFER: usize = 10;

/// ψ-weights above this magnitude mark an explosive (non-stationary) fit.
const PSI_LIMIT: f64 = 50.0;

/// AIC slack within which a simpler order is preferred.
const AIC_SLACK: f64 = 2.0;

/// `(p, 0, q)(P, 0, Q)[s]` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SarimaOrder {
    pub p: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl SarimaOrder {
    /// The fixed order used when the automatic search fails: `(1,0,0)`, no seasonal terms.
    pub const FALLBACK: SarimaOrder = SarimaOrder {
        p: 1,
        q: 0,
        seasonal_p: 0,
        seasonal_q: 0,
        period: 0,
    };

    fn ar_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.p).collect();
        if self.period > 0 {
            lags.extend((1..=self.seasonal_p).map(|j| j * self.period));
        }
        lags
    }

    fn ma_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.q).collect();
        if self.period > 0 {
            lags.extend((1..=self.seasonal_q).map(|j| j * self.period));
        }
        lags
    }

    /// Coefficients plus mean and innovation variance.
    pub fn param_count(&self) -> usize {
        self.ar_lags().len() + self.ma_lags().len() + 2
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},0,{})", self.p, self.q)?;
        if self.period > 0 && (self.seasonal_p > 0 || self.seasonal_q > 0) {
            write!(f, "({},0,{})[{}]", self.seasonal_p, self.seasonal_q, self.period)?;
        }
        Ok(())
    }
}

/// Bounds for the automatic order search.
#[derive(Debug, Clone, Copy)]
pub struct SarimaSearch {
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    pub period: usize,
}

impl SarimaSearch {
    /// Search bounds used by the fitting chain: p, q ≤ 3 and P, Q ≤ 2.
    pub fn bounded(period: usize) -> Self {
        Self {
            max_p: 3,
            max_q: 3,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            period,
        }
    }

    fn grid(&self) -> Vec<SarimaOrder> {
        let mut out = Vec::new();
        for p in 0..=self.max_p {
            for q in 0..=self.max_q {
                for seasonal_p in 0..=self.max_seasonal_p {
                    for seasonal_q in 0..=self.max_seasonal_q {
                        out.push(SarimaOrder {
                            p,
                            q,
                            seasonal_p,
                            seasonal_q,
                            period: self.period,
                        });
                    }
                }
            }
        }
        out
    }
}

/// A fitted seasonal ARIMA model.
#[derive(Debug, Clone)]
pub struct SarimaModel {
    pub order: SarimaOrder,
    pub mu: f64,
    pub ar: Vec<(usize, f64)>,
    pub ma: Vec<(usize, f64)>,
    pub sigma2: f64,
    pub aic: f64,
    /// Centred history, needed to seed the forecast recursion.
    x: Vec<f64>,
    /// Conditional residuals aligned with `x` (zero before the burn-in).
    e: Vec<f64>,
    burn_in: usize,
}

impl SarimaModel {
    /// In-sample one-step residuals after the burn-in period.
    pub fn residuals(&self) -> &[f64] {
        &self.e[self.burn_in..]
    }

    /// Forecast `steps` ahead. Returns `(mean, std)` per step.
    pub fn forecast(&self, steps: usize) -> Vec<(f64, f64)> {
        let mut x = self.x.clone();
        let mut e = self.e.clone();
        let psi = psi_weights(&self.ar, &self.ma, steps);
        let mut cum_psi2 = 0.0;
        let mut out = Vec::with_capacity(steps);

        for h in 0..steps {
            let t = x.len();
            let pred = recursion_value(&self.ar, &self.ma, &x, &e, t);
            x.push(pred);
            e.push(0.0);

            cum_psi2 += psi[h] * psi[h];
            out.push((self.mu + pred, (self.sigma2 * cum_psi2).sqrt()));
        }
        out
    }
}

/// Fit a single order.
pub fn fit_sarima(values: &[f64], order: SarimaOrder) -> Result<SarimaModel, AppError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AppError::fit("SARIMA input contains missing or non-finite values."));
    }
    let mu = mean(values).ok_or_else(|| AppError::fit("SARIMA input is empty."))?;
    let x: Vec<f64> = values.iter().map(|v| v - mu).collect();
    let n = x.len();

    let ar_lags = order.ar_lags();
    let ma_lags = order.ma_lags();
    let k = ar_lags.len() + ma_lags.len();

    // Stage 1: innovation estimates (only needed with MA terms).
    let (e_hat, e_start) = if ma_lags.is_empty() {
        (vec![0.0; n], 0)
    } else {
        long_ar_innovations(&x, &order)?
    };

    // Stage 2: regression on lagged values and lagged innovations.
    let max_ar = ar_lags.iter().copied().max().unwrap_or(0);
    let max_ma = ma_lags.iter().copied().max().unwrap_or(0);
    let t0 = max_ar.max(if max_ma > 0 { e_start + max_ma } else { 0 });
    if n < t0 + k + MIN_N_BUFFER {
        return Err(AppError::fit(format!(
            "Underdetermined SARIMA{order}: n={n} < {}.",
            t0 + k + MIN_N_BUFFER
        )));
    }

    let (ar, ma) = if k == 0 {
        (Vec::new(), Vec::new())
    } else {
        let rows: Vec<Vec<f64>> = (t0..n)
            .map(|t| {
                ar_lags
                    .iter()
                    .map(|&l| x[t - l])
                    .chain(ma_lags.iter().map(|&l| e_hat[t - l]))
                    .collect()
            })
            .collect();
        let design = design_matrix(&rows)
            .ok_or_else(|| AppError::fit("Failed to build SARIMA design matrix."))?;
        let y = DVector::from_iterator(n - t0, x[t0..].iter().copied());
        let beta = solve_least_squares(&design, &y)
            .ok_or_else(|| AppError::fit(format!("SARIMA{order} regression is ill-conditioned.")))?;

        let ar: Vec<(usize, f64)> = ar_lags.iter().copied().zip(beta.iter().copied()).collect();
        let ma: Vec<(usize, f64)> = ma_lags
            .iter()
            .copied()
            .zip(beta.iter().skip(ar_lags.len()).copied())
            .collect();
        (ar, ma)
    };

    // Stage 3: conditional residuals with the final coefficients.
    let burn_in = max_ar.max(max_ma).max(1).min(n);
    let mut e = vec![0.0; n];
    for t in max_ar..n {
        e[t] = x[t] - recursion_value(&ar, &ma, &x, &e, t);
    }
    let resid = &e[burn_in..];
    let n_eff = resid.len() as f64;
    let sigma2 = resid.iter().map(|r| r * r).sum::<f64>() / n_eff;
    if !(sigma2.is_finite() && sigma2 > 0.0) {
        return Err(AppError::fit(format!("SARIMA{order} produced a degenerate variance.")));
    }
    if !is_stable(&ar, &ma) {
        return Err(AppError::fit(format!("SARIMA{order} fit is explosive.")));
    }

    let aic = n_eff * sigma2.ln() + 2.0 * order.param_count() as f64;
    Ok(SarimaModel {
        order,
        mu,
        ar,
        ma,
        sigma2,
        aic,
        x,
        e,
        burn_in,
    })
}

/// Search the bounded order grid (in parallel) and return the best fit by AIC.
///
/// Among fits within `AIC_SLACK` of the minimum, the one with the fewest
/// parameters wins; remaining ties go to grid order, so the result does not
/// depend on thread scheduling.
pub fn auto_sarima(values: &[f64], search: &SarimaSearch) -> Result<SarimaModel, AppError> {
    let grid = search.grid();
    let fits: Vec<(usize, SarimaModel)> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, order)| fit_sarima(values, *order).ok().map(|m| (idx, m)))
        .collect();

    let best_aic = fits
        .iter()
        .map(|(_, m)| m.aic)
        .fold(f64::INFINITY, f64::min);
    if !best_aic.is_finite() {
        return Err(AppError::fit("Automatic SARIMA order search found no valid candidate."));
    }

    let mut chosen: Option<&(usize, SarimaModel)> = None;
    for cand in fits.iter().filter(|(_, m)| m.aic <= best_aic + AIC_SLACK) {
        let better = match chosen {
            None => true,
            Some((idx, m)) => {
                let (pc, pm) = (cand.1.order.param_count(), m.order.param_count());
                pc < pm || (pc == pm && (cand.1.aic < m.aic || (cand.1.aic == m.aic && cand.0 < *idx)))
            }
        };
        if better {
            chosen = Some(cand);
        }
    }

    chosen
        .map(|(_, m)| m.clone())
        .ok_or_else(|| AppError::fit("Automatic SARIMA order search found no valid candidate."))
}

fn recursion_value(ar: &[(usize, f64)], ma: &[(usize, f64)], x: &[f64], e: &[f64], t: usize) -> f64 {
    let mut v = 0.0;
    for &(lag, phi) in ar {
        if t >= lag {
            v += phi * x[t - lag];
        }
    }
    for &(lag, theta) in ma {
        if t >= lag {
            v += theta * e[t - lag];
        }
    }
    v
}

/// Innovation estimates from a long autoregression on `x`.
///
/// Returns the residual vector (zero before the start index) and the start index.
fn long_ar_innovations(x: &[f64], order: &SarimaOrder) -> Result<(Vec<f64>, usize), AppError> {
    let n = x.len();
    let mut lags: Vec<usize> = (1..=LONG_AR_ORDER).collect();
    if order.period > LONG_AR_ORDER {
        let seasonal = order.seasonal_p.max(order.seasonal_q);
        lags.extend((1..=seasonal).map(|j| j * order.period));
    }
    let start = lags.iter().copied().max().unwrap_or(0);
    if n < start + lags.len() + MIN_N_BUFFER {
        return Err(AppError::fit("Not enough data for the long autoregression."));
    }

    let rows: Vec<Vec<f64>> = (start..n)
        .map(|t| lags.iter().map(|&l| x[t - l]).collect())
        .collect();
    let design = design_matrix(&rows)
        .ok_or_else(|| AppError::fit("Failed to build long AR design matrix."))?;
    let y = DVector::from_iterator(n - start, x[start..].iter().copied());
    let beta = solve_least_squares(&design, &y)
        .ok_or_else(|| AppError::fit("Long autoregression is ill-conditioned."))?;

    let mut e = vec![0.0; n];
    for t in start..n {
        let fit: f64 = lags.iter().zip(beta.iter()).map(|(&l, b)| b * x[t - l]).sum();
        e[t] = x[t] - fit;
    }
    Ok((e, start))
}

/// ψ-weights of the ARMA recursion: `ψ_0 = 1`, `ψ_j = θ_j + Σ_i φ_i ψ_{j-i}`.
fn psi_weights(ar: &[(usize, f64)], ma: &[(usize, f64)], len: usize) -> Vec<f64> {
    let mut psi = vec![0.0; len.max(1)];
    psi[0] = 1.0;
    for j in 1..psi.len() {
        let mut v = ma
            .iter()
            .filter(|(lag, _)| *lag == j)
            .map(|(_, theta)| theta)
            .sum::<f64>();
        for &(lag, phi) in ar {
            if lag <= j {
                v += phi * psi[j - lag];
            }
        }
        psi[j] = v;
    }
    psi
}

fn is_stable(ar: &[(usize, f64)], ma: &[(usize, f64)]) -> bool {
    let max_lag = ar
        .iter()
        .chain(ma.iter())
        .map(|(l, _)| *l)
        .max()
        .unwrap_or(0);
    let psi = psi_weights(ar, ma, 4 * max_lag + 32);
    psi.iter().all(|p| p.is_finite() && p.abs() <= PSI_LIMIT)
}
