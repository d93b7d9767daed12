//! Forecasting model implementations.
//!
//! Each model is fitted by a plain function returning a concrete type; the
//! fitting chain wraps whichever one succeeds in [`FittedModel`] so the
//! forecaster and the simulator can stay generic.

pub mod arima;
pub mod forest;
pub mod trend;

pub use arima::*;
pub use forest::*;
pub use trend::*;

use crate::domain::StrategyKind;

/// A fitted model from any strategy in the chain.
#[derive(Debug, Clone)]
pub enum FittedModel {
    Sarima(SarimaModel),
    Trend(TrendModel),
    Forest(LagForest),
}

impl FittedModel {
    pub fn kind(&self) -> StrategyKind {
        match self {
            FittedModel::Sarima(_) => StrategyKind::Sarima,
            FittedModel::Trend(_) => StrategyKind::Trend,
            FittedModel::Forest(_) => StrategyKind::Forest,
        }
    }

    /// Short description for reports, e.g. `SARIMA(1,0,0)(0,0,0)[0]`.
    pub fn describe(&self) -> String {
        match self {
            FittedModel::Sarima(m) => format!("SARIMA{}", m.order),
            FittedModel::Trend(_) => "trend + yearly/weekly harmonics".to_string(),
            FittedModel::Forest(f) => format!(
                "{} trees, {} lags x {} variables",
                f.forest.n_trees(),
                f.lags,
                f.variables.len()
            ),
        }
    }

    /// Residuals used for the fallback simulation spread.
    ///
    /// The forest reports held-out residuals; the univariate models report
    /// in-sample one-step residuals.
    pub fn residuals(&self) -> &[f64] {
        match self {
            FittedModel::Sarima(m) => m.residuals(),
            FittedModel::Trend(m) => m.residuals(),
            FittedModel::Forest(f) => &f.holdout_residuals,
        }
    }

    pub fn holdout_rmse(&self) -> Option<f64> {
        match self {
            FittedModel::Forest(f) => f.holdout_rmse,
            _ => None,
        }
    }

    /// Native N-step forecast `(mean, std)`; `None` for one-step models.
    pub fn forecast_steps(&self, steps: usize) -> Option<Vec<(f64, f64)>> {
        match self {
            FittedModel::Sarima(m) => Some(m.forecast(steps)),
            FittedModel::Trend(m) => Some(m.forecast(steps)),
            FittedModel::Forest(_) => None,
        }
    }
}
