//! The fitting strategies the chain can try.
//!
//! Each strategy reports whether it was compiled in (`sarima`, `trend` and
//! `forest` cargo features) and fits a [`FittedModel`] from the shared
//! [`FitInput`]. Univariate strategies only look at the target column.

use tracing::{debug, warn};

use crate::domain::{MultivariateTable, StrategyKind};
use crate::error::AppError;
use crate::features::build_lag_features;
use crate::models::{
    FittedModel, ForestParams, SarimaOrder, SarimaSearch, auto_sarima, fit_lag_forest, fit_sarima,
    fit_trend,
};

/// History length (days) above which the yearly seasonal period is used.
const YEARLY_PERIOD_MIN_DAYS: usize = 730;

/// Everything a strategy may need.
#[derive(Debug, Clone, Copy)]
pub struct FitInput<'a> {
    pub table: &'a MultivariateTable,
    pub target: &'a str,
    pub lags: usize,
    pub n_trees: usize,
    pub seed: u64,
}

impl FitInput<'_> {
    fn target_values(&self) -> Result<&[Option<f64>], AppError> {
        self.table
            .column(self.target)
            .map(|s| s.values())
            .ok_or_else(|| AppError::data(format!("Target variable {} is not in the table.", self.target)))
    }
}

pub trait FitStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy was compiled into the binary.
    fn is_available(&self) -> bool;

    fn fit(&self, input: &FitInput<'_>) -> Result<FittedModel, AppError>;
}

/// Seasonal period used for the automatic order search.
pub fn seasonal_period(n_days: usize) -> usize {
    if n_days > YEARLY_PERIOD_MIN_DAYS { 365 } else { 7 }
}

pub struct SarimaStrategy;

impl FitStrategy for SarimaStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sarima
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "sarima")
    }

    fn fit(&self, input: &FitInput<'_>) -> Result<FittedModel, AppError> {
        let values: Vec<f64> = input
            .target_values()?
            .iter()
            .map(|v| v.ok_or_else(|| AppError::fit("SARIMA needs a gap-free target series.")))
            .collect::<Result<_, _>>()?;

        let search = SarimaSearch::bounded(seasonal_period(values.len()));
        let model = match auto_sarima(&values, &search) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "order search failed; retrying with {}", SarimaOrder::FALLBACK);
                fit_sarima(&values, SarimaOrder::FALLBACK)?
            }
        };
        debug!(order = %model.order, aic = model.aic, "SARIMA fitted");
        Ok(FittedModel::Sarima(model))
    }
}

pub struct TrendStrategy;

impl FitStrategy for TrendStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Trend
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "trend")
    }

    fn fit(&self, input: &FitInput<'_>) -> Result<FittedModel, AppError> {
        let model = fit_trend(input.target_values()?)?;
        debug!(sigma = model.sigma, "trend regression fitted");
        Ok(FittedModel::Trend(model))
    }
}

pub struct ForestStrategy;

impl FitStrategy for ForestStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Forest
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "forest")
    }

    fn fit(&self, input: &FitInput<'_>) -> Result<FittedModel, AppError> {
        let features = build_lag_features(input.table, input.lags, input.target)?;
        let params = ForestParams {
            n_trees: input.n_trees,
            seed: input.seed,
            ..ForestParams::default()
        };
        let model = fit_lag_forest(&features, &params)?;
        debug!(
            rows = features.len(),
            rmse = model.holdout_rmse.unwrap_or(f64::NAN),
            "lag forest fitted"
        );
        Ok(FittedModel::Forest(model))
    }
}
