//! Strategy chain: try each strategy in priority order, keep the first fit.
//!
//! Rules:
//! 1. Strategies not compiled in are skipped
//! 2. A failing strategy is recorded with its reason and the chain advances
//! 3. Exhausting the chain is fatal

use tracing::{info, warn};

use crate::domain::{ModelSpec, StrategyKind};
use crate::error::AppError;
use crate::fit::strategy::{FitInput, FitStrategy, ForestStrategy, SarimaStrategy, TrendStrategy};
use crate::models::FittedModel;

/// Output of the chain.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub model: FittedModel,
    /// Strategies tried before the winner and why they were passed over.
    pub skipped: Vec<(StrategyKind, String)>,
}

/// Priority order for a run.
///
/// With exogenous variables `auto` tries the lag forest first, then falls
/// back to the univariate chain on the target.
pub fn strategy_chain(spec: ModelSpec, multivariate: bool) -> Vec<Box<dyn FitStrategy>> {
    match spec {
        ModelSpec::Sarima => vec![Box::new(SarimaStrategy)],
        ModelSpec::Trend => vec![Box::new(TrendStrategy)],
        ModelSpec::Forest => vec![Box::new(ForestStrategy)],
        ModelSpec::Auto if multivariate => vec![
            Box::new(ForestStrategy),
            Box::new(SarimaStrategy),
            Box::new(TrendStrategy),
        ],
        ModelSpec::Auto => vec![Box::new(SarimaStrategy), Box::new(TrendStrategy)],
    }
}

pub fn fit_with_fallback(
    chain: &[Box<dyn FitStrategy>],
    input: &FitInput<'_>,
) -> Result<FitSelection, AppError> {
    let mut skipped = Vec::new();

    for strategy in chain {
        let kind = strategy.kind();
        if !strategy.is_available() {
            info!(strategy = kind.display_name(), "not compiled in; skipping");
            skipped.push((kind, "not compiled in".to_string()));
            continue;
        }
        match strategy.fit(input) {
            Ok(model) => {
                info!(strategy = kind.display_name(), model = %model.describe(), "model selected");
                return Ok(FitSelection { model, skipped });
            }
            Err(e) => {
                warn!(strategy = kind.display_name(), error = %e, "fit failed; trying next strategy");
                skipped.push((kind, e.message().to_string()));
            }
        }
    }

    let reasons: Vec<String> = skipped
        .iter()
        .map(|(k, why)| format!("{}: {why}", k.display_name()))
        .collect();
    Err(AppError::fit(format!(
        "All fitting strategies failed ({}).",
        if reasons.is_empty() { "empty chain".to_string() } else { reasons.join("; ") }
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MultivariateTable, TimeSeries};
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    struct Failing(StrategyKind);

    impl FitStrategy for Failing {
        fn kind(&self) -> StrategyKind {
            self.0
        }
        fn is_available(&self) -> bool {
            true
        }
        fn fit(&self, _: &FitInput<'_>) -> Result<FittedModel, AppError> {
            Err(AppError::fit("synthetic failure"))
        }
    }

    struct Missing;

    impl FitStrategy for Missing {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Sarima
        }
        fn is_available(&self) -> bool {
            false
        }
        fn fit(&self, _: &FitInput<'_>) -> Result<FittedModel, AppError> {
            unreachable!("unavailable strategies are never fitted")
        }
    }

    fn series_table() -> MultivariateTable {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let v: Vec<Option<f64>> = (0..120).map(|i| Some(15.0 + (i % 7) as f64)).collect();
        MultivariateTable::align(vec![("T2M".into(), TimeSeries::new(start, v))]).unwrap()
    }

    fn input(table: &MultivariateTable) -> FitInput<'_> {
        FitInput {
            table,
            target: "T2M",
            lags: 7,
            n_trees: 10,
            seed: 0,
        }
    }

    #[test]
    fn chain_order_follows_priority() {
        let kinds = |c: Vec<Box<dyn FitStrategy>>| c.iter().map(|s| s.kind()).collect::<Vec<_>>();
        assert_eq!(
            kinds(strategy_chain(ModelSpec::Auto, true)),
            vec![StrategyKind::Forest, StrategyKind::Sarima, StrategyKind::Trend]
        );
        assert_eq!(
            kinds(strategy_chain(ModelSpec::Auto, false)),
            vec![StrategyKind::Sarima, StrategyKind::Trend]
        );
        assert_eq!(kinds(strategy_chain(ModelSpec::Trend, true)), vec![StrategyKind::Trend]);
    }

    #[test]
    fn failure_advances_to_next_strategy() {
        let t = series_table();
        let chain: Vec<Box<dyn FitStrategy>> = vec![
            Box::new(Missing),
            Box::new(Failing(StrategyKind::Forest)),
            Box::new(TrendStrategy),
        ];
        let sel = fit_with_fallback(&chain, &input(&t)).unwrap();
        assert_eq!(sel.model.kind(), StrategyKind::Trend);
        assert_eq!(sel.skipped.len(), 2);
        assert_eq!(sel.skipped[1], (StrategyKind::Forest, "synthetic failure".to_string()));
    }

    #[test]
    fn exhausted_chain_is_a_fit_error() {
        let t = series_table();
        let chain: Vec<Box<dyn FitStrategy>> = vec![Box::new(Failing(StrategyKind::Sarima))];
        let err = fit_with_fallback(&chain, &input(&t)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelFit);
        assert!(err.message().contains("synthetic failure"));
    }
}
