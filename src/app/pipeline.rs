//! The forecast pipeline shared by every output mode.
//!
//! history fetch -> align/fill -> strategy chain -> iterative forecast ->
//! exceedance simulation -> climatology summary
//!
//! Front-ends only decide how to present a [`RunOutput`].

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::data::{HistoryProvider, HistoryRequest};
use crate::domain::{ForecastConfig, ForecastPath, MultivariateTable, TimeSeries};
use crate::error::AppError;
use crate::fit::{FitInput, FitSelection, fit_with_fallback, strategy_chain};
use crate::forecast::{ExceedanceSummary, forecast_path, simulate_exceedance};
use crate::math::derive_seed;
use crate::report::{
    HistoryWindow, Location, PersistedSummary, SummaryInputs, SummaryOutcome, SummaryVariable, VariableOutlook,
    build_compact_summary,
};

/// Fewer valid target observations than this is fatal.
pub const MIN_OBSERVATIONS: usize = 14;

/// Recent target observations kept for the plot.
const PLOT_HISTORY_DAYS: usize = 60;

/// Seed stream of the Monte-Carlo draws (tree bootstraps use the run seed).
const SIMULATION_STREAM: u64 = 1;

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub history: HistoryWindow,
    pub selection: FitSelection,
    pub path: ForecastPath,
    pub exceedance: ExceedanceSummary,
    pub summary: SummaryOutcome,
    pub persisted: PersistedSummary,
    /// Last observed target values, oldest first.
    pub recent_target: Vec<(NaiveDate, f64)>,
}

/// Variables to request: the model variables, then the summary variables.
fn requested_variables(config: &ForecastConfig) -> Vec<String> {
    let mut out = config.model_variables();
    for sv in SummaryVariable::ALL {
        if !out.iter().any(|v| v.eq_ignore_ascii_case(sv.parameter())) {
            out.push(sv.parameter().to_string());
        }
    }
    out
}

fn take_series(fetched: &[(String, TimeSeries)], name: &str) -> Option<TimeSeries> {
    fetched
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, s)| s.clone())
}

/// Execute the full pipeline against `provider`. `today` anchors the default
/// forecast start and the end of the history request.
pub fn run_forecast(
    config: &ForecastConfig,
    provider: &dyn HistoryProvider,
    today: NaiveDate,
) -> Result<RunOutput, AppError> {
    config.validate()?;
    let forecast_start = config.forecast_start.unwrap_or(today + Duration::days(1));

    // 1) Fetch.
    let request = HistoryRequest {
        lat: config.lat,
        lon: config.lon,
        start_year: config.start_year,
        end_year: config.end_year,
        variables: requested_variables(config),
        today,
    };
    info!(provider = provider.name(), variables = ?request.variables, "fetching history");
    let fetched = provider.fetch(&request)?;

    // 2) Model table: target plus the exogenous variables the source has.
    let target = take_series(&fetched, &config.target).ok_or_else(|| {
        AppError::data(format!(
            "Target variable {} is not available from the {} source.",
            config.target,
            provider.name()
        ))
    })?;
    let mut columns = vec![(config.target.clone(), target)];
    for name in config.model_variables().into_iter().skip(1) {
        match take_series(&fetched, &name) {
            Some(series) => columns.push((name, series)),
            None => warn!(variable = %name, "exogenous variable unavailable; dropping it"),
        }
    }
    let mut table = MultivariateTable::align(columns)
        .ok_or_else(|| AppError::data("No historical data returned."))?;

    // 3) Hindcast: only history before the first forecast day.
    table.truncate_before(forecast_start);
    let history = history_window(&table, &config.target)?;
    info!(
        start = %history.start,
        end = %history.end,
        observed = history.n_observed,
        "history window"
    );
    table.fill_gaps();

    // 4) Fit.
    let input = FitInput {
        table: &table,
        target: &config.target,
        lags: config.lags,
        n_trees: config.n_trees,
        seed: config.seed,
    };
    let chain = strategy_chain(config.model_spec, table.columns().len() > 1);
    let selection = fit_with_fallback(&chain, &input)?;

    // 5) Forecast + exceedance.
    let path = forecast_path(&selection.model, &table, forecast_start, config.forecast_days)?;
    let exceedance = simulate_exceedance(
        &path,
        selection.model.residuals(),
        config.threshold,
        config.n_sims,
        derive_seed(config.seed, SIMULATION_STREAM),
    )?;
    info!(
        days = exceedance.days.len(),
        pooled = ?exceedance.pooled_prob(),
        "exceedance simulated"
    );

    // 6) Climatology summary for the first forecast day.
    let filled_target = table.column(&config.target);
    let first_mean = path.points().first().map(|p| p.mean);
    let outlook = |sv: SummaryVariable| {
        if sv.is_modelled_as(&config.target) {
            return VariableOutlook::build(filled_target, forecast_start, config.buffer_days, first_mean);
        }
        let series = take_series(&fetched, sv.parameter()).map(|mut s| {
            s.truncate_before(forecast_start);
            s
        });
        VariableOutlook::build(series.as_ref(), forecast_start, config.buffer_days, None)
    };
    let path_means = path.means();
    let target_recent = filled_target.map(|s| s.tail_observed(crate::report::SPARKLINE_POINTS)).unwrap_or_default();
    let summary = build_compact_summary(SummaryInputs {
        location: Location {
            lat: config.lat,
            lon: config.lon,
        },
        forecast_date: forecast_start,
        temperature: outlook(SummaryVariable::Temperature),
        precipitation: outlook(SummaryVariable::Precipitation),
        wind: outlook(SummaryVariable::Wind),
        path_means: &path_means,
        target_recent: &target_recent,
    });

    let persisted = PersistedSummary {
        location: [config.lat, config.lon],
        hist_start: history.start,
        hist_end: history.end,
        forecast_start: path.start(),
        forecast_end: path.end(),
        threshold_c: config.threshold,
        overall_daily_exceed_prob: exceedance.pooled_prob(),
    };

    let recent_target = filled_target
        .map(|s| {
            let obs: Vec<(NaiveDate, f64)> = s.observed().collect();
            obs[obs.len().saturating_sub(PLOT_HISTORY_DAYS)..].to_vec()
        })
        .unwrap_or_default();

    Ok(RunOutput {
        history,
        selection,
        path,
        exceedance,
        summary,
        persisted,
        recent_target,
    })
}

/// Observed range of the target before gap filling.
fn history_window(table: &MultivariateTable, target: &str) -> Result<HistoryWindow, AppError> {
    let series = table
        .column(target)
        .ok_or_else(|| AppError::data(format!("Target variable {target} is not in the table.")))?;
    let n_observed = series.count_observed();
    if n_observed < MIN_OBSERVATIONS {
        return Err(AppError::data(format!(
            "Only {n_observed} valid observations of {target} before the forecast start (need {MIN_OBSERVATIONS})."
        )));
    }
    let mut observed = series.observed();
    let start = observed.next().map(|(d, _)| d);
    let end = observed.last().map(|(d, _)| d).or(start);
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AppError::data(format!("No observations of {target}.")));
    };
    Ok(HistoryWindow {
        start,
        end,
        n_observed,
        variables: table.names().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticHistory;
    use crate::domain::{ModelSpec, OutputMode, SourceSpec, StrategyKind};
    use crate::error::ErrorKind;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn config(model_spec: ModelSpec) -> ForecastConfig {
        ForecastConfig {
            lat: 35.0,
            lon: -97.5,
            start_year: 2022,
            end_year: 2024,
            target: "T2M".to_string(),
            exogenous: Vec::new(),
            threshold: 30.0,
            forecast_days: 30,
            forecast_start: None,
            lags: 7,
            n_sims: 500,
            buffer_days: 3,
            n_trees: 20,
            seed: 7,
            model_spec,
            source: SourceSpec::Synthetic,
            output: OutputMode::Report,
            out_dir: None,
            plot: false,
            plot_width: 60,
            plot_height: 12,
        }
    }

    /// Same value every day for the given variables.
    struct ConstantHistory {
        value: f64,
        start: NaiveDate,
        days: usize,
        variables: Vec<&'static str>,
    }

    impl HistoryProvider for ConstantHistory {
        fn name(&self) -> &'static str {
            "constant"
        }

        fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
            Ok(request
                .variables
                .iter()
                .filter(|v| self.variables.iter().any(|have| have.eq_ignore_ascii_case(v)))
                .map(|v| (v.clone(), TimeSeries::new(self.start, vec![Some(self.value); self.days])))
                .collect())
        }
    }

    #[test]
    fn path_starts_tomorrow_and_has_requested_length() {
        let today = d(2024, 12, 31);
        let run = run_forecast(&config(ModelSpec::Trend), &SyntheticHistory::new(3), today).unwrap();
        assert_eq!(run.path.len(), 30);
        assert_eq!(run.path.start(), Some(d(2025, 1, 1)));
        assert_eq!(run.path.end(), Some(d(2025, 1, 30)));
        assert_eq!(run.exceedance.days.len(), 30);
        assert_eq!(run.persisted.hist_start, d(2022, 1, 1));
        assert_eq!(run.persisted.hist_end, d(2024, 12, 31));
        assert_eq!(run.summary.compact.forecast_date, d(2025, 1, 1));
        assert_eq!(run.selection.model.kind(), StrategyKind::Trend);
        assert!(run.exceedance.days.iter().all(|day| (0.0..=1.0).contains(&day.prob)));
        assert!(run.recent_target.len() <= PLOT_HISTORY_DAYS);
    }

    #[test]
    fn runs_are_deterministic_under_a_seed() {
        let today = d(2024, 6, 30);
        let mut cfg = config(ModelSpec::Auto);
        cfg.start_year = 2023;
        cfg.exogenous = vec!["RH2M".to_string(), "WS2M".to_string()];
        let provider = SyntheticHistory::new(11);

        let a = run_forecast(&cfg, &provider, today).unwrap();
        let b = run_forecast(&cfg, &provider, today).unwrap();
        assert_eq!(a.selection.model.kind(), StrategyKind::Forest);
        assert_eq!(a.path, b.path);
        assert_eq!(a.exceedance, b.exceedance);
        assert_eq!(a.summary.compact, b.summary.compact);
        assert!(a.selection.model.holdout_rmse().is_some());
    }

    #[test]
    fn far_threshold_is_never_exceeded() {
        let provider = ConstantHistory {
            value: 25.0,
            start: d(2021, 1, 1),
            days: 3 * 365,
            variables: vec!["T2M"],
        };
        let mut cfg = config(ModelSpec::Trend);
        cfg.threshold = 40.0;
        let run = run_forecast(&cfg, &provider, d(2023, 12, 31)).unwrap();
        let pooled = run.persisted.overall_daily_exceed_prob.unwrap();
        assert!(pooled < 1e-3, "pooled={pooled}");
        assert!(run.path.points().iter().all(|p| (p.mean - 25.0).abs() < 1e-6));
    }

    #[test]
    fn short_history_has_no_climatology_and_keeps_raw_precip() {
        // History Jan 1 .. May 1, forecast from October: no day-window data.
        let mut cfg = config(ModelSpec::Trend);
        cfg.start_year = 2024;
        cfg.end_year = 2024;
        cfg.forecast_start = Some(d(2024, 10, 1));
        cfg.forecast_days = 10;
        let run = run_forecast(&cfg, &SyntheticHistory::new(5), d(2024, 5, 1)).unwrap();

        assert_eq!(run.path.start(), Some(d(2024, 10, 1)));
        assert_eq!(run.path.len(), 10);
        let c = &run.summary.compact;
        assert!(c.historical_stats.temp_c.is_none());
        assert!(c.historical_stats.precip_mm.is_none());
        assert_eq!(c.forecast_adjusted.precip_mm, c.forecast_raw.precip_mm);
        let json = serde_json::to_value(c).unwrap();
        assert!(json["historical_stats"]["wind_m_s"].is_null());
    }

    #[test]
    fn start_inside_history_truncates_it() {
        let mut cfg = config(ModelSpec::Trend);
        cfg.forecast_start = Some(d(2024, 3, 1));
        let run = run_forecast(&cfg, &SyntheticHistory::new(5), d(2024, 12, 31)).unwrap();
        assert_eq!(run.persisted.hist_end, d(2024, 2, 29));
        assert_eq!(run.path.start(), Some(d(2024, 3, 1)));
    }

    #[test]
    fn missing_exogenous_is_dropped() {
        let mut cfg = config(ModelSpec::Trend);
        cfg.exogenous = vec!["NOT_A_VARIABLE".to_string()];
        let run = run_forecast(&cfg, &SyntheticHistory::new(5), d(2024, 12, 31)).unwrap();
        assert_eq!(run.history.variables, vec!["T2M"]);
    }

    /// Serves a POWER JSON body that only carries `T2M`.
    struct PowerBodyHistory;

    impl HistoryProvider for PowerBodyHistory {
        fn name(&self) -> &'static str {
            "power-body"
        }

        fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
            let start = d(2023, 1, 1);
            let days: serde_json::Map<String, serde_json::Value> = (0..500)
                .map(|i| {
                    let date = start + Duration::days(i);
                    (date.format("%Y%m%d").to_string(), serde_json::json!(15.0 + (i % 7) as f64))
                })
                .collect();
            let body = serde_json::json!({"properties": {"parameter": {"T2M": days}}});
            crate::data::power::parse_power_response(&body, &request.variables)
        }
    }

    #[test]
    fn power_response_without_an_exogenous_variable_still_runs() {
        let mut cfg = config(ModelSpec::Auto);
        cfg.exogenous = vec!["RH2M".to_string()];
        cfg.forecast_days = 5;
        let run = run_forecast(&cfg, &PowerBodyHistory, d(2024, 5, 14)).unwrap();
        assert_eq!(run.history.variables, vec!["T2M"]);
        assert_ne!(run.selection.model.kind(), StrategyKind::Forest);
        assert_eq!(run.path.len(), 5);
    }

    #[test]
    fn missing_target_or_short_history_is_data_unavailable() {
        let provider = ConstantHistory {
            value: 1.0,
            start: d(2024, 1, 1),
            days: 10,
            variables: vec!["T2M"],
        };
        let err = run_forecast(&config(ModelSpec::Trend), &provider, d(2024, 12, 31)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnavailable);

        let mut cfg = config(ModelSpec::Trend);
        cfg.target = "QV2M".to_string();
        let err = run_forecast(&cfg, &SyntheticHistory::new(1), d(2024, 12, 31)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnavailable);
    }
}
