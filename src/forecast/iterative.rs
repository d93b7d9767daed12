//! Turn a fitted model into a contiguous daily forecast path.
//!
//! Models with a native multi-step forecast (SARIMA, trend regression) are
//! asked for every step at once and keep their intervals. The lag forest is
//! stepped one day at a time: each prediction is appended to the working
//! history, and the next feature row is built from that extended history.
//! Exogenous variables are held at their last observed value for every
//! forecast day.
//!
//! When the first requested day lies beyond the day after the last
//! observation, the gap is forecast too and then dropped, so the path always
//! holds exactly `days` points.

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::domain::{ForecastPath, ForecastPoint, MultivariateTable};
use crate::error::AppError;
use crate::features::next_day_features;
use crate::models::{FittedModel, LagForest};

pub fn forecast_path(
    model: &FittedModel,
    table: &MultivariateTable,
    start: NaiveDate,
    days: usize,
) -> Result<ForecastPath, AppError> {
    if days == 0 {
        return ForecastPath::new(Vec::new());
    }
    let first = table.end() + Duration::days(1);
    if start < first {
        return Err(AppError::invalid(format!(
            "Forecast start {start} overlaps the history (last observation {}).",
            table.end()
        )));
    }
    let gap = (start - first).num_days() as usize;
    let steps = gap + days;
    if gap > 0 {
        debug!(gap, "forecasting through the gap before the requested start");
    }

    let points = match model {
        FittedModel::Forest(forest) => step_forward(forest, table, first, steps)?,
        _ => {
            let steps_out = model
                .forecast_steps(steps)
                .ok_or_else(|| AppError::fit("Model has no multi-step forecast."))?;
            steps_out
                .into_iter()
                .enumerate()
                .map(|(h, (mean, std))| ForecastPoint::with_std(first + Duration::days(h as i64), mean, std))
                .collect()
        }
    };

    Ok(ForecastPath::new(points)?.keep_last(days))
}

fn step_forward(
    forest: &LagForest,
    table: &MultivariateTable,
    first: NaiveDate,
    steps: usize,
) -> Result<Vec<ForecastPoint>, AppError> {
    let (history, seeded) = extended_history(forest, table, steps)?;
    Ok(history[seeded..]
        .iter()
        .enumerate()
        .map(|(h, row)| ForecastPoint::point(first + Duration::days(h as i64), row[forest.target_index]))
        .collect())
}

/// Working history after `steps` forecast days, plus the number of observed
/// rows it starts with. Each appended row holds the predicted target and
/// the exogenous values of the last observed day.
fn extended_history(
    forest: &LagForest,
    table: &MultivariateTable,
    steps: usize,
) -> Result<(Vec<Vec<f64>>, usize), AppError> {
    let names: Vec<&str> = table.names().collect();
    if names.len() != forest.variables.len()
        || names
            .iter()
            .zip(forest.variables.iter())
            .any(|(a, b)| !a.eq_ignore_ascii_case(b))
    {
        return Err(AppError::fit("Forecast table does not match the forest's variable layout."));
    }

    // Only the last `lags + 1` days feed the next feature row.
    let keep = (forest.lags + 1).min(table.len());
    let mut history: Vec<Vec<f64>> = Vec::with_capacity(keep + steps);
    for day in table.len() - keep..table.len() {
        let row = table
            .columns()
            .iter()
            .map(|(name, s)| {
                s.values()[day]
                    .ok_or_else(|| AppError::data(format!("{name} has a gap in the most recent {keep} days.")))
            })
            .collect::<Result<Vec<f64>, AppError>>()?;
        history.push(row);
    }

    for _ in 0..steps {
        let features = next_day_features(&history, forest.lags)
            .ok_or_else(|| AppError::data("No history to build forecast features from."))?;
        let pred = forest
            .forest
            .predict(&features)
            .ok_or_else(|| AppError::fit("Forecast feature width does not match the forest."))?;

        // Exogenous columns carry over from the previous row unchanged.
        let mut next = history[history.len() - 1].clone();
        next[forest.target_index] = pred;
        history.push(next);
    }
    Ok((history, keep))
}
