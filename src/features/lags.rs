//! Lag-feature builder for the multivariate (lag-feature) model.
//!
//! For a day `i` the feature vector is laid out as:
//!
//! ```text
//! [v1_lag1 .. v1_lagL, v2_lag1 .. v2_lagL, ..., v1_curr, v2_curr, ...]
//! ```
//!
//! and the supervised target is the target variable on day `i + 1`.
//! `curr` is day `i` itself, `lagk` is day `i - k`.

use chrono::NaiveDate;

use crate::domain::MultivariateTable;
use crate::error::AppError;

/// One supervised row: features known on `date`, target observed the day after.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedFeatureRow {
    pub date: NaiveDate,
    pub features: Vec<f64>,
    pub target: f64,
}

/// Feature rows plus the column layout used to build them.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub variables: Vec<String>,
    pub target: String,
    pub target_index: usize,
    pub lags: usize,
    pub names: Vec<String>,
    pub rows: Vec<LaggedFeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column names in feature order.
pub fn feature_names(variables: &[String], lags: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(variables.len() * (lags + 1));
    for v in variables {
        for lag in 1..=lags {
            names.push(format!("{v}_lag{lag}"));
        }
    }
    for v in variables {
        names.push(format!("{v}_curr"));
    }
    names
}

/// Build the supervised feature table.
///
/// Rows that reference any missing value (lag, current or target) are dropped.
/// With fewer than `lags + 1` days of history the table is empty.
pub fn build_lag_features(
    table: &MultivariateTable,
    lags: usize,
    target: &str,
) -> Result<FeatureTable, AppError> {
    if lags == 0 {
        return Err(AppError::invalid("Lag depth must be > 0."));
    }
    let target_index = table
        .column_index(target)
        .ok_or_else(|| AppError::data(format!("Target variable {target} is not in the table.")))?;
    let variables: Vec<String> = table.names().map(str::to_string).collect();
    let columns: Vec<&[Option<f64>]> = table.columns().iter().map(|(_, s)| s.values()).collect();

    let n = table.len();
    let mut rows = Vec::new();
    if n > lags {
        for i in lags..n - 1 {
            let Some(target_value) = columns[target_index][i + 1] else {
                continue;
            };
            let features = lag_vector(i, lags, columns.len(), |day, var| columns[var][day]);
            if let Some(features) = features {
                rows.push(LaggedFeatureRow {
                    date: table.start() + chrono::Duration::days(i as i64),
                    features,
                    target: target_value,
                });
            }
        }
    }

    Ok(FeatureTable {
        names: feature_names(&variables, lags),
        variables,
        target: target.to_string(),
        target_index,
        lags,
        rows,
    })
}

/// Feature vector for the day after the last row of `history`.
///
/// `history` holds one row per day (variables in table order), oldest first.
/// Lags reaching past the start of the history reuse the oldest row.
pub fn next_day_features(history: &[Vec<f64>], lags: usize) -> Option<Vec<f64>> {
    let last = history.len().checked_sub(1)?;
    let n_vars = history[0].len();
    lag_vector(last, lags, n_vars, |day, var| {
        history.get(day).and_then(|row| row.get(var)).copied()
    })
    .or_else(|| {
        // Short history: clamp to the oldest available day.
        lag_vector_clamped(history, last, lags, n_vars)
    })
}

fn lag_vector(
    anchor: usize,
    lags: usize,
    n_vars: usize,
    value: impl Fn(usize, usize) -> Option<f64>,
) -> Option<Vec<f64>> {
    if anchor < lags {
        return None;
    }
    let mut out = Vec::with_capacity(n_vars * (lags + 1));
    for var in 0..n_vars {
        for lag in 1..=lags {
            out.push(value(anchor - lag, var)?);
        }
    }
    for var in 0..n_vars {
        out.push(value(anchor, var)?);
    }
    Some(out)
}

fn lag_vector_clamped(history: &[Vec<f64>], anchor: usize, lags: usize, n_vars: usize) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(n_vars * (lags + 1));
    for var in 0..n_vars {
        for lag in 1..=lags {
            let day = anchor.saturating_sub(lag);
            out.push(*history.get(day)?.get(var)?);
        }
    }
    for var in 0..n_vars {
        out.push(*history.get(anchor)?.get(var)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeSeries;

    fn table(values_a: Vec<Option<f64>>, values_b: Vec<Option<f64>>) -> MultivariateTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        MultivariateTable::align(vec![
            ("T".into(), TimeSeries::new(start, values_a)),
            ("X".into(), TimeSeries::new(start, values_b)),
        ])
        .unwrap()
    }

    #[test]
    fn layout_and_target_alignment() {
        let a: Vec<Option<f64>> = (0..6).map(|i| Some(i as f64)).collect();
        let b: Vec<Option<f64>> = (0..6).map(|i| Some(100.0 + i as f64)).collect();
        let ft = build_lag_features(&table(a, b), 2, "T").unwrap();

        assert_eq!(ft.names, vec!["T_lag1", "T_lag2", "X_lag1", "X_lag2", "T_curr", "X_curr"]);
        // Rows for i = 2, 3, 4 (i = 5 has no next-day target).
        assert_eq!(ft.len(), 3);
        let first = &ft.rows[0];
        assert_eq!(first.features, vec![1.0, 0.0, 101.0, 100.0, 2.0, 102.0]);
        assert_eq!(first.target, 3.0);
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let mut a: Vec<Option<f64>> = (0..8).map(|i| Some(i as f64)).collect();
        a[4] = None;
        let b: Vec<Option<f64>> = (0..8).map(|_| Some(1.0)).collect();
        let ft = build_lag_features(&table(a, b), 1, "T").unwrap();
        // i in 1..7; day 4 missing kills i=3 (target), i=4 (curr), i=5 (lag1).
        let dates: Vec<u32> = ft.rows.iter().map(|r| chrono::Datelike::day(&r.date)).collect();
        assert_eq!(dates, vec![2, 3, 7]);
    }

    #[test]
    fn short_history_yields_empty_table() {
        let a = vec![Some(1.0), Some(2.0), Some(3.0)];
        let b = vec![Some(1.0), Some(2.0), Some(3.0)];
        let ft = build_lag_features(&table(a, b), 7, "T").unwrap();
        assert!(ft.is_empty());
    }

    #[test]
    fn next_day_features_clamp_to_oldest() {
        let history = vec![vec![1.0, 10.0], vec![2.0, 20.0]];
        let f = next_day_features(&history, 3).unwrap();
        // Anchor is day 1: lag1 is day 0, lags 2 and 3 clamp to day 0.
        assert_eq!(f, vec![1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 2.0, 20.0]);
    }
}
