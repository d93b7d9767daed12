//! Day-of-year climatology windows.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::domain::TimeSeries;
use crate::math::{mean, median, percentile, top_n};

pub const DEFAULT_BUFFER_DAYS: u32 = 3;

/// Descriptive statistics of a climatology sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimatologyStats {
    pub count: usize,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub top5: Vec<f64>,
}

impl ClimatologyStats {
    /// `None` for an empty sample.
    pub fn from_sample(sample: &[f64]) -> Option<Self> {
        Some(Self {
            count: sample.len(),
            median: median(sample)?,
            p25: percentile(sample, 25.0)?,
            p75: percentile(sample, 75.0)?,
            top5: top_n(sample, 5),
        })
    }

    pub fn iqr(&self) -> f64 {
        (self.p75 - self.p25).abs()
    }
}

/// Values observed within `±buffer` days of `month/day` in each year of `years`.
///
/// A year where `month/day` itself does not exist (Feb 29 outside leap years)
/// contributes nothing. Missing observations are skipped.
pub fn sample_day_window(
    series: &TimeSeries,
    month: u32,
    day: u32,
    buffer: u32,
    years: (i32, i32),
) -> Vec<f64> {
    let buffer = i64::from(buffer);
    let mut out = Vec::new();
    for year in years.0..=years.1 {
        let Some(anchor) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        for offset in -buffer..=buffer {
            if let Some(v) = series.get(anchor + Duration::days(offset)) {
                out.push(v);
            }
        }
    }
    out
}

/// Sample around `target` using the series' own year range.
pub fn sample_for_date(series: &TimeSeries, target: NaiveDate, buffer: u32) -> Vec<f64> {
    sample_day_window(series, target.month(), target.day(), buffer, series.year_range())
}

/// Window mean, else the full-series mean.
pub fn historical_average(sample: &[f64], series: &TimeSeries) -> Option<f64> {
    mean(sample).or_else(|| series.mean())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Three years of day-of-year values (1.0 on Jan 1st).
    fn doy_series() -> TimeSeries {
        let start = d(2020, 1, 1);
        let values = (0..3 * 366)
            .map(|i| Some(f64::from((start + Duration::days(i)).ordinal())))
            .collect();
        TimeSeries::new(start, values)
    }

    #[test]
    fn collects_buffer_around_each_year() {
        let s = doy_series();
        let sample = sample_day_window(&s, 3, 10, 1, (2020, 2022));
        assert_eq!(sample.len(), 9);
        // 2020 is a leap year: Mar 10 is day 70 there, 69 otherwise.
        assert_eq!(&sample[..3], &[69.0, 70.0, 71.0]);
        assert_eq!(&sample[3..6], &[68.0, 69.0, 70.0]);
    }

    #[test]
    fn feb_29_only_exists_in_leap_years() {
        let s = doy_series();
        let sample = sample_day_window(&s, 2, 29, 0, (2020, 2022));
        assert_eq!(sample, vec![60.0]);
    }

    #[test]
    fn missing_values_and_out_of_range_years_are_skipped() {
        let start = d(2021, 6, 1);
        let s = TimeSeries::new(start, vec![Some(1.0), None, Some(3.0)]);
        let sample = sample_day_window(&s, 6, 2, 3, (2019, 2021));
        assert_eq!(sample, vec![1.0, 3.0]);
    }

    #[test]
    fn stats_of_empty_sample_are_none() {
        assert_eq!(ClimatologyStats::from_sample(&[]), None);
        let stats = ClimatologyStats::from_sample(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(stats.count, 6);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.top5, vec![6.0, 5.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn historical_average_falls_back_to_series_mean() {
        let s = TimeSeries::new(d(2024, 1, 1), vec![Some(2.0), Some(4.0)]);
        assert_eq!(historical_average(&[], &s), Some(3.0));
        assert_eq!(historical_average(&[10.0], &s), Some(10.0));
    }
}
