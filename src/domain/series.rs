//! Daily time series containers.
//!
//! Both containers store values on a *contiguous* daily grid: construction
//! reindexes whatever observations the provider returned, so a missing day is
//! an explicit `None` instead of an absent key. This keeps every later stage
//! (lag building, climatology lookups, gap filling) index-based.

use chrono::{Datelike, Duration, NaiveDate};

/// Provider-specific missing-value codes are at or below this value.
pub const SENTINEL_FLOOR: f64 = -900.0;

/// Convert a raw provider value into an observation.
///
/// Sentinel codes and non-finite values become `None`.
pub fn clean_value(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw <= SENTINEL_FLOOR {
        None
    } else {
        Some(raw)
    }
}

/// A single variable on a contiguous daily index.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    start: NaiveDate,
    values: Vec<Option<f64>>,
}

impl TimeSeries {
    /// Build a series that starts at `start` with one value per day.
    pub fn new(start: NaiveDate, values: Vec<Option<f64>>) -> Self {
        Self { start, values }
    }

    /// Build a series from unordered, possibly gappy observations.
    ///
    /// Later duplicates of a date overwrite earlier ones. Returns `None` when
    /// there are no observations at all.
    pub fn from_observations<I>(obs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut obs: Vec<(NaiveDate, Option<f64>)> = obs.into_iter().collect();
        if obs.is_empty() {
            return None;
        }
        obs.sort_by_key(|(d, _)| *d);
        let start = obs[0].0;
        let end = obs[obs.len() - 1].0;
        let len = (end - start).num_days() as usize + 1;
        let mut values = vec![None; len];
        for (date, value) in obs {
            let idx = (date - start).num_days() as usize;
            values[idx] = value.and_then(clean_value);
        }
        Some(Self { start, values })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date on the index (equal to `start` for an empty series).
    pub fn end(&self) -> NaiveDate {
        self.date_at(self.values.len().saturating_sub(1))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn date_at(&self, idx: usize) -> NaiveDate {
        self.start + Duration::days(idx as i64)
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Value on `date`, `None` when the date is outside the index or missing.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        let offset = (date - self.start).num_days();
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied().flatten()
    }

    /// Non-missing `(date, value)` pairs in date order.
    pub fn observed(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (self.date_at(i), v)))
    }

    pub fn observed_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }

    pub fn count_observed(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Mean of all non-missing values.
    pub fn mean(&self) -> Option<f64> {
        crate::math::mean(&self.observed_values())
    }

    /// The last `n` non-missing values, oldest first.
    pub fn tail_observed(&self, n: usize) -> Vec<f64> {
        let mut out: Vec<f64> = self.values.iter().rev().flatten().take(n).copied().collect();
        out.reverse();
        out
    }

    /// Forward-fill, then back-fill the leading gap.
    pub fn fill_gaps(&mut self) {
        let mut last = None;
        for v in self.values.iter_mut() {
            match v {
                Some(x) => last = Some(*x),
                None => *v = last,
            }
        }
        let first = self.values.iter().flatten().next().copied();
        for v in self.values.iter_mut() {
            if v.is_some() {
                break;
            }
            *v = first;
        }
    }

    /// Keep only dates strictly before `date`.
    pub fn truncate_before(&mut self, date: NaiveDate) {
        let keep = (date - self.start).num_days().max(0) as usize;
        self.values.truncate(keep);
    }

    /// Reindex onto `[start, start + len)`, padding with `None`.
    fn reindexed(&self, start: NaiveDate, len: usize) -> Self {
        let values = (0..len)
            .map(|i| self.get(start + Duration::days(i as i64)))
            .collect();
        Self { start, values }
    }

    /// Year range covered by the index.
    pub fn year_range(&self) -> (i32, i32) {
        (self.start.year(), self.end().year())
    }
}

/// Several named variables sharing one daily index.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateTable {
    start: NaiveDate,
    len: usize,
    columns: Vec<(String, TimeSeries)>,
}

impl MultivariateTable {
    /// Align the given series onto the union of their date ranges.
    ///
    /// Returns `None` when `columns` is empty.
    pub fn align(columns: Vec<(String, TimeSeries)>) -> Option<Self> {
        let non_empty: Vec<&TimeSeries> = columns
            .iter()
            .map(|(_, s)| s)
            .filter(|s| !s.is_empty())
            .collect();
        let start = non_empty.iter().map(|s| s.start()).min()?;
        let end = non_empty.iter().map(|s| s.end()).max()?;
        let len = (end - start).num_days() as usize + 1;
        let columns = columns
            .into_iter()
            .map(|(name, s)| {
                let aligned = s.reindexed(start, len);
                (name, aligned)
            })
            .collect();
        Some(Self { start, len, columns })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.len.saturating_sub(1) as i64)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> &[(String, TimeSeries)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&TimeSeries> {
        self.columns
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| s)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn fill_gaps(&mut self) {
        for (_, s) in self.columns.iter_mut() {
            s.fill_gaps();
        }
    }

    pub fn truncate_before(&mut self, date: NaiveDate) {
        for (_, s) in self.columns.iter_mut() {
            s.truncate_before(date);
        }
        self.len = (date - self.start).num_days().clamp(0, self.len as i64) as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn observations_are_reindexed_daily() {
        let s = TimeSeries::from_observations(vec![
            (d(2024, 1, 3), Some(3.0)),
            (d(2024, 1, 1), Some(1.0)),
        ])
        .unwrap();
        assert_eq!(s.start(), d(2024, 1, 1));
        assert_eq!(s.end(), d(2024, 1, 3));
        assert_eq!(s.values(), &[Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn sentinel_values_become_missing() {
        let s = TimeSeries::from_observations(vec![
            (d(2024, 1, 1), Some(-999.0)),
            (d(2024, 1, 2), Some(4.0)),
            (d(2024, 1, 3), Some(f64::NAN)),
        ])
        .unwrap();
        assert_eq!(s.count_observed(), 1);
        assert_eq!(s.mean(), Some(4.0));
    }

    #[test]
    fn fill_gaps_forward_then_backward() {
        let mut s = TimeSeries::new(d(2024, 1, 1), vec![None, Some(2.0), None, Some(5.0), None]);
        s.fill_gaps();
        assert_eq!(
            s.values(),
            &[Some(2.0), Some(2.0), Some(2.0), Some(5.0), Some(5.0)]
        );
    }

    #[test]
    fn align_uses_union_range() {
        let a = TimeSeries::new(d(2024, 1, 1), vec![Some(1.0), Some(2.0)]);
        let b = TimeSeries::new(d(2024, 1, 2), vec![Some(7.0), Some(8.0)]);
        let t = MultivariateTable::align(vec![("A".into(), a), ("B".into(), b)]).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.column("b").unwrap().values(), &[None, Some(7.0), Some(8.0)]);
        assert_eq!(t.column("A").unwrap().values(), &[Some(1.0), Some(2.0), None]);
    }

    #[test]
    fn truncate_before_drops_tail() {
        let a = TimeSeries::new(d(2024, 1, 1), vec![Some(1.0), Some(2.0), Some(3.0)]);
        let mut t = MultivariateTable::align(vec![("A".into(), a)]).unwrap();
        t.truncate_before(d(2024, 1, 3));
        assert_eq!(t.len(), 2);
        assert_eq!(t.end(), d(2024, 1, 2));
        assert_eq!(t.column("A").unwrap().len(), 2);
    }

    #[test]
    fn tail_observed_skips_missing() {
        let s = TimeSeries::new(d(2024, 1, 1), vec![Some(1.0), None, Some(3.0), Some(4.0)]);
        assert_eq!(s.tail_observed(2), vec![3.0, 4.0]);
        assert_eq!(s.tail_observed(10), vec![1.0, 3.0, 4.0]);
    }
}
