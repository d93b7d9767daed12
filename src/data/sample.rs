//! Seeded synthetic daily climate for offline runs and tests.
//!
//! The generator produces four physically coupled variables:
//!
//! - `T2M`: a yearly cycle whose amplitude grows with latitude, plus AR(1) noise
//! - `RH2M`: humidity falling as temperature rises above its seasonal norm
//! - `WS2M`: non-negative wind speed around a latitude-dependent mean
//! - `PRECTOTCORR`: a two-state wet/dry Markov chain with exponential amounts
//!
//! Output depends only on the seed, the location and the date range.

use std::collections::hash_map::DefaultHasher;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Exp, Normal};

use crate::data::{HistoryProvider, HistoryRequest, match_variable};
use crate::domain::TimeSeries;
use crate::error::AppError;

const VARIABLES: [&str; 4] = ["T2M", "RH2M", "WS2M", "PRECTOTCORR"];

/// Day of year of the seasonal temperature peak (northern hemisphere).
const PEAK_DOY: f64 = 196.0;

const TEMP_AR: f64 = 0.7;
const TEMP_NOISE_SD: f64 = 1.8;
const P_WET_AFTER_DRY: f64 = 0.25;
const P_WET_AFTER_WET: f64 = 0.6;
const MEAN_WET_DAY_MM: f64 = 6.0;

pub struct SyntheticHistory {
    seed: u64,
}

impl SyntheticHistory {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn location_seed(&self, lat: f64, lon: f64) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        lat.to_bits().hash(&mut hasher);
        lon.to_bits().hash(&mut hasher);
        hasher.finish()
    }

    /// All four variables over `start..=end`, in [`VARIABLES`] order.
    pub fn generate(&self, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> Result<[TimeSeries; 4], AppError> {
        if end < start {
            return Err(AppError::data(format!("History range {start}..{end} is empty.")));
        }
        let n = (end - start).num_days() as usize + 1;
        let mut rng = StdRng::seed_from_u64(self.location_seed(lat, lon));
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AppError::data(format!("Noise distribution error: {e}")))?;
        let rain = Exp::new(1.0 / MEAN_WET_DAY_MM)
            .map_err(|e| AppError::data(format!("Rain distribution error: {e}")))?;

        let abs_lat = lat.abs().min(90.0);
        let base_temp = 28.0 - 0.35 * abs_lat;
        let amplitude = 2.0 + 14.0 * abs_lat / 90.0;
        // Seasons flip south of the equator.
        let phase_shift = if lat < 0.0 { 182.6 } else { 0.0 };
        let base_wind = 2.5 + 3.0 * abs_lat / 90.0;

        let mut t2m = Vec::with_capacity(n);
        let mut rh2m = Vec::with_capacity(n);
        let mut ws2m = Vec::with_capacity(n);
        let mut prec = Vec::with_capacity(n);

        let mut anomaly = 0.0;
        let mut wet = false;
        for i in 0..n {
            let date = start + Duration::days(i as i64);
            let doy = f64::from(date.ordinal());
            let seasonal = base_temp + amplitude * (2.0 * PI * (doy - PEAK_DOY - phase_shift) / 365.25).cos();

            anomaly = TEMP_AR * anomaly + TEMP_NOISE_SD * normal.sample(&mut rng);
            let temp = seasonal + anomaly;

            let p_wet = if wet { P_WET_AFTER_WET } else { P_WET_AFTER_DRY };
            wet = rng.gen_bool(p_wet);
            let mm = if wet { rain.sample(&mut rng) } else { 0.0 };

            let humidity = (65.0 - 2.0 * anomaly + if wet { 15.0 } else { 0.0 } + 5.0 * normal.sample(&mut rng))
                .clamp(5.0, 100.0);
            let wind = (base_wind + 1.2 * normal.sample(&mut rng) + if wet { 1.0 } else { 0.0 }).max(0.0);

            t2m.push(Some(temp));
            rh2m.push(Some(humidity));
            ws2m.push(Some(wind));
            prec.push(Some(mm));
        }

        Ok([
            TimeSeries::new(start, t2m),
            TimeSeries::new(start, rh2m),
            TimeSeries::new(start, ws2m),
            TimeSeries::new(start, prec),
        ])
    }
}

impl HistoryProvider for SyntheticHistory {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn fetch(&self, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
        let (Some(start), Some(end)) = (request.start_date(), request.end_date()) else {
            return Err(AppError::invalid("Invalid history year range."));
        };
        let generated = self.generate(request.lat, request.lon, start, end)?;

        let mut out = Vec::new();
        for name in &request.variables {
            let Some(key) = match_variable(name, VARIABLES) else {
                continue;
            };
            if let Some(idx) = VARIABLES.iter().position(|v| *v == key) {
                out.push((name.clone(), generated[idx].clone()));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::mean;

    fn request(variables: &[&str]) -> HistoryRequest {
        HistoryRequest {
            lat: 45.0,
            lon: 7.0,
            start_year: 2018,
            end_year: 2020,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            today: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[test]
    fn same_seed_same_history() {
        let a = SyntheticHistory::new(7).fetch(&request(&["T2M", "PRECTOT"])).unwrap();
        let b = SyntheticHistory::new(7).fetch(&request(&["T2M", "PRECTOT"])).unwrap();
        assert_eq!(a, b);
        let c = SyntheticHistory::new(8).fetch(&request(&["T2M"])).unwrap();
        assert_ne!(a[0].1, c[0].1);
    }

    #[test]
    fn covers_the_requested_years_and_skips_unknown_variables() {
        let out = SyntheticHistory::new(1).fetch(&request(&["T2M", "QV2M", "PRECTOT"])).unwrap();
        let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["T2M", "PRECTOT"]);
        let t2m = &out[0].1;
        assert_eq!(t2m.start(), NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
        assert_eq!(t2m.end(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
    }

    #[test]
    fn summer_is_warmer_and_rain_is_non_negative() {
        let out = SyntheticHistory::new(3).fetch(&request(&["T2M", "PRECTOTCORR"])).unwrap();
        let t2m = &out[0].1;
        let july: Vec<f64> = t2m.observed().filter(|(d, _)| d.month() == 7).map(|(_, v)| v).collect();
        let january: Vec<f64> = t2m.observed().filter(|(d, _)| d.month() == 1).map(|(_, v)| v).collect();
        assert!(mean(&july).unwrap() > mean(&january).unwrap() + 10.0);
        assert!(out[1].1.observed().all(|(_, v)| v >= 0.0));
    }
}
