//! Export forecast results to CSV and JSON.
//!
//! Both files are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::AppError;
use crate::forecast::ExceedanceSummary;
use crate::report::PersistedSummary;

pub const SUMMARY_FILE_NAME: &str = "forecast_summary.json";

/// `forecast_{lat*100}_{lon*100}_{start}.csv`, coordinates truncated toward zero.
pub fn forecast_csv_name(lat: f64, lon: f64, start: NaiveDate) -> String {
    format!(
        "forecast_{}_{}_{}.csv",
        (lat * 100.0).trunc() as i64,
        (lon * 100.0).trunc() as i64,
        start.format("%Y-%m-%d")
    )
}

/// Write the daily forecast table.
///
/// Columns: `date,mean,lower,upper,mean_exceed_prob`. A missing bound is an
/// empty field.
pub fn write_forecast_csv(path: &Path, summary: &ExceedanceSummary) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create forecast CSV '{}': {e}", path.display())))?;

    writeln!(file, "date,mean,lower,upper,mean_exceed_prob")
        .map_err(|e| AppError::io(format!("Failed to write forecast CSV header: {e}")))?;

    for day in &summary.days {
        writeln!(
            file,
            "{},{:.4},{},{},{:.4}",
            day.date.format("%Y-%m-%d"),
            day.mean,
            day.lower.map(|v| format!("{v:.4}")).unwrap_or_default(),
            day.upper.map(|v| format!("{v:.4}")).unwrap_or_default(),
            day.prob,
        )
        .map_err(|e| AppError::io(format!("Failed to write forecast CSV row: {e}")))?;
    }

    Ok(())
}

/// Write the run summary as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &PersistedSummary) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| AppError::io(format!("Failed to serialize summary JSON: {e}")))?;
    std::fs::write(path, json + "\n")
        .map_err(|e| AppError::io(format!("Failed to write summary JSON '{}': {e}", path.display())))
}

/// Write both files into `out_dir` (created if needed). Returns their paths.
pub fn write_outputs(
    out_dir: &Path,
    lat: f64,
    lon: f64,
    exceedance: &ExceedanceSummary,
    summary: &PersistedSummary,
) -> Result<(Option<PathBuf>, PathBuf), AppError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| AppError::io(format!("Failed to create output dir '{}': {e}", out_dir.display())))?;

    let csv_path = match exceedance.days.first() {
        Some(first) => {
            let path = out_dir.join(forecast_csv_name(lat, lon, first.date));
            write_forecast_csv(&path, exceedance)?;
            Some(path)
        }
        None => None,
    };

    let json_path = out_dir.join(SUMMARY_FILE_NAME);
    write_summary_json(&json_path, summary)?;
    Ok((csv_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::DayExceedance;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wxf_export_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn csv_name_truncates_coordinates() {
        assert_eq!(forecast_csv_name(40.7128, -74.006, d(1)), "forecast_4071_-7400_2025-07-01.csv");
    }

    #[test]
    fn writes_csv_and_summary() {
        let exceedance = ExceedanceSummary {
            threshold: 30.0,
            days: vec![
                DayExceedance {
                    date: d(1),
                    mean: 29.5,
                    lower: Some(27.0),
                    upper: Some(32.0),
                    std: 1.25,
                    prob: 0.35,
                },
                DayExceedance {
                    date: d(2),
                    mean: 31.0,
                    lower: None,
                    upper: None,
                    std: 1.5,
                    prob: 0.75,
                },
            ],
            pooled: 0.55,
        };
        let summary = PersistedSummary {
            location: [40.0, -74.0],
            hist_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            hist_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            forecast_start: Some(d(1)),
            forecast_end: Some(d(2)),
            threshold_c: 30.0,
            overall_daily_exceed_prob: Some(0.55),
        };

        let dir = temp_dir("both");
        let (csv, json) = write_outputs(&dir, 40.0, -74.0, &exceedance, &summary).unwrap();

        let text = std::fs::read_to_string(csv.unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,mean,lower,upper,mean_exceed_prob");
        assert_eq!(lines[1], "2025-07-01,29.5000,27.0000,32.0000,0.3500");
        assert_eq!(lines[2], "2025-07-02,31.0000,,,0.7500");

        let back: PersistedSummary = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(back, summary);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_horizon_writes_null_probability() {
        let exceedance = ExceedanceSummary {
            threshold: 30.0,
            days: Vec::new(),
            pooled: f64::NAN,
        };
        let summary = PersistedSummary {
            location: [0.0, 0.0],
            hist_start: d(1),
            hist_end: d(2),
            forecast_start: None,
            forecast_end: None,
            threshold_c: 30.0,
            overall_daily_exceed_prob: exceedance.pooled_prob(),
        };
        let dir = temp_dir("empty");
        let (csv, json) = write_outputs(&dir, 0.0, 0.0, &exceedance, &summary).unwrap();
        assert!(csv.is_none());
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert!(value["overall_daily_exceed_prob"].is_null());
        assert!(value["forecast_start"].is_null());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
