//! CSV history ingest.
//!
//! Accepted layout: one row per day, a date column plus one numeric column
//! per variable.
//!
//! - the date column is `date` (any case), `yyyymmdd`, or the `YEAR`/`MO`/`DY`
//!   triple used by POWER CSV exports; otherwise the first column
//! - dates are `YYYY-MM-DD`, `YYYYMMDD` or `YYYY/MM/DD`
//! - variable columns are matched like POWER parameters (exact, then prefix)
//! - empty cells, non-numeric cells and sentinel codes become missing values
//!
//! Rows with an unreadable date are skipped and counted.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::data::{HistoryRequest, match_variable};
use crate::domain::TimeSeries;
use crate::error::AppError;

enum DateColumns {
    Single(usize),
    Split { year: usize, month: usize, day: usize },
}

pub fn load_history_csv(path: &Path, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::invalid(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_history_csv(file, request)
}

pub fn read_history_csv<R: Read>(reader: R, request: &HistoryRequest) -> Result<Vec<(String, TimeSeries)>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let date_columns = resolve_date_columns(&header_map);

    let date_idx: Vec<usize> = match date_columns {
        DateColumns::Single(i) => vec![i],
        DateColumns::Split { year, month, day } => vec![year, month, day],
    };
    let value_headers: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !date_idx.contains(i))
        .collect();

    let mut selected: Vec<(String, usize)> = Vec::new();
    for name in &request.variables {
        if let Some(key) = match_variable(name, value_headers.iter().map(|(_, h)| *h)) {
            if let Some((idx, _)) = value_headers.iter().find(|(_, h)| *h == key) {
                selected.push((name.clone(), *idx));
            }
        } else {
            debug!(variable = %name, "not present in CSV");
        }
    }

    let range = request.start_date().zip(request.end_date());
    let mut observations: Vec<Vec<(NaiveDate, Option<f64>)>> = vec![Vec::new(); selected.len()];
    let mut bad_rows = 0usize;

    for result in reader.records() {
        let Ok(record) = result else {
            bad_rows += 1;
            continue;
        };
        let Some(date) = record_date(&record, &date_columns) else {
            bad_rows += 1;
            continue;
        };
        if let Some((start, end)) = range {
            if date < start || date > end {
                continue;
            }
        }
        for (slot, (_, idx)) in observations.iter_mut().zip(selected.iter()) {
            slot.push((date, parse_opt_f64(record.get(*idx))));
        }
    }
    if bad_rows > 0 {
        warn!(rows = bad_rows, "skipped CSV rows without a readable date");
    }

    Ok(selected
        .into_iter()
        .zip(observations)
        .filter_map(|((name, _), obs)| TimeSeries::from_observations(obs).map(|s| (name, s)))
        .collect())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_date_columns(header_map: &HashMap<String, usize>) -> DateColumns {
    for name in ["date", "yyyymmdd"] {
        if let Some(&i) = header_map.get(name) {
            return DateColumns::Single(i);
        }
    }
    if let (Some(&year), Some(&month), Some(&day)) =
        (header_map.get("year"), header_map.get("mo"), header_map.get("dy"))
    {
        return DateColumns::Split { year, month, day };
    }
    DateColumns::Single(0)
}

fn record_date(record: &StringRecord, columns: &DateColumns) -> Option<NaiveDate> {
    match *columns {
        DateColumns::Single(i) => parse_date(record.get(i)?),
        DateColumns::Split { year, month, day } => NaiveDate::from_ymd_opt(
            record.get(year)?.parse().ok()?,
            record.get(month)?.parse().ok()?,
            record.get(day)?.parse().ok()?,
        ),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];
    FMTS.iter().find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
