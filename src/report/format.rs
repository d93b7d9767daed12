//! Formatted terminal output.
//!
//! Formatting lives here so the fitting and simulation code stays clean and
//! output changes stay localized.

use chrono::NaiveDate;

use crate::domain::ForecastConfig;
use crate::fit::FitSelection;
use crate::forecast::ExceedanceSummary;
use crate::report::summary::{CompactSummary, PersistedSummary};

/// Rows of the daily table shown in the report.
pub const REPORT_DAYS: usize = 10;

/// History actually used for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Observed (non-missing) target days before gap filling.
    pub n_observed: usize,
    pub variables: Vec<String>,
}

/// Header block: location, history, and the fitted model.
pub fn format_run_summary(config: &ForecastConfig, history: &HistoryWindow, selection: &FitSelection) -> String {
    let mut out = String::new();

    out.push_str("=== wxf - Point Forecast Exceedance ===\n");
    out.push_str(&format!("Location: lat={:.4} lon={:.4}\n", config.lat, config.lon));
    out.push_str(&format!(
        "History: {} .. {} | n={} observed days\n",
        history.start, history.end, history.n_observed
    ));
    out.push_str(&format!(
        "Target: {} | threshold={:.2} | variables=[{}]\n",
        config.target,
        config.threshold,
        history.variables.join(", ")
    ));

    out.push_str("\nModel:\n");
    for (kind, reason) in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {reason}\n", kind.display_name()));
    }
    out.push_str(&format!(
        "* {} | {}\n",
        selection.model.kind().display_name(),
        selection.model.describe()
    ));
    if let Some(rmse) = selection.model.holdout_rmse() {
        out.push_str(&format!("  held-out RMSE={rmse:.3}\n"));
    }
    out.push('\n');

    out
}

/// The first `rows` forecast days.
pub fn format_forecast_table(exceedance: &ExceedanceSummary, rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Forecast (first {} of {} days, threshold={:.2}):\n",
        rows.min(exceedance.days.len()),
        exceedance.days.len(),
        exceedance.threshold
    ));
    push_line(
        &mut out,
        format!("{:<10} {:>9} {:>9} {:>9} {:>7} {:>7}", "date", "mean", "lower", "upper", "std", "p_exc"),
    );
    push_line(
        &mut out,
        format!("{:-<10} {:-<9} {:-<9} {:-<9} {:-<7} {:-<7}", "", "", "", "", "", ""),
    );
    for day in exceedance.days.iter().take(rows) {
        push_line(
            &mut out,
            format!(
                "{:<10} {:>9.2} {:>9} {:>9} {:>7.3} {:>7.3}",
                day.date,
                day.mean,
                fmt_opt(day.lower),
                fmt_opt(day.upper),
                day.std,
                day.prob
            ),
        );
    }
    out
}

/// Per-month exceedance table.
pub fn format_monthly(exceedance: &ExceedanceSummary) -> String {
    let mut out = String::new();
    out.push_str("Monthly exceedance:\n");
    push_line(&mut out, format!("{:<7} {:>5} {:>9}", "month", "days", "avg_prob"));
    push_line(&mut out, format!("{:-<7} {:-<5} {:-<9}", "", "", ""));
    for m in exceedance.monthly() {
        push_line(
            &mut out,
            format!("{:04}-{:02} {:>5} {:>9.3}", m.year, m.month, m.total_days, m.avg_prob),
        );
    }
    match exceedance.pooled_prob() {
        Some(p) => out.push_str(&format!("Overall daily exceedance probability: {p:.3}\n")),
        None => out.push_str("Overall daily exceedance probability: n/a\n"),
    }
    out
}

/// Persisted summary as pretty JSON.
pub fn format_persisted(summary: &PersistedSummary) -> String {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => format!("Summary:\n{json}\n"),
        Err(e) => format!("Summary: <unavailable: {e}>\n"),
    }
}

/// Human-readable outlook lines for the first forecast day.
pub fn format_outlook(summary: &CompactSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Outlook for {}:\n", summary.forecast_date));
    out.push_str(&format!(
        "Forecast Rain: {} mm (Historical Avg: {} mm)\n",
        fmt_opt(summary.forecast.precip_mm),
        fmt_opt(summary.historical_avg.precip_mm)
    ));
    out.push_str(&format!(
        "Forecast Temp: {} °C (Historical Avg: {} °C)\n",
        fmt_opt(summary.forecast.temp_c),
        fmt_opt(summary.historical_avg.temp_c)
    ));
    out.push_str(&format!(
        "Forecast Wind: {} m/s (Historical Avg: {} m/s)\n",
        fmt_opt(summary.forecast.wind_m_s),
        fmt_opt(summary.historical_avg.wind_m_s)
    ));
    out.push_str(&format!(
        "Climate Risk Score: {}/100 ({})\n",
        summary.climate_risk_score, summary.risk_label
    ));
    out.push_str(&format!("Dominant Factor: {}\n", summary.dominant_factor));
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::RiskLabel;
    use crate::forecast::DayExceedance;
    use crate::report::summary::{Location, PrecipReading, Readings, StatsByVariable};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn exceedance() -> ExceedanceSummary {
        let days = [(d(1, 30), 0.2), (d(1, 31), 0.4), (d(2, 1), 1.0)]
            .into_iter()
            .map(|(date, prob)| DayExceedance {
                date,
                mean: 30.0,
                lower: None,
                upper: None,
                std: 1.5,
                prob,
            })
            .collect();
        ExceedanceSummary {
            threshold: 31.0,
            days,
            pooled: 0.5,
        }
    }

    #[test]
    fn forecast_table_has_no_trailing_spaces() {
        let text = format_forecast_table(&exceedance(), 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Forecast (first 2 of 3 days"));
        assert_eq!(lines[3], "2025-01-30     30.00       n/a       n/a   1.500   0.200");
        assert!(text.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn monthly_table_groups_by_month() {
        let text = format_monthly(&exceedance());
        assert!(text.contains("2025-01     2     0.300"));
        assert!(text.contains("2025-02     1     1.000"));
        assert!(text.ends_with("Overall daily exceedance probability: 0.500\n"));
    }

    #[test]
    fn outlook_prints_missing_values_as_na() {
        let summary = CompactSummary {
            location: Location { lat: 1.0, lon: 2.0 },
            forecast_date: d(3, 1),
            forecast: Readings {
                temp_c: Some(21.456),
                precip_mm: Some(3.2),
                wind_m_s: None,
            },
            historical_avg: Readings::default(),
            historical_stats: StatsByVariable::default(),
            forecast_adjusted: PrecipReading { precip_mm: Some(3.2) },
            forecast_raw: PrecipReading { precip_mm: Some(3.2) },
            climate_risk_score: 10,
            risk_label: RiskLabel::Low,
            dominant_factor: "Rain",
            sparkline: None,
        };
        let text = format_outlook(&summary);
        assert!(text.contains("Forecast Rain: 3.20 mm (Historical Avg: n/a mm)"));
        assert!(text.contains("Forecast Temp: 21.46 °C"));
        assert!(text.contains("Forecast Wind: n/a m/s"));
        assert!(text.contains("Climate Risk Score: 10/100 (Low Risk)"));
        assert!(text.contains("Dominant Factor: Rain"));
    }
}
