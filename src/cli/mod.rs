//! Command-line parsing for the point-forecast exceedance engine.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{ModelSpec, OutputMode};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wxf", version, about = "Point forecast + threshold exceedance probabilities")]
pub struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit, forecast, simulate exceedance and print the report (or JSON with `--output json`).
    Forecast(ForecastArgs),
    /// Print the compact JSON summary only (useful for scripting).
    Summary(ForecastArgs),
}

/// Where to read history from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// NASA POWER daily point API.
    Power,
    /// Local CSV file (`--csv`).
    Csv,
    /// Seeded synthetic climate.
    Synthetic,
}

/// Options shared by `forecast` and `summary`.
#[derive(Debug, Parser, Clone)]
pub struct ForecastArgs {
    /// Latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// First year of history.
    #[arg(long, default_value_t = 2000)]
    pub start_year: i32,

    /// Last year of history (capped at today).
    #[arg(long, default_value_t = 2024)]
    pub end_year: i32,

    /// Variable to forecast.
    #[arg(short = 't', long, default_value = "T2M")]
    pub target: String,

    /// Exogenous drivers for the lag-feature model (comma separated).
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub exogenous: Vec<String>,

    /// Exceedance threshold, in the target's units.
    #[arg(long, default_value_t = 32.0, allow_hyphen_values = true)]
    pub threshold: f64,

    /// Forecast horizon in days.
    #[arg(short = 'd', long, default_value_t = 90)]
    pub forecast_days: usize,

    /// First forecast day (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long)]
    pub forecast_start: Option<NaiveDate>,

    /// Lag depth for the lag-feature model.
    #[arg(long, default_value_t = 7)]
    pub lags: usize,

    /// Monte-Carlo draws per forecast day.
    #[arg(long, default_value_t = crate::forecast::DEFAULT_SIMS)]
    pub sims: usize,

    /// Climatology window half-width in days.
    #[arg(long, default_value_t = crate::climate::DEFAULT_BUFFER_DAYS)]
    pub buffer: u32,

    /// Trees in the lag-feature forest.
    #[arg(long, default_value_t = 200)]
    pub trees: usize,

    /// Seed for every stochastic step.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Which model(s) to try.
    #[arg(long, value_enum, default_value_t = ModelSpec::Auto)]
    pub model: ModelSpec,

    /// History source.
    #[arg(long, value_enum, default_value_t = Source::Power)]
    pub source: Source,

    /// History CSV (implies `--source csv`).
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Output presentation.
    #[arg(long, value_enum, default_value_t = OutputMode::Report)]
    pub output: OutputMode,

    /// Write `forecast_summary.json` and the forecast CSV here.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_and_negative_coordinates() {
        let cli = Cli::parse_from(["wxf", "forecast", "--lat", "-33.9", "--lon", "18.4"]);
        let Command::Forecast(args) = cli.command else {
            panic!("expected forecast");
        };
        assert_eq!(args.lat, -33.9);
        assert_eq!(args.target, "T2M");
        assert_eq!(args.forecast_days, 90);
        assert_eq!(args.sims, 2000);
        assert_eq!(args.buffer, 3);
        assert_eq!(args.source, Source::Power);
        assert!(!cli.quiet);
    }

    #[test]
    fn parses_exogenous_list_and_start_date() {
        let cli = Cli::parse_from([
            "wxf",
            "-q",
            "summary",
            "--lat",
            "10",
            "--lon",
            "20",
            "-x",
            "RH2M,WS2M",
            "--forecast-start",
            "2025-06-01",
            "--model",
            "forest",
        ]);
        let Command::Summary(args) = cli.command else {
            panic!("expected summary");
        };
        assert!(cli.quiet);
        assert_eq!(args.exogenous, vec!["RH2M", "WS2M"]);
        assert_eq!(args.forecast_start, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(args.model, ModelSpec::Forest);
    }
}
