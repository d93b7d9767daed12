//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - picks the history provider
//! - runs the forecast pipeline
//! - prints the report or the JSON summary
//! - writes optional output files

use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ForecastArgs, Source};
use crate::domain::{ForecastConfig, OutputMode, SourceSpec};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `wxf` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Command::Forecast(args) => handle_forecast(&args, None),
        Command::Summary(args) => handle_forecast(&args, Some(OutputMode::Json)),
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` overrides.
fn init_tracing(quiet: bool) {
    let default = if quiet { "wx_forecast=warn" } else { "wx_forecast=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_forecast(args: &ForecastArgs, force_mode: Option<OutputMode>) -> Result<(), AppError> {
    let mut config = forecast_config_from_args(args)?;
    if let Some(mode) = force_mode {
        config.output = mode;
    }

    let provider = crate::data::provider_for(&config.source, config.seed)?;
    let today = Local::now().date_naive();
    let run = pipeline::run_forecast(&config, provider.as_ref(), today)?;

    match config.output {
        OutputMode::Json => {
            let json = serde_json::to_string(&run.summary.compact)
                .map_err(|e| AppError::io(format!("Failed to serialize summary: {e}")))?;
            println!("{json}");
        }
        OutputMode::Report => {
            println!(
                "{}",
                crate::report::format_run_summary(&config, &run.history, &run.selection)
            );
            println!(
                "{}",
                crate::report::format_forecast_table(&run.exceedance, crate::report::REPORT_DAYS)
            );
            println!("{}", crate::report::format_monthly(&run.exceedance));
            if config.plot {
                let plot = crate::plot::render_forecast_plot(
                    &run.recent_target,
                    &run.exceedance,
                    config.plot_width,
                    config.plot_height,
                );
                println!("{plot}");
            }
            println!("{}", crate::report::format_persisted(&run.persisted));
            print!("{}", crate::report::format_outlook(&run.summary.compact));
        }
    }

    if let Some(dir) = &config.out_dir {
        let (csv, json) =
            crate::io::write_outputs(dir, config.lat, config.lon, &run.exceedance, &run.persisted)?;
        if let Some(csv) = csv {
            tracing::info!(path = %csv.display(), "wrote forecast table");
        }
        tracing::info!(path = %json.display(), "wrote summary");
    }

    Ok(())
}

pub fn forecast_config_from_args(args: &ForecastArgs) -> Result<ForecastConfig, AppError> {
    let source = match (args.source, &args.csv) {
        (_, Some(path)) => SourceSpec::Csv(path.clone()),
        (Source::Csv, None) => return Err(AppError::invalid("--source csv needs --csv <file>.")),
        (Source::Power, None) => SourceSpec::Power,
        (Source::Synthetic, None) => SourceSpec::Synthetic,
    };

    Ok(ForecastConfig {
        lat: args.lat,
        lon: args.lon,
        start_year: args.start_year,
        end_year: args.end_year,
        target: args.target.trim().to_string(),
        exogenous: args
            .exogenous
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
        threshold: args.threshold,
        forecast_days: args.forecast_days,
        forecast_start: args.forecast_start,
        lags: args.lags,
        n_sims: args.sims,
        buffer_days: args.buffer,
        n_trees: args.trees,
        seed: args.seed,
        model_spec: args.model,
        source,
        output: args.output,
        out_dir: args.out.clone(),
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> ForecastArgs {
        let mut argv = vec!["wxf", "forecast", "--lat", "40.7", "--lon", "-74.0"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Forecast(a) | Command::Summary(a) => a,
        }
    }

    #[test]
    fn csv_path_selects_csv_source() {
        let cfg = forecast_config_from_args(&args(&["--csv", "hist.csv"])).unwrap();
        assert_eq!(cfg.source, SourceSpec::Csv(PathBuf::from("hist.csv")));
        assert!(cfg.plot);
    }

    #[test]
    fn csv_source_without_path_is_invalid() {
        let err = forecast_config_from_args(&args(&["--source", "csv"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn exogenous_names_are_trimmed() {
        let cfg = forecast_config_from_args(&args(&["-x", " RH2M, ,WS2M", "--no-plot"])).unwrap();
        assert_eq!(cfg.exogenous, vec!["RH2M", "WS2M"]);
        assert!(!cfg.plot);
        assert!(cfg.validate().is_ok());
    }
}
