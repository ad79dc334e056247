//! Simulation binary for the Shoal fish population model.
//!
//! Loads configuration, builds the ecosystem, and runs the step cycle
//! until the last year, an optional step limit, or extinction.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `SHOAL_CONFIG` or `shoal-config.yaml`
//! 3. Create the simulation clock from the time config
//! 4. Build areas, stocks and tag experiments
//! 5. Run the simulation loop
//! 6. Print the final report as JSON on stdout
//!
//! # Environment
//!
//! - `RUST_LOG`: log filter, `info` when unset
//! - `SHOAL_LOG_FORMAT`: `json` for JSON log lines
//! - `SHOAL_CONFIG`: configuration file path
//! - `SHOAL_MAX_STEPS`: stop after this many steps

mod error;
mod report;
mod step_log;

use std::path::PathBuf;

use shoal_core::Ecosystem;
use shoal_core::clock::SimulationClock;
use shoal_core::config::SimulationConfig;
use shoal_core::runner;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::report::RunReport;
use crate::step_log::StepLogCallback;

const DEFAULT_CONFIG: &str = "shoal-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr);
    if std::env::var("SHOAL_LOG_FORMAT").is_ok_and(|f| f == "json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("shoal-engine starting");
    run()?;
    Ok(())
}

fn run() -> Result<(), EngineError> {
    // 2. Load configuration.
    let config = load_config()?;
    info!(
        first_year = config.time.first_year,
        last_year = config.time.last_year,
        areas = config.areas.len(),
        stocks = config.stocks.len(),
        tags = config.tags.len(),
        "Configuration loaded"
    );

    // 3. Create simulation clock.
    let mut clock = SimulationClock::new(&config.time)?;
    info!(
        steps_per_year = clock.steps_per_year(),
        total_steps = clock.total_steps(),
        "Simulation clock initialized"
    );

    // 4. Build the ecosystem.
    let mut ecosystem = Ecosystem::from_config(&config)?;

    // 5. Run the simulation.
    let max_steps = max_steps()?;
    let mut callback = StepLogCallback::new(clock.steps_per_year());
    let result = runner::run_simulation(&mut ecosystem, &mut clock, max_steps, &mut callback)?;

    // 6. Report.
    let report = RunReport::new(result, &ecosystem);
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        end_reason = ?report.result.end_reason,
        total_steps = report.result.total_steps,
        "shoal-engine shutdown complete"
    );
    Ok(())
}

/// Load the simulation configuration.
///
/// `SHOAL_CONFIG` names the file; otherwise `shoal-config.yaml` in the
/// working directory is used, and defaults when that file is missing.
fn load_config() -> Result<SimulationConfig, EngineError> {
    if let Ok(path) = std::env::var("SHOAL_CONFIG") {
        return Ok(SimulationConfig::from_file(&PathBuf::from(path))?);
    }
    let path = PathBuf::from(DEFAULT_CONFIG);
    if path.exists() {
        Ok(SimulationConfig::from_file(&path)?)
    } else {
        info!("Config file not found, using defaults");
        Ok(SimulationConfig::default())
    }
}

fn max_steps() -> Result<Option<u64>, EngineError> {
    std::env::var("SHOAL_MAX_STEPS")
        .ok()
        .map(|value| {
            value.parse().map_err(|e: std::num::ParseIntError| EngineError::Setting {
                name: "SHOAL_MAX_STEPS",
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoal_core::SimulationEndReason;
    use shoal_core::runner::NoOpCallback;

    use super::*;

    const SHIPPED: &str = include_str!("../../../shoal-config.yaml");

    #[test]
    fn shipped_config_builds_and_runs_a_year() {
        let config = SimulationConfig::parse(SHIPPED).unwrap();
        let mut clock = SimulationClock::new(&config.time).unwrap();
        let mut ecosystem = Ecosystem::from_config(&config).unwrap();
        assert_eq!(ecosystem.stocks().len(), 3);
        assert_eq!(ecosystem.tag_events().count(), 1);

        let result =
            runner::run_simulation(&mut ecosystem, &mut clock, Some(4), &mut NoOpCallback).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::MaxStepsReached);
        let summary = result.final_summary.unwrap();
        assert!(summary.stocks.iter().all(|s| s.number > 0.0));
    }
}
