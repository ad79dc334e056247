//! Simulation loop runner.
//!
//! [`run_simulation`] drives [`Ecosystem::run_step`] with the clock until
//! one of these holds:
//!
//! - **Last year reached**: the clock passed the last simulated year
//! - **Step limit**: an optional cap on the number of steps run
//! - **Extinction**: every stock has died out
//!
//! [`Ecosystem::run_step`]: crate::ecosystem::Ecosystem::run_step

use serde::Serialize;
use tracing::info;

use crate::clock::{ClockError, SimulationClock};
use crate::ecosystem::{Ecosystem, StepError, StepSummary};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// A step failed.
    #[error("step error: {source}")]
    Step {
        /// The underlying step error.
        #[from]
        source: StepError,
    },

    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Why a simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// Every configured year was simulated.
    LastYearReached,
    /// The step limit was reached.
    MaxStepsReached,
    /// No fish are left in any stock.
    Extinction,
}

/// Result of the simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// The last step summary, if any step completed.
    pub final_summary: Option<StepSummary>,
    /// Total number of steps executed.
    pub total_steps: u64,
}

/// Callback invoked after each step completes.
pub trait StepCallback {
    /// Called after a step completes successfully.
    fn on_step(&mut self, summary: &StepSummary, ecosystem: &Ecosystem);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _summary: &StepSummary, _ecosystem: &Ecosystem) {}
}

/// Collects every step summary.
#[derive(Debug, Default)]
pub struct HistoryCallback {
    /// Summaries in step order.
    pub steps: Vec<StepSummary>,
}

impl StepCallback for HistoryCallback {
    fn on_step(&mut self, summary: &StepSummary, _ecosystem: &Ecosystem) {
        self.steps.push(summary.clone());
    }
}

/// Run the simulation until the clock finishes, `max_steps` steps have
/// run, or every stock is extinct.
///
/// # Errors
///
/// Returns [`SimulationError`] if a step fails or the clock overflows.
pub fn run_simulation(
    ecosystem: &mut Ecosystem,
    clock: &mut SimulationClock,
    max_steps: Option<u64>,
    callback: &mut dyn StepCallback,
) -> Result<SimulationResult, SimulationError> {
    let mut last_summary: Option<StepSummary> = None;
    let mut total_steps: u64 = 0;

    info!(
        first_year = clock.first_year(),
        last_year = clock.last_year(),
        steps_per_year = clock.steps_per_year(),
        stocks = ecosystem.stocks().len(),
        "Simulation starting"
    );

    loop {
        if clock.is_finished() {
            return Ok(finish(SimulationEndReason::LastYearReached, last_summary, total_steps));
        }

        // --- Execute step ---
        let time = clock.current();
        let summary = ecosystem.run_step(&time)?;
        total_steps = total_steps.saturating_add(1);
        clock.advance()?;

        // --- Notify callback ---
        callback.on_step(&summary, ecosystem);

        // --- Check extinction ---
        if !summary.stocks.is_empty() && summary.stocks.iter().all(|s| s.number <= 0.0) {
            info!(time = summary.time, "Every stock is extinct");
            return Ok(finish(SimulationEndReason::Extinction, Some(summary), total_steps));
        }

        // --- Check step limit ---
        if max_steps.is_some_and(|max| total_steps >= max) {
            info!(time = summary.time, max_steps, "Step limit reached");
            return Ok(finish(SimulationEndReason::MaxStepsReached, Some(summary), total_steps));
        }

        last_summary = Some(summary);
    }
}

fn finish(
    end_reason: SimulationEndReason,
    final_summary: Option<StepSummary>,
    total_steps: u64,
) -> SimulationResult {
    let result = SimulationResult {
        end_reason,
        final_summary,
        total_steps,
    };
    log_simulation_end(&result);
    result
}

/// Log the end of a simulation.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        final_year = result.final_summary.as_ref().map(|s| s.year),
        final_biomass = result
            .final_summary
            .as_ref()
            .map(|s| s.stocks.iter().map(|st| st.biomass).sum::<f64>()),
        "Simulation ended"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TimeConfig;

    #[test]
    fn empty_ecosystem_runs_to_last_year() {
        let mut eco = Ecosystem::new(Vec::new(), Vec::new(), Vec::new(), 1990);
        let mut clock = SimulationClock::new(&TimeConfig::default()).unwrap();
        let mut history = HistoryCallback::default();
        let result = run_simulation(&mut eco, &mut clock, None, &mut history).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::LastYearReached);
        assert_eq!(result.total_steps, 4);
        assert_eq!(history.steps.len(), 4);
        assert_eq!(result.final_summary.unwrap().step, 4);
    }

    #[test]
    fn step_limit_stops_early() {
        let mut eco = Ecosystem::new(Vec::new(), Vec::new(), Vec::new(), 1990);
        let mut clock = SimulationClock::new(&TimeConfig::default()).unwrap();
        let result = run_simulation(&mut eco, &mut clock, Some(2), &mut NoOpCallback).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::MaxStepsReached);
        assert_eq!(result.total_steps, 2);
    }
}
