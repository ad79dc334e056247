//! Step callback that logs stock totals.
//!
//! Year ends are logged at `info`, other steps at `debug`.

use shoal_core::Ecosystem;
use shoal_core::StepSummary;
use shoal_core::runner::StepCallback;
use tracing::{debug, info};

/// Callback that writes a structured log line per step.
pub struct StepLogCallback {
    steps_per_year: u32,
}

impl StepLogCallback {
    /// Create a callback for a clock with `steps_per_year` steps.
    pub const fn new(steps_per_year: u32) -> Self {
        Self { steps_per_year }
    }
}

impl StepCallback for StepLogCallback {
    fn on_step(&mut self, summary: &StepSummary, _ecosystem: &Ecosystem) {
        let number: f64 = summary.stocks.iter().map(|s| s.number).sum();
        let biomass: f64 = summary.stocks.iter().map(|s| s.biomass).sum();
        if summary.step >= self.steps_per_year {
            info!(year = summary.year, number, biomass, "Year completed");
        }
        for stock in &summary.stocks {
            debug!(
                year = summary.year,
                step = summary.step,
                stock = %stock.name,
                number = stock.number,
                biomass = stock.biomass,
                consumption = stock.consumption,
                overconsumption = stock.overconsumption,
                eaten = stock.eaten,
                "Stock totals"
            );
        }
    }
}
