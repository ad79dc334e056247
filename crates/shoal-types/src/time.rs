//! The time descriptor passed to every phase entry point.

use serde::{Deserialize, Serialize};

/// Position of the simulation inside the year/step/sub-step loop.
///
/// Built by the clock and handed by value to stock and predator phases so
/// that they never need to look at the clock directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStep {
    /// Calendar year.
    pub year: i32,
    /// Step within the year, starting at 1.
    pub step: u32,
    /// Sub-step within the step, starting at 1.
    pub substep: u32,
    /// Number of sub-steps in the current step.
    pub num_substeps: u32,
    /// Number of steps in a year.
    pub steps_per_year: u32,
    /// Length of the current step, in months.
    pub step_length: f64,
    /// Length of a year, in months.
    pub year_length: f64,
    /// Running step counter over the whole simulation, starting at 1.
    pub time: u64,
}

impl TimeStep {
    /// Share of the year covered by the current step.
    pub fn step_fraction(&self) -> f64 {
        if self.year_length > 0.0 {
            self.step_length / self.year_length
        } else {
            0.0
        }
    }

    /// Number of sub-steps as a float, never below one.
    pub fn substeps_f64(&self) -> f64 {
        f64::from(self.num_substeps.max(1))
    }

    /// Copy of this descriptor positioned at `substep`.
    pub const fn with_substep(self, substep: u32) -> Self {
        Self { substep, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter() -> TimeStep {
        TimeStep {
            year: 1990,
            step: 4,
            substep: 1,
            num_substeps: 2,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: 4,
        }
    }

    #[test]
    fn step_fraction_is_share_of_year() {
        assert!((quarter().step_fraction() - 0.25).abs() < 1e-12);
        assert!((quarter().substeps_f64() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn with_substep_keeps_the_rest_of_the_step() {
        let t = quarter().with_substep(2);
        assert_eq!(t.substep, 2);
        assert_eq!(t.step, 4);
        assert_eq!(t.time, 4);
    }
}
