//! Model clock for the year/step/sub-step loop.
//!
//! The clock owns the position of the simulation in calendar time and
//! hands out [`TimeStep`] descriptors. Stocks never consult the clock
//! directly; every phase entry point receives the descriptor by value.
//!
//! # Design Principles
//!
//! - All counters use checked arithmetic (no silent overflow).
//! - Year length is the sum of the configured step lengths and never
//!   changes during a run.

use shoal_types::TimeStep;

use crate::config::TimeConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,

    /// Invalid time configuration (e.g. no steps in the year).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Position of the simulation in the year/step loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    /// First simulated year.
    first_year: i32,
    /// Last simulated year, inclusive.
    last_year: i32,
    /// Step lengths in months.
    step_lengths: Vec<f64>,
    /// Sub-steps per step of the year.
    substeps: Vec<u32>,
    /// Sum of the step lengths.
    year_length: f64,
    /// Current year.
    year: i32,
    /// Current step, starting at 1.
    step: u32,
    /// Running step counter, starting at 1.
    time: u64,
}

impl SimulationClock {
    /// Create a clock positioned at the first step of the first year.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the year range is reversed,
    /// no steps are configured, a step length is not positive, or the
    /// sub-step list does not match the steps.
    pub fn new(config: &TimeConfig) -> Result<Self, ClockError> {
        if config.last_year < config.first_year {
            return Err(ClockError::InvalidConfig {
                reason: format!(
                    "last_year {} is before first_year {}",
                    config.last_year, config.first_year
                ),
            });
        }
        if config.step_lengths.is_empty() {
            return Err(ClockError::InvalidConfig {
                reason: "at least one step must be configured".to_owned(),
            });
        }
        if config.step_lengths.iter().any(|&len| len <= 0.0) {
            return Err(ClockError::InvalidConfig {
                reason: "step lengths must be positive".to_owned(),
            });
        }
        if u32::try_from(config.step_lengths.len()).is_err() {
            return Err(ClockError::InvalidConfig {
                reason: "too many steps in a year".to_owned(),
            });
        }
        let substeps = if config.substeps.is_empty() {
            vec![1; config.step_lengths.len()]
        } else if config.substeps.len() == config.step_lengths.len() {
            if config.substeps.contains(&0) {
                return Err(ClockError::InvalidConfig {
                    reason: "every step needs at least one sub-step".to_owned(),
                });
            }
            config.substeps.clone()
        } else {
            return Err(ClockError::InvalidConfig {
                reason: format!(
                    "{} sub-step counts given for {} steps",
                    config.substeps.len(),
                    config.step_lengths.len()
                ),
            });
        };

        Ok(Self {
            first_year: config.first_year,
            last_year: config.last_year,
            year_length: config.step_lengths.iter().sum(),
            step_lengths: config.step_lengths.clone(),
            substeps,
            year: config.first_year,
            step: 1,
            time: 1,
        })
    }

    /// Descriptor of the current step, positioned at its first sub-step.
    pub fn current(&self) -> TimeStep {
        let index = self.step_index();
        TimeStep {
            year: self.year,
            step: self.step,
            substep: 1,
            num_substeps: self.substeps.get(index).copied().unwrap_or(1),
            steps_per_year: self.steps_per_year(),
            step_length: self.step_lengths.get(index).copied().unwrap_or(0.0),
            year_length: self.year_length,
            time: self.time,
        }
    }

    /// Move to the next step, rolling over into the next year.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::StepOverflow`] if a counter would overflow.
    pub fn advance(&mut self) -> Result<(), ClockError> {
        self.time = self.time.checked_add(1).ok_or(ClockError::StepOverflow)?;
        if self.step >= self.steps_per_year() {
            self.step = 1;
            self.year = self.year.checked_add(1).ok_or(ClockError::StepOverflow)?;
        } else {
            self.step = self.step.checked_add(1).ok_or(ClockError::StepOverflow)?;
        }
        Ok(())
    }

    /// Returns `true` once the clock has moved past the last step of the
    /// last year.
    pub const fn is_finished(&self) -> bool {
        self.year > self.last_year
    }

    /// First simulated year.
    pub const fn first_year(&self) -> i32 {
        self.first_year
    }

    /// Last simulated year.
    pub const fn last_year(&self) -> i32 {
        self.last_year
    }

    /// Number of steps in a year.
    pub fn steps_per_year(&self) -> u32 {
        u32::try_from(self.step_lengths.len()).unwrap_or(u32::MAX)
    }

    /// Total number of steps in the simulation.
    pub fn total_steps(&self) -> u64 {
        let years = i64::from(self.last_year)
            .saturating_sub(i64::from(self.first_year))
            .saturating_add(1);
        u64::try_from(years)
            .unwrap_or(0)
            .saturating_mul(u64::from(self.steps_per_year()))
    }

    fn step_index(&self) -> usize {
        usize::try_from(self.step.saturating_sub(1)).unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> TimeConfig {
        TimeConfig {
            first_year: 2000,
            last_year: 2001,
            step_lengths: vec![6.0, 6.0],
            substeps: vec![1, 3],
        }
    }

    #[test]
    fn clock_walks_steps_and_years() {
        let mut clock = SimulationClock::new(&config()).unwrap();
        assert_eq!(clock.total_steps(), 4);
        let mut seen = Vec::new();
        while !clock.is_finished() {
            let t = clock.current();
            seen.push((t.year, t.step, t.num_substeps, t.time));
            clock.advance().unwrap();
        }
        assert_eq!(
            seen,
            vec![(2000, 1, 1, 1), (2000, 2, 3, 2), (2001, 1, 1, 3), (2001, 2, 3, 4)]
        );
    }

    #[test]
    fn step_fraction_uses_year_length() {
        let clock = SimulationClock::new(&config()).unwrap();
        assert!((clock.current().step_fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reversed_years_are_rejected() {
        let mut c = config();
        c.last_year = 1999;
        assert!(matches!(
            SimulationClock::new(&c),
            Err(ClockError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn mismatched_substeps_are_rejected() {
        let mut c = config();
        c.substeps = vec![1];
        assert!(SimulationClock::new(&c).is_err());
        c.substeps = vec![1, 0];
        assert!(SimulationClock::new(&c).is_err());
    }

    #[test]
    fn empty_substeps_default_to_one() {
        let mut c = config();
        c.substeps.clear();
        let clock = SimulationClock::new(&c).unwrap();
        assert_eq!(clock.current().num_substeps, 1);
    }
}
