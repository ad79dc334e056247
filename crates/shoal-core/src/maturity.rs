//! Maturation of immature fish into mature stocks.
//!
//! Maturing fish are removed during growth, in the same sweep that moves
//! them between length groups, and held until the stock's population
//! phase moves them to the mature stocks.

use shoal_matrix::MaturityRule;
use shoal_types::{AreaId, TimeStep};

use crate::config::MaturityRuleConfig;
use crate::transfer::{Schedule, TransferTarget};

/// Maturation law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaturityLaw {
    /// Logistic in length and age.
    Logistic {
        /// Length slope.
        alpha: f64,
        /// Length at 50% maturity.
        l50: f64,
        /// Age slope.
        beta: f64,
        /// Age at 50% maturity.
        a50: f64,
    },
    /// Every fish at or above a length matures.
    LengthThreshold {
        /// Threshold length.
        length: f64,
    },
}

impl From<&MaturityRuleConfig> for MaturityLaw {
    fn from(config: &MaturityRuleConfig) -> Self {
        match *config {
            MaturityRuleConfig::Logistic {
                alpha,
                l50,
                beta,
                a50,
            } => Self::Logistic {
                alpha,
                l50,
                beta,
                a50,
            },
            MaturityRuleConfig::LengthThreshold { length } => Self::LengthThreshold { length },
        }
    }
}

/// Maturation of one stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Maturation {
    law: MaturityLaw,
    lengths: Vec<f64>,
    min_age: u32,
    schedule: Schedule,
    targets: Vec<TransferTarget>,
}

impl Maturation {
    /// Maturation with `law` for a stock whose groups have mean lengths
    /// `lengths`.
    pub const fn new(
        law: MaturityLaw,
        lengths: Vec<f64>,
        min_age: u32,
        schedule: Schedule,
        targets: Vec<TransferTarget>,
    ) -> Self {
        Self {
            law,
            lengths,
            min_age,
            schedule,
            targets,
        }
    }

    /// Mature stocks.
    pub fn targets(&self) -> &[TransferTarget] {
        &self.targets
    }

    /// Returns `true` when fish mature in `area` at `time`.
    pub fn is_maturation_step(&self, area: AreaId, time: &TimeStep) -> bool {
        self.schedule.is_active(area, time)
    }

    /// Share of fish of `age` at length `length` that mature.
    pub fn share_at(&self, age: u32, length: f64) -> f64 {
        if age < self.min_age {
            return 0.0;
        }
        match self.law {
            MaturityLaw::Logistic {
                alpha,
                l50,
                beta,
                a50,
            } => {
                let x = alpha.mul_add(length - l50, beta * (f64::from(age) - a50));
                1.0 / (1.0 + (-x).exp())
            }
            MaturityLaw::LengthThreshold { length: threshold } => {
                if length >= threshold { 1.0 } else { 0.0 }
            }
        }
    }
}

impl MaturityRule for Maturation {
    fn maturing_share(&self, age: u32, length_group: usize, _jump: usize) -> f64 {
        self.lengths
            .get(length_group)
            .map_or(0.0, |&length| self.share_at(age, length))
    }
}
