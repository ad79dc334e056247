//! Fish moving between stocks.
//!
//! Phases that move fish out of a stock (maturation, transition, straying,
//! spawning recruitment) never touch the receiving stock. They produce
//! [`StockTransfer`] values which the ecosystem applies to the receiver
//! once the phase has run for every stock.

use std::sync::Arc;

use shoal_matrix::{AgeBandMatrix, TagRatioMatrix};
use shoal_types::{AreaId, ConversionIndex, StockId, TimeStep};

use crate::config::{ConditionConfig, ProportionConfig};

/// A receiving stock with its share and length-group correspondence.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTarget {
    /// Receiving stock.
    pub stock: StockId,
    /// Share of the moving fish it receives.
    pub ratio: f64,
    /// Mapping from the sending stock's division to the receiver's.
    pub ci: Arc<ConversionIndex>,
}

/// Recruits to be spread over length groups by the receiving stock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecruitBatch {
    /// Age of the recruits; `None` means the receiver's youngest age.
    pub age: Option<u32>,
    /// Number of recruits.
    pub number: f64,
    /// Mean length.
    pub mean_length: f64,
    /// Standard deviation of length.
    pub sd_length: f64,
    /// Weight-at-length.
    pub condition: ConditionConfig,
}

/// Fish leaving one stock for another.
#[derive(Debug, Clone, PartialEq)]
pub enum StockTransfer {
    /// Fish already structured by age and length.
    Fish {
        /// Receiving stock.
        target: StockId,
        /// Area of the move.
        area: AreaId,
        /// Moving fish, on the sender's division.
        population: AgeBandMatrix,
        /// Moving tagged fish.
        tags: TagRatioMatrix,
        /// Share of the moving fish the receiver gets.
        ratio: f64,
        /// Mapping from the sender's division to the receiver's.
        ci: Arc<ConversionIndex>,
    },
    /// New recruits.
    Recruits {
        /// Receiving stock.
        target: StockId,
        /// Area of the recruitment.
        area: AreaId,
        /// The recruits.
        batch: RecruitBatch,
    },
}

impl StockTransfer {
    /// Receiving stock.
    pub const fn target(&self) -> StockId {
        match self {
            Self::Fish { target, .. } | Self::Recruits { target, .. } => *target,
        }
    }
}

/// Fish captured from a stock and held until they are moved.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    /// Captured fish.
    pub population: AgeBandMatrix,
    /// Captured tagged fish.
    pub tags: TagRatioMatrix,
}

impl Parcel {
    /// Relabel every age one year older, for fish captured before the
    /// sender's age increment in the same step.
    pub fn relabel_older(&mut self) {
        let age = self.population.min_age().saturating_add(1);
        self.population.set_min_age(age);
        self.tags.set_min_age(age);
    }

    /// Split the parcel between `targets`.
    pub fn into_transfers(self, area: AreaId, targets: &[TransferTarget]) -> Vec<StockTransfer> {
        targets
            .iter()
            .map(|t| StockTransfer::Fish {
                target: t.stock,
                area,
                population: self.population.clone(),
                tags: self.tags.clone(),
                ratio: t.ratio,
                ci: Arc::clone(&t.ci),
            })
            .collect()
    }
}

/// Share of fish by length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proportion {
    /// Same share everywhere.
    Constant(f64),
    /// Logistic in length.
    Logistic {
        /// Slope.
        alpha: f64,
        /// Length at 50%.
        l50: f64,
    },
}

impl From<&ProportionConfig> for Proportion {
    fn from(config: &ProportionConfig) -> Self {
        match *config {
            ProportionConfig::Constant { value } => Self::Constant(value),
            ProportionConfig::Logistic { alpha, l50 } => Self::Logistic { alpha, l50 },
        }
    }
}

impl Proportion {
    /// Share at `length`, in `[0, 1]`.
    pub fn at(&self, length: f64) -> f64 {
        let p = match *self {
            Self::Constant(v) => v,
            Self::Logistic { alpha, l50 } => 1.0 / (1.0 + (-alpha * (length - l50)).exp()),
        };
        p.clamp(0.0, 1.0)
    }

    /// Share at every length in `lengths`.
    pub fn by_length(&self, lengths: &[f64]) -> Vec<f64> {
        lengths.iter().map(|&l| self.at(l)).collect()
    }
}

/// When and where a stock event happens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Steps of the year the event happens on.
    pub steps: Vec<u32>,
    /// Areas the event happens on; empty means every area.
    pub areas: Vec<AreaId>,
}

impl Schedule {
    /// Schedule from raw step and area lists.
    pub fn new(steps: &[u32], areas: &[u32]) -> Self {
        Self {
            steps: steps.to_vec(),
            areas: areas.iter().copied().map(AreaId::new).collect(),
        }
    }

    /// Returns `true` when the event happens in `area` at `time`.
    pub fn is_active(&self, area: AreaId, time: &TimeStep) -> bool {
        self.steps.contains(&time.step) && (self.areas.is_empty() || self.areas.contains(&area))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use shoal_types::{LengthGroupDivision, PopulationCell};

    use super::*;

    fn time(step: u32) -> TimeStep {
        TimeStep {
            year: 2000,
            step,
            substep: 1,
            num_substeps: 1,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: 1,
        }
    }

    #[test]
    fn schedule_matches_step_and_area() {
        let s = Schedule::new(&[2], &[]);
        assert!(s.is_active(AreaId::new(5), &time(2)));
        assert!(!s.is_active(AreaId::new(5), &time(3)));
        let s = Schedule::new(&[2], &[1]);
        assert!(!s.is_active(AreaId::new(5), &time(2)));
    }

    #[test]
    fn logistic_proportion_is_half_at_l50() {
        let p = Proportion::Logistic {
            alpha: 0.5,
            l50: 20.0,
        };
        assert!((p.at(20.0) - 0.5).abs() < 1e-12);
        assert!(p.at(40.0) > 0.99);
        assert!((Proportion::Constant(1.5).at(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn parcel_splits_between_targets_and_ages() {
        let div = LengthGroupDivision::uniform(0.0, 2.0, 1.0).unwrap();
        let ci = Arc::new(ConversionIndex::new(&div, &div).unwrap());
        let mut population = AgeBandMatrix::new(3, &[(0, 2)]).unwrap();
        *population.cell_mut(3, 0).unwrap() = PopulationCell::new(10.0, 1.0);
        let mut parcel = Parcel {
            population,
            tags: TagRatioMatrix::new(),
        };
        parcel.relabel_older();
        assert_eq!(parcel.population.min_age(), 4);
        let targets = [
            TransferTarget {
                stock: StockId::new(1),
                ratio: 0.25,
                ci: Arc::clone(&ci),
            },
            TransferTarget {
                stock: StockId::new(2),
                ratio: 0.75,
                ci,
            },
        ];
        let transfers = parcel.into_transfers(AreaId::new(1), &targets);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[1].target(), StockId::new(2));
    }
}
