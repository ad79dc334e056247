//! Spawning and stock-recruitment.
//!
//! Spawning thins and lightens the spawners in place. The recruits it
//! produces are handed to the recipient stock as a [`RecruitBatch`] once
//! every stock has spawned.

use shoal_matrix::AgeBandMatrix;
use shoal_types::{AreaId, PopulationCell, StockId, TimeStep, guarded_div};

use crate::config::{ConditionConfig, RecruitmentFunctionConfig};
use crate::transfer::{Proportion, RecruitBatch, Schedule};

/// Stock-recruitment function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecruitmentFunction {
    /// Recruits from a fecundity index over spawners.
    Fecundity {
        /// Multiplier.
        p0: f64,
        /// Length exponent.
        p1: f64,
        /// Age exponent.
        p2: f64,
        /// Weight exponent.
        p3: f64,
    },
    /// Ricker curve of spawning biomass.
    Ricker {
        /// Productivity.
        mu: f64,
        /// Density dependence.
        lambda: f64,
    },
    /// Beverton-Holt curve of spawning biomass.
    BevertonHolt {
        /// Maximum recruitment.
        mu: f64,
        /// Biomass giving half the maximum.
        lambda: f64,
    },
}

impl From<&RecruitmentFunctionConfig> for RecruitmentFunction {
    fn from(config: &RecruitmentFunctionConfig) -> Self {
        match *config {
            RecruitmentFunctionConfig::Fecundity { p0, p1, p2, p3 } => {
                Self::Fecundity { p0, p1, p2, p3 }
            }
            RecruitmentFunctionConfig::Ricker { mu, lambda } => Self::Ricker { mu, lambda },
            RecruitmentFunctionConfig::BevertonHolt { mu, lambda } => {
                Self::BevertonHolt { mu, lambda }
            }
        }
    }
}

/// Recruitment produced by spawning.
#[derive(Debug, Clone, PartialEq)]
pub struct Recruitment {
    /// Stock receiving the recruits.
    pub recipient: StockId,
    /// Stock-recruitment function.
    pub function: RecruitmentFunction,
    /// Mean length of recruits.
    pub mean_length: f64,
    /// Standard deviation of recruit length.
    pub sd_length: f64,
    /// Weight-at-length of recruits.
    pub condition: ConditionConfig,
}

/// What one spawning event produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpawnOutcome {
    /// Biomass of spawners before spawning losses.
    pub spawning_biomass: f64,
    /// Number of spawners that died.
    pub dead: f64,
    /// Sum of `L^p1 * a^p2 * N * W^p3` over spawners, for fecundity
    /// recruitment.
    pub fecundity_index: f64,
}

/// Spawning of one stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawner {
    schedule: Schedule,
    proportion: Proportion,
    mortality: f64,
    weight_loss: f64,
    recruitment: Option<Recruitment>,
}

impl Spawner {
    /// Spawning with the given losses and optional recruitment.
    pub fn new(
        schedule: Schedule,
        proportion: Proportion,
        mortality: f64,
        weight_loss: f64,
        recruitment: Option<Recruitment>,
    ) -> Self {
        Self {
            schedule,
            proportion,
            mortality: mortality.clamp(0.0, 1.0),
            weight_loss: weight_loss.clamp(0.0, 1.0),
            recruitment,
        }
    }

    /// Returns `true` when the stock spawns in `area` at `time`.
    pub fn is_spawn_step(&self, area: AreaId, time: &TimeStep) -> bool {
        self.schedule.is_active(area, time)
    }

    /// Spawn in place: the spawning share of every cell loses
    /// `mortality` of its fish and `weight_loss` of its weight.
    pub fn spawn(&self, population: &mut AgeBandMatrix, lengths: &[f64]) -> SpawnOutcome {
        let shares = self.proportion.by_length(lengths);
        let exponents = match self.recruitment.as_ref().map(|r| r.function) {
            Some(RecruitmentFunction::Fecundity { p1, p2, p3, .. }) => Some((p1, p2, p3)),
            _ => None,
        };
        let mut outcome = SpawnOutcome::default();
        let spawners = population.extract(&shares, 0, u32::MAX);
        for (age, row) in spawners.ages() {
            for (l, cell) in row.iter() {
                if cell.is_empty() {
                    continue;
                }
                outcome.spawning_biomass += cell.biomass();
                outcome.dead += cell.n * self.mortality;
                if let Some((p1, p2, p3)) = exponents {
                    let length = lengths.get(l).copied().unwrap_or(0.0);
                    outcome.fecundity_index += length.powf(p1)
                        * f64::from(age).powf(p2)
                        * cell.n
                        * cell.w.powf(p3);
                }
                let survivor = PopulationCell::new(
                    cell.n * (1.0 - self.mortality),
                    cell.w * (1.0 - self.weight_loss),
                );
                if let Ok(slot) = population.cell_mut(age, l) {
                    *slot += survivor;
                }
            }
        }
        outcome
    }

    /// Recruits produced by `outcome`, if the stock recruits.
    pub fn recruits(&self, outcome: &SpawnOutcome) -> Option<(StockId, RecruitBatch)> {
        let r = self.recruitment.as_ref()?;
        let ssb = outcome.spawning_biomass;
        let number = match r.function {
            RecruitmentFunction::Fecundity { p0, .. } => p0 * outcome.fecundity_index,
            RecruitmentFunction::Ricker { mu, lambda } => mu * ssb * (-lambda * ssb).exp(),
            RecruitmentFunction::BevertonHolt { mu, lambda } => {
                guarded_div(mu * ssb, lambda + ssb)
            }
        };
        Some((
            r.recipient,
            RecruitBatch {
                age: None,
                number: number.max(0.0),
                mean_length: r.mean_length,
                sd_length: r.sd_length,
                condition: r.condition,
            },
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn population() -> AgeBandMatrix {
        let mut m = AgeBandMatrix::new(2, &[(0, 2)]).unwrap();
        *m.cell_mut(2, 0).unwrap() = PopulationCell::new(100.0, 1.0);
        *m.cell_mut(2, 1).unwrap() = PopulationCell::new(100.0, 2.0);
        m
    }

    fn spawner(function: RecruitmentFunction) -> Spawner {
        Spawner::new(
            Schedule::new(&[1], &[]),
            Proportion::Constant(0.5),
            0.2,
            0.5,
            Some(Recruitment {
                recipient: StockId::new(0),
                function,
                mean_length: 5.0,
                sd_length: 1.0,
                condition: ConditionConfig::default(),
            }),
        )
    }

    #[test]
    fn spawning_kills_and_lightens_spawners() {
        let s = spawner(RecruitmentFunction::Ricker {
            mu: 1.0,
            lambda: 0.0,
        });
        let mut m = population();
        let outcome = s.spawn(&mut m, &[10.0, 20.0]);
        assert!(close(outcome.spawning_biomass, 150.0));
        assert!(close(outcome.dead, 20.0));
        let cell = m.cell(2, 0).unwrap();
        assert!(close(cell.n, 90.0));
        // 50 non-spawners at 1.0 and 40 survivors at 0.5.
        assert!(close(cell.w, (50.0 + 20.0) / 90.0));
    }

    #[test]
    fn recruitment_curves() {
        let outcome = SpawnOutcome {
            spawning_biomass: 10.0,
            dead: 0.0,
            fecundity_index: 4.0,
        };
        let (_, ricker) = spawner(RecruitmentFunction::Ricker {
            mu: 2.0,
            lambda: 0.1,
        })
        .recruits(&outcome)
        .unwrap();
        assert!(close(ricker.number, 20.0 * (-1.0_f64).exp()));
        let (_, bh) = spawner(RecruitmentFunction::BevertonHolt {
            mu: 30.0,
            lambda: 10.0,
        })
        .recruits(&outcome)
        .unwrap();
        assert!(close(bh.number, 15.0));
        let (_, fec) = spawner(RecruitmentFunction::Fecundity {
            p0: 0.5,
            p1: 0.0,
            p2: 0.0,
            p3: 0.0,
        })
        .recruits(&outcome)
        .unwrap();
        assert!(close(fec.number, 2.0));
    }

    #[test]
    fn fecundity_index_sums_over_spawners() {
        let s = spawner(RecruitmentFunction::Fecundity {
            p0: 1.0,
            p1: 1.0,
            p2: 0.0,
            p3: 1.0,
        });
        let mut m = population();
        let outcome = s.spawn(&mut m, &[10.0, 20.0]);
        // 50 spawners per group: 10 * 50 * 1 + 20 * 50 * 2.
        assert!(close(outcome.fecundity_index, 2500.0));
    }
}
