//! Predator/prey consumption engine.
//!
//! Consumption is resolved in three explicit passes per area and sub-step,
//! with no pointers between predators and preys:
//!
//! 1. **Propose** -- every [`Predator`] spreads its appetite over the
//!    biomass its preys have left, weighted by suitability.
//! 2. **Check** -- every [`Prey`] adds up the proposals against it and
//!    returns, per length group, the share it can actually supply without
//!    exceeding the consumption ceiling.
//! 3. **Settle** -- predators scale their proposals by those shares. The
//!    part that was cut is recorded as overconsumption and is not
//!    redistributed.
//!
//! Accepted consumption accumulates over the sub-steps of a step and
//! reduces the prey once, in the stock's mortality phase.

use shoal_types::{MAX_RATIO_CONSUMED, PopulationCell, StockId, TimeStep, guarded_div};

use crate::config::{AppetiteConfig, SuitabilityConfig};

/// Suitability of prey lengths for predator lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suitability {
    /// Same value everywhere.
    Constant(f64),
    /// Logistic in prey and predator length.
    Exponential {
        /// Intercept.
        alpha: f64,
        /// Prey length slope.
        beta: f64,
        /// Predator length slope.
        gamma: f64,
        /// Maximum.
        delta: f64,
    },
    /// Andersen's function of the log length ratio.
    Andersen {
        /// Baseline.
        p0: f64,
        /// Preferred log ratio.
        p1: f64,
        /// Height.
        p2: f64,
        /// Width above the preferred ratio.
        p3: f64,
        /// Width below the preferred ratio.
        p4: f64,
    },
}

impl From<&SuitabilityConfig> for Suitability {
    fn from(config: &SuitabilityConfig) -> Self {
        match *config {
            SuitabilityConfig::Constant { value } => Self::Constant(value),
            SuitabilityConfig::Exponential {
                alpha,
                beta,
                gamma,
                delta,
            } => Self::Exponential {
                alpha,
                beta,
                gamma,
                delta,
            },
            SuitabilityConfig::Andersen { p0, p1, p2, p3, p4 } => {
                Self::Andersen { p0, p1, p2, p3, p4 }
            }
        }
    }
}

impl Suitability {
    /// Suitability of prey of length `prey` for a predator of length
    /// `predator`, never negative.
    pub fn value(&self, predator: f64, prey: f64) -> f64 {
        let raw = match *self {
            Self::Constant(v) => v,
            Self::Exponential {
                alpha,
                beta,
                gamma,
                delta,
            } => delta / (1.0 + (-alpha - beta * prey - gamma * predator).exp()),
            Self::Andersen { p0, p1, p2, p3, p4 } => {
                if prey <= 0.0 || predator <= 0.0 {
                    return p0.max(0.0);
                }
                let l = (predator / prey).ln();
                let width = if l <= p1 { p4 } else { p3 };
                let d = l - p1;
                p2.mul_add((-(d * d) / width).exp(), p0)
            }
        };
        if raw.is_finite() { raw.max(0.0) } else { 0.0 }
    }

    /// Suitability table indexed `[predator group][prey group]`.
    pub fn table(&self, predator_means: &[f64], prey_means: &[f64]) -> Vec<Vec<f64>> {
        predator_means
            .iter()
            .map(|&p| prey_means.iter().map(|&q| self.value(p, q)).collect())
            .collect()
    }
}

/// How much a predator wants to eat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Appetite {
    /// A fixed share of own biomass per step.
    FixedRatio {
        /// Share of biomass.
        ratio: f64,
    },
    /// Length and temperature dependent maximum, limited by food.
    MaxConsumption {
        /// `m0 * exp(T * (m1 + m2 * T)) * L^m3` per fish per year.
        coefficients: [f64; 4],
        /// Food density giving half the maximum.
        half_feeding: f64,
    },
}

impl From<&AppetiteConfig> for Appetite {
    fn from(config: &AppetiteConfig) -> Self {
        match *config {
            AppetiteConfig::FixedRatio { ratio } => Self::FixedRatio { ratio },
            AppetiteConfig::MaxConsumption {
                coefficients,
                half_feeding,
            } => Self::MaxConsumption {
                coefficients,
                half_feeding,
            },
        }
    }
}

/// Environment of one feeding sub-step.
#[derive(Debug, Clone, Copy)]
pub struct FeedingContext {
    /// Time descriptor, positioned at the sub-step.
    pub time: TimeStep,
    /// Temperature of the area.
    pub temperature: f64,
    /// Size of the area.
    pub area_size: f64,
}

/// A predator's link to one prey stock.
#[derive(Debug, Clone, PartialEq)]
pub struct PreyLink {
    /// Prey stock.
    pub prey: StockId,
    /// Suitability indexed `[predator group][prey group]`.
    pub suitability: Vec<Vec<f64>>,
}

impl PreyLink {
    fn suit(&self, p: usize, l: usize) -> f64 {
        self.suitability
            .get(p)
            .and_then(|row| row.get(l))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Per-area feeding state of a predator, reset every step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredatorArea {
    /// Accepted consumption by predator length group, this step.
    pub consumption: Vec<f64>,
    /// Clawed-back consumption by predator length group, this step.
    pub overconsumption: Vec<f64>,
    /// Feeding level by predator length group, averaged over sub-steps.
    pub fphi: Vec<f64>,
    /// Maximum consumption per fish by predator length group, per sub-step.
    pub max_consumption: Vec<f64>,
    /// Accepted consumption per link, by prey length group, this step.
    pub eaten: Vec<Vec<f64>>,
    /// Current proposals per link, indexed `[predator group][prey group]`.
    proposals: Vec<Vec<Vec<f64>>>,
}

/// Feeding behaviour of a predator stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Predator {
    appetite: Appetite,
    lengths: Vec<f64>,
    links: Vec<PreyLink>,
    areas: Vec<PredatorArea>,
}

impl Predator {
    /// Predator with mean lengths `lengths` feeding on `links`, present on
    /// `num_areas` areas.
    pub fn new(appetite: Appetite, lengths: Vec<f64>, links: Vec<PreyLink>, num_areas: usize) -> Self {
        Self {
            appetite,
            lengths,
            links,
            areas: vec![PredatorArea::default(); num_areas],
        }
    }

    /// The appetite.
    pub const fn appetite(&self) -> &Appetite {
        &self.appetite
    }

    /// Links to prey stocks.
    pub fn links(&self) -> &[PreyLink] {
        &self.links
    }

    /// Feeding state in the area at `index`.
    pub fn area(&self, index: usize) -> Option<&PredatorArea> {
        self.areas.get(index)
    }

    /// Reset the feeding state of an area at the start of a step.
    pub fn begin_step(&mut self, index: usize) {
        let groups = self.lengths.len();
        let links = self.links.len();
        if let Some(state) = self.areas.get_mut(index) {
            state.consumption = vec![0.0; groups];
            state.overconsumption = vec![0.0; groups];
            state.fphi = vec![0.0; groups];
            state.max_consumption = vec![0.0; groups];
            state.eaten = vec![Vec::new(); links];
            state.proposals = vec![Vec::new(); links];
        }
    }

    /// Propose consumption for one sub-step.
    ///
    /// `numbers` are the predator's numbers by length group;
    /// `available[k]` is the biomass by length group left in the prey of
    /// link `k`, or `None` when that prey is absent from the area.
    pub fn propose(
        &mut self,
        index: usize,
        ctx: &FeedingContext,
        numbers: &[PopulationCell],
        available: &[Option<&[f64]>],
    ) {
        let substeps = ctx.time.substeps_f64();
        let Some(state) = self.areas.get_mut(index) else {
            return;
        };
        for k in 0..self.links.len() {
            let prey_groups = available.get(k).copied().flatten().map_or(0, <[f64]>::len);
            if let Some(p) = state.proposals.get_mut(k) {
                *p = vec![vec![0.0; prey_groups]; self.lengths.len()];
            }
            if let Some(e) = state.eaten.get_mut(k) {
                if e.len() != prey_groups {
                    e.resize(prey_groups, 0.0);
                }
            }
        }

        for (p, &length) in self.lengths.iter().enumerate() {
            let cell = numbers.get(p).copied().unwrap_or_default();
            let food: f64 = self
                .links
                .iter()
                .enumerate()
                .filter_map(|(k, link)| {
                    available.get(k).copied().flatten().map(|avail| {
                        avail
                            .iter()
                            .enumerate()
                            .map(|(l, b)| link.suit(p, l) * b.max(0.0))
                            .sum::<f64>()
                    })
                })
                .sum();

            let want = match self.appetite {
                Appetite::FixedRatio { ratio } => {
                    add_at(&mut state.fphi, p, 1.0 / substeps);
                    cell.biomass() * ratio / substeps
                }
                Appetite::MaxConsumption {
                    coefficients: [m0, m1, m2, m3],
                    half_feeding,
                } => {
                    let t = ctx.temperature;
                    let yearly = m0 * (t * m2.mul_add(t, m1)).exp() * length.powf(m3);
                    let per_substep = yearly * ctx.time.step_fraction() / substeps;
                    let phi = guarded_div(food, half_feeding.mul_add(ctx.area_size, food));
                    add_at(&mut state.fphi, p, phi / substeps);
                    if let Some(slot) = state.max_consumption.get_mut(p) {
                        *slot = per_substep;
                    }
                    per_substep * cell.n * phi
                }
            };

            if want <= 0.0 {
                continue;
            }
            if food <= 0.0 {
                add_at(&mut state.overconsumption, p, want);
                continue;
            }
            let scale = want / food;
            for (k, link) in self.links.iter().enumerate() {
                let Some(avail) = available.get(k).copied().flatten() else {
                    continue;
                };
                let Some(row) = state.proposals.get_mut(k).and_then(|m| m.get_mut(p)) else {
                    continue;
                };
                for (l, slot) in row.iter_mut().enumerate() {
                    let b = avail.get(l).copied().unwrap_or(0.0).max(0.0);
                    *slot = link.suit(p, l) * b * scale;
                }
            }
        }
    }

    /// Total proposed consumption of link `k`, by prey length group.
    pub fn proposal(&self, index: usize, k: usize) -> Vec<f64> {
        let Some(matrix) = self.areas.get(index).and_then(|s| s.proposals.get(k)) else {
            return Vec::new();
        };
        let groups = matrix.first().map_or(0, Vec::len);
        let mut out = vec![0.0; groups];
        for row in matrix {
            for (slot, v) in out.iter_mut().zip(row) {
                *slot += v;
            }
        }
        out
    }

    /// Scale the proposals of link `k` by the share `factors[l]` the prey
    /// could supply at each prey length, accumulating accepted consumption
    /// and overconsumption.
    pub fn settle(&mut self, index: usize, k: usize, factors: &[f64]) {
        let Some(state) = self.areas.get_mut(index) else {
            return;
        };
        let Some(matrix) = state.proposals.get_mut(k) else {
            return;
        };
        for (p, row) in matrix.iter_mut().enumerate() {
            for (l, proposed) in row.iter_mut().enumerate() {
                let f = factors.get(l).copied().unwrap_or(1.0).clamp(0.0, 1.0);
                let accepted = *proposed * f;
                let cut = *proposed - accepted;
                *proposed = accepted;
                add_at(&mut state.consumption, p, accepted);
                add_at(&mut state.overconsumption, p, cut);
                if let Some(e) = state.eaten.get_mut(k) {
                    add_at(e, l, accepted);
                }
            }
        }
    }
}

fn add_at(values: &mut [f64], i: usize, amount: f64) {
    if let Some(slot) = values.get_mut(i) {
        *slot += amount;
    }
}

/// Per-area prey state, reset every step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreyArea {
    /// Biomass by length group at the start of the step.
    pub biomass: Vec<f64>,
    /// Accepted consumption by length group so far this step.
    pub consumed: Vec<f64>,
}

/// Prey side of a stock that can be eaten.
#[derive(Debug, Clone, PartialEq)]
pub struct Prey {
    areas: Vec<PreyArea>,
}

impl Prey {
    /// Prey present on `num_areas` areas.
    pub fn new(num_areas: usize) -> Self {
        Self {
            areas: vec![PreyArea::default(); num_areas],
        }
    }

    /// State in the area at `index`.
    pub fn area(&self, index: usize) -> Option<&PreyArea> {
        self.areas.get(index)
    }

    /// Record the biomass at the start of a step and clear consumption.
    pub fn begin_step(&mut self, index: usize, numbers: &[PopulationCell]) {
        if let Some(state) = self.areas.get_mut(index) {
            state.biomass = numbers.iter().map(|c| c.biomass().max(0.0)).collect();
            state.consumed = vec![0.0; numbers.len()];
        }
    }

    /// Biomass by length group not yet eaten this step.
    pub fn available(&self, index: usize) -> Vec<f64> {
        self.areas.get(index).map_or_else(Vec::new, |state| {
            state
                .biomass
                .iter()
                .zip(&state.consumed)
                .map(|(b, c)| (b - c).max(0.0))
                .collect()
        })
    }

    /// Check the total proposed consumption against the ceiling
    /// `MAX_RATIO_CONSUMED^substeps` of start-of-step biomass and return,
    /// per length group, the share of the proposal that can be supplied.
    pub fn check(&mut self, index: usize, proposed: &[f64], substeps: u32) -> Vec<f64> {
        let Some(state) = self.areas.get_mut(index) else {
            return Vec::new();
        };
        let ceiling = MAX_RATIO_CONSUMED.powi(i32::try_from(substeps.max(1)).unwrap_or(1));
        state
            .biomass
            .iter()
            .zip(state.consumed.iter_mut())
            .enumerate()
            .map(|(l, (b0, consumed))| {
                let wanted = proposed.get(l).copied().unwrap_or(0.0).max(0.0);
                if wanted <= 0.0 {
                    return 1.0;
                }
                let allowed = ceiling.mul_add(*b0, -*consumed).max(0.0);
                let factor = if wanted > allowed { allowed / wanted } else { 1.0 };
                *consumed += wanted * factor;
                factor
            })
            .collect()
    }

    /// Survival factor by length group implied by this step's
    /// consumption.
    pub fn survival(&self, index: usize) -> Vec<f64> {
        self.areas.get(index).map_or_else(Vec::new, |state| {
            state
                .biomass
                .iter()
                .zip(&state.consumed)
                .map(|(b, c)| (1.0 - guarded_div(*c, *b)).clamp(0.0, 1.0))
                .collect()
        })
    }

    /// Total biomass eaten in an area this step.
    pub fn total_consumed(&self, index: usize) -> f64 {
        self.areas
            .get(index)
            .map_or(0.0, |state| state.consumed.iter().sum())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn ctx(substeps: u32) -> FeedingContext {
        FeedingContext {
            time: TimeStep {
                year: 2000,
                step: 1,
                substep: 1,
                num_substeps: substeps,
                steps_per_year: 4,
                step_length: 3.0,
                year_length: 12.0,
                time: 1,
            },
            temperature: 5.0,
            area_size: 1.0,
        }
    }

    fn greedy_predator() -> Predator {
        Predator::new(
            Appetite::FixedRatio { ratio: 10.0 },
            vec![30.0],
            vec![PreyLink {
                prey: StockId::new(1),
                suitability: vec![vec![1.0, 1.0]],
            }],
            1,
        )
    }

    #[test]
    fn andersen_peaks_at_preferred_ratio() {
        let s = Suitability::Andersen {
            p0: 0.0,
            p1: 2.0_f64.ln(),
            p2: 1.0,
            p3: 0.5,
            p4: 0.5,
        };
        assert!(close(s.value(20.0, 10.0), 1.0));
        assert!(s.value(40.0, 10.0) < 1.0);
        assert!(close(Suitability::Constant(-1.0).value(1.0, 1.0), 0.0));
    }

    #[test]
    fn proposals_follow_suitability_and_appetite() {
        let mut pred = Predator::new(
            Appetite::FixedRatio { ratio: 0.1 },
            vec![30.0],
            vec![PreyLink {
                prey: StockId::new(1),
                suitability: vec![vec![1.0, 3.0]],
            }],
            1,
        );
        pred.begin_step(0);
        let avail = [100.0, 100.0];
        pred.propose(0, &ctx(1), &[PopulationCell::new(10.0, 10.0)], &[Some(&avail)]);
        let proposal = pred.proposal(0, 0);
        assert!(close(proposal[0], 2.5));
        assert!(close(proposal[1], 7.5));
    }

    #[test]
    fn ceiling_claws_back_and_records_overconsumption() {
        let mut pred = greedy_predator();
        let mut prey = Prey::new(1);
        let numbers = [PopulationCell::new(10.0, 1.0), PopulationCell::new(10.0, 1.0)];
        prey.begin_step(0, &numbers);
        pred.begin_step(0);

        for substep in 1..=2 {
            let mut c = ctx(2);
            c.time = c.time.with_substep(substep);
            let avail = prey.available(0);
            pred.propose(0, &c, &[PopulationCell::new(10.0, 10.0)], &[Some(&avail)]);
            let factors = prey.check(0, &pred.proposal(0, 0), 2);
            pred.settle(0, 0, &factors);
        }

        let limit = 0.95_f64.powi(2) * 10.0;
        let state = prey.area(0).unwrap();
        for consumed in &state.consumed {
            assert!(*consumed <= limit + 1e-9);
        }
        let p = pred.area(0).unwrap();
        assert!(close(p.consumption[0], prey.total_consumed(0)));
        assert!(p.overconsumption[0] > 0.0);
        assert!(close(p.consumption[0] + p.overconsumption[0], 1000.0));
        assert!(prey.survival(0).iter().all(|s| *s >= 1.0 - 0.95_f64.powi(2) - 1e-9));
    }

    #[test]
    fn absent_prey_turns_appetite_into_overconsumption() {
        let mut pred = greedy_predator();
        pred.begin_step(0);
        pred.propose(0, &ctx(1), &[PopulationCell::new(1.0, 2.0)], &[None]);
        let state = pred.area(0).unwrap();
        assert!(close(state.overconsumption[0], 20.0));
        assert!(close(state.consumption[0], 0.0));
        assert!(pred.proposal(0, 0).is_empty());
    }

    #[test]
    fn predator_without_appetite_claims_nothing() {
        // No fish at all, and a feeding level of zero with nothing suitable.
        let blind = Predator::new(
            Appetite::MaxConsumption {
                coefficients: [1.0, 0.0, 0.0, 0.0],
                half_feeding: 1.0,
            },
            vec![30.0],
            vec![PreyLink {
                prey: StockId::new(1),
                suitability: vec![vec![0.0, 0.0]],
            }],
            1,
        );
        for (mut pred, predators) in [
            (greedy_predator(), PopulationCell::ZERO),
            (blind, PopulationCell::new(10.0, 10.0)),
        ] {
            let mut prey = Prey::new(1);
            prey.begin_step(0, &[PopulationCell::new(10.0, 1.0), PopulationCell::new(10.0, 1.0)]);
            pred.begin_step(0);

            let avail = prey.available(0);
            pred.propose(0, &ctx(1), &[predators], &[Some(&avail)]);
            let proposal = pred.proposal(0, 0);
            assert!(proposal.iter().all(|c| close(*c, 0.0)));
            let factors = prey.check(0, &proposal, 1);
            pred.settle(0, 0, &factors);

            assert!(close(prey.total_consumed(0), 0.0));
            assert!(prey.survival(0).iter().all(|s| close(*s, 1.0)));
            let state = pred.area(0).unwrap();
            assert!(close(state.consumption[0], 0.0));
            assert!(close(state.overconsumption[0], 0.0));
        }
    }

    #[test]
    fn max_consumption_feeding_level_saturates() {
        let mut pred = Predator::new(
            Appetite::MaxConsumption {
                coefficients: [1.0, 0.0, 0.0, 0.0],
                half_feeding: 1.0,
            },
            vec![30.0],
            vec![PreyLink {
                prey: StockId::new(0),
                suitability: vec![vec![1.0]],
            }],
            1,
        );
        pred.begin_step(0);
        let avail = [9.0];
        pred.propose(0, &ctx(1), &[PopulationCell::new(4.0, 1.0)], &[Some(&avail)]);
        let state = pred.area(0).unwrap();
        assert!(close(state.fphi[0], 0.9));
        // 1 per fish per year over a quarter, 4 fish, phi 0.9.
        assert!(close(pred.proposal(0, 0)[0], 0.9));
    }

    #[test]
    fn zero_proposal_leaves_prey_untouched() {
        let mut prey = Prey::new(1);
        prey.begin_step(0, &[PopulationCell::new(5.0, 2.0)]);
        let factors = prey.check(0, &[0.0], 1);
        assert!(close(factors[0], 1.0));
        assert!(close(prey.survival(0)[0], 1.0));
    }
}
