//! A stock: one age/length-structured population living on a set of areas.
//!
//! The stock owns one [`AgeBandMatrix`] and one [`TagRatioMatrix`] per
//! area and exposes the phase entry points the ecosystem calls, in this
//! order, for every area it lives on:
//!
//! 1. [`Stock::calc_numbers`] -- sum numbers by length group
//! 2. [`Stock::calc_eat`], [`Stock::check_eat`], [`Stock::adjust_eat`] --
//!    the feeding passes, once per sub-step
//! 3. [`Stock::reduce_pop`] -- predation then natural mortality
//! 4. [`Stock::grow`] -- growth, with maturation on maturation steps
//! 5. [`Stock::update_age_part1`] to [`Stock::update_age_part3`] --
//!    transition keep, age increment, transition move
//! 6. [`Stock::update_population_part1`] to
//!    [`Stock::update_population_part5`] -- spawning, maturation move,
//!    renewal and recruitment, straying
//!
//! Phases that send fish to other stocks return [`StockTransfer`] values
//! instead of touching the receiver.

use std::sync::Arc;

use shoal_matrix::{
    AgeBandMatrix, GrowthTransition, MatrixError, MaturityRule, TagRatioMatrix, WeightChange,
};
use shoal_types::{AreaId, ConversionIndex, LengthGroupDivision, PopulationCell, StockId, TimeStep};
use tracing::debug;

use crate::growth::{GrowthIncrements, GrowthSignals, Grower};
use crate::maturity::Maturation;
use crate::migration::Migration;
use crate::predation::{FeedingContext, Predator, Prey};
use crate::renewal::{self, Renewal};
use crate::spawning::{SpawnOutcome, Spawner};
use crate::straying::Straying;
use crate::transfer::{Parcel, RecruitBatch, StockTransfer};
use crate::transition::Transition;

/// Errors raised by stock phases.
#[derive(Debug, thiserror::Error)]
pub enum StockError {
    /// A population or tag operation failed.
    #[error("matrix error: {source}")]
    Matrix {
        /// The underlying matrix error.
        #[from]
        source: MatrixError,
    },

    /// The stock does not live on the area.
    #[error("stock {stock} does not live on area {area}")]
    UnknownArea {
        /// Stock name.
        stock: String,
        /// Requested area.
        area: AreaId,
    },

    /// The age was incremented twice in the same step.
    #[error("stock {stock} already aged on area {area} at step {time}")]
    AgeIncrementRepeated {
        /// Stock name.
        stock: String,
        /// Area of the repeated increment.
        area: AreaId,
        /// Running step counter.
        time: u64,
    },
}

/// State of the stock on one area.
#[derive(Debug, Clone)]
struct StockArea {
    id: AreaId,
    population: AgeBandMatrix,
    tags: TagRatioMatrix,
    numbers: Vec<PopulationCell>,
    last_aged: Option<u64>,
    matured: Option<Parcel>,
    kept: Option<Parcel>,
    strayed: Option<Parcel>,
    spawned: Option<SpawnOutcome>,
}

fn locate<'a>(
    local: &'a mut [StockArea],
    stock: &str,
    area: AreaId,
) -> Result<(usize, &'a mut StockArea), StockError> {
    local
        .iter_mut()
        .enumerate()
        .find(|(_, l)| l.id == area)
        .ok_or_else(|| StockError::UnknownArea {
            stock: stock.to_owned(),
            area,
        })
}

/// One stock of the ecosystem.
#[derive(Debug, Clone)]
pub struct Stock {
    id: StockId,
    name: String,
    division: Arc<LengthGroupDivision>,
    identity: Arc<ConversionIndex>,
    lengths: Vec<f64>,
    birthday_step: u32,
    local: Vec<StockArea>,
    natural_mortality: Vec<f64>,
    grower: Option<Grower>,
    predator: Option<Predator>,
    prey: Option<Prey>,
    maturation: Option<Maturation>,
    transition: Option<Transition>,
    spawner: Option<Spawner>,
    renewal: Renewal,
    straying: Option<Straying>,
    migration: Option<Migration>,
}

impl Stock {
    /// A stock with the given populations, one per area, that ages on
    /// `birthday_step`. Every process starts disabled.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the identity conversion of
    /// `division` cannot be built.
    pub fn new(
        id: StockId,
        name: impl Into<String>,
        division: Arc<LengthGroupDivision>,
        populations: Vec<(AreaId, AgeBandMatrix)>,
        birthday_step: u32,
    ) -> Result<Self, StockError> {
        let identity = ConversionIndex::new(&division, &division).map_err(MatrixError::from)?;
        let lengths = division.mean_lengths().to_vec();
        let groups = lengths.len();
        Ok(Self {
            id,
            name: name.into(),
            identity: Arc::new(identity),
            lengths,
            birthday_step,
            local: populations
                .into_iter()
                .map(|(id, population)| StockArea {
                    id,
                    population,
                    tags: TagRatioMatrix::new(),
                    numbers: vec![PopulationCell::ZERO; groups],
                    last_aged: None,
                    matured: None,
                    kept: None,
                    strayed: None,
                    spawned: None,
                })
                .collect(),
            division,
            natural_mortality: Vec::new(),
            grower: None,
            predator: None,
            prey: None,
            maturation: None,
            transition: None,
            spawner: None,
            renewal: Renewal::default(),
            straying: None,
            migration: None,
        })
    }

    // -----------------------------------------------------------------
    // Process setup
    // -----------------------------------------------------------------

    /// Natural mortality per year by age, from the youngest age. Older
    /// ages reuse the last value.
    #[must_use]
    pub fn with_natural_mortality(mut self, mortality: Vec<f64>) -> Self {
        self.natural_mortality = mortality;
        self
    }

    /// Enable growth.
    #[must_use]
    pub fn with_growth(mut self, grower: Grower) -> Self {
        self.grower = Some(grower);
        self
    }

    /// Enable feeding.
    #[must_use]
    pub fn with_predator(mut self, predator: Predator) -> Self {
        self.predator = Some(predator);
        self
    }

    /// Let predators eat this stock.
    #[must_use]
    pub fn with_prey(mut self) -> Self {
        self.prey = Some(Prey::new(self.local.len()));
        self
    }

    /// Enable maturation.
    #[must_use]
    pub fn with_maturation(mut self, maturation: Maturation) -> Self {
        self.maturation = Some(maturation);
        self
    }

    /// Enable transition of the oldest age.
    #[must_use]
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Enable spawning.
    #[must_use]
    pub fn with_spawning(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Scheduled recruitment.
    #[must_use]
    pub fn with_renewal(mut self, renewal: Renewal) -> Self {
        self.renewal = renewal;
        self
    }

    /// Enable straying.
    #[must_use]
    pub fn with_straying(mut self, straying: Straying) -> Self {
        self.straying = Some(straying);
        self
    }

    /// Enable migration between areas.
    #[must_use]
    pub fn with_migration(mut self, migration: Migration) -> Self {
        self.migration = Some(migration);
        self
    }

    // -----------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------

    /// Identifier in the ecosystem.
    pub const fn id(&self) -> StockId {
        self.id
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length-group division.
    pub fn division(&self) -> &Arc<LengthGroupDivision> {
        &self.division
    }

    /// Areas the stock lives on.
    pub fn areas(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.local.iter().map(|l| l.id)
    }

    /// Returns `true` if the stock lives on `area`.
    pub fn lives_on(&self, area: AreaId) -> bool {
        self.local.iter().any(|l| l.id == area)
    }

    /// Step of the year on which the stock ages.
    pub const fn birthday_step(&self) -> u32 {
        self.birthday_step
    }

    /// Youngest age.
    pub fn min_age(&self) -> u32 {
        self.local.first().map_or(0, |l| l.population.min_age())
    }

    /// Oldest age.
    pub fn max_age(&self) -> u32 {
        self.local.first().map_or(0, |l| l.population.max_age())
    }

    /// First allocated length group of `age` on `area`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError`] if the area or age is unknown.
    pub fn min_length(&self, area: AreaId, age: u32) -> Result<usize, StockError> {
        Ok(self.population(area)?.min_length(age)?)
    }

    /// One past the last allocated length group of `age` on `area`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError`] if the area or age is unknown.
    pub fn max_length(&self, area: AreaId, age: u32) -> Result<usize, StockError> {
        Ok(self.population(area)?.max_length(age)?)
    }

    /// Number and mean weight of one cell.
    ///
    /// # Errors
    ///
    /// Returns [`StockError`] if the area is unknown or the cell is outside
    /// the band of `age`.
    pub fn cell(&self, area: AreaId, age: u32, l: usize) -> Result<PopulationCell, StockError> {
        Ok(self.population(area)?.cell(age, l)?)
    }

    /// Population on `area`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn population(&self, area: AreaId) -> Result<&AgeBandMatrix, StockError> {
        self.local
            .iter()
            .find(|l| l.id == area)
            .map(|l| &l.population)
            .ok_or_else(|| self.unknown(area))
    }

    /// Tag cohorts on `area`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn tags(&self, area: AreaId) -> Result<&TagRatioMatrix, StockError> {
        self.local
            .iter()
            .find(|l| l.id == area)
            .map(|l| &l.tags)
            .ok_or_else(|| self.unknown(area))
    }

    /// Feeding side, if the stock eats.
    pub const fn predator(&self) -> Option<&Predator> {
        self.predator.as_ref()
    }

    /// Returns `true` if predators can eat the stock.
    pub const fn is_prey(&self) -> bool {
        self.prey.is_some()
    }

    /// Number of fish over every area.
    pub fn total_number(&self) -> f64 {
        self.local.iter().map(|l| l.population.total_number()).sum()
    }

    /// Biomass over every area.
    pub fn total_biomass(&self) -> f64 {
        self.local.iter().map(|l| l.population.total_biomass()).sum()
    }

    /// Biomass eaten by this stock in the current step.
    pub fn consumption(&self) -> f64 {
        self.predator.as_ref().map_or(0.0, |p| {
            (0..self.local.len())
                .filter_map(|i| p.area(i))
                .map(|a| a.consumption.iter().sum::<f64>())
                .sum()
        })
    }

    /// Consumption clawed back from this stock in the current step.
    pub fn overconsumption(&self) -> f64 {
        self.predator.as_ref().map_or(0.0, |p| {
            (0..self.local.len())
                .filter_map(|i| p.area(i))
                .map(|a| a.overconsumption.iter().sum::<f64>())
                .sum()
        })
    }

    /// Biomass of this stock eaten in the current step.
    pub fn eaten(&self) -> f64 {
        self.prey.as_ref().map_or(0.0, |p| {
            (0..self.local.len()).map(|i| p.total_consumed(i)).sum()
        })
    }

    fn unknown(&self, area: AreaId) -> StockError {
        StockError::UnknownArea {
            stock: self.name.clone(),
            area,
        }
    }

    fn mortality_at(&self, age: u32) -> f64 {
        let offset = usize::try_from(age.saturating_sub(self.min_age())).unwrap_or(usize::MAX);
        self.natural_mortality
            .get(offset)
            .or_else(|| self.natural_mortality.last())
            .copied()
            .unwrap_or(0.0)
    }

    // -----------------------------------------------------------------
    // Mutation entry points
    // -----------------------------------------------------------------

    /// Move fish between areas with this step's migration matrix.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if fish cannot be merged.
    pub fn migrate(&mut self, time: &TimeStep) -> Result<(), StockError> {
        let Some(matrix) = self.migration.as_ref().and_then(|m| m.matrix_for(time)) else {
            return Ok(());
        };
        let mut populations: Vec<AgeBandMatrix> =
            self.local.iter().map(|l| l.population.clone()).collect();
        let mut tags: Vec<TagRatioMatrix> = self.local.iter().map(|l| l.tags.clone()).collect();
        Migration::apply(matrix, &mut populations, &mut tags, &self.identity)?;
        for ((local, population), tags) in self.local.iter_mut().zip(populations).zip(tags) {
            local.population = population;
            local.tags = tags;
        }
        debug!(stock = %self.name, time = time.time, "Migrated");
        Ok(())
    }

    /// Add `ratio` times `population` and `tags` to the stock on `area`,
    /// converting length groups with `ci`. Fish arriving on an area the
    /// stock does not live on are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the fish cannot be placed or a
    /// tag cohort is not registered here.
    pub fn add(
        &mut self,
        area: AreaId,
        population: &AgeBandMatrix,
        tags: &TagRatioMatrix,
        ci: &ConversionIndex,
        ratio: f64,
    ) -> Result<(), StockError> {
        let Ok((_, local)) = locate(&mut self.local, &self.name, area) else {
            debug!(stock = %self.name, %area, "Dropped fish arriving off the stock's areas");
            return Ok(());
        };
        let (min_age, max_age) = (population.min_age(), population.max_age());
        local.population.add(population, ci, ratio, min_age, max_age)?;
        if !tags.is_empty() {
            local.tags.add(tags, ci, ratio, min_age, max_age)?;
        }
        local.tags.update_ratio(&local.population);
        Ok(())
    }

    /// Add recruits on `area`, at the batch's age or the youngest age.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the recruits cannot be placed.
    pub fn add_recruits(&mut self, area: AreaId, batch: &RecruitBatch) -> Result<(), StockError> {
        let Ok((_, local)) = locate(&mut self.local, &self.name, area) else {
            debug!(stock = %self.name, %area, "Dropped recruits off the stock's areas");
            return Ok(());
        };
        let age = batch.age.unwrap_or_else(|| local.population.min_age());
        renewal::add_recruits(&mut local.population, &self.division, &self.identity, age, batch)?;
        local.tags.update_ratio(&local.population);
        Ok(())
    }

    /// Apply a transfer addressed to this stock.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the fish cannot be placed.
    pub fn receive(&mut self, transfer: &StockTransfer) -> Result<(), StockError> {
        match transfer {
            StockTransfer::Fish {
                area,
                population,
                tags,
                ratio,
                ci,
                ..
            } => self.add(*area, population, tags, ci, *ratio),
            StockTransfer::Recruits { area, batch, .. } => self.add_recruits(*area, batch),
        }
    }

    /// Register the tag cohort `name` on every area, not yet observed.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the cohort already exists.
    pub fn register_tags(&mut self, name: &str, tag_loss: f64) -> Result<(), StockError> {
        for local in &mut self.local {
            local.tags.add_cohort(name, tag_loss, -1.0, &local.population)?;
        }
        Ok(())
    }

    /// Release tagged fish of cohort `name` on `area`. `releases` pairs a
    /// length with a count; lengths outside the division are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StockError`] if the area or cohort is unknown.
    pub fn update_tags(
        &mut self,
        name: &str,
        area: AreaId,
        releases: &[(f64, f64)],
    ) -> Result<(), StockError> {
        let mut by_length = vec![0.0; self.lengths.len()];
        for &(length, count) in releases {
            if let Some(slot) = self.division.group_of(length).and_then(|l| by_length.get_mut(l)) {
                *slot += count;
            }
        }
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        local.tags.release(name, &by_length, &local.population)?;
        Ok(())
    }

    /// Remove the tag cohort `name` from every area and every held parcel.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the cohort is not registered.
    pub fn delete_tags(&mut self, name: &str) -> Result<(), StockError> {
        for local in &mut self.local {
            local.tags.delete_cohort(name)?;
            for parcel in [&mut local.matured, &mut local.kept, &mut local.strayed]
                .into_iter()
                .flatten()
            {
                if parcel.tags.cohort_id(name).is_ok() {
                    parcel.tags.delete_cohort(name)?;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Feeding
    // -----------------------------------------------------------------

    /// Sum numbers by length group and open the feeding step.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn calc_numbers(&mut self, area: AreaId) -> Result<(), StockError> {
        let (index, local) = locate(&mut self.local, &self.name, area)?;
        local.numbers = vec![PopulationCell::ZERO; self.lengths.len()];
        local.population.sum_columns(&mut local.numbers);
        if let Some(prey) = self.prey.as_mut() {
            prey.begin_step(index, &local.numbers);
        }
        if let Some(predator) = self.predator.as_mut() {
            predator.begin_step(index);
        }
        Ok(())
    }

    /// Biomass by length group predators can still eat on `area`, or
    /// `None` if the stock is not prey there.
    pub fn available(&self, area: AreaId) -> Option<Vec<f64>> {
        let index = self.local.iter().position(|l| l.id == area)?;
        self.prey.as_ref().map(|p| p.available(index))
    }

    /// Propose consumption for one sub-step. `available[k]` is the
    /// biomass left in the prey of link `k`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn calc_eat(
        &mut self,
        area: AreaId,
        ctx: &FeedingContext,
        available: &[Option<&[f64]>],
    ) -> Result<(), StockError> {
        let (index, local) = locate(&mut self.local, &self.name, area)?;
        if let Some(predator) = self.predator.as_mut() {
            predator.propose(index, ctx, &local.numbers, available);
        }
        Ok(())
    }

    /// Total proposed consumption of link `k` on `area`.
    pub fn proposal(&self, area: AreaId, k: usize) -> Vec<f64> {
        let index = self.local.iter().position(|l| l.id == area);
        match (index, self.predator.as_ref()) {
            (Some(index), Some(p)) => p.proposal(index, k),
            _ => Vec::new(),
        }
    }

    /// Check the consumption proposed by every predator against this
    /// stock's ceiling and return the share of it that can be supplied,
    /// by length group.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn check_eat(
        &mut self,
        area: AreaId,
        proposed: &[f64],
        time: &TimeStep,
    ) -> Result<Vec<f64>, StockError> {
        let (index, _) = locate(&mut self.local, &self.name, area)?;
        Ok(self
            .prey
            .as_mut()
            .map_or_else(Vec::new, |p| p.check(index, proposed, time.num_substeps)))
    }

    /// Scale the proposals of link `k` by the share the prey supplied.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn adjust_eat(&mut self, area: AreaId, k: usize, factors: &[f64]) -> Result<(), StockError> {
        let (index, _) = locate(&mut self.local, &self.name, area)?;
        if let Some(predator) = self.predator.as_mut() {
            predator.settle(index, k, factors);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Mortality and growth
    // -----------------------------------------------------------------

    /// Remove this step's predation, then natural mortality compounded
    /// over the sub-steps, and update tags.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn reduce_pop(&mut self, area: AreaId, time: &TimeStep) -> Result<(), StockError> {
        let per_substep: Vec<f64> = {
            let population = self.population(area)?;
            let fraction = time.step_fraction() / time.substeps_f64();
            (population.min_age()..=population.max_age())
                .map(|age| (-self.mortality_at(age) * fraction).exp())
                .collect()
        };
        let (index, local) = locate(&mut self.local, &self.name, area)?;
        if let Some(prey) = self.prey.as_ref() {
            local.population.scale(&prey.survival(index));
        }
        for _ in 0..time.num_substeps.max(1) {
            local.population.scale_by_age(&per_substep);
        }
        local.population.clamp_negative();
        if !local.tags.is_empty() {
            local.tags.update_numbers(&local.population);
            local.tags.apply_tag_loss(time.step_fraction());
            local.tags.update_ratio(&local.population);
        }
        debug!(
            stock = %self.name,
            %area,
            number = local.population.total_number(),
            "Population reduced"
        );
        Ok(())
    }

    /// Grow fish on `area`. On maturation steps the maturing share is
    /// removed and held until [`Stock::update_population_part2`].
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if the growth kernel does not cover
    /// the populated length groups.
    pub fn grow(
        &mut self,
        area: AreaId,
        time: &TimeStep,
        temperature: f64,
        first_year: i32,
    ) -> Result<(), StockError> {
        let (index, local) = locate(&mut self.local, &self.name, area)?;
        let maturing = self
            .maturation
            .as_ref()
            .filter(|m| m.is_maturation_step(area, time));
        if self.grower.is_none() && maturing.is_none() {
            return Ok(());
        }

        let groups = self.lengths.len();
        let (fphi, max_consumption) = self
            .predator
            .as_ref()
            .and_then(|p| p.area(index))
            .map_or_else(
                || (vec![1.0; groups], vec![0.0; groups]),
                |state| (state.fphi.clone(), state.max_consumption.clone()),
            );
        let (transition, increments) = self.grower.as_ref().map_or_else(
            || (GrowthTransition::identity(groups), GrowthIncrements::zero(groups)),
            |grower| {
                let signals = GrowthSignals {
                    time: *time,
                    area,
                    temperature,
                    first_year,
                    numbers: &local.numbers,
                    fphi: &fphi,
                    max_consumption: &max_consumption,
                };
                let increments = grower.increments(&signals);
                (grower.transition(&increments), increments)
            },
        );
        let weights = self
            .grower
            .as_ref()
            .and_then(Grower::fixed_weights)
            .map_or(WeightChange::Increment(&increments.weight), WeightChange::Absolute);
        let rule = maturing.map(|m| m as &dyn MaturityRule);

        let matured = local.population.grow(&transition, weights, rule)?;
        let matured_tags = local.tags.grow(&transition, rule)?;
        local.tags.update_ratio(&local.population);
        if let (Some(population), Some(tags)) = (matured, matured_tags) {
            debug!(
                stock = %self.name,
                %area,
                matured = population.total_number(),
                "Maturing fish held"
            );
            local.matured = Some(Parcel { population, tags });
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Aging
    // -----------------------------------------------------------------

    /// Capture the oldest age on transition steps, before the age
    /// increment.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_age_part1(&mut self, area: AreaId, time: &TimeStep) -> Result<(), StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        if let Some(transition) = self.transition.as_ref() {
            if transition.is_transition_step(area, time) {
                let parcel = Transition::keep(&mut local.population, &mut local.tags);
                local.tags.update_ratio(&local.population);
                local.kept = Some(parcel);
            }
        }
        Ok(())
    }

    /// Age every fish on the birthday step. Parcels captured earlier in
    /// the step age with them.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::AgeIncrementRepeated`] if the area already
    /// aged in this step.
    pub fn update_age_part2(&mut self, area: AreaId, time: &TimeStep) -> Result<(), StockError> {
        if time.step != self.birthday_step {
            return Ok(());
        }
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        if local.last_aged == Some(time.time) {
            return Err(StockError::AgeIncrementRepeated {
                stock: self.name.clone(),
                area,
                time: time.time,
            });
        }
        local.population.increment_age();
        local.tags.increment_age();
        local.tags.update_ratio(&local.population);
        for parcel in [&mut local.kept, &mut local.matured].into_iter().flatten() {
            parcel.relabel_older();
        }
        local.last_aged = Some(time.time);
        debug!(stock = %self.name, %area, year = time.year, "Aged");
        Ok(())
    }

    /// Send the captured oldest age to the receiving stocks.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_age_part3(
        &mut self,
        area: AreaId,
        time: &TimeStep,
    ) -> Result<Vec<StockTransfer>, StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        let Some(transition) = self.transition.as_ref() else {
            return Ok(Vec::new());
        };
        if !transition.is_transition_step(area, time) {
            return Ok(Vec::new());
        }
        Ok(local
            .kept
            .take()
            .map(|p| p.into_transfers(area, transition.targets()))
            .unwrap_or_default())
    }

    // -----------------------------------------------------------------
    // Population updates
    // -----------------------------------------------------------------

    /// Spawn on spawning steps.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_population_part1(&mut self, area: AreaId, time: &TimeStep) -> Result<(), StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        if let Some(spawner) = self.spawner.as_ref() {
            if spawner.is_spawn_step(area, time) {
                let outcome = spawner.spawn(&mut local.population, &self.lengths);
                local.tags.update_numbers(&local.population);
                local.tags.update_ratio(&local.population);
                debug!(
                    stock = %self.name,
                    %area,
                    ssb = outcome.spawning_biomass,
                    dead = outcome.dead,
                    "Spawned"
                );
                local.spawned = Some(outcome);
            }
        }
        Ok(())
    }

    /// Send the fish held at maturation to the mature stocks.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_population_part2(
        &mut self,
        area: AreaId,
        time: &TimeStep,
    ) -> Result<Vec<StockTransfer>, StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        let Some(maturation) = self.maturation.as_ref() else {
            return Ok(Vec::new());
        };
        if !maturation.is_maturation_step(area, time) {
            return Ok(Vec::new());
        }
        Ok(local
            .matured
            .take()
            .map(|p| p.into_transfers(area, maturation.targets()))
            .unwrap_or_default())
    }

    /// Add scheduled recruits, and return the recruits produced by this
    /// step's spawning.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Matrix`] if recruits cannot be placed.
    pub fn update_population_part3(
        &mut self,
        area: AreaId,
        time: &TimeStep,
    ) -> Result<Vec<StockTransfer>, StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        let mut renewed = false;
        for event in self.renewal.due(area, time) {
            let age = event.batch.age.unwrap_or_else(|| local.population.min_age());
            renewal::add_recruits(
                &mut local.population,
                &self.division,
                &self.identity,
                age,
                &event.batch,
            )?;
            renewed = true;
            debug!(stock = %self.name, %area, number = event.batch.number, "Renewal added");
        }
        if renewed {
            local.tags.update_ratio(&local.population);
        }

        let recruits = local
            .spawned
            .take()
            .zip(self.spawner.as_ref())
            .and_then(|(outcome, spawner)| spawner.recruits(&outcome));
        Ok(recruits
            .map(|(target, batch)| StockTransfer::Recruits {
                target,
                area,
                batch,
            })
            .into_iter()
            .collect())
    }

    /// Remove straying fish on straying steps.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_population_part4(&mut self, area: AreaId, time: &TimeStep) -> Result<(), StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        if let Some(straying) = self.straying.as_ref() {
            if straying.is_stray_step(area, time) {
                let parcel = straying.store(&mut local.population, &mut local.tags, &self.lengths);
                local.strayed = Some(parcel);
            }
        }
        Ok(())
    }

    /// Send straying fish to their receiving stocks.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownArea`] if the stock is not on `area`.
    pub fn update_population_part5(
        &mut self,
        area: AreaId,
        time: &TimeStep,
    ) -> Result<Vec<StockTransfer>, StockError> {
        let (_, local) = locate(&mut self.local, &self.name, area)?;
        let Some(straying) = self.straying.as_ref() else {
            return Ok(Vec::new());
        };
        if !straying.is_stray_step(area, time) {
            return Ok(Vec::new());
        }
        Ok(local
            .strayed
            .take()
            .map(|p| p.into_transfers(area, straying.targets()))
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::transfer::{Proportion, Schedule, TransferTarget};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn time(step: u32, substeps: u32, t: u64) -> TimeStep {
        TimeStep {
            year: 2000,
            step,
            substep: 1,
            num_substeps: substeps,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: t,
        }
    }

    fn stock(id: u32, name: &str) -> Stock {
        let division = Arc::new(LengthGroupDivision::uniform(0.0, 4.0, 1.0).unwrap());
        let mut population = AgeBandMatrix::new(1, &[(0, 4), (0, 4), (0, 4)]).unwrap();
        *population.cell_mut(1, 1).unwrap() = PopulationCell::new(100.0, 1.0);
        *population.cell_mut(3, 2).unwrap() = PopulationCell::new(40.0, 2.0);
        Stock::new(
            StockId::new(id),
            name,
            division,
            vec![(AreaId::new(1), population)],
            4,
        )
        .unwrap()
    }

    #[test]
    fn survival_is_compounded_over_substeps() {
        // exp(-m * 0.25) = 0.9 for a quarter-year step.
        let m = -(0.9_f64.ln()) / 0.25;
        let mut s = stock(0, "cod").with_natural_mortality(vec![m]);
        s.calc_numbers(AreaId::new(1)).unwrap();
        s.reduce_pop(AreaId::new(1), &time(1, 2, 1)).unwrap();
        assert!(close(s.cell(AreaId::new(1), 1, 1).unwrap().n, 90.0));
        assert!(close(s.cell(AreaId::new(1), 3, 2).unwrap().n, 36.0));
    }

    #[test]
    fn full_ratio_cohort_tracks_mortality() {
        let m = -(0.5_f64.ln()) / 0.25;
        let mut s = stock(0, "cod").with_natural_mortality(vec![m]);
        s.register_tags("T1", 0.0).unwrap();
        s.update_tags("T1", AreaId::new(1), &[(1.5, 100.0)]).unwrap();
        s.reduce_pop(AreaId::new(1), &time(1, 1, 1)).unwrap();
        let share = s
            .tags(AreaId::new(1))
            .unwrap()
            .cohort("T1")
            .unwrap()
            .share(1, 1)
            .unwrap();
        assert!(close(share.ratio, 1.0));
        assert!(close(share.tagged, 50.0));
        assert!(close(s.cell(AreaId::new(1), 1, 1).unwrap().n, 50.0));
    }

    #[test]
    fn birthday_ages_once_per_step() {
        let mut s = stock(0, "cod");
        let t = time(4, 1, 4);
        s.update_age_part2(AreaId::new(1), &t).unwrap();
        assert!(close(s.cell(AreaId::new(1), 2, 1).unwrap().n, 100.0));
        assert!(close(s.cell(AreaId::new(1), 3, 2).unwrap().n, 40.0));
        assert!(matches!(
            s.update_age_part2(AreaId::new(1), &t),
            Err(StockError::AgeIncrementRepeated { .. })
        ));
        // Not a birthday step: no effect.
        s.update_age_part2(AreaId::new(1), &time(1, 1, 5)).unwrap();
        assert!(close(s.cell(AreaId::new(1), 2, 1).unwrap().n, 100.0));
    }

    #[test]
    fn transition_lands_one_age_older() {
        let receiver = stock(1, "mature");
        let ci = Arc::new(
            ConversionIndex::new(receiver.division(), receiver.division()).unwrap(),
        );
        let mut s = stock(0, "cod").with_transition(Transition::new(
            4,
            &[],
            vec![TransferTarget {
                stock: StockId::new(1),
                ratio: 1.0,
                ci,
            }],
        ));
        let t = time(4, 1, 4);
        let area = AreaId::new(1);
        s.update_age_part1(area, &t).unwrap();
        s.update_age_part2(area, &t).unwrap();
        let transfers = s.update_age_part3(area, &t).unwrap();
        assert_eq!(transfers.len(), 1);
        let StockTransfer::Fish { population, .. } = &transfers[0] else {
            panic!("expected fish");
        };
        assert!(close(population.cell(4, 2).unwrap().n, 40.0));
        assert!(close(population.total_number(), 40.0));
        assert!(close(s.total_number(), 100.0));
    }

    #[test]
    fn unknown_area_is_an_error() {
        let mut s = stock(0, "cod");
        assert!(matches!(
            s.calc_numbers(AreaId::new(9)),
            Err(StockError::UnknownArea { .. })
        ));
    }

    #[test]
    fn straying_sends_a_share_away() {
        let receiver = stock(1, "other");
        let ci = Arc::new(
            ConversionIndex::new(receiver.division(), receiver.division()).unwrap(),
        );
        let mut s = stock(0, "cod").with_straying(Straying::new(
            Schedule::new(&[2], &[]),
            Proportion::Constant(0.25),
            vec![TransferTarget {
                stock: StockId::new(1),
                ratio: 1.0,
                ci,
            }],
        ));
        let area = AreaId::new(1);
        let t = time(2, 1, 2);
        s.update_population_part4(area, &t).unwrap();
        let transfers = s.update_population_part5(area, &t).unwrap();
        assert_eq!(transfers.len(), 1);
        assert!(close(s.total_number(), 105.0));

        let mut receiver = receiver;
        receiver.receive(&transfers[0]).unwrap();
        assert!(close(receiver.total_number(), 175.0));
    }
}
