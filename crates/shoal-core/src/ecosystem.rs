//! Step cycle: the ordered phases that advance every stock by one step.
//!
//! Each step runs through these phases, every phase completing for all
//! areas and stocks before the next begins:
//!
//! 1. **Tags** -- register tag cohorts and release tagged fish on their
//!    release step; drop expired cohorts.
//!
//! 2. **Migration** -- move fish between the areas of each stock.
//!
//! 3. **Feeding** -- sum numbers by length, then for every sub-step let
//!    predators propose consumption, let every prey check the total
//!    against its ceiling, and settle the accepted share.
//!
//! 4. **Mortality** -- remove eaten fish, then natural mortality.
//!
//! 5. **Growth** -- grow fish, holding maturing fish on maturation steps.
//!
//! 6. **Aging** -- transition keep, age increment, transition move.
//!
//! 7. **Population** -- spawning, maturation move, renewal and
//!    recruitment, straying.
//!
//! Fish sent between stocks are delivered at the end of the phase that
//! produced them. The cycle is deterministic.

use serde::Serialize;
use shoal_types::{AreaId, StockId, TimeStep};
use tracing::{debug, info, warn};

use crate::area::Area;
use crate::predation::FeedingContext;
use crate::stock::{Stock, StockError};
use crate::transfer::StockTransfer;

/// Errors that can occur while running a step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// A stock phase failed.
    #[error("stock {stock}: {source}")]
    Stock {
        /// Name of the failing stock.
        stock: String,
        /// The underlying stock error.
        source: StockError,
    },

    /// A tag event names a stock that does not exist.
    #[error("tag {tag} names unknown stock {stock}")]
    UnknownTagStock {
        /// Tag cohort name.
        tag: String,
        /// Stock index.
        stock: StockId,
    },
}

/// A tagging experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEvent {
    /// Cohort name.
    pub name: String,
    /// Tagged stock.
    pub stock: StockId,
    /// Release year.
    pub year: i32,
    /// Release step.
    pub step: u32,
    /// Release area.
    pub area: AreaId,
    /// Tag loss rate per year.
    pub tag_loss: f64,
    /// Released fish as `(length, count)` pairs.
    pub releases: Vec<(f64, f64)>,
    /// Last year the cohort is followed.
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    Pending,
    Active,
    Expired,
}

#[derive(Debug, Clone)]
struct TrackedTag {
    event: TagEvent,
    state: TagState,
}

/// Totals of one stock after a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSummary {
    /// Stock name.
    pub name: String,
    /// Number of fish.
    pub number: f64,
    /// Biomass.
    pub biomass: f64,
    /// Biomass eaten by the stock.
    pub consumption: f64,
    /// Consumption clawed back from the stock.
    pub overconsumption: f64,
    /// Biomass of the stock eaten by predators.
    pub eaten: f64,
}

/// Summary of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    /// Year of the step.
    pub year: i32,
    /// Step within the year.
    pub step: u32,
    /// Running step counter.
    pub time: u64,
    /// Per-stock totals.
    pub stocks: Vec<StockSummary>,
}

/// Every area and stock of a simulation.
#[derive(Debug, Clone)]
pub struct Ecosystem {
    areas: Vec<Area>,
    stocks: Vec<Stock>,
    tags: Vec<TrackedTag>,
    first_year: i32,
}

impl Ecosystem {
    /// Assemble an ecosystem. Stock `i` must have id `i`.
    pub fn new(areas: Vec<Area>, stocks: Vec<Stock>, tags: Vec<TagEvent>, first_year: i32) -> Self {
        Self {
            areas,
            stocks,
            tags: tags
                .into_iter()
                .map(|event| TrackedTag {
                    event,
                    state: TagState::Pending,
                })
                .collect(),
            first_year,
        }
    }

    /// Areas.
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Stocks, indexed by [`StockId`].
    pub fn stocks(&self) -> &[Stock] {
        &self.stocks
    }

    /// The stock called `name`.
    pub fn stock(&self, name: &str) -> Option<&Stock> {
        self.stocks.iter().find(|s| s.name() == name)
    }

    /// Tagging experiments.
    pub fn tag_events(&self) -> impl Iterator<Item = &TagEvent> + '_ {
        self.tags.iter().map(|t| &t.event)
    }

    /// Returns `true` while tagged fish of cohort `name` are followed.
    pub fn is_tag_active(&self, name: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.event.name == name && t.state == TagState::Active)
    }

    /// Totals of every stock at `time`.
    pub fn summary(&self, time: &TimeStep) -> StepSummary {
        StepSummary {
            year: time.year,
            step: time.step,
            time: time.time,
            stocks: self
                .stocks
                .iter()
                .map(|s| StockSummary {
                    name: s.name().to_owned(),
                    number: s.total_number(),
                    biomass: s.total_biomass(),
                    consumption: s.consumption(),
                    overconsumption: s.overconsumption(),
                    eaten: s.eaten(),
                })
                .collect(),
        }
    }

    /// Run every phase of one step.
    ///
    /// # Errors
    ///
    /// Returns [`StepError`] if a stock phase fails.
    pub fn run_step(&mut self, time: &TimeStep) -> Result<StepSummary, StepError> {
        info!(year = time.year, step = time.step, time = time.time, "Step started");

        // --- Phase 1: Tags ---
        self.update_tags(time)?;

        // --- Phase 2: Migration ---
        for stock in &mut self.stocks {
            stock.migrate(time).map_err(|source| StepError::Stock {
                stock: stock.name().to_owned(),
                source,
            })?;
        }

        // --- Phase 3: Feeding ---
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.calc_numbers(area.id())
        })?;
        for area in &self.areas {
            for substep in 1..=time.num_substeps.max(1) {
                let ctx = FeedingContext {
                    time: time.with_substep(substep),
                    temperature: area.temperature(time),
                    area_size: area.size(),
                };
                feed(&mut self.stocks, area.id(), &ctx)?;
            }
        }
        for stock in &self.stocks {
            let over = stock.overconsumption();
            if over > 0.0 {
                warn!(stock = stock.name(), overconsumption = over, "Predator overconsumed");
            }
        }

        // --- Phase 4: Mortality ---
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.reduce_pop(area.id(), time)
        })?;

        // --- Phase 5: Growth ---
        let first_year = self.first_year;
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.grow(area.id(), time, area.temperature(time), first_year)
        })?;

        // --- Phase 6: Aging ---
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_age_part1(area.id(), time)
        })?;
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_age_part2(area.id(), time)
        })?;
        let moved = gather(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_age_part3(area.id(), time)
        })?;
        self.deliver(moved)?;

        // --- Phase 7: Population ---
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_population_part1(area.id(), time)
        })?;
        let matured = gather(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_population_part2(area.id(), time)
        })?;
        self.deliver(matured)?;
        let recruits = gather(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_population_part3(area.id(), time)
        })?;
        self.deliver(recruits)?;
        each_area(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_population_part4(area.id(), time)
        })?;
        let strayed = gather(&self.areas, &mut self.stocks, |stock, area| {
            stock.update_population_part5(area.id(), time)
        })?;
        self.deliver(strayed)?;

        let summary = self.summary(time);
        debug!(time = time.time, stocks = summary.stocks.len(), "Step completed");
        Ok(summary)
    }

    fn update_tags(&mut self, time: &TimeStep) -> Result<(), StepError> {
        for TrackedTag { event, state } in &mut self.tags {
            match *state {
                TagState::Pending if event.year == time.year && event.step == time.step => {
                    for stock in &mut self.stocks {
                        stock
                            .register_tags(&event.name, event.tag_loss)
                            .map_err(|source| StepError::Stock {
                                stock: stock.name().to_owned(),
                                source,
                            })?;
                    }
                    let stock = self.stocks.get_mut(event.stock.index()).ok_or_else(|| {
                        StepError::UnknownTagStock {
                            tag: event.name.clone(),
                            stock: event.stock,
                        }
                    })?;
                    stock
                        .update_tags(&event.name, event.area, &event.releases)
                        .map_err(|source| StepError::Stock {
                            stock: stock.name().to_owned(),
                            source,
                        })?;
                    *state = TagState::Active;
                    info!(tag = %event.name, stock = stock.name(), "Tagged fish released");
                }
                TagState::Active if event.end_year.is_some_and(|end| time.year > end) => {
                    for stock in &mut self.stocks {
                        stock.delete_tags(&event.name).map_err(|source| StepError::Stock {
                            stock: stock.name().to_owned(),
                            source,
                        })?;
                    }
                    *state = TagState::Expired;
                    info!(tag = %event.name, "Tag cohort expired");
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn deliver(&mut self, transfers: Vec<StockTransfer>) -> Result<(), StepError> {
        for transfer in transfers {
            let target = transfer.target();
            let Some(stock) = self.stocks.get_mut(target.index()) else {
                warn!(%target, "Transfer to unknown stock dropped");
                continue;
            };
            stock.receive(&transfer).map_err(|source| StepError::Stock {
                stock: stock.name().to_owned(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Run `f` for every stock on every area it lives on.
fn each_area<F>(areas: &[Area], stocks: &mut [Stock], mut f: F) -> Result<(), StepError>
where
    F: FnMut(&mut Stock, &Area) -> Result<(), StockError>,
{
    for area in areas {
        for stock in stocks.iter_mut().filter(|s| s.lives_on(area.id())) {
            f(stock, area).map_err(|source| StepError::Stock {
                stock: stock.name().to_owned(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Like [`each_area`], collecting the transfers `f` produces.
fn gather<F>(areas: &[Area], stocks: &mut [Stock], mut f: F) -> Result<Vec<StockTransfer>, StepError>
where
    F: FnMut(&mut Stock, &Area) -> Result<Vec<StockTransfer>, StockError>,
{
    let mut out = Vec::new();
    each_area(areas, stocks, |stock, area| {
        out.extend(f(stock, area)?);
        Ok(())
    })?;
    Ok(out)
}

/// One feeding sub-step on `area`: propose, check, settle.
fn feed(stocks: &mut [Stock], area: AreaId, ctx: &FeedingContext) -> Result<(), StepError> {
    let wrap = |stock: &Stock| {
        let name = stock.name().to_owned();
        move |source| StepError::Stock { stock: name, source }
    };

    // Links of every predator on the area, as (predator, link, prey).
    let links: Vec<(usize, usize, usize)> = stocks
        .iter()
        .enumerate()
        .filter(|(_, s)| s.lives_on(area))
        .filter_map(|(i, s)| s.predator().map(|p| (i, p)))
        .flat_map(|(i, p)| {
            p.links()
                .iter()
                .enumerate()
                .map(move |(k, link)| (i, k, link.prey.index()))
        })
        .collect();
    if links.is_empty() {
        return Ok(());
    }

    // Propose
    let predators: Vec<usize> = {
        let mut ids: Vec<usize> = links.iter().map(|(i, _, _)| *i).collect();
        ids.dedup();
        ids
    };
    for &i in &predators {
        let available: Vec<Option<Vec<f64>>> = links
            .iter()
            .filter(|(p, _, _)| *p == i)
            .map(|(_, _, prey)| stocks.get(*prey).and_then(|s| s.available(area)))
            .collect();
        let refs: Vec<Option<&[f64]>> = available.iter().map(Option::as_deref).collect();
        if let Some(stock) = stocks.get_mut(i) {
            stock.calc_eat(area, ctx, &refs).map_err(wrap(stock))?;
        }
    }

    // Check
    let mut proposed: Vec<Vec<f64>> = vec![Vec::new(); stocks.len()];
    for &(i, k, prey) in &links {
        let Some(p) = stocks.get(i).map(|s| s.proposal(area, k)) else {
            continue;
        };
        if let Some(total) = proposed.get_mut(prey) {
            if total.len() < p.len() {
                total.resize(p.len(), 0.0);
            }
            for (slot, v) in total.iter_mut().zip(&p) {
                *slot += v;
            }
        }
    }
    let mut factors: Vec<Option<Vec<f64>>> = vec![None; stocks.len()];
    for (j, total) in proposed.iter().enumerate() {
        if total.is_empty() {
            continue;
        }
        let Some(stock) = stocks.get_mut(j) else {
            continue;
        };
        if !stock.is_prey() || !stock.lives_on(area) {
            continue;
        }
        let f = stock.check_eat(area, total, &ctx.time).map_err(wrap(stock))?;
        if let Some(slot) = factors.get_mut(j) {
            *slot = Some(f);
        }
    }

    // Settle
    for &(i, k, prey) in &links {
        let Some(f) = factors.get(prey).and_then(Option::as_ref) else {
            continue;
        };
        if let Some(stock) = stocks.get_mut(i) {
            stock.adjust_eat(area, k, f).map_err(wrap(stock))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use shoal_matrix::AgeBandMatrix;
    use shoal_types::{LengthGroupDivision, PopulationCell};

    use super::*;
    use crate::config::AreaConfig;
    use crate::predation::{Appetite, Predator, PreyLink};

    fn time(step: u32, substeps: u32) -> TimeStep {
        TimeStep {
            year: 2000,
            step,
            substep: 1,
            num_substeps: substeps,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: u64::from(step),
        }
    }

    fn area() -> Area {
        Area::from_config(&AreaConfig {
            id: 1,
            size: 1.0,
            temperature: vec![5.0],
        })
    }

    fn population(n: f64, w: f64) -> AgeBandMatrix {
        let mut m = AgeBandMatrix::new(1, &[(0, 2)]).unwrap();
        *m.cell_mut(1, 0).unwrap() = PopulationCell::new(n, w);
        *m.cell_mut(1, 1).unwrap() = PopulationCell::new(n, w);
        m
    }

    fn ecosystem(ratio: f64) -> Ecosystem {
        let division = Arc::new(LengthGroupDivision::uniform(0.0, 2.0, 1.0).unwrap());
        let prey = Stock::new(
            StockId::new(0),
            "capelin",
            Arc::clone(&division),
            vec![(AreaId::new(1), population(100.0, 1.0))],
            4,
        )
        .unwrap()
        .with_prey();
        let predator = Predator::new(
            Appetite::FixedRatio { ratio },
            division.mean_lengths().to_vec(),
            vec![PreyLink {
                prey: StockId::new(0),
                suitability: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            }],
            1,
        );
        let cod = Stock::new(
            StockId::new(1),
            "cod",
            division,
            vec![(AreaId::new(1), population(10.0, 2.0))],
            4,
        )
        .unwrap()
        .with_predator(predator);
        Ecosystem::new(vec![area()], vec![prey, cod], Vec::new(), 2000)
    }

    #[test]
    fn predation_reduces_prey_by_accepted_consumption() {
        // Predator biomass 40, ratio 1: wants 40 of 200 prey biomass.
        let mut eco = ecosystem(1.0);
        let summary = eco.run_step(&time(1, 1)).unwrap();
        let capelin = &summary.stocks[0];
        assert!((capelin.eaten - 40.0).abs() < 1e-9);
        assert!((capelin.biomass - 160.0).abs() < 1e-9);
        let cod = &summary.stocks[1];
        assert!((cod.consumption - 40.0).abs() < 1e-9);
        assert!(cod.overconsumption.abs() < 1e-9);
    }

    #[test]
    fn ceiling_caps_consumption_over_substeps() {
        // Predator wants 100 per sub-step, 200 over the step; the ceiling
        // lets 0.95^2 of the prey go.
        let mut eco = ecosystem(5.0);
        let summary = eco.run_step(&time(1, 2)).unwrap();
        let capelin = &summary.stocks[0];
        let ceiling = 0.95_f64.powi(2) * 200.0;
        assert!((capelin.eaten - ceiling).abs() < 1e-9);
        let cod = &summary.stocks[1];
        assert!((cod.consumption + cod.overconsumption - 200.0).abs() < 1e-9);
        assert!(capelin.number >= 0.0);
    }

    #[test]
    fn tags_register_everywhere_and_expire() {
        let eco = ecosystem(0.0);
        let mut eco = Ecosystem::new(
            eco.areas.clone(),
            eco.stocks.clone(),
            vec![TagEvent {
                name: "T1".to_owned(),
                stock: StockId::new(0),
                year: 2000,
                step: 1,
                area: AreaId::new(1),
                tag_loss: 0.0,
                releases: vec![(0.5, 10.0)],
                end_year: Some(2000),
            }],
            2000,
        );
        eco.run_step(&time(1, 1)).unwrap();
        assert!(eco.is_tag_active("T1"));
        for stock in eco.stocks() {
            assert_eq!(stock.tags(AreaId::new(1)).unwrap().len(), 1);
        }
        let mut next = time(1, 1);
        next.year = 2001;
        next.time = 5;
        eco.run_step(&next).unwrap();
        assert!(!eco.is_tag_active("T1"));
        assert!(eco.stocks()[0].tags(AreaId::new(1)).unwrap().is_empty());
    }
}
