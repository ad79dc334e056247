//! Building an [`Ecosystem`] from a parsed configuration.
//!
//! Stocks refer to each other by name in the configuration. Setup resolves
//! the names to [`StockId`]s, builds every length-group division once and
//! shares it, and computes the conversion index of every link between two
//! stocks up front.

use std::collections::BTreeMap;
use std::sync::Arc;

use shoal_matrix::{AgeBandMatrix, MatrixError};
use shoal_types::{AreaId, ConversionIndex, LengthGroupDivision, StockId, TypesError};
use tracing::{info, warn};

use crate::area::Area;
use crate::clock::{ClockError, SimulationClock};
use crate::config::{
    LengthConfig, SimulationConfig, StockConfig, TargetConfig,
};
use crate::ecosystem::{Ecosystem, TagEvent};
use crate::growth::{GrowthError, Grower};
use crate::maturity::{Maturation, MaturityLaw};
use crate::migration::{Migration, MigrationError};
use crate::predation::{Appetite, Predator, PreyLink, Suitability};
use crate::renewal::{self, Renewal};
use crate::spawning::{Recruitment, RecruitmentFunction, Spawner};
use crate::stock::{Stock, StockError};
use crate::straying::Straying;
use crate::transfer::{Proportion, RecruitBatch, Schedule, TransferTarget};
use crate::transition::Transition;

/// Errors raised while building an ecosystem from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The time configuration is invalid.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A length-group division or conversion could not be built.
    #[error("length groups: {source}")]
    Types {
        /// The underlying error.
        #[from]
        source: TypesError,
    },

    /// A population could not be built.
    #[error("population: {source}")]
    Matrix {
        /// The underlying error.
        #[from]
        source: MatrixError,
    },

    /// A growth law could not be built.
    #[error("growth: {source}")]
    Growth {
        /// The underlying error.
        #[from]
        source: GrowthError,
    },

    /// A migration matrix is misshapen.
    #[error("migration: {source}")]
    Migration {
        /// The underlying error.
        #[from]
        source: MigrationError,
    },

    /// A stock could not be built.
    #[error("stock: {source}")]
    Stock {
        /// The underlying error.
        #[from]
        source: StockError,
    },

    /// A stock name is used twice.
    #[error("stock {name} is defined twice")]
    DuplicateStock {
        /// The repeated name.
        name: String,
    },

    /// A stock name is not defined.
    #[error("unknown stock {name}")]
    UnknownStock {
        /// The missing name.
        name: String,
    },

    /// An area is not defined.
    #[error("{owner} refers to unknown area {area}")]
    UnknownArea {
        /// Stock or tag referring to the area.
        owner: String,
        /// The missing area.
        area: u32,
    },

    /// Ages or per-age lengths are inconsistent.
    #[error("stock {stock}: {reason}")]
    InvalidAges {
        /// Stock name.
        stock: String,
        /// What is wrong.
        reason: String,
    },
}

/// Build the length-group division described by `config`.
///
/// # Errors
///
/// Returns [`TypesError::InvalidDivision`] if the bounds are invalid.
pub fn division_from_config(config: &LengthConfig) -> Result<LengthGroupDivision, TypesError> {
    match config {
        LengthConfig::Uniform { min, max, dl } => LengthGroupDivision::uniform(*min, *max, *dl),
        LengthConfig::Breaks { breaks } => LengthGroupDivision::from_breaks(breaks.clone()),
    }
}

/// Shared lookups used while building stocks.
struct Registry {
    names: BTreeMap<String, StockId>,
    divisions: Vec<Arc<LengthGroupDivision>>,
    areas: Vec<AreaId>,
}

impl Registry {
    fn id(&self, name: &str) -> Result<StockId, SetupError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SetupError::UnknownStock {
                name: name.to_owned(),
            })
    }

    fn division(&self, id: StockId) -> Result<&Arc<LengthGroupDivision>, SetupError> {
        self.divisions
            .get(id.index())
            .ok_or_else(|| SetupError::UnknownStock {
                name: id.to_string(),
            })
    }

    fn area(&self, owner: &str, area: u32) -> Result<AreaId, SetupError> {
        let id = AreaId::new(area);
        if self.areas.contains(&id) {
            Ok(id)
        } else {
            Err(SetupError::UnknownArea {
                owner: owner.to_owned(),
                area,
            })
        }
    }

    fn targets(
        &self,
        from: &LengthGroupDivision,
        configs: &[TargetConfig],
    ) -> Result<Vec<TransferTarget>, SetupError> {
        configs
            .iter()
            .map(|t| {
                let stock = self.id(&t.name)?;
                let ci = ConversionIndex::new(from, self.division(stock)?)?;
                Ok(TransferTarget {
                    stock,
                    ratio: t.ratio,
                    ci: Arc::new(ci),
                })
            })
            .collect()
    }
}

impl Ecosystem {
    /// Build every area and stock described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if names, areas, divisions, growth laws or
    /// migration matrices are inconsistent.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SetupError> {
        let clock = SimulationClock::new(&config.time)?;
        let years = usize::try_from(
            config
                .time
                .last_year
                .saturating_sub(config.time.first_year)
                .saturating_add(1),
        )
        .unwrap_or(0);
        let steps_per_year = usize::try_from(clock.steps_per_year()).unwrap_or(0);

        let areas: Vec<Area> = config.areas.iter().map(Area::from_config).collect();
        let mut names = BTreeMap::new();
        let mut divisions = Vec::with_capacity(config.stocks.len());
        for (i, stock) in config.stocks.iter().enumerate() {
            let id = StockId::new(u32::try_from(i).unwrap_or(u32::MAX));
            if names.insert(stock.name.clone(), id).is_some() {
                return Err(SetupError::DuplicateStock {
                    name: stock.name.clone(),
                });
            }
            divisions.push(Arc::new(division_from_config(&stock.length)?));
        }
        let registry = Registry {
            names,
            divisions,
            areas: areas.iter().map(Area::id).collect(),
        };

        let mut eaten = vec![false; config.stocks.len()];
        for stock in &config.stocks {
            for link in stock.predator.iter().flat_map(|p| &p.preys) {
                if let Some(slot) = eaten.get_mut(registry.id(&link.name)?.index()) {
                    *slot = true;
                }
            }
        }

        let mut stocks = Vec::with_capacity(config.stocks.len());
        for (i, stock_config) in config.stocks.iter().enumerate() {
            let id = StockId::new(u32::try_from(i).unwrap_or(u32::MAX));
            let is_prey = stock_config.eaten || eaten.get(i).copied().unwrap_or(false);
            let stock = build_stock(
                &registry,
                id,
                stock_config,
                is_prey,
                years,
                steps_per_year,
                clock.steps_per_year(),
            )?;
            info!(
                stock = stock.name(),
                areas = stock_config.areas.len(),
                number = stock.total_number(),
                biomass = stock.total_biomass(),
                "Stock built"
            );
            stocks.push(stock);
        }

        let tags = config
            .tags
            .iter()
            .map(|t| {
                Ok(TagEvent {
                    name: t.name.clone(),
                    stock: registry.id(&t.stock)?,
                    year: t.year,
                    step: t.step,
                    area: registry.area(&t.name, t.area)?,
                    tag_loss: t.tag_loss,
                    releases: t.numbers.iter().map(|r| (r.length, r.count)).collect(),
                    end_year: t.end_year,
                })
            })
            .collect::<Result<Vec<_>, SetupError>>()?;

        Ok(Self::new(areas, stocks, tags, config.time.first_year))
    }
}

fn age_bounds(
    config: &StockConfig,
    division: &LengthGroupDivision,
) -> Result<Vec<(usize, usize)>, SetupError> {
    if config.min_age > config.max_age {
        return Err(SetupError::InvalidAges {
            stock: config.name.clone(),
            reason: format!("min age {} above max age {}", config.min_age, config.max_age),
        });
    }
    let groups = division.len();
    (config.min_age..=config.max_age)
        .map(|age| {
            let Some(range) = config.age_lengths.iter().find(|a| a.age == age) else {
                return Ok((0, groups));
            };
            let lo = (0..groups)
                .find(|&l| division.max_length(l).is_some_and(|hi| hi > range.min))
                .unwrap_or(0);
            let hi = (0..groups)
                .rfind(|&l| division.min_length(l).is_some_and(|lo| lo < range.max))
                .map_or(groups, |l| l.saturating_add(1));
            if hi <= lo {
                return Err(SetupError::InvalidAges {
                    stock: config.name.clone(),
                    reason: format!("age {age} has no length group in [{}, {}]", range.min, range.max),
                });
            }
            Ok((lo, hi))
        })
        .collect()
}

fn build_stock(
    registry: &Registry,
    id: StockId,
    config: &StockConfig,
    is_prey: bool,
    years: usize,
    steps_per_year: usize,
    last_step: u32,
) -> Result<Stock, SetupError> {
    let division = Arc::clone(registry.division(id)?);
    let identity = ConversionIndex::new(&division, &division)?;
    let bounds = age_bounds(config, &division)?;
    let lengths = division.mean_lengths().to_vec();

    let mut area_ids = Vec::with_capacity(config.areas.len());
    let mut populations = Vec::with_capacity(config.areas.len());
    for &raw in &config.areas {
        let area = registry.area(&config.name, raw)?;
        let mut population = AgeBandMatrix::new(config.min_age, &bounds)?;
        for initial in config.initial.iter().filter(|i| i.area == raw) {
            if initial.age < config.min_age || initial.age > config.max_age {
                warn!(
                    stock = %config.name,
                    age = initial.age,
                    "Initial fish outside the stock's ages ignored"
                );
                continue;
            }
            let batch = RecruitBatch {
                age: Some(initial.age),
                number: initial.number,
                mean_length: initial.mean_length,
                sd_length: initial.sd_length,
                condition: initial.condition,
            };
            renewal::add_recruits(&mut population, &division, &identity, initial.age, &batch)?;
        }
        area_ids.push(area);
        populations.push((area, population));
    }

    let birthday = config.birthday_step.unwrap_or(last_step);
    if birthday == 0 || birthday > last_step {
        return Err(SetupError::InvalidAges {
            stock: config.name.clone(),
            reason: format!("birthday step {birthday} is not a step of the year"),
        });
    }

    let mut stock = Stock::new(id, config.name.clone(), Arc::clone(&division), populations, birthday)?
        .with_natural_mortality(config.natural_mortality.clone())
        .with_renewal(Renewal::from_config(&config.renewal));

    if let Some(growth) = &config.growth {
        stock = stock.with_growth(Grower::from_config(
            growth,
            Arc::clone(&division),
            &area_ids,
            years,
            steps_per_year,
        )?);
    }

    if let Some(predator) = &config.predator {
        let links = predator
            .preys
            .iter()
            .map(|link| {
                let prey = registry.id(&link.name)?;
                let prey_lengths = registry.division(prey)?.mean_lengths();
                Ok(PreyLink {
                    prey,
                    suitability: Suitability::from(&link.suitability).table(&lengths, prey_lengths),
                })
            })
            .collect::<Result<Vec<_>, SetupError>>()?;
        stock = stock.with_predator(Predator::new(
            Appetite::from(&predator.appetite),
            lengths.clone(),
            links,
            area_ids.len(),
        ));
    }

    if is_prey {
        stock = stock.with_prey();
    }

    if let Some(m) = &config.maturation {
        stock = stock.with_maturation(Maturation::new(
            MaturityLaw::from(&m.rule),
            lengths.clone(),
            m.min_age,
            Schedule::new(&m.steps, &m.areas),
            registry.targets(&division, &m.targets)?,
        ));
    }

    if let Some(t) = &config.transition {
        stock = stock.with_transition(Transition::new(
            t.step,
            &t.areas,
            registry.targets(&division, &t.targets)?,
        ));
    }

    if let Some(s) = &config.spawning {
        let recruitment = s
            .recruitment
            .as_ref()
            .map(|r| {
                Ok::<_, SetupError>(Recruitment {
                    recipient: registry.id(&r.recipient)?,
                    function: RecruitmentFunction::from(&r.function),
                    mean_length: r.mean_length,
                    sd_length: r.sd_length,
                    condition: r.condition,
                })
            })
            .transpose()?;
        stock = stock.with_spawning(Spawner::new(
            Schedule::new(&s.steps, &s.areas),
            Proportion::from(&s.proportion),
            s.mortality,
            s.weight_loss,
            recruitment,
        ));
    }

    if let Some(s) = &config.straying {
        stock = stock.with_straying(Straying::new(
            Schedule::new(&s.steps, &s.areas),
            Proportion::from(&s.proportion),
            registry.targets(&division, &s.targets)?,
        ));
    }

    if let Some(m) = &config.migration {
        stock = stock.with_migration(Migration::from_config(m, area_ids.len())?);
    }

    Ok(stock)
}
