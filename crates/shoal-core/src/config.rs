//! Configuration loading and typed config structures for the Shoal simulator.
//!
//! The canonical configuration lives in `shoal-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure and a loader that reads the file. Semantic checks (unknown
//! stock names, inconsistent length ranges) happen later, when the
//! ecosystem is built from the parsed configuration.
//!
//! Lengths are in centimetres, weights in kilograms, time in months.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Time loop settings.
    #[serde(default)]
    pub time: TimeConfig,

    /// Model areas.
    #[serde(default = "default_areas")]
    pub areas: Vec<AreaConfig>,

    /// Stocks, in the order they are processed each phase.
    #[serde(default)]
    pub stocks: Vec<StockConfig>,

    /// Tagging experiments.
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }
}

// ---------------------------------------------------------------------------
// Time and areas
// ---------------------------------------------------------------------------

/// Time loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeConfig {
    /// First simulated year.
    #[serde(default = "default_first_year")]
    pub first_year: i32,

    /// Last simulated year, inclusive.
    #[serde(default = "default_last_year")]
    pub last_year: i32,

    /// Length of each step of the year, in months.
    #[serde(default = "default_step_lengths")]
    pub step_lengths: Vec<f64>,

    /// Number of predation sub-steps in each step. Empty means one
    /// sub-step everywhere.
    #[serde(default)]
    pub substeps: Vec<u32>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            first_year: default_first_year(),
            last_year: default_last_year(),
            step_lengths: default_step_lengths(),
            substeps: Vec::new(),
        }
    }
}

/// One model area.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AreaConfig {
    /// Area identifier.
    pub id: u32,

    /// Area size, used by the half-feeding value of predators.
    #[serde(default = "default_area_size")]
    pub size: f64,

    /// Temperature for each step of the year. Shorter lists are cycled;
    /// an empty list means zero degrees.
    #[serde(default)]
    pub temperature: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Stocks
// ---------------------------------------------------------------------------

/// Length-group division of a stock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LengthConfig {
    /// Equal-width groups.
    Uniform {
        /// Lower bound of the first group.
        min: f64,
        /// Upper bound of the last group.
        max: f64,
        /// Group width.
        dl: f64,
    },
    /// Explicit group boundaries.
    Breaks {
        /// Strictly increasing boundaries.
        breaks: Vec<f64>,
    },
}

/// Length range occupied by one age.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgeLengthConfig {
    /// Age the range applies to.
    pub age: u32,
    /// Smallest length the age can occupy.
    pub min: f64,
    /// Largest length the age can occupy.
    pub max: f64,
}

/// Weight-at-length relationship `W = a * L^b`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConditionConfig {
    /// Multiplier.
    #[serde(default = "default_condition_a")]
    pub a: f64,
    /// Exponent.
    #[serde(default = "default_condition_b")]
    pub b: f64,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            a: default_condition_a(),
            b: default_condition_b(),
        }
    }
}

/// One stock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockConfig {
    /// Unique stock name.
    pub name: String,

    /// Areas the stock lives on.
    pub areas: Vec<u32>,

    /// Length-group division.
    pub length: LengthConfig,

    /// Youngest age.
    pub min_age: u32,

    /// Oldest age, which is a plus group.
    pub max_age: u32,

    /// Length range per age; ages not listed span the whole division.
    #[serde(default)]
    pub age_lengths: Vec<AgeLengthConfig>,

    /// Step of the year on which fish age. Defaults to the last step.
    #[serde(default)]
    pub birthday_step: Option<u32>,

    /// Initial population.
    #[serde(default)]
    pub initial: Vec<InitialConfig>,

    /// Yearly instantaneous natural mortality per age. A single value
    /// applies to every age.
    #[serde(default)]
    pub natural_mortality: Vec<f64>,

    /// Growth, if the stock grows.
    #[serde(default)]
    pub growth: Option<GrowthConfig>,

    /// Whether other stocks can eat this stock.
    #[serde(default)]
    pub eaten: bool,

    /// Predation, if the stock eats.
    #[serde(default)]
    pub predator: Option<PredatorConfig>,

    /// Maturation into other stocks.
    #[serde(default)]
    pub maturation: Option<MaturationConfig>,

    /// Movement of the oldest age into other stocks.
    #[serde(default)]
    pub transition: Option<TransitionConfig>,

    /// Spawning and recruitment.
    #[serde(default)]
    pub spawning: Option<SpawningConfig>,

    /// Scheduled recruitment events.
    #[serde(default)]
    pub renewal: Vec<RenewalConfig>,

    /// Straying into other stocks.
    #[serde(default)]
    pub straying: Option<StrayingConfig>,

    /// Movement between areas.
    #[serde(default)]
    pub migration: Option<MigrationConfig>,
}

/// Initial population of one age in one area, normally distributed over
/// length.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitialConfig {
    /// Area identifier.
    pub area: u32,
    /// Age of the fish.
    pub age: u32,
    /// Number of fish.
    pub number: f64,
    /// Mean length.
    pub mean_length: f64,
    /// Standard deviation of length; zero puts every fish in one group.
    #[serde(default)]
    pub sd_length: f64,
    /// Weight-at-length relationship.
    #[serde(default)]
    pub condition: ConditionConfig,
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

/// Growth of a stock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthConfig {
    /// Growth law.
    pub law: GrowthLawConfig,

    /// Kernel spreading fish over length groups.
    #[serde(default)]
    pub kernel: KernelConfig,

    /// Fixed weight-at-length; when present, weights follow this curve
    /// instead of the law's weight increments.
    #[serde(default)]
    pub fixed_weights: Option<ConditionConfig>,
}

/// Per-area table indexed by step of the year, then length group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthTableConfig {
    /// Area identifier.
    pub area: u32,
    /// Length increments by step and length group.
    #[serde(default)]
    pub length: Vec<Vec<f64>>,
    /// Weight increments by step and length group.
    #[serde(default)]
    pub weight: Vec<Vec<f64>>,
}

/// Multiplier for one area.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AreaEffectConfig {
    /// Area identifier.
    pub area: u32,
    /// Multiplier.
    pub value: f64,
}

/// Growth law and its parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrowthLawConfig {
    /// Temperature and feeding-level dependent law.
    Multispecies {
        /// Nine parameters.
        params: [f64; 9],
    },
    /// Increments read from tables.
    Tabulated {
        /// One table per area.
        tables: Vec<GrowthTableConfig>,
    },
    /// Weight-based von Bertalanffy law with reference weights.
    WeightVonBertalanffy {
        /// Six weight parameters.
        weight_params: [f64; 6],
        /// Nine length parameters.
        length_params: [f64; 9],
        /// `(length, weight)` pairs, strictly increasing in length.
        reference_weights: Vec<[f64; 2]>,
    },
    /// Consumption-based law of Jones.
    Jones {
        /// Six weight parameters.
        weight_params: [f64; 6],
        /// Eight length parameters.
        length_params: [f64; 8],
        /// `(length, weight)` pairs, strictly increasing in length.
        reference_weights: Vec<[f64; 2]>,
    },
    /// Weight-based von Bertalanffy law with year, step and area effects.
    WeightVonBertalanffyEffects {
        /// Six weight parameters.
        weight_params: [f64; 6],
        /// Nine length parameters.
        length_params: [f64; 9],
        /// `(length, weight)` pairs, strictly increasing in length.
        reference_weights: Vec<[f64; 2]>,
        /// Multiplier per simulated year.
        year_effect: Vec<f64>,
        /// Multiplier per step of the year.
        step_effect: Vec<f64>,
        /// Multiplier per area.
        area_effect: Vec<AreaEffectConfig>,
    },
    /// Length von Bertalanffy law with yearly k and tabulated weights.
    LengthVonBertalanffyYearly {
        /// Asymptotic length.
        linf: f64,
        /// Growth rate per simulated year.
        k_values: Vec<f64>,
        /// Weight increment tables.
        tables: Vec<GrowthTableConfig>,
    },
    /// Power-of-length law with yearly k and tabulated weights.
    PowerLength {
        /// Length exponent; zero gives linear growth.
        exponent: f64,
        /// Growth rate per simulated year.
        k_values: Vec<f64>,
        /// Weight increment tables.
        tables: Vec<GrowthTableConfig>,
    },
    /// Two-parameter length von Bertalanffy law with power weights.
    LengthVonBertalanffy {
        /// Asymptotic length.
        linf: f64,
        /// Yearly growth rate.
        k: f64,
        /// Weight-at-length multiplier.
        a: f64,
        /// Weight-at-length exponent.
        b: f64,
    },
}

/// Growth kernel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelConfig {
    /// Split between the two neighbouring whole jumps.
    Deterministic {
        /// Largest jump in length groups.
        #[serde(default = "default_max_jump")]
        max_jump: usize,
    },
    /// Beta-binomial jump distribution.
    BetaBinomial {
        /// Dispersion parameter.
        beta: f64,
        /// Largest jump in length groups.
        #[serde(default = "default_max_jump")]
        max_jump: usize,
    },
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::Deterministic {
            max_jump: default_max_jump(),
        }
    }
}

// ---------------------------------------------------------------------------
// Predation
// ---------------------------------------------------------------------------

/// Predation by a stock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredatorConfig {
    /// How much the predator wants to eat.
    pub appetite: AppetiteConfig,
    /// Prey stocks and their suitabilities.
    pub preys: Vec<PreyLinkConfig>,
}

/// Appetite of a predator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppetiteConfig {
    /// Eat a fixed share of own biomass per step.
    FixedRatio {
        /// Share of own biomass.
        ratio: f64,
    },
    /// Eat up to a length and temperature dependent maximum, limited by
    /// food availability.
    MaxConsumption {
        /// `m0 * exp(T * (m1 + m2 * T)) * L^m3`, per fish per year.
        coefficients: [f64; 4],
        /// Food density giving half the maximum consumption.
        half_feeding: f64,
    },
}

/// One prey of a predator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreyLinkConfig {
    /// Prey stock name.
    pub name: String,
    /// Suitability of prey lengths for predator lengths.
    pub suitability: SuitabilityConfig,
}

/// Suitability function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuitabilityConfig {
    /// Same value for every length pair.
    Constant {
        /// Suitability.
        value: f64,
    },
    /// `delta / (1 + exp(-alpha - beta * l - gamma * L))`.
    Exponential {
        /// Intercept.
        alpha: f64,
        /// Prey length slope.
        beta: f64,
        /// Predator length slope.
        gamma: f64,
        /// Maximum suitability.
        delta: f64,
    },
    /// Andersen's log-ratio function.
    Andersen {
        /// Baseline.
        p0: f64,
        /// Preferred log length ratio.
        p1: f64,
        /// Height.
        p2: f64,
        /// Width above the preferred ratio.
        p3: f64,
        /// Width below the preferred ratio.
        p4: f64,
    },
}

// ---------------------------------------------------------------------------
// Movement between stocks
// ---------------------------------------------------------------------------

/// Receiving stock and the share it gets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetConfig {
    /// Stock name.
    pub name: String,
    /// Share of the moving fish.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
}

/// Maturation into mature stocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MaturationConfig {
    /// Maturation rule.
    pub rule: MaturityRuleConfig,
    /// Steps of the year on which fish mature.
    pub steps: Vec<u32>,
    /// Areas on which fish mature; empty means all.
    #[serde(default)]
    pub areas: Vec<u32>,
    /// Youngest age that can mature.
    #[serde(default)]
    pub min_age: u32,
    /// Mature stocks.
    pub targets: Vec<TargetConfig>,
}

/// Maturation rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaturityRuleConfig {
    /// `1 / (1 + exp(-alpha (L - l50) - beta (a - a50)))`.
    Logistic {
        /// Length slope.
        alpha: f64,
        /// Length at 50% maturity.
        l50: f64,
        /// Age slope.
        #[serde(default)]
        beta: f64,
        /// Age at 50% maturity.
        #[serde(default)]
        a50: f64,
    },
    /// Every fish at or above `length` matures.
    LengthThreshold {
        /// Threshold length.
        length: f64,
    },
}

/// Movement of the oldest age into older stocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransitionConfig {
    /// Step of the year on which fish move.
    pub step: u32,
    /// Areas on which fish move; empty means all.
    #[serde(default)]
    pub areas: Vec<u32>,
    /// Receiving stocks.
    pub targets: Vec<TargetConfig>,
}

/// Share of fish by length.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProportionConfig {
    /// Same share at every length.
    Constant {
        /// Share.
        value: f64,
    },
    /// `1 / (1 + exp(-alpha (L - l50)))`.
    Logistic {
        /// Slope.
        alpha: f64,
        /// Length at 50%.
        l50: f64,
    },
}

/// Spawning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpawningConfig {
    /// Steps of the year on which the stock spawns.
    pub steps: Vec<u32>,
    /// Areas on which the stock spawns; empty means all.
    #[serde(default)]
    pub areas: Vec<u32>,
    /// Share of fish spawning, by length.
    pub proportion: ProportionConfig,
    /// Share of spawners that die.
    #[serde(default)]
    pub mortality: f64,
    /// Share of weight spawners lose.
    #[serde(default)]
    pub weight_loss: f64,
    /// Recruitment produced by the spawners.
    #[serde(default)]
    pub recruitment: Option<RecruitmentConfig>,
}

/// Recruitment from spawning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecruitmentConfig {
    /// Stock receiving the recruits.
    pub recipient: String,
    /// Stock-recruitment function.
    pub function: RecruitmentFunctionConfig,
    /// Mean length of recruits.
    pub mean_length: f64,
    /// Standard deviation of recruit length.
    #[serde(default)]
    pub sd_length: f64,
    /// Weight-at-length of recruits.
    #[serde(default)]
    pub condition: ConditionConfig,
}

/// Stock-recruitment function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecruitmentFunctionConfig {
    /// `p0 * sum(L^p1 * a^p2 * N * W^p3)` over spawners.
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
    /// `mu * S * exp(-lambda * S)` of spawning biomass `S`.
    Ricker {
        /// Productivity.
        mu: f64,
        /// Density dependence.
        lambda: f64,
    },
    /// `mu * S / (lambda + S)` of spawning biomass `S`.
    BevertonHolt {
        /// Maximum recruitment.
        mu: f64,
        /// Biomass giving half the maximum.
        lambda: f64,
    },
}

/// Scheduled recruitment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenewalConfig {
    /// Year of the event.
    pub year: i32,
    /// Step of the year.
    pub step: u32,
    /// Area identifier.
    pub area: u32,
    /// Age of the recruits.
    pub age: u32,
    /// Number of recruits.
    pub number: f64,
    /// Mean length.
    pub mean_length: f64,
    /// Standard deviation of length.
    #[serde(default)]
    pub sd_length: f64,
    /// Weight-at-length.
    #[serde(default)]
    pub condition: ConditionConfig,
}

/// Straying into other stocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrayingConfig {
    /// Steps of the year on which fish stray.
    pub steps: Vec<u32>,
    /// Areas on which fish stray; empty means all.
    #[serde(default)]
    pub areas: Vec<u32>,
    /// Share of fish straying, by length.
    pub proportion: ProportionConfig,
    /// Receiving stocks.
    pub targets: Vec<TargetConfig>,
}

/// Movement between areas.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MigrationConfig {
    /// Proportion matrices by step of the year.
    pub matrices: Vec<MigrationMatrixConfig>,
}

/// Proportion matrix for one step of the year.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MigrationMatrixConfig {
    /// Step of the year.
    pub step: u32,
    /// `proportions[from][to]`, indexed by the stock's area order.
    pub proportions: Vec<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Tagging experiment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagConfig {
    /// Unique cohort name.
    pub name: String,
    /// Stock the tagged fish are released into.
    pub stock: String,
    /// Year of release.
    pub year: i32,
    /// Step of release.
    pub step: u32,
    /// Area of release.
    pub area: u32,
    /// Yearly instantaneous tag-loss rate.
    #[serde(default)]
    pub tag_loss: f64,
    /// Released fish by length.
    pub numbers: Vec<TagReleaseConfig>,
    /// Last year the cohort is tracked; it is removed afterwards.
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// Tagged fish released at one length.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagReleaseConfig {
    /// Length of the released fish.
    pub length: f64,
    /// Number released.
    pub count: f64,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_first_year() -> i32 {
    1990
}

const fn default_last_year() -> i32 {
    1990
}

fn default_step_lengths() -> Vec<f64> {
    vec![3.0, 3.0, 3.0, 3.0]
}

fn default_areas() -> Vec<AreaConfig> {
    vec![AreaConfig {
        id: 1,
        size: default_area_size(),
        temperature: Vec::new(),
    }]
}

const fn default_area_size() -> f64 {
    1.0
}

const fn default_condition_a() -> f64 {
    0.01
}

const fn default_condition_b() -> f64 {
    3.0
}

const fn default_max_jump() -> usize {
    10
}

const fn default_ratio() -> f64 {
    1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty_single_year() {
        let config = SimulationConfig::default();
        assert_eq!(config.time.first_year, 1990);
        assert_eq!(config.time.step_lengths.len(), 4);
        assert!(config.stocks.is_empty());
    }

    #[test]
    fn parse_minimal_yaml_fills_defaults() {
        let config = SimulationConfig::parse("time:\n  last_year: 1992\n").unwrap();
        assert_eq!(config.time.last_year, 1992);
        assert_eq!(config.areas.len(), 1);
        assert_eq!(config.areas[0].id, 1);
    }

    #[test]
    fn parse_stock_with_growth_and_predation() {
        let yaml = r"
stocks:
  - name: cod
    areas: [1]
    length: { min: 10.0, max: 50.0, dl: 5.0 }
    min_age: 1
    max_age: 5
    natural_mortality: [0.2]
    growth:
      law: { type: length_von_bertalanffy, linf: 80.0, k: 0.2, a: 0.01, b: 3.0 }
      kernel: { type: beta_binomial, beta: 20.0 }
    predator:
      appetite: { type: fixed_ratio, ratio: 0.05 }
      preys:
        - name: capelin
          suitability: { type: constant, value: 1.0 }
  - name: capelin
    areas: [1]
    length: { breaks: [2.0, 4.0, 8.0, 16.0] }
    min_age: 1
    max_age: 3
    eaten: true
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.stocks.len(), 2);
        let cod = &config.stocks[0];
        assert!(matches!(
            cod.growth.as_ref().unwrap().kernel,
            KernelConfig::BetaBinomial { max_jump: 10, .. }
        ));
        assert!(matches!(
            config.stocks[1].length,
            LengthConfig::Breaks { .. }
        ));
        assert!(config.stocks[1].eaten);
    }

    #[test]
    fn unknown_growth_law_is_rejected() {
        let yaml = r"
stocks:
  - name: cod
    areas: [1]
    length: { min: 10.0, max: 50.0, dl: 5.0 }
    min_age: 1
    max_age: 5
    growth:
      law: { type: made_up }
";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = SimulationConfig::from_file(Path::new("/nonexistent/shoal.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
