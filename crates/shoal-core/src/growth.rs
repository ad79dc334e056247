//! Growth laws and the growth-kernel builder.
//!
//! A [`GrowthLaw`] turns the signals of one step (temperature, mean weight
//! by length, feeding level, maximum consumption) into per-length-group
//! length and weight increments. A [`Grower`] pairs a law with a kernel
//! and turns the increments into a [`GrowthTransition`] the population
//! matrices can apply.
//!
//! Every law is a pure function of its parameters and the signals it is
//! given. Biological sanity problems (zero or negative parameters,
//! lengths above the asymptotic length, negative tabulated growth) are
//! logged as warnings and never stop the run.

use std::sync::Arc;

use shoal_matrix::GrowthTransition;
use shoal_types::{AreaId, LengthGroupDivision, PopulationCell, TimeStep, is_negligible};
use tracing::warn;

use crate::config::{
    ConditionConfig, GrowthConfig, GrowthLawConfig, GrowthTableConfig, KernelConfig,
};

/// Errors raised while building growth laws from configuration.
#[derive(Debug, thiserror::Error)]
pub enum GrowthError {
    /// The reference weight table is malformed or too narrow.
    #[error("invalid reference weights: {reason}")]
    ReferenceWeights {
        /// Explanation of the problem.
        reason: String,
    },

    /// A growth table is missing or has the wrong shape.
    #[error("invalid growth table for area {area}: {reason}")]
    Table {
        /// Area the table belongs to.
        area: AreaId,
        /// Explanation of the problem.
        reason: String,
    },

    /// A parameter vector does not cover the simulated period or areas.
    #[error("invalid growth parameters: {reason}")]
    InvalidParameters {
        /// Explanation of the problem.
        reason: String,
    },
}

/// Per-length-group increments produced by a growth law.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GrowthIncrements {
    /// Length increment per length group.
    pub length: Vec<f64>,
    /// Weight increment per length group.
    pub weight: Vec<f64>,
}

impl GrowthIncrements {
    /// Increments of zero for `groups` length groups.
    pub fn zero(groups: usize) -> Self {
        Self {
            length: vec![0.0; groups],
            weight: vec![0.0; groups],
        }
    }
}

/// Signals available to a growth law in one step and area.
#[derive(Debug, Clone, Copy)]
pub struct GrowthSignals<'a> {
    /// Current time descriptor.
    pub time: TimeStep,
    /// Area being grown.
    pub area: AreaId,
    /// Temperature of the area in this step.
    pub temperature: f64,
    /// First simulated year, used to index yearly parameters.
    pub first_year: i32,
    /// Numbers and mean weights by length group, summed over ages.
    pub numbers: &'a [PopulationCell],
    /// Feeding level by length group, averaged over sub-steps.
    pub fphi: &'a [f64],
    /// Maximum consumption by length group.
    pub max_consumption: &'a [f64],
}

impl GrowthSignals<'_> {
    fn mean_weight(&self, l: usize) -> f64 {
        self.numbers.get(l).map_or(0.0, |c| c.w)
    }

    fn fphi(&self, l: usize) -> f64 {
        self.fphi.get(l).copied().unwrap_or(0.0)
    }

    fn max_consumption(&self, l: usize) -> f64 {
        self.max_consumption.get(l).copied().unwrap_or(0.0)
    }

    fn year_index(&self) -> usize {
        usize::try_from(self.time.year.saturating_sub(self.first_year)).unwrap_or(0)
    }
}

/// Length and weight increments for one area, rows indexed by running
/// step and cycled.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthTable {
    area: AreaId,
    length: Vec<Vec<f64>>,
    weight: Vec<Vec<f64>>,
}

impl GrowthTable {
    /// Area the table belongs to.
    pub const fn area(&self) -> AreaId {
        self.area
    }

    fn pick<'a>(rows: &'a [Vec<f64>], time: &TimeStep) -> &'a [f64] {
        let len = u64::try_from(rows.len()).unwrap_or(0);
        time.time
            .saturating_sub(1)
            .checked_rem(len)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| rows.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Length increments for the current step.
    pub fn length(&self, time: &TimeStep) -> &[f64] {
        Self::pick(&self.length, time)
    }

    /// Weight increments for the current step.
    pub fn weight(&self, time: &TimeStep) -> &[f64] {
        Self::pick(&self.weight, time)
    }
}

/// Parameters shared by the weight-based von Bertalanffy laws.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightLawParams {
    /// Weight parameters `w0..w5`.
    pub weight: [f64; 6],
    /// Length parameters `l0..l8`.
    pub length: [f64; 9],
    /// Reference weight at every length group.
    pub reference: Vec<f64>,
}

/// Year, step and area multipliers of weight growth.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthEffects {
    /// Multiplier per simulated year.
    pub year: Vec<f64>,
    /// Multiplier per step of the year.
    pub step: Vec<f64>,
    /// Multiplier per area.
    pub area: Vec<(AreaId, f64)>,
}

impl GrowthEffects {
    fn factor(&self, signals: &GrowthSignals<'_>) -> f64 {
        let year = self.year.get(signals.year_index()).copied().unwrap_or(1.0);
        let step_index = usize::try_from(signals.time.step.saturating_sub(1)).unwrap_or(0);
        let step = self.step.get(step_index).copied().unwrap_or(1.0);
        let area = self
            .area
            .iter()
            .find(|(id, _)| *id == signals.area)
            .map_or(1.0, |(_, v)| *v);
        year * step * area
    }
}

/// The closed set of growth laws.
#[derive(Debug, Clone, PartialEq)]
pub enum GrowthLaw {
    /// Temperature and feeding-level dependent law.
    Multispecies {
        /// Parameters `p0..p8`.
        params: [f64; 9],
    },
    /// Increments read from per-area tables.
    Tabulated {
        /// One table per stock area.
        tables: Vec<GrowthTable>,
    },
    /// Weight-based von Bertalanffy law.
    WeightVonBertalanffy(WeightLawParams),
    /// Consumption-based law of Jones.
    Jones {
        /// Weight parameters `w0..w5`.
        weight: [f64; 6],
        /// Length parameters `l0..l7`.
        length: [f64; 8],
        /// Reference weight at every length group.
        reference: Vec<f64>,
    },
    /// Weight-based von Bertalanffy law with year, step and area effects.
    WeightVonBertalanffyEffects(WeightLawParams, Box<GrowthEffects>),
    /// Length von Bertalanffy law with yearly k and tabulated weights.
    LengthVonBertalanffyYearly {
        /// Asymptotic length.
        linf: f64,
        /// Growth rate per simulated year.
        k_values: Vec<f64>,
        /// Weight increment tables.
        tables: Vec<GrowthTable>,
    },
    /// Power-of-length law with yearly k and tabulated weights.
    PowerLength {
        /// Length exponent.
        exponent: f64,
        /// Growth rate per simulated year.
        k_values: Vec<f64>,
        /// Weight increment tables.
        tables: Vec<GrowthTable>,
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

impl GrowthLaw {
    /// Build a law for a stock on `division` living on `areas`, simulated
    /// for `years` years of `steps_per_year` steps.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError`] if reference weights do not span the
    /// division, a table is missing or misshapen, or yearly/step/area
    /// parameters do not cover the simulation.
    pub fn from_config(
        config: &GrowthLawConfig,
        division: &LengthGroupDivision,
        areas: &[AreaId],
        years: usize,
        steps_per_year: usize,
    ) -> Result<Self, GrowthError> {
        let groups = division.len();
        let law = match config {
            GrowthLawConfig::Multispecies { params } => Self::Multispecies { params: *params },
            GrowthLawConfig::Tabulated { tables } => Self::Tabulated {
                tables: build_tables(tables, groups, areas, true)?,
            },
            GrowthLawConfig::WeightVonBertalanffy {
                weight_params,
                length_params,
                reference_weights,
            } => Self::WeightVonBertalanffy(WeightLawParams {
                weight: *weight_params,
                length: *length_params,
                reference: reference_weights_at(reference_weights, division)?,
            }),
            GrowthLawConfig::Jones {
                weight_params,
                length_params,
                reference_weights,
            } => Self::Jones {
                weight: *weight_params,
                length: *length_params,
                reference: reference_weights_at(reference_weights, division)?,
            },
            GrowthLawConfig::WeightVonBertalanffyEffects {
                weight_params,
                length_params,
                reference_weights,
                year_effect,
                step_effect,
                area_effect,
            } => {
                require_len("year_effect", year_effect.len(), years)?;
                require_len("step_effect", step_effect.len(), steps_per_year)?;
                let area = areas
                    .iter()
                    .map(|&id| {
                        area_effect
                            .iter()
                            .find(|e| AreaId::new(e.area) == id)
                            .map(|e| (id, e.value))
                            .ok_or_else(|| GrowthError::InvalidParameters {
                                reason: format!("no area_effect for area {id}"),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::WeightVonBertalanffyEffects(
                    WeightLawParams {
                        weight: *weight_params,
                        length: *length_params,
                        reference: reference_weights_at(reference_weights, division)?,
                    },
                    Box::new(GrowthEffects {
                        year: year_effect.clone(),
                        step: step_effect.clone(),
                        area,
                    }),
                )
            }
            GrowthLawConfig::LengthVonBertalanffyYearly {
                linf,
                k_values,
                tables,
            } => {
                require_len("k_values", k_values.len(), years)?;
                Self::LengthVonBertalanffyYearly {
                    linf: *linf,
                    k_values: k_values.clone(),
                    tables: build_tables(tables, groups, areas, false)?,
                }
            }
            GrowthLawConfig::PowerLength {
                exponent,
                k_values,
                tables,
            } => {
                require_len("k_values", k_values.len(), years)?;
                Self::PowerLength {
                    exponent: *exponent,
                    k_values: k_values.clone(),
                    tables: build_tables(tables, groups, areas, false)?,
                }
            }
            GrowthLawConfig::LengthVonBertalanffy { linf, k, a, b } => Self::LengthVonBertalanffy {
                linf: *linf,
                k: *k,
                a: *a,
                b: *b,
            },
        };
        Ok(law)
    }

    /// Short name used in log events.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Multispecies { .. } => "multispecies",
            Self::Tabulated { .. } => "tabulated",
            Self::WeightVonBertalanffy(_) => "weight_von_bertalanffy",
            Self::Jones { .. } => "jones",
            Self::WeightVonBertalanffyEffects(..) => "weight_von_bertalanffy_effects",
            Self::LengthVonBertalanffyYearly { .. } => "length_von_bertalanffy_yearly",
            Self::PowerLength { .. } => "power_length",
            Self::LengthVonBertalanffy { .. } => "length_von_bertalanffy",
        }
    }

    /// Length and weight increments for every group of `division`.
    pub fn increments(
        &self,
        division: &LengthGroupDivision,
        signals: &GrowthSignals<'_>,
    ) -> GrowthIncrements {
        let means = division.mean_lengths();
        let stepsize = signals.time.step_fraction();
        let temp = signals.temperature;
        match self {
            Self::Multispecies { params } => {
                let [p0, p1, p2, p3, p4, p5, p6, p7, p8] = *params;
                let temp_l = stepsize * p0 * p2.mul_add(temp, p3);
                let temp_w = stepsize * p4 * p7.mul_add(temp, p8);
                let mut inc = GrowthIncrements::zero(means.len());
                for (l, &mean) in means.iter().enumerate() {
                    let fphi = signals.fphi(l);
                    let w = signals.mean_weight(l);
                    set(&mut inc.length, l, (temp_l * mean.powf(p1) * fphi).max(0.0));
                    if w > shoal_types::NEGLIGIBLE {
                        set(&mut inc.weight, l, temp_w * w.powf(p5) * (fphi - p6));
                    }
                }
                inc
            }
            Self::Tabulated { tables } => {
                let Some(table) = find_table(tables, signals.area) else {
                    return GrowthIncrements::zero(means.len());
                };
                let length = table.length(&signals.time);
                let weight = table.weight(&signals.time);
                if length.iter().chain(weight).any(|&v| v < 0.0) {
                    warn!(law = self.name(), area = %signals.area, "negative tabulated growth");
                }
                GrowthIncrements {
                    length: padded(length, means.len()),
                    weight: padded(weight, means.len()),
                }
            }
            Self::WeightVonBertalanffy(params) => {
                weight_law_increments(self.name(), params, 1.0, means, signals)
            }
            Self::WeightVonBertalanffyEffects(params, effects) => {
                let factor = effects.factor(signals);
                weight_law_increments(self.name(), params, factor, means, signals)
            }
            Self::Jones {
                weight,
                length,
                reference,
            } => {
                let [w0, w1, w2, w3, w4, w5] = *weight;
                let [l0, l1, l2, l3, l4, l5, l6, l7] = *length;
                if is_negligible(w0) {
                    warn!(law = self.name(), "weight growth parameter is zero");
                }
                warn_length_params(self.name(), l5, l6, l7);
                let temp_w =
                    stepsize * w4.mul_add(temp, w5).exp() * signals.time.substeps_f64();
                let mut inc = GrowthIncrements::zero(means.len());
                for (l, &mean) in means.iter().enumerate() {
                    let w = signals.mean_weight(l);
                    if is_negligible(w) {
                        continue;
                    }
                    let fphi = signals.fphi(l);
                    let wg = fphi * signals.max_consumption(l) * temp_w / (w0 * w.powf(w1))
                        - w2 * w.powf(w3);
                    if wg <= 0.0 {
                        continue;
                    }
                    let ratio = fphi.mul_add(l2.mul_add(fphi, l1), l0);
                    let wref = reference.get(l).copied().unwrap_or(0.0);
                    let lg = length_from_weight(w, wg, ratio * wref, mean, [l3, l4, l5, l6, l7]);
                    set(&mut inc.weight, l, wg);
                    set(&mut inc.length, l, lg);
                }
                inc
            }
            Self::LengthVonBertalanffyYearly {
                linf,
                k_values,
                tables,
            } => {
                let kval = yearly(k_values, signals) * stepsize;
                let weight = tabulated_weight(self.name(), tables, means.len(), signals);
                let length = means
                    .iter()
                    .map(|&mean| (linf - mean) * (1.0 - (-kval).exp()))
                    .collect();
                GrowthIncrements { length, weight }
            }
            Self::PowerLength {
                exponent,
                k_values,
                tables,
            } => {
                if *exponent > 0.0 {
                    warn!(law = self.name(), exponent, "growth parameter is positive");
                }
                let kval = yearly(k_values, signals) * stepsize;
                let weight = tabulated_weight(self.name(), tables, means.len(), signals);
                let length = means
                    .iter()
                    .map(|&mean| {
                        if is_negligible(*exponent) {
                            kval
                        } else {
                            kval * mean.powf(*exponent)
                        }
                    })
                    .collect();
                GrowthIncrements { length, weight }
            }
            Self::LengthVonBertalanffy { linf, k, a, b } => {
                if is_negligible(*k) || is_negligible(*a) {
                    warn!(law = self.name(), "growth parameter is zero");
                }
                if division.overall_max() > *linf {
                    warn!(
                        law = self.name(),
                        linf,
                        max_length = division.overall_max(),
                        "length greater than length infinity"
                    );
                }
                let mult = 1.0 - (-k * stepsize).exp();
                let length: Vec<f64> = means.iter().map(|&mean| (linf - mean) * mult).collect();
                let weight = means
                    .iter()
                    .zip(&length)
                    .map(|(&mean, &lg)| a * ((mean + lg).powf(*b) - mean.powf(*b)))
                    .collect();
                GrowthIncrements { length, weight }
            }
        }
    }
}

fn set(values: &mut [f64], l: usize, value: f64) {
    if let Some(slot) = values.get_mut(l) {
        *slot = value;
    }
}

fn padded(values: &[f64], groups: usize) -> Vec<f64> {
    (0..groups)
        .map(|l| values.get(l).copied().unwrap_or(0.0))
        .collect()
}

fn find_table(tables: &[GrowthTable], area: AreaId) -> Option<&GrowthTable> {
    tables.iter().find(|t| t.area == area)
}

fn yearly(values: &[f64], signals: &GrowthSignals<'_>) -> f64 {
    values
        .get(signals.year_index())
        .or_else(|| values.last())
        .copied()
        .unwrap_or(0.0)
}

fn tabulated_weight(
    law: &'static str,
    tables: &[GrowthTable],
    groups: usize,
    signals: &GrowthSignals<'_>,
) -> Vec<f64> {
    let weight = find_table(tables, signals.area).map_or(&[][..], |t| t.weight(&signals.time));
    if weight.iter().any(|&v| v < 0.0) {
        warn!(law, area = %signals.area, "negative weight growth parameter");
    }
    padded(weight, groups)
}

fn warn_length_params(law: &'static str, l5: f64, l6: f64, l7: f64) {
    if is_negligible(l6) || is_negligible(l7) {
        warn!(law, "length growth parameter is zero");
    }
    if l5 < 0.0 {
        warn!(law, "length growth parameter is negative");
    }
}

/// Length increment implied by a weight increment `wg` for fish of mean
/// weight `w` against the reference weight `wref_scaled`.
fn length_from_weight(w: f64, wg: f64, wref_scaled: f64, mean: f64, params: [f64; 5]) -> f64 {
    let [l3, l4, l5, l6, l7] = params;
    let x = (w - wref_scaled) / w;
    let fx = l4.mul_add(x, l3).max(0.0).min(l5.max(0.0));
    fx * wg / (l6 * l7 * mean.powf(l7 - 1.0))
}

fn weight_law_increments(
    law: &'static str,
    params: &WeightLawParams,
    factor: f64,
    means: &[f64],
    signals: &GrowthSignals<'_>,
) -> GrowthIncrements {
    let [w0, w1, w2, w3, w4, w5] = params.weight;
    let [l0, l1, l2, l3, l4, l5, l6, l7, l8] = params.length;
    if is_negligible(w2) || is_negligible(w3) {
        warn!(law, "weight growth parameter is zero");
    }
    warn_length_params(law, l5, l6, l7);
    let ratio = l8.mul_add(l2.mul_add(l8, l1), l0);
    let temp_w = signals.time.step_fraction() * w0 * (w1 * signals.temperature).exp();
    let mut inc = GrowthIncrements::zero(means.len());
    for (l, &mean) in means.iter().enumerate() {
        let w = signals.mean_weight(l);
        if is_negligible(w) {
            continue;
        }
        let wg = temp_w * ((w / w2).powf(w4) - (w / w3).powf(w5)) * factor;
        if wg <= 0.0 {
            continue;
        }
        let wref = params.reference.get(l).copied().unwrap_or(0.0);
        let lg = length_from_weight(w, wg, ratio * wref, mean, [l3, l4, l5, l6, l7]);
        set(&mut inc.weight, l, wg);
        set(&mut inc.length, l, lg);
    }
    inc
}

fn require_len(name: &str, have: usize, need: usize) -> Result<(), GrowthError> {
    if have < need {
        return Err(GrowthError::InvalidParameters {
            reason: format!("{name} has {have} values, {need} needed"),
        });
    }
    Ok(())
}

fn build_tables(
    configs: &[GrowthTableConfig],
    groups: usize,
    areas: &[AreaId],
    need_length: bool,
) -> Result<Vec<GrowthTable>, GrowthError> {
    areas
        .iter()
        .map(|&area| {
            let config = configs
                .iter()
                .find(|t| AreaId::new(t.area) == area)
                .ok_or_else(|| GrowthError::Table {
                    area,
                    reason: "no table for area".to_owned(),
                })?;
            let mut kinds = vec![("weight", &config.weight)];
            if need_length {
                kinds.push(("length", &config.length));
            }
            for (kind, rows) in kinds {
                if rows.is_empty() {
                    return Err(GrowthError::Table {
                        area,
                        reason: format!("{kind} table is empty"),
                    });
                }
                if let Some(row) = rows.iter().find(|r| r.len() != groups) {
                    return Err(GrowthError::Table {
                        area,
                        reason: format!(
                            "{kind} row has {} values for {groups} length groups",
                            row.len()
                        ),
                    });
                }
            }
            Ok(GrowthTable {
                area,
                length: config.length.clone(),
                weight: config.weight.clone(),
            })
        })
        .collect()
}

/// Interpolate a `(length, weight)` table at the mean length of every
/// group of `division`.
///
/// # Errors
///
/// Returns [`GrowthError::ReferenceWeights`] if the table is empty, its
/// lengths are not strictly increasing, or it does not span the mean
/// lengths of the division.
pub fn reference_weights_at(
    table: &[[f64; 2]],
    division: &LengthGroupDivision,
) -> Result<Vec<f64>, GrowthError> {
    let (Some(first), Some(last)) = (table.first(), table.last()) else {
        return Err(GrowthError::ReferenceWeights {
            reason: "table is empty".to_owned(),
        });
    };
    if table.windows(2).any(|pair| match pair {
        [a, b] => b[0] - a[0] <= 0.0,
        _ => false,
    }) {
        return Err(GrowthError::ReferenceWeights {
            reason: "Lengths must be strictly increasing".to_owned(),
        });
    }
    let means = division.mean_lengths();
    let lowest = means.first().copied().unwrap_or(first[0]);
    let highest = means.last().copied().unwrap_or(last[0]);
    if lowest < first[0] || highest > last[0] {
        return Err(GrowthError::ReferenceWeights {
            reason: format!(
                "Lengths must span the range of growth lengths ({lowest} to {highest})"
            ),
        });
    }
    Ok(means
        .iter()
        .map(|&mean| {
            table
                .windows(2)
                .find_map(|pair| match pair {
                    [a, b] if mean >= a[0] && mean <= b[0] => {
                        let ratio = (mean - a[0]) / (b[0] - a[0]);
                        Some(ratio.mul_add(b[1] - a[1], a[1]))
                    }
                    _ => None,
                })
                .unwrap_or(first[1])
        })
        .collect())
}

/// Growth kernel shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthKernel {
    /// Split between neighbouring whole jumps.
    Deterministic {
        /// Largest jump in length groups.
        max_jump: usize,
    },
    /// Beta-binomial jump distribution.
    BetaBinomial {
        /// Dispersion.
        beta: f64,
        /// Largest jump in length groups.
        max_jump: usize,
    },
}

impl From<&KernelConfig> for GrowthKernel {
    fn from(config: &KernelConfig) -> Self {
        match *config {
            KernelConfig::Deterministic { max_jump } => Self::Deterministic { max_jump },
            KernelConfig::BetaBinomial { beta, max_jump } => Self::BetaBinomial { beta, max_jump },
        }
    }
}

/// A growth law paired with a kernel and optional fixed weights.
#[derive(Debug, Clone)]
pub struct Grower {
    law: GrowthLaw,
    kernel: GrowthKernel,
    fixed_weights: Option<Vec<f64>>,
    division: Arc<LengthGroupDivision>,
}

impl Grower {
    /// Build a grower for a stock on `division`.
    ///
    /// # Errors
    ///
    /// Returns [`GrowthError`] if the law cannot be built.
    pub fn from_config(
        config: &GrowthConfig,
        division: Arc<LengthGroupDivision>,
        areas: &[AreaId],
        years: usize,
        steps_per_year: usize,
    ) -> Result<Self, GrowthError> {
        let law = GrowthLaw::from_config(&config.law, &division, areas, years, steps_per_year)?;
        let fixed_weights = config
            .fixed_weights
            .map(|condition| condition_weights(&condition, division.mean_lengths()));
        Ok(Self {
            law,
            kernel: GrowthKernel::from(&config.kernel),
            fixed_weights,
            division,
        })
    }

    /// Assemble a grower from parts.
    pub const fn new(
        law: GrowthLaw,
        kernel: GrowthKernel,
        fixed_weights: Option<Vec<f64>>,
        division: Arc<LengthGroupDivision>,
    ) -> Self {
        Self {
            law,
            kernel,
            fixed_weights,
            division,
        }
    }

    /// The growth law.
    pub const fn law(&self) -> &GrowthLaw {
        &self.law
    }

    /// Absolute weights per length group when weights are fixed.
    pub fn fixed_weights(&self) -> Option<&[f64]> {
        self.fixed_weights.as_deref()
    }

    /// Increments for the current step and area.
    pub fn increments(&self, signals: &GrowthSignals<'_>) -> GrowthIncrements {
        self.law.increments(&self.division, signals)
    }

    /// Kernel moving fish by the length increments, expressed in length
    /// groups of the division.
    pub fn transition(&self, increments: &GrowthIncrements) -> GrowthTransition {
        let mean_jumps: Vec<f64> = (0..self.division.len())
            .map(|l| {
                let width = match (self.division.min_length(l), self.division.max_length(l)) {
                    (Some(lo), Some(hi)) => hi - lo,
                    _ => 0.0,
                };
                let dl = increments.length.get(l).copied().unwrap_or(0.0);
                if width > 0.0 { dl / width } else { 0.0 }
            })
            .collect();
        match self.kernel {
            GrowthKernel::Deterministic { max_jump } => {
                GrowthTransition::deterministic(&mean_jumps, max_jump)
            }
            GrowthKernel::BetaBinomial { beta, max_jump } => {
                GrowthTransition::beta_binomial(&mean_jumps, beta, max_jump)
            }
        }
    }
}

/// `a * L^b` at every length in `lengths`.
pub fn condition_weights(condition: &ConditionConfig, lengths: &[f64]) -> Vec<f64> {
    lengths
        .iter()
        .map(|&l| condition.a * l.powf(condition.b))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn division() -> LengthGroupDivision {
        LengthGroupDivision::uniform(10.0, 20.0, 2.0).unwrap()
    }

    fn time() -> TimeStep {
        TimeStep {
            year: 2001,
            step: 2,
            substep: 1,
            num_substeps: 1,
            steps_per_year: 4,
            step_length: 3.0,
            year_length: 12.0,
            time: 6,
        }
    }

    fn signals<'a>(numbers: &'a [PopulationCell], fphi: &'a [f64]) -> GrowthSignals<'a> {
        GrowthSignals {
            time: time(),
            area: AreaId::new(1),
            temperature: 5.0,
            first_year: 2000,
            numbers,
            fphi,
            max_consumption: &[],
        }
    }

    #[test]
    fn reference_weights_interpolate_linearly() {
        let w = reference_weights_at(&[[10.0, 1.0], [20.0, 3.0]], &division()).unwrap();
        assert_eq!(w.len(), 5);
        assert!(close(w[0], 1.2));
        assert!(close(w[4], 2.8));
    }

    #[test]
    fn reference_weights_must_increase_and_span() {
        let err = reference_weights_at(&[[10.0, 1.0], [10.0, 2.0], [20.0, 3.0]], &division());
        assert!(matches!(err, Err(GrowthError::ReferenceWeights { ref reason }) if reason.contains("strictly")));
        let err = reference_weights_at(&[[12.0, 1.0], [20.0, 3.0]], &division());
        assert!(matches!(err, Err(GrowthError::ReferenceWeights { ref reason }) if reason.contains("span")));
    }

    #[test]
    fn length_von_bertalanffy_approaches_linf() {
        let law = GrowthLaw::LengthVonBertalanffy {
            linf: 30.0,
            k: 0.4,
            a: 0.01,
            b: 3.0,
        };
        let div = division();
        let inc = law.increments(&div, &signals(&[], &[]));
        let mult = 1.0 - (-0.1_f64).exp();
        assert!(close(inc.length[0], (30.0 - 11.0) * mult));
        assert!(inc.length[0] > inc.length[4]);
        let expected_w = 0.01 * ((11.0 + inc.length[0]).powi(3) - 11.0_f64.powi(3));
        assert!(close(inc.weight[0], expected_w));
    }

    #[test]
    fn multispecies_scales_with_feeding_level() {
        let law = GrowthLaw::Multispecies {
            params: [1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0],
        };
        let div = division();
        let numbers = vec![PopulationCell::new(10.0, 2.0); 5];
        let full = law.increments(&div, &signals(&numbers, &[1.0; 5]));
        let half = law.increments(&div, &signals(&numbers, &[0.5; 5]));
        assert!(close(full.length[0], 0.25 * 11.0));
        assert!(close(half.length[0], full.length[0] / 2.0));
        assert!(close(full.weight[0], 0.25 * 2.0));
    }

    #[test]
    fn weight_law_stops_growth_when_weight_increment_negative() {
        let params = WeightLawParams {
            weight: [1.0, 0.0, 1.0, 1.0, 1.0, 2.0],
            length: [1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0],
            reference: vec![1.0; 5],
        };
        let law = GrowthLaw::WeightVonBertalanffy(params);
        let div = division();
        let numbers = vec![PopulationCell::new(10.0, 2.0); 5];
        let inc = law.increments(&div, &signals(&numbers, &[]));
        assert!(inc.weight.iter().all(|&w| close(w, 0.0)));
        assert!(inc.length.iter().all(|&l| close(l, 0.0)));
    }

    #[test]
    fn tabulated_rows_follow_running_step() {
        let config = vec![GrowthTableConfig {
            area: 1,
            length: vec![vec![1.0; 5], vec![2.0; 5]],
            weight: vec![vec![0.1; 5], vec![0.2; 5]],
        }];
        let div = division();
        let law = GrowthLaw::from_config(
            &GrowthLawConfig::Tabulated { tables: config },
            &div,
            &[AreaId::new(1)],
            1,
            2,
        )
        .unwrap();
        // Running step 6 picks row (6 - 1) % 2 = 1.
        let inc = law.increments(&div, &signals(&[], &[]));
        assert!(close(inc.length[3], 2.0));
        assert!(close(inc.weight[3], 0.2));
    }

    #[test]
    fn missing_table_is_rejected() {
        let div = division();
        let result = GrowthLaw::from_config(
            &GrowthLawConfig::Tabulated { tables: Vec::new() },
            &div,
            &[AreaId::new(1)],
            1,
            4,
        );
        assert!(matches!(result, Err(GrowthError::Table { .. })));
    }

    #[test]
    fn short_k_values_are_rejected() {
        let div = division();
        let result = GrowthLaw::from_config(
            &GrowthLawConfig::PowerLength {
                exponent: 0.0,
                k_values: vec![1.0],
                tables: Vec::new(),
            },
            &div,
            &[],
            3,
            4,
        );
        assert!(matches!(result, Err(GrowthError::InvalidParameters { .. })));
    }

    #[test]
    fn power_law_with_zero_exponent_is_linear() {
        let law = GrowthLaw::PowerLength {
            exponent: 0.0,
            k_values: vec![4.0, 8.0],
            tables: Vec::new(),
        };
        let inc = law.increments(&division(), &signals(&[], &[]));
        assert!(inc.length.iter().all(|&l| close(l, 2.0)));
    }

    #[test]
    fn grower_builds_kernel_in_group_units() {
        let div = Arc::new(division());
        let grower = Grower::new(
            GrowthLaw::LengthVonBertalanffy {
                linf: 30.0,
                k: 0.0,
                a: 0.0,
                b: 3.0,
            },
            GrowthKernel::Deterministic { max_jump: 3 },
            None,
            Arc::clone(&div),
        );
        let inc = GrowthIncrements {
            length: vec![3.0, 0.0, 0.0, 0.0, 0.0],
            weight: vec![0.0; 5],
        };
        let kernel = grower.transition(&inc);
        assert!(close(kernel.expected_jump(0), 1.5));
        assert!(close(kernel.expected_jump(1), 0.0));
    }
}
