//! Scheduled recruitment and normally distributed recruits.

use shoal_matrix::{AgeBandMatrix, MatrixError};
use shoal_types::{AreaId, ConversionIndex, LengthGroupDivision, PopulationCell, TimeStep, guarded_div};

use crate::config::RenewalConfig;
use crate::transfer::RecruitBatch;

/// Shares of a normal length distribution over the groups of `division`,
/// evaluated at group means and normalised to sum to one. A standard
/// deviation at or below zero puts everything in the group containing
/// the mean, or the nearest end group.
pub fn normal_length_distribution(division: &LengthGroupDivision, mean: f64, sd: f64) -> Vec<f64> {
    let means = division.mean_lengths();
    if sd > 0.0 {
        let density: Vec<f64> = means
            .iter()
            .map(|&m| {
                let z = (m - mean) / sd;
                (-0.5 * z * z).exp()
            })
            .collect();
        let total: f64 = density.iter().sum();
        if total > 0.0 {
            return density.iter().map(|d| guarded_div(*d, total)).collect();
        }
    }
    let target = division.group_of(mean).unwrap_or_else(|| {
        if mean < division.overall_min() {
            0
        } else {
            division.len().saturating_sub(1)
        }
    });
    (0..means.len())
        .map(|l| if l == target { 1.0 } else { 0.0 })
        .collect()
}

/// Add `batch` to `population` at `age`, spreading recruits over the
/// groups of `division` and weighing them with the batch's condition.
/// Recruits are kept inside the groups allocated to `age` when any share
/// falls there; otherwise the row is widened to hold them.
///
/// # Errors
///
/// Returns [`MatrixError`] if the recruits cannot be placed in the
/// population's division.
pub fn add_recruits(
    population: &mut AgeBandMatrix,
    division: &LengthGroupDivision,
    identity: &ConversionIndex,
    age: u32,
    batch: &RecruitBatch,
) -> Result<(), MatrixError> {
    if batch.number <= 0.0 || !population.contains_age(age) {
        return Ok(());
    }
    let mut shares = normal_length_distribution(division, batch.mean_length, batch.sd_length);
    let (lo, hi) = population.row(age)?.bounds();
    let inside: f64 = shares
        .iter()
        .enumerate()
        .filter(|(l, _)| (lo..hi).contains(l))
        .map(|(_, s)| s)
        .sum();
    if inside > 0.0 {
        for (l, share) in shares.iter_mut().enumerate() {
            *share = if (lo..hi).contains(&l) { *share / inside } else { 0.0 };
        }
    }
    let populated: Vec<usize> = shares
        .iter()
        .enumerate()
        .filter(|(_, s)| **s > 0.0)
        .map(|(l, _)| l)
        .collect();
    let (Some(&lo), Some(&hi)) = (populated.first(), populated.last()) else {
        return Ok(());
    };
    let mut recruits = AgeBandMatrix::new(age, &[(lo, hi.saturating_add(1))])?;
    for l in lo..=hi {
        let share = shares.get(l).copied().unwrap_or(0.0);
        let length = division.mean_length(l).unwrap_or(0.0);
        let weight = batch.condition.a * length.powf(batch.condition.b);
        *recruits.cell_mut(age, l)? = PopulationCell::new(batch.number * share, weight);
    }
    population.add(&recruits, identity, 1.0, age, age)
}

/// One scheduled recruitment event.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalEvent {
    /// Year of the event.
    pub year: i32,
    /// Step of the year.
    pub step: u32,
    /// Area of the event.
    pub area: AreaId,
    /// Recruits added.
    pub batch: RecruitBatch,
}

/// Scheduled recruitment of one stock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Renewal {
    events: Vec<RenewalEvent>,
}

impl Renewal {
    /// Renewal from configured events.
    pub fn from_config(configs: &[RenewalConfig]) -> Self {
        Self {
            events: configs
                .iter()
                .map(|c| RenewalEvent {
                    year: c.year,
                    step: c.step,
                    area: AreaId::new(c.area),
                    batch: RecruitBatch {
                        age: Some(c.age),
                        number: c.number,
                        mean_length: c.mean_length,
                        sd_length: c.sd_length,
                        condition: c.condition,
                    },
                })
                .collect(),
        }
    }

    /// Returns `true` when no event is scheduled.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events due in `area` at `time`.
    pub fn due<'a>(&'a self, area: AreaId, time: &'a TimeStep) -> impl Iterator<Item = &'a RenewalEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.area == area && e.year == time.year && e.step == time.step)
    }
}
