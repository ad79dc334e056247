//! Straying of fish into other stocks.

use shoal_matrix::{AgeBandMatrix, TagRatioMatrix};
use shoal_types::{AreaId, TimeStep};

use crate::transfer::{Parcel, Proportion, Schedule, TransferTarget};

/// Straying of one stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Straying {
    schedule: Schedule,
    proportion: Proportion,
    targets: Vec<TransferTarget>,
}

impl Straying {
    /// Straying of `proportion` of the fish to `targets`.
    pub const fn new(schedule: Schedule, proportion: Proportion, targets: Vec<TransferTarget>) -> Self {
        Self {
            schedule,
            proportion,
            targets,
        }
    }

    /// Receiving stocks.
    pub fn targets(&self) -> &[TransferTarget] {
        &self.targets
    }

    /// Returns `true` when fish stray in `area` at `time`.
    pub fn is_stray_step(&self, area: AreaId, time: &TimeStep) -> bool {
        self.schedule.is_active(area, time)
    }

    /// Remove the straying share of every age, by length, and return it.
    pub fn store(
        &self,
        population: &mut AgeBandMatrix,
        tags: &mut TagRatioMatrix,
        lengths: &[f64],
    ) -> Parcel {
        let shares = self.proportion.by_length(lengths);
        let parcel = Parcel {
            population: population.extract(&shares, 0, u32::MAX),
            tags: tags.extract(&shares, 0, u32::MAX),
        };
        tags.update_ratio(population);
        parcel
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoal_types::PopulationCell;

    use super::*;

    #[test]
    fn store_removes_share_by_length() {
        let mut population = AgeBandMatrix::new(1, &[(0, 2), (0, 2)]).unwrap();
        *population.cell_mut(1, 0).unwrap() = PopulationCell::new(10.0, 1.0);
        *population.cell_mut(2, 1).unwrap() = PopulationCell::new(20.0, 2.0);
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("T", 0.0, 0.5, &population).unwrap();
        let straying = Straying::new(
            Schedule::new(&[1], &[]),
            Proportion::Logistic {
                alpha: 100.0,
                l50: 15.0,
            },
            Vec::new(),
        );

        let parcel = straying.store(&mut population, &mut tags, &[10.0, 20.0]);
        assert!((parcel.population.total_number() - 20.0).abs() < 1e-6);
        assert!((population.total_number() - 10.0).abs() < 1e-6);
        let share = tags.cohort("T").unwrap().share(1, 0).unwrap();
        assert!((share.ratio - 0.5).abs() < 1e-6);
    }
}
