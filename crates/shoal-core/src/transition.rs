//! Movement of the oldest age into older stocks.
//!
//! On the transition step the oldest age is captured before the age
//! increment and moved after it, so that it lands one age older in the
//! receiving stock.

use shoal_matrix::{AgeBandMatrix, TagRatioMatrix};
use shoal_types::{AreaId, TimeStep};

use crate::transfer::{Parcel, Schedule, TransferTarget};

/// Transition of one stock.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    schedule: Schedule,
    targets: Vec<TransferTarget>,
}

impl Transition {
    /// Transition on `step` in `areas` (empty means every area).
    pub fn new(step: u32, areas: &[u32], targets: Vec<TransferTarget>) -> Self {
        Self {
            schedule: Schedule::new(&[step], areas),
            targets,
        }
    }

    /// Receiving stocks.
    pub fn targets(&self) -> &[TransferTarget] {
        &self.targets
    }

    /// Returns `true` when fish move in `area` at `time`.
    pub fn is_transition_step(&self, area: AreaId, time: &TimeStep) -> bool {
        self.schedule.is_active(area, time)
    }

    /// Remove every fish of the oldest age and return them.
    pub fn keep(population: &mut AgeBandMatrix, tags: &mut TagRatioMatrix) -> Parcel {
        let oldest = population.max_age();
        let groups = population
            .ages()
            .map(|(_, row)| row.max_col())
            .max()
            .unwrap_or(0);
        let all = vec![1.0; groups];
        Parcel {
            population: population.extract(&all, oldest, oldest),
            tags: tags.extract(&all, oldest, oldest),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoal_types::PopulationCell;

    use super::*;

    #[test]
    fn keep_takes_the_whole_oldest_age() {
        let mut population = AgeBandMatrix::new(1, &[(0, 2), (0, 3)]).unwrap();
        *population.cell_mut(1, 1).unwrap() = PopulationCell::new(5.0, 1.0);
        *population.cell_mut(2, 2).unwrap() = PopulationCell::new(7.0, 2.0);
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("T", 0.0, 1.0, &population).unwrap();

        let parcel = Transition::keep(&mut population, &mut tags);
        assert!((parcel.population.total_number() - 7.0).abs() < 1e-12);
        assert!((population.total_number() - 5.0).abs() < 1e-12);
        let moved = parcel.tags.cohort("T").unwrap().total_tagged();
        assert!((moved - 7.0).abs() < 1e-12);
    }
}
