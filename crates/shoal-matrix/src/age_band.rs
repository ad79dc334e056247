//! Age-by-length population matrix.
//!
//! An [`AgeBandMatrix`] is a banded matrix whose rows are ages and whose
//! columns are length groups of the owning stock's division. Every cell is a
//! [`PopulationCell`]. All operations keep `N >= 0` and keep mean weights
//! number-weighted when fish from different cells are combined.

use serde::{Deserialize, Serialize};
use shoal_types::{ConversionIndex, PopulationCell};

use crate::banded::{BandRow, BandValue, BandedMatrix};
use crate::error::MatrixError;
use crate::kernel::GrowthTransition;
use crate::maturity::MaturityRule;

/// How mean weights change during growth.
#[derive(Debug, Clone, Copy)]
pub enum WeightChange<'a> {
    /// Weight increment per source length group, added to the current
    /// mean weight.
    Increment(&'a [f64]),
    /// Absolute mean weight per destination length group.
    Absolute(&'a [f64]),
}

/// Population numbers and mean weights by age and length group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBandMatrix {
    bands: BandedMatrix<PopulationCell>,
}

impl AgeBandMatrix {
    /// Empty population with age `min_age + i` covering `bounds[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if no ages are given or a
    /// row's bounds are reversed.
    pub fn new(min_age: u32, bounds: &[(usize, usize)]) -> Result<Self, MatrixError> {
        if bounds.is_empty() {
            return Err(MatrixError::IncompatibleRange {
                reason: "a population needs at least one age".to_owned(),
            });
        }
        Ok(Self {
            bands: BandedMatrix::new(min_age, bounds, &PopulationCell::ZERO)?,
        })
    }

    /// The underlying banded storage.
    pub const fn bands(&self) -> &BandedMatrix<PopulationCell> {
        &self.bands
    }

    /// An empty population with the same shape.
    pub fn zeroed_like(&self) -> Self {
        Self {
            bands: self.bands.map(|_| PopulationCell::ZERO),
        }
    }

    /// Youngest age.
    pub const fn min_age(&self) -> u32 {
        self.bands.min_row()
    }

    /// Oldest age.
    pub fn max_age(&self) -> u32 {
        self.bands.max_row().unwrap_or_else(|| self.bands.min_row())
    }

    /// Returns `true` when the population has a row for `age`.
    pub fn contains_age(&self, age: u32) -> bool {
        self.bands.contains_row(age)
    }

    /// Relabel the youngest age; every row moves with it.
    pub const fn set_min_age(&mut self, age: u32) {
        self.bands.set_min_row(age);
    }

    /// First length group of `age`.
    pub fn min_length(&self, age: u32) -> Result<usize, MatrixError> {
        self.bands.min_col(age)
    }

    /// One past the last length group of `age`.
    pub fn max_length(&self, age: u32) -> Result<usize, MatrixError> {
        self.bands.max_col(age)
    }

    /// Cell at `(age, length group)`.
    pub fn cell(&self, age: u32, l: usize) -> Result<PopulationCell, MatrixError> {
        self.bands.get(age, l).copied()
    }

    /// Mutable cell at `(age, length group)`.
    pub fn cell_mut(&mut self, age: u32, l: usize) -> Result<&mut PopulationCell, MatrixError> {
        self.bands.get_mut(age, l)
    }

    /// Row of `age`.
    pub fn row(&self, age: u32) -> Result<&BandRow<PopulationCell>, MatrixError> {
        self.bands.row(age)
    }

    /// Iterate over `(age, row)` pairs.
    pub fn ages(&self) -> impl Iterator<Item = (u32, &BandRow<PopulationCell>)> + '_ {
        self.bands.rows()
    }

    /// Accumulate every age into `out`, indexed by length group. Numbers
    /// add and weights become the number-weighted mean. Columns beyond
    /// `out` are ignored.
    pub fn sum_columns(&self, out: &mut [PopulationCell]) {
        for (_, row) in self.bands.rows() {
            for (l, cell) in row.iter() {
                if let Some(slot) = out.get_mut(l) {
                    *slot += *cell;
                }
            }
        }
    }

    /// Totals over all ages, indexed by length group.
    pub fn length_totals(&self) -> Vec<PopulationCell> {
        self.bands.col_sum()
    }

    /// Total number of fish.
    pub fn total_number(&self) -> f64 {
        self.bands
            .rows()
            .flat_map(|(_, row)| row.values().iter())
            .map(|c| c.n)
            .sum()
    }

    /// Total biomass.
    pub fn total_biomass(&self) -> f64 {
        self.bands
            .rows()
            .flat_map(|(_, row)| row.values().iter())
            .map(PopulationCell::biomass)
            .sum()
    }

    /// Multiply numbers by a survival factor indexed by length group.
    /// Length groups without a factor are left unchanged.
    pub fn scale(&mut self, factors: &[f64]) {
        for (_, row) in self.bands.rows_mut() {
            for (l, cell) in row.iter_mut() {
                if let Some(&f) = factors.get(l) {
                    cell.n = (cell.n * f).max(0.0);
                }
            }
        }
    }

    /// Multiply numbers by a survival factor indexed by `age - min_age`.
    pub fn scale_by_age(&mut self, factors: &[f64]) {
        for (i, (_, row)) in self.bands.rows_mut().enumerate() {
            let Some(&f) = factors.get(i) else {
                continue;
            };
            for cell in row.values_mut() {
                cell.n = (cell.n * f).max(0.0);
            }
        }
    }

    /// Multiply every number by `factor`.
    pub fn scale_all(&mut self, factor: f64) {
        for (_, row) in self.bands.rows_mut() {
            for cell in row.values_mut() {
                cell.n = (cell.n * factor).max(0.0);
            }
        }
    }

    /// Clear negative numbers and the weights of empty cells.
    pub fn clamp_negative(&mut self) {
        for (_, row) in self.bands.rows_mut() {
            for cell in row.values_mut() {
                if cell.n <= 0.0 {
                    *cell = PopulationCell::ZERO;
                }
            }
        }
    }

    /// Move fish between length groups according to `transition` and
    /// update mean weights.
    ///
    /// With [`WeightChange::Increment`] the parcel leaving group `l` weighs
    /// `W + dW[l]`; with [`WeightChange::Absolute`] fish landing in group
    /// `l'` weigh `W[l']`. When `maturity` is supplied the maturing share of
    /// every parcel is removed and returned as a population of the same
    /// shape.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if the kernel does not
    /// cover every populated length group.
    pub fn grow(
        &mut self,
        transition: &GrowthTransition,
        weights: WeightChange<'_>,
        maturity: Option<&dyn MaturityRule>,
    ) -> Result<Option<Self>, MatrixError> {
        let mut matured = maturity.map(|_| self.zeroed_like());
        for (age, row) in self.bands.rows_mut() {
            let (grown, mature) =
                transition.redistribute(row, age, maturity, |cell: &PopulationCell, from, to, p| {
                    let w = match weights {
                        WeightChange::Increment(dw) => cell.w + dw.get(from).copied().unwrap_or(0.0),
                        WeightChange::Absolute(ws) => ws.get(to).copied().unwrap_or(cell.w),
                    };
                    PopulationCell::new(cell.n * p, w)
                })?;
            *row = grown;
            if let (Some(target), Some(mature)) = (matured.as_mut(), mature) {
                if let Ok(slot) = target.bands.row_mut(age) {
                    *slot = mature;
                }
            }
        }
        Ok(matured)
    }

    /// Age every fish by one year. The oldest age is a plus group that
    /// keeps its fish and receives the next-oldest; the youngest age is
    /// left empty. A single-age population is unchanged.
    pub fn increment_age(&mut self) {
        self.bands.shift_rows_up();
    }

    /// Add `ratio` times the fish of `other` for ages in
    /// `[min_age, max_age]`, converting length groups with `ci`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if populated length groups
    /// of `other` have no counterpart in this population's division.
    pub fn add(
        &mut self,
        other: &Self,
        ci: &ConversionIndex,
        ratio: f64,
        min_age: u32,
        max_age: u32,
    ) -> Result<(), MatrixError> {
        self.bands
            .add_converted(&other.bands, ci, ratio, min_age, max_age)
    }

    /// Remove the share `shares[l]` of every cell with age in
    /// `[min_age, max_age]` and return the removed fish as a population of
    /// the same shape.
    pub fn extract(&mut self, shares: &[f64], min_age: u32, max_age: u32) -> Self {
        let mut parcel = self.zeroed_like();
        for (age, row) in self.bands.rows_mut() {
            if age < min_age || age > max_age {
                continue;
            }
            let Ok(target) = parcel.bands.row_mut(age) else {
                continue;
            };
            for (l, cell) in row.iter_mut() {
                let share = shares.get(l).copied().unwrap_or(0.0).clamp(0.0, 1.0);
                if share <= 0.0 || !cell.is_populated() {
                    continue;
                }
                if let Some(slot) = target.get_mut(l) {
                    *slot = cell.scaled(share);
                }
                cell.scale(1.0 - share);
            }
        }
        parcel
    }

    /// Remove every fish.
    pub fn set_to_zero(&mut self) {
        self.bands.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoal_types::LengthGroupDivision;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn population() -> AgeBandMatrix {
        let mut m = AgeBandMatrix::new(1, &[(0, 3), (0, 4), (1, 4)]).unwrap();
        *m.cell_mut(1, 1).unwrap() = PopulationCell::new(100.0, 2.0);
        *m.cell_mut(2, 2).unwrap() = PopulationCell::new(50.0, 4.0);
        *m.cell_mut(3, 3).unwrap() = PopulationCell::new(10.0, 8.0);
        *m.cell_mut(3, 2).unwrap() = PopulationCell::new(10.0, 6.0);
        m
    }

    #[test]
    fn sum_columns_weights_mean() {
        let m = population();
        let mut out = vec![PopulationCell::ZERO; 4];
        m.sum_columns(&mut out);
        assert!(close(out[2].n, 60.0));
        assert!(close(out[2].w, (50.0 * 4.0 + 10.0 * 6.0) / 60.0));
        assert!(close(m.total_number(), 170.0));
    }

    #[test]
    fn substep_survival_compounds_to_step_survival() {
        let mut m = population();
        let step_survival: f64 = 0.9;
        let substeps = 4;
        let per_substep = step_survival.powf(1.0 / f64::from(substeps));
        for _ in 0..substeps {
            m.scale(&[per_substep; 4]);
        }
        assert!(close(m.cell(1, 1).unwrap().n, 90.0));
        assert!(close(m.cell(1, 1).unwrap().w, 2.0));
    }

    #[test]
    fn scale_never_produces_negative_numbers() {
        let mut m = population();
        m.scale(&[-1.0; 4]);
        m.scale_by_age(&[0.5, -3.0]);
        for (_, row) in m.ages() {
            assert!(row.values().iter().all(|c| c.n >= 0.0));
        }
    }

    #[test]
    fn zero_growth_is_identity() {
        let mut m = population();
        let before = m.clone();
        let none = m
            .grow(
                &GrowthTransition::deterministic(&[0.0; 4], 3),
                WeightChange::Increment(&[0.0; 4]),
                None,
            )
            .unwrap();
        assert!(none.is_none());
        for (age, row) in before.ages() {
            for (l, cell) in row.iter() {
                let after = m.cell(age, l).unwrap();
                assert!(close(after.n, cell.n));
                assert!(close(after.w, cell.w));
            }
        }
    }

    #[test]
    fn growth_moves_fish_and_adds_weight() {
        let mut m = population();
        m.grow(
            &GrowthTransition::deterministic(&[1.0, 1.5, 0.0, 0.0], 3),
            WeightChange::Increment(&[0.5, 1.0, 0.0, 0.0]),
            None,
        )
        .unwrap();
        // Age 1 ends at group 2, so both halves of the split land there.
        assert!(close(m.cell(1, 1).unwrap().n, 0.0));
        assert!(close(m.cell(1, 2).unwrap().n, 100.0));
        assert!(close(m.cell(1, 2).unwrap().w, 3.0));
        assert!(close(m.total_number(), 170.0));
    }

    #[test]
    fn absolute_weights_follow_destination() {
        let mut m = population();
        m.grow(
            &GrowthTransition::deterministic(&[0.0, 1.0, 0.0, 0.0], 1),
            WeightChange::Absolute(&[1.0, 2.0, 3.0, 4.0]),
            None,
        )
        .unwrap();
        assert!(close(m.cell(1, 2).unwrap().w, 3.0));
        assert!(close(m.cell(3, 3).unwrap().w, 4.0));
    }

    #[test]
    fn growth_returns_maturing_fish() {
        let mut m = population();
        let rule = |age: u32, _: usize, _: usize| if age >= 2 { 0.5 } else { 0.0 };
        let matured = m
            .grow(
                &GrowthTransition::identity(4),
                WeightChange::Increment(&[0.0; 4]),
                Some(&rule),
            )
            .unwrap()
            .unwrap();
        assert!(close(matured.cell(2, 2).unwrap().n, 25.0));
        assert!(close(m.cell(2, 2).unwrap().n, 25.0));
        assert!(close(matured.cell(1, 1).unwrap().n, 0.0));
        assert!(close(matured.total_number() + m.total_number(), 170.0));
    }

    #[test]
    fn increment_age_accumulates_plus_group() {
        let mut m = population();
        m.increment_age();
        assert!(close(m.row(1).unwrap().values().iter().map(|c| c.n).sum(), 0.0));
        assert!(close(m.cell(2, 1).unwrap().n, 100.0));
        assert!(close(m.cell(3, 2).unwrap().n, 60.0));
        assert!(close(m.cell(3, 3).unwrap().n, 10.0));
        assert!(close(m.total_number(), 170.0));
    }

    #[test]
    fn add_merges_weights_over_age_window() {
        let div = LengthGroupDivision::uniform(0.0, 4.0, 1.0).unwrap();
        let ci = ConversionIndex::new(&div, &div).unwrap();
        let mut m = population();
        let other = population();
        m.add(&other, &ci, 0.5, 2, 2).unwrap();
        assert!(close(m.cell(2, 2).unwrap().n, 75.0));
        assert!(close(m.cell(1, 1).unwrap().n, 100.0));
        m.add(&other, &ci, 1.0, 7, 9).unwrap();
        assert!(close(m.total_number(), 195.0));
    }

    #[test]
    fn extract_removes_requested_share() {
        let mut m = population();
        let parcel = m.extract(&[0.0, 0.0, 0.2, 1.0], 3, 3);
        assert!(close(parcel.cell(3, 2).unwrap().n, 2.0));
        assert!(close(parcel.cell(3, 3).unwrap().n, 10.0));
        assert!(close(m.cell(3, 2).unwrap().n, 8.0));
        assert!(close(parcel.cell(2, 2).unwrap().n, 0.0));
        assert!(close(parcel.total_number() + m.total_number(), 170.0));
    }
}
