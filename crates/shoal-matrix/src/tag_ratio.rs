//! Tag cohorts carried alongside a population matrix.
//!
//! A [`TagRatioMatrix`] is a side table of independently registered tag
//! cohorts. Each cohort stores, per age/length cell, the number of tagged
//! fish and their ratio to the cell's total. Cohort storage is cohort-major,
//! so a population without tags carries an empty vector and nothing else.
//!
//! Every operation that changes the numbers of the base population must be
//! mirrored here and followed by [`TagRatioMatrix::update_ratio`], which
//! keeps ratios in `[0, 1]`.

use serde::{Deserialize, Serialize};
use shoal_types::{ConversionIndex, guarded_div, is_negligible};

use crate::age_band::AgeBandMatrix;
use crate::banded::{BandValue, BandedMatrix};
use crate::error::MatrixError;
use crate::kernel::GrowthTransition;
use crate::maturity::MaturityRule;

/// Tagged number and tag ratio of one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TagShare {
    /// Number of tagged fish.
    pub tagged: f64,
    /// Tagged fish as a share of all fish in the cell. Negative until the
    /// cohort is first observed.
    pub ratio: f64,
}

impl BandValue for TagShare {
    fn is_populated(&self) -> bool {
        !is_negligible(self.tagged)
    }

    fn merge_scaled(&mut self, other: &Self, ratio: f64) {
        self.tagged += other.tagged * ratio;
    }
}

/// One registered tag cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCohort {
    name: String,
    tag_loss: f64,
    shares: BandedMatrix<TagShare>,
}

impl TagCohort {
    /// Cohort name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instantaneous yearly tag-loss rate.
    pub const fn tag_loss(&self) -> f64 {
        self.tag_loss
    }

    /// Per-cell tagged numbers and ratios.
    pub const fn shares(&self) -> &BandedMatrix<TagShare> {
        &self.shares
    }

    /// Share at `(age, length group)`.
    pub fn share(&self, age: u32, l: usize) -> Result<TagShare, MatrixError> {
        self.shares.get(age, l).copied()
    }

    /// Total tagged fish in the cohort.
    pub fn total_tagged(&self) -> f64 {
        self.shares
            .rows()
            .flat_map(|(_, row)| row.values().iter())
            .map(|s| s.tagged)
            .sum()
    }

    fn for_each_tagged(&mut self, mut f: impl FnMut(u32, usize, &mut f64)) {
        for (age, row) in self.shares.rows_mut() {
            for (l, share) in row.iter_mut() {
                f(age, l, &mut share.tagged);
            }
        }
    }

    /// Reshape the cohort's rows to the bands of `base`, dropping tagged
    /// fish in cells that no longer exist.
    fn align_to(&mut self, base: &AgeBandMatrix) {
        let mut aligned = base.bands().map(|_| TagShare::default());
        for (age, row) in aligned.rows_mut() {
            let Ok(old) = self.shares.row(age) else {
                continue;
            };
            for (l, slot) in row.iter_mut() {
                if let Some(share) = old.get(l) {
                    *slot = *share;
                }
            }
        }
        self.shares = aligned;
    }
}

/// Side table of tag cohorts for one population matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRatioMatrix {
    cohorts: Vec<TagCohort>,
}

impl TagRatioMatrix {
    /// Table with no cohorts.
    pub const fn new() -> Self {
        Self {
            cohorts: Vec::new(),
        }
    }

    /// Number of registered cohorts.
    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    /// Returns `true` when no cohort is registered.
    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    /// Registered cohorts, in registration order.
    pub fn cohorts(&self) -> &[TagCohort] {
        &self.cohorts
    }

    /// Position of the cohort called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::InvalidTagOperation`] if no such cohort is
    /// registered.
    pub fn cohort_id(&self, name: &str) -> Result<usize, MatrixError> {
        self.cohorts
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| MatrixError::InvalidTagOperation {
                tag: name.to_owned(),
                reason: "cohort is not registered".to_owned(),
            })
    }

    /// The cohort called `name`.
    pub fn cohort(&self, name: &str) -> Result<&TagCohort, MatrixError> {
        let id = self.cohort_id(name)?;
        self.cohorts
            .get(id)
            .ok_or_else(|| MatrixError::InvalidTagOperation {
                tag: name.to_owned(),
                reason: "cohort is not registered".to_owned(),
            })
    }

    /// Register a cohort covering every cell of `base`. Each cell starts
    /// with ratio `initial_ratio` and `max(initial_ratio, 0) * N` tagged
    /// fish.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::InvalidTagOperation`] if a cohort with the
    /// same name is already registered.
    pub fn add_cohort(
        &mut self,
        name: &str,
        tag_loss: f64,
        initial_ratio: f64,
        base: &AgeBandMatrix,
    ) -> Result<(), MatrixError> {
        if self.cohorts.iter().any(|c| c.name == name) {
            return Err(MatrixError::InvalidTagOperation {
                tag: name.to_owned(),
                reason: "cohort is already registered".to_owned(),
            });
        }
        let tagged_share = initial_ratio.max(0.0);
        self.cohorts.push(TagCohort {
            name: name.to_owned(),
            tag_loss,
            shares: base.bands().map(|cell| TagShare {
                tagged: tagged_share * cell.n,
                ratio: initial_ratio,
            }),
        });
        Ok(())
    }

    /// Remove the cohort called `name`, freeing exactly its storage.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::InvalidTagOperation`] if no such cohort is
    /// registered.
    pub fn delete_cohort(&mut self, name: &str) -> Result<TagCohort, MatrixError> {
        let id = self.cohort_id(name)?;
        Ok(self.cohorts.remove(id))
    }

    /// Release `by_length[l]` tagged fish into length group `l` of cohort
    /// `name`, spread over ages in proportion to their numbers. Releases
    /// are capped by the fish present.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::InvalidTagOperation`] if no such cohort is
    /// registered.
    pub fn release(
        &mut self,
        name: &str,
        by_length: &[f64],
        base: &AgeBandMatrix,
    ) -> Result<(), MatrixError> {
        let id = self.cohort_id(name)?;
        let totals = base.length_totals();
        if let Some(cohort) = self.cohorts.get_mut(id) {
            cohort.align_to(base);
            cohort.for_each_tagged(|age, l, tagged| {
                let released = by_length.get(l).copied().unwrap_or(0.0).max(0.0);
                let total = totals.get(l).map_or(0.0, |c| c.n);
                let n = base.cell(age, l).map_or(0.0, |c| c.n);
                *tagged += released * guarded_div(n, total);
            });
        }
        self.update_ratio(base);
        Ok(())
    }

    /// Recompute every ratio as `tagged / N` from `base`.
    ///
    /// Tagged numbers are clamped into `[0, N]`, ratios into `[0, 1]`, and
    /// empty cells get ratio zero. Cohort rows are first reshaped to the
    /// bands of `base`.
    pub fn update_ratio(&mut self, base: &AgeBandMatrix) {
        for cohort in &mut self.cohorts {
            cohort.align_to(base);
            for (age, row) in cohort.shares.rows_mut() {
                for (l, share) in row.iter_mut() {
                    let n = base.cell(age, l).map_or(0.0, |c| c.n).max(0.0);
                    share.tagged = share.tagged.clamp(0.0, n);
                    share.ratio = guarded_div(share.tagged, n).clamp(0.0, 1.0);
                }
            }
        }
    }

    /// Recompute tagged numbers as `ratio * N` from `base`, after an
    /// operation that scaled every fish in a cell alike. Unobserved cells
    /// stay untagged.
    pub fn update_numbers(&mut self, base: &AgeBandMatrix) {
        for cohort in &mut self.cohorts {
            for (age, row) in cohort.shares.rows_mut() {
                for (l, share) in row.iter_mut() {
                    let n = base.cell(age, l).map_or(0.0, |c| c.n).max(0.0);
                    share.tagged = share.ratio.max(0.0) * n;
                }
            }
        }
    }

    /// Multiply tagged numbers by a factor indexed by length group.
    pub fn scale(&mut self, factors: &[f64]) {
        for cohort in &mut self.cohorts {
            cohort.for_each_tagged(|_, l, tagged| {
                if let Some(&f) = factors.get(l) {
                    *tagged = (*tagged * f).max(0.0);
                }
            });
        }
    }

    /// Multiply every tagged number by `factor`.
    pub fn scale_all(&mut self, factor: f64) {
        for cohort in &mut self.cohorts {
            cohort.for_each_tagged(|_, _, tagged| *tagged = (*tagged * factor).max(0.0));
        }
    }

    /// Apply each cohort's tag loss over `step_fraction` of a year.
    pub fn apply_tag_loss(&mut self, step_fraction: f64) {
        for cohort in &mut self.cohorts {
            if cohort.tag_loss <= 0.0 {
                continue;
            }
            let keep = (-cohort.tag_loss * step_fraction).exp();
            cohort.for_each_tagged(|_, _, tagged| *tagged *= keep);
        }
    }

    /// Move tagged fish with the same kernel and maturity rule as the
    /// base population. Returns the maturing tagged fish when a rule is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if the kernel does not
    /// cover the tagged length groups.
    pub fn grow(
        &mut self,
        transition: &GrowthTransition,
        maturity: Option<&dyn MaturityRule>,
    ) -> Result<Option<Self>, MatrixError> {
        let mut matured = maturity.map(|_| self.zeroed_like());
        for (id, cohort) in self.cohorts.iter_mut().enumerate() {
            for (age, row) in cohort.shares.rows_mut() {
                let (grown, mature) =
                    transition.redistribute(row, age, maturity, |share: &TagShare, _, _, p| {
                        TagShare {
                            tagged: share.tagged * p,
                            ratio: share.ratio,
                        }
                    })?;
                *row = grown;
                let slot = matured
                    .as_mut()
                    .and_then(|m| m.cohorts.get_mut(id))
                    .and_then(|c| c.shares.row_mut(age).ok());
                if let (Some(slot), Some(mature)) = (slot, mature) {
                    *slot = mature;
                }
            }
        }
        Ok(matured)
    }

    /// Age tagged fish in step with [`AgeBandMatrix::increment_age`].
    pub fn increment_age(&mut self) {
        for cohort in &mut self.cohorts {
            cohort.shares.shift_rows_up();
        }
    }

    /// Add `ratio` times the tagged fish of `other` into the cohort of the
    /// same name, for ages in `[min_age, max_age]`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::InvalidTagOperation`] if a cohort of `other`
    /// is not registered here, or [`MatrixError::IncompatibleRange`] if
    /// tagged length groups have no counterpart in this division.
    pub fn add(
        &mut self,
        other: &Self,
        ci: &ConversionIndex,
        ratio: f64,
        min_age: u32,
        max_age: u32,
    ) -> Result<(), MatrixError> {
        for source in &other.cohorts {
            let id = self.cohort_id(&source.name)?;
            if let Some(target) = self.cohorts.get_mut(id) {
                target
                    .shares
                    .add_converted(&source.shares, ci, ratio, min_age, max_age)?;
            }
        }
        Ok(())
    }

    /// Remove the share `shares[l]` of tagged fish with age in
    /// `[min_age, max_age]`, mirroring [`AgeBandMatrix::extract`].
    pub fn extract(&mut self, shares: &[f64], min_age: u32, max_age: u32) -> Self {
        let mut parcel = self.zeroed_like();
        for (cohort, target) in self.cohorts.iter_mut().zip(parcel.cohorts.iter_mut()) {
            for (age, row) in cohort.shares.rows_mut() {
                if age < min_age || age > max_age {
                    continue;
                }
                let Ok(target_row) = target.shares.row_mut(age) else {
                    continue;
                };
                for (l, share) in row.iter_mut() {
                    let part = shares.get(l).copied().unwrap_or(0.0).clamp(0.0, 1.0);
                    if let Some(slot) = target_row.get_mut(l) {
                        slot.tagged = share.tagged * part;
                        slot.ratio = share.ratio;
                    }
                    share.tagged *= 1.0 - part;
                }
            }
        }
        parcel
    }

    /// Cohorts of the same names and shapes with no tagged fish.
    pub fn zeroed_like(&self) -> Self {
        Self {
            cohorts: self
                .cohorts
                .iter()
                .map(|c| TagCohort {
                    name: c.name.clone(),
                    tag_loss: c.tag_loss,
                    shares: c.shares.map(|_| TagShare::default()),
                })
                .collect(),
        }
    }

    /// Relabel the youngest age of every cohort.
    pub fn set_min_age(&mut self, age: u32) {
        for cohort in &mut self.cohorts {
            cohort.shares.set_min_row(age);
        }
    }

    /// Remove every tagged fish, keeping the cohorts registered.
    pub fn set_to_zero(&mut self) {
        for cohort in &mut self.cohorts {
            cohort.shares.clear();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoal_types::{LengthGroupDivision, PopulationCell};

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn base() -> AgeBandMatrix {
        let mut m = AgeBandMatrix::new(1, &[(0, 3), (0, 3)]).unwrap();
        *m.cell_mut(1, 1).unwrap() = PopulationCell::new(100.0, 1.0);
        *m.cell_mut(2, 1).unwrap() = PopulationCell::new(300.0, 2.0);
        *m.cell_mut(2, 2).unwrap() = PopulationCell::new(40.0, 3.0);
        m
    }

    #[test]
    fn duplicate_and_missing_cohorts_are_rejected() {
        let b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("T1", 0.0, -1.0, &b).unwrap();
        assert!(matches!(
            tags.add_cohort("T1", 0.0, -1.0, &b),
            Err(MatrixError::InvalidTagOperation { .. })
        ));
        assert!(tags.delete_cohort("T9").is_err());
        assert!(close(tags.cohort("T1").unwrap().share(1, 1).unwrap().ratio, -1.0));
    }

    #[test]
    fn delete_compacts_exactly_one_cohort() {
        let b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("A", 0.0, 0.1, &b).unwrap();
        tags.add_cohort("B", 0.0, 0.2, &b).unwrap();
        tags.add_cohort("C", 0.0, 0.3, &b).unwrap();
        let removed = tags.delete_cohort("B").unwrap();
        assert_eq!(removed.name(), "B");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.cohort_id("C").unwrap(), 1);
        assert!(close(tags.cohort("C").unwrap().share(2, 1).unwrap().ratio, 0.3));
    }

    #[test]
    fn full_ratio_cohort_tracks_mortality() {
        let mut b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("all", 0.0, 1.0, &b).unwrap();
        b.scale_all(0.5);
        tags.update_numbers(&b);
        tags.update_ratio(&b);
        let share = tags.cohort("all").unwrap().share(2, 1).unwrap();
        assert!(close(share.ratio, 1.0));
        assert!(close(share.tagged, 150.0));
        assert!(close(b.cell(2, 1).unwrap().n, 150.0));
    }

    #[test]
    fn ratios_stay_in_unit_interval() {
        let mut b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("T", 0.0, 0.5, &b).unwrap();
        // Base loses more fish than the tags do.
        b.scale_all(0.1);
        tags.update_ratio(&b);
        for (_, row) in tags.cohort("T").unwrap().shares().rows() {
            for share in row.values() {
                assert!((0.0..=1.0).contains(&share.ratio));
            }
        }
        let empty = tags.cohort("T").unwrap().share(1, 0).unwrap();
        assert!(close(empty.ratio, 0.0));
    }

    #[test]
    fn release_spreads_over_ages_by_numbers() {
        let b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("R", 0.0, -1.0, &b).unwrap();
        tags.release("R", &[0.0, 40.0, 0.0], &b).unwrap();
        let cohort = tags.cohort("R").unwrap();
        assert!(close(cohort.share(1, 1).unwrap().tagged, 10.0));
        assert!(close(cohort.share(2, 1).unwrap().tagged, 30.0));
        assert!(close(cohort.share(2, 1).unwrap().ratio, 0.1));
        assert!(close(cohort.total_tagged(), 40.0));
    }

    #[test]
    fn tag_loss_decays_tagged_numbers() {
        let b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("L", 0.4, 1.0, &b).unwrap();
        tags.apply_tag_loss(0.25);
        let tagged = tags.cohort("L").unwrap().share(1, 1).unwrap().tagged;
        assert!(close(tagged, 100.0 * (-0.1_f64).exp()));
    }

    #[test]
    fn growth_and_aging_follow_the_base() {
        let mut b = base();
        let mut tags = TagRatioMatrix::new();
        tags.add_cohort("G", 0.0, 1.0, &b).unwrap();
        let kernel = GrowthTransition::deterministic(&[1.0, 1.0, 0.0], 1);
        b.grow(&kernel, crate::age_band::WeightChange::Increment(&[0.0; 3]), None)
            .unwrap();
        tags.grow(&kernel, None).unwrap();
        b.increment_age();
        tags.increment_age();
        tags.update_ratio(&b);
        let cohort = tags.cohort("G").unwrap();
        assert!(close(cohort.share(2, 2).unwrap().tagged, b.cell(2, 2).unwrap().n));
        assert!(close(cohort.share(2, 2).unwrap().ratio, 1.0));
        assert!(close(cohort.total_tagged(), b.total_number()));
    }

    #[test]
    fn add_requires_registered_cohort() {
        let div = LengthGroupDivision::uniform(0.0, 3.0, 1.0).unwrap();
        let ci = ConversionIndex::new(&div, &div).unwrap();
        let b = base();
        let mut source = TagRatioMatrix::new();
        source.add_cohort("X", 0.0, 1.0, &b).unwrap();
        let mut target = TagRatioMatrix::new();
        assert!(target.add(&source, &ci, 1.0, 1, 2).is_err());
        target.add_cohort("X", 0.0, -1.0, &b).unwrap();
        target.add(&source, &ci, 0.5, 1, 2).unwrap();
        assert!(close(target.cohort("X").unwrap().total_tagged(), 220.0));
    }
}
