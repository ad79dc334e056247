//! The `(N, W)` pair stored in every age/length cell.
//!
//! A [`PopulationCell`] holds the number of fish in the cell and their mean
//! weight. Merging two cells keeps the number-weighted mean weight, so that
//! total biomass `N * W` is conserved by every merge.

use core::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::constants::is_negligible;

/// Abundance and mean weight of one age/length cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationCell {
    /// Number of fish.
    pub n: f64,
    /// Mean weight of one fish.
    pub w: f64,
}

impl PopulationCell {
    /// An empty cell.
    pub const ZERO: Self = Self { n: 0.0, w: 0.0 };

    /// Create a cell from a number and a mean weight.
    pub const fn new(n: f64, w: f64) -> Self {
        Self { n, w }
    }

    /// Total biomass in the cell.
    pub fn biomass(&self) -> f64 {
        self.n * self.w
    }

    /// Returns `true` when the cell holds no meaningful number of fish.
    pub fn is_empty(&self) -> bool {
        is_negligible(self.n)
    }

    /// Merge `other`, scaled by `ratio`, into this cell.
    ///
    /// The mean weight becomes the number-weighted mean of both cells. When
    /// the merged number is negligible the weight is reset to zero.
    pub fn merge_scaled(&mut self, other: Self, ratio: f64) {
        let added = other.n * ratio;
        let total = self.n + added;
        if is_negligible(total) {
            self.n = total.max(0.0);
            self.w = 0.0;
        } else {
            self.w = (self.n * self.w + added * other.w) / total;
            self.n = total;
        }
    }

    /// Scale the number of fish, leaving the mean weight unchanged.
    pub fn scale(&mut self, factor: f64) {
        self.n *= factor;
    }

    /// Return a copy of this cell with its number scaled.
    pub const fn scaled(self, factor: f64) -> Self {
        Self {
            n: self.n * factor,
            w: self.w,
        }
    }
}

impl AddAssign for PopulationCell {
    fn add_assign(&mut self, rhs: Self) {
        self.merge_scaled(rhs, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn merge_keeps_weighted_mean() {
        let mut a = PopulationCell::new(10.0, 2.0);
        a += PopulationCell::new(30.0, 4.0);
        assert!(close(a.n, 40.0));
        assert!(close(a.w, 3.5));
        assert!(close(a.biomass(), 140.0));
    }

    #[test]
    fn merge_into_empty_takes_other_weight() {
        let mut a = PopulationCell::ZERO;
        a.merge_scaled(PopulationCell::new(8.0, 5.0), 0.5);
        assert!(close(a.n, 4.0));
        assert!(close(a.w, 5.0));
    }

    #[test]
    fn merge_of_two_empty_cells_has_zero_weight() {
        let mut a = PopulationCell::ZERO;
        a += PopulationCell::new(0.0, 12.0);
        assert!(a.is_empty());
        assert!(close(a.w, 0.0));
    }

    #[test]
    fn scale_leaves_weight() {
        let c = PopulationCell::new(10.0, 3.0).scaled(0.25);
        assert!(close(c.n, 2.5));
        assert!(close(c.w, 3.0));
    }
}
