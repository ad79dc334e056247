//! Index correspondence between two length-group divisions.
//!
//! Stocks that exchange fish (maturation, transition, straying, spawning
//! recruitment) and predators that view their own stock on a different
//! length grid all need to translate a column index of one division into
//! the other. A [`ConversionIndex`] is computed once at setup and shared
//! read-only afterwards.
//!
//! The finer of the two divisions drives the mapping: every fine group that
//! lies entirely inside a coarse group points at that coarse group. Which
//! side is finer is decided by nesting, not by group count, so a narrow
//! fine grid converts cleanly into a wider coarse one.

use crate::error::TypesError;
use crate::length::{LENGTH_TOLERANCE, LengthGroupDivision};

/// Mapping between a source and a target length-group division.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionIndex {
    /// Whether the target division is the finer side of the mapping.
    target_is_finer: bool,
    /// For every fine group, the coarse group containing it.
    pos: Vec<Option<usize>>,
    /// For every coarse group, how many fine groups map onto it.
    nrof: Vec<usize>,
    /// First fine group with a valid mapping.
    min_fine: usize,
    /// One past the last fine group with a valid mapping.
    max_fine: usize,
}

/// Map every group of `fine` onto the group of `coarse` that contains it.
fn nest(
    fine: &LengthGroupDivision,
    coarse: &LengthGroupDivision,
) -> (Vec<Option<usize>>, Vec<usize>) {
    let mut pos = vec![None; fine.len()];
    let mut nrof = vec![0_usize; coarse.len()];
    for (i, slot) in pos.iter_mut().enumerate() {
        let (Some(lo), Some(hi)) = (fine.min_length(i), fine.max_length(i)) else {
            continue;
        };
        for (j, count) in nrof.iter_mut().enumerate() {
            let (Some(clo), Some(chi)) = (coarse.min_length(j), coarse.max_length(j)) else {
                continue;
            };
            if lo >= clo - LENGTH_TOLERANCE && hi <= chi + LENGTH_TOLERANCE {
                *slot = Some(j);
                *count = count.saturating_add(1);
                break;
            }
        }
    }
    (pos, nrof)
}

fn nested_count(pos: &[Option<usize>]) -> usize {
    pos.iter().filter(|p| p.is_some()).count()
}

impl ConversionIndex {
    /// Compute the mapping from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::IncompatibleRange`] if no group of either
    /// division lies inside a group of the other.
    pub fn new(
        source: &LengthGroupDivision,
        target: &LengthGroupDivision,
    ) -> Result<Self, TypesError> {
        let coarsening = nest(source, target);
        let refining = nest(target, source);
        let source_nested = nested_count(&coarsening.0);
        let target_nested = nested_count(&refining.0);
        // Ties (identical or partially aligned grids) fall back to group count.
        let target_is_finer = target_nested > source_nested
            || (target_nested == source_nested && target.len() > source.len());
        let (pos, nrof) = if target_is_finer { refining } else { coarsening };

        let min_fine = pos.iter().position(Option::is_some);
        let max_fine = pos.iter().rposition(Option::is_some);
        let (Some(min_fine), Some(last)) = (min_fine, max_fine) else {
            return Err(TypesError::IncompatibleRange {
                reason: format!(
                    "no length group of [{}, {}) nests inside a group of [{}, {}) or vice versa",
                    source.overall_min(),
                    source.overall_max(),
                    target.overall_min(),
                    target.overall_max()
                ),
            });
        };

        Ok(Self {
            target_is_finer,
            pos,
            nrof,
            min_fine,
            max_fine: last.saturating_add(1),
        })
    }

    /// Whether the target division is finer than the source.
    pub const fn target_is_finer(&self) -> bool {
        self.target_is_finer
    }

    /// Coarse group containing fine group `i`, if any.
    pub fn pos(&self, i: usize) -> Option<usize> {
        self.pos.get(i).copied().flatten()
    }

    /// Number of fine groups mapping onto coarse group `j`.
    pub fn nrof(&self, j: usize) -> usize {
        self.nrof.get(j).copied().unwrap_or(0)
    }

    /// First fine group with a valid mapping.
    pub const fn min_fine(&self) -> usize {
        self.min_fine
    }

    /// One past the last fine group with a valid mapping.
    pub const fn max_fine(&self) -> usize {
        self.max_fine
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn div(min: f64, max: f64, dl: f64) -> LengthGroupDivision {
        LengthGroupDivision::uniform(min, max, dl).unwrap()
    }

    #[test]
    fn identical_divisions_map_one_to_one() {
        let a = div(0.0, 10.0, 1.0);
        let ci = ConversionIndex::new(&a, &a).unwrap();
        assert!(!ci.target_is_finer());
        assert_eq!(ci.pos(3), Some(3));
        assert_eq!(ci.nrof(3), 1);
        assert_eq!(ci.min_fine(), 0);
        assert_eq!(ci.max_fine(), 10);
    }

    #[test]
    fn coarser_target_collects_fine_groups() {
        let fine = div(0.0, 10.0, 1.0);
        let coarse = div(0.0, 10.0, 5.0);
        let ci = ConversionIndex::new(&fine, &coarse).unwrap();
        assert!(!ci.target_is_finer());
        assert_eq!(ci.pos(4), Some(0));
        assert_eq!(ci.pos(5), Some(1));
        assert_eq!(ci.nrof(0), 5);
        assert_eq!(ci.nrof(1), 5);
    }

    #[test]
    fn finer_target_maps_back_onto_source() {
        let coarse = div(0.0, 10.0, 5.0);
        let fine = div(0.0, 10.0, 1.0);
        let ci = ConversionIndex::new(&coarse, &fine).unwrap();
        assert!(ci.target_is_finer());
        assert_eq!(ci.nrof(0), 5);
        assert_eq!(ci.pos(9), Some(1));
    }

    #[test]
    fn narrow_fine_source_converts_into_wide_coarse_target() {
        // The target has more groups but each is twice as wide.
        let immature = div(10.0, 20.0, 1.0);
        let mature = div(10.0, 40.0, 2.0);
        let ci = ConversionIndex::new(&immature, &mature).unwrap();
        assert!(!ci.target_is_finer());
        assert_eq!(ci.pos(0), Some(0));
        assert_eq!(ci.pos(1), Some(0));
        assert_eq!(ci.pos(9), Some(4));
        assert_eq!(ci.nrof(0), 2);
        assert_eq!(ci.nrof(5), 0);
        assert_eq!(ci.min_fine(), 0);
        assert_eq!(ci.max_fine(), 10);

        let back = ConversionIndex::new(&mature, &immature).unwrap();
        assert!(back.target_is_finer());
        assert_eq!(back.pos(9), Some(4));
        assert_eq!(back.nrof(4), 2);
    }

    #[test]
    fn partially_overlapping_divisions_restrict_range() {
        let source = div(0.0, 10.0, 1.0);
        let target = div(5.0, 20.0, 5.0);
        let ci = ConversionIndex::new(&source, &target).unwrap();
        assert_eq!(ci.min_fine(), 5);
        assert_eq!(ci.max_fine(), 10);
        assert_eq!(ci.pos(2), None);
    }

    #[test]
    fn disjoint_divisions_are_incompatible() {
        let a = div(0.0, 10.0, 1.0);
        let b = div(20.0, 30.0, 1.0);
        assert!(matches!(
            ConversionIndex::new(&a, &b),
            Err(TypesError::IncompatibleRange { .. })
        ));
    }
}
