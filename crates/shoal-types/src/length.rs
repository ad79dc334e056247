//! Length-group divisions.
//!
//! A [`LengthGroupDivision`] partitions a length axis into contiguous groups.
//! Column indices of every population matrix are interpreted through the
//! division of the owning stock, and the division is shared read-only
//! between all structures that need it.

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Tolerance used when comparing length boundaries.
pub const LENGTH_TOLERANCE: f64 = 1e-9;

/// Ordered partition of a length axis into groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthGroupDivision {
    /// Group boundaries; group `i` spans `[breaks[i], breaks[i + 1])`.
    breaks: Vec<f64>,
    /// Cached mean length of every group.
    means: Vec<f64>,
    /// Common group width, if all groups have the same width.
    dl: Option<f64>,
}

impl LengthGroupDivision {
    /// Build a division of equal-width groups covering `[min, max)`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidDivision`] if `dl` is not positive, the
    /// range is empty, or the range is not a whole number of groups.
    pub fn uniform(min: f64, max: f64, dl: f64) -> Result<Self, TypesError> {
        if dl <= 0.0 || !dl.is_finite() {
            return Err(TypesError::InvalidDivision {
                reason: format!("group width must be positive, got {dl}"),
            });
        }
        if max <= min {
            return Err(TypesError::InvalidDivision {
                reason: format!("maximum length {max} must exceed minimum length {min}"),
            });
        }
        let groups = ((max - min) / dl).round();
        if (groups * dl - (max - min)).abs() > LENGTH_TOLERANCE * groups.max(1.0) {
            return Err(TypesError::InvalidDivision {
                reason: format!("range [{min}, {max}) is not a multiple of the group width {dl}"),
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = groups as usize;
        let breaks = (0..=count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f64 * dl;
                min + offset
            })
            .collect();
        let mut division = Self::from_breaks(breaks)?;
        division.dl = Some(dl);
        Ok(division)
    }

    /// Build a division from explicit, strictly increasing group boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidDivision`] if fewer than two boundaries
    /// are given or the boundaries are not strictly increasing.
    pub fn from_breaks(breaks: Vec<f64>) -> Result<Self, TypesError> {
        if breaks.len() < 2 {
            return Err(TypesError::InvalidDivision {
                reason: "at least two length boundaries are required".to_owned(),
            });
        }
        if breaks.windows(2).any(|pair| match pair {
            [lo, hi] => hi <= lo,
            _ => false,
        }) {
            return Err(TypesError::InvalidDivision {
                reason: "length boundaries must be strictly increasing".to_owned(),
            });
        }
        let means: Vec<f64> = breaks
            .windows(2)
            .filter_map(|pair| match pair {
                [lo, hi] => Some(0.5 * (lo + hi)),
                _ => None,
            })
            .collect();
        let widths: Vec<f64> = breaks
            .windows(2)
            .filter_map(|pair| match pair {
                [lo, hi] => Some(hi - lo),
                _ => None,
            })
            .collect();
        let dl = widths.first().copied().filter(|first| {
            widths
                .iter()
                .all(|w| (w - first).abs() <= LENGTH_TOLERANCE * first.abs().max(1.0))
        });
        Ok(Self { breaks, means, dl })
    }

    /// Number of length groups.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// A division always holds at least one group.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Common group width, or `None` for irregular divisions.
    pub const fn dl(&self) -> Option<f64> {
        self.dl
    }

    /// Lower boundary of group `i`.
    pub fn min_length(&self, i: usize) -> Option<f64> {
        if i < self.len() {
            self.breaks.get(i).copied()
        } else {
            None
        }
    }

    /// Upper boundary of group `i`.
    pub fn max_length(&self, i: usize) -> Option<f64> {
        self.breaks.get(i.checked_add(1)?).copied()
    }

    /// Mean length of group `i`.
    pub fn mean_length(&self, i: usize) -> Option<f64> {
        self.means.get(i).copied()
    }

    /// Mean lengths of every group, in order.
    pub fn mean_lengths(&self) -> &[f64] {
        &self.means
    }

    /// Group boundaries, one more than the number of groups.
    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Lower boundary of the first group.
    pub fn overall_min(&self) -> f64 {
        self.breaks.first().copied().unwrap_or(0.0)
    }

    /// Upper boundary of the last group.
    pub fn overall_max(&self) -> f64 {
        self.breaks.last().copied().unwrap_or(0.0)
    }

    /// Index of the group containing `length`, if it lies inside the
    /// division. The upper boundary of the last group belongs to that group.
    pub fn group_of(&self, length: f64) -> Option<usize> {
        if length < self.overall_min() || length > self.overall_max() {
            return None;
        }
        let upper = self.breaks.partition_point(|b| *b <= length);
        Some(upper.saturating_sub(1).min(self.len().saturating_sub(1)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn uniform_division_has_expected_groups() {
        let div = LengthGroupDivision::uniform(10.0, 20.0, 2.0).unwrap();
        assert_eq!(div.len(), 5);
        assert_eq!(div.dl(), Some(2.0));
        assert!((div.mean_length(0).unwrap() - 11.0).abs() < 1e-12);
        assert!((div.max_length(4).unwrap() - 20.0).abs() < 1e-12);
        assert!(div.mean_length(5).is_none());
    }

    #[test]
    fn uniform_division_rejects_ragged_range() {
        assert!(LengthGroupDivision::uniform(10.0, 21.0, 2.0).is_err());
        assert!(LengthGroupDivision::uniform(10.0, 10.0, 1.0).is_err());
        assert!(LengthGroupDivision::uniform(10.0, 20.0, 0.0).is_err());
    }

    #[test]
    fn irregular_breaks_have_no_common_width() {
        let div = LengthGroupDivision::from_breaks(vec![0.0, 1.0, 3.0, 6.0]).unwrap();
        assert_eq!(div.len(), 3);
        assert!(div.dl().is_none());
        assert!(LengthGroupDivision::from_breaks(vec![0.0, 2.0, 1.0]).is_err());
    }

    #[test]
    fn group_lookup_covers_boundaries() {
        let div = LengthGroupDivision::uniform(0.0, 10.0, 1.0).unwrap();
        assert_eq!(div.group_of(0.0), Some(0));
        assert_eq!(div.group_of(4.5), Some(4));
        assert_eq!(div.group_of(5.0), Some(5));
        assert_eq!(div.group_of(10.0), Some(9));
        assert_eq!(div.group_of(10.5), None);
        assert_eq!(div.group_of(-0.1), None);
    }
}
