//! Growth transition kernels.
//!
//! A [`GrowthTransition`] gives, for every source length group, the
//! probability of moving up by `0, 1, 2, ...` groups during one step. The
//! model layer builds one from the mean length increments of a growth law;
//! the matrices here only apply it.

use crate::banded::{BandRow, BandValue, count_as_f64};
use crate::error::MatrixError;
use crate::maturity::MaturityRule;

/// Per-length-group distribution over upward jumps.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthTransition {
    rows: Vec<Vec<f64>>,
}

impl GrowthTransition {
    /// Kernel that leaves every group in place.
    pub fn identity(groups: usize) -> Self {
        Self {
            rows: vec![vec![1.0]; groups],
        }
    }

    /// Kernel from explicit jump distributions, one per source group.
    pub const fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// Split each mean jump (in length groups) between the two
    /// neighbouring whole jumps so that the expected jump is preserved.
    /// Negative jumps count as zero and jumps are capped at `max_jump`.
    pub fn deterministic(mean_jumps: &[f64], max_jump: usize) -> Self {
        let cap = count_as_f64(max_jump);
        let rows = mean_jumps
            .iter()
            .map(|&mean| {
                let x = mean.clamp(0.0, cap);
                let floor = x.floor();
                let frac = x - floor;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let whole = floor as usize;
                (0..=whole)
                    .map(|j| if j == whole { 1.0 - frac } else { 0.0 })
                    .chain((frac > 0.0).then_some(frac))
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Beta-binomial jump distribution on `0..=max_jump` with mean equal
    /// to each mean jump and dispersion `beta`.
    ///
    /// A mean at or below zero stays in place and a mean at or above
    /// `max_jump` moves the full `max_jump`. A non-positive `beta` falls
    /// back to [`Self::deterministic`].
    pub fn beta_binomial(mean_jumps: &[f64], beta: f64, max_jump: usize) -> Self {
        if beta <= 0.0 || max_jump == 0 {
            return Self::deterministic(mean_jumps, max_jump);
        }
        let n = count_as_f64(max_jump);
        let rows = mean_jumps
            .iter()
            .map(|&mean| {
                if mean <= 0.0 {
                    return vec![1.0];
                }
                if mean >= n {
                    return (0..=max_jump)
                        .map(|j| if j == max_jump { 1.0 } else { 0.0 })
                        .collect();
                }
                let alpha = beta * mean / (n - mean);
                let weights: Vec<f64> = core::iter::once(1.0)
                    .chain((0..max_jump).scan(1.0, |p, x| {
                        let x = count_as_f64(x);
                        *p *= (n - x) / (x + 1.0) * (x + alpha) / (n - x - 1.0 + beta);
                        Some(*p)
                    }))
                    .collect();
                let total: f64 = weights.iter().sum();
                weights.iter().map(|w| w / total).collect()
            })
            .collect();
        Self { rows }
    }

    /// Number of source length groups covered.
    pub fn groups(&self) -> usize {
        self.rows.len()
    }

    /// Jump distribution of source group `l`; empty if out of range.
    pub fn row(&self, l: usize) -> &[f64] {
        self.rows.get(l).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Expected jump of source group `l`.
    pub fn expected_jump(&self, l: usize) -> f64 {
        self.row(l)
            .iter()
            .enumerate()
            .map(|(j, p)| count_as_f64(j) * p)
            .sum()
    }

    /// Redistribute one row of values according to the kernel.
    ///
    /// `moved(value, from, to, p)` returns the parcel that moves from
    /// column `from` to column `to` with probability `p`. Parcels that would
    /// land beyond the row's last column go into the last column. When a
    /// maturity rule is supplied, the maturing share of each parcel is kept
    /// in a second row instead.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if the row reaches past
    /// the groups covered by the kernel.
    pub fn redistribute<T, F>(
        &self,
        row: &BandRow<T>,
        age: u32,
        maturity: Option<&dyn MaturityRule>,
        mut moved: F,
    ) -> Result<(BandRow<T>, Option<BandRow<T>>), MatrixError>
    where
        T: BandValue,
        F: FnMut(&T, usize, usize, f64) -> T,
    {
        let (lo, hi) = row.bounds();
        if hi > self.groups() {
            return Err(MatrixError::IncompatibleRange {
                reason: format!(
                    "growth transition covers {} length groups, age {age} reaches {hi}",
                    self.groups()
                ),
            });
        }
        let fill = T::default();
        let mut grown = BandRow::filled(lo, hi, &fill);
        let mut mature = maturity.map(|_| BandRow::filled(lo, hi, &fill));
        let last = hi.saturating_sub(1);

        for (l, value) in row.iter() {
            if !value.is_populated() {
                continue;
            }
            for (jump, &p) in self.row(l).iter().enumerate() {
                if p <= 0.0 {
                    continue;
                }
                let dest = l.saturating_add(jump).min(last);
                let parcel = moved(value, l, dest, p);
                let share = maturity.map_or(0.0, |rule| {
                    rule.maturing_share(age, dest, jump).clamp(0.0, 1.0)
                });
                if let Some(slot) = grown.get_mut(dest) {
                    slot.merge_scaled(&parcel, 1.0 - share);
                }
                if share > 0.0 {
                    if let Some(slot) = mature.as_mut().and_then(|m| m.get_mut(dest)) {
                        slot.merge_scaled(&parcel, share);
                    }
                }
            }
        }
        Ok((grown, mature))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn deterministic_split_preserves_mean() {
        let k = GrowthTransition::deterministic(&[0.0, 1.25, 7.0, -2.0], 3);
        assert_eq!(k.row(0), &[1.0]);
        assert!(close(k.row(1)[1], 0.75));
        assert!(close(k.row(1)[2], 0.25));
        assert!(close(k.expected_jump(1), 1.25));
        assert!(close(k.expected_jump(2), 3.0));
        assert!(close(k.expected_jump(3), 0.0));
    }

    #[test]
    fn beta_binomial_has_requested_mean() {
        let k = GrowthTransition::beta_binomial(&[0.0, 1.5, 2.9, 4.0], 20.0, 4);
        for l in 0..4 {
            assert!(close(k.row(l).iter().sum::<f64>(), 1.0));
        }
        assert!(close(k.expected_jump(0), 0.0));
        assert!(close(k.expected_jump(1), 1.5));
        assert!(close(k.expected_jump(2), 2.9));
        assert!(close(k.expected_jump(3), 4.0));
    }

    #[test]
    fn redistribute_clamps_into_last_column() {
        let row = BandRow::from_values(0, vec![10.0, 0.0, 0.0]);
        let k = GrowthTransition::deterministic(&[5.0, 0.0, 0.0], 5);
        let (grown, mature) = k
            .redistribute(&row, 1, None, |v: &f64, _, _, p| v * p)
            .unwrap();
        assert!(mature.is_none());
        assert!(close(*grown.get(2).unwrap(), 10.0));
    }

    #[test]
    fn redistribute_splits_off_maturing_share() {
        let row = BandRow::from_values(0, vec![10.0, 0.0]);
        let k = GrowthTransition::deterministic(&[1.0, 0.0], 1);
        let rule = |_: u32, l: usize, _: usize| if l == 1 { 0.4 } else { 0.0 };
        let (grown, mature) = k
            .redistribute(&row, 3, Some(&rule), |v: &f64, _, _, p| v * p)
            .unwrap();
        let mature = mature.unwrap();
        assert!(close(*grown.get(1).unwrap(), 6.0));
        assert!(close(*mature.get(1).unwrap(), 4.0));
    }

    #[test]
    fn redistribute_rejects_short_kernel() {
        let row = BandRow::from_values(0, vec![1.0, 1.0, 1.0]);
        let k = GrowthTransition::identity(2);
        assert!(k.redistribute(&row, 0, None, |v: &f64, _, _, p| v * p).is_err());
    }
}
