//! Ragged two-dimensional storage.
//!
//! A [`BandedMatrix`] keeps one [`BandRow`] per row key, starting at
//! `min_row`. Each row holds a contiguous run of columns beginning at its
//! own offset, so age groups that only ever span part of the length axis do
//! not pay for the columns they never use. Addressing a row or column
//! outside the allocated band is an [`MatrixError::OutOfBand`] error.
//!
//! Values that live in a band implement [`BandValue`], which supplies the
//! merge rule used by aging, addition and column sums.

use serde::{Deserialize, Serialize};
use shoal_types::{ConversionIndex, PopulationCell, is_negligible};

use crate::error::MatrixError;

/// Behaviour required of values stored in merging band operations.
pub trait BandValue: Clone + Default {
    /// Returns `true` when the value carries a non-negligible amount.
    fn is_populated(&self) -> bool;

    /// Merge `other`, scaled by `ratio`, into this value.
    fn merge_scaled(&mut self, other: &Self, ratio: f64);
}

impl BandValue for f64 {
    fn is_populated(&self) -> bool {
        !is_negligible(*self)
    }

    fn merge_scaled(&mut self, other: &Self, ratio: f64) {
        *self += other * ratio;
    }
}

impl BandValue for PopulationCell {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }

    fn merge_scaled(&mut self, other: &Self, ratio: f64) {
        Self::merge_scaled(self, *other, ratio);
    }
}

/// Convert a group count into a float divisor.
#[allow(clippy::cast_precision_loss)]
pub(crate) const fn count_as_f64(count: usize) -> f64 {
    count as f64
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One row of a banded matrix: a column offset and the values from there on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRow<T> {
    offset: usize,
    values: Vec<T>,
}

impl<T: Clone> BandRow<T> {
    /// Row covering `[min_col, max_col)` with every cell set to `fill`.
    pub fn filled(min_col: usize, max_col: usize, fill: &T) -> Self {
        Self {
            offset: min_col,
            values: vec![fill.clone(); max_col.saturating_sub(min_col)],
        }
    }

    /// Row starting at `offset` holding `values`.
    pub const fn from_values(offset: usize, values: Vec<T>) -> Self {
        Self { offset, values }
    }

    /// First column of the row.
    pub const fn min_col(&self) -> usize {
        self.offset
    }

    /// One past the last column of the row.
    pub fn max_col(&self) -> usize {
        self.offset.saturating_add(self.values.len())
    }

    /// Column range of the row as `(min_col, max_col)`.
    pub fn bounds(&self) -> (usize, usize) {
        (self.min_col(), self.max_col())
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when the row holds no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` when `col` lies inside the row.
    pub fn contains(&self, col: usize) -> bool {
        col >= self.offset && col < self.max_col()
    }

    /// Value at `col`, if inside the row.
    pub fn get(&self, col: usize) -> Option<&T> {
        self.values.get(col.checked_sub(self.offset)?)
    }

    /// Mutable value at `col`, if inside the row.
    pub fn get_mut(&mut self, col: usize) -> Option<&mut T> {
        self.values.get_mut(col.checked_sub(self.offset)?)
    }

    /// The stored values, starting at [`Self::min_col`].
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Mutable access to the stored values.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        (self.offset..).zip(self.values.iter())
    }

    /// Iterate mutably over `(column, value)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        (self.offset..).zip(self.values.iter_mut())
    }

    /// Replace the row storage with `[min_col, max_col)`, copying values in
    /// the overlapping columns. Old columns outside the new range are
    /// dropped and new columns take `fill`.
    pub fn reshape(&mut self, min_col: usize, max_col: usize, fill: &T) {
        let values = (min_col..max_col)
            .map(|col| self.get(col).cloned().unwrap_or_else(|| fill.clone()))
            .collect();
        self.offset = min_col;
        self.values = values;
    }

    /// Grow the row so that it also covers `[min_col, max_col)`.
    pub fn widen(&mut self, min_col: usize, max_col: usize, fill: &T) {
        if min_col >= max_col {
            return;
        }
        if self.is_empty() {
            *self = Self::filled(min_col, max_col, fill);
            return;
        }
        let lo = self.offset.min(min_col);
        let hi = self.max_col().max(max_col);
        if lo != self.offset || hi != self.max_col() {
            self.reshape(lo, hi, fill);
        }
    }
}

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// Ragged matrix with rows keyed from `min_row`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandedMatrix<T> {
    min_row: u32,
    rows: Vec<BandRow<T>>,
}

impl<T: Clone> BandedMatrix<T> {
    /// Build a matrix whose row `min_row + i` covers `bounds[i]`, with every
    /// cell set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if a row has its upper
    /// column bound below its lower bound.
    pub fn new(min_row: u32, bounds: &[(usize, usize)], fill: &T) -> Result<Self, MatrixError> {
        let rows = bounds
            .iter()
            .map(|&(lo, hi)| {
                if hi < lo {
                    Err(MatrixError::IncompatibleRange {
                        reason: format!("row bounds [{lo}, {hi}) are reversed"),
                    })
                } else {
                    Ok(BandRow::filled(lo, hi, fill))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { min_row, rows })
    }

    /// Matrix with no rows.
    pub const fn empty(min_row: u32) -> Self {
        Self {
            min_row,
            rows: Vec::new(),
        }
    }

    /// Key of the first row.
    pub const fn min_row(&self) -> u32 {
        self.min_row
    }

    /// Key of the last row, or `None` when the matrix has no rows.
    pub fn max_row(&self) -> Option<u32> {
        let extra = u32::try_from(self.rows.len().checked_sub(1)?).ok()?;
        self.min_row.checked_add(extra)
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Change the key of the first row, relabelling every row.
    pub const fn set_min_row(&mut self, min_row: u32) {
        self.min_row = min_row;
    }

    fn index_of(&self, row: u32) -> Option<usize> {
        let index = usize::try_from(row.checked_sub(self.min_row)?).ok()?;
        (index < self.rows.len()).then_some(index)
    }

    /// Returns `true` when a row with key `row` exists.
    pub fn contains_row(&self, row: u32) -> bool {
        self.index_of(row).is_some()
    }

    /// Row with key `row`.
    pub fn row(&self, row: u32) -> Result<&BandRow<T>, MatrixError> {
        self.index_of(row)
            .and_then(|i| self.rows.get(i))
            .ok_or(MatrixError::OutOfBand { row, col: 0 })
    }

    /// Mutable row with key `row`.
    pub fn row_mut(&mut self, row: u32) -> Result<&mut BandRow<T>, MatrixError> {
        let index = self.index_of(row);
        index
            .and_then(|i| self.rows.get_mut(i))
            .ok_or(MatrixError::OutOfBand { row, col: 0 })
    }

    /// First column of row `row`.
    pub fn min_col(&self, row: u32) -> Result<usize, MatrixError> {
        self.row(row).map(BandRow::min_col)
    }

    /// One past the last column of row `row`.
    pub fn max_col(&self, row: u32) -> Result<usize, MatrixError> {
        self.row(row).map(BandRow::max_col)
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: u32, col: usize) -> Result<&T, MatrixError> {
        self.row(row)?
            .get(col)
            .ok_or(MatrixError::OutOfBand { row, col })
    }

    /// Mutable value at `(row, col)`.
    pub fn get_mut(&mut self, row: u32, col: usize) -> Result<&mut T, MatrixError> {
        self.row_mut(row)?
            .get_mut(col)
            .ok_or(MatrixError::OutOfBand { row, col })
    }

    /// Overwrite the value at `(row, col)`.
    pub fn set(&mut self, row: u32, col: usize, value: T) -> Result<(), MatrixError> {
        *self.get_mut(row, col)? = value;
        Ok(())
    }

    /// Iterate over `(row key, row)` pairs in key order.
    pub fn rows(&self) -> impl Iterator<Item = (u32, &BandRow<T>)> + '_ {
        (self.min_row..).zip(self.rows.iter())
    }

    /// Iterate mutably over `(row key, row)` pairs in key order.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = (u32, &mut BandRow<T>)> + '_ {
        (self.min_row..).zip(self.rows.iter_mut())
    }

    /// Column bounds of every row, in key order.
    pub fn bounds(&self) -> Vec<(usize, usize)> {
        self.rows.iter().map(BandRow::bounds).collect()
    }

    /// Append a row covering `[min_col, max_col)` and return its key.
    pub fn append_row(&mut self, min_col: usize, max_col: usize, fill: &T) -> Option<u32> {
        self.rows.push(BandRow::filled(min_col, max_col, fill));
        self.max_row()
    }

    /// Replace the storage of row `row` with `[min_col, max_col)`, keeping
    /// values in the overlapping columns.
    pub fn reshape_row(
        &mut self,
        row: u32,
        min_col: usize,
        max_col: usize,
        fill: &T,
    ) -> Result<(), MatrixError> {
        self.row_mut(row)?.reshape(min_col, max_col, fill);
        Ok(())
    }

    /// Remove row `row`. Rows with higher keys move down by one key.
    pub fn delete_row(&mut self, row: u32) -> Result<BandRow<T>, MatrixError> {
        let index = self
            .index_of(row)
            .ok_or(MatrixError::OutOfBand { row, col: 0 })?;
        Ok(self.rows.remove(index))
    }

    /// Build a matrix of the same shape with every value produced by `f`.
    pub fn map<U, F>(&self, mut f: F) -> BandedMatrix<U>
    where
        F: FnMut(&T) -> U,
    {
        BandedMatrix {
            min_row: self.min_row,
            rows: self
                .rows
                .iter()
                .map(|row| BandRow { offset: row.offset, values: row.values.iter().map(&mut f).collect() })
                .collect(),
        }
    }
}

impl<T: BandValue> BandedMatrix<T> {
    /// Merge every row into one flat vector indexed by column.
    pub fn col_sum(&self) -> Vec<T> {
        let width = self.rows.iter().map(BandRow::max_col).max().unwrap_or(0);
        let mut out = vec![T::default(); width];
        for row in &self.rows {
            for (col, value) in row.iter() {
                if let Some(slot) = out.get_mut(col) {
                    slot.merge_scaled(value, 1.0);
                }
            }
        }
        out
    }

    /// Merge `other` into this matrix over the rows and columns both share.
    pub fn add_overlap(&mut self, other: &Self) {
        for (key, source) in other.rows() {
            let Ok(target) = self.row_mut(key) else {
                continue;
            };
            for (col, value) in source.iter() {
                if let Some(slot) = target.get_mut(col) {
                    slot.merge_scaled(value, 1.0);
                }
            }
        }
    }

    /// Reset every value to its default.
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.values.fill(T::default());
        }
    }

    /// Shift every row one key up.
    ///
    /// The second-highest row merges into the highest (plus group), and the
    /// lowest row becomes empty with its original bounds. A row receiving
    /// values is widened so that no column of the incoming row is lost.
    /// A matrix with fewer than two rows is left unchanged.
    pub fn shift_rows_up(&mut self) {
        let count = self.rows.len();
        if count < 2 {
            return;
        }
        let original = self.bounds();
        let fill = T::default();

        if let Some((oldest, rest)) = self.rows.split_last_mut() {
            if let Some(below) = rest.last() {
                oldest.widen(below.min_col(), below.max_col(), &fill);
                for (col, value) in below.iter() {
                    if let Some(slot) = oldest.get_mut(col) {
                        slot.merge_scaled(value, 1.0);
                    }
                }
            }
        }

        let younger = count.saturating_sub(1);
        if let Some(head) = self.rows.get_mut(..younger) {
            head.rotate_right(1);
        }
        for (i, row) in self.rows.iter_mut().enumerate().take(younger) {
            let (lo, hi) = original.get(i).copied().unwrap_or_else(|| row.bounds());
            if i == 0 {
                *row = BandRow::filled(lo, hi, &fill);
            } else {
                row.widen(lo, hi, &fill);
            }
        }
    }

    /// Merge `other`, expressed on another length division, into this
    /// matrix for row keys in `[min_row, max_row]`.
    ///
    /// Every value is scaled by `ratio`. When the target division is finer,
    /// a source column is split evenly across the target columns it covers.
    /// Target rows are widened to receive every mapped column. A window that
    /// shares no rows with both matrices is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::IncompatibleRange`] if a populated source
    /// column has no counterpart in the target division. Nothing is merged
    /// in that case.
    pub fn add_converted(
        &mut self,
        other: &Self,
        ci: &ConversionIndex,
        ratio: f64,
        min_row: u32,
        max_row: u32,
    ) -> Result<(), MatrixError> {
        let (Some(own_top), Some(other_top)) = (self.max_row(), other.max_row()) else {
            return Ok(());
        };
        let lo = min_row.max(self.min_row).max(other.min_row);
        let hi = max_row.min(own_top).min(other_top);
        if lo > hi {
            return Ok(());
        }

        for key in lo..=hi {
            for (col, value) in other.row(key)?.iter() {
                let covered = if ci.target_is_finer() {
                    ci.nrof(col) > 0
                } else {
                    ci.pos(col).is_some()
                };
                if !covered && value.is_populated() {
                    return Err(MatrixError::IncompatibleRange {
                        reason: format!(
                            "row {key} column {col} has no counterpart in the target division"
                        ),
                    });
                }
            }
        }

        let fill = T::default();
        for key in lo..=hi {
            let source = other.row(key)?;
            let target = self.row_mut(key)?;
            // (target column, source column, split factor)
            let mapping: Vec<(usize, usize, f64)> = if ci.target_is_finer() {
                (ci.min_fine()..ci.max_fine())
                    .filter_map(|l| {
                        let src = ci.pos(l)?;
                        source
                            .contains(src)
                            .then(|| (l, src, 1.0 / count_as_f64(ci.nrof(src).max(1))))
                    })
                    .collect()
            } else {
                source
                    .iter()
                    .filter_map(|(col, _)| ci.pos(col).map(|to| (to, col, 1.0)))
                    .collect()
            };
            let first = mapping.iter().map(|m| m.0).min();
            let last = mapping.iter().map(|m| m.0).max();
            if let (Some(first), Some(last)) = (first, last) {
                target.widen(first, last.saturating_add(1), &fill);
            }
            for (to, from, split) in mapping {
                if let (Some(slot), Some(value)) = (target.get_mut(to), source.get(from)) {
                    slot.merge_scaled(value, ratio * split);
                }
            }
        }
        Ok(())
    }
}

impl BandedMatrix<f64> {
    /// Build a banded matrix from dense rows, trimming leading and trailing
    /// zeros from each row. An all-zero row becomes an empty row.
    pub fn from_dense_trimmed(min_row: u32, dense: &[Vec<f64>]) -> Self {
        let rows = dense
            .iter()
            .map(|values| {
                let first = values.iter().position(|v| !is_negligible(*v));
                let last = values.iter().rposition(|v| !is_negligible(*v));
                match (first, last) {
                    (Some(first), Some(last)) => BandRow::from_values(
                        first,
                        values.get(first..=last).map(<[f64]>::to_vec).unwrap_or_default(),
                    ),
                    _ => BandRow::from_values(0, Vec::new()),
                }
            })
            .collect();
        Self { min_row, rows }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use shoal_types::LengthGroupDivision;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sample() -> BandedMatrix<f64> {
        let mut m = BandedMatrix::new(2, &[(0, 3), (1, 4), (2, 5)], &0.0).unwrap();
        for (key, row) in m.rows_mut() {
            for (col, v) in row.iter_mut() {
                *v = f64::from(key) * 10.0 + f64::from(u32::try_from(col).unwrap());
            }
        }
        m
    }

    #[test]
    fn get_outside_band_is_out_of_band() {
        let m = sample();
        assert!(close(*m.get(3, 2).unwrap(), 32.0));
        assert!(matches!(m.get(3, 0), Err(MatrixError::OutOfBand { row: 3, col: 0 })));
        assert!(matches!(m.get(5, 2), Err(MatrixError::OutOfBand { row: 5, .. })));
        assert!(matches!(m.get(1, 1), Err(MatrixError::OutOfBand { row: 1, .. })));
        assert_eq!(m.max_row(), Some(4));
    }

    #[test]
    fn reshape_keeps_overlap_and_fills_new_columns() {
        let mut m = sample();
        m.reshape_row(3, 2, 6, &-1.0).unwrap();
        assert_eq!(m.min_col(3).unwrap(), 2);
        assert_eq!(m.max_col(3).unwrap(), 6);
        assert!(close(*m.get(3, 3).unwrap(), 33.0));
        assert!(close(*m.get(3, 5).unwrap(), -1.0));
        assert!(m.get(3, 1).is_err());
    }

    #[test]
    fn append_and_delete_rows() {
        let mut m = sample();
        assert_eq!(m.append_row(4, 6, &0.0), Some(5));
        let removed = m.delete_row(3).unwrap();
        assert_eq!(removed.bounds(), (1, 4));
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.min_col(3).unwrap(), 2);
        assert_eq!(m.min_col(4).unwrap(), 4);
    }

    #[test]
    fn col_sum_accumulates_rows() {
        let m = BandedMatrix::new(0, &[(0, 2), (1, 3)], &1.0).unwrap();
        let sums = m.col_sum();
        assert_eq!(sums.len(), 3);
        assert!(close(sums[0], 1.0));
        assert!(close(sums[1], 2.0));
        assert!(close(sums[2], 1.0));
    }

    #[test]
    fn add_overlap_ignores_disjoint_cells() {
        let mut a = BandedMatrix::new(0, &[(0, 2)], &1.0).unwrap();
        let b = BandedMatrix::new(0, &[(1, 3), (0, 1)], &2.0).unwrap();
        a.add_overlap(&b);
        assert!(close(*a.get(0, 0).unwrap(), 1.0));
        assert!(close(*a.get(0, 1).unwrap(), 3.0));
        assert_eq!(a.num_rows(), 1);
    }

    #[test]
    fn dense_rows_are_trimmed() {
        let m = BandedMatrix::from_dense_trimmed(
            0,
            &[vec![0.0, 0.5, 1.0, 0.0], vec![0.0, 0.0, 0.0, 0.0]],
        );
        assert_eq!(m.row(0).unwrap().bounds(), (1, 3));
        assert!(m.row(1).unwrap().is_empty());
    }

    #[test]
    fn shift_rows_up_builds_plus_group() {
        let mut m = BandedMatrix::new(1, &[(0, 2), (0, 3), (1, 3)], &0.0).unwrap();
        *m.get_mut(1, 0).unwrap() = 5.0;
        *m.get_mut(2, 0).unwrap() = 7.0;
        *m.get_mut(3, 2).unwrap() = 11.0;
        m.shift_rows_up();
        assert!(close(m.row(1).unwrap().values().iter().sum::<f64>(), 0.0));
        assert!(close(*m.get(2, 0).unwrap(), 5.0));
        // Plus group widened to take column 0 from the row below.
        assert!(close(*m.get(3, 0).unwrap(), 7.0));
        assert!(close(*m.get(3, 2).unwrap(), 11.0));
    }

    #[test]
    fn single_row_shift_is_noop() {
        let mut m = BandedMatrix::new(0, &[(0, 2)], &3.0).unwrap();
        m.shift_rows_up();
        assert!(close(*m.get(0, 1).unwrap(), 3.0));
    }

    #[test]
    fn add_converted_coarsens_and_refines() {
        let fine = LengthGroupDivision::uniform(0.0, 4.0, 1.0).unwrap();
        let coarse = LengthGroupDivision::uniform(0.0, 4.0, 2.0).unwrap();

        let source = BandedMatrix::new(0, &[(0, 4)], &1.0).unwrap();
        let mut target = BandedMatrix::new(0, &[(0, 1)], &0.0).unwrap();
        let ci = ConversionIndex::new(&fine, &coarse).unwrap();
        target.add_converted(&source, &ci, 0.5, 0, 0).unwrap();
        assert!(close(*target.get(0, 0).unwrap(), 1.0));
        assert!(close(*target.get(0, 1).unwrap(), 1.0));

        let mut back = BandedMatrix::new(0, &[(0, 4)], &0.0).unwrap();
        let ci = ConversionIndex::new(&coarse, &fine).unwrap();
        back.add_converted(&target, &ci, 1.0, 0, 0).unwrap();
        assert!(close(back.row(0).unwrap().values().iter().sum::<f64>(), 2.0));
        assert!(close(*back.get(0, 3).unwrap(), 0.5));
    }

    #[test]
    fn add_converted_disjoint_window_is_noop() {
        let div = LengthGroupDivision::uniform(0.0, 2.0, 1.0).unwrap();
        let ci = ConversionIndex::new(&div, &div).unwrap();
        let source = BandedMatrix::new(5, &[(0, 2)], &1.0).unwrap();
        let mut target = BandedMatrix::new(1, &[(0, 2)], &0.0).unwrap();
        target.add_converted(&source, &ci, 1.0, 0, 10).unwrap();
        assert!(close(target.col_sum().iter().sum::<f64>(), 0.0));
    }

    #[test]
    fn add_converted_rejects_uncovered_population() {
        let wide = LengthGroupDivision::uniform(0.0, 4.0, 1.0).unwrap();
        let narrow = LengthGroupDivision::uniform(0.0, 2.0, 1.0).unwrap();
        let ci = ConversionIndex::new(&wide, &narrow).unwrap();
        let source = BandedMatrix::new(0, &[(0, 4)], &1.0).unwrap();
        let mut target = BandedMatrix::new(0, &[(0, 2)], &0.0).unwrap();
        let result = target.add_converted(&source, &ci, 1.0, 0, 0);
        assert!(matches!(result, Err(MatrixError::IncompatibleRange { .. })));
        assert!(close(*target.get(0, 0).unwrap(), 0.0));
    }
}
