//! Shared, indexable storage for fixed-width integer records.
//!
//! A [`StateArray`] is a view over a reference-counted buffer. It has a list
//! of leading dims (empty for a single record) and the ordered record
//! indices it covers. Indexing never copies: every view produced by
//! [`StateArray::index`], [`StateArray::slice`], [`StateArray::select`] or
//! [`StateArray::at`] writes through to the same buffer as its parent, and
//! the buffer lives as long as the longest-lived view.

use std::{cell::RefCell, fmt, ops::Range, rc::Rc};

use crate::error::{Error, Result};

pub(crate) type SharedBuffer = Rc<RefCell<Vec<i32>>>;

/// Field values read from a view: one value for a scalar view, or one per
/// record, in batch order, for a batch view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Values<T> {
    Scalar(T),
    Batch(Vec<T>),
}

impl<T> Values<T> {
    /// The single value of a scalar read, or `None` for a batch.
    pub fn scalar(self) -> Option<T> {
        match self {
            Values::Scalar(v) => Some(v),
            Values::Batch(_) => None,
        }
    }

    /// All values in batch order; a scalar read becomes a one-element vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Values::Scalar(v) => vec![v],
            Values::Batch(v) => v,
        }
    }

    /// Whether this came from a scalar view.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Values::Scalar(_))
    }

    pub(crate) fn map<U>(self, mut f: impl FnMut(T) -> U) -> Values<U> {
        match self {
            Values::Scalar(v) => Values::Scalar(f(v)),
            Values::Batch(v) => Values::Batch(v.into_iter().map(f).collect()),
        }
    }

    pub(crate) fn try_map<U>(self, mut f: impl FnMut(T) -> Result<U>) -> Result<Values<U>> {
        Ok(match self {
            Values::Scalar(v) => Values::Scalar(f(v)?),
            Values::Batch(v) => Values::Batch(v.into_iter().map(f).collect::<Result<_>>()?),
        })
    }
}

/// A view of `dims` records of `width` integers each.
#[derive(Clone)]
pub struct StateArray {
    buffer: SharedBuffer,
    width: usize,
    dims: Vec<usize>,
    records: Rc<[usize]>,
}

impl StateArray {
    /// Allocates a zero-filled array of shape `dims + (width,)`.
    pub fn zeros(dims: &[usize], width: usize) -> Self {
        let count: usize = dims.iter().product();
        StateArray {
            buffer: Rc::new(RefCell::new(vec![0; count * width])),
            width,
            dims: dims.to_vec(),
            records: (0..count).collect(),
        }
    }

    /// Width of one record (the trailing axis).
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Leading dims of this view; empty for a single record.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Full shape including the trailing record axis.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = self.dims.clone();
        shape.push(self.width);
        shape
    }

    /// Whether this view is a single record with no leading dims.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of records covered by this view.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the view covers no records, e.g. an empty slice.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Buffer positions of the covered records, in view order.
    ///
    /// Side tables kept parallel to the buffer are indexed by these.
    pub(crate) fn record_ids(&self) -> &[usize] {
        &self.records
    }

    fn stride(&self) -> usize {
        self.dims[1..].iter().product()
    }

    fn first_axis(&self, index: usize) -> Result<usize> {
        match self.dims.first() {
            Some(&len) if index < len => Ok(len),
            Some(&len) => Err(Error::IndexOutOfRange { index, len }),
            None => Err(Error::IndexOutOfRange { index, len: 0 }),
        }
    }

    /// Selects one entry along the first axis.
    ///
    /// The result drops that axis, so indexing a 1-D batch yields a scalar view.
    pub fn index(&self, index: usize) -> Result<StateArray> {
        self.first_axis(index)?;
        let stride = self.stride();
        Ok(StateArray {
            buffer: Rc::clone(&self.buffer),
            width: self.width,
            dims: self.dims[1..].to_vec(),
            records: self.records[index * stride..(index + 1) * stride].into(),
        })
    }

    /// Selects a contiguous run along the first axis.
    ///
    /// A scalar view has no axis to slice and always fails.
    pub fn slice(&self, range: Range<usize>) -> Result<StateArray> {
        let Some(&len) = self.dims.first() else {
            return Err(Error::IndexOutOfRange {
                index: range.end,
                len: 0,
            });
        };
        if range.start > range.end || range.end > len {
            return Err(Error::IndexOutOfRange {
                index: range.end,
                len,
            });
        }
        let stride = self.stride();
        let mut dims = self.dims.clone();
        dims[0] = range.len();
        Ok(StateArray {
            buffer: Rc::clone(&self.buffer),
            width: self.width,
            dims,
            records: self.records[range.start * stride..range.end * stride].into(),
        })
    }

    /// Selects the records where `mask` is true, flattening to one axis.
    pub fn select(&self, mask: &[bool]) -> Result<StateArray> {
        if mask.len() != self.len() {
            return Err(Error::shape(self.len(), mask.len()));
        }
        let records: Rc<[usize]> = self
            .records
            .iter()
            .zip(mask)
            .filter_map(|(&r, &keep)| keep.then_some(r))
            .collect();
        Ok(StateArray {
            buffer: Rc::clone(&self.buffer),
            width: self.width,
            dims: vec![records.len()],
            records,
        })
    }

    /// Selects a single record by its full coordinate.
    pub fn at(&self, coords: &[usize]) -> Result<StateArray> {
        if coords.len() != self.dims.len() {
            return Err(Error::shape(self.dims.len(), coords.len()));
        }
        coords
            .iter()
            .try_fold(self.clone(), |view, &i| view.index(i))
    }

    pub(crate) fn get(&self, pos: usize, offset: usize) -> i32 {
        self.buffer.borrow()[self.records[pos] * self.width + offset]
    }

    pub(crate) fn set(&self, pos: usize, offset: usize, value: i32) {
        self.buffer.borrow_mut()[self.records[pos] * self.width + offset] = value;
    }

    /// Reads field `offset` as a scalar or batch value, matching this view.
    pub(crate) fn field(&self, offset: usize) -> Values<i32> {
        if self.is_scalar() {
            Values::Scalar(self.get(0, offset))
        } else {
            Values::Batch(self.read(offset))
        }
    }

    /// Reads field `offset` of every record.
    pub(crate) fn read(&self, offset: usize) -> Vec<i32> {
        let buffer = self.buffer.borrow();
        self.records
            .iter()
            .map(|&r| buffer[r * self.width + offset])
            .collect()
    }

    /// Writes `value` into field `offset` of every record.
    pub(crate) fn fill(&self, offset: usize, value: i32) {
        let mut buffer = self.buffer.borrow_mut();
        for &r in self.records.iter() {
            buffer[r * self.width + offset] = value;
        }
    }

    /// Writes one value per record into field `offset`.
    pub(crate) fn write(&self, offset: usize, values: &[i32]) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::shape(self.len(), values.len()));
        }
        let mut buffer = self.buffer.borrow_mut();
        for (&r, &v) in self.records.iter().zip(values) {
            buffer[r * self.width + offset] = v;
        }
        Ok(())
    }

    /// Copies `range` of every record's trailing axis into a plain array.
    ///
    /// The result is no longer a record view: it has `range.len()` values per
    /// record and does not alias the buffer.
    pub fn column(&self, range: Range<usize>) -> Vec<i32> {
        let buffer = self.buffer.borrow();
        self.records
            .iter()
            .flat_map(|&r| buffer[r * self.width + range.start..r * self.width + range.end].to_vec())
            .collect()
    }

    /// Copies out the record at view position `pos`.
    pub fn record(&self, pos: usize) -> Vec<i32> {
        self.column_of(pos, 0..self.width)
    }

    pub(crate) fn column_of(&self, pos: usize, range: Range<usize>) -> Vec<i32> {
        let start = self.records[pos] * self.width;
        self.buffer.borrow()[start + range.start..start + range.end].to_vec()
    }

    /// Writes `values` into `range` of the record at view position `pos`.
    pub(crate) fn write_range(&self, pos: usize, start: usize, values: &[i32]) {
        let base = self.records[pos] * self.width + start;
        self.buffer.borrow_mut()[base..base + values.len()].copy_from_slice(values);
    }

    /// Broadcasts one record into every record of the view.
    pub(crate) fn fill_records(&self, record: &[i32]) -> Result<()> {
        if record.len() != self.width {
            return Err(Error::shape(self.width, record.len()));
        }
        let mut buffer = self.buffer.borrow_mut();
        for &r in self.records.iter() {
            buffer[r * self.width..(r + 1) * self.width].copy_from_slice(record);
        }
        Ok(())
    }

    /// Copies every covered record, in view order, into a flat vector.
    pub fn to_vec(&self) -> Vec<i32> {
        self.column(0..self.width)
    }

    /// Returns an owned copy that no longer aliases this view's buffer.
    pub fn copy(&self) -> StateArray {
        StateArray {
            buffer: Rc::new(RefCell::new(self.to_vec())),
            width: self.width,
            dims: self.dims.clone(),
            records: (0..self.len()).collect(),
        }
    }

    /// Whether both views write through to the same buffer.
    pub fn shares_storage(&self, other: &StateArray) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl PartialEq for StateArray {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.to_vec() == other.to_vec()
    }
}

impl Eq for StateArray {}

impl fmt::Debug for StateArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateArray")
            .field("shape", &self.shape())
            .field("data", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_view_writes_through() {
        let batch = StateArray::zeros(&[3], 2);
        let second = batch.index(1).unwrap();
        assert!(second.is_scalar());
        second.set(0, 1, 7);
        assert_eq!(batch.read(1), vec![0, 7, 0]);

        batch.fill(0, 4);
        assert_eq!(second.get(0, 0), 4);
        assert!(second.shares_storage(&batch));
    }

    #[test]
    fn nested_indexing_follows_row_major_order() {
        let grid = StateArray::zeros(&[3, 2], 1);
        let cell = grid.at(&[2, 1]).unwrap();
        cell.set(0, 0, 9);
        assert_eq!(grid.to_vec(), vec![0, 0, 0, 0, 0, 9]);
        assert_eq!(grid.index(2).unwrap().dims(), &[2]);
        assert!(grid.at(&[3, 0]).is_err());
        assert!(grid.at(&[0]).is_err());
    }

    #[test]
    fn slices_and_masks_share_storage() {
        let batch = StateArray::zeros(&[4], 1);
        let tail = batch.slice(2..4).unwrap();
        tail.fill(0, 1);
        assert_eq!(batch.read(0), vec![0, 0, 1, 1]);

        let picked = batch.select(&[true, false, false, true]).unwrap();
        assert_eq!(picked.dims(), &[2]);
        picked.write(0, &[5, 6]).unwrap();
        assert_eq!(batch.read(0), vec![5, 0, 1, 6]);

        assert_eq!(
            batch.select(&[true]).unwrap_err(),
            Error::ShapeMismatch { expected: 4, actual: 1 }
        );
        assert!(batch.slice(3..5).is_err());
    }

    #[test]
    fn scalar_views_cannot_be_sliced() {
        let single = StateArray::zeros(&[], 4);
        assert_eq!(
            single.slice(0..0).unwrap_err(),
            Error::IndexOutOfRange { index: 0, len: 0 }
        );
        assert!(single.index(0).is_err());

        let cell = StateArray::zeros(&[2], 4).index(1).unwrap();
        assert!(cell.slice(0..1).is_err());
    }

    #[test]
    fn out_of_range_indices_report_axis_length() {
        let batch = StateArray::zeros(&[3, 2], 1);
        assert_eq!(
            batch.index(3).unwrap_err(),
            Error::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(
            batch.slice(1..4).unwrap_err(),
            Error::IndexOutOfRange { index: 4, len: 3 }
        );
        assert_eq!(batch.slice(2..2).unwrap().len(), 0);
    }

    #[test]
    fn copy_detaches() {
        let batch = StateArray::zeros(&[2], 3);
        let detached = batch.index(0).unwrap().copy();
        detached.set(0, 0, 1);
        assert_eq!(batch.to_vec(), vec![0; 6]);
        assert!(!detached.shares_storage(&batch));
        assert_eq!(detached.record(0), vec![1, 0, 0]);
    }

    #[test]
    fn column_is_a_plain_copy() {
        let batch = StateArray::zeros(&[2], 3);
        batch.write_range(1, 1, &[4, 5]);
        assert_eq!(batch.column(1..3), vec![0, 0, 4, 5]);
        assert_eq!(batch.write(0, &[1]), Err(Error::shape(2, 1)));
    }

    #[test]
    fn values_helpers() {
        assert_eq!(Values::Scalar(3).scalar(), Some(3));
        assert_eq!(Values::Batch(vec![1, 2]).scalar(), None);
        assert_eq!(Values::Scalar(1).map(|v| v + 1).into_vec(), vec![2]);
    }
}
