//! Strided memory layouts.
//!
//! A [`Layout`] maps a logical N-dimensional index onto an offset into a flat
//! storage slice. Views that reverse, slice, or transpose a buffer only
//! rewrite the layout; the storage itself is never touched.

use std::ops::Range;

use crate::error::ShapeError;

/// Shape, element strides and starting offset of a buffer over flat storage.
///
/// Strides are counted in elements, not bytes, and may be negative (a
/// reversed axis walks storage backwards).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
}

impl Layout {
    /// Creates a row-major (C-contiguous) layout for the given shape.
    pub fn standard(shape: &[usize]) -> Self {
        let mut strides = vec![0isize; shape.len()];
        let mut step = 1isize;
        for axis in (0..shape.len()).rev() {
            strides[axis] = step;
            step *= shape[axis].max(1) as isize;
        }
        Self {
            shape: shape.to_vec(),
            strides,
            offset: 0,
        }
    }

    /// Returns the extent of each axis.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element stride of each axis.
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Returns the storage offset of the first logical element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of logical elements. A rank-0 layout holds one.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns `true` if the layout holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if logical order equals storage order with no gaps.
    ///
    /// Axes of length one are ignored, matching the usual contiguity rules
    /// for row-major arrays. Empty layouts are always standard.
    pub fn is_standard(&self) -> bool {
        if self.is_empty() {
            return true;
        }
        let mut expected = 1isize;
        for axis in (0..self.ndim()).rev() {
            let len = self.shape[axis];
            if len != 1 && self.strides[axis] != expected {
                return false;
            }
            expected *= len as isize;
        }
        true
    }

    /// Returns the storage range spanned by this layout, or `None` if it
    /// would reach before the start of storage.
    pub fn span(&self) -> Option<Range<usize>> {
        if self.is_empty() {
            return Some(self.offset..self.offset);
        }
        let mut low = self.offset as isize;
        let mut high = self.offset as isize;
        for (&len, &stride) in self.shape.iter().zip(&self.strides) {
            let reach = (len as isize - 1) * stride;
            if reach < 0 {
                low += reach;
            } else {
                high += reach;
            }
        }
        if low < 0 {
            return None;
        }
        Some(low as usize..high as usize + 1)
    }

    /// Maps a logical index to a storage offset.
    ///
    /// Returns `None` if the index has the wrong rank or any component is
    /// out of bounds.
    pub fn offset_of(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.ndim() {
            return None;
        }
        let mut pos = self.offset as isize;
        for ((&i, &len), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= len {
                return None;
            }
            pos += i as isize * stride;
        }
        Some(pos as usize)
    }

    /// Iterates storage offsets in logical row-major order.
    pub fn offsets(&self) -> Offsets<'_> {
        Offsets {
            layout: self,
            index: vec![0; self.ndim()],
            remaining: self.len(),
        }
    }

    /// Returns a layout walking `axis` in the opposite direction.
    pub fn reversed(&self, axis: usize) -> Result<Self, ShapeError> {
        self.check_axis(axis)?;
        let mut out = self.clone();
        let len = self.shape[axis];
        if len > 0 {
            let start = self.offset as isize + (len as isize - 1) * self.strides[axis];
            out.offset = start as usize;
        }
        out.strides[axis] = -self.strides[axis];
        Ok(out)
    }

    /// Returns the layout of rows `range` along axis 0.
    pub fn sliced(&self, range: Range<usize>) -> Result<Self, ShapeError> {
        if self.ndim() == 0 {
            return Err(ShapeError::ZeroRank);
        }
        let len = self.shape[0];
        if range.start > range.end || range.end > len {
            return Err(ShapeError::IndexOutOfBounds {
                index: range.end.max(range.start),
                len,
            });
        }
        let mut out = self.clone();
        out.shape[0] = range.end - range.start;
        if range.start < len {
            out.offset = (self.offset as isize + range.start as isize * self.strides[0]) as usize;
        }
        Ok(out)
    }

    /// Returns the layout of a single row along axis 0, dropping that axis.
    pub fn row(&self, index: usize) -> Result<Self, ShapeError> {
        if self.ndim() == 0 {
            return Err(ShapeError::ZeroRank);
        }
        let len = self.shape[0];
        if index >= len {
            return Err(ShapeError::IndexOutOfBounds { index, len });
        }
        Ok(Self {
            shape: self.shape[1..].to_vec(),
            strides: self.strides[1..].to_vec(),
            offset: (self.offset as isize + index as isize * self.strides[0]) as usize,
        })
    }

    /// Returns a layout with axes `a` and `b` exchanged.
    pub fn swapped(&self, a: usize, b: usize) -> Result<Self, ShapeError> {
        self.check_axis(a)?;
        self.check_axis(b)?;
        let mut out = self.clone();
        out.shape.swap(a, b);
        out.strides.swap(a, b);
        Ok(out)
    }

    fn check_axis(&self, axis: usize) -> Result<(), ShapeError> {
        if axis >= self.ndim() {
            return Err(ShapeError::AxisOutOfBounds {
                axis,
                ndim: self.ndim(),
            });
        }
        Ok(())
    }
}

/// Iterator over storage offsets of a [`Layout`] in logical order.
pub struct Offsets<'a> {
    layout: &'a Layout,
    index: Vec<usize>,
    remaining: usize,
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut pos = self.layout.offset as isize;
        for (&i, &stride) in self.index.iter().zip(&self.layout.strides) {
            pos += i as isize * stride;
        }

        // Odometer increment, last axis fastest.
        for axis in (0..self.index.len()).rev() {
            self.index[axis] += 1;
            if self.index[axis] < self.layout.shape[axis] {
                break;
            }
            self.index[axis] = 0;
        }

        Some(pos as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets<'_> {}
