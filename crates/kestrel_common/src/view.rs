//! Borrowed, read-only views over buffer storage.

use std::fmt;
use std::ops::Range;

use crate::dtype::{DType, Element};
use crate::error::ShapeError;
use crate::layout::Layout;

/// A read-only window onto typed storage through a [`Layout`].
///
/// Views never copy and never mutate: reversing, slicing, or taking a row
/// produces another view over the same storage.
#[derive(Clone)]
pub struct ArrayView<'a, T> {
    data: &'a [T],
    layout: Layout,
}

impl<'a, T: Element> ArrayView<'a, T> {
    /// Creates a view, checking that every element of `layout` lies inside
    /// `data`.
    pub fn from_parts(data: &'a [T], layout: Layout) -> Result<Self, ShapeError> {
        if let Some(span) = layout.span() {
            if layout.is_empty() || span.end <= data.len() {
                return Ok(Self { data, layout });
            }
            return Err(ShapeError::IndexOutOfBounds {
                index: span.end - 1,
                len: data.len(),
            });
        }
        Err(ShapeError::IndexOutOfBounds {
            index: 0,
            len: data.len(),
        })
    }

    /// Creates a one-dimensional view of a slice.
    pub fn from_slice(data: &'a [T]) -> Self {
        Self {
            data,
            layout: Layout::standard(&[data.len()]),
        }
    }

    /// Returns the layout of this view.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the extent of each axis.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of axes.
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Returns the number of logical elements.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Returns `true` if the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Returns the element type.
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Returns the element at a logical index.
    pub fn get(&self, index: &[usize]) -> Option<T> {
        self.layout.offset_of(index).map(|off| self.data[off])
    }

    /// Iterates elements in logical row-major order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.layout.offsets().map(move |off| self.data[off])
    }

    /// Copies the elements into a vector in logical order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Returns the backing storage as one slice when the view is standard
    /// (row-major, gap-free), which is the precondition for hashing straight
    /// from memory.
    pub fn as_standard_slice(&self) -> Option<&'a [T]> {
        if !self.layout.is_standard() {
            return None;
        }
        let start = self.layout.offset();
        Some(&self.data[start..start + self.layout.len()])
    }

    /// Returns a view with `axis` reversed.
    pub fn reversed(&self, axis: usize) -> Result<Self, ShapeError> {
        Ok(Self {
            data: self.data,
            layout: self.layout.reversed(axis)?,
        })
    }

    /// Returns a view of rows `range` along axis 0.
    pub fn slice(&self, range: Range<usize>) -> Result<Self, ShapeError> {
        Ok(Self {
            data: self.data,
            layout: self.layout.sliced(range)?,
        })
    }

    /// Returns a view of row `index` along axis 0.
    pub fn row(&self, index: usize) -> Result<Self, ShapeError> {
        Ok(Self {
            data: self.data,
            layout: self.layout.row(index)?,
        })
    }

    /// Returns a view with axes `a` and `b` exchanged.
    pub fn swapped(&self, a: usize, b: usize) -> Result<Self, ShapeError> {
        Ok(Self {
            data: self.data,
            layout: self.layout.swapped(a, b)?,
        })
    }
}

impl<T: Element> PartialEq for ArrayView<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.iter().eq(other.iter())
    }
}

impl<T: Element> fmt::Debug for ArrayView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape())
            .field("data", &self.to_vec())
            .finish()
    }
}
