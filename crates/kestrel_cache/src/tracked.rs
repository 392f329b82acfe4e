//! Mutation-observing wrappers around numeric buffers.
//!
//! A [`TrackedArray`] owns its storage and exposes mutation only through
//! methods and compound-assignment operators that flag the array dirty
//! before touching a value. Reading the fingerprint of a clean array is a
//! memo lookup; reading it after a mutation rehashes once.
//!
//! Views, slices, reversals and selections borrow or copy the data and can
//! never dirty the array they came from.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::ops::{AddAssign, DivAssign, MulAssign, Range, SubAssign};

use kestrel_common::{hash, ArrayView, DType, Element, Fingerprint, HashStrategy, Layout, Numeric, ShapeError};

/// Memoized digests of the current contents.
#[derive(Debug, Clone, Copy, Default)]
struct Memo {
    fingerprint: Option<Fingerprint>,
    digest: Option<Fingerprint>,
}

/// An owned, strided numeric buffer with a dirty flag and memoized
/// fingerprint.
///
/// The memo lives in a [`Cell`] so fingerprints can be read through a shared
/// reference. As a consequence a `TrackedArray` is not `Sync`; callers that
/// share one across threads must wrap it in their own lock.
#[derive(Clone)]
pub struct TrackedArray<T: Element> {
    data: Vec<T>,
    layout: Layout,
    strategy: HashStrategy,
    dirty: Cell<bool>,
    memo: Cell<Memo>,
}

impl<T: Element> TrackedArray<T> {
    /// Creates a one-dimensional array.
    pub fn new(data: Vec<T>) -> Self {
        let layout = Layout::standard(&[data.len()]);
        Self::from_layout(data, layout)
    }

    /// Creates an array of the given shape from row-major data.
    pub fn from_shape(shape: &[usize], data: Vec<T>) -> Result<Self, ShapeError> {
        let layout = Layout::standard(shape);
        if layout.len() != data.len() {
            return Err(ShapeError::LengthMismatch {
                shape: shape.to_vec(),
                expected: layout.len(),
                actual: data.len(),
            });
        }
        Ok(Self::from_layout(data, layout))
    }

    /// Creates an `(n, N)` array from fixed-width rows.
    pub fn from_rows<const N: usize>(rows: &[[T; N]]) -> Self {
        let data: Vec<T> = rows.iter().flatten().copied().collect();
        Self::from_layout(data, Layout::standard(&[rows.len(), N]))
    }

    /// Creates a zero-filled array of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let layout = Layout::standard(shape);
        let data = vec![<T as bytemuck::Zeroable>::zeroed(); layout.len()];
        Self::from_layout(data, layout)
    }

    /// Copies a view into a new, independent, row-major array.
    pub fn from_view(view: &ArrayView<'_, T>) -> Self {
        Self::from_layout(view.to_vec(), Layout::standard(view.shape()))
    }

    fn from_layout(data: Vec<T>, layout: Layout) -> Self {
        Self {
            data,
            layout,
            strategy: HashStrategy::default(),
            dirty: Cell::new(true),
            memo: Cell::new(Memo::default()),
        }
    }

    /// Sets the fingerprint strategy, builder style.
    pub fn with_strategy(mut self, strategy: HashStrategy) -> Self {
        self.set_strategy(strategy);
        self
    }

    /// Returns the fingerprint strategy.
    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    /// Changes the fingerprint strategy. The memo is discarded.
    pub fn set_strategy(&mut self, strategy: HashStrategy) {
        if self.strategy != strategy {
            self.strategy = strategy;
            self.mark_dirty();
        }
    }

    // ---------------------------------------------------------------------
    // Change tracking
    // ---------------------------------------------------------------------

    /// Returns `true` if the contents may have changed since the fingerprint
    /// was last read.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Flags the contents as possibly changed.
    ///
    /// Every mutating method calls this before writing. Writing a value equal
    /// to the one already stored still counts as a mutation.
    pub fn mark_dirty(&mut self) {
        self.dirty.set(true);
    }

    /// Drops stale memo slots if dirty and returns what remains.
    fn settle(&self) -> Memo {
        if self.dirty.replace(false) {
            self.memo.set(Memo::default());
        }
        self.memo.get()
    }

    /// Returns the fingerprint of the current contents under the array's
    /// strategy, rehashing only if the array is dirty.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut memo = self.settle();
        if let Some(fp) = memo.fingerprint {
            return fp;
        }
        let fp = hash::fingerprint(&self.view(), self.strategy);
        memo.fingerprint = Some(fp);
        self.memo.set(memo);
        fp
    }

    /// Returns the SHA-256 digest of the current contents, for content
    /// addressing across independently built arrays.
    pub fn content_digest(&self) -> Fingerprint {
        if self.strategy == HashStrategy::Sha256 {
            return self.fingerprint();
        }
        let mut memo = self.settle();
        if let Some(digest) = memo.digest {
            return digest;
        }
        let digest = hash::sha256(&self.view());
        memo.digest = Some(digest);
        self.memo.set(memo);
        digest
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Returns the element type.
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Returns the extent of each axis.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of axes.
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Returns `true` if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Returns the current memory layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns a read-only view of the whole array.
    pub fn view(&self) -> ArrayView<'_, T> {
        // Every constructor and layout rewrite keeps the layout inside `data`.
        ArrayView::from_parts(&self.data, self.layout.clone())
            .unwrap_or_else(|_| ArrayView::from_slice(&[]))
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

    /// Returns a view of rows `range` along axis 0.
    pub fn slice(&self, range: Range<usize>) -> Result<ArrayView<'_, T>, ShapeError> {
        self.view().slice(range)
    }

    /// Returns a view of row `index` along axis 0.
    pub fn row(&self, index: usize) -> Result<ArrayView<'_, T>, ShapeError> {
        self.view().row(index)
    }

    /// Returns a view with `axis` reversed.
    pub fn reversed(&self, axis: usize) -> Result<ArrayView<'_, T>, ShapeError> {
        self.view().reversed(axis)
    }

    /// Gathers rows along axis 0 into a new, independent array.
    pub fn select(&self, indices: &[usize]) -> Result<Self, ShapeError> {
        if self.ndim() == 0 {
            return Err(ShapeError::ZeroRank);
        }
        let mut shape = self.shape().to_vec();
        shape[0] = indices.len();
        let row_len: usize = shape[1..].iter().product();
        let mut data = Vec::with_capacity(indices.len() * row_len);
        for &i in indices {
            let row = self.layout.row(i)?;
            data.extend(row.offsets().map(|off| self.data[off]));
        }
        let mut out = Self::from_layout(data, Layout::standard(&shape));
        out.strategy = self.strategy;
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    fn locate(&self, index: &[usize]) -> Result<usize, ShapeError> {
        if index.len() != self.ndim() {
            return Err(ShapeError::RankMismatch {
                expected: self.ndim(),
                actual: index.len(),
            });
        }
        for (&i, &len) in index.iter().zip(self.shape()) {
            if i >= len {
                return Err(ShapeError::IndexOutOfBounds { index: i, len });
            }
        }
        self.layout
            .offset_of(index)
            .ok_or(ShapeError::RankMismatch {
                expected: self.ndim(),
                actual: index.len(),
            })
    }

    /// Visits every element in logical order with its logical position.
    fn apply_logical(&mut self, mut f: impl FnMut(usize, &mut T)) {
        self.mark_dirty();
        let data = &mut self.data;
        for (k, off) in self.layout.offsets().enumerate() {
            f(k, &mut data[off]);
        }
    }

    fn broadcast_last_axis(
        &mut self,
        rhs: &[T],
        mut f: impl FnMut(&mut T, T),
    ) -> Result<(), ShapeError> {
        let width = self.shape().last().copied().unwrap_or(1);
        if rhs.len() != width {
            return Err(ShapeError::IncompatibleShape {
                target_shape: vec![width],
                source_shape: vec![rhs.len()],
            });
        }
        self.apply_logical(|k, x| f(x, rhs[k % width]));
        Ok(())
    }

    /// Writes one element.
    pub fn set(&mut self, index: &[usize], value: T) -> Result<(), ShapeError> {
        let off = self.locate(index)?;
        self.mark_dirty();
        self.data[off] = value;
        Ok(())
    }

    /// Returns a mutable reference to one element, flagging the array dirty.
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        let off = self.layout.offset_of(index)?;
        self.mark_dirty();
        Some(&mut self.data[off])
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.apply_logical(|_, x| *x = value);
    }

    /// Sets every element of rows `range` (along axis 0) to `value`.
    pub fn fill_slice(&mut self, range: Range<usize>, value: T) -> Result<(), ShapeError> {
        let region = self.layout.sliced(range)?;
        self.mark_dirty();
        for off in region.offsets() {
            self.data[off] = value;
        }
        Ok(())
    }

    /// Overwrites rows `range` (along axis 0) with the contents of `source`.
    ///
    /// `source` must have exactly the shape of the selected rows. It cannot
    /// borrow from `self`; copy first with [`TrackedArray::from_view`].
    pub fn assign_slice(
        &mut self,
        range: Range<usize>,
        source: &ArrayView<'_, T>,
    ) -> Result<(), ShapeError> {
        let region = self.layout.sliced(range)?;
        if region.shape() != source.shape() {
            return Err(ShapeError::IncompatibleShape {
                target_shape: region.shape().to_vec(),
                source_shape: source.shape().to_vec(),
            });
        }
        self.mark_dirty();
        for (off, value) in region.offsets().zip(source.iter()) {
            self.data[off] = value;
        }
        Ok(())
    }

    /// Replaces every element with `f(element)`.
    pub fn map_inplace(&mut self, mut f: impl FnMut(T) -> T) {
        self.apply_logical(|_, x| *x = f(*x));
    }

    /// Calls `f` on each row along axis 0 and writes the row back.
    ///
    /// Rows are handed over as contiguous scratch slices, so this works for
    /// any layout.
    pub fn map_rows_inplace(&mut self, mut f: impl FnMut(&mut [T])) -> Result<(), ShapeError> {
        if self.ndim() == 0 {
            return Err(ShapeError::ZeroRank);
        }
        self.mark_dirty();
        let mut scratch = Vec::new();
        for i in 0..self.shape()[0] {
            let row = self.layout.row(i)?;
            scratch.clear();
            scratch.extend(row.offsets().map(|off| self.data[off]));
            f(&mut scratch);
            for (off, &value) in row.offsets().zip(scratch.iter()) {
                self.data[off] = value;
            }
        }
        Ok(())
    }

    /// Swaps in entirely new contents.
    pub fn replace(&mut self, shape: &[usize], data: Vec<T>) -> Result<(), ShapeError> {
        let layout = Layout::standard(shape);
        if layout.len() != data.len() {
            return Err(ShapeError::LengthMismatch {
                shape: shape.to_vec(),
                expected: layout.len(),
                actual: data.len(),
            });
        }
        self.mark_dirty();
        self.data = data;
        self.layout = layout;
        Ok(())
    }

    /// Transposes two axes in place by rewriting the layout. Storage is left
    /// untouched, so the array usually stops being row-major.
    pub fn swap_axes(&mut self, a: usize, b: usize) -> Result<(), ShapeError> {
        let layout = self.layout.swapped(a, b)?;
        self.mark_dirty();
        self.layout = layout;
        Ok(())
    }

    /// Rewrites storage into compact row-major order without changing any
    /// logical value.
    pub fn standardize(&mut self) {
        self.mark_dirty();
        if self.layout.is_standard() && self.layout.offset() == 0 && self.data.len() == self.len() {
            return;
        }
        self.data = self.to_vec();
        self.layout = Layout::standard(&self.layout.shape().to_vec());
    }

    /// Divides every element by `rhs`.
    ///
    /// Integer arrays reject a zero divisor before any element is written.
    pub fn try_div_assign(&mut self, rhs: T) -> Result<(), ShapeError>
    where
        T: Numeric,
    {
        check_divisors(&[rhs])?;
        self.apply_logical(|_, x| *x = x.div(rhs));
        Ok(())
    }

    /// Divides every element by `rhs` broadcast along the last axis.
    pub fn try_div_assign_slice(&mut self, rhs: &[T]) -> Result<(), ShapeError>
    where
        T: Numeric,
    {
        check_divisors(rhs)?;
        self.broadcast_last_axis(rhs, |x, r| *x = x.div(r))
    }

    /// Floor-divides every element by `rhs`.
    ///
    /// Integer arrays reject a zero divisor before any element is written.
    pub fn floor_div_assign(&mut self, rhs: T) -> Result<(), ShapeError>
    where
        T: Numeric,
    {
        check_divisors(&[rhs])?;
        self.apply_logical(|_, x| *x = x.floor_div(rhs));
        Ok(())
    }

    /// Floor-divides every element by `rhs` broadcast along the last axis.
    pub fn floor_div_assign_slice(&mut self, rhs: &[T]) -> Result<(), ShapeError>
    where
        T: Numeric,
    {
        check_divisors(rhs)?;
        self.broadcast_last_axis(rhs, |x, r| *x = x.floor_div(r))
    }
}

fn check_divisors<T: Numeric>(rhs: &[T]) -> Result<(), ShapeError> {
    if rhs.iter().any(|r| r.is_zero_divisor()) {
        return Err(ShapeError::DivisionByZero);
    }
    Ok(())
}

// Integer element types wrap on overflow.
macro_rules! impl_compound_assign {
    ($($op:ident :: $method:ident => $apply:ident),* $(,)?) => {
        $(
            impl<T: Numeric> $op<T> for TrackedArray<T> {
                fn $method(&mut self, rhs: T) {
                    self.apply_logical(|_, x| *x = x.$apply(rhs));
                }
            }

            /// Broadcasts `rhs` along the last axis.
            ///
            /// # Panics
            ///
            /// Panics if `rhs.len()` differs from the length of the last axis.
            impl<T: Numeric> $op<&[T]> for TrackedArray<T> {
                fn $method(&mut self, rhs: &[T]) {
                    if let Err(err) = self.broadcast_last_axis(rhs, |x, r| *x = x.$apply(r)) {
                        panic!("cannot broadcast: {err}");
                    }
                }
            }
        )*
    };
}

impl_compound_assign! {
    AddAssign::add_assign => add,
    SubAssign::sub_assign => sub,
    MulAssign::mul_assign => mul,
}

/// # Panics
///
/// Panics if an integer array is divided by zero. Nothing is written in
/// that case; use [`TrackedArray::try_div_assign`] to get an error instead.
impl<T: Numeric> DivAssign<T> for TrackedArray<T> {
    fn div_assign(&mut self, rhs: T) {
        if let Err(err) = self.try_div_assign(rhs) {
            panic!("{err}");
        }
    }
}

/// Broadcasts `rhs` along the last axis.
///
/// # Panics
///
/// Panics if `rhs.len()` differs from the length of the last axis, or if an
/// integer array is divided by zero. Nothing is written in either case.
impl<T: Numeric> DivAssign<&[T]> for TrackedArray<T> {
    fn div_assign(&mut self, rhs: &[T]) {
        if let Err(err) = self.try_div_assign_slice(rhs) {
            panic!("cannot broadcast: {err}");
        }
    }
}

impl<T: Element> From<Vec<T>> for TrackedArray<T> {
    fn from(data: Vec<T>) -> Self {
        Self::new(data)
    }
}

impl<T: Element> PartialEq for TrackedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.iter().eq(other.iter())
    }
}

impl<T: Element> fmt::Debug for TrackedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedArray")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape())
            .field("strategy", &self.strategy)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a tracked container, as held by a data store.
pub trait TrackedBuffer: fmt::Debug {
    /// Fingerprint under the container's strategy.
    fn fingerprint(&self) -> Fingerprint;

    /// SHA-256 digest of the contents.
    fn content_digest(&self) -> Fingerprint;

    /// Whether the contents may have changed since the last fingerprint read.
    fn is_dirty(&self) -> bool;

    /// Element type.
    fn dtype(&self) -> DType;

    /// Extent of each axis.
    fn shape(&self) -> &[usize];

    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether the container holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current fingerprint strategy.
    fn strategy(&self) -> HashStrategy;

    /// Changes the fingerprint strategy.
    fn set_strategy(&mut self, strategy: HashStrategy);

    /// Clones into a new box.
    fn clone_boxed(&self) -> Box<dyn TrackedBuffer>;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Element> TrackedBuffer for TrackedArray<T> {
    fn fingerprint(&self) -> Fingerprint {
        TrackedArray::fingerprint(self)
    }

    fn content_digest(&self) -> Fingerprint {
        TrackedArray::content_digest(self)
    }

    fn is_dirty(&self) -> bool {
        TrackedArray::is_dirty(self)
    }

    fn dtype(&self) -> DType {
        T::DTYPE
    }

    fn shape(&self) -> &[usize] {
        TrackedArray::shape(self)
    }

    fn len(&self) -> usize {
        TrackedArray::len(self)
    }

    fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    fn set_strategy(&mut self, strategy: HashStrategy) {
        TrackedArray::set_strategy(self, strategy);
    }

    fn clone_boxed(&self) -> Box<dyn TrackedBuffer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
