//! Errors raised while constructing, reshaping or updating buffers.

/// A buffer operation was rejected before any element was written.
///
/// Most variants describe a shape, index or axis that does not fit the
/// buffer's layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// The number of supplied elements does not match the requested shape.
    #[error("shape {shape:?} needs {expected} elements, got {actual}")]
    LengthMismatch {
        /// The requested shape.
        shape: Vec<usize>,
        /// Number of elements implied by the shape.
        expected: usize,
        /// Number of elements actually supplied.
        actual: usize,
    },

    /// The source of an assignment has a different shape than the target.
    #[error("cannot assign shape {source_shape:?} into shape {target_shape:?}")]
    IncompatibleShape {
        /// Shape of the region being written.
        target_shape: Vec<usize>,
        /// Shape of the values being written.
        source_shape: Vec<usize>,
    },

    /// An axis number is not smaller than the buffer's rank.
    #[error("axis {axis} out of bounds for rank {ndim}")]
    AxisOutOfBounds {
        /// The offending axis.
        axis: usize,
        /// Rank of the buffer.
        ndim: usize,
    },

    /// An index or range falls outside an axis.
    #[error("index {index} out of bounds for axis of length {len}")]
    IndexOutOfBounds {
        /// The offending index (or range end).
        index: usize,
        /// Length of the axis.
        len: usize,
    },

    /// An index has a different number of components than the buffer has axes.
    #[error("index of rank {actual} used on buffer of rank {expected}")]
    RankMismatch {
        /// Rank of the buffer.
        expected: usize,
        /// Number of index components supplied.
        actual: usize,
    },

    /// The buffer has rank zero where at least one axis is required.
    #[error("operation requires at least one axis")]
    ZeroRank,

    /// An integer buffer was divided by zero.
    #[error("integer division by zero")]
    DivisionByZero,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_mismatch_display() {
        let err = ShapeError::LengthMismatch {
            shape: vec![2, 3],
            expected: 6,
            actual: 5,
        };
        assert_eq!(err.to_string(), "shape [2, 3] needs 6 elements, got 5");
    }

    #[test]
    fn incompatible_shape_display() {
        let err = ShapeError::IncompatibleShape {
            target_shape: vec![10, 3],
            source_shape: vec![3, 10],
        };
        let msg = err.to_string();
        assert!(msg.contains("[3, 10]"));
        assert!(msg.contains("[10, 3]"));
    }

    #[test]
    fn axis_display() {
        let err = ShapeError::AxisOutOfBounds { axis: 2, ndim: 2 };
        assert_eq!(err.to_string(), "axis 2 out of bounds for rank 2");
    }

    #[test]
    fn division_by_zero_display() {
        assert_eq!(ShapeError::DivisionByZero.to_string(), "integer division by zero");
    }
}
