//! Error types for the gapfill crate.
//!
//! Shape and configuration problems are rejected eagerly at construction or at
//! the first forward call; nothing is silently coerced.

use thiserror::Error;

/// Unified error type for kernel and model operations.
#[derive(Debug, Error)]
pub enum GapfillError {
    /// Configuration rejected at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Two lengths that must agree do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// An array has the wrong shape for its role.
    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which input or output is malformed.
        what: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A group index refers past the declared group count.
    #[error("group index {index} out of range for {groups} groups")]
    IndexOutOfRange {
        /// Offending index value.
        index: usize,
        /// Declared group count.
        groups: usize,
    },

    /// Underlying array layout/reshape failure.
    #[error("array layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    /// Numeric failure inside a cell implementation (non-finite state,
    /// singular normalisation). The kernels themselves never produce this.
    #[error("numerical error: {0}")]
    Numerical(String),
}

/// Convenience result type for gapfill operations.
pub type Result<T> = std::result::Result<T, GapfillError>;
