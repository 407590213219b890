//! Error types for mat-core operations.
//!
//! Most buffer operations follow the "empty result on failure" convention:
//! a failed allocation or a shape mismatch leaves the [`Mat`](crate::Mat) in
//! the empty state instead of returning an error. [`MatError`] is used at the
//! boundaries where a caller hands data in or asks for data out, and by
//! allocators that need to report cache-maintenance failures.
//!
//! # Usage
//!
//! ```rust
//! use mat_core::{Extent, Mat, MatError};
//!
//! let err = Mat::from_slice(Extent::d2(4, 4), &[0.0f32; 3]).unwrap_err();
//! assert!(err.is_shape_error());
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - derive for `std::error::Error` and `Display`
//!
//! # Used By
//!
//! - [`crate::Mat::from_slice`], [`crate::Mat::to_vec`]
//! - [`crate::memory::Allocator`] - `flush` / `invalidate`
//! - `mat-gpu` - wrapped by `DeviceError::Core`

use thiserror::Error;

use crate::format::DataType;

/// Result type alias using [`MatError`].
pub type Result<T> = std::result::Result<T, MatError>;

/// Errors produced by mat-core.
#[derive(Debug, Error)]
pub enum MatError {
    /// Memory allocation failed.
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
    },

    /// Two buffers disagree on extents.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape description
        got: String,
    },

    /// Slice length does not match the element count of the shape.
    #[error("length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch {
        /// Expected element count
        expected: usize,
        /// Provided element count
        got: usize,
    },

    /// Element type tag disagrees with the requested scalar type.
    #[error("type mismatch: buffer is {expected:?}, requested {got:?}")]
    TypeMismatch {
        /// Type tag stored on the buffer
        expected: DataType,
        /// Type requested by the caller
        got: DataType,
    },

    /// Element type is not supported by the operation.
    #[error("unsupported element type: {0:?}")]
    UnsupportedType(DataType),

    /// Operation requires a non-empty buffer.
    #[error("buffer is empty")]
    EmptyMat,

    /// Device-side failure reported by an allocator.
    #[error("device error: {0}")]
    Device(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl MatError {
    /// Creates an allocation failure error.
    pub fn alloc(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// Creates a shape mismatch error from two displayable shapes.
    pub fn shape_mismatch(expected: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Returns true for errors caused by mismatched shapes or lengths.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. } | Self::LengthMismatch { .. })
    }

    /// Returns true if this is an allocation failure.
    pub fn is_alloc_error(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }
}
