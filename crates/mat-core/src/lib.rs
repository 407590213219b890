//! # mat-core
//!
//! Reference-counted, multi-dimensional numeric buffer for media pipelines.
//!
//! A [`Mat`] carries image frames, audio blocks and tensors between CPU
//! code and GPU kernels. It is a cheap-to-copy handle: copies alias the same
//! storage, views address sub-ranges of it, and the memory is returned to
//! its [`Allocator`] when the last handle drops.
//!
//! - [`Mat`] - host buffer: creation, views, reshape, deep copies
//! - [`Shape`], [`Extent`] - geometry and the channel-plane stride rule
//! - [`MatMeta`] - type, color, timing and flag tags
//! - [`MatShape`] - accessors shared with device buffers (`mat-gpu`)
//! - [`Allocator`], [`HostBlock`] - pluggable memory
//! - [`fp16`] - half / bfloat16 bit conversions
//!
//! ## Crate Structure
//!
//! ```text
//! mat-core (this crate)
//!    ^
//!    |
//!    +-- mat-gpu (device buffers, mapped transfers)
//! ```
//!
//! ## Configuration
//!
//! See [`MatConfig`] for the `MAT_*` environment variables controlling
//! allocation alignment and kernel threading.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod draw;
pub mod error;
pub mod format;
pub mod fp16;
pub mod mat;
pub mod memory;
pub mod meta;
pub mod ops;
pub mod parallel;
pub mod scalar;
pub mod shape;

// Re-exports for convenience
pub use config::MatConfig;
pub use draw::{Pixel, Point};
pub use error::{MatError, Result};
pub use format::*;
pub use mat::Mat;
pub use memory::{
    align_size, AlignedBuffer, Allocation, Allocator, DefaultAllocator, HostBlock, SharedAllocator,
};
pub use meta::{MatMeta, MatShape};
pub use scalar::Element;
pub use shape::{plane_stride, Extent, Shape};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use mat_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::MatConfig;
    pub use crate::draw::{Pixel, Point};
    pub use crate::error::{MatError, Result};
    pub use crate::format::{
        ColorFormat, ColorRange, ColorSpace, DataType, Device, InterpolateMode, MatFlags,
        Ordination, Rational,
    };
    pub use crate::mat::Mat;
    pub use crate::memory::{Allocator, DefaultAllocator, SharedAllocator};
    pub use crate::meta::{MatMeta, MatShape};
    pub use crate::scalar::Element;
    pub use crate::shape::{Extent, Shape};
}
