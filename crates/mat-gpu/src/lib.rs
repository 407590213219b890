//! # mat-gpu
//!
//! Device-memory variants of [`mat_core::Mat`].
//!
//! A device buffer has the same shape and metadata contract as a host
//! buffer, so filter code can be written against [`MatShape`] regardless of
//! where the bytes live. Storage comes from an injected [`DeviceAllocator`]
//! which owns the memory policy (pooling, residency, coherency); this crate
//! only tracks ownership and exposes opaque handles for the pipeline layer.
//!
//! # Architecture
//!
//! ```text
//! DeviceMat<K: DeviceKind>
//!     ├── VkMat       = DeviceMat<LinearBuffer>  (buffer handle + offset)
//!     └── VkImageMat  = DeviceMat<OpaqueImage>   (image + image view)
//!             │
//!             └── DeviceAllocator (trait)
//!                     └── HostMemoryAllocator (host-backed reference impl)
//!
//! TransferQueue (trait)
//!     └── MappedTransfer  (upload/download through mapped memory)
//! ```
//!
//! # Example
//!
//! ```rust
//! use mat_gpu::prelude::*;
//!
//! let alloc = HostMemoryAllocator::shared(0, true);
//! let mut host = Mat::new_type(Extent::d3(8, 8, 4), DataType::Float32);
//! host.fill(0.5);
//!
//! let queue = MappedTransfer::new(alloc);
//! let dev: VkMat = queue.upload(&host).unwrap();
//! assert_eq!(dev.device(), Device::Vulkan);
//!
//! let back = queue.download(&dev).unwrap();
//! assert_eq!(back.at_3d::<f32>(7, 7, 3), 0.5);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod allocator;
pub mod device_mat;
pub mod host_allocator;
pub mod transfer;

pub use allocator::{
    BufferHandle, DeviceAllocator, DeviceMemory, ExtentDesc, ImageHandle, ImageViewHandle,
    MemoryBinding, SharedDeviceAllocator,
};
pub use device_mat::{DeviceKind, DeviceMat, LinearBuffer, OpaqueImage, VkImageMat, VkMat};
pub use host_allocator::HostMemoryAllocator;
pub use transfer::{MappedTransfer, TransferQueue};

use mat_core::MatError;
use thiserror::Error;

/// Device buffer errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device allocator returned no memory.
    #[error("device allocation failed: {0}")]
    AllocationFailed(String),

    /// The memory is not host-visible.
    #[error("memory is not host-mappable")]
    NotMappable,

    /// Operation on a buffer without storage.
    #[error("operation on an empty buffer")]
    EmptyMat,

    /// Source and destination layouts differ.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected layout.
        expected: String,
        /// Actual layout.
        got: String,
    },

    /// A flush or invalidate call failed.
    #[error("cache coherency operation failed: {0}")]
    Coherency(String),

    /// Error from the host buffer layer.
    #[error(transparent)]
    Core(#[from] MatError),
}

impl DeviceError {
    /// Creates an allocation failure error.
    pub fn alloc(msg: impl Into<String>) -> Self {
        Self::AllocationFailed(msg.into())
    }

    /// Creates a coherency error.
    pub fn coherency(msg: impl Into<String>) -> Self {
        Self::Coherency(msg.into())
    }

    /// Returns true if this is an allocation failure.
    pub fn is_alloc_error(&self) -> bool {
        matches!(self, Self::AllocationFailed(_))
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Prelude module for convenient imports.
///
/// Re-exports the host prelude as well.
pub mod prelude {
    pub use crate::allocator::{DeviceAllocator, DeviceMemory, ExtentDesc, SharedDeviceAllocator};
    pub use crate::device_mat::{DeviceKind, DeviceMat, VkImageMat, VkMat};
    pub use crate::host_allocator::HostMemoryAllocator;
    pub use crate::transfer::{MappedTransfer, TransferQueue};
    pub use crate::{DeviceError, DeviceResult};
    pub use mat_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_core() {
        let err: DeviceError = MatError::EmptyMat.into();
        assert!(matches!(err, DeviceError::Core(MatError::EmptyMat)));
        assert!(!err.is_alloc_error());
        assert!(DeviceError::alloc("out of memory").is_alloc_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(DeviceError::NotMappable.to_string(), "memory is not host-mappable");
        assert_eq!(
            DeviceError::coherency("flush").to_string(),
            "cache coherency operation failed: flush"
        );
    }
}
