//! Device allocator capability and the memory handles it produces.
//!
//! Device memory is requested by extents (`w`, `h`, `c`, `elemsize`,
//! `elempack`) rather than a byte count, so the allocator can pick a buffer
//! or image layout. What comes back is a [`DeviceMemory`]: an opaque binding
//! for the pipeline layer plus an optional host mapping.
//!
//! # Used By
//!
//! - [`crate::DeviceMat`] - owns one `DeviceMemory` per shared block
//! - [`crate::HostMemoryAllocator`] - reference implementation

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use mat_core::{align_size, plane_stride, Device, Shape};

use crate::DeviceResult;

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Returns true for the null handle.
            pub const fn is_null(&self) -> bool {
                self.0 == 0
            }
        }
    };
}

handle!(
    /// Opaque device buffer identifier.
    BufferHandle
);
handle!(
    /// Opaque device image identifier.
    ImageHandle
);
handle!(
    /// Opaque image view identifier.
    ImageViewHandle
);

/// Extents and element description of a device allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtentDesc {
    /// Rank (1..=3).
    pub dims: u32,
    /// Width.
    pub w: usize,
    /// Height.
    pub h: usize,
    /// Channels.
    pub c: usize,
    /// Bytes per scalar.
    pub elemsize: usize,
    /// Interleaving factor.
    pub elempack: usize,
}

impl ExtentDesc {
    /// Describes the storage needed for `shape`.
    pub const fn from_shape(shape: &Shape) -> Self {
        Self {
            dims: shape.dims,
            w: shape.w,
            h: shape.h,
            c: shape.c,
            elemsize: shape.elemsize,
            elempack: shape.elempack,
        }
    }

    /// Bytes needed, channel plane padding included, rounded up to 4.
    pub const fn byte_size(&self) -> usize {
        let cstep = match self.dims {
            1 => self.w,
            2 => self.w * self.h,
            _ => plane_stride(self.w, self.h, self.elemsize),
        };
        align_size(cstep * self.c * self.elemsize, 4)
    }
}

/// How the pipeline layer binds a piece of device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBinding {
    /// Linear buffer region.
    Buffer {
        /// Buffer object.
        buffer: BufferHandle,
        /// Byte offset of the region inside the buffer.
        offset: usize,
    },
    /// Image with a default view.
    Image {
        /// Image object.
        image: ImageHandle,
        /// View over the whole image.
        view: ImageViewHandle,
    },
}

/// One device allocation.
///
/// The handles are owned by the allocator that produced them and stay valid
/// until it is given back through [`DeviceAllocator::free`].
pub struct DeviceMemory {
    /// Pipeline binding.
    pub binding: MemoryBinding,
    /// Bytes available from `bind_offset` on.
    pub capacity: usize,
    /// Host mapping of the underlying memory, if host-visible.
    pub mapped_ptr: Option<NonNull<u8>>,
    /// Byte offset of this allocation inside the mapping.
    pub bind_offset: usize,
}

impl DeviceMemory {
    /// Host address of the first byte of this allocation, if mapped.
    pub fn host_ptr(&self) -> Option<NonNull<u8>> {
        let base = self.mapped_ptr?;
        // SAFETY: the allocator guarantees bind_offset lies inside the mapping.
        Some(unsafe { NonNull::new_unchecked(base.as_ptr().add(self.bind_offset)) })
    }
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMemory")
            .field("binding", &self.binding)
            .field("capacity", &self.capacity)
            .field("mapped", &self.mapped_ptr.is_some())
            .field("bind_offset", &self.bind_offset)
            .finish()
    }
}

// SAFETY: the mapping pointer is only an address; the allocator keeps the
// memory alive and access is synchronised by the caller.
unsafe impl Send for DeviceMemory {}
// SAFETY: see above.
unsafe impl Sync for DeviceMemory {}

// ============================================================================
// Allocator capability
// ============================================================================

/// Source of device memory.
///
/// Implementations must be callable from whichever thread drops the last
/// reference to a buffer.
pub trait DeviceAllocator: Send + Sync + fmt::Debug {
    /// Index of the GPU this allocator serves.
    fn device_index(&self) -> i32;

    /// Returns true if allocations are host-visible.
    fn is_mappable(&self) -> bool;

    /// Allocates memory for `desc` on `device`, `None` on failure.
    fn allocate(&self, desc: &ExtentDesc, device: Device) -> Option<DeviceMemory>;

    /// Returns memory obtained from [`allocate`](Self::allocate).
    fn free(&self, memory: &DeviceMemory, device: Device);

    /// Makes host writes through the mapping visible to the device.
    fn flush(&self, memory: &DeviceMemory, device: Device) -> DeviceResult<()>;

    /// Makes device writes visible through the mapping.
    fn invalidate(&self, memory: &DeviceMemory, device: Device) -> DeviceResult<()>;
}

/// Shared handle to a device allocator.
pub type SharedDeviceAllocator = Arc<dyn DeviceAllocator>;

/// Returns true if both handles refer to the same allocator instance.
pub fn same_device_allocator(a: &SharedDeviceAllocator, b: &SharedDeviceAllocator) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
