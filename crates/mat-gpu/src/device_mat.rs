//! Device buffers: one generic type specialised by memory kind.
//!
//! [`DeviceMat<K>`] holds the same [`Shape`] and [`MatMeta`] as a host
//! [`Mat`], plus a reference-counted device allocation. The kind parameter
//! fixes the device tag and which raw handles are exposed:
//!
//! | Alias          | Kind            | Device tag            | Handles                 |
//! |----------------|-----------------|-----------------------|-------------------------|
//! | [`VkMat`]      | [`LinearBuffer`]| `Device::Vulkan`      | buffer, offset          |
//! | [`VkImageMat`] | [`OpaqueImage`] | `Device::VulkanImage` | image, image view       |
//!
//! Device buffers are never read or written by CPU code except through
//! [`DeviceMat::mapped`], which is only available for host-mappable memory.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use mat_core::{
    ColorFormat, DataType, Device, Extent, HostBlock, Mat, MatMeta, MatShape, Shape,
};
use tracing::{debug, trace, warn};

use crate::allocator::{
    same_device_allocator, BufferHandle, DeviceMemory, ExtentDesc, ImageHandle, ImageViewHandle,
    MemoryBinding, SharedDeviceAllocator,
};
use crate::{DeviceError, DeviceResult};

// ============================================================================
// Kinds
// ============================================================================

/// Memory kind of a device buffer.
pub trait DeviceKind: Send + Sync + 'static {
    /// Device tag stamped on every buffer of this kind.
    const DEVICE: Device;

    /// Short name for logs.
    const NAME: &'static str;

    /// Color format given to a freshly created buffer.
    fn default_color_format(dims: u32, c: usize) -> ColorFormat {
        if dims < 3 {
            return ColorFormat::Gray;
        }
        match c {
            1 => ColorFormat::Gray,
            3 => ColorFormat::Rgb,
            _ => ColorFormat::Argb,
        }
    }
}

/// Linear GPU buffer memory.
#[derive(Debug, Clone, Copy)]
pub struct LinearBuffer;

impl DeviceKind for LinearBuffer {
    const DEVICE: Device = Device::Vulkan;
    const NAME: &'static str = "buffer";
}

/// Opaque GPU image memory.
#[derive(Debug, Clone, Copy)]
pub struct OpaqueImage;

impl DeviceKind for OpaqueImage {
    const DEVICE: Device = Device::VulkanImage;
    const NAME: &'static str = "image";
}

/// Buffer-backed device matrix.
pub type VkMat = DeviceMat<LinearBuffer>;

/// Image-backed device matrix.
pub type VkImageMat = DeviceMat<OpaqueImage>;

// ============================================================================
// Storage
// ============================================================================

/// A device allocation returned to its allocator when dropped.
struct DeviceBlock {
    memory: DeviceMemory,
    device: Device,
    allocator: SharedDeviceAllocator,
}

impl Drop for DeviceBlock {
    fn drop(&mut self) {
        trace!(binding = ?self.memory.binding, "releasing device block");
        self.allocator.free(&self.memory, self.device);
    }
}

/// Host view of a mapped device block; keeps the block alive.
struct MappedBlock {
    block: Arc<DeviceBlock>,
    ptr: NonNull<u8>,
}

// SAFETY: the mapping stays valid until the DeviceBlock is freed, which
// cannot happen while this Arc is held.
unsafe impl HostBlock for MappedBlock {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.block.memory.capacity
    }

    fn is_exclusive(&self) -> bool {
        false
    }
}

// SAFETY: DeviceBlock is Send + Sync; the pointer is an address into it.
unsafe impl Send for MappedBlock {}
// SAFETY: see above.
unsafe impl Sync for MappedBlock {}

// ============================================================================
// DeviceMat
// ============================================================================

/// Multi-dimensional buffer in device memory.
///
/// Cloning aliases the same allocation; the allocation is freed through
/// its allocator when the last clone (or mapped host view) drops.
pub struct DeviceMat<K: DeviceKind> {
    block: Option<Arc<DeviceBlock>>,
    shape: Shape,
    meta: MatMeta,
    device_number: i32,
    allocator: Option<SharedDeviceAllocator>,
    _kind: PhantomData<K>,
}

impl<K: DeviceKind> Clone for DeviceMat<K> {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            shape: self.shape,
            meta: self.meta,
            device_number: self.device_number,
            allocator: self.allocator.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: DeviceKind> Default for DeviceMat<K> {
    fn default() -> Self {
        Self {
            block: None,
            shape: Shape::EMPTY,
            meta: MatMeta::default(),
            device_number: -1,
            allocator: None,
            _kind: PhantomData,
        }
    }
}

impl<K: DeviceKind> fmt::Debug for DeviceMat<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMat")
            .field("kind", &K::NAME)
            .field("shape", &self.shape)
            .field("data_type", &self.meta.data_type)
            .field("device_number", &self.device_number)
            .field("memory", &self.block.as_ref().map(|b| &b.memory))
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl<K: DeviceKind> MatShape for DeviceMat<K> {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn meta(&self) -> &MatMeta {
        &self.meta
    }

    fn device(&self) -> Device {
        K::DEVICE
    }

    fn device_number(&self) -> i32 {
        self.device_number
    }

    fn is_empty(&self) -> bool {
        self.block.is_none() || self.shape.total() == 0
    }
}

impl<K: DeviceKind> DeviceMat<K> {
    /// Allocates a buffer of `elemsize`-byte scalars from `allocator`.
    pub fn new(
        extent: Extent,
        elemsize: usize,
        elempack: usize,
        allocator: SharedDeviceAllocator,
    ) -> Self {
        let mut m = Self::default();
        m.create(extent, elemsize, elempack, allocator);
        m
    }

    /// Allocates a buffer of the given element type from `allocator`.
    pub fn new_type(extent: Extent, data_type: DataType, allocator: SharedDeviceAllocator) -> Self {
        let mut m = Self::default();
        m.create_type(extent, data_type, allocator);
        m
    }

    /// (Re)allocates for the given layout.
    ///
    /// A no-op when layout and allocator are unchanged and storage exists.
    /// Otherwise the previous allocation is released first; failure leaves
    /// the buffer empty.
    pub fn create(
        &mut self,
        extent: Extent,
        elemsize: usize,
        elempack: usize,
        allocator: SharedDeviceAllocator,
    ) {
        let shape = Shape::new(extent, elemsize, elempack);
        if self.unchanged(&shape, &allocator) {
            trace!(kind = K::NAME, %shape, "create: layout unchanged");
            return;
        }
        self.allocate(shape, DataType::from_scalar_size(elemsize), allocator);
    }

    /// (Re)allocates for the given element type.
    pub fn create_type(
        &mut self,
        extent: Extent,
        data_type: DataType,
        allocator: SharedDeviceAllocator,
    ) {
        let shape = Shape::new(extent, data_type.size(), 1);
        if self.unchanged(&shape, &allocator) && self.meta.data_type == data_type {
            trace!(kind = K::NAME, %shape, "create_type: layout unchanged");
            return;
        }
        self.allocate(shape, data_type, allocator);
    }

    /// (Re)allocates to match `other` (host or device) and copies its metadata.
    ///
    /// The device tag stays the one of this kind.
    pub fn create_like(&mut self, other: &impl MatShape, allocator: SharedDeviceAllocator) {
        let s = *other.shape();
        if s.dims == 0 {
            self.release();
        } else {
            let shape = Shape::new(s.extent(), s.elemsize, s.elempack);
            if !self.unchanged(&shape, &allocator) {
                self.allocate(shape, other.data_type(), allocator);
            }
        }
        self.meta = *other.meta();
    }

    fn unchanged(&self, shape: &Shape, allocator: &SharedDeviceAllocator) -> bool {
        self.block.is_some()
            && self.shape.same_layout(shape)
            && self
                .allocator
                .as_ref()
                .is_some_and(|a| same_device_allocator(a, allocator))
    }

    fn allocate(&mut self, shape: Shape, data_type: DataType, allocator: SharedDeviceAllocator) {
        self.release();
        if shape.total() == 0 {
            return;
        }
        let desc = ExtentDesc::from_shape(&shape);
        let Some(memory) = allocator.allocate(&desc, K::DEVICE) else {
            warn!(kind = K::NAME, %shape, size = desc.byte_size(), "device allocation failed");
            return;
        };
        debug!(kind = K::NAME, %shape, binding = ?memory.binding, "device buffer created");

        self.device_number = allocator.device_index();
        self.block = Some(Arc::new(DeviceBlock {
            memory,
            device: K::DEVICE,
            allocator: allocator.clone(),
        }));
        self.shape = shape;
        self.meta = MatMeta::for_shape_with(
            &shape,
            data_type,
            K::default_color_format(shape.dims, shape.c),
        );
        self.allocator = Some(allocator);
    }

    /// Drops this handle's reference and resets to the empty state.
    ///
    /// The allocation is freed when no other handle or mapped view holds it.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// Mutable metadata.
    pub fn meta_mut(&mut self) -> &mut MatMeta {
        &mut self.meta
    }

    /// Number of handles (including mapped host views) sharing the allocation.
    pub fn refcount(&self) -> usize {
        self.block.as_ref().map_or(0, Arc::strong_count)
    }

    /// Returns true if both buffers share one allocation.
    pub fn shares_storage(&self, other: &Self) -> bool {
        match (&self.block, &other.block) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Allocator the buffer was created with.
    pub fn allocator(&self) -> Option<&SharedDeviceAllocator> {
        self.allocator.as_ref()
    }

    /// The underlying allocation.
    pub fn memory(&self) -> Option<&DeviceMemory> {
        self.block.as_ref().map(|b| &b.memory)
    }

    /// Host address of the data, `None` when empty or not host-mappable.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        let allocator = self.allocator.as_ref()?;
        if !allocator.is_mappable() {
            return None;
        }
        self.memory()?.host_ptr()
    }

    /// Host buffer over the mapped memory, empty when not host-mappable.
    ///
    /// The view shares the allocation: it stays valid after this handle is
    /// released. Callers synchronise with GPU work themselves and bracket
    /// access with [`invalidate`](Self::invalidate) / [`flush`](Self::flush)
    /// on non-coherent memory.
    pub fn mapped(&self) -> Mat {
        let (Some(block), Some(ptr)) = (self.block.as_ref(), self.mapped_ptr()) else {
            return Mat::default();
        };
        let host = MappedBlock {
            block: block.clone(),
            ptr,
        };
        let s = self.shape;
        match Mat::from_block(Arc::new(host), 0, s.extent(), s.elemsize, s.elempack) {
            Ok(mut m) => {
                *m.meta_mut() = self.meta;
                m
            }
            Err(err) => {
                warn!(kind = K::NAME, %err, "mapped region smaller than the buffer");
                Mat::default()
            }
        }
    }

    /// Makes host writes through the mapping visible to the device.
    pub fn flush(&self) -> DeviceResult<()> {
        let block = self.block.as_ref().ok_or(DeviceError::EmptyMat)?;
        block.allocator.flush(&block.memory, K::DEVICE)
    }

    /// Makes device writes visible through the mapping.
    pub fn invalidate(&self) -> DeviceResult<()> {
        let block = self.block.as_ref().ok_or(DeviceError::EmptyMat)?;
        block.allocator.invalidate(&block.memory, K::DEVICE)
    }
}

impl DeviceMat<LinearBuffer> {
    /// Buffer object for descriptor binding, null when empty.
    pub fn buffer(&self) -> BufferHandle {
        match self.memory().map(|m| m.binding) {
            Some(MemoryBinding::Buffer { buffer, .. }) => buffer,
            _ => BufferHandle::NULL,
        }
    }

    /// Byte offset of the data inside [`buffer`](Self::buffer).
    pub fn buffer_offset(&self) -> usize {
        match self.memory().map(|m| m.binding) {
            Some(MemoryBinding::Buffer { offset, .. }) => offset,
            _ => 0,
        }
    }
}

impl DeviceMat<OpaqueImage> {
    /// Image object for descriptor binding, null when empty.
    pub fn image(&self) -> ImageHandle {
        match self.memory().map(|m| m.binding) {
            Some(MemoryBinding::Image { image, .. }) => image,
            _ => ImageHandle::NULL,
        }
    }

    /// Default view of [`image`](Self::image), null when empty.
    pub fn image_view(&self) -> ImageViewHandle {
        match self.memory().map(|m| m.binding) {
            Some(MemoryBinding::Image { view, .. }) => view,
            _ => ImageViewHandle::NULL,
        }
    }
}
