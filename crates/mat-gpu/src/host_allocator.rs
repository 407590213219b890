//! Host-backed device allocator.
//!
//! [`HostMemoryAllocator`] emulates a device heap with aligned host memory.
//! It hands out monotonically increasing opaque handles, optionally exposes
//! the memory as mapped, and counts allocations so tests and tools can check
//! for leaks. There is no pooling: every request is a fresh block and every
//! free returns it to the system.
//!
//! # Usage
//!
//! ```rust
//! use mat_gpu::prelude::*;
//!
//! let alloc = HostMemoryAllocator::shared(0, true);
//! let m = VkImageMat::new_type(Extent::d3(16, 16, 4), DataType::Int8, alloc.clone());
//! assert!(!m.image().is_null());
//! assert!(m.mapped_ptr().is_some());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mat_core::{AlignedBuffer, Device, MatConfig};
use tracing::{debug, trace, warn};

use crate::allocator::{
    BufferHandle, DeviceAllocator, DeviceMemory, ExtentDesc, ImageHandle, ImageViewHandle,
    MemoryBinding, SharedDeviceAllocator,
};
use crate::{DeviceError, DeviceResult};

/// Device allocator backed by host memory.
#[derive(Debug)]
pub struct HostMemoryAllocator {
    device_index: i32,
    mappable: bool,
    align: usize,
    overread: usize,
    next_handle: AtomicU64,
    blocks: Mutex<HashMap<u64, AlignedBuffer>>,
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl HostMemoryAllocator {
    /// Creates an allocator for GPU `device_index`.
    ///
    /// Alignment and overread come from [`MatConfig::global`].
    pub fn new(device_index: i32, mappable: bool) -> Self {
        let config = MatConfig::global();
        Self {
            device_index,
            mappable,
            align: config.malloc_align,
            overread: config.malloc_overread,
            next_handle: AtomicU64::new(1),
            blocks: Mutex::new(HashMap::new()),
            allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    /// Creates an allocator behind a shared handle.
    pub fn shared(device_index: i32, mappable: bool) -> SharedDeviceAllocator {
        Arc::new(Self::new(device_index, mappable))
    }

    /// Overrides the block alignment (a power of two).
    pub fn with_align(mut self, align: usize) -> Self {
        if align.is_power_of_two() {
            self.align = align;
        }
        self
    }

    /// Number of successful allocations so far.
    pub fn alloc_count(&self) -> usize {
        self.allocs.load(Ordering::Acquire)
    }

    /// Number of frees so far.
    pub fn free_count(&self) -> usize {
        self.frees.load(Ordering::Acquire)
    }

    /// Blocks currently outstanding.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// Bytes currently outstanding.
    pub fn live_bytes(&self) -> usize {
        self.lock().values().map(AlignedBuffer::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AlignedBuffer>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(memory: &DeviceMemory) -> u64 {
        match memory.binding {
            MemoryBinding::Buffer { buffer, .. } => buffer.0,
            MemoryBinding::Image { image, .. } => image.0,
        }
    }

    fn check_known(&self, memory: &DeviceMemory, op: &str) -> DeviceResult<()> {
        let key = Self::key(memory);
        if self.lock().contains_key(&key) {
            Ok(())
        } else {
            Err(DeviceError::coherency(format!("{op}: unknown allocation {key}")))
        }
    }
}

impl DeviceAllocator for HostMemoryAllocator {
    fn device_index(&self) -> i32 {
        self.device_index
    }

    fn is_mappable(&self) -> bool {
        self.mappable
    }

    fn allocate(&self, desc: &ExtentDesc, device: Device) -> Option<DeviceMemory> {
        if !matches!(device, Device::Vulkan | Device::VulkanImage) {
            warn!(?device, "host memory allocator serves Vulkan buffers and images only");
            return None;
        }
        let size = desc.byte_size();
        if size == 0 {
            return None;
        }
        let Some(block) = AlignedBuffer::zeroed(size, self.align, self.overread) else {
            warn!(size, ?device, "device allocation failed");
            return None;
        };

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let binding = match device {
            Device::VulkanImage => MemoryBinding::Image {
                image: ImageHandle(id),
                view: ImageViewHandle(id),
            },
            _ => MemoryBinding::Buffer {
                buffer: BufferHandle(id),
                offset: 0,
            },
        };
        let memory = DeviceMemory {
            binding,
            capacity: size,
            mapped_ptr: self.mappable.then(|| block.as_ptr()),
            bind_offset: 0,
        };

        self.lock().insert(id, block);
        self.allocs.fetch_add(1, Ordering::AcqRel);
        debug!(id, size, ?device, device_index = self.device_index, "device memory allocated");
        Some(memory)
    }

    fn free(&self, memory: &DeviceMemory, device: Device) {
        let key = Self::key(memory);
        match self.lock().remove(&key) {
            Some(block) => {
                self.frees.fetch_add(1, Ordering::AcqRel);
                trace!(id = key, size = block.len(), ?device, "device memory freed");
            }
            None => warn!(id = key, ?device, "free of unknown device allocation"),
        }
    }

    fn flush(&self, memory: &DeviceMemory, _device: Device) -> DeviceResult<()> {
        // host memory is coherent; only the handle is validated
        self.check_known(memory, "flush")
    }

    fn invalidate(&self, memory: &DeviceMemory, _device: Device) -> DeviceResult<()> {
        self.check_known(memory, "invalidate")
    }
}
