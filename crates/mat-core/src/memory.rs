//! Host memory: alignment helpers, allocators and shared blocks.
//!
//! A [`Mat`](crate::Mat) never owns raw bytes directly. It holds an
//! `Arc<dyn HostBlock>`; the block knows its base pointer and length and
//! releases itself when the last reference drops. [`Allocation`] is the
//! block produced by an [`Allocator`]; device crates provide their own
//! blocks for mapped memory.
//!
//! # Allocation Policy
//!
//! - Requested size is `align_size(total * elemsize, 4)`
//! - [`DefaultAllocator`] aligns to [`MatConfig::malloc_align`] and appends
//!   [`MatConfig::malloc_overread`] bytes
//! - Fresh memory is zero-filled
//!
//! # Used By
//!
//! - [`crate::Mat`] - storage of every owning buffer
//! - `mat-gpu` - `HostMemoryAllocator`, mapped regions

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::config::MatConfig;
use crate::error::Result;
use crate::format::Device;

/// Rounds `size` up to a multiple of `n` (a power of two).
#[inline]
pub const fn align_size(size: usize, n: usize) -> usize {
    (size + n - 1) & !(n - 1)
}

/// Rounds a pointer up to a multiple of `n` (a power of two).
#[inline]
pub fn align_ptr<T>(ptr: *mut T, n: usize) -> *mut T {
    let addr = ptr as usize;
    let aligned = align_size(addr, n);
    ptr.wrapping_add((aligned - addr) / std::mem::size_of::<T>().max(1))
}

// ============================================================================
// Blocks
// ============================================================================

/// A reference-counted region of host-addressable memory.
///
/// # Safety
///
/// Implementors guarantee that `as_ptr()` points to at least `len()` bytes
/// that stay valid, and are not freed or moved, for as long as the block is
/// alive. The memory may be written through by any holder of the block.
pub unsafe trait HostBlock: Send + Sync {
    /// Base pointer of the region.
    fn as_ptr(&self) -> NonNull<u8>;

    /// Length of the region in bytes.
    fn len(&self) -> usize;

    /// Returns true for a zero-length region.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if no other block can address the same bytes.
    ///
    /// Blocks over memory that can be mapped more than once return false.
    fn is_exclusive(&self) -> bool {
        true
    }
}

/// Heap memory aligned to a power of two, with overread padding.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocates `len` zeroed bytes plus `overread` padding, aligned to `align`.
    ///
    /// Returns `None` if the layout is invalid or the system is out of memory.
    pub fn zeroed(len: usize, align: usize, overread: usize) -> Option<Self> {
        let size = len.checked_add(overread)?.max(1);
        let layout = Layout::from_size_align(size, align).ok()?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;
        Some(Self { ptr, len, layout })
    }

    /// Base pointer.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Usable length in bytes, excluding overread padding.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment of the base pointer.
    pub fn align(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}

// SAFETY: the buffer is uniquely owned heap memory.
unsafe impl Send for AlignedBuffer {}
// SAFETY: shared access only hands out the pointer; writers synchronise externally.
unsafe impl Sync for AlignedBuffer {}

// SAFETY: memory lives until drop and is never moved.
unsafe impl HostBlock for AlignedBuffer {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

// ============================================================================
// Allocators
// ============================================================================

/// Source of host memory for buffers.
///
/// Two buffers created with the same allocator instance (compared by
/// identity) and shape are considered identical by `create`.
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Allocates `size` bytes for `device`, `None` on failure.
    fn fast_malloc(&self, size: usize, device: Device) -> Option<NonNull<u8>>;

    /// Frees memory returned by [`fast_malloc`](Self::fast_malloc).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `fast_malloc` on this allocator with the same
    /// `size` and `device`, and must not be used afterwards.
    unsafe fn fast_free(&self, ptr: NonNull<u8>, size: usize, device: Device);

    /// Makes host writes visible to the device. No-op for coherent memory.
    fn flush(&self, _ptr: NonNull<u8>, _size: usize, _device: Device) -> Result<()> {
        Ok(())
    }

    /// Makes device writes visible to the host. No-op for coherent memory.
    fn invalidate(&self, _ptr: NonNull<u8>, _size: usize, _device: Device) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to an allocator.
pub type SharedAllocator = Arc<dyn Allocator>;

/// Returns true if both options refer to the same allocator instance.
pub fn same_allocator(a: Option<&SharedAllocator>, b: Option<&SharedAllocator>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        _ => false,
    }
}

/// Aligned system allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAllocator {
    align: usize,
    overread: usize,
}

impl Default for DefaultAllocator {
    fn default() -> Self {
        Self::with_config(MatConfig::global())
    }
}

impl DefaultAllocator {
    /// Allocator using the alignment and overread of `config`.
    pub fn with_config(config: &MatConfig) -> Self {
        Self {
            align: config.malloc_align,
            overread: config.malloc_overread,
        }
    }

    /// Process-wide instance built from [`MatConfig::global`].
    pub fn shared() -> SharedAllocator {
        static INSTANCE: OnceLock<SharedAllocator> = OnceLock::new();
        INSTANCE
            .get_or_init(|| Arc::new(DefaultAllocator::default()))
            .clone()
    }

    /// Alignment in bytes.
    pub fn align(&self) -> usize {
        self.align
    }

    fn layout(&self, size: usize) -> Option<Layout> {
        Layout::from_size_align(size.checked_add(self.overread)?.max(1), self.align).ok()
    }
}

impl Allocator for DefaultAllocator {
    fn fast_malloc(&self, size: usize, _device: Device) -> Option<NonNull<u8>> {
        let layout = self.layout(size)?;
        // SAFETY: layout has a non-zero size.
        NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
    }

    unsafe fn fast_free(&self, ptr: NonNull<u8>, size: usize, _device: Device) {
        if let Some(layout) = self.layout(size) {
            // SAFETY: caller guarantees ptr came from fast_malloc(size).
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}

/// Memory obtained from an [`Allocator`], returned to it on drop.
pub struct Allocation {
    ptr: NonNull<u8>,
    size: usize,
    device: Device,
    allocator: SharedAllocator,
}

impl Allocation {
    /// Allocates `size` bytes from `allocator`.
    pub fn new(allocator: SharedAllocator, size: usize, device: Device) -> Option<Self> {
        let ptr = allocator.fast_malloc(size, device)?;
        trace!(size, ?device, "host block allocated");
        Some(Self {
            ptr,
            size,
            device,
            allocator,
        })
    }

    /// Allocator that owns the memory.
    pub fn allocator(&self) -> &SharedAllocator {
        &self.allocator
    }

    /// Flushes host writes through the allocator.
    pub fn flush(&self) -> Result<()> {
        self.allocator.flush(self.ptr, self.size, self.device)
    }

    /// Invalidates host caches through the allocator.
    pub fn invalidate(&self) -> Result<()> {
        self.allocator.invalidate(self.ptr, self.size, self.device)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        trace!(size = self.size, device = ?self.device, "host block freed");
        // SAFETY: ptr/size/device are exactly what fast_malloc returned.
        unsafe { self.allocator.fast_free(self.ptr, self.size, self.device) };
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("device", &self.device)
            .finish()
    }
}

// SAFETY: the allocation is uniquely owned; allocators are Send + Sync.
unsafe impl Send for Allocation {}
// SAFETY: see HostBlock contract; concurrent writers synchronise externally.
unsafe impl Sync for Allocation {}

// SAFETY: memory stays valid until the allocation drops.
unsafe impl HostBlock for Allocation {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.size
    }
}
