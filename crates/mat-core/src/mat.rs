//! Host buffer with shared, reference-counted storage.
//!
//! A [`Mat`] is a view: storage handle, byte offset, [`Shape`] and
//! [`MatMeta`]. Cloning a `Mat` is cheap and aliases the same bytes; the
//! storage is released when the last alias drops. Deep copies are explicit
//! ([`Mat::deep_clone`]).
//!
//! # Storage Kinds
//!
//! - **Owned** - allocated by `create*` through an [`Allocator`](crate::memory::Allocator)
//! - **Shared block** - any [`HostBlock`], e.g. mapped device memory
//! - **External** - caller-owned memory wrapped with [`Mat::from_raw_parts`];
//!   never freed, not reference counted
//!
//! Views (`channel`, `row_range`, ...) inherit the storage kind of their
//! parent and keep owned storage alive.
//!
//! # Aliasing
//!
//! Clones and views write through to the same bytes. Mutating operations
//! (`fill`, the assignment operators, `set*`, drawing) take `&mut self` on
//! one handle only, so other aliases of the same storage must stay idle
//! while they run, on any thread. Mutable slices and element references are
//! `unsafe` for the same reason; [`Mat::try_as_mut_slice`] hands one out
//! safely when the handle is the sole owner of its storage.
//!
//! # Element Addressing
//!
//! With `elempack == 1` channels are planar: element `(x, y, c)` lives at
//! `c * cstep + y * w + x`. With `elempack > 1` they are interleaved:
//! `(y * w + x) * c + ch`.
//!
//! # Example
//!
//! ```rust
//! use mat_core::prelude::*;
//!
//! let mut a = Mat::new_type(Extent::d3(4, 4, 3), DataType::Float32);
//! assert_eq!(a.color_format(), ColorFormat::Bgr);
//!
//! let b = a.clone();
//! assert_eq!(a.refcount(), 2);
//!
//! a.set_3d::<f32>(1, 2, 0, 7.0);
//! assert_eq!(b.at_3d::<f32>(1, 2, 0), 7.0);
//! ```

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{MatError, Result};
use crate::format::{ColorFormat, DataType, Device};
use crate::memory::{same_allocator, Allocation, DefaultAllocator, HostBlock, SharedAllocator};
use crate::meta::{MatMeta, MatShape};
use crate::scalar::Element;
use crate::shape::{plane_stride, Extent, Shape};

#[derive(Clone)]
enum Storage {
    Shared(Arc<dyn HostBlock>),
    External { ptr: NonNull<u8>, len: usize },
}

impl Storage {
    fn base(&self) -> NonNull<u8> {
        match self {
            Self::Shared(block) => block.as_ptr(),
            Self::External { ptr, .. } => *ptr,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Shared(block) => block.len(),
            Self::External { len, .. } => *len,
        }
    }
}

/// Multi-dimensional numeric buffer in host memory.
#[derive(Clone)]
pub struct Mat {
    storage: Option<Storage>,
    offset: usize,
    shape: Shape,
    meta: MatMeta,
    device: Device,
    device_number: i32,
    allocator: Option<SharedAllocator>,
}

// SAFETY: owned storage is an Arc<dyn HostBlock> (Send + Sync). External
// storage is only constructible through `from_raw_parts`, whose contract
// requires memory that may be accessed from any thread. Handing out
// references into the bytes is `unsafe` (see "Aliasing" above).
unsafe impl Send for Mat {}
// SAFETY: see above.
unsafe impl Sync for Mat {}

impl Default for Mat {
    fn default() -> Self {
        Self {
            storage: None,
            offset: 0,
            shape: Shape::EMPTY,
            meta: MatMeta::default(),
            device: Device::Cpu,
            device_number: -1,
            allocator: None,
        }
    }
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mat")
            .field("shape", &self.shape)
            .field("data_type", &self.meta.data_type)
            .field("color_format", &self.meta.color_format)
            .field("device", &self.device)
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl MatShape for Mat {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn meta(&self) -> &MatMeta {
        &self.meta
    }

    fn device(&self) -> Device {
        self.device
    }

    fn device_number(&self) -> i32 {
        self.device_number
    }

    fn is_empty(&self) -> bool {
        self.storage.is_none() || self.shape.total() == 0
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Mat {
    /// Allocates a buffer of `elemsize`-byte scalars.
    ///
    /// The type tag is inferred from the size. Allocation failure yields an
    /// empty buffer.
    pub fn new(extent: Extent, elemsize: usize) -> Self {
        Self::new_packed(extent, elemsize, 1, None)
    }

    /// Allocates a buffer with explicit packing and allocator.
    pub fn new_packed(
        extent: Extent,
        elemsize: usize,
        elempack: usize,
        allocator: Option<SharedAllocator>,
    ) -> Self {
        let mut m = Self::default();
        m.create(extent, elemsize, elempack, allocator);
        m
    }

    /// Allocates a buffer of the given element type.
    pub fn new_type(extent: Extent, data_type: DataType) -> Self {
        Self::new_type_with(extent, data_type, None)
    }

    /// Allocates a buffer of the given element type from `allocator`.
    pub fn new_type_with(
        extent: Extent,
        data_type: DataType,
        allocator: Option<SharedAllocator>,
    ) -> Self {
        let mut m = Self::default();
        m.create_type(extent, data_type, allocator);
        m
    }

    /// Wraps caller-owned memory without copying.
    ///
    /// The buffer is not reference counted and never frees `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of
    /// `Shape::new(extent, elemsize, elempack).byte_len()` bytes, suitably
    /// aligned for the element type, for as long as this buffer or any view
    /// of it exists, and may be accessed from any thread.
    pub unsafe fn from_raw_parts(
        extent: Extent,
        ptr: NonNull<u8>,
        elemsize: usize,
        elempack: usize,
    ) -> Self {
        let shape = Shape::new(extent, elemsize, elempack);
        Self {
            storage: Some(Storage::External {
                ptr,
                len: shape.byte_len(),
            }),
            offset: 0,
            shape,
            meta: MatMeta::for_shape(&shape, DataType::from_scalar_size(elemsize)),
            ..Self::default()
        }
    }

    /// Wraps caller-owned memory holding elements of `data_type`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Mat::from_raw_parts`].
    pub unsafe fn from_raw_parts_type(extent: Extent, ptr: NonNull<u8>, data_type: DataType) -> Self {
        // SAFETY: forwarded contract.
        let mut m = unsafe { Self::from_raw_parts(extent, ptr, data_type.size(), 1) };
        m.meta.set_data_type(data_type);
        m
    }

    /// Builds a buffer over a shared block, starting `offset` bytes in.
    pub fn from_block(
        block: Arc<dyn HostBlock>,
        offset: usize,
        extent: Extent,
        elemsize: usize,
        elempack: usize,
    ) -> Result<Self> {
        let shape = Shape::new(extent, elemsize, elempack);
        let needed = offset + shape.byte_len();
        if needed > block.len() {
            return Err(MatError::alloc(
                needed,
                format!("block holds only {} bytes", block.len()),
            ));
        }
        Ok(Self {
            storage: Some(Storage::Shared(block)),
            offset,
            shape,
            meta: MatMeta::for_shape(&shape, DataType::from_scalar_size(elemsize)),
            ..Self::default()
        })
    }

    /// Allocates a planar buffer and copies `data` into it.
    ///
    /// `data` holds `c` planes of `w * h` elements back to back; plane
    /// padding is inserted as needed.
    pub fn from_slice<T: Element>(extent: Extent, data: &[T]) -> Result<Self> {
        if data.len() != extent.count() {
            return Err(MatError::LengthMismatch {
                expected: extent.count(),
                got: data.len(),
            });
        }
        let mut m = Self::new_type(extent, T::TYPE);
        if m.is_empty() {
            if extent.count() == 0 {
                return Ok(m);
            }
            return Err(MatError::alloc(
                Shape::new(extent, T::TYPE.size(), 1).alloc_size(),
                "allocator returned no memory",
            ));
        }
        let plane = extent.w * extent.h;
        let cstep = m.shape.cstep;
        let dst = m.data_mut::<T>();
        for (i, src) in data.chunks(plane.max(1)).enumerate() {
            dst[i * cstep..i * cstep + src.len()].copy_from_slice(src);
        }
        Ok(m)
    }

    /// Copies the logical elements out, dropping plane padding.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.meta.data_type != T::TYPE {
            return Err(MatError::TypeMismatch {
                expected: self.meta.data_type,
                got: T::TYPE,
            });
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let s = &self.shape;
        let data = self.as_slice::<T>();
        if s.elempack > 1 {
            return Ok(data[..s.w * s.h * s.c].to_vec());
        }
        let plane = s.w * s.h;
        let mut out = Vec::with_capacity(plane * s.c);
        for i in 0..s.c {
            out.extend_from_slice(&data[i * s.cstep..i * s.cstep + plane]);
        }
        Ok(out)
    }

    // ========================================================================
    // (Re)allocation
    // ========================================================================

    /// (Re)allocates for the given layout.
    ///
    /// A no-op when the buffer already has this layout and allocator; the
    /// existing storage and metadata are kept. Otherwise the old storage is
    /// released first. Zero-sized extents or allocation failure leave the
    /// buffer empty.
    pub fn create(
        &mut self,
        extent: Extent,
        elemsize: usize,
        elempack: usize,
        allocator: Option<SharedAllocator>,
    ) {
        let shape = Shape::new(extent, elemsize, elempack);
        if self.storage.is_some()
            && self.shape.same_layout(&shape)
            && same_allocator(self.allocator.as_ref(), allocator.as_ref())
        {
            trace!(%shape, "create: layout unchanged");
            return;
        }
        self.allocate(shape, DataType::from_scalar_size(elemsize), allocator);
    }

    /// (Re)allocates for the given element type.
    ///
    /// Like [`create`](Self::create) but the no-op check compares the type
    /// tag instead of the element size.
    pub fn create_type(
        &mut self,
        extent: Extent,
        data_type: DataType,
        allocator: Option<SharedAllocator>,
    ) {
        let shape = Shape::new(extent, data_type.size(), 1);
        if self.storage.is_some()
            && self.shape.same_layout(&shape)
            && self.meta.data_type == data_type
            && same_allocator(self.allocator.as_ref(), allocator.as_ref())
        {
            trace!(%shape, "create_type: layout unchanged");
            return;
        }
        self.allocate(shape, data_type, allocator);
    }

    /// (Re)allocates to match `other`'s layout and copies its metadata.
    ///
    /// `other` may be a host or device buffer.
    pub fn create_like(&mut self, other: &impl MatShape, allocator: Option<SharedAllocator>) {
        let s = *other.shape();
        if s.dims == 0 {
            self.release();
        } else {
            let shape = Shape::new(s.extent(), s.elemsize, s.elempack);
            if !(self.storage.is_some()
                && self.shape.same_layout(&shape)
                && same_allocator(self.allocator.as_ref(), allocator.as_ref()))
            {
                self.allocate(shape, other.data_type(), allocator);
            }
        }
        self.meta = *other.meta();
    }

    fn allocate(&mut self, shape: Shape, data_type: DataType, allocator: Option<SharedAllocator>) {
        self.release();
        if shape.total() == 0 {
            return;
        }
        let size = shape.alloc_size();
        let source = allocator.clone().unwrap_or_else(DefaultAllocator::shared);
        let Some(block) = Allocation::new(source, size, Device::Cpu) else {
            warn!(size, %shape, "host allocation failed");
            return;
        };
        self.storage = Some(Storage::Shared(Arc::new(block)));
        self.shape = shape;
        self.meta = MatMeta::for_shape(&shape, data_type);
        self.allocator = allocator;
    }

    /// Drops this handle's reference and resets to the empty state.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Mutable metadata.
    pub fn meta_mut(&mut self) -> &mut MatMeta {
        &mut self.meta
    }

    /// Allocator used for owned storage, if one was given.
    pub fn allocator(&self) -> Option<&SharedAllocator> {
        self.allocator.as_ref()
    }

    /// Number of handles sharing the storage; 0 for empty or external buffers.
    pub fn refcount(&self) -> usize {
        match &self.storage {
            Some(Storage::Shared(block)) => Arc::strong_count(block),
            _ => 0,
        }
    }

    /// Returns true if the storage is caller-owned.
    pub fn is_external(&self) -> bool {
        matches!(self.storage, Some(Storage::External { .. }))
    }

    /// Returns true if both buffers point into the same storage.
    pub fn shares_storage(&self, other: &Mat) -> bool {
        match (&self.storage, &other.storage) {
            (Some(Storage::Shared(a)), Some(Storage::Shared(b))) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Some(Storage::External { ptr: a, .. }), Some(Storage::External { ptr: b, .. })) => a == b,
            _ => false,
        }
    }

    fn data_ptr(&self) -> Option<NonNull<u8>> {
        let storage = self.storage.as_ref()?;
        assert!(
            self.offset + self.shape.byte_len() <= storage.len(),
            "view exceeds storage: offset {} + {} > {}",
            self.offset,
            self.shape.byte_len(),
            storage.len()
        );
        // SAFETY: offset is within the storage (checked above).
        Some(unsafe { NonNull::new_unchecked(storage.base().as_ptr().add(self.offset)) })
    }

    /// Pointer to the first byte, null when empty.
    pub fn as_ptr(&self) -> *const u8 {
        self.data_ptr().map_or(std::ptr::null(), |p| p.as_ptr() as *const u8)
    }

    /// Mutable pointer to the first byte, null when empty.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data_ptr().map_or(std::ptr::null_mut(), |p| p.as_ptr())
    }

    /// All bytes spanned by the buffer, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        match self.data_ptr() {
            // SAFETY: range checked by data_ptr; storage outlives the borrow.
            Some(p) => unsafe { std::slice::from_raw_parts(p.as_ptr(), self.shape.byte_len()) },
            None => &[],
        }
    }

    /// Mutable bytes, padding included.
    ///
    /// # Safety
    ///
    /// Clones and views of this buffer address the same bytes. While the
    /// returned slice is alive no other alias may read or write any byte it
    /// spans, on this thread or another. A handle for which
    /// [`is_unique`](Self::is_unique) holds has no such aliases.
    pub unsafe fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self.data_ptr() {
            // SAFETY: range checked by data_ptr; aliases excluded by the caller.
            Some(p) => unsafe { std::slice::from_raw_parts_mut(p.as_ptr(), self.shape.byte_len()) },
            None => &mut [],
        }
    }

    /// Returns true if no other handle reaches this buffer's bytes.
    ///
    /// False for empty and external buffers, for buffers with live clones
    /// or views, and for mapped regions that other views may also map.
    pub fn is_unique(&self) -> bool {
        match &self.storage {
            Some(Storage::Shared(block)) => Arc::strong_count(block) == 1 && block.is_exclusive(),
            _ => false,
        }
    }

    /// Elements as `T`, padding included.
    ///
    /// # Panics
    ///
    /// If the data is not aligned for `T` or its length is not a multiple
    /// of `size_of::<T>()`.
    pub fn as_slice<T: Element>(&self) -> &[T] {
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Mutable elements as `T`, padding included.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn as_mut_slice<T: Element>(&mut self) -> &mut [T] {
        // SAFETY: forwarded contract.
        bytemuck::cast_slice_mut(unsafe { self.as_bytes_mut() })
    }

    /// Mutable elements as `T` when this handle is the sole owner of its
    /// storage, `None` otherwise.
    pub fn try_as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        if !self.is_unique() {
            return None;
        }
        // SAFETY: no other handle shares the storage.
        Some(unsafe { self.as_mut_slice::<T>() })
    }

    /// Elements for in-crate kernels; the slice lives for one operation.
    pub(crate) fn data_mut<T: Element>(&mut self) -> &mut [T] {
        // SAFETY: mutating operations require idle aliases (see "Aliasing").
        unsafe { self.as_mut_slice::<T>() }
    }

    // ========================================================================
    // Element access
    // ========================================================================

    #[inline]
    fn index(&self, x: usize, y: usize, ch: usize) -> usize {
        let s = &self.shape;
        if s.elempack <= 1 {
            ch * s.cstep + y * s.w + x
        } else {
            (y * s.w + x) * s.c + ch
        }
    }

    /// Element `x` of the flat data.
    pub fn at<T: Element>(&self, x: usize) -> T {
        self.as_slice::<T>()[x]
    }

    /// Mutable element `x` of the flat data.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn at_mut<T: Element>(&mut self, x: usize) -> &mut T {
        // SAFETY: forwarded contract.
        unsafe { &mut self.as_mut_slice::<T>()[x] }
    }

    /// Writes element `x` of the flat data.
    pub fn set<T: Element>(&mut self, x: usize, value: T) {
        self.data_mut::<T>()[x] = value;
    }

    /// Element at column `x`, row `y` of the first channel.
    pub fn at_2d<T: Element>(&self, x: usize, y: usize) -> T {
        self.as_slice::<T>()[self.index(x, y, 0)]
    }

    /// Mutable element at column `x`, row `y`.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn at_2d_mut<T: Element>(&mut self, x: usize, y: usize) -> &mut T {
        let i = self.index(x, y, 0);
        // SAFETY: forwarded contract.
        unsafe { &mut self.as_mut_slice::<T>()[i] }
    }

    /// Writes the element at column `x`, row `y` of the first channel.
    pub fn set_2d<T: Element>(&mut self, x: usize, y: usize, value: T) {
        let i = self.index(x, y, 0);
        self.data_mut::<T>()[i] = value;
    }

    /// Element at `(x, y)` of channel `ch`.
    pub fn at_3d<T: Element>(&self, x: usize, y: usize, ch: usize) -> T {
        self.as_slice::<T>()[self.index(x, y, ch)]
    }

    /// Mutable element at `(x, y)` of channel `ch`.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn at_3d_mut<T: Element>(&mut self, x: usize, y: usize, ch: usize) -> &mut T {
        let i = self.index(x, y, ch);
        // SAFETY: forwarded contract.
        unsafe { &mut self.as_mut_slice::<T>()[i] }
    }

    /// Writes the element at `(x, y)` of channel `ch`.
    pub fn set_3d<T: Element>(&mut self, x: usize, y: usize, ch: usize, value: T) {
        let i = self.index(x, y, ch);
        self.data_mut::<T>()[i] = value;
    }

    /// Row `y` of a planar buffer (`w` elements).
    ///
    /// Rows are counted from the start of the data, so for rank-3 buffers
    /// this addresses the first channel plane only (`y < h`); use
    /// [`channel`](Self::channel) to reach the others.
    pub fn row<T: Element>(&self, y: usize) -> &[T] {
        let w = self.shape.w;
        &self.as_slice::<T>()[y * w..(y + 1) * w]
    }

    /// Mutable row `y` of a planar buffer; first channel plane only.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn row_mut<T: Element>(&mut self, y: usize) -> &mut [T] {
        let w = self.shape.w;
        // SAFETY: forwarded contract.
        unsafe { &mut self.as_mut_slice::<T>()[y * w..(y + 1) * w] }
    }

    /// Row `y` of an interleaved buffer (`w * c` elements).
    pub fn row_c<T: Element>(&self, y: usize) -> &[T] {
        let n = self.shape.w * self.shape.c;
        &self.as_slice::<T>()[y * n..(y + 1) * n]
    }

    /// Mutable row `y` of an interleaved buffer.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes_mut`](Self::as_bytes_mut).
    pub unsafe fn row_c_mut<T: Element>(&mut self, y: usize) -> &mut [T] {
        let n = self.shape.w * self.shape.c;
        // SAFETY: forwarded contract.
        unsafe { &mut self.as_mut_slice::<T>()[y * n..(y + 1) * n] }
    }

    // ========================================================================
    // Views
    // ========================================================================

    fn view(&self, byte_offset: usize, shape: Shape, color_format: ColorFormat) -> Mat {
        if self.storage.is_none() {
            return Mat::default();
        }
        let mut meta = self.meta;
        meta.color_format = color_format;
        Mat {
            storage: self.storage.clone(),
            offset: self.offset + byte_offset,
            shape,
            meta,
            device: self.device,
            device_number: self.device_number,
            allocator: self.allocator.clone(),
        }
    }

    /// Rank-2 view of channel `c`.
    ///
    /// Only planar buffers have contiguous channels; an interleaved buffer
    /// (`elempack > 1`) gives an empty view.
    pub fn channel(&self, c: usize) -> Mat {
        let s = &self.shape;
        debug_assert!(c < s.c.max(1), "channel {c} out of range ({})", s.c);
        debug_assert!(s.elempack <= 1, "channel view of an interleaved buffer");
        if s.elempack > 1 {
            return Mat::default();
        }
        let mut shape = Shape::new(Extent::d2(s.w, s.h), s.elemsize, s.elempack);
        if s.dims < 3 {
            shape = *s;
        }
        self.view(s.cstep * c * s.elemsize, shape, ColorFormat::Gray)
    }

    /// Rank-3 view of channels `c..c + n`.
    ///
    /// Empty for interleaved buffers, like [`channel`](Self::channel).
    pub fn channel_range(&self, c: usize, n: usize) -> Mat {
        let s = &self.shape;
        debug_assert!(c + n <= s.c, "channels {c}..{} out of range ({})", c + n, s.c);
        debug_assert!(s.elempack <= 1, "channel view of an interleaved buffer");
        if s.elempack > 1 {
            return Mat::default();
        }
        let shape = Shape {
            dims: 3,
            c: n,
            ..*s
        };
        self.view(s.cstep * c * s.elemsize, shape, ColorFormat::default_for(3, n))
    }

    /// Rank-2 view of rows `y..y + n`.
    pub fn row_range(&self, y: usize, n: usize) -> Mat {
        let s = &self.shape;
        debug_assert!(y + n <= s.h, "rows {y}..{} out of range ({})", y + n, s.h);
        let shape = Shape::new(Extent::d2(s.w, n), s.elemsize, s.elempack);
        self.view(s.w * y * s.elemsize, shape, ColorFormat::Gray)
    }

    /// Rank-1 view of elements `x..x + n`.
    pub fn range(&self, x: usize, n: usize) -> Mat {
        let s = &self.shape;
        debug_assert!(x + n <= s.total(), "range {x}..{} out of range ({})", x + n, s.total());
        let shape = Shape::new(Extent::d1(n), s.elemsize, s.elempack);
        self.view(x * s.elemsize, shape, ColorFormat::Gray)
    }

    // ========================================================================
    // Copies
    // ========================================================================

    /// Independent copy with the same layout and metadata.
    ///
    /// Empty input gives an empty result.
    pub fn deep_clone(&self, allocator: Option<SharedAllocator>) -> Mat {
        if self.is_empty() {
            return Mat::default();
        }
        let mut m = Mat::default();
        m.allocate(
            Shape::new(self.shape.extent(), self.shape.elemsize, self.shape.elempack),
            self.meta.data_type,
            allocator,
        );
        if m.is_empty() {
            return m;
        }
        copy_planes(&mut m, self);
        m.meta = self.meta;
        m
    }

    /// Copies `src` into this buffer, reallocating only if the layout differs.
    pub fn deep_clone_from(&mut self, src: &Mat, allocator: Option<SharedAllocator>) {
        if src.is_empty() {
            self.release();
            return;
        }
        let s = src.shape;
        self.create(s.extent(), s.elemsize, s.elempack, allocator);
        if self.is_empty() {
            return;
        }
        if !(self.shares_storage(src) && self.offset == src.offset) {
            copy_planes(self, src);
        }
        self.meta = src.meta;
    }

    // ========================================================================
    // Reshape
    // ========================================================================

    /// Reinterprets the buffer with new extents holding the same element count.
    ///
    /// Aliases the storage when the memory layout allows it. A copy is made
    /// when padded planes must be flattened (rank 3 to lower rank) or
    /// padding must be inserted (lower rank to rank 3). A count mismatch
    /// gives an empty buffer.
    pub fn reshape(&self, extent: Extent, allocator: Option<SharedAllocator>) -> Mat {
        let s = self.shape;
        if self.is_empty() || extent.count() != s.w * s.h * s.c {
            return Mat::default();
        }

        if extent.dims < 3 {
            if s.dims == 3 && !s.is_tight() {
                debug!(from = %s.extent(), to = %extent, "reshape: flattening padded planes");
                let mut m = Mat::default();
                m.allocate(Shape::new(extent, s.elemsize, s.elempack), self.meta.data_type, allocator);
                if m.is_empty() {
                    return m;
                }
                let plane = s.w * s.h * s.elemsize;
                for i in 0..s.c {
                    copy_bytes(&mut m, i * plane, self, i * s.cstep * s.elemsize, plane);
                }
                m.meta = self.meta;
                m.meta.color_format = ColorFormat::Gray;
                return m;
            }
            return self.alias(extent, ColorFormat::Gray);
        }

        if s.dims < 3 {
            let plane = extent.w * extent.h;
            if plane_stride(extent.w, extent.h, s.elemsize) != plane {
                debug!(from = %s.extent(), to = %extent, "reshape: padding channel planes");
                let mut m = Mat::default();
                m.allocate(Shape::new(extent, s.elemsize, s.elempack), self.meta.data_type, allocator);
                if m.is_empty() {
                    return m;
                }
                let bytes = plane * s.elemsize;
                let cstep = m.shape.cstep;
                for i in 0..extent.c {
                    copy_bytes(&mut m, i * cstep * s.elemsize, self, i * bytes, bytes);
                }
                m.meta = self.meta;
                m.meta.color_format = ColorFormat::default_for(3, extent.c);
                return m;
            }
        } else if s.c != extent.c {
            let flat = self.reshape(Extent::d1(s.w * s.h * s.c), allocator.clone());
            return flat.reshape(extent, allocator);
        }

        self.alias(extent, ColorFormat::default_for(3, extent.c))
    }

    fn alias(&self, extent: Extent, color_format: ColorFormat) -> Mat {
        let mut m = self.clone();
        m.shape = Shape::new(extent, self.shape.elemsize, self.shape.elempack);
        m.meta.color_format = color_format;
        m
    }
}

/// Copies `len` bytes between two buffers that may share storage.
fn copy_bytes(dst: &mut Mat, dst_off: usize, src: &Mat, src_off: usize, len: usize) {
    assert!(dst_off + len <= dst.shape.byte_len());
    assert!(src_off + len <= src.shape.byte_len());
    let (Some(d), Some(s)) = (dst.data_ptr(), src.data_ptr()) else {
        return;
    };
    // SAFETY: both ranges are in bounds; ptr::copy tolerates overlap.
    unsafe { std::ptr::copy(s.as_ptr().add(src_off), d.as_ptr().add(dst_off), len) };
}

/// Copies the planes of `src` into `dst` (same extents, possibly different strides).
fn copy_planes(dst: &mut Mat, src: &Mat) {
    let s = src.shape;
    if dst.shape.cstep == s.cstep {
        copy_bytes(dst, 0, src, 0, s.byte_len().min(dst.shape.byte_len()));
        return;
    }
    let plane = s.w * s.h * s.elemsize;
    let dst_step = dst.shape.cstep * dst.shape.elemsize;
    for i in 0..s.c {
        copy_bytes(dst, i * dst_step, src, i * s.cstep * s.elemsize, plane);
    }
}
