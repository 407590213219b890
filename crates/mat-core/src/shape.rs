//! Buffer geometry: rank, extents, element size, packing and channel stride.
//!
//! A rank-3 buffer stores `c` channel planes; each plane is `cstep`
//! elements long, where `cstep` rounds `w * h * elemsize` up to 16 bytes.
//! Lower ranks are tightly packed.
//!
//! ```rust
//! use mat_core::{Extent, Shape};
//!
//! let s = Shape::new(Extent::d3(3, 3, 2), 4, 1);
//! assert_eq!(s.cstep, 12); // 9 floats padded to 48 bytes
//! assert_eq!(s.total(), 24);
//! ```

use std::fmt;

use crate::memory::align_size;

/// Logical extents of a buffer, rank 1 to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Rank (1, 2 or 3).
    pub dims: u32,
    /// Width (fastest axis).
    pub w: usize,
    /// Height; 1 for rank 1.
    pub h: usize,
    /// Channels; 1 below rank 3.
    pub c: usize,
}

impl Extent {
    /// Rank-1 extent of `w` elements.
    pub const fn d1(w: usize) -> Self {
        Self { dims: 1, w, h: 1, c: 1 }
    }

    /// Rank-2 extent, `w` columns by `h` rows.
    pub const fn d2(w: usize, h: usize) -> Self {
        Self { dims: 2, w, h, c: 1 }
    }

    /// Rank-3 extent with `c` channels.
    pub const fn d3(w: usize, h: usize, c: usize) -> Self {
        Self { dims: 3, w, h, c }
    }

    /// Number of logical elements.
    pub const fn count(&self) -> usize {
        self.w * self.h * self.c
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims {
            1 => write!(f, "[{}]", self.w),
            2 => write!(f, "[{}x{}]", self.w, self.h),
            _ => write!(f, "[{}x{}x{}]", self.w, self.h, self.c),
        }
    }
}

/// Channel plane stride in elements for a rank-3 buffer.
pub const fn plane_stride(w: usize, h: usize, elemsize: usize) -> usize {
    if elemsize == 0 {
        return 0;
    }
    align_size(w * h * elemsize, 16) / elemsize
}

/// Full geometry of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    /// Rank; 0 for the empty buffer.
    pub dims: u32,
    /// Width.
    pub w: usize,
    /// Height.
    pub h: usize,
    /// Channels.
    pub c: usize,
    /// Bytes per scalar.
    pub elemsize: usize,
    /// Interleaving factor; `> 1` means channels are stored interleaved
    /// (`elempack == c` for fully packed pixels).
    pub elempack: usize,
    /// Elements between consecutive channel planes.
    pub cstep: usize,
}

impl Shape {
    /// The empty shape.
    pub const EMPTY: Shape = Shape {
        dims: 0,
        w: 0,
        h: 0,
        c: 0,
        elemsize: 0,
        elempack: 0,
        cstep: 0,
    };

    /// Derives the geometry (including `cstep`) for an extent.
    pub const fn new(extent: Extent, elemsize: usize, elempack: usize) -> Self {
        let cstep = match extent.dims {
            1 => extent.w,
            2 => extent.w * extent.h,
            _ => plane_stride(extent.w, extent.h, elemsize),
        };
        Self {
            dims: extent.dims,
            w: extent.w,
            h: extent.h,
            c: extent.c,
            elemsize,
            elempack,
            cstep,
        }
    }

    /// Extents without the storage details.
    pub const fn extent(&self) -> Extent {
        Extent {
            dims: self.dims,
            w: self.w,
            h: self.h,
            c: self.c,
        }
    }

    /// Element count including plane padding.
    pub const fn total(&self) -> usize {
        self.cstep * self.c
    }

    /// Bytes spanned by the buffer.
    pub const fn byte_len(&self) -> usize {
        self.total() * self.elemsize
    }

    /// Bits per element.
    pub const fn elembits(&self) -> usize {
        if self.elempack == 0 {
            return 0;
        }
        self.elemsize * 8 / self.elempack
    }

    /// Returns true when channel planes carry no padding.
    pub const fn is_tight(&self) -> bool {
        self.cstep == self.w * self.h
    }

    /// Size requested from an allocator: `byte_len` rounded up to 4.
    pub const fn alloc_size(&self) -> usize {
        align_size(self.byte_len(), 4)
    }

    /// Returns true if extents, element size and packing all match.
    pub fn same_layout(&self, other: &Shape) -> bool {
        self.dims == other.dims
            && self.w == other.w
            && self.h == other.h
            && self.c == other.c
            && self.elemsize == other.elemsize
            && self.elempack == other.elempack
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} elemsize={} elempack={}", self.extent(), self.elemsize, self.elempack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cstep_rank3_padding() {
        // 4x4 i8 is already 16 bytes
        assert_eq!(Shape::new(Extent::d3(4, 4, 3), 1, 1).cstep, 16);
        // 3x3 i8 pads to 16
        assert_eq!(Shape::new(Extent::d3(3, 3, 2), 1, 1).cstep, 16);
        // 5x5 f32 = 100 bytes pads to 112 / 4 = 28
        assert_eq!(Shape::new(Extent::d3(5, 5, 1), 4, 1).cstep, 28);
    }

    #[test]
    fn test_cstep_low_ranks() {
        assert_eq!(Shape::new(Extent::d1(7), 4, 1).cstep, 7);
        assert_eq!(Shape::new(Extent::d2(3, 5), 2, 1).cstep, 15);
    }

    #[test]
    fn test_total_and_bytes() {
        let s = Shape::new(Extent::d3(3, 3, 2), 4, 1);
        assert_eq!(s.cstep, 12);
        assert_eq!(s.total(), 24);
        assert_eq!(s.byte_len(), 96);
        assert!(!s.is_tight());
        assert_eq!(Shape::EMPTY.total(), 0);
    }

    #[test]
    fn test_elembits() {
        assert_eq!(Shape::new(Extent::d2(2, 2), 4, 1).elembits(), 32);
        assert_eq!(Shape::new(Extent::d3(2, 2, 4), 4, 4).elembits(), 8);
        assert_eq!(Shape::EMPTY.elembits(), 0);
    }

    #[test]
    fn test_alloc_size_rounds_to_four() {
        let s = Shape::new(Extent::d1(3), 1, 1);
        assert_eq!(s.alloc_size(), 4);
        let s = Shape::new(Extent::d2(2, 3), 2, 1);
        assert_eq!(s.alloc_size(), 12);
    }

    #[test]
    fn test_display() {
        assert_eq!(Extent::d3(4, 2, 3).to_string(), "[4x2x3]");
        assert_eq!(Extent::d1(9).to_string(), "[9]");
    }
}
