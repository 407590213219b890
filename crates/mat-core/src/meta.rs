//! Per-buffer metadata and the shape accessors shared by host and device
//! buffers.

use crate::format::{
    ColorFormat, ColorRange, ColorSpace, DataType, Device, MatFlags, Ordination, Rational,
};
use crate::shape::Shape;

/// Descriptive tags carried alongside the data.
///
/// None of these fields influence storage; they are copied forward by
/// `create_like`, `deep_clone` and `reshape`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatMeta {
    /// Element type.
    pub data_type: DataType,
    /// Bits per element, derived from `data_type`.
    pub depth: u32,
    /// Color space.
    pub color_space: ColorSpace,
    /// Pixel layout.
    pub color_format: ColorFormat,
    /// Signal range.
    pub color_range: ColorRange,
    /// Frame attributes.
    pub flags: MatFlags,
    /// Frame rate.
    pub rate: Rational,
    /// Axis order.
    pub ord: Ordination,
    /// Presentation time in seconds, NaN when unknown.
    pub time_stamp: f64,
    /// Frame duration in seconds, NaN when unknown.
    pub duration: f64,
}

impl Default for MatMeta {
    fn default() -> Self {
        Self {
            data_type: DataType::Undefined,
            depth: 0,
            color_space: ColorSpace::Srgb,
            color_format: ColorFormat::Abgr,
            color_range: ColorRange::Full,
            flags: MatFlags::NONE,
            rate: Rational::default(),
            ord: Ordination::Ncwh,
            time_stamp: f64::NAN,
            duration: f64::NAN,
        }
    }
}

impl MatMeta {
    /// Defaults for a freshly created host buffer.
    pub fn for_shape(shape: &Shape, data_type: DataType) -> Self {
        Self::for_shape_with(shape, data_type, ColorFormat::default_for(shape.dims, shape.c))
    }

    /// Defaults with an explicit color format.
    pub fn for_shape_with(shape: &Shape, data_type: DataType, color_format: ColorFormat) -> Self {
        let ord = if shape.elempack > 1 && shape.elempack == shape.c {
            Ordination::Nwhc
        } else {
            Ordination::Ncwh
        };
        Self {
            data_type,
            depth: data_type.bits(),
            color_format,
            ord,
            ..Self::default()
        }
    }

    /// Sets the element type and keeps `depth` in sync.
    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
        self.depth = data_type.bits();
    }
}

/// Shape and metadata accessors shared by every buffer kind.
pub trait MatShape {
    /// Geometry.
    fn shape(&self) -> &Shape;

    /// Metadata.
    fn meta(&self) -> &MatMeta;

    /// Device holding the storage.
    fn device(&self) -> Device;

    /// Device index, `-1` for host memory.
    fn device_number(&self) -> i32;

    /// Returns true when there is no storage or no element.
    fn is_empty(&self) -> bool;

    /// Rank (0 when empty).
    fn dims(&self) -> u32 {
        self.shape().dims
    }

    /// Width.
    fn w(&self) -> usize {
        self.shape().w
    }

    /// Height.
    fn h(&self) -> usize {
        self.shape().h
    }

    /// Channels.
    fn c(&self) -> usize {
        self.shape().c
    }

    /// Bytes per scalar.
    fn elemsize(&self) -> usize {
        self.shape().elemsize
    }

    /// Interleaving factor.
    fn elempack(&self) -> usize {
        self.shape().elempack
    }

    /// Channel plane stride in elements.
    fn cstep(&self) -> usize {
        self.shape().cstep
    }

    /// Element count including plane padding.
    fn total(&self) -> usize {
        self.shape().total()
    }

    /// Bits per element.
    fn elembits(&self) -> usize {
        self.shape().elembits()
    }

    /// Element type.
    fn data_type(&self) -> DataType {
        self.meta().data_type
    }

    /// Pixel layout.
    fn color_format(&self) -> ColorFormat {
        self.meta().color_format
    }

    /// Presentation time in seconds.
    fn time_stamp(&self) -> f64 {
        self.meta().time_stamp
    }

    /// Frame duration in seconds.
    fn duration(&self) -> f64 {
        self.meta().duration
    }

    /// Frame attributes.
    fn flags(&self) -> MatFlags {
        self.meta().flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Extent;

    #[test]
    fn test_default_meta() {
        let m = MatMeta::default();
        assert_eq!(m.data_type, DataType::Undefined);
        assert_eq!(m.color_format, ColorFormat::Abgr);
        assert!(m.time_stamp.is_nan());
        assert!(m.duration.is_nan());
        assert_eq!(m.rate, Rational::new(0, 0));
    }

    #[test]
    fn test_meta_for_shape() {
        let s = Shape::new(Extent::d3(4, 4, 3), 4, 1);
        let m = MatMeta::for_shape(&s, DataType::Float32);
        assert_eq!(m.depth, 32);
        assert_eq!(m.color_format, ColorFormat::Bgr);
        assert_eq!(m.ord, Ordination::Ncwh);

        let packed = Shape::new(Extent::d3(4, 4, 4), 1, 4);
        let m = MatMeta::for_shape(&packed, DataType::Int8);
        assert_eq!(m.ord, Ordination::Nwhc);
        assert_eq!(m.color_format, ColorFormat::Abgr);
    }

    #[test]
    fn test_set_data_type() {
        let mut m = MatMeta::default();
        m.set_data_type(DataType::Float16);
        assert_eq!(m.depth, 16);
    }
}
