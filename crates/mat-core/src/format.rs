//! Element types, devices and color/format metadata tags.
//!
//! Everything in this module is plain data: the tags are carried by a
//! [`Mat`](crate::Mat) and copied forward by `create_like`, `deep_clone` and
//! `reshape`, but no operation converts pixels between color spaces.
//!
//! # Types
//!
//! - [`DataType`] - runtime element type tag (`Int8` .. `Float64`)
//! - [`Device`] - where the storage lives
//! - [`ColorFormat`], [`ColorSpace`], [`ColorRange`] - pixel layout tags
//! - [`Ordination`] - axis order tag
//! - [`InterpolateMode`] - resampling tag for downstream filters
//! - [`Rational`] - frame rate
//! - [`MatFlags`] - frame attribute bit set
//!
//! # Usage
//!
//! ```rust
//! use mat_core::format::{ColorFormat, DataType, FormatCategory};
//!
//! assert_eq!(DataType::Float16.size(), 2);
//! assert_eq!(ColorFormat::Nv12.channels(), 2);
//! assert_eq!(ColorFormat::Rgba.category(), FormatCategory::Rgb);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

// ============================================================================
// Element type
// ============================================================================

/// Runtime element type of a buffer.
///
/// Numeric values are stable (`Int8 = 0` .. `Float64 = 6`), `Undefined` is
/// the sentinel `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum DataType {
    /// Unknown or unset type.
    #[default]
    Undefined = -1,
    /// Signed 8-bit integer.
    Int8 = 0,
    /// Signed 16-bit integer.
    Int16 = 1,
    /// Signed 32-bit integer.
    Int32 = 2,
    /// Signed 64-bit integer.
    Int64 = 3,
    /// IEEE 754 half precision.
    Float16 = 4,
    /// IEEE 754 single precision.
    Float32 = 5,
    /// IEEE 754 double precision.
    Float64 = 6,
}

impl DataType {
    /// All defined element types, in tag order.
    pub const ALL: [DataType; 7] = [
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Float16,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Size of one element in bytes (0 for `Undefined`).
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 | Self::Float16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
            Self::Undefined => 0,
        }
    }

    /// Bit depth of one element (0 for `Undefined`).
    pub const fn bits(&self) -> u32 {
        (self.size() * 8) as u32
    }

    /// Returns true for the floating-point types.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Returns true for the integer types.
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Maps a raw tag back to a type; out-of-range values give `Undefined`.
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Int8,
            1 => Self::Int16,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Float16,
            5 => Self::Float32,
            6 => Self::Float64,
            _ => Self::Undefined,
        }
    }

    /// Infers a type from the byte size of one scalar.
    ///
    /// Buffers created by element size alone do not know whether two bytes
    /// hold an `i16` or an `f16`; the integer reading is chosen for 1 and 2
    /// bytes and the float reading for 4 and 8.
    pub const fn from_scalar_size(size: usize) -> Self {
        match size {
            1 => Self::Int8,
            2 => Self::Int16,
            4 => Self::Float32,
            8 => Self::Float64,
            _ => Self::Undefined,
        }
    }

    /// Lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Undefined => "undefined",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Device
// ============================================================================

/// Where a buffer's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory.
    #[default]
    Cpu = 0,
    /// Linear GPU buffer.
    Vulkan = 1,
    /// Opaque GPU image.
    VulkanImage = 2,
    /// CUDA device memory.
    Cuda = 3,
}

impl Device {
    /// Returns true for device (non-host) memory.
    pub const fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

// ============================================================================
// Color tags
// ============================================================================

/// Signal range of pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    /// Full range (0..max).
    #[default]
    Full = 0,
    /// Narrow / studio range.
    Narrow = 1,
}

/// Color space tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// sRGB.
    #[default]
    Srgb = 0,
    /// ITU-R BT.601.
    Bt601 = 1,
    /// ITU-R BT.709.
    Bt709 = 2,
    /// ITU-R BT.2020.
    Bt2020 = 3,
    /// Hue, saturation, value.
    Hsv = 4,
    /// Hue, lightness, saturation.
    Hls = 5,
    /// Cyan, magenta, yellow.
    Cmy = 6,
    /// CIE L*a*b*.
    Lab = 7,
}

/// Broad family of a [`ColorFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatCategory {
    /// Single channel.
    Mono = 0,
    /// Packed or planar RGB family, with or without alpha.
    Rgb = 1,
    /// Luma/chroma family.
    Yuv = 2,
}

/// Pixel layout tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    /// Single channel.
    Gray = 0,
    /// Blue, green, red.
    Bgr = 1,
    /// Alpha, blue, green, red.
    #[default]
    Abgr = 2,
    /// Blue, green, red, alpha.
    Bgra = 3,
    /// Red, green, blue.
    Rgb = 4,
    /// Alpha, red, green, blue.
    Argb = 5,
    /// Red, green, blue, alpha.
    Rgba = 6,
    /// 4:2:0 subsampled YUV.
    Yuv420 = 7,
    /// 4:2:2 subsampled YUV.
    Yuv422 = 8,
    /// Full resolution YUV.
    Yuv444 = 9,
    /// YUV with alpha.
    Yuva = 10,
    /// Semi-planar 4:2:0, 8-bit.
    Nv12 = 11,
    /// Semi-planar 4:2:0, 10-bit little endian.
    P010le = 12,
}

impl ColorFormat {
    /// Maps a raw tag back to a format.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Gray,
            1 => Self::Bgr,
            2 => Self::Abgr,
            3 => Self::Bgra,
            4 => Self::Rgb,
            5 => Self::Argb,
            6 => Self::Rgba,
            7 => Self::Yuv420,
            8 => Self::Yuv422,
            9 => Self::Yuv444,
            10 => Self::Yuva,
            11 => Self::Nv12,
            12 => Self::P010le,
            _ => return None,
        })
    }

    /// Format family.
    pub const fn category(&self) -> FormatCategory {
        match self {
            Self::Gray => FormatCategory::Mono,
            Self::Bgr | Self::Abgr | Self::Bgra | Self::Rgb | Self::Argb | Self::Rgba => {
                FormatCategory::Rgb
            }
            Self::Yuv420
            | Self::Yuv422
            | Self::Yuv444
            | Self::Yuva
            | Self::Nv12
            | Self::P010le => FormatCategory::Yuv,
        }
    }

    /// Number of stored planes/channels.
    ///
    /// Subsampled YUV formats count as two (luma plus interleaved chroma).
    pub const fn channels(&self) -> u32 {
        match self {
            Self::Gray => 1,
            Self::Yuv420 | Self::Yuv422 | Self::Nv12 | Self::P010le => 2,
            Self::Bgr | Self::Rgb | Self::Yuv444 => 3,
            Self::Abgr | Self::Bgra | Self::Argb | Self::Rgba | Self::Yuva => 4,
        }
    }

    /// Returns true for single-channel gray.
    pub const fn is_mono(&self) -> bool {
        matches!(self.category(), FormatCategory::Mono)
    }

    /// Returns true for the RGB family.
    pub const fn is_rgb(&self) -> bool {
        matches!(self.category(), FormatCategory::Rgb)
    }

    /// Returns true for the YUV family.
    pub const fn is_yuv(&self) -> bool {
        matches!(self.category(), FormatCategory::Yuv)
    }

    /// Returns true when the format carries an alpha channel.
    pub const fn has_alpha(&self) -> bool {
        matches!(
            self,
            Self::Abgr | Self::Bgra | Self::Argb | Self::Rgba | Self::Yuva
        )
    }

    /// Default tag for a freshly created host buffer.
    ///
    /// Rank 3 picks by channel count (1: `Gray`, 3: `Bgr`, otherwise
    /// `Abgr`); lower ranks are `Gray`.
    pub const fn default_for(dims: u32, c: usize) -> Self {
        if dims < 3 {
            return Self::Gray;
        }
        match c {
            1 => Self::Gray,
            3 => Self::Bgr,
            _ => Self::Abgr,
        }
    }
}

/// Category of a raw color format tag, `-1` for unknown values.
pub fn color_format_category(raw: i32) -> i32 {
    ColorFormat::from_raw(raw).map_or(-1, |f| f.category() as i32)
}

/// Channel count of a raw color format tag, `0` for unknown values.
pub fn color_format_channels(raw: i32) -> u32 {
    ColorFormat::from_raw(raw).map_or(0, |f| f.channels())
}

/// Axis order tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ordination {
    /// Planar channels.
    #[default]
    Ncwh = 0,
    /// Interleaved channels.
    Nwhc = 1,
    /// Planar, height-major.
    Nchw = 2,
    /// Interleaved, height-major.
    Nhwc = 3,
}

/// Resampling filter tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterpolateMode {
    /// Nearest neighbour.
    Nearest = 0,
    /// Bilinear.
    #[default]
    Bilinear = 1,
    /// Bicubic.
    Bicubic = 2,
    /// Area averaging.
    Area = 3,
    /// Trilinear (3D LUTs).
    Trilinear = 4,
    /// Tetrahedral (3D LUTs).
    Tetrahedral = 5,
}

/// Frame rate as a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rational {
    /// Numerator.
    pub num: i32,
    /// Denominator.
    pub den: i32,
}

impl Rational {
    /// Creates a rational.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as a float, `None` when the denominator is zero.
    pub fn to_f64(&self) -> Option<f64> {
        (self.den != 0).then(|| self.num as f64 / self.den as f64)
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Frame attribute bit set.
///
/// Bit positions are stable so that the value can be exchanged with decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatFlags(u32);

impl MatFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Buffer holds a decoded video frame.
    pub const VIDEO_FRAME: Self = Self(1 << 0);
    /// Interlaced video.
    pub const VIDEO_INTERLACED: Self = Self(1 << 1);
    /// Intra-coded frame.
    pub const VIDEO_FRAME_I: Self = Self(1 << 2);
    /// Predicted frame.
    pub const VIDEO_FRAME_P: Self = Self(1 << 3);
    /// Bidirectional frame.
    pub const VIDEO_FRAME_B: Self = Self(1 << 4);
    /// PQ transfer (HDR).
    pub const VIDEO_HDR_PQ: Self = Self(1 << 5);
    /// HLG transfer (HDR).
    pub const VIDEO_HDR_HLG: Self = Self(1 << 6);
    /// Chroma plane of a semi-planar frame.
    pub const VIDEO_FRAME_UV: Self = Self(1 << 7);
    /// Buffer holds audio samples.
    pub const AUDIO_FRAME: Self = Self(1 << 8);
    /// Buffer holds a still image.
    pub const IMAGE_FRAME: Self = Self(1 << 16);
    /// Normal frame produced by a custom source.
    pub const CUSTOM_NORMAL: Self = Self(1 << 24);
    /// Preroll frame, decoded but not presented.
    pub const CUSTOM_PREROLL: Self = Self(1 << 25);
    /// End of stream marker.
    pub const CUSTOM_EOS: Self = Self(1 << 26);
    /// Frame is invalid.
    pub const CUSTOM_INVALID: Self = Self(1 << 27);
    /// Frame format is not supported.
    pub const CUSTOM_UNSUPPORTED: Self = Self(1 << 28);

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if no bit is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for MatFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MatFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MatFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        let sizes: Vec<usize> = DataType::ALL.iter().map(|t| t.size()).collect();
        assert_eq!(sizes, vec![1, 2, 4, 8, 2, 4, 8]);
        assert_eq!(DataType::Undefined.size(), 0);
        assert_eq!(DataType::Float16.bits(), 16);
    }

    #[test]
    fn test_data_type_raw_roundtrip() {
        for ty in DataType::ALL {
            assert_eq!(DataType::from_raw(ty as i32), ty);
        }
        assert_eq!(DataType::from_raw(42), DataType::Undefined);
        assert_eq!(DataType::from_raw(-1), DataType::Undefined);
    }

    #[test]
    fn test_scalar_size_inference() {
        assert_eq!(DataType::from_scalar_size(1), DataType::Int8);
        assert_eq!(DataType::from_scalar_size(2), DataType::Int16);
        assert_eq!(DataType::from_scalar_size(4), DataType::Float32);
        assert_eq!(DataType::from_scalar_size(8), DataType::Float64);
        assert_eq!(DataType::from_scalar_size(3), DataType::Undefined);
    }

    #[test]
    fn test_format_channels() {
        assert_eq!(ColorFormat::Gray.channels(), 1);
        assert_eq!(ColorFormat::Nv12.channels(), 2);
        assert_eq!(ColorFormat::P010le.channels(), 2);
        assert_eq!(ColorFormat::Yuv420.channels(), 2);
        assert_eq!(ColorFormat::Bgr.channels(), 3);
        assert_eq!(ColorFormat::Yuv444.channels(), 3);
        assert_eq!(ColorFormat::Rgba.channels(), 4);
        assert_eq!(ColorFormat::Yuva.channels(), 4);
    }

    #[test]
    fn test_format_category() {
        assert_eq!(ColorFormat::Gray.category(), FormatCategory::Mono);
        assert_eq!(ColorFormat::Argb.category(), FormatCategory::Rgb);
        assert_eq!(ColorFormat::P010le.category(), FormatCategory::Yuv);
        assert_eq!(color_format_category(ColorFormat::Bgr as i32), 1);
        assert_eq!(color_format_category(99), -1);
        assert_eq!(color_format_channels(-3), 0);
    }

    #[test]
    fn test_format_predicates() {
        assert!(ColorFormat::Abgr.has_alpha());
        assert!(ColorFormat::Yuva.has_alpha());
        assert!(!ColorFormat::Bgr.has_alpha());
        assert!(ColorFormat::Bgra.is_rgb());
        assert!(ColorFormat::Nv12.is_yuv());
        assert!(!ColorFormat::Gray.is_rgb());
        assert!(ColorFormat::Gray.is_mono());
        assert!(!ColorFormat::Yuv444.is_mono());
    }

    #[test]
    fn test_default_color_format() {
        assert_eq!(ColorFormat::default_for(3, 1), ColorFormat::Gray);
        assert_eq!(ColorFormat::default_for(3, 3), ColorFormat::Bgr);
        assert_eq!(ColorFormat::default_for(3, 4), ColorFormat::Abgr);
        assert_eq!(ColorFormat::default_for(3, 2), ColorFormat::Abgr);
        assert_eq!(ColorFormat::default_for(2, 4), ColorFormat::Gray);
    }

    #[test]
    fn test_flags_bits() {
        assert_eq!(MatFlags::AUDIO_FRAME.bits(), 1 << 8);
        assert_eq!(MatFlags::IMAGE_FRAME.bits(), 1 << 16);
        assert_eq!(MatFlags::CUSTOM_UNSUPPORTED.bits(), 1 << 28);

        let mut flags = MatFlags::VIDEO_FRAME | MatFlags::VIDEO_FRAME_I;
        assert!(flags.contains(MatFlags::VIDEO_FRAME));
        flags.remove(MatFlags::VIDEO_FRAME);
        assert!(!flags.contains(MatFlags::VIDEO_FRAME));
        flags.insert(MatFlags::CUSTOM_EOS);
        assert_eq!(flags.bits(), (1 << 2) | (1 << 26));
        assert!(MatFlags::NONE.is_empty());
    }

    #[test]
    fn test_rational() {
        assert_eq!(Rational::new(30000, 1001).to_f64().map(|v| (v * 100.0).round()), Some(2997.0));
        assert_eq!(Rational::default().to_f64(), None);
    }
}
