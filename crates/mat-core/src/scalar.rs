//! Element types a buffer can hold, and runtime dispatch over them.
//!
//! [`Element`] is implemented for the seven tagged types. Arithmetic
//! follows the storage type: integers wrap, `f16` computes in `f32` and
//! rounds back. Drawing treats integers as unsigned normalized values scaled
//! by their unsigned maximum (`255` for `i8`).

use std::fmt::Debug;

use half::f16;

use crate::format::DataType;
use crate::fp16::{float16_to_float32, float32_to_float16};

mod sealed {
    pub trait Sealed {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for half::f16 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// A scalar type that can be stored in a [`Mat`](crate::Mat).
pub trait Element:
    sealed::Sealed + bytemuck::Pod + Send + Sync + PartialOrd + Debug + 'static
{
    /// Runtime tag of the type.
    const TYPE: DataType;

    /// Additive identity.
    fn zero() -> Self;

    /// Converts from `f64`, saturating for integers.
    fn from_f64(v: f64) -> Self;

    /// Widens to `f64`.
    fn to_f64(self) -> f64;

    /// Sum; wraps for integers.
    fn add(self, rhs: Self) -> Self;

    /// Difference; wraps for integers.
    fn sub(self, rhs: Self) -> Self;

    /// Product; wraps for integers.
    fn mul(self, rhs: Self) -> Self;

    /// Quotient, `None` for integer division by zero.
    fn div(self, rhs: Self) -> Option<Self>;

    /// Returns true for zero.
    fn is_zero(self) -> bool;

    /// Value of `1.0` in drawing units (unsigned maximum for integers).
    const UNORM_SCALE: f32;

    /// Raw value for drawing (integers read as unsigned), `None` if unsupported.
    fn to_unorm(self) -> Option<f32>;

    /// Stores a raw drawing value, truncating for integers; `None` if unsupported.
    fn from_unorm(v: f32) -> Option<Self>;
}

macro_rules! impl_int_element {
    ($t:ty, $u:ty, $tag:expr) => {
        impl Element for $t {
            const TYPE: DataType = $tag;

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            #[inline]
            fn div(self, rhs: Self) -> Option<Self> {
                if rhs == 0 { None } else { Some(self.wrapping_div(rhs)) }
            }

            #[inline]
            fn is_zero(self) -> bool {
                self == 0
            }

            const UNORM_SCALE: f32 = <$u>::MAX as f32;

            #[inline]
            fn to_unorm(self) -> Option<f32> {
                Some((self as $u) as f32)
            }

            #[inline]
            fn from_unorm(v: f32) -> Option<Self> {
                Some(v as $u as $t)
            }
        }
    };
}

impl_int_element!(i8, u8, DataType::Int8);
impl_int_element!(i16, u16, DataType::Int16);
impl_int_element!(i32, u32, DataType::Int32);
impl_int_element!(i64, u64, DataType::Int64);

macro_rules! impl_float_element {
    ($t:ty, $tag:expr) => {
        impl Element for $t {
            const TYPE: DataType = $tag;

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            #[inline]
            fn div(self, rhs: Self) -> Option<Self> {
                Some(self / rhs)
            }

            #[inline]
            fn is_zero(self) -> bool {
                self == 0.0
            }

            const UNORM_SCALE: f32 = 1.0;

            #[inline]
            fn to_unorm(self) -> Option<f32> {
                Some(self as f32)
            }

            #[inline]
            fn from_unorm(v: f32) -> Option<Self> {
                Some(v as $t)
            }
        }
    };
}

impl_float_element!(f32, DataType::Float32);
impl_float_element!(f64, DataType::Float64);

#[inline]
fn widen(v: f16) -> f32 {
    float16_to_float32(v.to_bits())
}

#[inline]
fn narrow(v: f32) -> f16 {
    f16::from_bits(float32_to_float16(v))
}

impl Element for f16 {
    const TYPE: DataType = DataType::Float16;

    fn zero() -> Self {
        f16::from_bits(0)
    }

    fn from_f64(v: f64) -> Self {
        narrow(v as f32)
    }

    fn to_f64(self) -> f64 {
        widen(self) as f64
    }

    fn add(self, rhs: Self) -> Self {
        narrow(widen(self) + widen(rhs))
    }

    fn sub(self, rhs: Self) -> Self {
        narrow(widen(self) - widen(rhs))
    }

    fn mul(self, rhs: Self) -> Self {
        narrow(widen(self) * widen(rhs))
    }

    fn div(self, rhs: Self) -> Option<Self> {
        Some(narrow(widen(self) / widen(rhs)))
    }

    fn is_zero(self) -> bool {
        self.to_bits() & 0x7FFF == 0
    }

    const UNORM_SCALE: f32 = 1.0;

    // drawing on half-float buffers is not supported
    fn to_unorm(self) -> Option<f32> {
        None
    }

    fn from_unorm(_v: f32) -> Option<Self> {
        None
    }
}

/// Runs `$body` with `$T` bound to the Rust type matching a [`DataType`].
///
/// `Undefined` runs `$fallback`.
macro_rules! dispatch {
    ($ty:expr, $T:ident => $body:expr, _ => $fallback:expr) => {
        match $ty {
            $crate::format::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::format::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::format::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::format::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::format::DataType::Float16 => {
                type $T = half::f16;
                $body
            }
            $crate::format::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::format::DataType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::format::DataType::Undefined => $fallback,
        }
    };
}

pub(crate) use dispatch;

#[cfg(test)]
mod tests {
    use super::*;

    fn size_of_tag(ty: DataType) -> usize {
        dispatch!(ty, T => std::mem::size_of::<T>(), _ => 0)
    }

    #[test]
    fn test_dispatch_matches_tag() {
        for ty in DataType::ALL {
            assert_eq!(size_of_tag(ty), ty.size());
        }
        assert_eq!(size_of_tag(DataType::Undefined), 0);
    }

    #[test]
    fn test_integer_wrapping() {
        assert_eq!(Element::add(127i8, 1), -128);
        assert_eq!(Element::mul(100i8, 3), 44);
        assert_eq!(Element::div(5i32, 0), None);
        assert_eq!(Element::div(i8::MIN, -1), Some(i8::MIN));
    }

    #[test]
    fn test_f16_arithmetic() {
        let a = f16::from_f32(1.5);
        let b = f16::from_f32(2.0);
        assert_eq!(Element::add(a, b).to_f32(), 3.5);
        assert_eq!(Element::mul(a, b).to_f32(), 3.0);
        assert_eq!(<f16 as Element>::from_f64(0.25).to_f32(), 0.25);
        assert!(Element::is_zero(f16::from_f32(-0.0)));
    }

    #[test]
    fn test_unorm_mapping() {
        assert_eq!(<i8 as Element>::UNORM_SCALE, 255.0);
        assert_eq!(<i8 as Element>::from_unorm(255.0), Some(-1i8));
        assert_eq!(Element::to_unorm(-1i8), Some(255.0));
        assert_eq!(<i16 as Element>::from_unorm(0.5 * 65535.0), Some(32767));
        assert_eq!(<f32 as Element>::from_unorm(0.25), Some(0.25));
        assert_eq!(<f16 as Element>::from_unorm(0.25), None);
        // out of range saturates instead of wrapping
        assert_eq!(<i8 as Element>::from_unorm(300.0), Some(-1i8));
    }

    #[test]
    fn test_from_f64_saturates() {
        assert_eq!(<i8 as Element>::from_f64(300.0), 127);
        assert_eq!(<i16 as Element>::from_f64(-1.0e9), i16::MIN);
        assert_eq!(<i32 as Element>::from_f64(2.9), 2);
    }
}
