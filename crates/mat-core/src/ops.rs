//! Arithmetic on [`Mat`]: scalar and element-wise operators, fills and
//! small linear algebra.
//!
//! Every operation dispatches on the buffer's [`DataType`] tag and computes
//! in the storage type. Integers wrap on overflow. Division never writes
//! where the divisor is zero: in-place operations keep the old value,
//! out-of-place element-wise division yields zero there.
//!
//! Element-wise operators require equal `w`, `h`, `c` and type; a mismatch
//! is a debug assertion and yields an empty result (or no change) in release
//! builds.
//!
//! # Example
//!
//! ```rust
//! use mat_core::prelude::*;
//!
//! let mut a = Mat::new_type(Extent::d2(2, 2), DataType::Float32);
//! a.eye(2.0);
//! let b = &a * &a;
//! assert_eq!(b.at_2d::<f32>(1, 1), 4.0);
//!
//! let c = &b + 1.0;
//! assert_eq!(c.at_2d::<f32>(0, 1), 1.0);
//! ```

use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{trace, warn};

use crate::format::DataType;
use crate::mat::Mat;
use crate::meta::MatShape;
use crate::parallel;
use crate::scalar::{dispatch, Element};
use crate::shape::Extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    #[inline]
    fn apply<T: Element>(self, a: T, b: T) -> Option<T> {
        match self {
            Self::Add => Some(T::add(a, b)),
            Self::Sub => Some(T::sub(a, b)),
            Self::Mul => Some(T::mul(a, b)),
            Self::Div => T::div(a, b),
        }
    }
}

fn untyped(op: &str) {
    trace!(op, "skipped: buffer has no element type");
}

fn same_operands(a: &Mat, b: &Mat, op: &str) -> bool {
    let same = a.w() == b.w() && a.h() == b.h() && a.c() == b.c() && a.data_type() == b.data_type();
    debug_assert!(
        same,
        "{op}: operand mismatch {} {} vs {} {}",
        a.shape().extent(),
        a.data_type(),
        b.shape().extent(),
        b.data_type()
    );
    same
}

// ============================================================================
// Typed kernels
// ============================================================================

fn fill_typed<T: Element>(m: &mut Mat, value: T) {
    parallel::for_each_mut(m.data_mut::<T>(), |v| *v = value);
}

fn scalar_assign<T: Element>(m: &mut Mat, op: BinaryOp, s: T) {
    parallel::for_each_mut(m.data_mut::<T>(), |v| {
        if let Some(r) = op.apply(*v, s) {
            *v = r;
        }
    });
}

fn scalar_into<T: Element>(dst: &mut Mat, src: &Mat, op: BinaryOp, s: T) {
    parallel::map_into(dst.data_mut::<T>(), src.as_slice::<T>(), |&v| {
        op.apply(v, s).unwrap_or(v)
    });
}

fn binary_assign<T: Element>(dst: &mut Mat, rhs: &Mat, op: BinaryOp) {
    parallel::zip_mut(dst.data_mut::<T>(), rhs.as_slice::<T>(), |d, &r| {
        if let Some(v) = op.apply(*d, r) {
            *d = v;
        }
    });
}

fn binary_into<T: Element>(dst: &mut Mat, a: &Mat, b: &Mat, op: BinaryOp) {
    parallel::zip_into(dst.data_mut::<T>(), a.as_slice::<T>(), b.as_slice::<T>(), |x, y| {
        op.apply(x, y).unwrap_or_else(T::zero)
    });
}

fn clip_typed<T: Element>(m: &mut Mat, lo: T, hi: T) {
    parallel::for_each_mut(m.data_mut::<T>(), |v| {
        if *v < lo {
            *v = lo;
        } else if *v > hi {
            *v = hi;
        }
    });
}

fn square_typed<T: Element>(m: &mut Mat) {
    parallel::for_each_mut(m.data_mut::<T>(), |v| *v = T::mul(*v, *v));
}

fn eye_typed<T: Element>(m: &mut Mat, scale: T) {
    let s = *m.shape();
    let data = m.data_mut::<T>();
    if s.dims == 1 {
        if let Some(first) = data.first_mut() {
            *first = scale;
        }
        return;
    }
    let planes = if s.dims == 3 { s.c } else { 1 };
    for ch in 0..planes {
        let plane = &mut data[ch * s.cstep..ch * s.cstep + s.w * s.h];
        for (y, row) in plane.chunks_mut(s.w.max(1)).enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                *v = if x == y { scale } else { T::zero() };
            }
        }
    }
}

fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn randn_typed<T: Element>(m: &mut Mat, mean: f64, stddev: f64, rng: &mut StdRng) {
    for v in m.data_mut::<T>() {
        *v = T::from_f64(mean + stddev * standard_normal(rng));
    }
}

fn transpose_typed<T: Element>(dst: &mut Mat, src: &Mat) {
    let s = *src.shape();
    let (w, h) = (s.w, s.h);
    let dst_step = dst.cstep();
    let from = src.as_slice::<T>();
    let to = dst.data_mut::<T>();
    for ch in 0..s.c {
        let src_plane = &from[ch * s.cstep..ch * s.cstep + w * h];
        let dst_plane = &mut to[ch * dst_step..ch * dst_step + w * h];
        for y in 0..h {
            for x in 0..w {
                dst_plane[x * h + y] = src_plane[y * w + x];
            }
        }
    }
}

fn invert_typed<T: Element>(src: &Mat, n: usize) -> Mat {
    let mut a: Vec<f64> = src.as_slice::<T>()[..n * n].iter().map(|v| v.to_f64()).collect();
    let mut inv = vec![0.0f64; n * n];
    for i in 0..n {
        inv[i * n + i] = 1.0;
    }

    let mut out = Mat::new_type(Extent::d2(n, n), T::TYPE);
    if out.is_empty() {
        return out;
    }
    *out.meta_mut() = *src.meta();

    // pivots at rounding-noise level relative to the largest entry count as zero
    let max_abs = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let tolerance = f64::EPSILON * max_abs * n as f64;

    for i in 0..n {
        let mut pivot = i;
        let mut best = a[i * n + i].abs();
        for j in i + 1..n {
            let v = a[j * n + i].abs();
            if v > best {
                best = v;
                pivot = j;
            }
        }
        if best <= tolerance {
            warn!(n, pivot = best, "inv: singular matrix, returning zeros");
            fill_typed(&mut out, T::zero());
            return out;
        }
        if pivot != i {
            for k in 0..n {
                a.swap(i * n + k, pivot * n + k);
                inv.swap(i * n + k, pivot * n + k);
            }
        }
        let d = a[i * n + i];
        for k in 0..n {
            a[i * n + k] /= d;
            inv[i * n + k] /= d;
        }
        for j in 0..n {
            if j == i {
                continue;
            }
            let f = a[j * n + i];
            if f == 0.0 {
                continue;
            }
            for k in 0..n {
                a[j * n + k] -= f * a[i * n + k];
                inv[j * n + k] -= f * inv[i * n + k];
            }
        }
    }

    for (d, &v) in out.data_mut::<T>().iter_mut().zip(&inv) {
        *d = T::from_f64(v);
    }
    out
}

fn matmul_typed<T: Element>(out: &mut Mat, a: &Mat, b: &Mat) {
    let (aw, bw) = (a.w(), b.w());
    let sa = a.as_slice::<T>();
    let sb = b.as_slice::<T>();
    parallel::for_each_row(&mut out.data_mut::<T>()[..a.h() * bw], bw, |i, row| {
        for (j, dst) in row.iter_mut().enumerate() {
            let mut acc = T::zero();
            for k in 0..aw {
                acc = T::add(acc, T::mul(sa[i * aw + k], sb[k * bw + j]));
            }
            *dst = acc;
        }
    });
}

// ============================================================================
// Public operations
// ============================================================================

impl Mat {
    /// Sets every element (padding included) to `value` cast to the element type.
    pub fn fill(&mut self, value: f64) -> &mut Self {
        dispatch!(self.data_type(), T => fill_typed::<T>(self, <T as Element>::from_f64(value)), _ => untyped("fill"));
        self
    }

    fn scalar_assign(&mut self, value: f64, op: BinaryOp) {
        if self.is_empty() {
            return;
        }
        dispatch!(self.data_type(), T => {
            let s = <T as Element>::from_f64(value);
            if op == BinaryOp::Div && Element::is_zero(s) {
                return;
            }
            scalar_assign::<T>(self, op, s)
        }, _ => untyped("scalar"))
    }

    fn scalar(&self, value: f64, op: BinaryOp) -> Mat {
        if self.is_empty() {
            return Mat::default();
        }
        let mut m = Mat::default();
        m.create_like(self, None);
        if m.is_empty() {
            return m;
        }
        dispatch!(self.data_type(), T => {
            let s = <T as Element>::from_f64(value);
            if op == BinaryOp::Div && Element::is_zero(s) {
                // divisor casts to zero: nothing is written, the result is a copy
                m.deep_clone_from(self, None);
            } else {
                scalar_into::<T>(&mut m, self, op, s)
            }
        }, _ => untyped("scalar"));
        m
    }

    fn binary_assign(&mut self, rhs: &Mat, op: BinaryOp) {
        if self.is_empty() || !same_operands(self, rhs, "element-wise") {
            return;
        }
        // an aliased right-hand side is read from a snapshot
        let snapshot;
        let rhs = if self.shares_storage(rhs) {
            snapshot = rhs.deep_clone(None);
            &snapshot
        } else {
            rhs
        };
        dispatch!(self.data_type(), T => binary_assign::<T>(self, rhs, op), _ => untyped("element-wise"))
    }

    fn binary(&self, rhs: &Mat, op: BinaryOp) -> Mat {
        if self.is_empty() || !same_operands(self, rhs, "element-wise") {
            return Mat::default();
        }
        let mut m = Mat::default();
        m.create_like(self, None);
        if m.is_empty() {
            return m;
        }
        dispatch!(self.data_type(), T => binary_into::<T>(&mut m, self, rhs, op), _ => untyped("element-wise"));
        m
    }

    /// Element-wise product, in place.
    pub fn mul_elementwise(&mut self, rhs: &Mat) -> &mut Self {
        self.binary_assign(rhs, BinaryOp::Mul);
        self
    }

    /// Clamps every element to `[min, max]` (cast to the element type).
    pub fn clip(&mut self, min: f64, max: f64) -> &mut Self {
        dispatch!(self.data_type(), T => clip_typed::<T>(self, <T as Element>::from_f64(min), <T as Element>::from_f64(max)), _ => untyped("clip"));
        self
    }

    /// Squares every element in place.
    pub fn square(&mut self) -> &mut Self {
        dispatch!(self.data_type(), T => square_typed::<T>(self), _ => untyped("square"));
        self
    }

    /// Writes `scale` on the diagonal and zero elsewhere.
    ///
    /// Rank-3 buffers get the pattern in every channel; rank 1 only sets the
    /// first element.
    pub fn eye(&mut self, scale: f64) -> &mut Self {
        dispatch!(self.data_type(), T => eye_typed::<T>(self, <T as Element>::from_f64(scale)), _ => untyped("eye"));
        self
    }

    /// Fills with normally distributed values from an entropy-seeded generator.
    pub fn randn(&mut self, mean: f64, stddev: f64) -> &mut Self {
        let mut rng = StdRng::from_entropy();
        self.randn_with(mean, stddev, &mut rng)
    }

    /// Fills with normally distributed values; reproducible for a given seed.
    pub fn randn_seeded(&mut self, mean: f64, stddev: f64, seed: u64) -> &mut Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.randn_with(mean, stddev, &mut rng)
    }

    fn randn_with(&mut self, mean: f64, stddev: f64, rng: &mut StdRng) -> &mut Self {
        dispatch!(self.data_type(), T => randn_typed::<T>(self, mean, stddev, rng), _ => untyped("randn"));
        self
    }

    /// Transposed copy.
    ///
    /// Rank 1 becomes a `1 x w` column; rank 3 transposes every channel.
    pub fn t(&self) -> Mat {
        if self.is_empty() {
            return Mat::default();
        }
        let s = *self.shape();
        if s.dims == 1 {
            return self.deep_clone(None).reshape(Extent::d2(1, s.w), None);
        }
        let extent = if s.dims == 2 {
            Extent::d2(s.h, s.w)
        } else {
            Extent::d3(s.h, s.w, s.c)
        };
        let mut m = Mat::new_type(extent, self.data_type());
        if m.is_empty() {
            return m;
        }
        dispatch!(self.data_type(), T => transpose_typed::<T>(&mut m, self), _ => untyped("t"));
        let color_format = m.color_format();
        *m.meta_mut() = *self.meta();
        m.meta_mut().color_format = color_format;
        m
    }

    /// Inverse of a square rank-2 matrix (Gauss-Jordan, partial pivoting).
    ///
    /// Computed in `f64` and cast back. A singular matrix gives all zeros;
    /// a pivot no larger than `f64::EPSILON * n * max|a|` counts as zero, so
    /// matrices singular up to rounding are caught too.
    pub fn inv(&self) -> Mat {
        let s = *self.shape();
        let square = s.dims == 2 && s.w == s.h;
        debug_assert!(square, "inv: expected a square rank-2 matrix, got {}", s.extent());
        if self.is_empty() || !square {
            return Mat::default();
        }
        dispatch!(self.data_type(), T => invert_typed::<T>(self, s.w), _ => Mat::default())
    }

    /// Matrix product `self x rhs` of rank-2 buffers (`self.w == rhs.h`).
    ///
    /// The result is `rhs.w` wide and `self.h` tall.
    pub fn matmul(&self, rhs: &Mat) -> Mat {
        let ok = self.dims() == 2
            && rhs.dims() == 2
            && self.w() == rhs.h()
            && self.data_type() == rhs.data_type();
        debug_assert!(
            ok,
            "matmul: incompatible operands {} {} x {} {}",
            self.shape().extent(),
            self.data_type(),
            rhs.shape().extent(),
            rhs.data_type()
        );
        if !ok || self.is_empty() || rhs.is_empty() {
            return Mat::default();
        }
        let mut m = Mat::new_type(Extent::d2(rhs.w(), self.h()), self.data_type());
        if m.is_empty() {
            return m;
        }
        dispatch!(self.data_type(), T => matmul_typed::<T>(&mut m, self, rhs), _ => untyped("matmul"));
        m
    }

    /// Replaces `self` with `self x rhs`.
    pub fn matmul_assign(&mut self, rhs: &Mat) -> &mut Self {
        *self = self.matmul(rhs);
        self
    }

    /// Returns true if the type tag is a floating-point type.
    pub fn is_float(&self) -> bool {
        self.data_type() != DataType::Undefined && self.data_type().is_float()
    }
}

// ============================================================================
// Operator impls
// ============================================================================

macro_rules! impl_scalar_ops {
    ($Op:ident, $op:ident, $OpAssign:ident, $op_assign:ident, $kind:expr) => {
        impl $Op<f64> for &Mat {
            type Output = Mat;

            fn $op(self, rhs: f64) -> Mat {
                self.scalar(rhs, $kind)
            }
        }

        impl $Op<f64> for Mat {
            type Output = Mat;

            fn $op(self, rhs: f64) -> Mat {
                self.scalar(rhs, $kind)
            }
        }

        impl $OpAssign<f64> for Mat {
            fn $op_assign(&mut self, rhs: f64) {
                self.scalar_assign(rhs, $kind);
            }
        }
    };
}

impl_scalar_ops!(Add, add, AddAssign, add_assign, BinaryOp::Add);
impl_scalar_ops!(Sub, sub, SubAssign, sub_assign, BinaryOp::Sub);
impl_scalar_ops!(Mul, mul, MulAssign, mul_assign, BinaryOp::Mul);
impl_scalar_ops!(Div, div, DivAssign, div_assign, BinaryOp::Div);

macro_rules! impl_elementwise_ops {
    ($Op:ident, $op:ident, $OpAssign:ident, $op_assign:ident, $kind:expr) => {
        impl $Op<&Mat> for &Mat {
            type Output = Mat;

            fn $op(self, rhs: &Mat) -> Mat {
                self.binary(rhs, $kind)
            }
        }

        impl $OpAssign<&Mat> for Mat {
            fn $op_assign(&mut self, rhs: &Mat) {
                self.binary_assign(rhs, $kind);
            }
        }
    };
}

impl_elementwise_ops!(Add, add, AddAssign, add_assign, BinaryOp::Add);
impl_elementwise_ops!(Sub, sub, SubAssign, sub_assign, BinaryOp::Sub);
impl_elementwise_ops!(Div, div, DivAssign, div_assign, BinaryOp::Div);

/// `&a * &b` is the matrix product; see [`Mat::mul_elementwise`] for the
/// element-wise one.
impl Mul<&Mat> for &Mat {
    type Output = Mat;

    fn mul(self, rhs: &Mat) -> Mat {
        self.matmul(rhs)
    }
}

impl MulAssign<&Mat> for Mat {
    fn mul_assign(&mut self, rhs: &Mat) {
        self.matmul_assign(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mat2(w: usize, h: usize, data: &[f32]) -> Mat {
        Mat::from_slice(Extent::d2(w, h), data).unwrap()
    }

    #[test]
    fn test_scalar_ops_f32() {
        let a = mat2(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!((&a + 1.0).to_vec::<f32>().unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!((&a - 1.0).to_vec::<f32>().unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!((&a * 2.0).to_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!((&a / 2.0).to_vec::<f32>().unwrap(), vec![0.5, 1.0, 1.5, 2.0]);
        // source untouched
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_scalar_div_by_zero_keeps_values() {
        let mut a = mat2(2, 1, &[3.0, 4.0]);
        a /= 0.0;
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![3.0, 4.0]);
        let b = &a / 0.0;
        assert_eq!(b.to_vec::<f32>().unwrap(), vec![3.0, 4.0]);
        assert!(!b.shares_storage(&a));
    }

    #[test]
    fn test_scalar_div_by_zero_every_type() {
        for ty in DataType::ALL {
            let mut a = Mat::new_type(Extent::d3(3, 2, 2), ty);
            a.fill(6.0);
            let expected = a.deep_clone(None);

            let b = &a / 0.0;
            assert_eq!(b.data_type(), ty);
            assert_eq!(b.as_bytes(), expected.as_bytes(), "{ty} out-of-place");

            a /= 0.0;
            assert_eq!(a.as_bytes(), expected.as_bytes(), "{ty} in place");
        }
    }

    #[test]
    fn test_f16_scalar_div_by_zero() {
        let h = |v: f32| half::f16::from_f32(v);
        let a = Mat::from_slice(Extent::d1(2), &[h(1.5), h(-2.0)]).unwrap();
        let b = &a / 0.0;
        let v: Vec<f32> = b.to_vec::<half::f16>().unwrap().iter().map(|x| x.to_f32()).collect();
        assert_eq!(v, vec![1.5, -2.0]);
    }

    #[test]
    fn test_integer_scalar_wraps() {
        let mut a = Mat::from_slice(Extent::d1(2), &[120i8, -128]).unwrap();
        a += 10.0;
        assert_eq!(a.to_vec::<i8>().unwrap(), vec![-126, -118]);
    }

    #[test]
    fn test_elementwise_ops() {
        let a = mat2(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = mat2(2, 2, &[4.0, 3.0, 2.0, 1.0]);
        assert_eq!((&a + &b).to_vec::<f32>().unwrap(), vec![5.0; 4]);
        assert_eq!((&a - &b).to_vec::<f32>().unwrap(), vec![-3.0, -1.0, 1.0, 3.0]);

        let mut c = a.deep_clone(None);
        c.mul_elementwise(&b);
        assert_eq!(c.to_vec::<f32>().unwrap(), vec![4.0, 6.0, 6.0, 4.0]);
    }

    #[test]
    fn test_integer_division_by_zero_element() {
        let a = Mat::from_slice(Extent::d1(3), &[10i32, 20, 30]).unwrap();
        let b = Mat::from_slice(Extent::d1(3), &[2i32, 0, 3]).unwrap();
        assert_eq!((&a / &b).to_vec::<i32>().unwrap(), vec![5, 0, 10]);

        let mut c = a.deep_clone(None);
        c /= &b;
        assert_eq!(c.to_vec::<i32>().unwrap(), vec![5, 20, 10]);
    }

    #[test]
    fn test_self_aliased_add() {
        let mut a = mat2(2, 1, &[1.0, 2.0]);
        let alias = a.clone();
        a += &alias;
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_clip_and_square() {
        let mut a = mat2(4, 1, &[-2.0, 0.5, 3.0, 1.0]);
        a.clip(0.0, 1.0);
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![0.0, 0.5, 1.0, 1.0]);
        a.square();
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![0.0, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_eye_rank3() {
        let mut m = Mat::new_type(Extent::d3(3, 3, 2), DataType::Int16);
        m.fill(7.0).eye(1.0);
        for ch in 0..2 {
            for y in 0..3 {
                for x in 0..3 {
                    let want = if x == y { 1 } else { 0 };
                    assert_eq!(m.at_3d::<i16>(x, y, ch), want);
                }
            }
        }
    }

    #[test]
    fn test_eye_rank1_sets_first_only() {
        let mut m = Mat::new_type(Extent::d1(4), DataType::Float64);
        m.fill(5.0).eye(1.0);
        assert_eq!(m.to_vec::<f64>().unwrap(), vec![1.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_transpose_rank2() {
        let a = mat2(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = a.t();
        assert_eq!((t.w(), t.h()), (2, 3));
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_rank1() {
        let a = Mat::from_slice(Extent::d1(3), &[1.0f32, 2.0, 3.0]).unwrap();
        let t = a.t();
        assert_eq!(t.dims(), 2);
        assert_eq!((t.w(), t.h()), (1, 3));
        assert_eq!(t.at_2d::<f32>(0, 2), 3.0);
    }

    #[test]
    fn test_matmul() {
        // 2x3 (h=2, w=3) times 3x2 (h=3, w=2)
        let a = mat2(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = mat2(2, 3, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = &a * &b;
        assert_eq!((c.w(), c.h()), (2, 2));
        assert_eq!(c.to_vec::<f32>().unwrap(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_inverse() {
        let a = Mat::from_slice(Extent::d2(2, 2), &[4.0f64, 7.0, 2.0, 6.0]).unwrap();
        let inv = a.inv();
        let v = inv.to_vec::<f64>().unwrap();
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-12);
        assert_relative_eq!(v[1], -0.7, epsilon = 1e-12);
        assert_relative_eq!(v[2], -0.2, epsilon = 1e-12);
        assert_relative_eq!(v[3], 0.4, epsilon = 1e-12);

        let id = &a * &inv;
        let v = id.to_vec::<f64>().unwrap();
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_needs_pivot() {
        let a = Mat::from_slice(Extent::d2(2, 2), &[0.0f32, 1.0, 1.0, 0.0]).unwrap();
        assert_eq!(a.inv().to_vec::<f32>().unwrap(), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_singular_inverse_is_zero() {
        let a = mat2(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(a.inv().to_vec::<f32>().unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_rounding_singular_inverse_is_zero() {
        let a = Mat::from_slice(Extent::d2(3, 3), &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]).unwrap();
        assert_eq!(a.inv().to_vec::<f64>().unwrap(), vec![0.0; 9]);
    }

    #[test]
    fn test_small_scale_inverse() {
        let a = Mat::from_slice(Extent::d2(2, 2), &[1.0e-20f64, 0.0, 0.0, 2.0e-20]).unwrap();
        let v = a.inv().to_vec::<f64>().unwrap();
        assert_relative_eq!(v[0], 1.0e20, max_relative = 1e-12);
        assert_relative_eq!(v[3], 0.5e20, max_relative = 1e-12);
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn test_randn_seeded_statistics() {
        let mut a = Mat::new_type(Extent::d1(20_000), DataType::Float32);
        a.randn_seeded(2.0, 0.5, 42);
        let v = a.to_vec::<f32>().unwrap();
        let mean = v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64;
        let var = v.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / v.len() as f64;
        assert_relative_eq!(mean, 2.0, epsilon = 0.02);
        assert_relative_eq!(var.sqrt(), 0.5, epsilon = 0.02);

        let mut b = Mat::new_type(Extent::d1(20_000), DataType::Float32);
        b.randn_seeded(2.0, 0.5, 42);
        assert_eq!(b.to_vec::<f32>().unwrap(), v);
    }

    #[test]
    fn test_f16_scalar_add() {
        let h = |v: f32| half::f16::from_f32(v);
        let mut a = Mat::from_slice(Extent::d1(2), &[h(1.0), h(2.5)]).unwrap();
        a += 0.5;
        let v: Vec<f32> = a.to_vec::<half::f16>().unwrap().iter().map(|x| x.to_f32()).collect();
        assert_eq!(v, vec![1.5, 3.0]);
    }
}
