//! Pixel drawing on rank-3 buffers.
//!
//! Channels 0..3 are read and written as R, G, B, A. Colors are normalized
//! floats; integer buffers store `value * MAX` of their unsigned
//! counterpart (truncated), float buffers store the value as is. Drawing on
//! `Float16` buffers is not supported and leaves the buffer unchanged.
//!
//! # Example
//!
//! ```rust
//! use mat_core::prelude::*;
//!
//! let mut img = Mat::new_type(Extent::d3(32, 32, 4), DataType::Int8);
//! img.clean(Pixel::new(0.0, 0.0, 0.0, 1.0));
//! img.draw_line(Point::new(2.0, 2.0), Point::new(29.0, 20.0), 1.5, Pixel::new(1.0, 1.0, 1.0, 1.0));
//! img.draw_circle(Point::new(16.0, 16.0), 8.0, Pixel::new(1.0, 0.0, 0.0, 1.0));
//! ```

use std::f32::consts::PI;

use tracing::trace;

use crate::format::DataType;
use crate::mat::Mat;
use crate::meta::MatShape;
use crate::scalar::{dispatch, Element};

/// Normalized RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pixel {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Pixel {
    /// Creates a color.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn channels(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Column.
    pub x: f32,
    /// Row.
    pub y: f32,
}

impl Point {
    /// Creates a point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn unsupported(op: &str, ty: DataType) {
    trace!(op, %ty, "drawing not supported for element type");
}

fn drawable<T: Element>() -> bool {
    T::from_unorm(0.0).is_some()
}

fn write_pixel<T: Element>(m: &mut Mat, x: usize, y: usize, color: Pixel) {
    let n = m.c().min(4);
    let values = color.channels();
    for (ch, v) in values.iter().enumerate().take(n) {
        if let Some(raw) = T::from_unorm(v * T::UNORM_SCALE) {
            m.set_3d::<T>(x, y, ch, raw);
        }
    }
}

fn read_pixel<T: Element>(m: &Mat, x: usize, y: usize) -> Pixel {
    let mut out = [0.0f32; 4];
    let n = m.c().min(4);
    for (ch, v) in out.iter_mut().enumerate().take(n) {
        if let Some(raw) = m.at_3d::<T>(x, y, ch).to_unorm() {
            *v = raw / T::UNORM_SCALE;
        }
    }
    Pixel::new(out[0], out[1], out[2], out[3])
}

fn blend_pixel<T: Element>(m: &mut Mat, x: usize, y: usize, alpha: f32, color: Pixel) {
    let n = m.c().min(4);
    let values = color.channels();
    for (ch, v) in values.iter().enumerate().take(n) {
        let target = if ch == 3 {
            v * T::UNORM_SCALE
        } else {
            let Some(old) = m.at_3d::<T>(x, y, ch).to_unorm() else {
                return;
            };
            old * (1.0 - alpha) + v * alpha * T::UNORM_SCALE
        };
        if let Some(raw) = T::from_unorm(target) {
            m.set_3d::<T>(x, y, ch, raw);
        }
    }
}

fn clean_typed<T: Element>(m: &mut Mat, color: Pixel) {
    if !drawable::<T>() {
        unsupported("clean", T::TYPE);
        return;
    }
    let (w, h) = (m.w(), m.h());
    for y in 0..h {
        for x in 0..w {
            write_pixel::<T>(m, x, y, color);
        }
    }
}

/// Distance from `(px, py)` to the capsule around segment `a..b`, minus `t`.
fn capsule_sdf(px: f32, py: f32, a: Point, b: Point, t: f32) -> f32 {
    let (pax, pay) = (px - a.x, py - a.y);
    let (bax, bay) = (b.x - a.x, b.y - a.y);
    let len2 = bax * bax + bay * bay;
    let h = if len2 > 0.0 {
        ((pax * bax + pay * bay) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (dx, dy) = (pax - bax * h, pay - bay * h);
    (dx * dx + dy * dy).sqrt() - t
}

impl Mat {
    /// Writes `color` to every pixel.
    pub fn clean(&mut self, color: Pixel) -> &mut Self {
        debug_assert!(self.dims() == 3, "clean: rank-3 buffer expected");
        if self.is_empty() {
            return self;
        }
        dispatch!(self.data_type(), T => clean_typed::<T>(self, color), _ => unsupported("clean", DataType::Undefined));
        self
    }

    /// Reads pixel `(x, y)`; channels beyond `c` read as zero.
    pub fn get_pixel(&self, x: usize, y: usize) -> Pixel {
        debug_assert!(self.dims() == 3, "get_pixel: rank-3 buffer expected");
        debug_assert!(x < self.w() && y < self.h(), "get_pixel: ({x}, {y}) out of bounds");
        if self.is_empty() {
            return Pixel::default();
        }
        dispatch!(self.data_type(), T => read_pixel::<T>(self, x, y), _ => Pixel::default())
    }

    /// Reads the pixel under `p` (coordinates truncated).
    pub fn get_pixel_at(&self, p: Point) -> Pixel {
        self.get_pixel(p.x as usize, p.y as usize)
    }

    /// Writes `color` at `(x, y)`; coordinates outside the buffer are ignored.
    pub fn draw_dot(&mut self, x: i32, y: i32, color: Pixel) -> &mut Self {
        debug_assert!(self.dims() == 3, "draw_dot: rank-3 buffer expected");
        if self.is_empty() || x < 0 || y < 0 || x as usize >= self.w() || y as usize >= self.h() {
            return self;
        }
        let (x, y) = (x as usize, y as usize);
        dispatch!(self.data_type(), T => {
            if drawable::<T>() {
                write_pixel::<T>(self, x, y, color)
            } else {
                unsupported("draw_dot", T::TYPE)
            }
        }, _ => unsupported("draw_dot", DataType::Undefined));
        self
    }

    /// Writes `color` under `p` (coordinates truncated).
    pub fn draw_dot_at(&mut self, p: Point, color: Pixel) -> &mut Self {
        self.draw_dot(p.x as i32, p.y as i32, color)
    }

    /// Blends `color` over pixel `(x, y)` with coverage `alpha`.
    ///
    /// Color channels become `old * (1 - alpha) + color * alpha`; the alpha
    /// channel is replaced with `color.a`.
    pub fn alphablend(&mut self, x: usize, y: usize, alpha: f32, color: Pixel) -> &mut Self {
        debug_assert!(x < self.w() && y < self.h(), "alphablend: ({x}, {y}) out of bounds");
        if self.is_empty() {
            return self;
        }
        dispatch!(self.data_type(), T => {
            if drawable::<T>() {
                blend_pixel::<T>(self, x, y, alpha, color)
            } else {
                unsupported("alphablend", T::TYPE)
            }
        }, _ => unsupported("alphablend", DataType::Undefined));
        self
    }

    /// Draws an antialiased line of half-thickness `t` from `p1` to `p2`.
    ///
    /// Every pixel in the padded bounding box is blended with coverage
    /// `clamp(0.5 - sdf, 0, 1)`, where `sdf` is the signed distance to the
    /// capsule around the segment. Pixels with zero coverage are left alone.
    ///
    /// Both endpoints must lie inside the buffer (debug assertion); release
    /// builds clip the bounding box instead.
    pub fn draw_line(&mut self, p1: Point, p2: Point, t: f32, color: Pixel) -> &mut Self {
        debug_assert!(self.dims() == 3, "draw_line: rank-3 buffer expected");
        let (w, h) = (self.w() as f32, self.h() as f32);
        for p in [p1, p2] {
            debug_assert!(
                p.x >= 0.0 && p.y >= 0.0 && p.x < w && p.y < h,
                "draw_line: endpoint ({}, {}) outside {w}x{h}",
                p.x,
                p.y
            );
        }
        self.blend_segment(p1, p2, t, color)
    }

    fn blend_segment(&mut self, p1: Point, p2: Point, t: f32, color: Pixel) -> &mut Self {
        if self.is_empty() {
            return self;
        }
        let (w, h) = (self.w() as i32, self.h() as i32);
        let x0 = ((p1.x.min(p2.x) - t).floor() as i32).clamp(0, w - 1);
        let x1 = ((p1.x.max(p2.x) + t).ceil() as i32).clamp(0, w - 1);
        let y0 = ((p1.y.min(p2.y) - t).floor() as i32).clamp(0, h - 1);
        let y1 = ((p1.y.max(p2.y) + t).ceil() as i32).clamp(0, h - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let sdf = capsule_sdf(x as f32, y as f32, p1, p2, t);
                let alpha = (0.5 - sdf).clamp(0.0, 1.0);
                if alpha > 0.0 {
                    self.alphablend(x as usize, y as usize, alpha, color);
                }
            }
        }
        self
    }

    /// Draws a one-pixel circle outline (midpoint algorithm, 8-way symmetric).
    pub fn draw_circle(&mut self, center: Point, r: f32, color: Pixel) -> &mut Self {
        let (cx, cy) = (center.x, center.y);
        let mut x = 0.0f32;
        let mut y = r;
        let mut p = 3.0 - 2.0 * r;
        while x <= y {
            for (dx, dy) in [(x, y), (-x, y), (x, -y), (-x, -y), (y, x), (y, -x), (-y, x), (-y, -x)] {
                self.draw_dot((cx + dx) as i32, (cy + dy) as i32, color);
            }
            x += 1.0;
            if p < 0.0 {
                p += 4.0 * x + 6.0;
            } else {
                p += 4.0 * (x - y) + 10.0;
                y -= 1.0;
            }
        }
        self
    }

    /// Draws a circle outline of half-thickness `t` as a closed polygon.
    ///
    /// Uses `perimeter / 8 / t` segments (at least 3). A non-positive `t`
    /// falls back to [`draw_circle`](Self::draw_circle). Parts outside the
    /// buffer are clipped.
    pub fn draw_circle_thick(&mut self, center: Point, r: f32, t: f32, color: Pixel) -> &mut Self {
        if t <= 0.0 {
            return self.draw_circle(center, r, color);
        }
        let perimeter = 2.0 * PI * r;
        let segments = ((perimeter / 8.0 / t) as usize).max(3);
        let vertex = |i: usize| {
            let a = 2.0 * PI * i as f32 / segments as f32;
            Point::new(center.x + a.cos() * r, center.y + a.sin() * r)
        };
        let first = vertex(0);
        let mut prev = first;
        for i in 1..segments {
            let next = vertex(i);
            self.blend_segment(prev, next, t, color);
            prev = next;
        }
        self.blend_segment(prev, first, t, color);
        self
    }
}
