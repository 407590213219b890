//! Allocation, sharing and reshape behaviour of host buffers.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mat_core::prelude::*;
use mat_core::{ColorFormat as Cf, Extent as E};

/// Allocator double that counts live blocks.
#[derive(Debug, Default)]
struct CountingAllocator {
    inner: DefaultAllocatorHolder,
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

#[derive(Debug)]
struct DefaultAllocatorHolder(DefaultAllocator);

impl Default for DefaultAllocatorHolder {
    fn default() -> Self {
        Self(DefaultAllocator::with_config(&MatConfig::default()))
    }
}

impl CountingAllocator {
    fn live(&self) -> usize {
        self.allocs.load(Ordering::SeqCst) - self.frees.load(Ordering::SeqCst)
    }
}

impl Allocator for CountingAllocator {
    fn fast_malloc(&self, size: usize, device: Device) -> Option<NonNull<u8>> {
        self.allocs.fetch_add(1, Ordering::SeqCst);
        self.inner.0.fast_malloc(size, device)
    }

    unsafe fn fast_free(&self, ptr: NonNull<u8>, size: usize, device: Device) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        unsafe { self.inner.0.fast_free(ptr, size, device) }
    }
}

/// Allocator double that always fails.
#[derive(Debug)]
struct FailingAllocator;

impl Allocator for FailingAllocator {
    fn fast_malloc(&self, _size: usize, _device: Device) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn fast_free(&self, _ptr: NonNull<u8>, _size: usize, _device: Device) {}
}

fn counting() -> (Arc<CountingAllocator>, SharedAllocator) {
    let c = Arc::new(CountingAllocator::default());
    let shared: SharedAllocator = c.clone();
    (c, shared)
}

#[test]
fn test_create_allocates_once() {
    let (counter, alloc) = counting();
    let mut m = Mat::default();
    m.create(E::d3(8, 8, 3), 4, 1, Some(alloc.clone()));
    m.create(E::d3(8, 8, 3), 4, 1, Some(alloc.clone()));
    m.create(E::d3(8, 8, 3), 4, 1, Some(alloc.clone()));
    assert_eq!(counter.allocs.load(Ordering::SeqCst), 1);
    assert_eq!(m.refcount(), 1);

    // a different allocator forces a new block
    m.create(E::d3(8, 8, 3), 4, 1, None);
    assert_eq!(counter.live(), 0);
    assert!(!m.is_empty());
}

#[test]
fn test_last_reference_frees() {
    let (counter, alloc) = counting();
    let a = Mat::new_type_with(E::d2(16, 16), DataType::Float32, Some(alloc));
    let b = a.clone();
    let view = a.row_range(2, 4);
    assert_eq!(a.refcount(), 3);
    drop(a);
    drop(b);
    assert_eq!(counter.live(), 1);
    drop(view);
    assert_eq!(counter.live(), 0);
    assert_eq!(counter.frees.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_drops_reference() {
    let (counter, alloc) = counting();
    let mut a = Mat::new_packed(E::d1(100), 8, 1, Some(alloc));
    let b = a.clone();
    a.release();
    assert!(a.is_empty());
    assert_eq!(a.dims(), 0);
    assert_eq!(b.refcount(), 1);
    assert_eq!(counter.live(), 1);
    drop(b);
    assert_eq!(counter.live(), 0);
}

#[test]
fn test_allocation_failure_leaves_empty() {
    let alloc: SharedAllocator = Arc::new(FailingAllocator);
    let m = Mat::new_packed(E::d2(32, 32), 4, 1, Some(alloc));
    assert!(m.is_empty());
    assert_eq!(m.dims(), 0);
    assert!(m.as_ptr().is_null());
}

#[test]
fn test_default_metadata() {
    let m = Mat::new_type(E::d3(4, 4, 4), DataType::Int8);
    assert_eq!(m.color_format(), Cf::Abgr);
    assert_eq!(m.meta().color_space, ColorSpace::Srgb);
    assert_eq!(m.meta().color_range, ColorRange::Full);
    assert_eq!(m.meta().depth, 8);
    assert_eq!(m.flags(), MatFlags::NONE);
    assert!(m.time_stamp().is_nan());
    assert_eq!(m.device(), Device::Cpu);
    assert_eq!(m.device_number(), -1);

    assert_eq!(Mat::new(E::d3(4, 4, 1), 4).color_format(), Cf::Gray);
    assert_eq!(Mat::new(E::d3(4, 4, 3), 4).color_format(), Cf::Bgr);
    assert_eq!(Mat::new(E::d2(4, 4), 4).color_format(), Cf::Gray);
}

#[test]
fn test_deep_clone_is_independent() {
    let mut a = Mat::from_slice(E::d3(3, 3, 2), &(0..18).map(|v| v as f32).collect::<Vec<_>>()).unwrap();
    a.meta_mut().time_stamp = 0.04;
    a.meta_mut().flags = MatFlags::VIDEO_FRAME | MatFlags::VIDEO_FRAME_I;
    a.meta_mut().rate = Rational::new(25, 1);

    let b = a.deep_clone(None);
    assert!(!b.shares_storage(&a));
    assert_eq!(b.refcount(), 1);
    assert_eq!(b.to_vec::<f32>().unwrap(), a.to_vec::<f32>().unwrap());
    assert_eq!(b.time_stamp(), 0.04);
    assert!(b.flags().contains(MatFlags::VIDEO_FRAME_I));
    assert_eq!(b.meta().rate, Rational::new(25, 1));

    a.set_3d::<f32>(0, 0, 1, -1.0);
    assert_eq!(b.at_3d::<f32>(0, 0, 1), 9.0);
}

#[test]
fn test_deep_clone_of_empty() {
    assert!(Mat::default().deep_clone(None).is_empty());
}

#[test]
fn test_deep_clone_from_reuses_storage() {
    let src = Mat::from_slice(E::d2(2, 2), &[1i32, 2, 3, 4]).unwrap();
    let mut dst = Mat::new_type(E::d2(2, 2), DataType::Int32);
    let ptr = dst.as_ptr();
    dst.deep_clone_from(&src, None);
    assert_eq!(dst.as_ptr(), ptr);
    assert_eq!(dst.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_create_like_copies_metadata() {
    let mut src = Mat::new_type(E::d3(5, 4, 3), DataType::Int16);
    src.meta_mut().color_format = Cf::Rgb;
    src.meta_mut().duration = 0.5;
    let mut dst = Mat::default();
    dst.create_like(&src, None);
    assert_eq!(dst.shape(), src.shape());
    assert_eq!(dst.data_type(), DataType::Int16);
    assert_eq!(dst.color_format(), Cf::Rgb);
    assert_eq!(dst.duration(), 0.5);
    assert!(!dst.shares_storage(&src));
}

#[test]
fn test_reshape_count_mismatch_is_empty() {
    let m = Mat::new(E::d2(4, 4), 4);
    assert!(m.reshape(E::d2(5, 3), None).is_empty());
}

#[test]
fn test_reshape_tight_aliases() {
    let m = Mat::from_slice(E::d2(4, 3), &(0..12).map(|v| v as f32).collect::<Vec<_>>()).unwrap();
    let r = m.reshape(E::d1(12), None);
    assert!(r.shares_storage(&m));
    assert_eq!(r.dims(), 1);
    assert_eq!(r.color_format(), Cf::Gray);
    assert_eq!(r.at::<f32>(7), 7.0);

    let r3 = m.reshape(E::d3(2, 2, 3), None);
    assert!(r3.shares_storage(&m));
    assert_eq!(r3.cstep(), 4);
    assert_eq!(r3.at_3d::<f32>(1, 1, 2), 11.0);
}

#[test]
fn test_reshape_flattens_padded_planes() {
    let data: Vec<f32> = (0..18).map(|v| v as f32).collect();
    let m = Mat::from_slice(E::d3(3, 3, 2), &data).unwrap();
    assert_eq!(m.cstep(), 12);

    let flat = m.reshape(E::d1(18), None);
    assert!(!flat.shares_storage(&m));
    assert_eq!(flat.to_vec::<f32>().unwrap(), data);

    let back = flat.reshape(E::d3(3, 3, 2), None);
    assert!(!back.shares_storage(&flat));
    assert_eq!(back.cstep(), 12);
    assert_eq!(back.to_vec::<f32>().unwrap(), data);
    assert_eq!(back.at_3d::<f32>(2, 2, 1), 17.0);
}

#[test]
fn test_reshape_changes_channel_count() {
    let data: Vec<i16> = (0..24).collect();
    let m = Mat::from_slice(E::d3(2, 3, 4), &data).unwrap();
    let r = m.reshape(E::d3(3, 2, 4), None);
    assert_eq!(r.to_vec::<i16>().unwrap(), data);
    let r = m.reshape(E::d3(4, 3, 2), None);
    assert_eq!(r.c(), 2);
    assert_eq!(r.color_format(), Cf::Abgr);
    assert_eq!(r.to_vec::<i16>().unwrap(), data);
}

#[test]
fn test_channel_range_view() {
    let data: Vec<f64> = (0..27).map(|v| v as f64).collect();
    let m = Mat::from_slice(E::d3(3, 3, 3), &data).unwrap();
    let v = m.channel_range(1, 2);
    assert_eq!(v.c(), 2);
    assert_eq!(v.cstep(), m.cstep());
    assert_eq!(v.at_3d::<f64>(0, 0, 0), 9.0);
    assert_eq!(v.to_vec::<f64>().unwrap(), data[9..].to_vec());
}

#[test]
fn test_views_write_through() {
    let mut m = Mat::new_type(E::d3(4, 4, 3), DataType::Float32);
    let mut ch = m.channel(2);
    ch.fill(3.0);
    assert_eq!(m.at_3d::<f32>(3, 3, 2), 3.0);
    assert_eq!(m.at_3d::<f32>(3, 3, 1), 0.0);
    m.fill(0.0);
    assert_eq!(ch.at_2d::<f32>(0, 0), 0.0);
}

#[test]
fn test_buffers_cross_threads() {
    let mut m = Mat::new_type(E::d1(1024), DataType::Int32);
    m.fill(1.0);
    let shared = m.clone();
    let sum = std::thread::spawn(move || shared.as_slice::<i32>().iter().sum::<i32>())
        .join()
        .unwrap();
    assert_eq!(sum, 1024);
}
