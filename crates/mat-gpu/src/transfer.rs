//! Moving data between host and device buffers.
//!
//! [`TransferQueue`] is the interface the GPU pipeline layer implements
//! with command buffers and staging memory. [`MappedTransfer`] is the
//! simple implementation for host-mappable allocators: it copies through
//! the mapping and issues the cache maintenance calls.

use mat_core::{Mat, MatShape};
use tracing::trace;

use crate::allocator::SharedDeviceAllocator;
use crate::device_mat::{DeviceKind, DeviceMat};
use crate::{DeviceError, DeviceResult};

/// Uploads host buffers to device memory and downloads them back.
pub trait TransferQueue {
    /// Copies `src` into `dst`, (re)allocating `dst` to match.
    fn upload_into<K: DeviceKind>(&self, src: &Mat, dst: &mut DeviceMat<K>) -> DeviceResult<()>;

    /// Copies `src` into `dst`, (re)allocating `dst` to match.
    fn download_into<K: DeviceKind>(&self, src: &DeviceMat<K>, dst: &mut Mat) -> DeviceResult<()>;

    /// Copies `src` into a new device buffer.
    fn upload<K: DeviceKind>(&self, src: &Mat) -> DeviceResult<DeviceMat<K>> {
        let mut dst = DeviceMat::default();
        self.upload_into(src, &mut dst)?;
        Ok(dst)
    }

    /// Copies `src` into a new host buffer.
    fn download<K: DeviceKind>(&self, src: &DeviceMat<K>) -> DeviceResult<Mat> {
        let mut dst = Mat::default();
        self.download_into(src, &mut dst)?;
        Ok(dst)
    }
}

/// Transfers through host-mapped device memory.
#[derive(Debug, Clone)]
pub struct MappedTransfer {
    allocator: SharedDeviceAllocator,
}

impl MappedTransfer {
    /// Creates a transfer helper allocating device buffers from `allocator`.
    pub fn new(allocator: SharedDeviceAllocator) -> Self {
        Self { allocator }
    }

    /// Allocator used for uploads.
    pub fn allocator(&self) -> &SharedDeviceAllocator {
        &self.allocator
    }
}

impl TransferQueue for MappedTransfer {
    fn upload_into<K: DeviceKind>(&self, src: &Mat, dst: &mut DeviceMat<K>) -> DeviceResult<()> {
        if src.is_empty() {
            return Err(DeviceError::EmptyMat);
        }
        if !self.allocator.is_mappable() {
            return Err(DeviceError::NotMappable);
        }
        dst.create_like(src, self.allocator.clone());
        if dst.is_empty() {
            return Err(DeviceError::alloc(format!(
                "{} {} for upload",
                K::NAME,
                src.shape().extent()
            )));
        }

        let mut view = dst.mapped();
        if view.is_empty() {
            return Err(DeviceError::NotMappable);
        }
        let target = view.as_ptr();
        // same layout: copies in place through the mapping
        view.deep_clone_from(src, None);
        debug_assert_eq!(view.as_ptr(), target, "upload reallocated the mapped view");

        dst.flush()?;
        trace!(kind = K::NAME, extent = %src.shape().extent(), "uploaded");
        Ok(())
    }

    fn download_into<K: DeviceKind>(&self, src: &DeviceMat<K>, dst: &mut Mat) -> DeviceResult<()> {
        if src.is_empty() {
            return Err(DeviceError::EmptyMat);
        }
        src.invalidate()?;
        let view = src.mapped();
        if view.is_empty() {
            return Err(DeviceError::NotMappable);
        }
        dst.deep_clone_from(&view, None);
        if dst.is_empty() {
            return Err(DeviceError::alloc(format!(
                "host {} for download",
                src.shape().extent()
            )));
        }
        trace!(kind = K::NAME, extent = %src.shape().extent(), "downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostMemoryAllocator, VkMat};
    use mat_core::{DataType, Extent};

    #[test]
    fn test_rejects_unmappable() {
        let queue = MappedTransfer::new(HostMemoryAllocator::shared(0, false));
        let host = Mat::new_type(Extent::d1(8), DataType::Float32);
        assert!(matches!(queue.upload::<crate::LinearBuffer>(&host), Err(DeviceError::NotMappable)));
    }

    #[test]
    fn test_rejects_empty() {
        let queue = MappedTransfer::new(HostMemoryAllocator::shared(0, true));
        assert!(matches!(
            queue.upload::<crate::OpaqueImage>(&Mat::default()),
            Err(DeviceError::EmptyMat)
        ));
        assert!(matches!(queue.download(&VkMat::default()), Err(DeviceError::EmptyMat)));
    }
}
