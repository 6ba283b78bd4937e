use super::device_slice::{download, download_vec, upload};
use super::{CopyDestination, DeviceSlice, DeviceSliceMut};
use crate::backend::DeviceBackend;
use crate::error::HdvResult;
use crate::memory::{device_free, device_malloc};
use crate::{DeviceCopy, DeviceOrdinal, DevicePointer};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::debug;

/// Fixed-size buffer in device memory.
///
/// This is the device half of a [`DualBuffer`](../vector/struct.DualBuffer.html); it can also be
/// used on its own. The allocation is released when the buffer is dropped.
///
/// # Examples:
///
/// ```
/// use hdvec::backend::SimulatedDevice;
/// use hdvec::memory::{CopyDestination, DeviceBuffer};
/// use hdvec::DeviceOrdinal;
/// use std::sync::Arc;
///
/// let backend = Arc::new(SimulatedDevice::new(1));
/// let buffer = DeviceBuffer::from_slice(backend, DeviceOrdinal::new(0), &[1u64, 2, 3]).unwrap();
/// let mut host = [0u64; 3];
/// buffer.copy_to(&mut host[..]).unwrap();
/// assert_eq!(host, [1, 2, 3]);
/// ```
pub struct DeviceBuffer<T: DeviceCopy> {
    backend: Arc<dyn DeviceBackend>,
    device: DeviceOrdinal,
    buf: DevicePointer<T>,
    len: usize,
}

unsafe impl<T: DeviceCopy + Send> Send for DeviceBuffer<T> {}
unsafe impl<T: DeviceCopy + Sync> Sync for DeviceBuffer<T> {}

impl<T: DeviceCopy> DeviceBuffer<T> {
    /// Allocate a new device buffer large enough to hold `len` elements, without initializing
    /// it.
    ///
    /// # Safety
    ///
    /// The caller must initialize the contents before reading them.
    pub unsafe fn uninitialized(
        backend: Arc<dyn DeviceBackend>,
        device: DeviceOrdinal,
        len: usize,
    ) -> HdvResult<Self> {
        let buf = device_malloc(&*backend, device, len)?;
        debug!(
            %device,
            backend = backend.name(),
            bytes = len * mem::size_of::<T>(),
            "allocated device buffer"
        );
        Ok(DeviceBuffer {
            backend,
            device,
            buf,
            len,
        })
    }

    /// Allocate a new device buffer of the same size as `slice` and copy the slice into it.
    pub fn from_slice(
        backend: Arc<dyn DeviceBackend>,
        device: DeviceOrdinal,
        slice: &[T],
    ) -> HdvResult<Self> {
        unsafe {
            let mut buffer = DeviceBuffer::uninitialized(backend, device, slice.len())?;
            buffer.copy_from(slice)?;
            Ok(buffer)
        }
    }

    /// Allocate a new device buffer of `len` copies of `value`.
    ///
    /// The values are staged on the host and uploaded in one transfer.
    pub fn filled(
        backend: Arc<dyn DeviceBackend>,
        device: DeviceOrdinal,
        value: &T,
        len: usize,
    ) -> HdvResult<Self>
    where
        T: Clone,
    {
        let staging = vec![value.clone(); len];
        DeviceBuffer::from_slice(backend, device, &staging)
    }

    /// Returns the number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the device the buffer is allocated on.
    pub fn device(&self) -> DeviceOrdinal {
        self.device
    }

    /// Returns the backend owning the allocation.
    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// Returns the address of the first element. It is only meaningful on the device.
    pub fn as_device_ptr(&self) -> DevicePointer<T> {
        self.buf
    }

    /// Extracts a read-only view of the entire buffer.
    pub fn as_slice(&self) -> DeviceSlice<'_, T> {
        unsafe { DeviceSlice::from_raw_parts(&*self.backend, self.device, self.buf, self.len) }
    }

    /// Extracts a mutable view of the entire buffer.
    pub fn as_mut_slice(&mut self) -> DeviceSliceMut<'_, T> {
        unsafe { DeviceSliceMut::from_raw_parts(&*self.backend, self.device, self.buf, self.len) }
    }

    /// Copy the first `count` elements of `source`, which must live on the same device, into the
    /// start of this buffer.
    ///
    /// # Panics
    ///
    /// Panics if either buffer is shorter than `count` or the buffers live on different devices.
    pub fn copy_prefix_from(&mut self, source: &DeviceBuffer<T>, count: usize) -> HdvResult<()> {
        assert_eq!(self.device, source.device, "device-to-device copies must stay on one device");
        assert!(count <= self.len && count <= source.len, "prefix longer than buffer");
        let bytes = count * mem::size_of::<T>();
        if bytes == 0 {
            return Ok(());
        }
        unsafe {
            self.backend.copy_dtod(
                self.device,
                self.buf.as_raw_mut() as *mut u8,
                source.buf.as_raw() as *const u8,
                bytes,
            )
        }
    }

    /// Write `value` into the elements from `start` to the end of the buffer.
    pub fn fill_from(&mut self, start: usize, value: &T) -> HdvResult<()>
    where
        T: Clone,
    {
        if start >= self.len {
            return Ok(());
        }
        let staging = vec![value.clone(); self.len - start];
        unsafe { upload(&*self.backend, self.device, self.buf.wrapping_add(start), &staging) }
    }

    /// Copy the whole buffer into a new host vector.
    pub fn to_vec(&self) -> HdvResult<Vec<T>> {
        download_vec(&*self.backend, self.device, self.buf, self.len)
    }

    /// Replace the contents of `host` with a copy of the whole buffer, reusing its allocation.
    /// On error `host` is left empty.
    pub(crate) fn download_into(&self, host: &mut Vec<T>) -> HdvResult<()> {
        host.clear();
        host.reserve(self.len);
        unsafe {
            download(&*self.backend, self.device, host.as_mut_ptr(), self.buf, self.len)?;
            host.set_len(self.len);
        }
        Ok(())
    }
}

impl<T: DeviceCopy> CopyDestination<[T]> for DeviceBuffer<T> {
    fn copy_from(&mut self, source: &[T]) -> HdvResult<()> {
        self.as_mut_slice().copy_from(source)
    }

    fn copy_to(&self, dest: &mut [T]) -> HdvResult<()> {
        self.as_slice().copy_to(dest)
    }
}

impl<T: DeviceCopy> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("backend", &self.backend.name())
            .field("device", &self.device)
            .field("buf", &self.buf)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: DeviceCopy> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        // No choice but to panic if this fails.
        unsafe {
            device_free(&*self.backend, self.device, self.buf, self.len)
                .expect("Failed to deallocate device memory.");
        }
        self.len = 0;
    }
}
