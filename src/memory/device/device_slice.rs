use super::CopyDestination;
use crate::backend::DeviceBackend;
use crate::error::{HdvError, HdvResult};
use crate::{DeviceCopy, DeviceOrdinal, DevicePointer};
use std::fmt;
use std::marker::PhantomData;
use std::mem;

pub(crate) unsafe fn upload<T: DeviceCopy>(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    mut dst: DevicePointer<T>,
    src: &[T],
) -> HdvResult<()> {
    let bytes = src.len() * mem::size_of::<T>();
    if bytes == 0 {
        return Ok(());
    }
    backend.copy_htod(
        device,
        dst.as_raw_mut() as *mut u8,
        src.as_ptr() as *const u8,
        bytes,
    )
}

pub(crate) unsafe fn download<T: DeviceCopy>(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    dst: *mut T,
    src: DevicePointer<T>,
    len: usize,
) -> HdvResult<()> {
    let bytes = len * mem::size_of::<T>();
    if bytes == 0 {
        return Ok(());
    }
    backend.copy_dtoh(device, dst as *mut u8, src.as_raw() as *const u8, bytes)
}

/// Reads `len` values starting at `src` into a new host vector.
///
/// The device range is checked before any host memory is reserved.
pub(crate) fn download_vec<T: DeviceCopy>(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    src: DevicePointer<T>,
    len: usize,
) -> HdvResult<Vec<T>> {
    let bytes = len
        .checked_mul(mem::size_of::<T>())
        .ok_or(HdvError::InvalidAddress {
            device,
            address: src.address(),
            len: usize::MAX,
        })?;
    if bytes != 0 {
        backend.check_range(device, src.as_raw() as *const u8, bytes)?;
    }
    let mut host = Vec::with_capacity(len);
    unsafe {
        download(backend, device, host.as_mut_ptr(), src, len)?;
        // DeviceCopy values are valid after a bitwise copy.
        host.set_len(len);
    }
    Ok(host)
}

/// Read-only view of device memory owned by someone else, typically a
/// [`DualBuffer`](../vector/struct.DualBuffer.html) whose device copy is valid.
///
/// The view cannot be dereferenced on the host. Its contents can be copied out with
/// [`copy_to`](#method.copy_to), and its address handed to kernels with
/// [`as_device_ptr`](#method.as_device_ptr).
pub struct DeviceSlice<'a, T: DeviceCopy> {
    backend: &'a dyn DeviceBackend,
    device: DeviceOrdinal,
    ptr: DevicePointer<T>,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

unsafe impl<'a, T: DeviceCopy + Sync> Send for DeviceSlice<'a, T> {}
unsafe impl<'a, T: DeviceCopy + Sync> Sync for DeviceSlice<'a, T> {}

impl<'a, T: DeviceCopy> DeviceSlice<'a, T> {
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized values on `device` which outlive `'a` and are not
    /// written while the view exists.
    pub(crate) unsafe fn from_raw_parts(
        backend: &'a dyn DeviceBackend,
        device: DeviceOrdinal,
        ptr: DevicePointer<T>,
        len: usize,
    ) -> Self {
        DeviceSlice {
            backend,
            device,
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the device the memory lives on.
    pub fn device(&self) -> DeviceOrdinal {
        self.device
    }

    /// Returns the address of the first element. It is only meaningful on the device.
    pub fn as_device_ptr(&self) -> DevicePointer<T> {
        self.ptr
    }

    /// Copy the viewed elements into `dest`.
    ///
    /// # Panics
    ///
    /// Panics if `dest` has a different length.
    pub fn copy_to(&self, dest: &mut [T]) -> HdvResult<()> {
        assert_eq!(
            self.len,
            dest.len(),
            "destination and source slices have different lengths"
        );
        unsafe { download(self.backend, self.device, dest.as_mut_ptr(), self.ptr, self.len) }
    }

    /// Copy the viewed elements into a new host vector.
    pub fn to_vec(&self) -> HdvResult<Vec<T>> {
        download_vec(self.backend, self.device, self.ptr, self.len)
    }
}

impl<'a, T: DeviceCopy> fmt::Debug for DeviceSlice<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSlice")
            .field("device", &self.device)
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Mutable view of device memory owned by a [`DualBuffer`](../vector/struct.DualBuffer.html).
///
/// Obtaining this view marks the host copy of the buffer stale, so anything written through it
/// (by a kernel, or from the host with [`copy_from`](trait.CopyDestination.html#tymethod.copy_from))
/// is what the next host view will observe.
pub struct DeviceSliceMut<'a, T: DeviceCopy> {
    backend: &'a dyn DeviceBackend,
    device: DeviceOrdinal,
    ptr: DevicePointer<T>,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<'a, T: DeviceCopy + Send> Send for DeviceSliceMut<'a, T> {}
unsafe impl<'a, T: DeviceCopy + Sync> Sync for DeviceSliceMut<'a, T> {}

impl<'a, T: DeviceCopy> DeviceSliceMut<'a, T> {
    /// # Safety
    ///
    /// `ptr` must point to `len` values on `device` which outlive `'a` and are not accessed
    /// through any other path while the view exists.
    pub(crate) unsafe fn from_raw_parts(
        backend: &'a dyn DeviceBackend,
        device: DeviceOrdinal,
        ptr: DevicePointer<T>,
        len: usize,
    ) -> Self {
        DeviceSliceMut {
            backend,
            device,
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the device the memory lives on.
    pub fn device(&self) -> DeviceOrdinal {
        self.device
    }

    /// Returns the address of the first element. It is only meaningful on the device.
    pub fn as_device_ptr(&mut self) -> DevicePointer<T> {
        self.ptr
    }

    /// Reborrows the view as read-only.
    pub fn as_slice(&self) -> DeviceSlice<'_, T> {
        unsafe { DeviceSlice::from_raw_parts(self.backend, self.device, self.ptr, self.len) }
    }
}

impl<'a, T: DeviceCopy> CopyDestination<[T]> for DeviceSliceMut<'a, T> {
    fn copy_from(&mut self, source: &[T]) -> HdvResult<()> {
        assert_eq!(
            self.len,
            source.len(),
            "destination and source slices have different lengths"
        );
        unsafe { upload(self.backend, self.device, self.ptr, source) }
    }

    fn copy_to(&self, dest: &mut [T]) -> HdvResult<()> {
        self.as_slice().copy_to(dest)
    }
}

impl<'a, T: DeviceCopy> fmt::Debug for DeviceSliceMut<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSliceMut")
            .field("device", &self.device)
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
