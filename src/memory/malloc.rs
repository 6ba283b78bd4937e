use crate::backend::DeviceBackend;
use crate::error::{Domain, HdvError, HdvResult};
use crate::{DeviceCopy, DeviceOrdinal, DevicePointer};
use std::mem;
use std::ptr;

/// Allocates room for `count` values of `T` on `device` and returns a DevicePointer to it.
///
/// Note that `count` is in units of T; thus a `count` of 3 will allocate `3 * size_of::<T>()`
/// bytes of memory. Zero-sized requests do not reach the backend and return a dangling pointer.
///
/// # Safety
///
/// The allocation must be released with [`device_free`](fn.device_free.html) on the same backend
/// and device, with the same `count`.
pub unsafe fn device_malloc<T: DeviceCopy>(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    count: usize,
) -> HdvResult<DevicePointer<T>> {
    let bytes = count
        .checked_mul(mem::size_of::<T>())
        .ok_or(HdvError::OutOfMemory {
            domain: Domain::Device,
            device: Some(device),
            requested: usize::MAX,
        })?;
    if bytes == 0 {
        return Ok(DevicePointer::wrap(ptr::NonNull::dangling().as_ptr()));
    }
    let ptr = backend.malloc(device, bytes)?;
    Ok(DevicePointer::wrap(ptr as *mut T))
}

/// Frees memory allocated with [`device_malloc`](fn.device_malloc.html).
///
/// # Safety
///
/// `ptr` must come from `device_malloc` with the same backend, device and `count`, and must not
/// be used afterwards.
pub unsafe fn device_free<T: DeviceCopy>(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    mut ptr: DevicePointer<T>,
    count: usize,
) -> HdvResult<()> {
    if count == 0 || mem::size_of::<T>() == 0 {
        return Ok(());
    }
    backend.free(device, ptr.as_raw_mut() as *mut u8)
}
