//! Providers of accelerator memory.
//!
//! A [`DeviceBackend`] is the only way hdvec touches device memory: it allocates, frees and copies
//! raw bytes on behalf of the typed wrappers in [`memory`](../memory/index.html). Backends are
//! shared between buffers through `Arc<dyn DeviceBackend>` and are selected when a
//! [`Context`](../context/struct.Context.html) is built, which keeps device selection injectable
//! instead of relying on a process-wide "current device" hook.
//!
//! # Thread safety
//!
//! Every method takes the device it addresses. Implementations must allow calls addressing
//! distinct devices to run concurrently; calls addressing the same device may be serialized.

use crate::error::HdvResult;
use crate::DeviceOrdinal;
use std::fmt;

mod simulated;
pub use self::simulated::*;

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
pub use self::cuda::*;

/// Allocation, transfer and selection primitives of one family of accelerators.
///
/// All sizes are in bytes. Device addresses are opaque to the host and are never dereferenced by
/// hdvec itself.
pub trait DeviceBackend: fmt::Debug + Send + Sync {
    /// Short human-readable name, used in log events.
    fn name(&self) -> &'static str;

    /// Number of devices this backend can address.
    fn device_count(&self) -> usize;

    /// Makes `device` the target of subsequent work issued from the calling thread.
    ///
    /// This is the device-selection strategy; backends call it themselves before issuing work, so
    /// hdvec only calls it directly when a buffer is assigned to a device.
    fn select(&self, device: DeviceOrdinal) -> HdvResult<()>;

    /// Checks that the `bytes` bytes starting at `address` lie within one live allocation on
    /// `device`, without touching them.
    ///
    /// # Errors:
    ///
    /// `InvalidAddress` if any part of the range is not allocated.
    fn check_range(&self, device: DeviceOrdinal, address: *const u8, bytes: usize) -> HdvResult<()>;

    /// Allocates `bytes` bytes on `device`. `bytes` is never zero.
    ///
    /// # Safety
    ///
    /// The returned address must be released with [`free`](#tymethod.free) on the same device.
    unsafe fn malloc(&self, device: DeviceOrdinal, bytes: usize) -> HdvResult<*mut u8>;

    /// Releases an allocation made by [`malloc`](#tymethod.malloc).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `malloc` on `device` and not freed since.
    unsafe fn free(&self, device: DeviceOrdinal, ptr: *mut u8) -> HdvResult<()>;

    /// Copies `bytes` bytes from host memory at `src` to device memory at `dst`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads of `bytes` bytes.
    unsafe fn copy_htod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()>;

    /// Copies `bytes` bytes from device memory at `src` to host memory at `dst`.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `bytes` bytes.
    unsafe fn copy_dtoh(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()>;

    /// Copies `bytes` bytes between two allocations on the same device.
    ///
    /// # Safety
    ///
    /// The source and destination ranges must not overlap.
    unsafe fn copy_dtod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()>;
}

/// Checks that `device` is addressable by `backend`.
pub(crate) fn check_device(backend: &dyn DeviceBackend, device: DeviceOrdinal) -> HdvResult<()> {
    let available = backend.device_count();
    if device.index() < available {
        Ok(())
    } else {
        Err(crate::error::HdvError::InvalidDevice { device, available })
    }
}
