//! Vectors that live on the host and, on demand, on one accelerator.
//!
//! Without a [`DualBuffer`], moving data to a device means explicit copies and careful
//! bookkeeping of which side holds the latest values. A `DualBuffer` hides that: it owns a host
//! vector and (once a device is designated) a device allocation of the same length, remembers
//! where the contents are valid, and copies lazily when a view of the other side is requested.
//!
//! # Views and their cost
//!
//! - host view, contents on the host: returned immediately.
//! - host view, contents only on the device: one device-to-host copy. Later host views are free
//!   until a device *write* view is taken.
//! - device view, contents only on the host: one host-to-device copy. Later device views are free
//!   until a host *write* view is taken.
//! - device view, contents on the device: returned immediately.
//!
//! Taking a write view (`host_view_mut`, `device_view_mut`) marks the other side stale whether or
//! not anything is written through it.
//!
//! # Thread safety
//!
//! Operations that may copy or invalidate take `&mut self`, so the borrow checker provides the
//! mutual exclusion they need. `size`, `device_index`, the `*_can_access` predicates and the
//! `try_*_view` accessors take `&self`, never copy, and may be called from any number of threads
//! at once. Transfers issued by buffers on different devices run in parallel; the backend
//! serializes transfers that address the same device.

mod sync;

pub use self::sync::*;

use crate::backend::DeviceBackend;
use crate::context::{Context, ContextFlags};
use crate::error::HdvResult;
use crate::memory::{CopyDestination, DeviceBuffer, DeviceSlice, DeviceSliceMut};
use crate::{DeviceCopy, DeviceOrdinal, GpuAccess};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace, warn};

enum Backing<T: DeviceCopy> {
    HostOnly,
    HostAndDevice {
        device: DeviceOrdinal,
        // Allocated on first use, or at designation time with EAGER_DEVICE_ALLOC.
        storage: Option<DeviceBuffer<T>>,
    },
}

impl<T: DeviceCopy> Backing<T> {
    fn device(&self) -> Option<DeviceOrdinal> {
        match self {
            Backing::HostOnly => None,
            Backing::HostAndDevice { device, .. } => Some(*device),
        }
    }

    fn storage(&self) -> Option<&DeviceBuffer<T>> {
        match self {
            Backing::HostOnly => None,
            Backing::HostAndDevice { storage, .. } => storage.as_ref(),
        }
    }

    fn release_storage(&mut self) {
        if let Backing::HostAndDevice { storage, .. } = self {
            *storage = None;
        }
    }

    /// Returns device storage for exactly `len` elements. Existing storage of the right length
    /// is reused with its contents; otherwise a new allocation replaces it once it succeeded.
    fn ensure_storage(&mut self, ctx: &Context, len: usize) -> HdvResult<&mut DeviceBuffer<T>> {
        let (device, storage) = match self {
            Backing::HostOnly => panic!("device storage requested with no device designated"),
            Backing::HostAndDevice { device, storage } => (*device, storage),
        };
        let reusable = storage.as_ref().map_or(false, |s| s.len() == len);
        if !reusable {
            let backend = Arc::clone(ctx.backend_for(device)?);
            let fresh = unsafe { DeviceBuffer::uninitialized(backend, device, len)? };
            *storage = Some(fresh);
        }
        match storage {
            Some(buffer) => Ok(buffer),
            None => unreachable!("device storage was just allocated"),
        }
    }
}

/// A vector with a host copy and, optionally, a copy on one accelerator, kept in sync lazily.
///
/// See the [module-level documentation](index.html) for the cost of each view.
///
/// # Examples:
///
/// ```
/// use hdvec::memory::CopyDestination;
/// use hdvec::{Context, DeviceOrdinal, DualBuffer};
///
/// # fn main() -> hdvec::HdvResult<()> {
/// let ctx = Context::simulated(1);
/// let mut buffer = DualBuffer::from_vec(&ctx, vec![1.0f32, 2.0, 3.0], Some(DeviceOrdinal::new(0)))?;
///
/// // Uploads once; the host copy stays valid.
/// assert_eq!(buffer.device_view()?.len(), 3);
/// assert_eq!(buffer.copy_stats().host_to_device, 1);
///
/// // Writing through the device makes the host copy stale...
/// buffer.device_view_mut()?.copy_from(&[4.0, 5.0, 6.0][..])?;
/// // ...and the next host view downloads the new contents.
/// assert_eq!(buffer.host_view()?, &[4.0, 5.0, 6.0]);
/// # Ok(())
/// # }
/// ```
pub struct DualBuffer<T: DeviceCopy> {
    ctx: Context,
    host: Vec<T>,
    backing: Backing<T>,
    sync: SyncController,
    len: usize,
}

impl<T: DeviceCopy> DualBuffer<T> {
    /// Creates a buffer of `size` copies of `value`, valid on the host, assigned to `device`.
    pub fn new(ctx: &Context, size: usize, value: T, device: Option<DeviceOrdinal>) -> HdvResult<Self>
    where
        T: Clone,
    {
        DualBuffer::from_vec(ctx, vec![value; size], device)
    }

    /// Creates a buffer of `size` default values.
    pub fn with_len(ctx: &Context, size: usize, device: Option<DeviceOrdinal>) -> HdvResult<Self>
    where
        T: Clone + Default,
    {
        DualBuffer::new(ctx, size, T::default(), device)
    }

    /// Creates a buffer holding a copy of `values`.
    pub fn from_slice(ctx: &Context, values: &[T], device: Option<DeviceOrdinal>) -> HdvResult<Self>
    where
        T: Clone,
    {
        DualBuffer::from_vec(ctx, values.to_vec(), device)
    }

    /// Creates a buffer taking ownership of `values` as its host copy. No transfer happens until
    /// a device view is requested.
    pub fn from_vec(ctx: &Context, values: Vec<T>, device: Option<DeviceOrdinal>) -> HdvResult<Self> {
        let mut buffer = DualBuffer {
            ctx: ctx.clone(),
            len: values.len(),
            host: values,
            backing: Backing::HostOnly,
            sync: SyncController::new(Residency::Host),
        };
        buffer.set_device(device)?;
        Ok(buffer)
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The designated device, if any.
    pub fn device_index(&self) -> Option<DeviceOrdinal> {
        self.backing.device()
    }

    /// Where the contents are currently valid.
    pub fn residency(&self) -> Residency {
        self.sync.residency()
    }

    /// Cross-domain copies this buffer has performed to satisfy views.
    pub fn copy_stats(&self) -> CopyStats {
        self.sync.stats()
    }

    /// The context the buffer was created in.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Returns true if a host view with `access` would neither copy nor invalidate anything.
    pub fn host_can_access(&self, access: GpuAccess) -> bool {
        self.sync.host_can_access(access)
    }

    /// Returns true if a device view with `access` would neither copy nor invalidate anything.
    /// Always false for `Read` and `Write` when no device is designated.
    pub fn device_can_access(&self, access: GpuAccess) -> bool {
        self.sync.device_can_access(access)
    }

    /// Designates the device used by subsequent device views, or none.
    ///
    /// No data is copied to the new device. If the previous device holds the only valid copy of
    /// the contents, they are first copied back to the host, so reassigning a buffer never loses
    /// data; the previous device allocation is then released.
    ///
    /// # Errors:
    ///
    /// `InvalidDevice` if `device` does not exist in the buffer's context, in which case the
    /// buffer is left untouched. With `EAGER_DEVICE_ALLOC`, allocation failures on the new device
    /// are returned as well; the buffer is then assigned to the new device with valid host
    /// contents.
    pub fn set_device(&mut self, device: Option<DeviceOrdinal>) -> HdvResult<()> {
        if device == self.device_index() {
            return Ok(());
        }
        if let Some(device) = device {
            self.ctx.backend_for(device)?.select(device)?;
        }
        if !self.sync.residency().host_valid() {
            warn!(
                from = ?self.device_index(),
                to = ?device,
                bytes = self.len * mem::size_of::<T>(),
                "device holds the only valid copy; syncing to host before reassignment"
            );
            self.sync_host(GpuAccess::Write)?;
        }
        let mut backing = match device {
            None => Backing::HostOnly,
            Some(device) => Backing::HostAndDevice {
                device,
                storage: None,
            },
        };
        if device.is_some() && self.ctx.flags().contains(ContextFlags::EAGER_DEVICE_ALLOC) {
            let _ = backing.ensure_storage(&self.ctx, self.len)?;
        }
        self.sync.reset(Residency::Host);
        self.backing = backing;
        trace!(device = ?device, "designated device");
        Ok(())
    }

    /// Read-only view of the host copy, downloading it first if the device holds the only valid
    /// copy.
    pub fn host_view(&mut self) -> HdvResult<&[T]> {
        self.sync_host(GpuAccess::Read)?;
        Ok(&self.host)
    }

    /// Mutable view of the host copy. The device copy, if any, becomes stale.
    pub fn host_view_mut(&mut self) -> HdvResult<&mut [T]> {
        self.sync_host(GpuAccess::Write)?;
        Ok(&mut self.host)
    }

    /// Read-only view of the device copy, uploading it first if the host holds the only valid
    /// copy.
    ///
    /// # Panics
    ///
    /// Panics if no device is designated.
    pub fn device_view(&mut self) -> HdvResult<DeviceSlice<'_, T>> {
        self.sync_device(GpuAccess::Read)?;
        Ok(self.device_storage().as_slice())
    }

    /// Mutable view of the device copy. The host copy becomes stale.
    ///
    /// # Panics
    ///
    /// Panics if no device is designated.
    pub fn device_view_mut(&mut self) -> HdvResult<DeviceSliceMut<'_, T>> {
        self.sync_device(GpuAccess::Write)?;
        match &mut self.backing {
            Backing::HostAndDevice {
                storage: Some(storage),
                ..
            } => Ok(storage.as_mut_slice()),
            _ => panic!("device residency without device storage"),
        }
    }

    /// Host copy, if it is valid. Never copies.
    pub fn try_host_view(&self) -> Option<&[T]> {
        if self.host_can_access(GpuAccess::Read) {
            Some(&self.host)
        } else {
            None
        }
    }

    /// Device copy, if it is valid. Never copies.
    pub fn try_device_view(&self) -> Option<DeviceSlice<'_, T>> {
        if self.device_can_access(GpuAccess::Read) {
            Some(self.device_storage().as_slice())
        } else {
            None
        }
    }

    /// Sets every element to `value`.
    ///
    /// The fill happens where the contents are valid, preferring the host when both copies are
    /// valid, and the other copy becomes stale.
    pub fn fill(&mut self, value: T) -> HdvResult<()>
    where
        T: Clone,
    {
        match self.sync.residency() {
            Residency::Host | Residency::Synced => {
                for element in self.host.iter_mut() {
                    *element = value.clone();
                }
                self.invalidate_device();
            }
            Residency::Device => match &mut self.backing {
                Backing::HostAndDevice {
                    storage: Some(storage),
                    ..
                } => storage.fill_from(0, &value)?,
                _ => panic!("device residency without device storage"),
            },
        }
        Ok(())
    }

    /// Changes the number of elements to `new_len`.
    ///
    /// Existing elements up to the smaller of the two lengths are kept and new elements are set
    /// to `value`. Every valid copy is resized, so residency does not change.
    pub fn resize(&mut self, new_len: usize, value: T) -> HdvResult<()>
    where
        T: Clone,
    {
        if new_len == self.len {
            return Ok(());
        }
        let residency = self.sync.residency();
        if residency.device_valid() {
            let old = self.device_storage();
            let mut fresh =
                unsafe { DeviceBuffer::uninitialized(Arc::clone(old.backend()), old.device(), new_len)? };
            fresh.copy_prefix_from(old, self.len.min(new_len))?;
            fresh.fill_from(self.len, &value)?;
            if let Backing::HostAndDevice { storage, .. } = &mut self.backing {
                *storage = Some(fresh);
            }
        }
        if residency.host_valid() {
            self.host.resize(new_len, value);
        }
        trace!(from = self.len, to = new_len, %residency, "resized");
        self.len = new_len;
        Ok(())
    }

    /// Replaces the contents with a copy of `values`, valid on the host.
    pub fn copy_from_slice(&mut self, values: &[T])
    where
        T: Clone,
    {
        self.host.clear();
        self.host.extend_from_slice(values);
        self.len = values.len();
        self.invalidate_device();
    }

    /// Replaces the contents with a copy of `other`'s, resizing as needed.
    ///
    /// If `other` is valid on the host, its host copy is used. If its contents are only on a
    /// device and this buffer is assigned to the same device of the same backend, they are copied
    /// within the device; otherwise they are downloaded straight into this buffer's host copy.
    pub fn copy_from(&mut self, other: &DualBuffer<T>) -> HdvResult<()>
    where
        T: Clone,
    {
        if other.sync.residency().host_valid() {
            self.copy_from_slice(&other.host);
            return Ok(());
        }
        let source = other.device_storage();
        if self.shares_device_with(source) {
            let target = self.backing.ensure_storage(&self.ctx, other.len)?;
            target.copy_prefix_from(source, other.len)?;
            self.len = other.len;
            self.sync.reset(Residency::Device);
            debug!(device = %source.device(), elements = other.len, "device-to-device copy");
        } else {
            let host = source.to_vec()?;
            self.host = host;
            self.len = other.len;
            self.invalidate_device();
            debug!(device = %source.device(), elements = other.len, "copied device contents through host");
        }
        Ok(())
    }

    /// Appends `values` to the host copy. The device copy, if any, becomes stale.
    pub fn extend_from_slice(&mut self, values: &[T]) -> HdvResult<()>
    where
        T: Clone,
    {
        self.sync_host(GpuAccess::Write)?;
        self.host.extend_from_slice(values);
        self.len = self.host.len();
        Ok(())
    }

    /// Consumes the buffer, returning its contents as a host vector.
    pub fn into_vec(mut self) -> HdvResult<Vec<T>> {
        self.sync_host(GpuAccess::Read)?;
        Ok(mem::take(&mut self.host))
    }

    /// Deep copy with the same device assignment.
    ///
    /// The copy starts out valid only where the copied contents were placed: on the host if
    /// `self` is valid there, on the device otherwise.
    pub fn try_clone(&self) -> HdvResult<Self>
    where
        T: Clone,
    {
        let mut copy = DualBuffer {
            ctx: self.ctx.clone(),
            host: Vec::new(),
            backing: match self.backing.device() {
                None => Backing::HostOnly,
                Some(device) => Backing::HostAndDevice {
                    device,
                    storage: None,
                },
            },
            sync: SyncController::new(Residency::Host),
            len: 0,
        };
        copy.copy_from(self)?;
        Ok(copy)
    }

    fn sync_host(&mut self, access: GpuAccess) -> HdvResult<()> {
        let before = self.sync.residency();
        let transition = self.sync.plan_host(access);
        if let Some(Transfer::DeviceToHost) = transition.transfer {
            let storage = match self.backing.storage() {
                Some(storage) => storage,
                None => panic!("device residency without device storage"),
            };
            storage.download_into(&mut self.host)?;
            debug!(
                device = %storage.device(),
                bytes = self.len * mem::size_of::<T>(),
                "device to host copy"
            );
        }
        self.sync.commit(transition);
        if before != transition.next {
            trace!(from = %before, to = %transition.next, %access, "host view transition");
        }
        if transition.next == Residency::Host {
            self.release_stale_storage();
        }
        Ok(())
    }

    fn sync_device(&mut self, access: GpuAccess) -> HdvResult<()> {
        if self.backing.device().is_none() {
            panic!("device view requested with no device designated");
        }
        let before = self.sync.residency();
        let transition = self.sync.plan_device(access);
        if let Some(Transfer::HostToDevice) = transition.transfer {
            let storage = self.backing.ensure_storage(&self.ctx, self.len)?;
            storage.copy_from(&self.host[..self.len])?;
            debug!(
                device = %storage.device(),
                bytes = self.len * mem::size_of::<T>(),
                "host to device copy"
            );
        }
        self.sync.commit(transition);
        if before != transition.next {
            trace!(from = %before, to = %transition.next, %access, "device view transition");
        }
        Ok(())
    }

    fn invalidate_device(&mut self) {
        self.sync.reset(Residency::Host);
        self.release_stale_storage();
    }

    fn release_stale_storage(&mut self) {
        if self.ctx.flags().contains(ContextFlags::RELEASE_ON_HOST_WRITE) {
            self.backing.release_storage();
        }
    }

    fn device_storage(&self) -> &DeviceBuffer<T> {
        match self.backing.storage() {
            Some(storage) => storage,
            None => panic!("device residency without device storage"),
        }
    }

    fn shares_device_with(&self, source: &DeviceBuffer<T>) -> bool {
        match (self.backing.device(), self.ctx.backend()) {
            (Some(device), Some(backend)) => {
                device == source.device() && same_backend(backend, source.backend())
            }
            _ => false,
        }
    }
}

fn same_backend(a: &Arc<dyn DeviceBackend>, b: &Arc<dyn DeviceBackend>) -> bool {
    Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}

impl<T: DeviceCopy + Clone> Clone for DualBuffer<T> {
    /// # Panics
    ///
    /// Panics if the device copy cannot be allocated; use `try_clone` to handle that case.
    fn clone(&self) -> Self {
        self.try_clone().expect("Failed to clone DualBuffer")
    }
}

impl<T: DeviceCopy> fmt::Debug for DualBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualBuffer")
            .field("len", &self.len)
            .field("device", &self.device_index())
            .field("residency", &self.sync.residency())
            .field("copies", &self.sync.stats())
            .finish()
    }
}
