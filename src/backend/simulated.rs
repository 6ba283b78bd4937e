use super::{check_device, DeviceBackend};
use crate::error::{Domain, HdvError, HdvResult};
use crate::DeviceOrdinal;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::collections::BTreeMap;
use std::ptr;
use tracing::trace;

// Matches the alignment CUDA guarantees for cudaMalloc.
const ALLOCATION_ALIGN: usize = 256;

/// Number of transfers issued to one simulated device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Host-to-device copies.
    pub host_to_device: u64,
    /// Device-to-host copies.
    pub device_to_host: u64,
    /// Copies within the device.
    pub device_to_device: u64,
    /// Total bytes moved in either direction across the host/device boundary.
    pub bytes_transferred: u64,
}

#[derive(Debug)]
struct Allocation {
    len: usize,
    layout: Layout,
}

#[derive(Debug, Default)]
struct DeviceState {
    // Keyed by base address.
    allocations: BTreeMap<usize, Allocation>,
    in_use: usize,
    transfers: TransferStats,
}

impl DeviceState {
    fn check_range(&self, device: DeviceOrdinal, address: usize, len: usize) -> HdvResult<()> {
        let invalid = || HdvError::InvalidAddress {
            device,
            address,
            len,
        };
        let (base, allocation) = self.allocations.range(..=address).next_back().ok_or_else(invalid)?;
        let end = address.checked_add(len).ok_or_else(invalid)?;
        if end <= base + allocation.len {
            Ok(())
        } else {
            Err(invalid())
        }
    }
}

/// An accelerator emulated in host memory.
///
/// `SimulatedDevice` behaves like a real backend from the point of view of a buffer: allocations
/// live in their own address ranges, every copy is bounds-checked against the live allocations of
/// the addressed device, and allocations beyond an optional per-device capacity fail with
/// [`HdvError::OutOfMemory`](../error/enum.HdvError.html). It is what hdvec runs on when no real
/// accelerator is present, and what tests use to observe transfers.
///
/// Each device is guarded by its own lock, so work addressing different devices never contends.
///
/// # Examples:
///
/// ```
/// use hdvec::backend::{DeviceBackend, SimulatedDevice};
/// use hdvec::DeviceOrdinal;
///
/// let backend = SimulatedDevice::new(2);
/// assert_eq!(backend.device_count(), 2);
/// assert_eq!(backend.transfers(DeviceOrdinal::new(0)).host_to_device, 0);
/// ```
#[derive(Debug)]
pub struct SimulatedDevice {
    devices: Vec<Mutex<DeviceState>>,
    capacity: Option<usize>,
    selections: Mutex<Vec<DeviceOrdinal>>,
}

impl SimulatedDevice {
    /// Creates `count` devices with unbounded memory.
    pub fn new(count: usize) -> Self {
        SimulatedDevice {
            devices: (0..count).map(|_| Mutex::new(DeviceState::default())).collect(),
            capacity: None,
            selections: Mutex::new(Vec::new()),
        }
    }

    /// Creates `count` devices which each hold at most `bytes` bytes of live allocations.
    pub fn with_capacity(count: usize, bytes: usize) -> Self {
        let mut device = SimulatedDevice::new(count);
        device.capacity = Some(bytes);
        device
    }

    /// Returns the transfers issued to `device` so far.
    ///
    /// # Panics
    ///
    /// Panics if `device` does not exist.
    pub fn transfers(&self, device: DeviceOrdinal) -> TransferStats {
        self.devices[device.index()].lock().transfers
    }

    /// Returns the number of bytes currently allocated on `device`.
    ///
    /// # Panics
    ///
    /// Panics if `device` does not exist.
    pub fn allocated_bytes(&self, device: DeviceOrdinal) -> usize {
        self.devices[device.index()].lock().in_use
    }

    /// Returns the number of live allocations on `device`.
    ///
    /// # Panics
    ///
    /// Panics if `device` does not exist.
    pub fn live_allocations(&self, device: DeviceOrdinal) -> usize {
        self.devices[device.index()].lock().allocations.len()
    }

    /// Returns every device passed to [`select`](trait.DeviceBackend.html#tymethod.select), in
    /// call order.
    pub fn selections(&self) -> Vec<DeviceOrdinal> {
        self.selections.lock().clone()
    }

    fn state(&self, device: DeviceOrdinal) -> HdvResult<&Mutex<DeviceState>> {
        check_device(self, device)?;
        Ok(&self.devices[device.index()])
    }
}

impl DeviceBackend for SimulatedDevice {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn select(&self, device: DeviceOrdinal) -> HdvResult<()> {
        check_device(self, device)?;
        self.selections.lock().push(device);
        Ok(())
    }

    unsafe fn malloc(&self, device: DeviceOrdinal, bytes: usize) -> HdvResult<*mut u8> {
        let mut state = self.state(device)?.lock();
        let oom = HdvError::OutOfMemory {
            domain: Domain::Device,
            device: Some(device),
            requested: bytes,
        };
        if let Some(capacity) = self.capacity {
            if state.in_use.saturating_add(bytes) > capacity {
                return Err(oom);
            }
        }
        let layout = Layout::from_size_align(bytes.max(1), ALLOCATION_ALIGN)
            .map_err(|_| HdvError::OutOfMemory {
                domain: Domain::Device,
                device: Some(device),
                requested: bytes,
            })?;
        let ptr = alloc::alloc_zeroed(layout);
        if ptr.is_null() {
            return Err(oom);
        }
        let _ = state.allocations.insert(ptr as usize, Allocation { len: bytes, layout });
        state.in_use += bytes;
        trace!(%device, bytes, address = ptr as usize, "simulated malloc");
        Ok(ptr)
    }

    unsafe fn free(&self, device: DeviceOrdinal, ptr: *mut u8) -> HdvResult<()> {
        let mut state = self.state(device)?.lock();
        let allocation = state
            .allocations
            .remove(&(ptr as usize))
            .ok_or(HdvError::InvalidAddress {
                device,
                address: ptr as usize,
                len: 0,
            })?;
        state.in_use -= allocation.len;
        alloc::dealloc(ptr, allocation.layout);
        trace!(%device, bytes = allocation.len, address = ptr as usize, "simulated free");
        Ok(())
    }

    unsafe fn copy_htod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        let mut state = self.state(device)?.lock();
        if bytes == 0 {
            return Ok(());
        }
        state.check_range(device, dst as usize, bytes)?;
        ptr::copy_nonoverlapping(src, dst, bytes);
        state.transfers.host_to_device += 1;
        state.transfers.bytes_transferred += bytes as u64;
        Ok(())
    }

    fn check_range(
        &self,
        device: DeviceOrdinal,
        address: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        self.state(device)?
            .lock()
            .check_range(device, address as usize, bytes)
    }

    unsafe fn copy_dtoh(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        let mut state = self.state(device)?.lock();
        if bytes == 0 {
            return Ok(());
        }
        state.check_range(device, src as usize, bytes)?;
        ptr::copy_nonoverlapping(src, dst, bytes);
        state.transfers.device_to_host += 1;
        state.transfers.bytes_transferred += bytes as u64;
        Ok(())
    }

    unsafe fn copy_dtod(
        &self,
        device: DeviceOrdinal,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
    ) -> HdvResult<()> {
        let mut state = self.state(device)?.lock();
        if bytes == 0 {
            return Ok(());
        }
        state.check_range(device, src as usize, bytes)?;
        state.check_range(device, dst as usize, bytes)?;
        ptr::copy_nonoverlapping(src, dst, bytes);
        state.transfers.device_to_device += 1;
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        for device in &self.devices {
            let mut state = device.lock();
            for (address, allocation) in std::mem::take(&mut state.allocations) {
                unsafe { alloc::dealloc(address as *mut u8, allocation.layout) };
            }
        }
    }
}
