//! Validity bookkeeping for dual buffers.
//!
//! A buffer's contents are valid on the host, on the device, or on both. [`Residency`] names those
//! three states; "valid nowhere" has no representation. [`SyncController`] decides, for each view
//! request, which single transfer (if any) makes the requested domain valid and what the state
//! becomes afterwards:
//!
//! | State  | Request             | Transfer        | Next            |
//! |--------|---------------------|-----------------|-----------------|
//! | Host   | host read/write     | -               | Host            |
//! | Host   | device read/write   | host to device  | Synced / Device |
//! | Device | device read/write   | -               | Device          |
//! | Device | host read/write     | device to host  | Synced / Host   |
//! | Synced | read on either side | -               | Synced          |
//! | Synced | host write          | -               | Host            |
//! | Synced | device write        | -               | Device          |
//!
//! A write request always invalidates the other side, whether or not the caller ends up writing.

use crate::GpuAccess;
use std::fmt;

/// Where the current contents of a buffer are valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Only the host copy is valid.
    Host,
    /// Host and device copies are valid and equal.
    Synced,
    /// Only the device copy is valid.
    Device,
}

impl Residency {
    /// Access the device can serve without a transfer: `None`, `Read` or `Write` for
    /// `Host`, `Synced` and `Device`.
    pub fn device_access(self) -> GpuAccess {
        match self {
            Residency::Host => GpuAccess::None,
            Residency::Synced => GpuAccess::Read,
            Residency::Device => GpuAccess::Write,
        }
    }

    /// Access the host can serve without a transfer.
    pub fn host_access(self) -> GpuAccess {
        GpuAccess::Write - self.device_access()
    }

    /// Returns true if the host copy is valid.
    pub fn host_valid(self) -> bool {
        self != Residency::Device
    }

    /// Returns true if the device copy is valid.
    pub fn device_valid(self) -> bool {
        self != Residency::Host
    }
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Residency::Host => "host",
            Residency::Synced => "synced",
            Residency::Device => "device",
        };
        f.write_str(name)
    }
}

/// Direction of a cross-domain copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    /// Upload the host copy to the device.
    HostToDevice,
    /// Download the device copy to the host.
    DeviceToHost,
}

/// Outcome of planning a view request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Copy that must complete before the view is valid.
    pub transfer: Option<Transfer>,
    /// State once the copy (if any) has completed.
    pub next: Residency,
}

/// Number of synchronizing copies a buffer has performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Uploads triggered by device views.
    pub host_to_device: usize,
    /// Downloads triggered by host views.
    pub device_to_host: usize,
}

impl CopyStats {
    /// Total number of copies in either direction.
    pub fn total(&self) -> usize {
        self.host_to_device + self.device_to_host
    }
}

/// State machine deciding when a buffer must copy between domains.
///
/// Planning is pure; the buffer performs the planned transfer and only then
/// [`commit`](#method.commit)s, so a failed copy leaves the previous state in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncController {
    residency: Residency,
    stats: CopyStats,
}

impl SyncController {
    /// Creates a controller for a buffer whose contents start out in `residency`.
    pub fn new(residency: Residency) -> Self {
        SyncController {
            residency,
            stats: CopyStats::default(),
        }
    }

    /// Current state.
    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// Copies performed so far.
    pub fn stats(&self) -> CopyStats {
        self.stats
    }

    /// Returns true if a host view with `access` needs no transfer and no state change.
    pub fn host_can_access(&self, access: GpuAccess) -> bool {
        self.residency.host_access().allows(access)
    }

    /// Returns true if a device view with `access` needs no transfer and no state change.
    pub fn device_can_access(&self, access: GpuAccess) -> bool {
        self.residency.device_access().allows(access)
    }

    /// Plans a host view with `access`.
    pub fn plan_host(&self, access: GpuAccess) -> Transition {
        let transfer = match (self.residency, access) {
            (_, GpuAccess::None) => None,
            (Residency::Device, _) => Some(Transfer::DeviceToHost),
            _ => None,
        };
        let next = match access {
            GpuAccess::None => self.residency,
            GpuAccess::Read if self.residency == Residency::Device => Residency::Synced,
            GpuAccess::Read => self.residency,
            GpuAccess::Write => Residency::Host,
        };
        Transition { transfer, next }
    }

    /// Plans a device view with `access`.
    pub fn plan_device(&self, access: GpuAccess) -> Transition {
        let transfer = match (self.residency, access) {
            (_, GpuAccess::None) => None,
            (Residency::Host, _) => Some(Transfer::HostToDevice),
            _ => None,
        };
        let next = match access {
            GpuAccess::None => self.residency,
            GpuAccess::Read if self.residency == Residency::Host => Residency::Synced,
            GpuAccess::Read => self.residency,
            GpuAccess::Write => Residency::Device,
        };
        Transition { transfer, next }
    }

    /// Records that `transition` has been carried out.
    pub fn commit(&mut self, transition: Transition) {
        match transition.transfer {
            Some(Transfer::HostToDevice) => self.stats.host_to_device += 1,
            Some(Transfer::DeviceToHost) => self.stats.device_to_host += 1,
            None => {}
        }
        self.residency = transition.next;
    }

    /// Forces the state, for operations that rewrite a domain wholesale (fill, resize, copy).
    pub fn reset(&mut self, residency: Residency) {
        self.residency = residency;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use super::Residency::{Device, Host, Synced};
    use crate::GpuAccess::{None as NoAccess, Read, Write};

    fn host(from: Residency, access: GpuAccess) -> (Option<Transfer>, Residency) {
        let t = SyncController::new(from).plan_host(access);
        (t.transfer, t.next)
    }

    fn device(from: Residency, access: GpuAccess) -> (Option<Transfer>, Residency) {
        let t = SyncController::new(from).plan_device(access);
        (t.transfer, t.next)
    }

    #[test]
    fn test_host_requests() {
        assert_eq!(host(Host, Read), (None, Host));
        assert_eq!(host(Host, Write), (None, Host));
        assert_eq!(host(Synced, Read), (None, Synced));
        assert_eq!(host(Synced, Write), (None, Host));
        assert_eq!(host(Device, Read), (Some(Transfer::DeviceToHost), Synced));
        assert_eq!(host(Device, Write), (Some(Transfer::DeviceToHost), Host));
    }

    #[test]
    fn test_device_requests() {
        assert_eq!(device(Host, Read), (Some(Transfer::HostToDevice), Synced));
        assert_eq!(device(Host, Write), (Some(Transfer::HostToDevice), Device));
        assert_eq!(device(Synced, Read), (None, Synced));
        assert_eq!(device(Synced, Write), (None, Device));
        assert_eq!(device(Device, Read), (None, Device));
        assert_eq!(device(Device, Write), (None, Device));
    }

    #[test]
    fn test_no_access_is_a_no_op() {
        for &state in &[Host, Synced, Device] {
            assert_eq!(host(state, NoAccess), (None, state));
            assert_eq!(device(state, NoAccess), (None, state));
        }
    }

    #[test]
    fn test_predicates_match_plans() {
        for &state in &[Host, Synced, Device] {
            let sync = SyncController::new(state);
            for &access in &[NoAccess, Read, Write] {
                let free_host = sync.plan_host(access) == Transition { transfer: None, next: state };
                let free_device =
                    sync.plan_device(access) == Transition { transfer: None, next: state };
                assert_eq!(sync.host_can_access(access), free_host, "{} {:?}", state, access);
                assert_eq!(sync.device_can_access(access), free_device, "{} {:?}", state, access);
            }
        }
    }

    #[test]
    fn test_commit_counts_transfers() {
        let mut sync = SyncController::new(Host);
        let up = sync.plan_device(Read);
        sync.commit(up);
        let write = sync.plan_host(Write);
        sync.commit(write);
        let up_again = sync.plan_device(Read);
        sync.commit(up_again);
        assert_eq!(sync.residency(), Synced);
        assert_eq!(
            sync.stats(),
            CopyStats {
                host_to_device: 2,
                device_to_host: 0
            }
        );
    }
}
