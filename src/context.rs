//! Contexts tie buffers to a device backend.
//!
//! Every [`DualBuffer`](../vector/struct.DualBuffer.html) is created in a [`Context`]. The context
//! decides whether there is an accelerator at all: a host-only context exposes no devices, so
//! every buffer created in it stays a plain host vector, while a context with a backend lets
//! buffers be assigned to any of the backend's devices. Contexts are cheap to clone and share the
//! backend.

use crate::backend::{self, DeviceBackend, SimulatedDevice};
use crate::config::{BackendKind, ContextConfig};
use crate::error::{HdvError, HdvResult};
use crate::DeviceOrdinal;
use std::fmt;
use std::sync::Arc;
use tracing::info;

bitflags! {
    /// Bit flags tuning how buffers in a context manage device storage.
    #[derive(Default)]
    pub struct ContextFlags: u32 {
        /// Allocate device storage when a buffer is assigned to a device, instead of on the
        /// first device view. Allocation failures then surface from `set_device`.
        const EAGER_DEVICE_ALLOC = 0x01;

        /// Release device storage as soon as a host write makes it stale, instead of keeping the
        /// allocation around for the next upload.
        const RELEASE_ON_HOST_WRITE = 0x02;
    }
}

/// Handle to the device backend shared by a group of buffers.
///
/// # Examples:
///
/// ```
/// use hdvec::Context;
///
/// let host = Context::host_only();
/// assert_eq!(host.device_count(), 0);
///
/// let simulated = Context::simulated(2);
/// assert_eq!(simulated.device_count(), 2);
/// ```
#[derive(Clone)]
pub struct Context {
    backend: Option<Arc<dyn DeviceBackend>>,
    flags: ContextFlags,
}

impl Context {
    /// Creates a context without any accelerator.
    pub fn host_only() -> Self {
        Context {
            backend: None,
            flags: ContextFlags::empty(),
        }
    }

    /// Creates a context driving `backend`.
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Context {
            backend: Some(backend),
            flags: ContextFlags::empty(),
        }
    }

    /// Creates a context over `count` simulated devices.
    pub fn simulated(count: usize) -> Self {
        Context::new(Arc::new(SimulatedDevice::new(count)))
    }

    /// Builds the context described by `config`.
    pub fn from_config(config: &ContextConfig) -> HdvResult<Self> {
        let context = match config.backend {
            BackendKind::Host => Context::host_only(),
            BackendKind::Simulated => {
                let device = match config.device_memory {
                    Some(bytes) => SimulatedDevice::with_capacity(config.simulated_devices, bytes),
                    None => SimulatedDevice::new(config.simulated_devices),
                };
                Context::new(Arc::new(device))
            }
            BackendKind::Cuda => Context::new(cuda_backend()?),
        };
        let context = context.with_flags(config.flags());
        info!(
            backend = context.backend_name(),
            devices = context.device_count(),
            flags = ?context.flags,
            "created context"
        );
        Ok(context)
    }

    /// Returns a copy of this context with `flags` set.
    pub fn with_flags(mut self, flags: ContextFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns the flags of this context.
    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// Returns the backend, or `None` for a host-only context.
    pub fn backend(&self) -> Option<&Arc<dyn DeviceBackend>> {
        self.backend.as_ref()
    }

    /// Returns the number of devices buffers in this context may be assigned to.
    pub fn device_count(&self) -> usize {
        self.backend.as_ref().map_or(0, |b| b.device_count())
    }

    fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("host", |b| b.name())
    }

    /// Returns the backend if `device` exists in this context.
    pub(crate) fn backend_for(&self, device: DeviceOrdinal) -> HdvResult<&Arc<dyn DeviceBackend>> {
        match &self.backend {
            Some(b) => {
                backend::check_device(&**b, device)?;
                Ok(b)
            }
            None => Err(HdvError::InvalidDevice {
                device,
                available: 0,
            }),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::host_only()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend_name())
            .field("devices", &self.device_count())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(feature = "cuda")]
fn cuda_backend() -> HdvResult<Arc<dyn DeviceBackend>> {
    Ok(Arc::new(backend::CudaBackend::new()?))
}

#[cfg(not(feature = "cuda"))]
fn cuda_backend() -> HdvResult<Arc<dyn DeviceBackend>> {
    Err(HdvError::Config(
        "the cuda backend requires building hdvec with the `cuda` feature".to_string(),
    ))
}

/// Shortcut for building a context from the environment.
///
/// See [`config`](config/index.html) for the variables that are read.
pub fn quick_init() -> HdvResult<Context> {
    Context::from_config(&ContextConfig::from_env()?)
}
