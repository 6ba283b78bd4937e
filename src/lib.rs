//! # hdvec - Vectors that follow your data between host and accelerator
//!
//! hdvec provides [`DualBuffer`](vector/struct.DualBuffer.html), a growable vector with a copy in
//! host memory and, optionally, a copy in the memory of one accelerator device. The buffer tracks
//! which copy is current and transfers lazily, only when a view of a stale copy is requested.
//! Numerical code can therefore hand the same buffer to host routines and device kernels in any
//! order and pay for exactly the transfers the access pattern requires.
//!
//! On top of the buffer, the [`data`](data/index.html) module provides a compressed sparse row
//! (CSR) data source whose arrays are dual buffers, with text, columnar and binary ingestion.
//!
//! # Backends
//!
//! Devices are driven through the [`DeviceBackend`](backend/trait.DeviceBackend.html) trait.
//! hdvec ships a [`SimulatedDevice`](backend/struct.SimulatedDevice.html) backend that emulates
//! devices in host memory and counts transfers, and, with the `cuda` cargo feature, a CUDA driver
//! backend. A [`Context`](context/struct.Context.html) without a backend is host-only.
//!
//! # Using hdvec
//!
//! ```
//! use hdvec::prelude::*;
//!
//! # fn main() -> hdvec::HdvResult<()> {
//! let ctx = Context::simulated(1);
//! let mut weights = DualBuffer::new(&ctx, 4, 1.0f32, Some(DeviceOrdinal::new(0)))?;
//!
//! // Host writes are free while the host copy is current.
//! weights.host_view_mut()?[0] = 2.0;
//!
//! // A device view uploads once.
//! let on_device = weights.device_view()?.len();
//! assert_eq!(on_device, 4);
//! assert_eq!(weights.copy_stats().host_to_device, 1);
//! # Ok(())
//! # }
//! ```
//!
//! Contexts can also be built from the environment with [`quick_init`](fn.quick_init.html); see
//! [`config`](config/index.html).

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_import_braces,
    unused_results,
    unused_qualifications
)]
// Allow clippy lints
#![allow(unknown_lints)]

#[macro_use]
extern crate bitflags;
extern crate self as hdvec;

pub mod backend;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod vector;

pub(crate) mod private;

// Export the derive macro under the name of the trait it implements.
pub use hdvec_derive::DeviceCopy;

pub use hdvec_core::{DeviceCopy, DeviceOrdinal, DevicePointer, GpuAccess};

pub use crate::context::{quick_init, Context, ContextFlags};
pub use crate::error::{HdvError, HdvResult};
pub use crate::vector::DualBuffer;

#[cfg(doctest)]
mod derive_compile_fail;
