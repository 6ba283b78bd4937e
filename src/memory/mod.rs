//! Typed access to device memory.
//!
//! Device memory cannot be read or written by the host directly; data moves across the boundary
//! only through explicit transfers issued by a [`DeviceBackend`](../backend/trait.DeviceBackend.html).
//! This module wraps those raw transfers in typed, owning and borrowing structures:
//!
//! - [`DeviceBuffer`](struct.DeviceBuffer.html) owns an allocation on one device and frees it on
//!   drop.
//! - [`DeviceSlice`](struct.DeviceSlice.html) and [`DeviceSliceMut`](struct.DeviceSliceMut.html)
//!   borrow device memory owned by something else, usually a
//!   [`DualBuffer`](../vector/struct.DualBuffer.html).
//! - [`device_malloc`](fn.device_malloc.html) and [`device_free`](fn.device_free.html) are the
//!   unsafe primitives the structures are built on.
//!
//! Only [`DeviceCopy`](trait.DeviceCopy.html) types may be stored in device memory, since every
//! transfer is a bitwise copy.
//!
//! # FFI Information
//!
//! `DevicePointer<T>` has the same representation as `*mut T` and can be passed to kernels or
//! foreign code expecting raw device pointers. The owning structures are not FFI-safe.

mod device;
mod malloc;

pub use self::device::*;
pub use self::malloc::*;
pub use hdvec_core::{DeviceCopy, DevicePointer};
