//! hdvec-core is the minimal, `no_std` subset of hdvec which can be shared with device-side
//! crates.
//!
//! It includes the handful of types that describe device memory without owning it: the
//! [`DeviceCopy`](trait.DeviceCopy.html) marker, access levels and device pointers. This is not
//! intended to be used in a standalone way - see hdvec for full documentation.

#![no_std]
#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_import_braces,
    unused_results,
    unused_qualifications
)]
#![allow(unknown_lints)]

mod access;
mod memory;

pub use crate::access::*;
pub use crate::memory::*;
