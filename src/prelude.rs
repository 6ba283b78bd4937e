//! This module re-exports a number of commonly-used types for working with hdvec.
//!
//! This allows the user to `use hdvec::prelude::*;` and have the most commonly-used types
//! available quickly.

pub use crate::context::{Context, ContextFlags};
pub use crate::data::{CsrSource, DataSource, Entry, MetaInfo, SparsePage};
pub use crate::memory::{CopyDestination, DeviceBuffer};
pub use crate::vector::{DualBuffer, Residency};
pub use crate::{DeviceOrdinal, GpuAccess};
