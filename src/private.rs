//! This module contains private sealed traits that should not be used or implemented outside of
//! hdvec. These traits are public because they are used as bounds in certain functions.
//! These traits may change in any way at any time with no warning, and this will not be considered
//! a breaking change.

use crate::memory::{DeviceBuffer, DeviceSliceMut};
use crate::DeviceCopy;

pub trait Sealed {}

impl<T: DeviceCopy> Sealed for DeviceBuffer<T> {}
impl<'a, T: DeviceCopy> Sealed for DeviceSliceMut<'a, T> {}
