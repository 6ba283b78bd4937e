use crate::memory::DeviceCopy;
use core::fmt;
use core::ptr;

/// Identifier of one accelerator.
///
/// Ordinals are dense, starting at zero, in the order the backend enumerates its devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceOrdinal(u32);
unsafe impl DeviceCopy for DeviceOrdinal {}
impl DeviceOrdinal {
    /// Creates the ordinal for the `index`-th device.
    pub const fn new(index: u32) -> Self {
        DeviceOrdinal(index)
    }

    /// Returns the ordinal as an index, suitable for addressing per-device tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw ordinal.
    pub fn get(self) -> u32 {
        self.0
    }
}
impl From<u32> for DeviceOrdinal {
    fn from(index: u32) -> Self {
        DeviceOrdinal(index)
    }
}
impl fmt::Display for DeviceOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// A pointer to device memory.
///
/// DevicePointer cannot be dereferenced by the host, as it points into an allocation owned by an
/// accelerator. It can be passed to kernels or foreign code and converted back to an address.
///
/// # Examples:
///
/// ```
/// use hdvec_core::DevicePointer;
/// let ptr: DevicePointer<f32> = DevicePointer::null();
/// assert!(ptr.is_null());
/// assert_eq!(ptr.address(), 0);
/// ```
#[repr(transparent)]
pub struct DevicePointer<T>(*mut T);
unsafe impl<T> DeviceCopy for DevicePointer<T> {}
impl<T> Clone for DevicePointer<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DevicePointer<T> {}
impl<T> PartialEq for DevicePointer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for DevicePointer<T> {}
impl<T> fmt::Debug for DevicePointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DevicePointer").field(&self.0).finish()
    }
}
impl<T> DevicePointer<T> {
    /// Returns a null device pointer.
    pub fn null() -> Self {
        DevicePointer(ptr::null_mut())
    }

    /// Wrap the given raw pointer in a DevicePointer.
    ///
    /// # Safety
    ///
    /// The pointer must be null or point into memory allocated by a device backend.
    pub unsafe fn wrap(ptr: *mut T) -> Self {
        DevicePointer(ptr)
    }

    /// Wrap a raw device address, as found in foreign array descriptions.
    ///
    /// # Safety
    ///
    /// The address must be zero or point into memory allocated by a device backend.
    pub unsafe fn from_address(address: usize) -> Self {
        DevicePointer(address as *mut T)
    }

    /// Returns the contained pointer as a raw pointer. The returned pointer is not valid on the
    /// host and must not be dereferenced there.
    pub fn as_raw(&self) -> *const T {
        self.0
    }

    /// Returns the contained pointer as a mutable raw pointer. The returned pointer is not valid
    /// on the host and must not be dereferenced there.
    pub fn as_raw_mut(&mut self) -> *mut T {
        self.0
    }

    /// Returns the numeric device address.
    pub fn address(&self) -> usize {
        self.0 as usize
    }

    /// Returns true if the pointer is null.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Offsets the pointer by `count` elements using wrapping arithmetic.
    ///
    /// ```
    /// use hdvec_core::DevicePointer;
    /// let base = unsafe { DevicePointer::<u32>::from_address(0x1000) };
    /// assert_eq!(base.wrapping_add(4).address(), 0x1010);
    /// ```
    pub fn wrapping_add(self, count: usize) -> Self {
        DevicePointer(self.0.wrapping_add(count))
    }

    /// Reinterprets the pointer as pointing to bytes.
    pub fn cast_bytes(self) -> DevicePointer<u8> {
        DevicePointer(self.0 as *mut u8)
    }
}
impl<T> fmt::Pointer for DevicePointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.0, f)
    }
}
