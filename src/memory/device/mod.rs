use crate::error::HdvResult;

mod device_buffer;
mod device_slice;

pub use self::device_buffer::*;
pub use self::device_slice::*;

/// Sealed trait implemented by device memory which can be filled from, or drained to, a host
/// slice.
pub trait CopyDestination<O: ?Sized>: crate::private::Sealed {
    /// Copy data from `source`. `source` must be the same size as `self`.
    ///
    /// # Errors:
    ///
    /// If the backend fails the transfer, return the error.
    fn copy_from(&mut self, source: &O) -> HdvResult<()>;

    /// Copy data to `dest`. `dest` must be the same size as `self`.
    ///
    /// # Errors:
    ///
    /// If the backend fails the transfer, return the error.
    fn copy_to(&self, dest: &mut O) -> HdvResult<()>;
}
