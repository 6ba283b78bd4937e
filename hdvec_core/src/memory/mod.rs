mod pointer;
pub use self::pointer::*;

use core::marker::PhantomData;
use core::num::*;

/// Marker trait for element types which may live in a dual host/device buffer.
///
/// Moving a buffer between the host and an accelerator is a plain byte copy, so an element type
/// must be duplicable by copying its bits and must not refer to host memory the device cannot
/// see. Unlike `Copy`, `DeviceCopy` says nothing about implicit copies on assignment; it only
/// promises that a bitwise transfer produces a valid value on the other side.
///
/// ## How can I implement DeviceCopy?
///
/// The simplest way is to `derive` it:
///
/// ```
/// #[macro_use]
/// extern crate hdvec;
///
/// #[derive(Clone, DeviceCopy)]
/// struct Split {
///     feature: u32,
///     threshold: f32,
/// }
/// # fn main() {}
/// ```
///
/// The derive is sound because it checks that every field is itself `DeviceCopy`. A type holding
/// a `Vec` is rejected at compile time:
///
/// ```compile_fail
/// # #[macro_use]
/// # extern crate hdvec;
/// #[derive(Clone, DeviceCopy)]
/// struct Row(Vec<f32>);
/// # fn main() {}
/// ```
///
/// The trait can also be implemented by hand, taking responsibility for the guarantee:
///
/// ```
/// use hdvec::DeviceCopy;
///
/// #[derive(Clone)]
/// struct Gradient(f32, f32);
///
/// unsafe impl DeviceCopy for Gradient {}
/// ```
///
/// ## When can't my type be `DeviceCopy`?
///
/// References, boxes and anything else pointing into host memory would dangle on the device.
/// Likewise, a type implementing `Drop` manages some host resource and cannot be duplicated by a
/// byte copy.
pub unsafe trait DeviceCopy {}

macro_rules! impl_device_copy {
    ($($t:ty)*) => {
        $(
            unsafe impl DeviceCopy for $t {}
        )*
    }
}

impl_device_copy!(
    usize u8 u16 u32 u64 u128
    isize i8 i16 i32 i64 i128
    f32 f64
    bool char

    NonZeroU8 NonZeroU16 NonZeroU32 NonZeroU64 NonZeroU128 NonZeroUsize
);

unsafe impl DeviceCopy for () {}
unsafe impl<T: DeviceCopy> DeviceCopy for Option<T> {}
unsafe impl<T: ?Sized + DeviceCopy> DeviceCopy for PhantomData<T> {}
unsafe impl<T: DeviceCopy> DeviceCopy for Wrapping<T> {}
unsafe impl<T: DeviceCopy, const N: usize> DeviceCopy for [T; N] {}

macro_rules! impl_device_copy_tuple {
    ($($name:ident)+) => {
        unsafe impl<$($name: DeviceCopy),+> DeviceCopy for ($($name,)+) {}
    }
}

impl_device_copy_tuple!(A);
impl_device_copy_tuple!(A B);
impl_device_copy_tuple!(A B C);
impl_device_copy_tuple!(A B C D);
impl_device_copy_tuple!(A B C D E);
impl_device_copy_tuple!(A B C D E F);

#[cfg(test)]
mod test {
    use super::*;

    fn is_device_copy<T: DeviceCopy>() {}

    #[test]
    fn test_builtin_impls() {
        is_device_copy::<()>();
        is_device_copy::<char>();
        is_device_copy::<bool>();
        is_device_copy::<NonZeroU32>();
        is_device_copy::<Option<((), char)>>();
        is_device_copy::<[Wrapping<u8>; 3]>();
        is_device_copy::<PhantomData<u64>>();
    }
}
