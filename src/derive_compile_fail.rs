//! This module is a dummy module. It contains doctests that should fail to compile. It's used for
//! testing the DeviceCopy custom-derive macro and should not contain any actual code.
//!
//! ```compile_fail
//! #[macro_use]
//! extern crate hdvec;
//!
//! #[derive(Clone, DeviceCopy)]
//! struct ShouldFailTuple(Vec<u64>);
//! # fn main() {}
//! ```
//!
//! ```compile_fail
//! #[macro_use]
//! extern crate hdvec;
//!
//! #[derive(Clone, DeviceCopy)]
//! struct ShouldFailStruct{v: Vec<u64>}
//! # fn main() {}
//! ```
//!
//! ```compile_fail
//! #[macro_use]
//! extern crate hdvec;
//!
//! #[derive(Clone, DeviceCopy)]
//! struct ShouldFailSplit {
//!     feature: u32,
//!     thresholds: Box<[f32]>,
//! }
//! # fn main() {}
//! ```
//!
//! ```compile_fail
//! #[macro_use]
//! extern crate hdvec;
//!
//! #[derive(Clone, DeviceCopy)]
//! enum ShouldFailStructEnum {
//!     Leaf,
//!     Split{children: Vec<u32>},
//! }
//! # fn main() {}
//! ```
//!
//! ```compile_fail
//! #[macro_use]
//! extern crate hdvec;
//!
//! #[derive(Copy, Clone, DeviceCopy)]
//! union ShouldFailUnion {
//!     u: *const u64,
//!     o: *const i64,
//! }
//! # fn main() {}
//! ```
//!
//! ```compile_fail
//! use hdvec::{Context, DualBuffer};
//!
//! // Strings own host memory and cannot be stored on a device.
//! let ctx = Context::host_only();
//! let names = DualBuffer::from_vec(&ctx, vec![String::new()], None);
//! ```
