//! Types for error handling
//!
//! # Error handling in hdvec
//!
//! Recoverable failures (an allocation the device cannot satisfy, a bad device ordinal, a stream
//! that is not in the expected binary format) are returned as [`HdvError`]. Broken invariants are
//! not: asking for a device view of a buffer with no device designated, or finding a buffer that
//! claims device residency without device storage, means the calling code is wrong, and hdvec
//! panics instead of returning an error.

use crate::DeviceOrdinal;
use std::io;
use thiserror::Error;

/// Memory domain an error refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Domain {
    /// Host memory.
    Host,
    /// Memory of the designated accelerator.
    Device,
}

/// Error enum which represents all the potential errors returned by hdvec.
#[derive(Debug, Error)]
pub enum HdvError {
    /// An allocation of `requested` bytes could not be satisfied.
    #[error("out of {domain:?} memory: requested {requested} bytes on {device:?}")]
    OutOfMemory {
        /// Domain the allocation was attempted in.
        domain: Domain,
        /// Device the allocation was attempted on, if any.
        device: Option<DeviceOrdinal>,
        /// Size of the failed allocation.
        requested: usize,
    },

    /// The requested device does not exist.
    #[error("{device} is not available ({available} device(s) present)")]
    InvalidDevice {
        /// Requested device.
        device: DeviceOrdinal,
        /// Number of devices the backend exposes.
        available: usize,
    },

    /// A device address does not lie within a live allocation.
    #[error("address {address:#x} (+{len} bytes) is not a live allocation on {device}")]
    InvalidAddress {
        /// Device the address was used on.
        device: DeviceOrdinal,
        /// The offending address.
        address: usize,
        /// Number of bytes accessed from `address`.
        len: usize,
    },

    /// The accelerator driver reported an error code.
    #[error("driver error {code} in {call}")]
    Driver {
        /// Driver call that failed.
        call: &'static str,
        /// Raw status code.
        code: i64,
    },

    /// A binary stream does not start with the expected magic number.
    #[error("invalid format, magic number mismatch: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Magic number of the expected container.
        expected: u32,
        /// Magic number found in the stream.
        found: u32,
    },

    /// A binary stream was written by an incompatible format version.
    #[error("unsupported format version {found} (expected {expected})")]
    VersionMismatch {
        /// Version this build reads.
        expected: u32,
        /// Version found in the stream.
        found: u32,
    },

    /// A binary stream decoded to an inconsistent structure.
    #[error("corrupt data: {0}")]
    Format(String),

    /// Caller supplied data which cannot be ingested.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A JSON document could not be parsed.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading from or writing to a stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for most hdvec functions.
pub type HdvResult<T> = Result<T, HdvError>;

/// Converts a raw driver status code into a result.
#[cfg(feature = "cuda")]
pub(crate) trait ToResult {
    fn to_result(self, call: &'static str) -> HdvResult<()>;
}

#[cfg(feature = "cuda")]
impl ToResult for cuda_driver_sys::CUresult {
    fn to_result(self, call: &'static str) -> HdvResult<()> {
        match self {
            cuda_driver_sys::CUresult::CUDA_SUCCESS => Ok(()),
            code => Err(HdvError::Driver {
                call,
                code: code as i64,
            }),
        }
    }
}
