//! Error types for boostkern
//!
//! Only recoverable failures are represented here. Broken caller invariants
//! (zero feature mask, unset feature offset, mismatched key/group-id lengths,
//! empty group offsets) panic instead of returning an error.

use crate::options::BorderSelectionType;
use thiserror::Error;

/// Result type alias using boostkern's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running kernels
#[derive(Error, Debug)]
pub enum Error {
    /// Destination buffer cannot hold the requested borders plus the count slot
    #[error("Border buffer of {dst_len} elements is too small for {border_count} borders")]
    BorderCountTooLarge {
        /// Requested number of borders
        border_count: u32,
        /// Length of the destination buffer
        dst_len: usize,
    },

    /// Border selection mode has no device implementation
    #[error("Unsupported border selection on device: {selection}")]
    UnsupportedBorderSelection {
        /// The rejected selection mode
        selection: BorderSelectionType,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Handle resolved on a device other than the one it lives on
    #[error("Device mismatch: handle lives on device {expected}, resolved on device {got}")]
    DeviceMismatch {
        /// Device that owns the memory
        expected: usize,
        /// Device that tried to use it
        got: usize,
    },

    /// Handle points at a buffer that has already been released
    #[error("Buffer {handle} was released before the kernel resolved it")]
    BufferReleased {
        /// Registry id of the released buffer
        handle: u64,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Kernel descriptor could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Work enqueued on a stream failed
    #[error("Stream {stream} on device {device} failed: {reason}")]
    StreamFailed {
        /// Device the stream belongs to
        device: usize,
        /// Stream index on that device
        stream: u32,
        /// Description of the first failure
        reason: String,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Returns true for host-side validation failures raised before enqueue
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::BorderCountTooLarge { .. }
                | Self::UnsupportedBorderSelection { .. }
                | Self::InvalidArgument { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
