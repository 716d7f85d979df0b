use core::fmt;

/// Kernel-wide error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Malformed fd, null or out-of-range buffer, over-length name.
    InvalidArgument,
    /// No free process id or fd slot.
    ResourceExhausted,
    /// Name absent from the file store.
    NotFound,
    /// Missing or wrong executable marker.
    FormatError,
    /// Attempt to tear down a root shell (handled by respawn, never surfaced).
    ProtectedOperation,
    /// Direction violation on a reserved fd, or write to the read-only store.
    NotPermitted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::ResourceExhausted => write!(f, "No free slot"),
            KernelError::NotFound => write!(f, "No such file or directory"),
            KernelError::FormatError => write!(f, "Not an executable"),
            KernelError::ProtectedOperation => write!(f, "Operation on a protected process"),
            KernelError::NotPermitted => write!(f, "Operation not permitted"),
        }
    }
}

pub type KResult<T> = Result<T, KernelError>;
