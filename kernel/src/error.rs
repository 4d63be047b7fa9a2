//! Error types for the Cinder trap core
//!
//! Kernel operations return [`KernelResult`]. Paging failures are carried as
//! the nested [`FaultError`] so the page-fault handler can tell a fault that
//! must kill the offending context apart from one that only terminates the
//! current process.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Memory-related errors
    OutOfMemory {
        requested: usize,
        available: usize,
    },
    InvalidAddress {
        addr: u64,
    },

    /// Demand-paging errors
    Fault(FaultError),

    /// Generic errors
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    AlreadyExists {
        resource: &'static str,
        id: u64,
    },
    NotFound {
        resource: &'static str,
        id: u64,
    },
    NotInitialized {
        subsystem: &'static str,
    },
    IoError {
        operation: &'static str,
    },
}

/// Why a page fault (or a demand-paged user access) could not be resolved.
///
/// Every variant carries the faulting address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// Address lies outside the user address envelope.
    KernelAddress { addr: u64 },
    /// The page is present but the access is not permitted.
    RightsViolation { addr: u64 },
    /// No backing record and not the next page below the stack.
    OutsideStackWindow { addr: u64 },
    /// The user pool had no frame to give.
    OutOfFrames { addr: u64 },
    /// The backing store could not populate the frame.
    LoadFailed { addr: u64 },
    /// The page table refused the mapping.
    InstallFailed { addr: u64 },
    /// The page registry has no record for the page.
    NoBacking { addr: u64 },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Out of memory: requested {} bytes, {} available",
                    requested, available
                )
            }
            Self::InvalidAddress { addr } => write!(f, "Invalid address: 0x{:x}", addr),
            Self::Fault(e) => write!(f, "Page fault error: {}", e),
            Self::InvalidArgument { name, value } => {
                write!(f, "Invalid argument '{}': {}", name, value)
            }
            Self::AlreadyExists { resource, id } => {
                write!(f, "{} with id {} already exists", resource, id)
            }
            Self::NotFound { resource, id } => write!(f, "{} with id {} not found", resource, id),
            Self::NotInitialized { subsystem } => {
                write!(f, "Subsystem not initialized: {}", subsystem)
            }
            Self::IoError { operation } => write!(f, "I/O error during {}", operation),
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelAddress { addr } => write!(f, "0x{:x} is not a user address", addr),
            Self::RightsViolation { addr } => write!(f, "access rights violation at 0x{:x}", addr),
            Self::OutsideStackWindow { addr } => {
                write!(f, "0x{:x} is outside the stack growth window", addr)
            }
            Self::OutOfFrames { addr } => write!(f, "no user frame for 0x{:x}", addr),
            Self::LoadFailed { addr } => write!(f, "could not load page at 0x{:x}", addr),
            Self::InstallFailed { addr } => write!(f, "could not map page at 0x{:x}", addr),
            Self::NoBacking { addr } => write!(f, "no backing for page at 0x{:x}", addr),
        }
    }
}

impl From<FaultError> for KernelError {
    fn from(err: FaultError) -> Self {
        Self::Fault(err)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_fault_error_converts_and_displays() {
        let err: KernelError = FaultError::NoBacking { addr: 0x8048000 }.into();
        assert_eq!(err, KernelError::Fault(FaultError::NoBacking { addr: 0x8048000 }));
        assert_eq!(
            err.to_string(),
            "Page fault error: no backing for page at 0x8048000"
        );
    }
}
