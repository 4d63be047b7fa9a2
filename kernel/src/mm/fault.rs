//! Page-fault resolution
//!
//! Decides, for a fault at a user address, whether it is a lazy load of a
//! registered page, a one-page stack growth, or an access that cannot be
//! satisfied. The trap handler owns what happens on failure.

use core::fmt;

use x86_64::structures::idt::PageFaultErrorCode;

use super::{is_user_vaddr, pagedir::Pager, user_page, Residency, PAGE_SIZE};
use crate::{error::FaultError, process::ProcessMemory};

/// Decoded page-fault error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCause {
    /// The page was not present (as opposed to a rights violation).
    pub not_present: bool,
    /// The access was a write.
    pub write: bool,
    /// The access came from user mode.
    pub user: bool,
}

impl FaultCause {
    pub fn decode(error_code: u64) -> Self {
        let code = PageFaultErrorCode::from_bits_truncate(error_code);
        Self {
            not_present: !code.contains(PageFaultErrorCode::PROTECTION_VIOLATION),
            write: code.contains(PageFaultErrorCode::CAUSED_BY_WRITE),
            user: code.contains(PageFaultErrorCode::USER_MODE),
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error {} page in {} context",
            if self.not_present {
                "not present"
            } else {
                "rights violation"
            },
            if self.write { "writing" } else { "reading" },
            if self.user { "user" } else { "kernel" },
        )
    }
}

/// How a fault was resolved. The faulting instruction can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Another path made the page resident first.
    AlreadyResident,
    /// A registered page was loaded from its backing.
    LazyLoaded,
    /// The stack grew by one page.
    StackGrown,
}

/// Resolve a page fault at `addr` in the current process.
pub fn resolve_fault(
    pager: &mut Pager<'_>,
    memory: &mut ProcessMemory,
    addr: u64,
    cause: FaultCause,
) -> Result<Resolution, FaultError> {
    if !is_user_vaddr(addr) {
        return Err(FaultError::KernelAddress { addr });
    }
    if !cause.not_present {
        return Err(FaultError::RightsViolation { addr });
    }

    let page = user_page(addr);
    if let Some(record) = memory.pages.lookup(page) {
        if cause.write && !record.writable {
            return Err(FaultError::RightsViolation { addr });
        }
        return match pager.resolve(memory, page) {
            Residency::AlreadyResident => Ok(Resolution::AlreadyResident),
            Residency::FaultedIn => Ok(Resolution::LazyLoaded),
            Residency::Unavailable(err) => Err(err),
        };
    }

    // Only the page directly below the current bound may be grown into.
    let bottom = memory.address_space.stack_bottom();
    let start = page.start_address().as_u64();
    if start < bottom && bottom - start <= PAGE_SIZE as u64 {
        pager.grow_stack(memory, page)?;
        return Ok(Resolution::StackGrown);
    }

    Err(FaultError::OutsideStackWindow { addr })
}
