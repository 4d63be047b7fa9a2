//! Memory management for the trap core
//!
//! Demand paging of user memory: the physical frame pool, per-process
//! address spaces and page registries, the page-table query layer that
//! faults pages in on a miss, and the page-fault resolver itself.

use x86_64::{
    structures::paging::{Page, PhysFrame},
    VirtAddr,
};

pub mod address_space;
pub mod fault;
pub mod frame_pool;
#[cfg(target_os = "none")]
pub mod heap;
pub mod pagedir;
pub mod registry;
pub mod uaccess;

pub use address_space::{AddressSpace, OffsetMapper, PageMapper};
pub use fault::{resolve_fault, FaultCause, Resolution};
pub use frame_pool::{AllocFlags, FrameAllocator, FramePool, SharedPool};
pub use pagedir::{Pager, Residency};
pub use registry::{Backing, BackingStore, FileId, PageRecord, PageRegistry};
pub use uaccess::{copy_from_user, read_user_u64};

/// Size of a page and of a physical frame (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// First address past the user half of the address space.
pub const USER_TOP: u64 = 0x0000_8000_0000_0000;

/// Top of the initial user stack; the first stack page sits just below.
///
/// Used as a raw bound only. It is one past the canonical user half, so it
/// must never be turned into a `VirtAddr`.
pub const USER_STACK_TOP: u64 = USER_TOP;

/// Whether `addr` lies in the user address envelope.
///
/// The envelope starts above page zero so null dereferences are never
/// treated as stack or lazy-load candidates.
pub fn is_user_vaddr(addr: u64) -> bool {
    addr >= PAGE_SIZE as u64 && addr < USER_TOP
}

/// User page containing `addr`. The caller must have checked
/// [`is_user_vaddr`].
pub fn user_page(addr: u64) -> Page {
    Page::containing_address(VirtAddr::new(addr))
}

/// Kernel view of physical memory: all of RAM mapped at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysWindow {
    offset: VirtAddr,
}

impl PhysWindow {
    pub const fn new(offset: VirtAddr) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> VirtAddr {
        self.offset
    }

    /// Kernel virtual address of a physical frame.
    pub fn frame_ptr(&self, frame: PhysFrame) -> *mut u8 {
        (self.offset + frame.start_address().as_u64()).as_mut_ptr()
    }

    /// Contents of a physical frame.
    ///
    /// # Safety
    ///
    /// `frame` must lie inside the window, and the caller must hold the
    /// only live reference to its contents for the returned lifetime.
    pub unsafe fn frame_bytes<'a>(&self, frame: PhysFrame) -> &'a mut [u8] {
        // SAFETY: the caller guarantees the frame is mapped by the window
        // and not aliased.
        unsafe { core::slice::from_raw_parts_mut(self.frame_ptr(frame), PAGE_SIZE) }
    }
}
