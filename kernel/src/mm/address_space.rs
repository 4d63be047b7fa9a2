//! Process address-space descriptor
//!
//! Owns the page-table root (behind [`PageMapper`]) and the current stack
//! lower bound, the lowest address known to be backed by a resident stack
//! page. The bound is a raw address: before the first stack page exists it
//! sits at [`USER_STACK_TOP`], which is not canonical.

use alloc::boxed::Box;

use x86_64::{
    structures::paging::{
        mapper::MapToError, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags, PhysFrame,
    },
};

use super::{
    frame_pool::{FrameAllocator, TableFrames},
    PhysWindow, USER_STACK_TOP,
};
use crate::error::{KernelError, KernelResult};

/// Page-table primitive for one address space.
pub trait PageMapper {
    /// Map `page` to `frame`, user-accessible and optionally writable.
    /// Intermediate tables are drawn from `tables`. Fails if `page` is
    /// already mapped.
    fn install(
        &mut self,
        page: Page,
        frame: PhysFrame,
        writable: bool,
        tables: &mut dyn FrameAllocator,
    ) -> KernelResult<()>;

    /// Frame currently mapped at `page`, if any.
    fn translate(&self, page: Page) -> Option<PhysFrame>;
}

/// Address space of a user process.
pub struct AddressSpace {
    mapper: Box<dyn PageMapper>,
    stack_bottom: u64,
}

impl AddressSpace {
    /// Address space whose stack has not been set up yet: the bound sits at
    /// the top of user space, so the first growth fault maps the initial
    /// stack page.
    pub fn new(mapper: Box<dyn PageMapper>) -> Self {
        Self::with_stack_bottom(mapper, USER_STACK_TOP)
    }

    pub fn with_stack_bottom(mapper: Box<dyn PageMapper>, stack_bottom: u64) -> Self {
        Self {
            mapper,
            stack_bottom,
        }
    }

    /// Current stack lower bound.
    pub fn stack_bottom(&self) -> u64 {
        self.stack_bottom
    }

    /// Lower the stack bound to cover a newly mapped stack page. The bound
    /// never moves up.
    pub fn record_stack_growth(&mut self, page: Page) {
        let start = page.start_address().as_u64();
        if start < self.stack_bottom {
            self.stack_bottom = start;
        }
    }

    pub fn install(
        &mut self,
        page: Page,
        frame: PhysFrame,
        writable: bool,
        tables: &mut dyn FrameAllocator,
    ) -> KernelResult<()> {
        self.mapper.install(page, frame, writable, tables)
    }

    pub fn translate(&self, page: Page) -> Option<PhysFrame> {
        self.mapper.translate(page)
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("stack_bottom", &format_args!("{:#x}", self.stack_bottom))
            .finish_non_exhaustive()
    }
}

/// [`PageMapper`] over real x86_64 4-level page tables, reached through the
/// kernel's physical memory window.
pub struct OffsetMapper {
    table: OffsetPageTable<'static>,
}

impl OffsetMapper {
    /// Wrap the PML4 in `pml4`.
    ///
    /// # Safety
    ///
    /// `pml4` must hold a valid level-4 table, all physical memory the
    /// tables refer to must be mapped through `window`, and no other
    /// reference to the table may exist while the mapper lives.
    pub unsafe fn new(pml4: PhysFrame, window: PhysWindow) -> Self {
        let table_ptr = window.frame_ptr(pml4).cast::<PageTable>();
        // SAFETY: the caller guarantees the frame is a mapped, unaliased
        // level-4 table and that the window covers every table below it.
        let table = unsafe { OffsetPageTable::new(&mut *table_ptr, window.offset()) };
        Self { table }
    }
}

impl PageMapper for OffsetMapper {
    fn install(
        &mut self,
        page: Page,
        frame: PhysFrame,
        writable: bool,
        tables: &mut dyn FrameAllocator,
    ) -> KernelResult<()> {
        let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
        if writable {
            flags |= PageTableFlags::WRITABLE;
        }
        let parent_flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE;

        let addr = page.start_address().as_u64();
        // SAFETY: `frame` was just taken from the user pool, so it aliases
        // no other mapping, and `page` is a user page.
        let result = unsafe {
            self.table.map_to_with_table_flags(
                page,
                frame,
                flags,
                parent_flags,
                &mut TableFrames(tables),
            )
        };
        match result {
            // The page was not present, so no stale TLB entry can exist.
            Ok(flush) => {
                flush.ignore();
                Ok(())
            }
            Err(MapToError::PageAlreadyMapped(_)) => Err(KernelError::AlreadyExists {
                resource: "page mapping",
                id: addr,
            }),
            Err(MapToError::FrameAllocationFailed) => Err(KernelError::OutOfMemory {
                requested: super::PAGE_SIZE,
                available: 0,
            }),
            Err(MapToError::ParentEntryHugePage) => Err(KernelError::InvalidAddress { addr }),
        }
    }

    fn translate(&self, page: Page) -> Option<PhysFrame> {
        self.table.translate_page(page).ok()
    }
}
