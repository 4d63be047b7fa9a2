//! Page-table query layer
//!
//! Answers "is this user page resident?" and never reports a miss
//! passively: a page with a registry record that is not loaded yet is
//! faulted in on the spot. Stack growth shares the same allocation and
//! rollback policy and lives here as well.

use x86_64::structures::paging::{Page, PhysFrame};

use super::{
    frame_pool::{AllocFlags, FrameAllocator},
    registry::{Backing, BackingStore},
    user_page, PhysWindow, PAGE_SIZE, USER_STACK_TOP,
};
use crate::{
    error::{FaultError, KernelError, KernelResult},
    process::ProcessMemory,
};

/// Outcome of a residency query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// The page was loaded before the query; nothing was allocated.
    AlreadyResident,
    /// The page was missing and has just been loaded and mapped.
    FaultedIn,
    /// The page cannot be made resident.
    Unavailable(FaultError),
}

impl Residency {
    pub fn is_resident(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Collaborators used to make user pages resident.
pub struct Pager<'a> {
    pub frames: &'a mut dyn FrameAllocator,
    pub store: &'a mut dyn BackingStore,
    pub window: PhysWindow,
}

impl<'a> Pager<'a> {
    pub fn new(
        frames: &'a mut dyn FrameAllocator,
        store: &'a mut dyn BackingStore,
        window: PhysWindow,
    ) -> Self {
        Self {
            frames,
            store,
            window,
        }
    }

    /// Look `page` up and fault it in if it is not loaded yet.
    ///
    /// A loaded record short-circuits before the allocator is touched, so a
    /// page is never given a second frame.
    pub fn resolve(&mut self, memory: &mut ProcessMemory, page: Page) -> Residency {
        if memory.pages.lookup(page).is_some_and(|record| record.is_loaded()) {
            return Residency::AlreadyResident;
        }
        match self.lazy_load(memory, page) {
            Ok(()) => Residency::FaultedIn,
            Err(err) => Residency::Unavailable(err),
        }
    }

    pub fn is_resident(&mut self, memory: &mut ProcessMemory, page: Page) -> bool {
        self.resolve(memory, page).is_resident()
    }

    /// Allocate a frame for `page`, fill it from the page's backing, map it
    /// and mark the record loaded.
    ///
    /// The frame is populated completely before the mapping is installed.
    /// On any failure after allocation the frame goes back to the pool.
    pub fn lazy_load(&mut self, memory: &mut ProcessMemory, page: Page) -> Result<(), FaultError> {
        let addr = page.start_address().as_u64();
        let record = *memory
            .pages
            .lookup(page)
            .ok_or(FaultError::NoBacking { addr })?;
        if record.is_loaded() {
            return Ok(());
        }

        let flags = match record.backing {
            Backing::Zero => AllocFlags::USER | AllocFlags::ZERO,
            Backing::File { .. } => AllocFlags::USER,
        };
        let frame = self
            .frames
            .allocate(flags)
            .ok_or(FaultError::OutOfFrames { addr })?;

        if let Err(err) = self.populate(frame, record.backing) {
            log::debug!("loading page {:#x} failed: {}", addr, err);
            self.frames.free(frame);
            return Err(FaultError::LoadFailed { addr });
        }

        if let Err(err) = memory
            .address_space
            .install(page, frame, record.writable, &mut *self.frames)
        {
            log::debug!("mapping page {:#x} failed: {}", addr, err);
            self.frames.free(frame);
            return Err(FaultError::InstallFailed { addr });
        }

        memory.pages.mark_loaded(page);
        Ok(())
    }

    fn populate(&mut self, frame: PhysFrame, backing: Backing) -> KernelResult<()> {
        let Backing::File {
            file,
            offset,
            read_bytes,
        } = backing
        else {
            // Zero pages were cleared by the allocator.
            return Ok(());
        };

        // SAFETY: the frame was just allocated and is not mapped anywhere
        // yet, so this is the only reference to its contents.
        let bytes = unsafe { self.window.frame_bytes(frame) };
        let read = self.store.read_at(file, offset, &mut bytes[..read_bytes])?;
        if read != read_bytes {
            return Err(KernelError::IoError {
                operation: "short read from backing file",
            });
        }
        bytes[read_bytes..].fill(0);
        Ok(())
    }

    /// Map a zeroed, writable page at `page` and lower the stack bound to
    /// it. The page is registered as a loaded zero page so later queries
    /// find it resident.
    pub fn grow_stack(&mut self, memory: &mut ProcessMemory, page: Page) -> Result<(), FaultError> {
        let addr = page.start_address().as_u64();
        let frame = self
            .frames
            .allocate(AllocFlags::USER | AllocFlags::ZERO)
            .ok_or(FaultError::OutOfFrames { addr })?;

        if let Err(err) = memory
            .address_space
            .install(page, frame, true, &mut *self.frames)
        {
            log::debug!("mapping stack page {:#x} failed: {}", addr, err);
            self.frames.free(frame);
            return Err(FaultError::InstallFailed { addr });
        }

        memory.address_space.record_stack_growth(page);
        if let Err(err) = memory.pages.insert_resident(page, Backing::Zero, true) {
            log::warn!("stack page {:#x} already had a record: {}", addr, err);
        }
        Ok(())
    }

    /// Map the initial user stack page directly below [`USER_STACK_TOP`].
    /// Called by the executable loader, which deals in [`KernelResult`].
    pub fn setup_stack(&mut self, memory: &mut ProcessMemory) -> KernelResult<()> {
        self.grow_stack(memory, user_page(USER_STACK_TOP - PAGE_SIZE as u64))?;
        Ok(())
    }
}
