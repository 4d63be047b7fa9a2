//! Bootstrap for the trap core
//!
//! Brings the subsystems up in dependency order: kernel heap, logging, the
//! physical memory window and user frame pool, then the exception table.
//! Traps arriving before [`init`] finishes are reported as uninitialized by
//! [`crate::trap::handle_trap`].

use log::LevelFilter;
use spin::Once;
use x86_64::{PhysAddr, VirtAddr};

use crate::{
    error::{KernelError, KernelResult},
    logger,
    mm::{frame_pool, FramePool, PhysWindow, PAGE_SIZE},
    trap,
};

/// Physical range handed to the user frame pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPoolConfig {
    pub base: PhysAddr,
    pub frames: usize,
}

/// Kernel heap region, already mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRegion {
    pub start: VirtAddr,
    pub size: usize,
}

/// Boot-time configuration, filled in by the loader glue.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    pub log_level: LevelFilter,
    /// Virtual address at which all physical memory is mapped.
    pub phys_window: VirtAddr,
    pub user_pool: UserPoolConfig,
    /// Only used on bare metal, where the kernel owns the global allocator.
    pub heap: Option<HeapRegion>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            phys_window: VirtAddr::zero(),
            user_pool: UserPoolConfig {
                base: PhysAddr::zero(),
                frames: 0,
            },
            heap: None,
        }
    }
}

impl BootConfig {
    /// Check the configuration before any global state is touched, so a
    /// rejected configuration can be corrected and retried.
    pub fn validate(&self) -> KernelResult<()> {
        #[cfg(not(target_os = "none"))]
        if self.heap.is_some() {
            return Err(KernelError::InvalidArgument {
                name: "heap",
                value: "the host allocator is in use",
            });
        }
        if self.user_pool.frames == 0 {
            return Err(KernelError::InvalidArgument {
                name: "user_pool",
                value: "empty",
            });
        }
        if self.user_pool.base.as_u64() % PAGE_SIZE as u64 != 0 {
            return Err(KernelError::InvalidArgument {
                name: "user_pool",
                value: "base is not page aligned",
            });
        }
        Ok(())
    }
}

static PHYS_WINDOW: Once<PhysWindow> = Once::new();

/// Kernel view of physical memory, once [`init`] has run.
pub fn phys_window() -> Option<PhysWindow> {
    PHYS_WINDOW.get().copied()
}

/// Initialize the trap core.
///
/// # Safety
///
/// The heap region (if any) must be mapped, writable and otherwise unused,
/// `phys_window` must map every frame of the user pool, and the pool's
/// frames must not be used by anything else.
pub unsafe fn init(config: &BootConfig) -> KernelResult<()> {
    if trap::exceptions().is_some() {
        return Err(KernelError::AlreadyExists {
            resource: "trap core",
            id: 0,
        });
    }

    config.validate()?;

    // Stage 1: kernel heap
    #[cfg(target_os = "none")]
    if let Some(heap) = config.heap {
        // SAFETY: forwarded from the caller's contract on the heap region.
        unsafe { crate::mm::heap::init(heap.start.as_mut_ptr(), heap.size) };
    }

    // Stage 2: logging
    logger::init(config.log_level)?;
    log::info!("trap core: starting initialization");

    // Stage 3: physical memory and the user pool
    let window = *PHYS_WINDOW.call_once(|| PhysWindow::new(config.phys_window));
    frame_pool::init_user_pool(FramePool::new(
        config.user_pool.base,
        config.user_pool.frames,
        window,
    ));
    log::info!(
        "user pool: {} frames at {:#x}",
        config.user_pool.frames,
        config.user_pool.base.as_u64()
    );

    // Stage 4: exception vectors
    let table = trap::init_exception_table()?;
    log::info!("exception table: {} vectors", table.registered().count());

    println!("[BOOTSTRAP] Trap core initialized");
    Ok(())
}
