//! Trap dispatch
//!
//! The low-level entry stubs save an [`InterruptFrame`] and call
//! [`handle_trap`], which looks the vector up in the exception table built
//! at boot and runs its handler.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Once;

use crate::{
    arch::{Cpu, InterruptFrame},
    error::{KernelError, KernelResult},
    mm::Pager,
    process::CurrentProcess,
};

pub mod exception;
pub mod table;

pub use exception::{exception_print_stats, kill, page_fault_count};
pub use table::{ExceptionTable, ExceptionTableBuilder, Handler, IntrLevel, VectorEntry};

/// Everything a handler may touch while it runs on the interrupted
/// thread's kernel stack.
pub struct TrapEnv<'a> {
    pub table: &'a ExceptionTable,
    pub cpu: &'a mut dyn Cpu,
    pub pager: Pager<'a>,
    pub process: &'a mut dyn CurrentProcess,
}

static EXCEPTIONS: Once<ExceptionTable> = Once::new();

/// Traps taken on vectors with no registered handler.
static UNEXPECTED: AtomicU64 = AtomicU64::new(0);

/// Build the exception table: CPU exceptions plus the system-call gate.
pub fn init_exception_table() -> KernelResult<&'static ExceptionTable> {
    if EXCEPTIONS.is_completed() {
        return Err(KernelError::AlreadyExists {
            resource: "exception table",
            id: 0,
        });
    }

    let mut builder = ExceptionTableBuilder::new();
    exception::register_exceptions(&mut builder)?;
    crate::syscall::register(&mut builder)?;
    Ok(EXCEPTIONS.call_once(|| builder.build()))
}

/// The boot exception table, once [`init_exception_table`] has run.
pub fn exceptions() -> Option<&'static ExceptionTable> {
    EXCEPTIONS.get()
}

/// Run the handler registered for `frame`'s vector.
pub fn dispatch(env: &mut TrapEnv<'_>, frame: &mut InterruptFrame) {
    let vector = frame.vector();
    let Some(entry) = env.table.get(vector).copied() else {
        UNEXPECTED.fetch_add(1, Ordering::Relaxed);
        log::warn!("unexpected interrupt {:#04x} at rip {:#x}", vector, frame.rip);
        return;
    };

    debug_assert!(
        entry.level == IntrLevel::On || !env.cpu.interrupts_enabled(),
        "vector {:#04x} ({}) entered with interrupts enabled",
        vector,
        entry.name
    );
    (entry.handler)(env, frame);
}

/// Traps taken on unregistered vectors since boot.
pub fn unexpected_count() -> u64 {
    UNEXPECTED.load(Ordering::Relaxed)
}

/// Entry point from the interrupt stubs.
///
/// `process` is the process whose thread was interrupted and `store`
/// supplies file-backed page contents. Returns an error only if the trap
/// core has not been initialized.
#[cfg(target_arch = "x86_64")]
pub fn handle_trap(
    frame: &mut InterruptFrame,
    process: &mut dyn CurrentProcess,
    store: &mut dyn crate::mm::BackingStore,
) -> KernelResult<()> {
    let table = exceptions().ok_or(KernelError::NotInitialized {
        subsystem: "exception table",
    })?;
    let mut frames = crate::mm::SharedPool::get().ok_or(KernelError::NotInitialized {
        subsystem: "user frame pool",
    })?;
    let window = crate::bootstrap::phys_window().ok_or(KernelError::NotInitialized {
        subsystem: "physical memory window",
    })?;

    let mut cpu = crate::arch::X86Cpu;
    let mut env = TrapEnv {
        table,
        cpu: &mut cpu,
        pager: Pager::new(&mut frames, store, window),
        process,
    };
    dispatch(&mut env, frame);
    Ok(())
}
