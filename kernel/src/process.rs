//! Current-process seam
//!
//! The trap core never owns process control blocks. It reaches the
//! interrupted process through [`CurrentProcess`], which exposes the
//! process's memory state and the two outcomes a trap can impose on it.

use crate::mm::{AddressSpace, PageRegistry};

/// Exit status of a process terminated by the kernel.
pub const EXIT_FAILURE: i32 = -1;

/// Memory state of a user process, mutated only on behalf of its own
/// threads.
#[derive(Debug)]
pub struct ProcessMemory {
    pub address_space: AddressSpace,
    pub pages: PageRegistry,
}

impl ProcessMemory {
    pub fn new(address_space: AddressSpace) -> Self {
        Self {
            address_space,
            pages: PageRegistry::new(),
        }
    }
}

/// The process whose thread took the trap.
pub trait CurrentProcess {
    /// Process name for diagnostics.
    fn name(&self) -> &str;

    fn memory(&mut self) -> &mut ProcessMemory;

    /// Write to open file `fd`. Returns `None` if `fd` is not open.
    fn write_file(&mut self, fd: i32, bytes: &[u8]) -> Option<usize>;

    /// Terminate the process with `status`. Never returns to the trap.
    fn exit(&mut self, status: i32) -> !;
}
