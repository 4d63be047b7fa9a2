//! Cinder Kernel Trap Core
//!
//! CPU-exception dispatch and demand paging for the Cinder teaching kernel.
//! The low-level interrupt stubs hand every trap to [`trap::handle_trap`];
//! page faults are resolved by growing the user stack or lazily loading a
//! page described by the process's page registry, and every other exception
//! ends in process termination or a kernel panic.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod print;

pub mod arch;
pub mod bootstrap;
pub mod console;
pub mod error;
pub mod logger;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod test_support;

pub use error::{FaultError, KernelError, KernelResult};
pub use mm::{PAGE_SIZE, USER_STACK_TOP, USER_TOP};
pub use process::{CurrentProcess, ProcessMemory, EXIT_FAILURE};
