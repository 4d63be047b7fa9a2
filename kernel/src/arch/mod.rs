//! Architecture support
//!
//! The trap core targets x86_64. The interrupt frame layout and the CPU seam
//! are plain data and traits so that the resolver logic also builds (and is
//! tested) on the host; only [`X86Cpu`] touches real hardware.

pub mod x86_64;

pub use self::x86_64::{
    cpu::{capture_fault_address, Cpu},
    frame::{InterruptFrame, KERNEL_CODE_SELECTOR, USER_CODE_SELECTOR},
};

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::cpu::X86Cpu;
