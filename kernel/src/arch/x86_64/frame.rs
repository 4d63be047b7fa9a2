//! Saved interrupt frame
//!
//! Built by the low-level entry stubs: the CPU pushes `ss`, `rsp`,
//! `rflags`, `cs`, `rip` (and an error code for some vectors), the stub
//! pushes the vector number, a zero error code where the CPU supplied none,
//! and the caller's `rax`, which is restored on return and carries system
//! call results.

use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

/// Kernel code segment selector (GDT slot 1).
pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);

/// User code segment selector (GDT slot 6, RPL 3).
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(6, PrivilegeLevel::Ring3);

/// Interrupted context as laid out on the kernel stack by the entry stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InterruptFrame {
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl InterruptFrame {
    /// Vector number as delivered (0-255).
    pub fn vector(&self) -> u8 {
        (self.vector & 0xFF) as u8
    }

    /// Saved code-segment selector.
    pub fn code_segment(&self) -> SegmentSelector {
        SegmentSelector(self.cs as u16)
    }

    /// Print the frame for post-mortem debugging.
    pub fn dump(&self, name: &str, cr2: u64) {
        println!(
            "Interrupt {:#04x} ({}) at rip={:#018x}",
            self.vector(),
            name,
            self.rip
        );
        println!(" cr2={:#018x} error={:#010x}", cr2, self.error_code);
        println!(" rsp={:#018x} rflags={:#010x}", self.rsp, self.rflags);
        println!(" cs={:04x} ss={:04x} rax={:#018x}", self.cs, self.ss, self.rax);
    }
}
