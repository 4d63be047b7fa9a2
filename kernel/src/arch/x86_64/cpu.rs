//! CPU control needed by the trap handlers
//!
//! Handlers never touch control registers directly; they go through [`Cpu`]
//! so the page-fault entry sequence can be exercised without hardware.

/// Interrupt-flag control and the faulting-address register.
pub trait Cpu {
    /// Whether maskable interrupts are currently enabled (IF set).
    fn interrupts_enabled(&self) -> bool;

    fn enable_interrupts(&mut self);

    /// Raw value of the faulting-address register (CR2).
    fn read_fault_address(&mut self) -> u64;
}

/// Read the faulting address on page-fault entry, then unmask interrupts.
///
/// The page-fault gate is registered with interrupts off, so this runs
/// inside the masked window the CPU opened on entry. CR2 is overwritten by
/// any nested page fault, so it must be read before interrupts come back on;
/// nothing else happens inside the window.
pub fn capture_fault_address(cpu: &mut dyn Cpu) -> u64 {
    debug_assert!(
        !cpu.interrupts_enabled(),
        "page fault entered with interrupts enabled"
    );
    let fault_addr = cpu.read_fault_address();
    cpu.enable_interrupts();
    fault_addr
}

/// The running processor.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct X86Cpu;

#[cfg(target_arch = "x86_64")]
impl Cpu for X86Cpu {
    fn interrupts_enabled(&self) -> bool {
        ::x86_64::instructions::interrupts::are_enabled()
    }

    fn enable_interrupts(&mut self) {
        ::x86_64::instructions::interrupts::enable();
    }

    fn read_fault_address(&mut self) -> u64 {
        ::x86_64::registers::control::Cr2::read_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CpuEvent, MockCpu};

    #[test]
    fn test_capture_reads_before_unmasking() {
        let mut cpu = MockCpu::masked(0x0804_8123);
        let addr = capture_fault_address(&mut cpu);

        assert_eq!(addr, 0x0804_8123);
        assert!(cpu.enabled);
        assert_eq!(
            cpu.events,
            [CpuEvent::ReadFaultAddress { masked: true }, CpuEvent::Enable]
        );
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_capture_requires_masked_entry() {
        let mut cpu = MockCpu::masked(0x1000);
        cpu.enabled = true;
        capture_fault_address(&mut cpu);
    }
}
