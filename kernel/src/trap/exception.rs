//! CPU exception handlers
//!
//! Every exception except the page fault ends in [`kill`]. Page faults are
//! handed to the demand-paging resolver and only reach [`kill`] when the
//! faulting address is outside user space.

use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::PrivilegeLevel;

use super::{
    table::{ExceptionTableBuilder, IntrLevel},
    TrapEnv,
};
use crate::{
    arch::{capture_fault_address, InterruptFrame, KERNEL_CODE_SELECTOR, USER_CODE_SELECTOR},
    error::{FaultError, KernelResult},
    mm::{resolve_fault, FaultCause},
    process::EXIT_FAILURE,
};

/// Page faults taken since boot.
static PAGE_FAULTS: AtomicU64 = AtomicU64::new(0);

pub const PAGE_FAULT_VECTOR: u8 = 14;

/// Register the CPU exception vectors.
///
/// Exceptions that user code may raise on purpose with `INT`, `INT3` or
/// `INTO` are user-invocable. The rest are kernel-only, so a user `INT n`
/// for them turns into a general-protection fault instead. The page fault
/// runs with interrupts off until CR2 has been read.
pub fn register_exceptions(builder: &mut ExceptionTableBuilder) -> KernelResult<()> {
    use IntrLevel::{Off, On};
    use PrivilegeLevel::{Ring0, Ring3};

    builder.register(3, Ring3, On, unexpected, "#BP Breakpoint Exception")?;
    builder.register(4, Ring3, On, unexpected, "#OF Overflow Exception")?;
    builder.register(5, Ring3, On, unexpected, "#BR BOUND Range Exceeded Exception")?;

    builder.register(0, Ring0, On, unexpected, "#DE Divide Error")?;
    builder.register(1, Ring0, On, unexpected, "#DB Debug Exception")?;
    builder.register(6, Ring0, On, unexpected, "#UD Invalid Opcode Exception")?;
    builder.register(7, Ring0, On, unexpected, "#NM Device Not Available Exception")?;
    builder.register(11, Ring0, On, unexpected, "#NP Segment Not Present")?;
    builder.register(12, Ring0, On, unexpected, "#SS Stack Fault Exception")?;
    builder.register(13, Ring0, On, unexpected, "#GP General Protection Exception")?;
    builder.register(16, Ring0, On, unexpected, "#MF x87 FPU Floating-Point Error")?;
    builder.register(19, Ring0, On, unexpected, "#XF SIMD Floating-Point Exception")?;

    builder.register(PAGE_FAULT_VECTOR, Ring0, Off, page_fault, "#PF Page-Fault Exception")?;
    Ok(())
}

fn unexpected(env: &mut TrapEnv<'_>, frame: &mut InterruptFrame) {
    kill(env, frame)
}

/// Handle an exception that cannot be recovered from.
///
/// Classified by the interrupted code segment: user code kills the current
/// process, kernel code is a kernel bug, and anything else kills the
/// process as well.
pub fn kill(env: &mut TrapEnv<'_>, frame: &InterruptFrame) -> ! {
    let vector = frame.vector();
    let name = env.table.name(vector);
    let cs = frame.code_segment();

    if cs == USER_CODE_SELECTOR {
        println!(
            "{}: dying due to interrupt {:#04x} ({}).",
            env.process.name(),
            vector,
            name
        );
        frame.dump(name, env.cpu.read_fault_address());
        env.process.exit(EXIT_FAILURE)
    } else if cs == KERNEL_CODE_SELECTOR {
        frame.dump(name, env.cpu.read_fault_address());
        exception_print_stats();
        panic!("Kernel bug - unexpected interrupt in kernel");
    } else {
        println!(
            "Interrupt {:#04x} ({}) in unknown segment {:04x}",
            vector, name, cs.0
        );
        env.process.exit(EXIT_FAILURE)
    }
}

/// Page-fault handler.
///
/// Entered with interrupts off. Faults at user addresses are resolved by
/// lazy loading or stack growth; any that cannot be resolved terminate the
/// process. Faults outside user space go to [`kill`].
pub fn page_fault(env: &mut TrapEnv<'_>, frame: &mut InterruptFrame) {
    let fault_addr = capture_fault_address(&mut *env.cpu);
    PAGE_FAULTS.fetch_add(1, Ordering::Relaxed);

    let cause = FaultCause::decode(frame.error_code);
    match resolve_fault(&mut env.pager, env.process.memory(), fault_addr, cause) {
        Ok(resolution) => {
            log::trace!("page fault at {:#x}: {:?}", fault_addr, resolution);
        }
        Err(FaultError::KernelAddress { .. }) => {
            println!("Page fault at {:#x}: {}.", fault_addr, cause);
            kill(env, frame)
        }
        Err(err) => {
            log::debug!("{}: {}", env.process.name(), err);
            env.process.exit(EXIT_FAILURE)
        }
    }
}

/// Number of page faults taken since boot.
pub fn page_fault_count() -> u64 {
    PAGE_FAULTS.load(Ordering::Relaxed)
}

/// Print exception statistics.
pub fn exception_print_stats() {
    println!("Exception: {} page faults", page_fault_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap::table::ExceptionTableBuilder;

    #[test]
    fn test_exception_privilege_floors() {
        let mut builder = ExceptionTableBuilder::new();
        register_exceptions(&mut builder).unwrap();
        let table = builder.build();

        for vector in [3, 4, 5] {
            let entry = table.get(vector).unwrap();
            assert_eq!(entry.dpl, PrivilegeLevel::Ring3);
            assert_eq!(entry.level, IntrLevel::On);
        }
        for vector in [0, 1, 6, 7, 11, 12, 13, 16, 19] {
            let entry = table.get(vector).unwrap();
            assert_eq!(entry.dpl, PrivilegeLevel::Ring0, "vector {}", vector);
            assert_eq!(entry.level, IntrLevel::On);
        }

        let pf = table.get(PAGE_FAULT_VECTOR).unwrap();
        assert_eq!(pf.dpl, PrivilegeLevel::Ring0);
        assert_eq!(pf.level, IntrLevel::Off);
        assert_eq!(pf.name, "#PF Page-Fault Exception");
        assert_eq!(table.registered().count(), 13);
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut builder = ExceptionTableBuilder::new();
        register_exceptions(&mut builder).unwrap();
        assert!(register_exceptions(&mut builder).is_err());
    }
}
