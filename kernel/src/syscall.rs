//! System-call gate
//!
//! User programs trap through vector `0x30` with the call number and its
//! arguments on the user stack. Only `write` is wired up; its buffer is
//! read through the page-table query layer, so lazily loaded pages are
//! faulted in rather than rejected.

use x86_64::PrivilegeLevel;

use crate::{
    arch::InterruptFrame,
    console,
    error::{FaultError, KernelResult},
    mm::{copy_from_user, read_user_u64, PAGE_SIZE},
    process::EXIT_FAILURE,
    trap::{ExceptionTableBuilder, IntrLevel, TrapEnv},
};

pub const SYSCALL_VECTOR: u8 = 0x30;

/// `write(fd, buffer, size)`
pub const SYS_WRITE: u64 = 9;

/// Descriptor routed to the console.
pub const STDOUT_FILENO: i32 = 1;

/// Register the system-call gate, callable from user mode with interrupts
/// on.
pub fn register(builder: &mut ExceptionTableBuilder) -> KernelResult<()> {
    builder.register(
        SYSCALL_VECTOR,
        PrivilegeLevel::Ring3,
        IntrLevel::On,
        syscall_handler,
        "syscall",
    )
}

fn syscall_handler(env: &mut TrapEnv<'_>, frame: &mut InterruptFrame) {
    let args = match read_args(env, frame.rsp) {
        Ok(args) => args,
        Err(err) => {
            log::debug!("{}: bad system call arguments: {}", env.process.name(), err);
            env.process.exit(EXIT_FAILURE)
        }
    };

    match args[0] {
        SYS_WRITE => {
            // A descriptor that does not fit an `i32` is never open.
            let written = match i32::try_from(args[1]) {
                Ok(fd) => sys_write(env, fd, args[2], args[3] as usize),
                Err(_) => 0,
            };
            frame.rax = written as u64;
        }
        nr => log::warn!("{}: unknown system call {}", env.process.name(), nr),
    }
}

/// Call number and three arguments, as pushed by the user stub.
fn read_args(env: &mut TrapEnv<'_>, sp: u64) -> Result<[u64; 4], FaultError> {
    let mut args = [0u64; 4];
    for (i, arg) in args.iter_mut().enumerate() {
        let addr = sp.wrapping_add(8 * i as u64);
        *arg = read_user_u64(&mut env.pager, env.process.memory(), addr)?;
    }
    Ok(args)
}

/// Write `size` bytes from user address `buffer` to `fd`, a page at a time.
/// Returns the number of bytes written; stops early if the file takes less
/// than it was given or `fd` is not open.
fn sys_write(env: &mut TrapEnv<'_>, fd: i32, buffer: u64, size: usize) -> usize {
    let mut chunk = [0u8; PAGE_SIZE];
    let mut written = 0;

    while written < size {
        let len = (size - written).min(PAGE_SIZE);
        let addr = buffer.wrapping_add(written as u64);
        if let Err(err) = copy_from_user(
            &mut env.pager,
            env.process.memory(),
            addr,
            &mut chunk[..len],
        ) {
            log::debug!("{}: bad write buffer: {}", env.process.name(), err);
            env.process.exit(EXIT_FAILURE);
        }

        if fd == STDOUT_FILENO {
            console::put_bytes(&chunk[..len]);
            written += len;
            continue;
        }
        match env.process.write_file(fd, &chunk[..len]) {
            Some(n) => {
                written += n;
                if n < len {
                    break;
                }
            }
            None => break,
        }
    }
    written
}
