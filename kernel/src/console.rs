//! Console output backend for the print macros.
//!
//! Uses the `uart_16550` crate to drive COM1 at I/O port 0x3F8 when running
//! on bare metal. Output is written with interrupts disabled so a trap taken
//! while printing cannot deadlock on the port lock.

#[cfg(all(
    not(test),
    target_arch = "x86_64",
    target_os = "none",
    feature = "serial-console"
))]
mod serial {
    use lazy_static::lazy_static;
    use spin::Mutex;
    use uart_16550::SerialPort;

    lazy_static! {
        pub static ref SERIAL1: Mutex<SerialPort> = {
            // SAFETY: 0x3F8 is the standard COM1 base port; nothing else in
            // the kernel drives it.
            let mut serial_port = unsafe { SerialPort::new(0x3F8) };
            serial_port.init();
            Mutex::new(serial_port)
        };
    }

    pub fn write(args: core::fmt::Arguments) {
        use core::fmt::Write;

        use x86_64::instructions::interrupts;

        interrupts::without_interrupts(|| {
            // A failed serial write has nowhere better to be reported.
            let _ = SERIAL1.lock().write_fmt(args);
        });
    }
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    #[cfg(test)]
    {
        std::print!("{}", args);
    }

    #[cfg(all(
        not(test),
        target_arch = "x86_64",
        target_os = "none",
        feature = "serial-console"
    ))]
    serial::write(args);

    #[cfg(all(
        not(test),
        not(all(
            target_arch = "x86_64",
            target_os = "none",
            feature = "serial-console"
        ))
    ))]
    let _ = args;
}

/// Write raw bytes to the console, replacing invalid UTF-8.
pub fn put_bytes(bytes: &[u8]) {
    for chunk in bytes.utf8_chunks() {
        _print(format_args!("{}", chunk.valid()));
        if !chunk.invalid().is_empty() {
            _print(format_args!("{}", char::REPLACEMENT_CHARACTER));
        }
    }
}
