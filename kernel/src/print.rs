//! Kernel printing macros.
//!
//! Provides `print!` and `println!` macros that delegate to
//! [`crate::console`]. On bare-metal x86_64 this is the COM1 serial port;
//! under unit tests it is the host's standard output.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
