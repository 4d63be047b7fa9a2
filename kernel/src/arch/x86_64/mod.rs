//! x86_64 trap-entry support: the saved frame and the CPU seam.

pub mod cpu;
pub mod frame;
