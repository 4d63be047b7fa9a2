//! Exception vector table
//!
//! One entry per vector, registered during boot through
//! [`ExceptionTableBuilder`] and frozen into an [`ExceptionTable`] that is
//! never modified afterwards.

use core::fmt;

use x86_64::PrivilegeLevel;

use super::TrapEnv;
use crate::{
    arch::InterruptFrame,
    error::{KernelError, KernelResult},
};

/// Vector raised when `INT n` names a vector with no gate.
pub const SEGMENT_NOT_PRESENT: u8 = 11;
/// Vector raised when `INT n` is issued below the gate's privilege floor.
pub const GENERAL_PROTECTION: u8 = 13;

/// Interrupt state on handler entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// Trap handler. Handlers that end the process never return.
pub type Handler = fn(&mut TrapEnv<'_>, &mut InterruptFrame);

/// A registered vector.
#[derive(Clone, Copy)]
pub struct VectorEntry {
    pub vector: u8,
    /// Least privileged level allowed to raise the vector with `INT n`.
    pub dpl: PrivilegeLevel,
    pub level: IntrLevel,
    pub handler: Handler,
    pub name: &'static str,
}

impl fmt::Debug for VectorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorEntry")
            .field("vector", &self.vector)
            .field("dpl", &self.dpl)
            .field("level", &self.level)
            .field("name", &self.name)
            .finish()
    }
}

/// Mutable table used while the kernel registers its vectors.
pub struct ExceptionTableBuilder {
    entries: [Option<VectorEntry>; 256],
}

impl ExceptionTableBuilder {
    pub fn new() -> Self {
        Self {
            entries: [None; 256],
        }
    }

    /// Register `handler` for `vector`. Each vector may be registered once.
    pub fn register(
        &mut self,
        vector: u8,
        dpl: PrivilegeLevel,
        level: IntrLevel,
        handler: Handler,
        name: &'static str,
    ) -> KernelResult<()> {
        let slot = &mut self.entries[usize::from(vector)];
        if slot.is_some() {
            return Err(KernelError::AlreadyExists {
                resource: "interrupt vector",
                id: u64::from(vector),
            });
        }
        *slot = Some(VectorEntry {
            vector,
            dpl,
            level,
            handler,
            name,
        });
        log::trace!("registered vector {:#04x} ({})", vector, name);
        Ok(())
    }

    pub fn build(self) -> ExceptionTable {
        ExceptionTable {
            entries: self.entries,
        }
    }
}

impl Default for ExceptionTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen vector table.
pub struct ExceptionTable {
    entries: [Option<VectorEntry>; 256],
}

impl ExceptionTable {
    pub fn get(&self, vector: u8) -> Option<&VectorEntry> {
        self.entries[usize::from(vector)].as_ref()
    }

    /// Symbolic name of `vector`, for diagnostics.
    pub fn name(&self, vector: u8) -> &'static str {
        self.get(vector).map_or("unknown", |entry| entry.name)
    }

    pub fn registered(&self) -> impl Iterator<Item = &VectorEntry> {
        self.entries.iter().flatten()
    }

    /// Vector the CPU actually delivers when code running at `cpl`
    /// executes `INT vector`.
    pub fn deliver_software_interrupt(&self, vector: u8, cpl: PrivilegeLevel) -> u8 {
        match self.get(vector) {
            None => SEGMENT_NOT_PRESENT,
            Some(entry) if cpl as u8 > entry.dpl as u8 => GENERAL_PROTECTION,
            Some(_) => vector,
        }
    }
}

impl fmt::Debug for ExceptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered()).finish()
    }
}
