use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::{
    context::EmulationContext,
    memory::{Memory, MemoryFault},
    processor::Processor,
    registers::PC,
};

/// Offset the interpreter expects between the exit address and the next fetch.
// TODO: derive this from the originating call site once Thumb code can be patched.
pub const INSTRUCTION_WIDTH: u32 = 4;

/// Proof that a native patch handed control back to the interpreter.
///
/// Only [EmulationContext::exit] creates one, and it consumes the context, so
/// a patch that returns `Ok` has exited exactly once.
#[must_use = "a native patch has to return the Exit it got from `EmulationContext::exit`"]
#[derive(Debug, PartialEq, Eq)]
pub struct Exit {
    resume_at: u32,
}

impl Exit {
    /// Guest address the interpreter resumes at.
    pub fn resume_at(&self) -> u32 {
        self.resume_at
    }
}

pub type PatchResult = Result<Exit, MemoryFault>;

pub type PatchFn<P, M> = for<'a> fn(EmulationContext<'a, P, M>) -> PatchResult;

impl<P: Processor, M: Memory> EmulationContext<'_, P, M> {
    /// Leaves native code, resuming the interpreter after the instruction at
    /// `address`. The addition wraps at the top of the address space.
    pub fn exit(mut self, address: u32) -> Exit {
        let resume_at = address.wrapping_add(INSTRUCTION_WIDTH);

        self.set_reg(PC, resume_at);

        Exit { resume_at }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("Address '0x{address:08X}' is already patched by '{name}'")]
    AddressTaken { address: u32, name: &'static str },
    #[error("A patch named '{name}' is already registered")]
    NameTaken { name: &'static str },
}

/// A host routine standing in for the guest routine at `address`.
pub struct NativePatch<P: Processor, M: Memory> {
    pub name: &'static str,
    pub address: u32,
    pub func: PatchFn<P, M>,
}

impl<P: Processor, M: Memory> NativePatch<P, M> {
    pub const fn new(name: &'static str, address: u32, func: PatchFn<P, M>) -> Self {
        Self {
            name,
            address,
            func,
        }
    }

    /// Runs the patch and returns the address the interpreter resumes at.
    ///
    /// Memory faults raised inside the patch are returned as they are.
    pub fn invoke(&self, processor: &mut P, memory: &mut M) -> Result<u32, MemoryFault> {
        log::debug!("entering native patch '{}' (0x{:08X})", self.name, self.address);

        let ctx = EmulationContext::new(processor, memory);

        match (self.func)(ctx) {
            Ok(exit) => {
                log::debug!(
                    "native patch '{}' resumes at 0x{:08X}",
                    self.name,
                    exit.resume_at()
                );

                Ok(exit.resume_at())
            }
            Err(fault) => {
                log::debug!("native patch '{}' faulted: {fault}", self.name);

                Err(fault)
            }
        }
    }
}

impl<P: Processor, M: Memory> fmt::Debug for NativePatch<P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePatch")
            .field("name", &self.name)
            .field("address", &format_args!("0x{:08X}", self.address))
            .finish()
    }
}

/// Native patches keyed by the guest address they replace.
pub struct PatchTable<P: Processor, M: Memory> {
    patches: BTreeMap<u32, NativePatch<P, M>>,
}

impl<P: Processor, M: Memory> PatchTable<P, M> {
    pub fn new() -> Self {
        Self {
            patches: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, patch: NativePatch<P, M>) -> Result<(), PatchError> {
        if let Some(existing) = self.patches.get(&patch.address) {
            return Err(PatchError::AddressTaken {
                address: patch.address,
                name: existing.name,
            });
        }

        if self.find(patch.name).is_some() {
            return Err(PatchError::NameTaken { name: patch.name });
        }

        self.patches.insert(patch.address, patch);

        Ok(())
    }

    pub fn get(&self, address: u32) -> Option<&NativePatch<P, M>> {
        self.patches.get(&address)
    }

    pub fn find(&self, name: &str) -> Option<&NativePatch<P, M>> {
        self.patches.values().find(|patch| patch.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativePatch<P, M>> {
        self.patches.values()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl<P: Processor, M: Memory> Default for PatchTable<P, M> {
    fn default() -> Self {
        Self::new()
    }
}
